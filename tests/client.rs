use std::time::Duration;

use memsub::client::Client;
use memsub::message::PubsubMessage;
use memsub::subscription::SubscriptionConfig;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn create_message(data: &[u8], ordering_key: &str) -> PubsubMessage {
    PubsubMessage {
        data: data.to_vec(),
        ordering_key: ordering_key.to_string(),
        ..Default::default()
    }
}

async fn do_publish_and_subscribe(ordering_key: &str) -> Result<(), anyhow::Error> {
    let client = Client::new();
    let order = !ordering_key.is_empty();

    let uuid = Uuid::new_v4().simple().to_string();
    let topic_id = format!("t{uuid}");
    let subscription_id = format!("s{uuid}");
    let topic = client.create_topic(&topic_id)?;
    let subscription = client.create_subscription(
        &subscription_id,
        &topic_id,
        SubscriptionConfig {
            enable_message_ordering: order,
            ..Default::default()
        },
    )?;

    let cancellation_token = CancellationToken::new();
    let cancel_receiver = cancellation_token.clone();
    let (s, mut r) = tokio::sync::mpsc::channel(100);
    let handle = tokio::spawn(async move {
        subscription
            .receive(
                cancel_receiver,
                move |message| {
                    let s2 = s.clone();
                    async move {
                        let data = String::from_utf8(message.data().to_vec()).unwrap();
                        // Record receipt before acking so keyed messages
                        // land in delivery order.
                        let _ = s2.send(data).await;
                        let _ = message.ack().await;
                    }
                },
                None,
            )
            .await
    });

    for v in 0..100 {
        let message_id = topic.publish(create_message(format!("abc_{v}").as_bytes(), ordering_key))?;
        tracing::debug!("sent message_id = {message_id}");
    }

    let mut count = 0;
    while count < 100 {
        match tokio::time::timeout(Duration::from_secs(10), r.recv()).await {
            Ok(Some(data)) => {
                if order {
                    assert_eq!(format!("abc_{count}"), data);
                }
                count += 1;
            }
            Ok(None) => break,
            Err(_) => panic!("timed out after {count} messages"),
        }
    }
    assert_eq!(count, 100);

    cancellation_token.cancel();
    handle.await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_publish_subscribe_ordered() -> Result<(), anyhow::Error> {
    do_publish_and_subscribe("ordering").await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_publish_subscribe_random() -> Result<(), anyhow::Error> {
    do_publish_and_subscribe("").await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lifecycle() -> Result<(), anyhow::Error> {
    let client = Client::new();

    let uuid = Uuid::new_v4().simple().to_string();
    let topic_id = format!("t{uuid}");
    let subscription_id = format!("s{uuid}");

    let topics = client.get_topics();
    let subs = client.get_subscriptions();
    let _topic = client.create_topic(&topic_id)?;
    let _subscription =
        client.create_subscription(&subscription_id, &topic_id, SubscriptionConfig::default())?;
    let topics_after = client.get_topics();
    let subs_after = client.get_subscriptions();
    assert_eq!(1, topics_after.len() - topics.len());
    assert_eq!(1, subs_after.len() - subs.len());

    let subscription = client.subscription(&subscription_id);
    subscription.delete()?;
    assert!(!subscription.exists());
    let topic = client.topic(&topic_id);
    topic.delete()?;
    assert!(!topic.exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_detached_subscription_still_listed() -> Result<(), anyhow::Error> {
    let client = Client::new();
    let uuid = Uuid::new_v4().simple().to_string();
    let topic_id = format!("t{uuid}");
    let subscription_id = format!("s{uuid}");
    let topic = client.create_topic(&topic_id)?;
    client.create_subscription(&subscription_id, &topic_id, SubscriptionConfig::default())?;

    topic.delete()?;
    let subscription = client.subscription(&subscription_id);
    assert!(subscription.exists(), "deleting a topic keeps its subscriptions");
    subscription.delete()?;
    assert!(!subscription.exists());
    Ok(())
}
