use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use memsub::client::Client;
use memsub::message::PubsubMessage;
use memsub::subscriber::{AckOptions, SubscriberOptions, SubscriptionEvent};
use memsub::subscription::SubscriptionConfig;

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Flush acks on every call so sequential ack-awaiting handlers are not
/// throttled by the batch timer.
fn fast_subscriber_options() -> SubscriberOptions {
    SubscriberOptions {
        ack_manager: AckOptions {
            max_messages: 100,
            max_milliseconds: 0,
        },
        ..Default::default()
    }
}

fn message(data: Vec<u8>, ordering_key: &str) -> PubsubMessage {
    PubsubMessage {
        data,
        ordering_key: ordering_key.to_string(),
        ..Default::default()
    }
}

async fn wait_until(limit: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn throughput_immediate_ack() -> Result<(), anyhow::Error> {
    const COUNT: u32 = 10_000;

    let client = Client::new();
    let topic = client.create_topic("load-topic")?;
    let subscription =
        client.create_subscription("load-sub", "load-topic", SubscriptionConfig::default())?;

    let events = subscription.open(fast_subscriber_options());
    let acked = Arc::new(AtomicU32::new(0));
    let errors = Arc::new(AtomicU32::new(0));
    let acked_clone = acked.clone();
    let errors_clone = errors.clone();
    let consumer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SubscriptionEvent::Message(m) => {
                    m.ack().await.unwrap();
                    acked_clone.fetch_add(1, SeqCst);
                }
                SubscriptionEvent::Error(_) => {
                    errors_clone.fetch_add(1, SeqCst);
                }
                SubscriptionEvent::Close => break,
            }
        }
    });

    let payload = vec![0u8; 1024];
    for _ in 0..COUNT {
        topic.publish(message(payload.clone(), ""))?;
    }

    wait_until(Duration::from_secs(60), "all messages acked", || {
        acked.load(SeqCst) == COUNT
    })
    .await;
    assert_eq!(errors.load(SeqCst), 0);

    // Nothing is outstanding, so the WAIT close returns at once.
    subscription.close().await;
    consumer.await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn fan_out_to_fifty_subscriptions() -> Result<(), anyhow::Error> {
    const SUBSCRIPTIONS: usize = 50;
    const MESSAGES: u32 = 1_000;

    let client = Client::new();
    let topic = client.create_topic("fan-topic")?;

    let mut subscriptions = Vec::with_capacity(SUBSCRIPTIONS);
    let mut counters = Vec::with_capacity(SUBSCRIPTIONS);
    for i in 0..SUBSCRIPTIONS {
        let subscription = client.create_subscription(
            &format!("fan-sub-{i}"),
            "fan-topic",
            SubscriptionConfig::default(),
        )?;
        let events = subscription.open(fast_subscriber_options());
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SubscriptionEvent::Message(m) => {
                        m.ack().await.unwrap();
                        counter_clone.fetch_add(1, SeqCst);
                    }
                    SubscriptionEvent::Error(e) => panic!("unexpected error: {e}"),
                    SubscriptionEvent::Close => break,
                }
            }
        });
        subscriptions.push(subscription);
        counters.push(counter);
    }

    for i in 0..MESSAGES {
        topic.publish(message(format!("m{i}").into_bytes(), ""))?;
    }

    wait_until(Duration::from_secs(60), "every subscription drained", || {
        counters.iter().all(|c| c.load(SeqCst) == MESSAGES)
    })
    .await;

    let total: u32 = counters.iter().map(|c| c.load(SeqCst)).sum();
    assert_eq!(total, MESSAGES * SUBSCRIPTIONS as u32);

    join_all(subscriptions.iter().map(|s| s.close())).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn thundering_herd_of_publishers() -> Result<(), anyhow::Error> {
    const PUBLISHERS: u32 = 1_000;

    let client = Client::new();
    let topic = client.create_topic("herd-topic")?;
    let subscription =
        client.create_subscription("herd-sub", "herd-topic", SubscriptionConfig::default())?;

    let events = subscription.open(fast_subscriber_options());
    let delivered = Arc::new(AtomicU32::new(0));
    let delivered_clone = delivered.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SubscriptionEvent::Message(m) => {
                    m.ack().await.unwrap();
                    delivered_clone.fetch_add(1, SeqCst);
                }
                SubscriptionEvent::Error(e) => panic!("unexpected error: {e}"),
                SubscriptionEvent::Close => break,
            }
        }
    });

    let publishers = (0..PUBLISHERS).map(|i| {
        let topic = topic.clone();
        tokio::spawn(async move { topic.publish(message(format!("p{i}").into_bytes(), "")) })
    });
    for result in join_all(publishers).await {
        result?.expect("publish must not fail");
    }

    wait_until(Duration::from_secs(30), "every message delivered", || {
        delivered.load(SeqCst) == PUBLISHERS
    })
    .await;

    subscription.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn ordering_keys_deliver_serially_in_order() -> Result<(), anyhow::Error> {
    let client = Client::new();
    let topic = client.create_topic("order-topic")?;
    let subscription = client.create_subscription(
        "order-sub",
        "order-topic",
        SubscriptionConfig {
            enable_message_ordering: true,
            ..Default::default()
        },
    )?;

    // Alternate two keys: a0 b0 a1 b1 ...
    for i in 0..5 {
        topic.publish(message(format!("a{i}").into_bytes(), "key-a"))?;
        topic.publish(message(format!("b{i}").into_bytes(), "key-b"))?;
    }

    let events = subscription.open(fast_subscriber_options());
    let active: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let received: Arc<Mutex<HashMap<String, Vec<String>>>> = Arc::new(Mutex::new(HashMap::new()));
    let violations = Arc::new(AtomicU32::new(0));
    let done = Arc::new(AtomicU32::new(0));

    let consumer = {
        let active = active.clone();
        let received = received.clone();
        let violations = violations.clone();
        let done = done.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SubscriptionEvent::Message(m) => {
                        let active = active.clone();
                        let received = received.clone();
                        let violations = violations.clone();
                        let done = done.clone();
                        tokio::spawn(async move {
                            let key = m.ordering_key().expect("keyed message").to_string();
                            if !active.lock().unwrap().insert(key.clone()) {
                                violations.fetch_add(1, SeqCst);
                            }
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            received
                                .lock()
                                .unwrap()
                                .entry(key.clone())
                                .or_default()
                                .push(String::from_utf8(m.data().to_vec()).unwrap());
                            active.lock().unwrap().remove(&key);
                            m.ack().await.unwrap();
                            done.fetch_add(1, SeqCst);
                        });
                    }
                    SubscriptionEvent::Error(e) => panic!("unexpected error: {e}"),
                    SubscriptionEvent::Close => break,
                }
            }
        })
    };

    wait_until(Duration::from_secs(10), "all keyed messages acked", || {
        done.load(SeqCst) == 10
    })
    .await;

    assert_eq!(violations.load(SeqCst), 0, "a key had two deliveries in flight");
    let received = received.lock().unwrap();
    assert_eq!(received["key-a"], vec!["a0", "a1", "a2", "a3", "a4"]);
    assert_eq!(received["key-b"], vec!["b0", "b1", "b2", "b3", "b4"]);
    drop(received);

    subscription.close().await;
    consumer.await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn nack_redelivers_same_payload() -> Result<(), anyhow::Error> {
    let client = Client::new();
    let topic = client.create_topic("retry-topic")?;
    let subscription =
        client.create_subscription("retry-sub", "retry-topic", SubscriptionConfig::default())?;

    topic.publish(message(b"try-again".to_vec(), ""))?;
    let events = subscription.open(fast_subscriber_options());

    let first = match tokio::time::timeout(Duration::from_secs(5), events.recv()).await? {
        Ok(SubscriptionEvent::Message(m)) => m,
        other => panic!("expected first delivery, got {other:?}"),
    };
    assert_eq!(first.delivery_attempt(), 1);
    first.nack().await?;

    let second = match tokio::time::timeout(Duration::from_secs(5), events.recv()).await? {
        Ok(SubscriptionEvent::Message(m)) => m,
        other => panic!("expected redelivery, got {other:?}"),
    };
    assert_eq!(second.delivery_attempt(), 2);
    assert_eq!(second.data(), first.data());
    second.ack().await?;

    subscription.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_close_blocks_until_slow_handlers_finish() -> Result<(), anyhow::Error> {
    const COUNT: u32 = 100;

    let client = Client::new();
    let topic = client.create_topic("drain-topic")?;
    let subscription =
        client.create_subscription("drain-sub", "drain-topic", SubscriptionConfig::default())?;

    for i in 0..COUNT {
        topic.publish(message(format!("d{i}").into_bytes(), ""))?;
    }

    let mut options = fast_subscriber_options();
    options.close.timeout = Duration::from_secs(30);
    let events = subscription.open(options);

    let acked = Arc::new(AtomicU32::new(0));
    let close_events = Arc::new(AtomicU32::new(0));
    let acked_clone = acked.clone();
    let close_clone = close_events.clone();
    let consumer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SubscriptionEvent::Message(m) => {
                    let acked = acked_clone.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        m.ack().await.unwrap();
                        acked.fetch_add(1, SeqCst);
                    });
                }
                SubscriptionEvent::Error(e) => panic!("unexpected error: {e}"),
                SubscriptionEvent::Close => {
                    close_clone.fetch_add(1, SeqCst);
                }
            }
        }
    });

    // Let deliveries start, then close while handlers are still working.
    tokio::time::sleep(Duration::from_millis(30)).await;
    subscription.close().await;

    wait_until(Duration::from_secs(5), "handler counters settled", || {
        acked.load(SeqCst) == COUNT
    })
    .await;
    consumer.await?;
    assert_eq!(close_events.load(SeqCst), 1, "close fires exactly once");

    // Everything was acked before close returned, so reopening delivers
    // nothing.
    let events = subscription.open(fast_subscriber_options());
    assert!(
        tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err(),
        "no redeliveries after a drained close"
    );
    subscription.close().await;
    Ok(())
}
