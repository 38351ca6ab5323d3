//! # memsub
//!
//! In-process publish/subscribe message broker with Cloud Pub/Sub style
//! delivery semantics: named topics, named subscriptions, at-least-once
//! delivery, lease-based acknowledgement with automatic deadline
//! extension, per-stream flow control, per-key ordered delivery and
//! WAIT/NACK shutdown. Everything lives inside the current process; there
//! is no server, wire protocol or persistence.
//!
//! ## Quick Start
//!
//! ### Publish
//!
//! ```
//! use memsub::client::Client;
//! use memsub::message::PubsubMessage;
//! use memsub::status::Status;
//!
//! fn main() -> Result<(), Status> {
//!     let client = Client::new();
//!
//!     // Create topic.
//!     let topic = client.create_topic("test-topic")?;
//!
//!     // Publish message. Fan-out to attached subscriptions is immediate.
//!     let message_id = topic.publish(PubsubMessage {
//!         data: "abc".into(),
//!         ..Default::default()
//!     })?;
//!     println!("published {message_id}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Subscribe
//!
//! ```
//! use memsub::client::Client;
//! use memsub::status::Status;
//! use memsub::subscriber::{SubscriberOptions, SubscriptionEvent};
//! use memsub::subscription::SubscriptionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Status> {
//!     let client = Client::new();
//!     client.create_topic("test-topic")?;
//!
//!     // Create subscription. Enable message ordering if needed.
//!     let subscription = client.create_subscription(
//!         "test-subscription",
//!         "test-topic",
//!         SubscriptionConfig::default(),
//!     )?;
//!
//!     // Open the stream and consume events until it closes.
//!     let events = subscription.open(SubscriberOptions::default());
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             match event {
//!                 SubscriptionEvent::Message(message) => {
//!                     println!("{:?}", message.data());
//!                     // Ack or nack the message.
//!                     let _ = message.ack().await;
//!                 }
//!                 SubscriptionEvent::Error(e) => eprintln!("{e}"),
//!                 SubscriptionEvent::Close => break,
//!             }
//!         }
//!     });
//!
//!     // ... publish some messages ...
//!
//!     // Close drains in-flight messages (WAIT behavior) and fires the
//!     // Close event.
//!     subscription.close().await;
//!
//!     Ok(())
//! }
//! ```
pub mod client;
pub mod message;
pub mod status;
pub mod subscriber;
pub mod subscription;
pub mod topic;

mod ack;
mod flow;
mod lease;
mod queue;
