//! Publish-only broker clients behind one trait.
//!
//! - [`AmqpClient`]: AMQP 1.0 with SASL PLAIN
//! - [`MqttClient`]: MQTT 3.1.1, QoS 0
//! - [`StompClient`]: STOMP 1.2 over TLS with receipts
//!
//! ```no_run
//! use commonlib_queue::{MessageQueue, StompClient};
//!
//! # async fn run() -> commonlib_queue::Result<()> {
//! let mut queue = StompClient::connect("mq.example.com", 61614, "user", "secret").await?;
//! queue.publish("/topic/orders", r#"{"id":1}"#).await?;
//! queue.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

pub mod amqp;
pub mod error;
pub mod mqtt;
pub mod stomp;

pub use amqp::AmqpClient;
pub use error::{Error, Result};
pub use mqtt::MqttClient;
pub use stomp::StompClient;

#[async_trait]
pub trait MessageQueue: Send {
    async fn publish(&mut self, topic: &str, message: &str) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}
