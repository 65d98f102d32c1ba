//! Simple Notification Service.

pub use aws_sdk_sns::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// Publish `message` to a topic and return the message id.
pub async fn publish_to_topic(
    client: &Client,
    topic_arn: &str,
    message: &str,
    subject: &str,
) -> Result<Option<String>> {
    let output = client
        .publish()
        .topic_arn(topic_arn)
        .message(message)
        .subject(subject)
        .send()
        .await
        .map_err(sdk_error("Publish"))?;
    Ok(output.message_id)
}
