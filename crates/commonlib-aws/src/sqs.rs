//! SQS publishing and consumption.

use md5::{Digest, Md5};

pub use aws_sdk_sqs::types::Message;
pub use aws_sdk_sqs::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Error, Result};

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// Send `message` to the FIFO queue named `queue_name` and return the
/// message id.
///
/// The deduplication id is the MD5 of the body, so identical messages are
/// only delivered once within the deduplication window. Without a
/// `group_id` the same hash is used as the message group.
pub async fn publish_message(
    client: &Client,
    queue_name: &str,
    message: &str,
    group_id: Option<&str>,
) -> Result<Option<String>> {
    let queue_url = client
        .get_queue_url()
        .queue_name(queue_name)
        .send()
        .await
        .map_err(sdk_error("GetQueueUrl"))?
        .queue_url
        .ok_or(Error::MissingField("QueueUrl"))?;

    let hash = md5_hex(message);
    let output = client
        .send_message()
        .queue_url(queue_url)
        .message_body(message)
        .delay_seconds(0)
        .message_deduplication_id(&hash)
        .message_group_id(group_id.unwrap_or(&hash))
        .send()
        .await
        .map_err(sdk_error("SendMessage"))?;
    Ok(output.message_id)
}

/// Receive up to `max_messages` messages.
pub async fn receive_messages(
    client: &Client,
    queue_url: &str,
    max_messages: i32,
) -> Result<Vec<Message>> {
    let output = client
        .receive_message()
        .queue_url(queue_url)
        .max_number_of_messages(max_messages)
        .send()
        .await
        .map_err(sdk_error("ReceiveMessage"))?;
    Ok(output.messages.unwrap_or_default())
}

pub async fn delete_message(client: &Client, queue_url: &str, receipt_handle: &str) -> Result<()> {
    client
        .delete_message()
        .queue_url(queue_url)
        .receipt_handle(receipt_handle)
        .send()
        .await
        .map_err(sdk_error("DeleteMessage"))?;
    Ok(())
}

fn md5_hex(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sqs::operation::get_queue_url::GetQueueUrlOutput;
    use aws_sdk_sqs::operation::receive_message::ReceiveMessageOutput;
    use aws_sdk_sqs::operation::send_message::SendMessageOutput;
    use aws_smithy_mocks::{mock, mock_client, RuleMode};

    const QUEUE_URL: &str = "https://sqs.eu-north-1.amazonaws.com/1/events.fifo";

    fn queue_url_rule() -> aws_smithy_mocks::Rule {
        mock!(Client::get_queue_url)
            .match_requests(|req| req.queue_name() == Some("events.fifo"))
            .then_output(|| GetQueueUrlOutput::builder().queue_url(QUEUE_URL).build())
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_publish_message_deduplicates_on_body_hash() {
        let send = mock!(Client::send_message)
            .match_requests(|req| {
                req.queue_url() == Some(QUEUE_URL)
                    && req.message_deduplication_id() == Some("5d41402abc4b2a76b9719d911017c592")
                    && req.message_group_id() == Some("5d41402abc4b2a76b9719d911017c592")
            })
            .then_output(|| SendMessageOutput::builder().message_id("m-1").build());
        let client = mock_client!(aws_sdk_sqs, RuleMode::MatchAny, &[&queue_url_rule(), &send]);

        let id = publish_message(&client, "events.fifo", "hello", None).await.unwrap();
        assert_eq!(id.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn test_publish_message_with_group() {
        let send = mock!(Client::send_message)
            .match_requests(|req| req.message_group_id() == Some("orders"))
            .then_output(|| SendMessageOutput::builder().message_id("m-2").build());
        let client = mock_client!(aws_sdk_sqs, RuleMode::MatchAny, &[&queue_url_rule(), &send]);

        publish_message(&client, "events.fifo", "hello", Some("orders"))
            .await
            .unwrap();
        assert_eq!(send.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_receive_messages() {
        let rule = mock!(Client::receive_message)
            .match_requests(|req| req.max_number_of_messages() == Some(5))
            .then_output(|| {
                ReceiveMessageOutput::builder()
                    .messages(Message::builder().body("a").receipt_handle("r-1").build())
                    .build()
            });
        let client = mock_client!(aws_sdk_sqs, &[&rule]);

        let messages = receive_messages(&client, QUEUE_URL, 5).await.unwrap();
        assert_eq!(messages[0].receipt_handle(), Some("r-1"));
    }
}
