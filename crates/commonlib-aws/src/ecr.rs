//! Elastic Container Registry.

pub use aws_sdk_ecr::operation::describe_images::DescribeImagesOutput;
pub use aws_sdk_ecr::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

const MAX_IMAGES: i32 = 10;

/// ECR is never emulated locally, so the default chain is always used.
pub async fn new_client() -> Client {
    Client::new(AwsConfig::load_defaults().await.sdk_config())
}

pub async fn describe_images(client: &Client, repository_name: &str) -> Result<DescribeImagesOutput> {
    client
        .describe_images()
        .repository_name(repository_name)
        .max_results(MAX_IMAGES)
        .send()
        .await
        .map_err(sdk_error("DescribeImages"))
}
