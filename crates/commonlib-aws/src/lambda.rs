//! Lambda function management.

use std::collections::HashMap;

use aws_sdk_lambda::operation::get_function::GetFunctionOutput;
use aws_sdk_lambda::operation::list_functions::ListFunctionsOutput;
use aws_sdk_lambda::operation::update_function_code::UpdateFunctionCodeOutput;
use tracing::info;

pub use aws_sdk_lambda::types::Architecture;
pub use aws_sdk_lambda::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

const MAX_FUNCTIONS: i32 = 100;

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

pub async fn list_functions(client: &Client) -> Result<ListFunctionsOutput> {
    client
        .list_functions()
        .max_items(MAX_FUNCTIONS)
        .send()
        .await
        .map_err(sdk_error("ListFunctions"))
}

pub async fn get_function(client: &Client, function_name: &str) -> Result<GetFunctionOutput> {
    client
        .get_function()
        .function_name(function_name)
        .send()
        .await
        .map_err(sdk_error("GetFunction"))
}

/// Deploy the archive at `s3://{bucket}/{function_name}/{key}`.
pub async fn update_function_code(
    client: &Client,
    function_name: &str,
    bucket: &str,
    key: &str,
    architecture: Architecture,
) -> Result<UpdateFunctionCodeOutput> {
    let object_key = code_key(function_name, key);
    info!(function_name, bucket, key = %object_key, "updating lambda function code");

    client
        .update_function_code()
        .function_name(function_name)
        .s3_bucket(bucket)
        .s3_key(object_key)
        .architectures(architecture)
        .send()
        .await
        .map_err(sdk_error("UpdateFunctionCode"))
}

fn code_key(function_name: &str, key: &str) -> String {
    format!("{function_name}/{key}")
}

pub async fn tag_lambda_function(
    client: &Client,
    function_arn: &str,
    tags: HashMap<String, String>,
) -> Result<()> {
    client
        .tag_resource()
        .resource(function_arn)
        .set_tags(Some(tags))
        .send()
        .await
        .map_err(sdk_error("TagResource"))?;
    Ok(())
}

pub async fn get_function_description(
    client: &Client,
    function_name: &str,
) -> Result<Option<String>> {
    let output = client
        .get_function_configuration()
        .function_name(function_name)
        .send()
        .await
        .map_err(sdk_error("GetFunctionConfiguration"))?;
    Ok(output.description)
}

pub async fn update_function_description(
    client: &Client,
    function_name: &str,
    description: &str,
) -> Result<()> {
    client
        .update_function_configuration()
        .function_name(function_name)
        .description(description)
        .send()
        .await
        .map_err(sdk_error("UpdateFunctionConfiguration"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_lambda::operation::get_function_configuration::GetFunctionConfigurationOutput;
    use aws_smithy_mocks::{mock, mock_client};

    #[tokio::test]
    async fn test_update_function_code_prefixes_key_with_function_name() {
        let rule = mock!(Client::update_function_code)
            .match_requests(|req| {
                req.s3_key() == Some("orders/build-42.zip")
                    && req.s3_bucket() == Some("artifacts")
                    && req.architectures() == [Architecture::Arm64]
            })
            .then_output(|| UpdateFunctionCodeOutput::builder().version("3").build());
        let client = mock_client!(aws_sdk_lambda, &[&rule]);

        let output = update_function_code(
            &client,
            "orders",
            "artifacts",
            "build-42.zip",
            Architecture::Arm64,
        )
        .await
        .unwrap();
        assert_eq!(output.version(), Some("3"));
    }

    #[tokio::test]
    async fn test_get_function_description() {
        let rule = mock!(Client::get_function_configuration)
            .match_requests(|req| req.function_name() == Some("orders"))
            .then_output(|| {
                GetFunctionConfigurationOutput::builder()
                    .description("sha=abc123")
                    .build()
            });
        let client = mock_client!(aws_sdk_lambda, &[&rule]);

        let description = get_function_description(&client, "orders").await.unwrap();
        assert_eq!(description.as_deref(), Some("sha=abc123"));
    }
}
