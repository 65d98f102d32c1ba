//! API Gateway (REST APIs).

pub use aws_sdk_apigateway::types::RestApi;
pub use aws_sdk_apigateway::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// First page of REST APIs in the account.
pub async fn get_rest_apis(client: &Client) -> Result<Vec<RestApi>> {
    let output = client
        .get_rest_apis()
        .send()
        .await
        .map_err(sdk_error("GetRestApis"))?;
    Ok(output.items.unwrap_or_default())
}
