//! API Gateway v2 (HTTP and WebSocket APIs, custom domains).

pub use aws_sdk_apigatewayv2::types::{Api, ApiMapping, DomainName};
pub use aws_sdk_apigatewayv2::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

const MAX_APIS: &str = "10";

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// API mappings of a custom domain.
pub async fn get_api_mappings(client: &Client, domain_name: &str) -> Result<Vec<ApiMapping>> {
    let output = client
        .get_api_mappings()
        .domain_name(domain_name)
        .send()
        .await
        .map_err(sdk_error("GetApiMappings"))?;
    Ok(output.items.unwrap_or_default())
}

pub async fn get_domain_names(client: &Client) -> Result<Vec<DomainName>> {
    let output = client
        .get_domain_names()
        .send()
        .await
        .map_err(sdk_error("GetDomainNames"))?;
    Ok(output.items.unwrap_or_default())
}

/// Up to ten APIs.
pub async fn get_apis(client: &Client) -> Result<Vec<Api>> {
    let output = client
        .get_apis()
        .max_results(MAX_APIS)
        .send()
        .await
        .map_err(sdk_error("GetApis"))?;
    Ok(output.items.unwrap_or_default())
}
