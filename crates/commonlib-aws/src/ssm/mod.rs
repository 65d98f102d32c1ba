//! Systems Manager Parameter Store, through the SDK or the Lambda extension.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use aws_sdk_ssm::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Error, Result};

pub mod extension;

pub use extension::ParameterExtensionClient;

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// Anything parameters can be read from by name.
#[async_trait]
pub trait ParameterSource: Send + Sync {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<String>;
}

#[async_trait]
impl ParameterSource for Client {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<String> {
        get_parameter(self, name, with_decryption).await
    }
}

#[async_trait]
impl ParameterSource for ParameterExtensionClient {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<String> {
        ParameterExtensionClient::get_parameter(self, name, with_decryption).await
    }
}

pub async fn get_parameter(client: &Client, name: &str, with_decryption: bool) -> Result<String> {
    let output = client
        .get_parameter()
        .name(name)
        .with_decryption(with_decryption)
        .send()
        .await
        .map_err(sdk_error("GetParameter"))?;
    output
        .parameter
        .and_then(|p| p.value)
        .ok_or(Error::MissingField("Parameter.Value"))
}

/// Decode a decrypted parameter holding a JSON document.
pub async fn get_parameter_store_parameter<T: DeserializeOwned>(
    client: &Client,
    name: &str,
) -> Result<T> {
    let value = get_parameter(client, name, true).await?;
    Ok(serde_json::from_str(&value)?)
}
