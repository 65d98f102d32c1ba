//! Parameter Store reads through the Parameters and Secrets Lambda extension.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::form_urlencoded;

use commonlib_core::env::non_empty_var;

use crate::error::Result;
use crate::secretsmanager::extension::{
    extension_client, DEFAULT_EXTENSION_PORT, EXTENSION_PORT_VAR,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterResponse {
    parameter: ParameterValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterValue {
    value: String,
}

#[derive(Debug, Clone)]
pub struct ParameterExtensionClient {
    http: commonlib_httpcomm::Client,
}

impl ParameterExtensionClient {
    pub fn new(tracing: bool) -> Result<Self> {
        let port = non_empty_var(EXTENSION_PORT_VAR)
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_EXTENSION_PORT);
        let token = non_empty_var("AWS_SESSION_TOKEN").unwrap_or_default();
        Self::with_base_url(&format!("http://localhost:{port}/"), &token, tracing)
    }

    pub fn with_base_url(base_url: &str, token: &str, tracing: bool) -> Result<Self> {
        Ok(Self {
            http: extension_client(base_url, token, tracing)?,
        })
    }

    /// Raw value of a parameter.
    pub async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<String> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("name", name)
            .append_pair("withDecryption", if with_decryption { "true" } else { "false" })
            .finish();

        let response: ParameterResponse = self
            .http
            .get_json(&format!("systemsmanager/parameters/get?{query}"), None)
            .await?;
        Ok(response.parameter.value)
    }

    /// Decode a parameter holding a JSON document.
    pub async fn get_parameter_json<T: DeserializeOwned>(
        &self,
        name: &str,
        with_decryption: bool,
    ) -> Result<T> {
        let value = self.get_parameter(name, with_decryption).await?;
        Ok(serde_json::from_str(&value)?)
    }
}
