//! Client for the AWS Parameters and Secrets Lambda extension.
//!
//! The extension caches secrets inside the execution environment and is
//! reached over plain HTTP on localhost. Requests are authenticated with the
//! function's session token.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use url::form_urlencoded;

use commonlib_core::env::non_empty_var;
use commonlib_httpcomm::Client;

use crate::error::Result;

/// Header carrying the session token.
pub const EXTENSION_TOKEN_HEADER: &str = "X-Aws-Parameters-Secrets-Token";

pub const DEFAULT_EXTENSION_PORT: u16 = 2773;

/// Variable the extension reads its port from.
pub const EXTENSION_PORT_VAR: &str = "PARAMETERS_SECRETS_EXTENSION_HTTP_PORT";

/// A secret as returned by the extension.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SecretData {
    #[serde(rename = "ARN")]
    pub arn: String,
    pub name: String,
    pub version_id: String,
    #[serde(default)]
    pub secret_string: Option<String>,
    /// Base64 encoded, as sent on the wire.
    #[serde(default)]
    pub secret_binary: Option<String>,
    #[serde(default)]
    pub version_stages: Vec<String>,
    #[serde(default)]
    pub created_date: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SecretsExtensionClient {
    http: Client,
}

impl SecretsExtensionClient {
    /// Client for the extension of the running function, authenticated with
    /// `AWS_SESSION_TOKEN`.
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

    /// Fetch a secret, optionally at a specific version.
    pub async fn get_secret(&self, secret_id: &str, version_id: Option<&str>) -> Result<SecretData> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("secretId", secret_id);
        if let Some(version_id) = version_id {
            query.append_pair("versionId", version_id);
        }

        let resource = format!("secretsmanager/get?{}", query.finish());
        Ok(self.http.get_json(&resource, None).await?)
    }
}

pub(crate) fn extension_client(base_url: &str, token: &str, tracing: bool) -> Result<Client> {
    let headers = BTreeMap::from([(EXTENSION_TOKEN_HEADER.to_string(), token.to_string())]);
    Ok(Client::new(base_url, headers, tracing)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn get_secret(
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if headers.get("x-aws-parameters-secrets-token").map(|v| v.as_bytes()) != Some(b"token") {
            return (StatusCode::FORBIDDEN, "bad token").into_response();
        }
        match query.get("secretId").map(String::as_str) {
            Some("db/password") => Json(json!({
                "ARN": "arn:aws:secretsmanager:eu-north-1:1:secret:db/password",
                "Name": "db/password",
                "VersionId": query.get("versionId").cloned().unwrap_or_else(|| "v1".into()),
                "SecretString": "hunter2",
                "VersionStages": ["AWSCURRENT"],
                "CreatedDate": "2024-01-02T03:04:05Z"
            }))
            .into_response(),
            _ => (StatusCode::BAD_REQUEST, "secret not found").into_response(),
        }
    }

    async fn spawn_extension() -> String {
        let app = Router::new().route("/secretsmanager/get", get(get_secret));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_get_secret_sends_token_and_version() {
        let base = spawn_extension().await;
        let client = SecretsExtensionClient::with_base_url(&base, "token", false).unwrap();

        let secret = client.get_secret("db/password", Some("v7")).await.unwrap();
        assert_eq!(secret.name, "db/password");
        assert_eq!(secret.version_id, "v7");
        assert_eq!(secret.secret_string.as_deref(), Some("hunter2"));
        assert_eq!(secret.version_stages, vec!["AWSCURRENT"]);
    }

    #[tokio::test]
    async fn test_get_secret_surfaces_extension_errors() {
        let base = spawn_extension().await;
        let client = SecretsExtensionClient::with_base_url(&base, "wrong", false).unwrap();

        let err = client.get_secret("db/password", None).await.unwrap_err();
        assert!(matches!(err, Error::Extension(e) if e.status_code() == Some(403)));
    }
}
