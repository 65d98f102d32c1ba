//! Secrets Manager, through the SDK or the Lambda extension.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::error;

pub use aws_sdk_secretsmanager::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Error, Result};

pub mod extension;

pub use extension::{SecretData, SecretsExtensionClient};

const CURRENT_VERSION_STAGE: &str = "AWSCURRENT";

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// Current value of a secret.
///
/// Binary secrets are returned as the UTF-8 text of their base64-decoded
/// content.
pub async fn get_secret(client: &Client, name: &str) -> Result<String> {
    let output = client
        .get_secret_value()
        .secret_id(name)
        .version_stage(CURRENT_VERSION_STAGE)
        .send()
        .await
        .map_err(sdk_error("GetSecretValue"))
        .inspect_err(|e| {
            if let Error::Sdk { code, message, .. } = e {
                error!(code = ?code, message = %message, "call to secretsmanager failed");
            }
        })?;

    if let Some(secret) = output.secret_string {
        return Ok(secret);
    }

    let binary = output.secret_binary.ok_or(Error::MissingField("SecretBinary"))?;
    let decoded = STANDARD
        .decode(binary.as_ref())
        .inspect_err(|e| error!(error = %e, "base64 decode error"))?;
    Ok(String::from_utf8(decoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_secretsmanager::operation::get_secret_value::{
        GetSecretValueError, GetSecretValueOutput,
    };
    use aws_sdk_secretsmanager::primitives::Blob;
    use aws_sdk_secretsmanager::types::error::ResourceNotFoundException;
    use aws_smithy_mocks::{mock, mock_client};

    #[tokio::test]
    async fn test_get_secret_string() {
        let rule = mock!(Client::get_secret_value)
            .match_requests(|req| {
                req.secret_id() == Some("db") && req.version_stage() == Some("AWSCURRENT")
            })
            .then_output(|| {
                GetSecretValueOutput::builder()
                    .secret_string("hunter2")
                    .build()
            });
        let client = mock_client!(aws_sdk_secretsmanager, &[&rule]);

        assert_eq!(get_secret(&client, "db").await.unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn test_get_secret_decodes_binary() {
        let rule = mock!(Client::get_secret_value).then_output(|| {
            GetSecretValueOutput::builder()
                .secret_binary(Blob::new(STANDARD.encode("binary secret")))
                .build()
        });
        let client = mock_client!(aws_sdk_secretsmanager, &[&rule]);

        assert_eq!(get_secret(&client, "db").await.unwrap(), "binary secret");
    }

    #[tokio::test]
    async fn test_get_secret_reports_service_code() {
        let rule = mock!(Client::get_secret_value).then_error(|| {
            GetSecretValueError::ResourceNotFoundException(
                ResourceNotFoundException::builder()
                    .message("no such secret")
                    .build(),
            )
        });
        let client = mock_client!(aws_sdk_secretsmanager, &[&rule]);

        let err = get_secret(&client, "missing").await.unwrap_err();
        assert!(matches!(err, Error::Sdk { operation: "GetSecretValue", .. }));
    }
}
