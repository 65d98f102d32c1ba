//! Shared SDK configuration.
//!
//! Inside Lambda the default credential and region chain is used. Anywhere
//! else clients are pointed at a LocalStack endpoint so services can be run
//! and tested on a developer machine.

use aws_config::BehaviorVersion;
use aws_types::region::Region;
use aws_types::SdkConfig;
use tracing::debug;

use commonlib_core::env::non_empty_var;
use commonlib_core::is_running_as_lambda;

/// Region used outside Lambda when `AWS_REGION` is unset.
pub const DEFAULT_REGION: &str = "eu-north-1";

/// Variable overriding the local endpoint.
pub const LOCALSTACK_ENDPOINT_VAR: &str = "LOCALSTACK_ENDPOINT";

pub const DEFAULT_LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

#[derive(Debug, Clone)]
pub struct AwsConfig {
    sdk: SdkConfig,
    local: bool,
}

impl AwsConfig {
    /// Default chain in Lambda, LocalStack elsewhere.
    pub async fn load() -> Self {
        if is_running_as_lambda() {
            return Self::load_defaults().await;
        }

        let region = non_empty_var("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = non_empty_var(LOCALSTACK_ENDPOINT_VAR)
            .unwrap_or_else(|| DEFAULT_LOCALSTACK_ENDPOINT.to_string());
        debug!(region = %region, endpoint = %endpoint, "using local AWS endpoint");

        let sdk = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .endpoint_url(endpoint)
            .load()
            .await;
        Self { sdk, local: true }
    }

    /// Always the default chain, wherever the process runs.
    pub async fn load_defaults() -> Self {
        let sdk = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self { sdk, local: false }
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk
    }

    /// `true` when clients talk to the local endpoint.
    pub fn is_local(&self) -> bool {
        self.local
    }
}

impl From<SdkConfig> for AwsConfig {
    fn from(sdk: SdkConfig) -> Self {
        Self { sdk, local: false }
    }
}
