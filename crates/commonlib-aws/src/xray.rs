//! X-Ray trace queries.

use std::time::SystemTime;

use aws_smithy_types::DateTime;

pub use aws_sdk_xray::types::TraceSummary;
pub use aws_sdk_xray::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// First page of trace summaries between `start` and `end`.
pub async fn get_trace_summaries(
    client: &Client,
    start: SystemTime,
    end: SystemTime,
) -> Result<Vec<TraceSummary>> {
    let output = client
        .get_trace_summaries()
        .start_time(DateTime::from(start))
        .end_time(DateTime::from(end))
        .send()
        .await
        .map_err(sdk_error("GetTraceSummaries"))?;
    Ok(output.trace_summaries.unwrap_or_default())
}
