//! S3 listing, downloads and uploads.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, error};

use aws_sdk_s3::primitives::ByteStream;

pub use aws_sdk_s3::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Error, Result};

/// Size of each ranged GET issued by [`download_large_file`].
pub const PART_SIZE: u64 = 10 * 1024 * 1024;

/// Ranged GETs in flight at once.
pub const MAX_CONCURRENT_PARTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct S3File {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Path-style addressing is forced against the local endpoint, which does
/// not resolve bucket subdomains.
pub async fn new_client() -> Client {
    let config = AwsConfig::load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(config.sdk_config())
        .force_path_style(config.is_local())
        .build();
    Client::from_conf(s3_config)
}

/// Every object under `prefix`, following continuation tokens.
pub async fn list_bucket_objects(client: &Client, bucket: &str, prefix: &str) -> Result<Vec<S3File>> {
    let mut files = Vec::new();
    let mut continuation = None;

    loop {
        let output = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation.take())
            .send()
            .await
            .map_err(sdk_error("ListObjectsV2"))
            .inspect_err(|e| error!(error = %e, bucket, "failed to read bucket content"))?;

        files.extend(output.contents.unwrap_or_default().into_iter().map(|object| S3File {
            name: object.key.unwrap_or_default(),
            created_at: object
                .last_modified
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
                .unwrap_or_default(),
        }));

        match output.next_continuation_token {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    Ok(files)
}

pub async fn download_file(client: &Client, bucket: &str, key: &str) -> Result<Vec<u8>> {
    let output = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(sdk_error("GetObject"))?;
    let bytes = output.body.collect().await?;
    Ok(bytes.into_bytes().to_vec())
}

/// Download an object with concurrent ranged GETs of [`PART_SIZE`] bytes.
pub async fn download_large_file(client: &Client, bucket: &str, key: &str) -> Result<Vec<u8>> {
    download_in_parts(client, bucket, key, PART_SIZE).await
}

async fn download_in_parts(
    client: &Client,
    bucket: &str,
    key: &str,
    part_size: u64,
) -> Result<Vec<u8>> {
    let head = client
        .head_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(sdk_error("HeadObject"))?;
    let size = head
        .content_length
        .and_then(|len| u64::try_from(len).ok())
        .ok_or(Error::MissingField("ContentLength"))?;

    let ranges = part_ranges(size, part_size);
    debug!(bucket, key, size, parts = ranges.len(), "downloading in parts");

    let mut buffer = vec![0u8; size as usize];
    let mut parts = stream::iter(ranges)
        .map(|(start, end)| async move {
            let output = client
                .get_object()
                .bucket(bucket)
                .key(key)
                .range(format!("bytes={start}-{end}"))
                .send()
                .await
                .map_err(sdk_error("GetObject"))?;
            let bytes = output.body.collect().await?.into_bytes();
            Ok::<_, Error>((start, bytes))
        })
        .buffer_unordered(MAX_CONCURRENT_PARTS);

    while let Some((start, bytes)) = parts.try_next().await? {
        let start = start as usize;
        let end = (start + bytes.len()).min(buffer.len());
        buffer[start..end].copy_from_slice(&bytes[..end - start]);
    }

    Ok(buffer)
}

/// Inclusive byte ranges covering `size` bytes.
fn part_ranges(size: u64, part_size: u64) -> Vec<(u64, u64)> {
    (0..size)
        .step_by(part_size.max(1) as usize)
        .map(|start| (start, (start + part_size).min(size) - 1))
        .collect()
}

pub async fn upload_file(client: &Client, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(sdk_error("PutObject"))?;
    Ok(())
}
