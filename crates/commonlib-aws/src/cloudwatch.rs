//! CloudWatch Logs streams and ECS Container Insights metrics.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_sdk_cloudwatch::types::{Dimension, Metric, MetricDataQuery, MetricStat};
use aws_sdk_cloudwatchlogs::types::{LogStream, OrderBy, OutputLogEvent};
use aws_smithy_types::DateTime;
use serde::Serialize;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Result};

pub use aws_sdk_cloudwatch::Client;
pub use aws_sdk_cloudwatchlogs::Client as LogsClient;

const STREAM_LIMIT: i32 = 10;
const STREAM_MAX_AGE: Duration = Duration::from_secs(30 * 60);
const METRIC_WINDOW: Duration = Duration::from_secs(10 * 60);
const METRIC_PERIOD: i32 = 60;
const CONTAINER_INSIGHTS: &str = "ECS/ContainerInsights";

pub async fn new_client() -> Client {
    Client::new(AwsConfig::load().await.sdk_config())
}

/// Logs are always read from the real account.
pub async fn new_logs_client() -> LogsClient {
    LogsClient::new(AwsConfig::load_defaults().await.sdk_config())
}

/// Averaged Container Insights utilisation of an ECS service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub cpu_used: u32,
    pub cpu_reserved: u32,
    pub memory_used: u32,
    pub memory_reserved: u32,
}

/// The ten most recently written streams of `group` that received events in
/// the last 30 minutes.
///
/// When both `container_name` and `task_arn` are given, only streams whose
/// name mentions the container and the task id are kept.
pub async fn fetch_log_streams(
    client: &LogsClient,
    group: &str,
    container_name: Option<&str>,
    task_arn: Option<&str>,
) -> Result<Vec<LogStream>> {
    let output = client
        .describe_log_streams()
        .log_group_name(group)
        .order_by(OrderBy::LastEventTime)
        .limit(STREAM_LIMIT)
        .descending(true)
        .send()
        .await
        .map_err(sdk_error("DescribeLogStreams"))?;

    let since = millis_since_epoch(SystemTime::now() - STREAM_MAX_AGE);
    Ok(filter_log_streams(
        output.log_streams.unwrap_or_default(),
        since,
        container_name,
        task_arn,
    ))
}

fn filter_log_streams(
    streams: Vec<LogStream>,
    since_millis: i64,
    container_name: Option<&str>,
    task_arn: Option<&str>,
) -> Vec<LogStream> {
    let filter = match (container_name, task_arn) {
        (Some(container), Some(arn)) if !container.is_empty() && !arn.is_empty() => {
            Some((container, task_id(arn)))
        }
        _ => None,
    };

    streams
        .into_iter()
        .filter(|stream| stream.last_event_timestamp.unwrap_or(0) > since_millis)
        .filter(|stream| match filter {
            Some((container, task)) => {
                let name = stream.log_stream_name.as_deref().unwrap_or_default();
                name.contains(container) && name.contains(task)
            }
            None => true,
        })
        .collect()
}

fn task_id(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// Read the events of a stream written within `interval`.
///
/// Each page of events is returned separately, together with the forward
/// token to resume from. Passing a token reads forward from that position.
pub async fn fetch_cloudwatch_logs(
    client: &LogsClient,
    group: &str,
    stream: &str,
    next_token: Option<String>,
    interval: Duration,
) -> Result<(Vec<Vec<OutputLogEvent>>, Option<String>)> {
    let start = millis_since_epoch(SystemTime::now() - interval);
    let mut token = next_token;
    let mut pages = Vec::new();

    loop {
        let output = client
            .get_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .start_time(start)
            // A forward token is only honoured when reading from the head.
            .start_from_head(token.is_some())
            .set_next_token(token.clone())
            .send()
            .await
            .map_err(sdk_error("GetLogEvents"))?;

        let forward = output.next_forward_token;
        if token.is_some() && forward == token {
            break;
        }
        pages.push(output.events.unwrap_or_default());
        if forward.is_none() {
            break;
        }
        token = forward;
    }

    Ok((pages, token))
}

/// Average CPU and memory figures over the last ten minutes for the task
/// family `service` in `cluster`.
pub async fn fetch_cpu_and_memory_usage(
    client: &Client,
    cluster: &str,
    service: &str,
) -> Result<ResourceUsage> {
    let end = SystemTime::now();
    let start = end - METRIC_WINDOW;

    let mut request = client
        .get_metric_data()
        .start_time(DateTime::from(start))
        .end_time(DateTime::from(end));
    for (id, metric) in [
        ("mem_used", "MemoryUtilized"),
        ("mem_reserved", "MemoryReserved"),
        ("cpu_used", "CpuUtilized"),
        ("cpu_reserved", "CpuReserved"),
    ] {
        request = request.metric_data_queries(metric_query(id, metric, cluster, service));
    }

    let output = request.send().await.map_err(sdk_error("GetMetricData"))?;

    let mut usage = ResourceUsage::default();
    for result in output.metric_data_results.unwrap_or_default() {
        let values = result.values.unwrap_or_default();
        let mean = mean(&values);
        match result.id.as_deref() {
            Some("mem_used") => usage.memory_used = mean,
            Some("mem_reserved") => usage.memory_reserved = mean,
            Some("cpu_used") => usage.cpu_used = mean,
            Some("cpu_reserved") => usage.cpu_reserved = mean,
            _ => {}
        }
    }
    Ok(usage)
}

fn metric_query(id: &str, metric: &str, cluster: &str, service: &str) -> MetricDataQuery {
    let metric = Metric::builder()
        .namespace(CONTAINER_INSIGHTS)
        .metric_name(metric)
        .dimensions(
            Dimension::builder()
                .name("TaskDefinitionFamily")
                .value(service)
                .build(),
        )
        .dimensions(Dimension::builder().name("ClusterName").value(cluster).build())
        .build();

    let stat = MetricStat::builder()
        .metric(metric)
        .period(METRIC_PERIOD)
        .stat("Average")
        .build();

    MetricDataQuery::builder().id(id).metric_stat(stat).build()
}

fn mean(values: &[f64]) -> u32 {
    if values.is_empty() {
        return 0;
    }
    let total: f64 = values.iter().map(|v| v.trunc()).sum();
    (total / values.len() as f64) as u32
}

fn millis_since_epoch(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
