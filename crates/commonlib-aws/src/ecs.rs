//! ECS clusters, services and task definitions.

use std::collections::HashMap;

use aws_sdk_ecs::operation::describe_clusters::DescribeClustersOutput;
use aws_sdk_ecs::operation::describe_container_instances::DescribeContainerInstancesOutput;
use aws_sdk_ecs::operation::describe_services::DescribeServicesOutput;
use aws_sdk_ecs::operation::describe_task_definition::DescribeTaskDefinitionOutput;
use aws_sdk_ecs::operation::describe_tasks::DescribeTasksOutput;
use aws_sdk_ecs::operation::list_clusters::ListClustersOutput;
use aws_sdk_ecs::operation::list_container_instances::ListContainerInstancesOutput;
use aws_sdk_ecs::operation::list_services::ListServicesOutput;
use aws_sdk_ecs::operation::list_tasks::ListTasksOutput;
use aws_sdk_ecs::operation::update_service::UpdateServiceOutput;
use aws_sdk_ecs::types::{ClusterField, ServiceField, Tag};
use tracing::{debug, error, info};

pub use aws_sdk_ecs::Client;

use crate::config::AwsConfig;
use crate::error::{sdk_error, Error, Result};

const MAX_SERVICES: i32 = 100;

/// ECS is never emulated locally, so the default chain is always used.
pub async fn new_client() -> Client {
    Client::new(AwsConfig::load_defaults().await.sdk_config())
}

pub async fn list_clusters(client: &Client) -> Result<ListClustersOutput> {
    client
        .list_clusters()
        .send()
        .await
        .map_err(sdk_error("ListClusters"))
}

pub async fn list_container_instances(
    client: &Client,
    cluster: &str,
) -> Result<ListContainerInstancesOutput> {
    client
        .list_container_instances()
        .cluster(cluster)
        .send()
        .await
        .map_err(sdk_error("ListContainerInstances"))
}

pub async fn describe_container_instances(
    client: &Client,
    cluster: &str,
    container_instance_arns: Vec<String>,
) -> Result<DescribeContainerInstancesOutput> {
    client
        .describe_container_instances()
        .cluster(cluster)
        .set_container_instances(Some(container_instance_arns))
        .send()
        .await
        .map_err(sdk_error("DescribeContainerInstances"))
}

pub async fn list_tasks(client: &Client, cluster: &str, service: &str) -> Result<ListTasksOutput> {
    client
        .list_tasks()
        .cluster(cluster)
        .service_name(service)
        .send()
        .await
        .map_err(sdk_error("ListTasks"))
}

pub async fn describe_tasks(
    client: &Client,
    cluster: &str,
    task_arns: Vec<String>,
) -> Result<DescribeTasksOutput> {
    client
        .describe_tasks()
        .cluster(cluster)
        .set_tasks(Some(task_arns))
        .send()
        .await
        .map_err(sdk_error("DescribeTasks"))
}

/// Up to 100 service ARNs of `cluster`.
pub async fn list_services(client: &Client, cluster: &str) -> Result<ListServicesOutput> {
    client
        .list_services()
        .cluster(cluster)
        .max_results(MAX_SERVICES)
        .send()
        .await
        .map_err(sdk_error("ListServices"))
}

pub async fn describe_clusters(
    client: &Client,
    cluster_arns: Vec<String>,
    include: Vec<ClusterField>,
) -> Result<DescribeClustersOutput> {
    client
        .describe_clusters()
        .set_clusters(Some(cluster_arns))
        .set_include(Some(include))
        .send()
        .await
        .map_err(sdk_error("DescribeClusters"))
}

/// Describe services of `cluster`, tags included.
pub async fn describe_services(
    client: &Client,
    cluster: &str,
    services: Vec<String>,
) -> Result<DescribeServicesOutput> {
    client
        .describe_services()
        .cluster(cluster)
        .set_services(Some(services))
        .include(ServiceField::Tags)
        .send()
        .await
        .map_err(sdk_error("DescribeServices"))
}

pub async fn describe_ecs_service(
    client: &Client,
    cluster: &str,
    service: &str,
) -> Result<DescribeServicesOutput> {
    describe_services(client, cluster, vec![service.to_string()]).await
}

pub async fn describe_task_definition(
    client: &Client,
    task_definition_arn: &str,
) -> Result<DescribeTaskDefinitionOutput> {
    client
        .describe_task_definition()
        .task_definition(task_definition_arn)
        .send()
        .await
        .map_err(sdk_error("DescribeTaskDefinition"))
}

pub async fn tag_resource(
    client: &Client,
    resource_arn: &str,
    tags: &HashMap<String, String>,
) -> Result<()> {
    let tags = tags
        .iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build())
        .collect();

    client
        .tag_resource()
        .resource_arn(resource_arn)
        .set_tags(Some(tags))
        .send()
        .await
        .map_err(sdk_error("TagResource"))?;
    Ok(())
}

/// Deploy `image` to `service`.
///
/// The container whose current image mentions the service name gets the new
/// image in a fresh revision of the service's task definition, and the
/// service is pointed at that revision.
pub async fn update_ecs_service(
    client: &Client,
    cluster: &str,
    service: &str,
    image: &str,
) -> Result<UpdateServiceOutput> {
    let description = describe_ecs_service(client, cluster, service)
        .await
        .inspect_err(|e| error!(error = %e, "failed to describe ecs service"))?;
    let task_definition_arn = description
        .services
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|s| s.task_definition)
        .ok_or(Error::MissingField("Service.TaskDefinition"))?;

    let mut task_definition = describe_task_definition(client, &task_definition_arn)
        .await
        .inspect_err(|e| {
            error!(error = %e, arn = %task_definition_arn, "failed to read task definition")
        })?
        .task_definition
        .ok_or(Error::MissingField("TaskDefinition"))?;

    let mut containers = task_definition.container_definitions.take().unwrap_or_default();
    let container = containers
        .iter_mut()
        .find(|c| c.image.as_deref().is_some_and(|i| i.contains(service)))
        .ok_or_else(|| {
            error!(image, "failed to find container definition with matching image");
            Error::ContainerNotFound(image.to_string())
        })?;
    container.image = Some(image.to_string());

    let registered = client
        .register_task_definition()
        .set_container_definitions(Some(containers))
        .set_family(task_definition.family)
        .set_cpu(task_definition.cpu)
        .set_memory(task_definition.memory)
        .set_ephemeral_storage(task_definition.ephemeral_storage)
        .set_execution_role_arn(task_definition.execution_role_arn)
        .set_task_role_arn(task_definition.task_role_arn)
        .set_inference_accelerators(task_definition.inference_accelerators)
        .set_ipc_mode(task_definition.ipc_mode)
        .set_pid_mode(task_definition.pid_mode)
        .set_network_mode(task_definition.network_mode)
        .set_placement_constraints(task_definition.placement_constraints)
        .set_proxy_configuration(task_definition.proxy_configuration)
        .set_requires_compatibilities(task_definition.requires_compatibilities)
        .set_runtime_platform(task_definition.runtime_platform)
        .set_volumes(task_definition.volumes)
        .send()
        .await
        .map_err(sdk_error("RegisterTaskDefinition"))
        .inspect_err(|e| error!(error = %e, "failed to register new task definition"))?;
    let revision = registered
        .task_definition
        .and_then(|td| td.task_definition_arn)
        .ok_or(Error::MissingField("TaskDefinition.TaskDefinitionArn"))?;

    info!(service, cluster, revision = %revision, "updating service");
    client
        .update_service()
        .cluster(cluster)
        .service(service)
        .task_definition(revision)
        .send()
        .await
        .map_err(sdk_error("UpdateService"))
        .inspect_err(|e| error!(error = %e, "failed to update service"))
}

/// Restart the tasks of `service` by forcing a new deployment.
pub async fn stop_ecs_service(client: &Client, cluster: &str, service: &str) -> Result<()> {
    debug!(service, "trying to restart service");
    client
        .update_service()
        .cluster(cluster)
        .service(service)
        .force_new_deployment(true)
        .send()
        .await
        .map_err(sdk_error("UpdateService"))
        .inspect_err(|e| {
            error!(error = %e, "failed to update service with force new deployment")
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ecs::operation::register_task_definition::RegisterTaskDefinitionOutput;
    use aws_sdk_ecs::types::{ContainerDefinition, NetworkMode, Service, TaskDefinition};
    use aws_smithy_mocks::{mock, mock_client, Rule, RuleMode};

    fn describe_service_rule() -> Rule {
        mock!(Client::describe_services)
            .match_requests(|req| {
                req.cluster() == Some("main")
                    && req.services() == ["web"]
                    && req.include() == [ServiceField::Tags]
            })
            .then_output(|| {
                DescribeServicesOutput::builder()
                    .services(
                        Service::builder()
                            .service_name("web")
                            .task_definition("arn:task-definition/web:7")
                            .build(),
                    )
                    .build()
            })
    }

    fn describe_task_definition_rule() -> Rule {
        mock!(Client::describe_task_definition)
            .match_requests(|req| req.task_definition() == Some("arn:task-definition/web:7"))
            .then_output(|| {
                DescribeTaskDefinitionOutput::builder()
                    .task_definition(
                        TaskDefinition::builder()
                            .family("web")
                            .network_mode(NetworkMode::Awsvpc)
                            .container_definitions(
                                ContainerDefinition::builder()
                                    .name("sidecar")
                                    .image("datadog/agent:7")
                                    .build(),
                            )
                            .container_definitions(
                                ContainerDefinition::builder()
                                    .name("app")
                                    .image("123.dkr.ecr/web:1.0")
                                    .build(),
                            )
                            .build(),
                    )
                    .build()
            })
    }

    #[tokio::test]
    async fn test_update_ecs_service_registers_new_revision() {
        let register = mock!(Client::register_task_definition)
            .match_requests(|req| {
                let images: Vec<_> = req
                    .container_definitions()
                    .iter()
                    .filter_map(|c| c.image())
                    .collect();
                req.family() == Some("web")
                    && req.network_mode() == Some(&NetworkMode::Awsvpc)
                    && images == ["datadog/agent:7", "123.dkr.ecr/web:2.0"]
            })
            .then_output(|| {
                RegisterTaskDefinitionOutput::builder()
                    .task_definition(
                        TaskDefinition::builder()
                            .task_definition_arn("arn:task-definition/web:8")
                            .build(),
                    )
                    .build()
            });
        let update = mock!(Client::update_service)
            .match_requests(|req| {
                req.task_definition() == Some("arn:task-definition/web:8")
                    && req.service() == Some("web")
            })
            .then_output(|| UpdateServiceOutput::builder().build());
        let client = mock_client!(
            aws_sdk_ecs,
            RuleMode::MatchAny,
            &[
                &describe_service_rule(),
                &describe_task_definition_rule(),
                &register,
                &update
            ]
        );

        update_ecs_service(&client, "main", "web", "123.dkr.ecr/web:2.0")
            .await
            .unwrap();
        assert_eq!(register.num_calls(), 1);
        assert_eq!(update.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_update_ecs_service_reports_container_not_found() {
        let describe = mock!(Client::describe_services).then_output(|| {
            DescribeServicesOutput::builder()
                .services(
                    Service::builder()
                        .task_definition("arn:task-definition/web:7")
                        .build(),
                )
                .build()
        });
        let client = mock_client!(
            aws_sdk_ecs,
            RuleMode::MatchAny,
            &[&describe, &describe_task_definition_rule()]
        );

        let err = update_ecs_service(&client, "main", "api", "api:2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContainerNotFound(image) if image == "api:2"));
    }

    #[tokio::test]
    async fn test_stop_ecs_service_forces_deployment() {
        let rule = mock!(Client::update_service)
            .match_requests(|req| req.force_new_deployment() == Some(true))
            .then_output(|| UpdateServiceOutput::builder().build());
        let client = mock_client!(aws_sdk_ecs, &[&rule]);

        stop_ecs_service(&client, "main", "web").await.unwrap();
        assert_eq!(rule.num_calls(), 1);
    }
}
