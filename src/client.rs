//! Defines the global AWS clients and the two outbound calls made per
//! invocation: the launch-configuration fetch and the task launch.

use crate::launch::{ConfigStatus, LaunchConfig, TaskLaunch};
use anyhow::{anyhow, Context, Result};
use aws_config::from_env;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_ecs::config::Region;
use aws_sdk_ecs::operation::run_task::RunTaskOutput;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, KeyValuePair, LaunchType,
    NetworkConfiguration, Task, TaskOverride,
};
use aws_sdk_ssm::types::Parameter;
use aws_smithy_types_convert::date_time::DateTimeExt;
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use tracing::warn;

/// Value reported as the task starter in every launch request.
const STARTED_BY: &str = "lambda/digitized_av_trigger";

/// The AWS service clients used by the trigger.
pub struct Clients {
    /// Parameter-store client, for the launch configuration.
    pub ssm: aws_sdk_ssm::Client,

    /// Orchestration client, for task launches.
    pub ecs: aws_sdk_ecs::Client,
}

/// Fold a page of parameters into the configuration mapping. The last
/// path segment of each parameter name becomes the configuration key.
fn collect_parameters(values: &mut HashMap<String, String>, parameters: &[Parameter]) {
    for parameter in parameters {
        if let (Some(name), Some(value)) = (parameter.name(), parameter.value()) {
            let key = name.rsplit('/').next().unwrap_or(name);
            values.insert(String::from(key), String::from(value));
        }
    }
}

/// Fetch the launch configuration stored under the given path. The
/// fetch never fails the invocation: errors are logged and recorded
/// in the returned status, and the invocation proceeds with whatever
/// was retrieved.
pub async fn fetch_launch_config(client: &aws_sdk_ssm::Client, path: &str) -> LaunchConfig {
    let mut values = HashMap::new();
    let mut next: Option<String> = None;
    loop {
        let mut operation = client
            .get_parameters_by_path()
            .path(path)
            .recursive(false)
            .with_decryption(true);
        if let Some(token) = &next {
            operation = operation.next_token(token);
        }
        match operation.send().await {
            Ok(response) => {
                collect_parameters(&mut values, response.parameters().unwrap_or_default());
                next = response.next_token().map(String::from);
                if next.is_none() {
                    return LaunchConfig::loaded(values);
                }
            }
            Err(e) => {
                warn!(
                    "Failed to fetch launch configuration under {:?}: {}",
                    path, e
                );
                let reason = e.to_string();
                let status = if values.is_empty() {
                    ConfigStatus::Failed(reason)
                } else {
                    ConfigStatus::Partial(reason)
                };
                return LaunchConfig { values, status };
            }
        }
    }
}

/// Submit a single task launch to the orchestration API: one Fargate
/// task, placed in the configured subnet without a public IP, with
/// the plan's environment applied to the container named like the
/// task definition.
pub async fn run_task(client: &aws_sdk_ecs::Client, task: &TaskLaunch) -> Result<RunTaskOutput> {
    let mut container = ContainerOverride::builder().name(&task.task_definition);
    for (name, value) in &task.environment {
        container = container.environment(KeyValuePair::builder().name(name).value(value).build());
    }
    client
        .run_task()
        .cluster(&task.cluster)
        .task_definition(&task.task_definition)
        .count(1)
        .launch_type(LaunchType::Fargate)
        .started_by(STARTED_BY)
        .network_configuration(
            NetworkConfiguration::builder()
                .awsvpc_configuration(
                    AwsVpcConfiguration::builder()
                        .subnets(&task.subnet)
                        .assign_public_ip(AssignPublicIp::Disabled)
                        .build(),
                )
                .build(),
        )
        .overrides(TaskOverride::builder().container_overrides(container.build()).build())
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to launch task {:?} on cluster {:?}",
                task.task_definition, task.cluster
            )
        })
}

/// Render one launched task for the invocation response.
fn describe_task(task: &Task) -> Value {
    json!({
        "taskArn": task.task_arn(),
        "taskDefinitionArn": task.task_definition_arn(),
        "clusterArn": task.cluster_arn(),
        "lastStatus": task.last_status(),
        "startedBy": task.started_by(),
        "createdAt": task
            .created_at()
            .and_then(|t| t.to_chrono_utc().ok())
            .map(|t| t.to_rfc3339()),
    })
}

/// Render the orchestration API's response as a JSON value, with
/// timestamps as strings.
pub fn describe_run(output: &RunTaskOutput) -> Value {
    json!({
        "tasks": output
            .tasks()
            .unwrap_or_default()
            .iter()
            .map(describe_task)
            .collect::<Vec<_>>(),
        "failures": output
            .failures()
            .unwrap_or_default()
            .iter()
            .map(|failure| json!({
                "arn": failure.arn(),
                "reason": failure.reason(),
                "detail": failure.detail(),
            }))
            .collect::<Vec<_>>(),
    })
}

/// Global client instances.
static CURRENT: OnceCell<Clients> = OnceCell::new();

/// Initialize the global clients, honoring an endpoint override and
/// falling back to the configured region when the environment
/// provides none.
pub async fn init(fallback_region: String) -> Result<()> {
    let region = RegionProviderChain::default_provider().or_else(Region::new(fallback_region));
    let endpoint_url_var = env::var("AWS_ENDPOINT_URL");
    let config = if let Ok(endpoint_url) = endpoint_url_var {
        from_env()
            .region(region)
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .load()
    } else {
        from_env().region(region).load()
    }
    .await;
    let clients = Clients {
        ssm: aws_sdk_ssm::Client::new(&config),
        ecs: aws_sdk_ecs::Client::new(&config),
    };
    CURRENT
        .set(clients)
        .map_err(|_| anyhow!("client::CURRENT was already initialized"))
}

/// Get the current clients, or panic if they haven't been initialized.
pub fn current() -> &'static Clients {
    CURRENT.get().expect("clients are not initialized")
}
