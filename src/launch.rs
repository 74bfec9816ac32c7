//! Defines the launch-side data model: the configuration fetched per
//! invocation, the task-launch plan derived from a trigger, and the
//! outcome returned to the invoking platform.

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// How much of the launch configuration was actually retrieved. The
/// fetch itself never fails the invocation; this status is carried
/// along so that a later missing-key error can name the real cause.
#[derive(Debug)]
pub enum ConfigStatus {
    /// Every page of parameters was retrieved.
    Loaded,

    /// The fetch was interrupted after at least one page.
    Partial(String),

    /// Nothing could be retrieved.
    Failed(String),
}

/// Launch configuration: a flat key-value mapping read from the
/// parameter store, plus the status of the fetch that produced it.
#[derive(Debug)]
pub struct LaunchConfig {
    pub values: HashMap<String, String>,
    pub status: ConfigStatus,
}

impl LaunchConfig {
    /// A fully loaded configuration.
    pub fn loaded(values: HashMap<String, String>) -> Self {
        LaunchConfig {
            values,
            status: ConfigStatus::Loaded,
        }
    }

    /// Look up a required key. The error points at the fetch failure
    /// when there was one, since that's the actual problem.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| match &self.status {
                ConfigStatus::Loaded => {
                    anyhow!("launch configuration has no {:?} parameter", key)
                }
                ConfigStatus::Partial(reason) => anyhow!(
                    "launch configuration has no {:?} parameter \
                     (fetch was interrupted: {})",
                    key,
                    reason
                ),
                ConfigStatus::Failed(reason) => anyhow!(
                    "launch configuration is unavailable ({}), \
                     so the {:?} parameter is missing",
                    reason,
                    key
                ),
            })
    }
}

/// A fully derived task-launch request, ready to submit.
#[derive(Debug, PartialEq)]
pub struct TaskLaunch {
    /// Task-definition name; the container override targets the
    /// container with the same name.
    pub task_definition: String,

    /// Cluster to launch on, from the launch configuration.
    pub cluster: String,

    /// Subnet for awsvpc placement, from the launch configuration.
    pub subnet: String,

    /// Environment overrides passed to the container.
    pub environment: Vec<(String, String)>,
}

/// What an invocation decided to do with its trigger.
#[derive(Debug)]
pub enum Plan {
    /// Submit a task launch.
    Launch(TaskLaunch),

    /// Do nothing; the reason is reported back to the caller.
    Skip(String),
}

/// The invocation response, serialized by the runtime. Both paths
/// share one tagged shape instead of mixing plain text with
/// structured responses.
#[derive(Debug, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Outcome {
    /// The event required no task launch.
    Skipped { reason: String },

    /// A task launch was submitted; `response` describes what the
    /// orchestration API returned.
    Launched { response: Value },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reads_present_keys() {
        let config = LaunchConfig::loaded(HashMap::from([(
            String::from("ECS_CLUSTER"),
            String::from("default"),
        )]));
        assert_eq!(config.require("ECS_CLUSTER").unwrap(), "default");
    }

    #[test]
    fn require_reports_missing_keys() {
        let config = LaunchConfig::loaded(HashMap::new());
        let error = config.require("ECS_SUBNET").unwrap_err();
        assert!(error.to_string().contains("ECS_SUBNET"));
    }

    #[test]
    fn require_surfaces_the_fetch_failure() {
        let config = LaunchConfig {
            values: HashMap::new(),
            status: ConfigStatus::Failed(String::from("connection refused")),
        };
        let error = config.require("ECS_CLUSTER").unwrap_err();
        assert!(error.to_string().contains("connection refused"));
    }

    #[test]
    fn outcomes_serialize_with_a_disposition_tag() {
        let skipped = serde_json::to_value(Outcome::Skipped {
            reason: String::from("nothing to do"),
        })
        .unwrap();
        assert_eq!(skipped["disposition"], "skipped");
        assert_eq!(skipped["reason"], "nothing to do");

        let launched = serde_json::to_value(Outcome::Launched {
            response: serde_json::json!({"tasks": []}),
        })
        .unwrap();
        assert_eq!(launched["disposition"], "launched");
    }
}
