//! Defines the read-only application state and the dispatch logic
//! that turns a classified trigger into a task launch.

use crate::client;
use crate::conf::Settings;
use crate::launch::{LaunchConfig, Outcome, Plan, TaskLaunch};
use crate::trigger::{media_format, Trigger};
use anyhow::{anyhow, Result};
use envy::from_env;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use tracing::{info, instrument};

/// Task definition launched for new uploads.
const VALIDATION_TASK: &str = "digitized_av_validation";

/// Task definition launched for approved quality-control outcomes.
const PACKAGING_TASK: &str = "digitized_av_packaging";

/// An App is an initialized application state, derived from
/// settings. This is only useful to pre-compute stuff that will be
/// used constantly.
pub struct App {
    /// The original settings.
    pub settings: Settings,

    /// The parameter-store path holding the launch configuration.
    pub parameter_path: String,
}

impl App {
    /// Initialize an App instance given a settings struct. Consumes
    /// the settings struct.
    pub fn new(settings: Settings) -> Result<Self> {
        if settings.env.is_empty() || settings.app_config_path.is_empty() {
            return Err(anyhow!(
                "both ENV and APP_CONFIG_PATH must be non-empty \
                 to form a parameter-store path"
            ));
        }
        let parameter_path = format!("/{}/{}", settings.env, settings.app_config_path);
        Ok(App {
            settings,
            parameter_path,
        })
    }

    /// Derive the plan for a trigger. Upload events always launch the
    /// validation task; approval events launch the packaging task
    /// only for successful quality-control outcomes, and are skipped
    /// otherwise.
    pub fn plan(&self, trigger: &Trigger, config: &LaunchConfig) -> Result<Plan> {
        match trigger {
            Trigger::Upload { bucket, key } => {
                let format = media_format(bucket)?;
                Ok(Plan::Launch(TaskLaunch {
                    task_definition: String::from(VALIDATION_TASK),
                    cluster: config.require("ECS_CLUSTER")?.to_string(),
                    subnet: config.require("ECS_SUBNET")?.to_string(),
                    environment: vec![
                        (String::from("FORMAT"), String::from(format)),
                        (String::from("AWS_SOURCE_BUCKET"), bucket.clone()),
                        (String::from("SOURCE_FILENAME"), key.clone()),
                    ],
                }))
            }
            Trigger::Approval(attributes) => {
                let service = attribute(attributes, "service");
                let outcome = attribute(attributes, "outcome");
                if service != "qc" || outcome != "SUCCESS" {
                    return Ok(Plan::Skip(format!(
                        "nothing to do for service {:?} with outcome {:?}",
                        service, outcome
                    )));
                }
                Ok(Plan::Launch(TaskLaunch {
                    task_definition: String::from(PACKAGING_TASK),
                    cluster: config.require("ECS_CLUSTER")?.to_string(),
                    subnet: config.require("ECS_SUBNET")?.to_string(),
                    environment: vec![
                        (
                            String::from("FORMAT"),
                            require_attribute(attributes, "format")?,
                        ),
                        (
                            String::from("REFID"),
                            require_attribute(attributes, "refid")?,
                        ),
                        (
                            String::from("RIGHTS_IDS"),
                            require_attribute(attributes, "rights_ids")?,
                        ),
                    ],
                }))
            }
        }
    }

    /// Handle one classified trigger: fetch the launch configuration,
    /// derive the plan, and submit the launch if there is one.
    #[instrument(skip(self, clients))]
    pub async fn handle(&self, trigger: &Trigger, clients: &client::Clients) -> Result<Outcome> {
        let config = client::fetch_launch_config(&clients.ssm, &self.parameter_path).await;
        match self.plan(trigger, &config)? {
            Plan::Skip(reason) => {
                info!("Skipping event: {}", reason);
                Ok(Outcome::Skipped { reason })
            }
            Plan::Launch(task) => {
                info!(
                    "Launching task {:?} on cluster {:?} with environment {:?}",
                    task.task_definition, task.cluster, task.environment
                );
                let output = client::run_task(&clients.ecs, &task).await?;
                Ok(Outcome::Launched {
                    response: client::describe_run(&output),
                })
            }
        }
    }
}

/// Read an attribute value, defaulting to the empty string.
fn attribute<'a>(attributes: &'a HashMap<String, String>, name: &str) -> &'a str {
    attributes.get(name).map(String::as_str).unwrap_or_default()
}

/// Read an attribute value that the launch cannot proceed without.
fn require_attribute(attributes: &HashMap<String, String>, name: &str) -> Result<String> {
    attributes
        .get(name)
        .cloned()
        .ok_or_else(|| anyhow!("approval notification is missing the {:?} attribute", name))
}

/// Global App instance.
static CURRENT: OnceCell<App> = OnceCell::new();

/// Initialize the global App instance.
pub fn init() -> Result<()> {
    let settings = from_env()?;
    let app = App::new(settings)?;
    CURRENT
        .set(app)
        .map_err(|_| anyhow!("app::CURRENT was already initialized"))
}

/// Get the current App instance, or panic if it hasn't been
/// initialized.
pub fn current() -> &'static App {
    CURRENT.get().expect("app is not initialized")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::ConfigStatus;
    use crate::trigger::FORMAT_MAP;

    fn test_app() -> App {
        App::new(Settings {
            env: String::from("prod"),
            app_config_path: String::from("digitized_av_trigger"),
            aws_region: String::from("us-east-1"),
        })
        .unwrap()
    }

    fn test_config() -> LaunchConfig {
        LaunchConfig::loaded(HashMap::from([
            (String::from("ECS_CLUSTER"), String::from("av-cluster")),
            (String::from("ECS_SUBNET"), String::from("subnet-0a1b2c3d")),
        ]))
    }

    fn launch(plan: Plan) -> TaskLaunch {
        match plan {
            Plan::Launch(task) => task,
            Plan::Skip(reason) => panic!("expected a launch, got a skip: {}", reason),
        }
    }

    #[test]
    fn builds_the_parameter_path() {
        assert_eq!(test_app().parameter_path, "/prod/digitized_av_trigger");
    }

    #[test]
    fn rejects_empty_path_segments() {
        assert!(App::new(Settings {
            env: String::new(),
            app_config_path: String::from("digitized_av_trigger"),
            aws_region: String::from("us-east-1"),
        })
        .is_err());
    }

    #[test]
    fn uploads_launch_validation_with_the_mapped_format() {
        let app = test_app();
        for (bucket, format) in FORMAT_MAP {
            let plan = app
                .plan(
                    &Trigger::Upload {
                        bucket: String::from(*bucket),
                        key: String::from("sample.mov"),
                    },
                    &test_config(),
                )
                .unwrap();
            let task = launch(plan);
            assert_eq!(task.task_definition, "digitized_av_validation");
            assert_eq!(
                task.environment[0],
                (String::from("FORMAT"), String::from(*format))
            );
        }
    }

    #[test]
    fn upload_environment_matches_the_event() {
        let plan = test_app()
            .plan(
                &Trigger::Upload {
                    bucket: String::from("rac-prod-av-upload-audio"),
                    key: String::from("foo.wav"),
                },
                &test_config(),
            )
            .unwrap();
        let task = launch(plan);
        assert_eq!(task.task_definition, "digitized_av_validation");
        assert_eq!(task.cluster, "av-cluster");
        assert_eq!(task.subnet, "subnet-0a1b2c3d");
        assert_eq!(
            task.environment,
            vec![
                (String::from("FORMAT"), String::from("audio")),
                (
                    String::from("AWS_SOURCE_BUCKET"),
                    String::from("rac-prod-av-upload-audio")
                ),
                (String::from("SOURCE_FILENAME"), String::from("foo.wav")),
            ]
        );
    }

    #[test]
    fn unmapped_buckets_fail_the_plan() {
        let result = test_app().plan(
            &Trigger::Upload {
                bucket: String::from("rac-prod-av-upload-film"),
                key: String::from("reel.mkv"),
            },
            &test_config(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn unapproved_outcomes_are_skipped() {
        let app = test_app();
        // A skip must not depend on the launch configuration at all.
        let unavailable = LaunchConfig {
            values: HashMap::new(),
            status: ConfigStatus::Failed(String::from("timed out")),
        };
        for attributes in [
            HashMap::from([
                (String::from("service"), String::from("digitization")),
                (String::from("outcome"), String::from("SUCCESS")),
            ]),
            HashMap::from([
                (String::from("service"), String::from("qc")),
                (String::from("outcome"), String::from("FAILURE")),
            ]),
            HashMap::new(),
        ] {
            match app.plan(&Trigger::Approval(attributes), &unavailable).unwrap() {
                Plan::Skip(reason) => assert!(reason.contains("nothing to do")),
                Plan::Launch(task) => panic!("unexpected launch of {:?}", task),
            }
        }
    }

    #[test]
    fn approved_outcomes_launch_packaging() {
        let plan = test_app()
            .plan(
                &Trigger::Approval(HashMap::from([
                    (String::from("service"), String::from("qc")),
                    (String::from("outcome"), String::from("SUCCESS")),
                    (String::from("format"), String::from("video")),
                    (String::from("refid"), String::from("8c258cb")),
                    (String::from("rights_ids"), String::from("1 2 3")),
                ])),
                &test_config(),
            )
            .unwrap();
        let task = launch(plan);
        assert_eq!(task.task_definition, "digitized_av_packaging");
        assert_eq!(
            task.environment,
            vec![
                (String::from("FORMAT"), String::from("video")),
                (String::from("REFID"), String::from("8c258cb")),
                (String::from("RIGHTS_IDS"), String::from("1 2 3")),
            ]
        );
    }

    #[test]
    fn approvals_missing_attributes_fail_the_plan() {
        let result = test_app().plan(
            &Trigger::Approval(HashMap::from([
                (String::from("service"), String::from("qc")),
                (String::from("outcome"), String::from("SUCCESS")),
            ])),
            &test_config(),
        );
        assert!(result.unwrap_err().to_string().contains("format"));
    }

    #[test]
    fn uploads_without_configuration_report_the_fetch_failure() {
        let unavailable = LaunchConfig {
            values: HashMap::new(),
            status: ConfigStatus::Failed(String::from("access denied")),
        };
        let error = test_app()
            .plan(
                &Trigger::Upload {
                    bucket: String::from("rac-prod-av-upload-audio"),
                    key: String::from("foo.wav"),
                },
                &unavailable,
            )
            .unwrap_err();
        assert!(error.to_string().contains("access denied"));
    }
}
