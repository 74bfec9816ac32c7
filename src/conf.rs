//! Defines configuration as read from the environment.

use serde::Deserialize;

/// Default `aws_region` value.
fn default_aws_region() -> String {
    String::from("us-east-1")
}

/// The trigger reacts to upload and approval notifications and
/// launches the matching ECS task. The configuration must be given as
/// environment variables; the launch parameters themselves (cluster,
/// subnet) live in SSM Parameter Store and are fetched per
/// invocation.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Name of the deployment environment (e.g. `dev`, `prod`). Forms
    /// the first segment of the Parameter Store path.
    pub env: String,

    /// Application segment of the Parameter Store path. Launch
    /// parameters are read from `/{env}/{app_config_path}`.
    pub app_config_path: String,

    /// Region used when the execution environment doesn't provide
    /// one. The Lambda platform always sets `AWS_REGION`, so this
    /// mostly matters for local runs.
    #[serde(default = "default_aws_region")]
    pub aws_region: String,
}
