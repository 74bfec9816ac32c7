mod app;
mod client;
mod conf;
mod launch;
mod trigger;

use anyhow::{anyhow, Result};
use lambda_runtime::{run, service_fn, LambdaEvent};
use launch::Outcome;
use trigger::{Trigger, TriggerEvent};

/// Classify the inbound event and hand it to the dispatcher.
async fn function_handler(event: LambdaEvent<TriggerEvent>) -> Result<Outcome> {
    let trigger = Trigger::from_event(event.payload)?;
    app::current().handle(&trigger, client::current()).await
}

/// Run an AWS Lambda function that reacts to upload and approval
/// notifications by launching the matching containerized task with
/// environment parameters derived from the event.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init()?;
    client::init(app::current().settings.aws_region.clone()).await?;

    run(service_fn(function_handler))
        .await
        .map_err(|e| anyhow!("{:?}", e))
}
