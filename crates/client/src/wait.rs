//! The four waits over HTTP, one client per call.

use fleet_core::{ops, DeploymentTarget, ProgressSink, WaitConfig, WaitError};

use crate::config::ServerConfig;
use crate::http::OrchestratorClient;

pub async fn wait_for_installation(
    bundle_id: &str,
    server: &ServerConfig,
    wait: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError> {
    let client = OrchestratorClient::new(server.clone())?;
    ops::wait_for_installation(&client, bundle_id, wait, progress).await
}

pub async fn wait_for_uninstallation(
    bundle_id: &str,
    server: &ServerConfig,
    wait: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError> {
    let client = OrchestratorClient::new(server.clone())?;
    ops::wait_for_uninstallation(&client, bundle_id, wait, progress).await
}

pub async fn wait_for_scale(
    bundle_id: &str,
    target_scale: u32,
    server: &ServerConfig,
    wait: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError> {
    let client = OrchestratorClient::new(server.clone())?;
    ops::wait_for_scale(&client, bundle_id, target_scale, wait, progress).await
}

/// Follows a single deployment or a whole batch to its terminal state.
pub async fn wait_for_deployment_complete(
    target: &DeploymentTarget,
    server: &ServerConfig,
    wait: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError> {
    let client = OrchestratorClient::new(server.clone())?;
    ops::wait_for_deployment_complete(&client, target, wait, progress).await
}
