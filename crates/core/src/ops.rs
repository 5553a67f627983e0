//! The four caller-facing waits, generic over any transport.

use std::fmt;

use crate::error::WaitError;
use crate::progress::ProgressSink;
use crate::source::{EventSubscriber, SnapshotFetcher};
use crate::wait::{
    wait_until, BatchTarget, BundleCountTarget, InstallMode, ScaleTarget, SingleDeploymentTarget,
    WaitConfig,
};

/// What `wait_for_deployment_complete` follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentTarget {
    /// One deployment id.
    Deployment(String),
    /// A batch id, as returned when a deployment is requested.
    Batch(String),
}

impl DeploymentTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Deployment(id) | Self::Batch(id) => id,
        }
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployment(id) => write!(f, "deployment {id}"),
            Self::Batch(id) => write!(f, "deployment batch {id}"),
        }
    }
}

pub async fn wait_for_installation<C>(
    client: &C,
    bundle_id: &str,
    config: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError>
where
    C: SnapshotFetcher + EventSubscriber + ?Sized,
{
    let target = BundleCountTarget::new(client, bundle_id, InstallMode::Install);
    wait_until(&target, client, config, progress).await
}

pub async fn wait_for_uninstallation<C>(
    client: &C,
    bundle_id: &str,
    config: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError>
where
    C: SnapshotFetcher + EventSubscriber + ?Sized,
{
    let target = BundleCountTarget::new(client, bundle_id, InstallMode::Uninstall);
    wait_until(&target, client, config, progress).await
}

pub async fn wait_for_scale<C>(
    client: &C,
    bundle_id: &str,
    target_scale: u32,
    config: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError>
where
    C: SnapshotFetcher + EventSubscriber + ?Sized,
{
    let target = ScaleTarget::new(client, bundle_id, target_scale);
    wait_until(&target, client, config, progress).await
}

pub async fn wait_for_deployment_complete<C>(
    client: &C,
    target: &DeploymentTarget,
    config: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError>
where
    C: SnapshotFetcher + EventSubscriber + ?Sized,
{
    match target {
        DeploymentTarget::Deployment(id) => {
            let target = SingleDeploymentTarget::new(client, id.as_str());
            wait_until(&target, client, config, progress).await
        }
        DeploymentTarget::Batch(id) => {
            let target = BatchTarget::new(client, id.as_str());
            wait_until(&target, client, config, progress).await
        }
    }
}
