use async_trait::async_trait;
use tracing::debug;

use super::{Verdict, WaitState, WaitTarget};
use crate::error::WaitError;
use crate::model::{installation_count, started_execution_count};
use crate::source::{EventChannel, SnapshotFetcher};

/// Direction of an installation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Done once at least one node holds the bundle.
    Install,
    /// Done once no node holds the bundle.
    Uninstall,
}

/// Waits on the installation count of a bundle.
pub struct BundleCountTarget<'a, F: ?Sized> {
    fetcher: &'a F,
    bundle_id: String,
    mode: InstallMode,
}

impl<'a, F: ?Sized> BundleCountTarget<'a, F> {
    pub fn new(fetcher: &'a F, bundle_id: impl Into<String>, mode: InstallMode) -> Self {
        Self {
            fetcher,
            bundle_id: bundle_id.into(),
            mode,
        }
    }

    fn verb(&self) -> &'static str {
        match self.mode {
            InstallMode::Install => "installed",
            InstallMode::Uninstall => "uninstalled",
        }
    }
}

#[async_trait]
impl<'a, F> WaitTarget for BundleCountTarget<'a, F>
where
    F: SnapshotFetcher + ?Sized,
{
    type Snapshot = u32;

    fn operation_id(&self) -> &str {
        &self.bundle_id
    }

    fn awaiting(&self) -> String {
        format!("bundle {} to be {}", self.bundle_id, self.verb())
    }

    fn channel(&self) -> EventChannel {
        EventChannel::Bundles
    }

    async fn poll(&self, _state: &mut WaitState<u32>) -> Result<u32, WaitError> {
        let bundles = self.fetcher.bundles().await?.unwrap_or_default();
        let count = installation_count(&bundles, &self.bundle_id);
        debug!(bundle_id = %self.bundle_id, count, "installation count");
        Ok(count)
    }

    fn evaluate(&self, count: &u32, _state: &WaitState<u32>) -> Verdict {
        let done = match self.mode {
            InstallMode::Install => *count > 0,
            InstallMode::Uninstall => *count == 0,
        };
        if done {
            Verdict::Succeeded {
                lines: vec![format!("Bundle {} {}", self.bundle_id, self.verb())],
            }
        } else {
            Verdict::Pending
        }
    }

    fn render_diff(&self, _previous: Option<&u32>, _current: &u32) -> Vec<String> {
        vec![format!("Bundle {} waiting to be {}", self.bundle_id, self.verb())]
    }
}

/// Waits until the number of started executions equals `expected`.
pub struct ScaleTarget<'a, F: ?Sized> {
    fetcher: &'a F,
    bundle_id: String,
    expected: u32,
}

impl<'a, F: ?Sized> ScaleTarget<'a, F> {
    pub fn new(fetcher: &'a F, bundle_id: impl Into<String>, expected: u32) -> Self {
        Self {
            fetcher,
            bundle_id: bundle_id.into(),
            expected,
        }
    }
}

#[async_trait]
impl<'a, F> WaitTarget for ScaleTarget<'a, F>
where
    F: SnapshotFetcher + ?Sized,
{
    type Snapshot = u32;

    fn operation_id(&self) -> &str {
        &self.bundle_id
    }

    fn awaiting(&self) -> String {
        format!("bundle {} to reach expected scale {}", self.bundle_id, self.expected)
    }

    fn channel(&self) -> EventChannel {
        EventChannel::Bundles
    }

    async fn poll(&self, _state: &mut WaitState<u32>) -> Result<u32, WaitError> {
        let bundles = self.fetcher.bundles().await?.unwrap_or_default();
        let scale = started_execution_count(&bundles, &self.bundle_id);
        debug!(bundle_id = %self.bundle_id, scale, expected = self.expected, "started executions");
        Ok(scale)
    }

    fn evaluate(&self, scale: &u32, _state: &WaitState<u32>) -> Verdict {
        if *scale == self.expected {
            Verdict::Succeeded {
                lines: vec![format!(
                    "Bundle {} expected scale {} is met",
                    self.bundle_id, self.expected
                )],
            }
        } else {
            Verdict::Pending
        }
    }

    fn render_diff(&self, previous: Option<&u32>, current: &u32) -> Vec<String> {
        let mut lines = Vec::new();
        if previous.is_none() {
            lines.push(format!(
                "Bundle {} waiting to reach expected scale {}",
                self.bundle_id, self.expected
            ));
        }
        lines.push(format!(
            "Bundle {} has scale {}, expected {}",
            self.bundle_id, current, self.expected
        ));
        lines
    }
}
