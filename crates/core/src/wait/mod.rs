//! The completion correlator: one control loop shared by every wait.

mod bundle;
mod deployment;
mod state;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::WaitError;
use crate::progress::ProgressSink;
use crate::source::{EventChannel, EventSubscriber};

pub use bundle::{BundleCountTarget, InstallMode, ScaleTarget};
pub use deployment::{BatchPhase, BatchSnapshot, BatchTarget, SingleDeploymentTarget};
pub use state::{WaitState, HEARTBEATS_PER_CHECK};

/// Default wall-clock budget for a wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Caller knobs for a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub wait_timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl WaitConfig {
    pub fn with_timeout(wait_timeout: Duration) -> Self {
        Self { wait_timeout }
    }
}

/// Outcome of evaluating one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Succeeded { lines: Vec<String> },
    Failed { lines: Vec<String>, reasons: Vec<String> },
}

/// What a particular wait looks for.
///
/// `poll` is the snapshot fetcher bound to one operation; it receives the
/// session state so multi-part operations can record schedules and extend
/// the budget. `evaluate` holds both the success and the failure predicate.
#[async_trait]
pub trait WaitTarget: Send + Sync {
    type Snapshot: Clone + PartialEq + Debug + Send + Sync;

    fn operation_id(&self) -> &str;

    /// Human phrase for what is awaited, used in timeout errors.
    fn awaiting(&self) -> String;

    fn channel(&self) -> EventChannel;

    async fn poll(
        &self,
        state: &mut WaitState<Self::Snapshot>,
    ) -> Result<Self::Snapshot, WaitError>;

    fn evaluate(&self, snapshot: &Self::Snapshot, state: &WaitState<Self::Snapshot>) -> Verdict;

    /// Lines describing the move from `previous` to `current`.
    fn render_diff(&self, previous: Option<&Self::Snapshot>, current: &Self::Snapshot)
        -> Vec<String>;
}

/// Runs the wait loop to a terminal outcome.
pub async fn wait_until<T, S>(
    target: &T,
    subscriber: &S,
    config: &WaitConfig,
    progress: &mut dyn ProgressSink,
) -> Result<(), WaitError>
where
    T: WaitTarget + ?Sized,
    S: EventSubscriber + ?Sized,
{
    let mut state = WaitState::new(config.wait_timeout);
    let operation_id = target.operation_id();

    // Already finished operations never open a stream.
    let snapshot = target.poll(&mut state).await?;
    if let Some(outcome) = conclude(target, &snapshot, &state, progress) {
        debug!(operation_id, "resolved before subscribing");
        return outcome;
    }

    let mut events = target_stream(target, subscriber).await?;

    loop {
        let next = match tokio::time::timeout_at(state.deadline(), events.next()).await {
            Ok(next) => next,
            Err(_) => return Err(timeout(target, &state)),
        };
        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(err)) => return Err(err),
            None => {
                warn!(operation_id, "event stream ended before completion");
                return Err(timeout(target, &state));
            }
        };
        if state.is_expired(Instant::now()) {
            return Err(timeout(target, &state));
        }
        if !state.should_check(&event) {
            continue;
        }

        debug!(operation_id, event = ?event.event_type, "checking snapshot");
        let snapshot = target.poll(&mut state).await?;
        if let Some(outcome) = conclude(target, &snapshot, &state, progress) {
            return outcome;
        }

        if state.last_seen_snapshot.as_ref() == Some(&snapshot) {
            progress.tick();
        } else {
            for line in target.render_diff(state.last_seen_snapshot.as_ref(), &snapshot) {
                progress.line(&line);
            }
            state.last_seen_snapshot = Some(snapshot);
        }
    }
}

async fn target_stream<T, S>(target: &T, subscriber: &S) -> Result<crate::EventStream, WaitError>
where
    T: WaitTarget + ?Sized,
    S: EventSubscriber + ?Sized,
{
    let channel = target.channel();
    debug!(operation_id = target.operation_id(), path = channel.path(), "subscribing");
    subscriber.subscribe(channel).await
}

fn conclude<T: WaitTarget + ?Sized>(
    target: &T,
    snapshot: &T::Snapshot,
    state: &WaitState<T::Snapshot>,
    progress: &mut dyn ProgressSink,
) -> Option<Result<(), WaitError>> {
    match target.evaluate(snapshot, state) {
        Verdict::Pending => None,
        Verdict::Succeeded { lines } => {
            lines.iter().for_each(|l| progress.line(l));
            info!(operation_id = target.operation_id(), "operation complete");
            Some(Ok(()))
        }
        Verdict::Failed { lines, reasons } => {
            lines.iter().for_each(|l| progress.line(l));
            info!(operation_id = target.operation_id(), ?reasons, "operation failed");
            Some(Err(WaitError::OperationFailed {
                operation_id: target.operation_id().to_string(),
                reasons,
            }))
        }
    }
}

fn timeout<T: WaitTarget + ?Sized>(target: &T, state: &WaitState<T::Snapshot>) -> WaitError {
    WaitError::Timeout {
        operation_id: target.operation_id().to_string(),
        awaiting: target.awaiting(),
        budget: state.wait_budget,
    }
}
