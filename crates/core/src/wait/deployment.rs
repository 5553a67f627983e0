use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Verdict, WaitState, WaitTarget};
use crate::error::WaitError;
use crate::model::{
    latest_schedule, saturating_count, BatchEvent, BatchEventKind, DeploymentEvent, OperationRef,
    Schedule,
};
use crate::source::{EventChannel, SnapshotFetcher};

fn sorted<E>(mut events: Vec<E>, key: impl Fn(&E) -> u64) -> Vec<E> {
    events.sort_by_key(key);
    events
}

/// Events of `current` newer than the latest one in `previous`.
fn newer_than<'e>(
    previous: Option<&[DeploymentEvent]>,
    current: &'e [DeploymentEvent],
) -> impl Iterator<Item = &'e DeploymentEvent> {
    let seen = previous.and_then(|p| p.last()).map(|e| e.sequence);
    current
        .iter()
        .filter(move |e| seen.map_or(true, |s| e.sequence > s))
}

/// Waits on a single deployment's event history.
pub struct SingleDeploymentTarget<'a, F: ?Sized> {
    fetcher: &'a F,
    deployment_id: String,
}

impl<'a, F: ?Sized> SingleDeploymentTarget<'a, F> {
    pub fn new(fetcher: &'a F, deployment_id: impl Into<String>) -> Self {
        Self {
            fetcher,
            deployment_id: deployment_id.into(),
        }
    }
}

#[async_trait]
impl<'a, F> WaitTarget for SingleDeploymentTarget<'a, F>
where
    F: SnapshotFetcher + ?Sized,
{
    type Snapshot = Vec<DeploymentEvent>;

    fn operation_id(&self) -> &str {
        &self.deployment_id
    }

    fn awaiting(&self) -> String {
        format!("deployment {} to complete", self.deployment_id)
    }

    fn channel(&self) -> EventChannel {
        EventChannel::Deployments
    }

    async fn poll(
        &self,
        _state: &mut WaitState<Vec<DeploymentEvent>>,
    ) -> Result<Vec<DeploymentEvent>, WaitError> {
        let events = self
            .fetcher
            .deployment_events(&self.deployment_id)
            .await?
            .unwrap_or_default();
        debug!(deployment_id = %self.deployment_id, count = events.len(), "deployment events");
        Ok(sorted(events, |e| e.sequence))
    }

    fn evaluate(
        &self,
        events: &Vec<DeploymentEvent>,
        state: &WaitState<Vec<DeploymentEvent>>,
    ) -> Verdict {
        let Some(latest) = events.last() else {
            return Verdict::Pending;
        };
        if !latest.kind.is_terminal() {
            return Verdict::Pending;
        }
        let lines = newer_than(state.last_seen_snapshot.as_deref(), events)
            .map(|e| e.kind.sentence())
            .collect();
        match latest.kind.failure_reason() {
            Some(reason) => Verdict::Failed {
                lines,
                reasons: vec![reason.to_string()],
            },
            None => Verdict::Succeeded { lines },
        }
    }

    fn render_diff(
        &self,
        previous: Option<&Vec<DeploymentEvent>>,
        current: &Vec<DeploymentEvent>,
    ) -> Vec<String> {
        let Some(latest) = current.last() else {
            return vec![format!("Waiting for deployment {} to start", self.deployment_id)];
        };
        let lines: Vec<String> = newer_than(previous.map(Vec::as_slice), current)
            .map(|e| e.kind.sentence())
            .collect();
        if lines.is_empty() {
            vec![latest.kind.sentence()]
        } else {
            lines
        }
    }
}

/// Where a deployment batch currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    AwaitingSchedule,
    ScheduledSimple,
    ScheduledLockStep,
    InProgress,
    Success,
    PartialFailure,
    BatchFailed,
}

/// Two-tier batch state: batch events plus per-deployment events once scheduled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSnapshot {
    pub batch_events: Vec<BatchEvent>,
    pub deployments: BTreeMap<OperationRef, Vec<DeploymentEvent>>,
}

impl BatchSnapshot {
    pub fn schedule(&self) -> Option<Schedule> {
        latest_schedule(&self.batch_events)
    }

    pub fn batch_failure(&self) -> Option<&str> {
        self.batch_events.iter().rev().find_map(|e| match &e.kind {
            BatchEventKind::BatchFailure { failure } => Some(failure.as_str()),
            _ => None,
        })
    }

    fn latest(&self, sub: &OperationRef) -> Option<&DeploymentEvent> {
        self.deployments.get(sub).and_then(|events| events.last())
    }

    pub fn phase(&self) -> BatchPhase {
        if self.batch_failure().is_some() {
            return BatchPhase::BatchFailed;
        }
        let Some(schedule) = self.schedule() else {
            return BatchPhase::AwaitingSchedule;
        };
        let subs = schedule.sub_operations();
        let latest: Vec<_> = subs.iter().map(|s| self.latest(s)).collect();

        if latest
            .iter()
            .flatten()
            .any(|e| e.kind.failure_reason().is_some())
        {
            return BatchPhase::PartialFailure;
        }
        if !subs.is_empty() && latest.iter().all(|e| e.is_some_and(|e| e.kind.is_success())) {
            return BatchPhase::Success;
        }
        if latest.iter().any(Option::is_some) {
            return BatchPhase::InProgress;
        }
        if schedule.is_lock_step() {
            BatchPhase::ScheduledLockStep
        } else {
            BatchPhase::ScheduledSimple
        }
    }

    /// Terminal sub-deployment events not present in `previous`.
    fn unrendered_terminals<'s>(
        &'s self,
        previous: Option<&BatchSnapshot>,
    ) -> Vec<(&'s OperationRef, &'s DeploymentEvent)> {
        self.deployments
            .iter()
            .filter_map(|(sub, events)| events.last().map(|e| (sub, e)))
            .filter(|(_, e)| e.kind.is_terminal())
            .filter(|(sub, e)| {
                !previous
                    .and_then(|p| p.deployments.get(*sub))
                    .is_some_and(|seen| seen.contains(*e))
            })
            .collect()
    }
}

/// Waits on a deployment batch, simple or lock-step.
pub struct BatchTarget<'a, F: ?Sized> {
    fetcher: &'a F,
    batch_id: String,
}

impl<'a, F: ?Sized> BatchTarget<'a, F> {
    pub fn new(fetcher: &'a F, batch_id: impl Into<String>) -> Self {
        Self {
            fetcher,
            batch_id: batch_id.into(),
        }
    }
}

#[async_trait]
impl<'a, F> WaitTarget for BatchTarget<'a, F>
where
    F: SnapshotFetcher + ?Sized,
{
    type Snapshot = BatchSnapshot;

    fn operation_id(&self) -> &str {
        &self.batch_id
    }

    fn awaiting(&self) -> String {
        format!("deployment batch {} to complete", self.batch_id)
    }

    fn channel(&self) -> EventChannel {
        EventChannel::Deployments
    }

    async fn poll(&self, state: &mut WaitState<BatchSnapshot>) -> Result<BatchSnapshot, WaitError> {
        let batch_events = self
            .fetcher
            .batch_events(&self.batch_id)
            .await?
            .unwrap_or_default();
        let batch_events = sorted(batch_events, |e| e.sequence);

        if let Some(schedule) = latest_schedule(&batch_events) {
            let subs = schedule.sub_operations();
            let count = subs.len();
            if state.schedule_sub_operations(subs) {
                info!(batch_id = %self.batch_id, count, lock_step = schedule.is_lock_step(), "batch scheduled");
                if schedule.is_lock_step() {
                    state.extend_budget(saturating_count(count));
                }
            }
        }

        let mut deployments = BTreeMap::new();
        for sub in state.scheduled_sub_operations.iter().flatten() {
            let events = self
                .fetcher
                .deployment_events(sub.as_str())
                .await?
                .unwrap_or_default();
            deployments.insert(sub.clone(), sorted(events, |e| e.sequence));
        }
        debug!(batch_id = %self.batch_id, deployments = deployments.len(), "batch snapshot");

        Ok(BatchSnapshot {
            batch_events,
            deployments,
        })
    }

    fn evaluate(&self, snapshot: &BatchSnapshot, state: &WaitState<BatchSnapshot>) -> Verdict {
        match snapshot.phase() {
            BatchPhase::BatchFailed => {
                let reason = snapshot.batch_failure().unwrap_or_default().to_string();
                Verdict::Failed {
                    lines: vec![format!("Failure: {reason}")],
                    reasons: vec![reason],
                }
            }
            BatchPhase::PartialFailure | BatchPhase::Success => {
                let fresh = snapshot.unrendered_terminals(state.last_seen_snapshot.as_ref());
                let lines = fresh
                    .iter()
                    .map(|(sub, e)| format!("Deployment {sub}: {}", e.kind.sentence()))
                    .collect();
                let mut reasons: Vec<String> = Vec::new();
                for reason in fresh.iter().filter_map(|(_, e)| e.kind.failure_reason()) {
                    if !reasons.iter().any(|r| r == reason) {
                        reasons.push(reason.to_string());
                    }
                }
                if reasons.is_empty() {
                    Verdict::Succeeded { lines }
                } else {
                    Verdict::Failed { lines, reasons }
                }
            }
            _ => Verdict::Pending,
        }
    }

    fn render_diff(&self, previous: Option<&BatchSnapshot>, current: &BatchSnapshot) -> Vec<String> {
        let mut lines = Vec::new();
        let schedule = current.schedule();
        match &schedule {
            None => {
                lines.push(format!(
                    "Waiting for deployment batch {} to be scheduled",
                    self.batch_id
                ));
                return lines;
            }
            Some(s) if previous.and_then(BatchSnapshot::schedule).as_ref() != Some(s) => {
                lines.push(match s {
                    Schedule::Simple(sub) => format!("Scheduled deployment {sub}"),
                    Schedule::LockStep(subs) => {
                        format!("Scheduled {} deployment(s) in lock-step", subs.len())
                    }
                });
            }
            Some(_) => {}
        }
        for (sub, events) in &current.deployments {
            let seen = previous.and_then(|p| p.deployments.get(sub)).map(Vec::as_slice);
            lines.extend(
                newer_than(seen, events).map(|e| format!("Deployment {sub}: {}", e.kind.sentence())),
            );
        }
        lines
    }
}
