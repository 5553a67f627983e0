use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, trace};

use crate::model::OperationRef;
use crate::sse::StreamEvent;

/// Heartbeats tolerated between two checks.
pub const HEARTBEATS_PER_CHECK: u32 = 3;

/// Deadline horizon used when the budget does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Mutable session state of one wait call.
#[derive(Debug, Clone)]
pub struct WaitState<S> {
    pub started_at: Instant,
    pub wait_budget: Duration,
    pub heartbeats_since_check: u32,
    pub last_seen_snapshot: Option<S>,
    pub scheduled_sub_operations: Option<Vec<OperationRef>>,
    budget_extended: bool,
}

impl<S> WaitState<S> {
    pub fn new(wait_budget: Duration) -> Self {
        Self::starting_at(Instant::now(), wait_budget)
    }

    pub fn starting_at(started_at: Instant, wait_budget: Duration) -> Self {
        Self {
            started_at,
            wait_budget,
            heartbeats_since_check: 0,
            last_seen_snapshot: None,
            scheduled_sub_operations: None,
            budget_extended: false,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.started_at
            .checked_add(self.wait_budget)
            .unwrap_or_else(|| self.started_at + FAR_FUTURE)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.started_at) > self.wait_budget
    }

    /// Named events always trigger a check; heartbeats only every third one.
    pub fn should_check(&mut self, event: &StreamEvent) -> bool {
        if !event.is_heartbeat() {
            self.heartbeats_since_check = 0;
            return true;
        }
        self.heartbeats_since_check += 1;
        trace!(count = self.heartbeats_since_check, "heartbeat");
        if self.heartbeats_since_check >= HEARTBEATS_PER_CHECK {
            self.heartbeats_since_check = 0;
            return true;
        }
        false
    }

    /// Multiplies the budget by `factor`. Only the first call has an effect.
    pub fn extend_budget(&mut self, factor: u32) -> bool {
        if self.budget_extended || factor == 0 {
            return false;
        }
        self.budget_extended = true;
        self.wait_budget = self.wait_budget.saturating_mul(factor);
        info!(budget_secs = self.wait_budget.as_secs(), factor, "wait budget extended");
        true
    }

    pub fn budget_extended(&self) -> bool {
        self.budget_extended
    }

    /// Records a schedule. A different schedule replaces the old one and
    /// forgets the last seen snapshot; the same schedule is a no-op.
    pub fn schedule_sub_operations(&mut self, subs: Vec<OperationRef>) -> bool {
        if self.scheduled_sub_operations.as_ref() == Some(&subs) {
            return false;
        }
        self.scheduled_sub_operations = Some(subs);
        self.last_seen_snapshot = None;
        true
    }
}
