//! Scripted in-memory orchestrator for driving the correlator.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{
    BatchEvent, BundleRecord, DeploymentEvent, EventChannel, EventStream, EventSubscriber,
    SnapshotFetcher, StreamEvent, WaitError,
};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

/// Snapshots handed out in order; the last one repeats forever.
struct Script<T> {
    steps: VecDeque<T>,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<T>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    fn next(&mut self) -> Option<T> {
        if self.steps.len() > 1 {
            self.steps.pop_front()
        } else {
            self.steps.front().cloned()
        }
    }
}

/// How the scripted event stream behaves after its last event.
pub enum StreamEnd {
    Close,
    Hang,
}

#[derive(Default)]
pub struct ScriptedOrchestrator {
    bundles: Mutex<Option<Script<Option<Vec<BundleRecord>>>>>,
    deployments: Mutex<HashMap<String, Script<Vec<DeploymentEvent>>>>,
    batches: Mutex<HashMap<String, Script<Vec<BatchEvent>>>>,
    stream: Mutex<Option<EventStream>>,
    poll_delay: Option<Duration>,
    pub bundle_polls: AtomicUsize,
    pub subscriptions: AtomicUsize,
}

impl ScriptedOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundles(self, steps: Vec<Option<Vec<BundleRecord>>>) -> Self {
        *self.bundles.lock().unwrap() = Some(Script::new(steps));
        self
    }

    pub fn with_deployment(self, id: &str, steps: Vec<Vec<DeploymentEvent>>) -> Self {
        self.deployments
            .lock()
            .unwrap()
            .insert(id.to_string(), Script::new(steps));
        self
    }

    pub fn with_batch(self, id: &str, steps: Vec<Vec<BatchEvent>>) -> Self {
        self.batches
            .lock()
            .unwrap()
            .insert(id.to_string(), Script::new(steps));
        self
    }

    pub fn with_events(self, events: Vec<StreamEvent>, end: StreamEnd) -> Self {
        let head = stream::iter(events.into_iter().map(Ok));
        let stream = match end {
            StreamEnd::Close => head.boxed(),
            StreamEnd::Hang => head.chain(stream::pending()).boxed(),
        };
        self.with_stream(stream)
    }

    /// Every bundle snapshot takes `delay` of (tokio) time to answer.
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    pub fn with_stream(self, stream: EventStream) -> Self {
        *self.stream.lock().unwrap() = Some(stream);
        self
    }

    pub fn bundle_polls(&self) -> usize {
        self.bundle_polls.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotFetcher for ScriptedOrchestrator {
    async fn bundles(&self) -> Result<Option<Vec<BundleRecord>>, WaitError> {
        self.bundle_polls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.poll_delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.bundles.lock().unwrap();
        Ok(script.as_mut().and_then(Script::next).flatten())
    }

    async fn deployment_events(
        &self,
        deployment_id: &str,
    ) -> Result<Option<Vec<DeploymentEvent>>, WaitError> {
        let mut scripts = self.deployments.lock().unwrap();
        Ok(scripts.get_mut(deployment_id).and_then(Script::next))
    }

    async fn batch_events(&self, batch_id: &str) -> Result<Option<Vec<BatchEvent>>, WaitError> {
        let mut scripts = self.batches.lock().unwrap();
        Ok(scripts.get_mut(batch_id).and_then(Script::next))
    }
}

#[async_trait]
impl EventSubscriber for ScriptedOrchestrator {
    async fn subscribe(&self, _channel: EventChannel) -> Result<EventStream, WaitError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let taken = self.stream.lock().unwrap().take();
        Ok(taken.unwrap_or_else(|| stream::empty().boxed()))
    }
}

pub fn bundle(id: &str, installations: usize, started: usize) -> BundleRecord {
    let installs: Vec<Value> = (0..installations).map(|n| json!({"node": n})).collect();
    let executions: Vec<Value> = (0..started)
        .map(|n| json!({"host": format!("10.0.0.{n}"), "isStarted": true}))
        .collect();
    serde_json::from_value(json!({
        "bundleId": id,
        "bundleInstallations": installs,
        "bundleExecutions": executions,
    }))
    .unwrap()
}

pub fn deployment_events(raw: Value) -> Vec<DeploymentEvent> {
    serde_json::from_value(raw).unwrap()
}

pub fn batch_events(raw: Value) -> Vec<BatchEvent> {
    serde_json::from_value(raw).unwrap()
}

pub fn named(event_type: &str) -> StreamEvent {
    StreamEvent::named(event_type, "{}")
}

pub fn heartbeat() -> StreamEvent {
    StreamEvent::heartbeat()
}
