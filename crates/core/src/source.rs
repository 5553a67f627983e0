//! Seams between the correlator and the transport.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::WaitError;
use crate::model::{BatchEvent, BundleRecord, DeploymentEvent};
use crate::sse::StreamEvent;

/// Lazy, unbounded, non-restartable sequence of decoded frames.
pub type EventStream = BoxStream<'static, Result<StreamEvent, WaitError>>;

/// Which orchestrator event stream to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChannel {
    /// Installation and execution changes (`/bundles/events`).
    Bundles,
    /// Deployment and batch progress (`/deployments/events`).
    Deployments,
}

impl EventChannel {
    /// Endpoint path relative to the server URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::Bundles => "/bundles/events",
            Self::Deployments => "/deployments/events",
        }
    }
}

/// Point-in-time state reads. `Ok(None)` means the server answered 404.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn bundles(&self) -> Result<Option<Vec<BundleRecord>>, WaitError>;

    async fn deployment_events(
        &self,
        deployment_id: &str,
    ) -> Result<Option<Vec<DeploymentEvent>>, WaitError>;

    async fn batch_events(&self, batch_id: &str) -> Result<Option<Vec<BatchEvent>>, WaitError>;
}

/// Opens an event stream. Handshake failures are returned, not retried.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn subscribe(&self, channel: EventChannel) -> Result<EventStream, WaitError>;
}
