#![forbid(unsafe_code)]

//! Completion tracking for long-running fleet operations.
//!
//! The orchestrator reports progress of installs, scale changes and
//! deployments through an event stream plus point-in-time snapshot
//! endpoints. This crate correlates the two to decide when an operation has
//! succeeded, failed, or run out of time. It performs no I/O of its own: the
//! transport sits behind [`source::SnapshotFetcher`] and
//! [`source::EventSubscriber`].

pub mod error;
pub mod model;
pub mod ops;
pub mod progress;
pub mod source;
pub mod sse;
pub mod wait;

pub use error::WaitError;
pub use model::{
    BatchEvent, BatchEventKind, BundleExecution, BundleRecord, DeploymentEvent,
    DeploymentEventKind, OperationRef, Schedule,
};
pub use ops::{
    wait_for_deployment_complete, wait_for_installation, wait_for_scale,
    wait_for_uninstallation, DeploymentTarget,
};
pub use progress::{NullProgress, ProgressSink, RecordedProgress};
pub use source::{EventChannel, EventStream, EventSubscriber, SnapshotFetcher};
pub use sse::{FrameDecoder, StreamEvent};
pub use wait::{wait_until, Verdict, WaitConfig, WaitState, WaitTarget};
