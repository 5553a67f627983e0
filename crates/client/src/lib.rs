//! HTTP transport for the fleet orchestrator.
//!
//! [`OrchestratorClient`] implements the snapshot and event-stream seams of
//! `fleet-core`, and the functions in [`wait`] wire it to the correlator.

pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod wait;

pub use config::{Auth, ServerConfig, TlsConfig, DEFAULT_SERVER_URL};
pub use error::ClientError;
pub use events::SseStream;
pub use http::OrchestratorClient;
pub use wait::{
    wait_for_deployment_complete, wait_for_installation, wait_for_scale, wait_for_uninstallation,
};
