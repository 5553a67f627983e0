use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier of a sub-operation discovered inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationRef(pub String);

impl OperationRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bundle as listed by `GET /bundles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRecord {
    pub bundle_id: String,
    #[serde(default)]
    pub bundle_name: Option<String>,
    /// Opaque per-node installation records; only their number matters here.
    #[serde(default)]
    pub bundle_installations: Vec<Value>,
    #[serde(default)]
    pub bundle_executions: Vec<BundleExecution>,
}

/// One running (or starting) instance of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleExecution {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub is_started: bool,
}

/// Finds a bundle by full id, falling back to a unique prefix (short id).
pub fn find_bundle<'a>(bundles: &'a [BundleRecord], bundle_id: &str) -> Option<&'a BundleRecord> {
    if let Some(exact) = bundles.iter().find(|b| b.bundle_id == bundle_id) {
        return Some(exact);
    }
    let mut prefixed = bundles.iter().filter(|b| b.bundle_id.starts_with(bundle_id));
    match (prefixed.next(), prefixed.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Number of nodes the bundle is installed on; 0 when the bundle is unknown.
pub fn installation_count(bundles: &[BundleRecord], bundle_id: &str) -> u32 {
    find_bundle(bundles, bundle_id)
        .map_or(0, |b| saturating_count(b.bundle_installations.len()))
}

/// Number of executions reporting `isStarted`.
pub fn started_execution_count(bundles: &[BundleRecord], bundle_id: &str) -> u32 {
    find_bundle(bundles, bundle_id).map_or(0, |b| {
        saturating_count(b.bundle_executions.iter().filter(|e| e.is_started).count())
    })
}

/// `n` as a `u32`, clamped at `u32::MAX`.
pub(crate) fn saturating_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Scale reported on either side of a `deploy` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScaleInfo {
    pub scale: u32,
}

/// Known deployment event types. Anything the client does not recognise, or
/// cannot decode, lands in `Unknown` with the raw JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase")]
pub enum DeploymentEventKind {
    DeploymentStarted,
    BundleDownload,
    #[serde(rename_all = "camelCase")]
    ConfigDownload { compatible_bundle_id: String },
    #[serde(rename_all = "camelCase")]
    Load {
        #[serde(default)]
        config_file_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Deploy {
        bundle_old: ScaleInfo,
        bundle_new: ScaleInfo,
    },
    DeploymentSuccess,
    DeploymentFailure { failure: String },
    #[serde(skip_deserializing)]
    Unknown(String),
}

impl DeploymentEventKind {
    /// Human sentence for progress output.
    pub fn sentence(&self) -> String {
        match self {
            Self::DeploymentStarted => "Deployment started".to_string(),
            Self::BundleDownload => "Downloading bundle".to_string(),
            Self::ConfigDownload { compatible_bundle_id } => {
                format!("Downloading config from bundle {compatible_bundle_id}")
            }
            Self::Load { config_file_name: Some(_) } => "Loading bundle with config".to_string(),
            Self::Load { config_file_name: None } => "Loading bundle".to_string(),
            Self::Deploy { bundle_old, bundle_new } => format!(
                "Deploying - {} old instance vs {} new instance",
                bundle_old.scale, bundle_new.scale
            ),
            Self::DeploymentSuccess => "Success".to_string(),
            Self::DeploymentFailure { failure } => format!("Failure: {failure}"),
            Self::Unknown(raw) => format!("Unknown event: {raw}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::DeploymentSuccess)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::DeploymentFailure { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.failure_reason().is_some()
    }
}

/// Batch-level event types.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase")]
pub enum BatchEventKind {
    #[serde(rename_all = "camelCase")]
    ScheduleSimpleDeployment { deployment_id: String },
    #[serde(rename_all = "camelCase")]
    ScheduleLockStepDeployments { deployment_ids: Vec<String> },
    BatchFailure { failure: String },
    #[serde(skip_deserializing)]
    Unknown(String),
}

impl BatchEventKind {
    pub fn schedule(&self) -> Option<Schedule> {
        match self {
            Self::ScheduleSimpleDeployment { deployment_id } => {
                Some(Schedule::Simple(OperationRef::new(deployment_id.clone())))
            }
            Self::ScheduleLockStepDeployments { deployment_ids } => Some(Schedule::LockStep(
                deployment_ids.iter().cloned().map(OperationRef).collect(),
            )),
            _ => None,
        }
    }
}

/// How a batch fans out into deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Simple(OperationRef),
    LockStep(Vec<OperationRef>),
}

impl Schedule {
    pub fn sub_operations(&self) -> Vec<OperationRef> {
        match self {
            Self::Simple(id) => vec![id.clone()],
            Self::LockStep(ids) => ids.clone(),
        }
    }

    pub fn is_lock_step(&self) -> bool {
        matches!(self, Self::LockStep(_))
    }
}

// Both event families share the `deploymentSequence` + `eventType` envelope and
// fall back to `Unknown(raw)` when the typed decode fails.
macro_rules! sequenced_event {
    ($name:ident, $kind:ident) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            pub sequence: u64,
            pub kind: $kind,
        }

        impl $name {
            pub fn from_value(raw: Value) -> Self {
                let sequence = raw
                    .get("deploymentSequence")
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
                let kind = match serde_json::from_value::<$kind>(raw.clone()) {
                    Ok(kind) => kind,
                    Err(_) => $kind::Unknown(raw.to_string()),
                };
                Self { sequence, kind }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Value::deserialize(deserializer).map(Self::from_value)
            }
        }
    };
}

sequenced_event!(DeploymentEvent, DeploymentEventKind);
sequenced_event!(BatchEvent, BatchEventKind);

/// Latest schedule announced in a batch, if any.
pub fn latest_schedule(events: &[BatchEvent]) -> Option<Schedule> {
    events.iter().rev().find_map(|e| e.kind.schedule())
}
