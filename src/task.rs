//! Scheduling unit for lifecycle jobs.
//! A task pairs a job kind (scan/install) with a lifecycle target and a
//! deterministic key derived from the target's namespace and name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace UUID under which task keys are derived (v5).
/// Stable across restarts so re-submitted requests dedupe correctly.
const KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6c69_6665_6379_636c_655f_7363_6865_6431);

/// Kind of lifecycle job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Firmware inventory scan.
    Scan,
    /// Firmware package installation.
    Install,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Scan => "scan",
            JobKind::Install => "install",
        }
    }
}

/// Identity of a lifecycle object in the declarative store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Deterministic, collision-resistant key for this object.
    /// The sole identity used for deduplication across all queues and the
    /// active-job tracker. A deployment runs one scheduler per job kind,
    /// so scan and install keys for the same object never meet.
    pub fn key(&self) -> Uuid {
        let input = format!("{}/{}", self.namespace, self.name);
        Uuid::new_v5(&KEY_NAMESPACE, input.as_bytes())
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Capability exposed by anything the scheduler can run jobs for.
/// The scheduler never matches on a concrete variant; variant-specific
/// behavior belongs to the external job runner.
pub trait LifecycleTarget: Clone + Send + Sync + 'static {
    fn object_ref(&self) -> &ObjectRef;
    fn last_scan_time(&self) -> Option<DateTime<Utc>>;
}

/// A physical machine tracked by the lifecycle platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub object_ref: ObjectRef,
    pub last_scan_time: Option<DateTime<Utc>>,
}

impl Machine {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_ref: ObjectRef::new(namespace, name),
            last_scan_time: None,
        }
    }
}

impl LifecycleTarget for Machine {
    fn object_ref(&self) -> &ObjectRef {
        &self.object_ref
    }

    fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        self.last_scan_time
    }
}

/// A machine type (hardware model) tracked by the lifecycle platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineType {
    pub object_ref: ObjectRef,
    pub last_scan_time: Option<DateTime<Utc>>,
}

impl MachineType {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_ref: ObjectRef::new(namespace, name),
            last_scan_time: None,
        }
    }
}

impl LifecycleTarget for MachineType {
    fn object_ref(&self) -> &ObjectRef {
        &self.object_ref
    }

    fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        self.last_scan_time
    }
}

/// One unit of scheduling work. Immutable once constructed; never mutated
/// while queued or active.
#[derive(Debug, Clone)]
pub struct Task<T> {
    key: Uuid,
    kind: JobKind,
    target: T,
}

impl<T: LifecycleTarget> Task<T> {
    pub fn new(kind: JobKind, target: T) -> Self {
        let key = target.object_ref().key();
        Self { key, kind, target }
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn target(&self) -> &T {
        &self.target
    }
}
