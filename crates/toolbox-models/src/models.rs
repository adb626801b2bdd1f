//! Data models for model and resource state

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bytes per mebibyte, the unit the remote manager reports GPU memory in
const BYTES_PER_MIB: u64 = 1024 * 1024;

/// A model installed on the remote manager
///
/// Only `name` is interpreted. Everything else the manager reports (size,
/// digest, modified time, details) is kept verbatim in `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDescriptor {
    /// Model name/ID (e.g., "llama3:latest"), unique within the installed set
    pub name: String,

    /// Remaining attributes, passed through without validation
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    /// Look up a pass-through attribute
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// On-disk size in bytes, when the manager reported one
    pub fn size(&self) -> Option<u64> {
        self.attribute("size").and_then(Value::as_u64)
    }
}

/// A model currently resident in accelerator memory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunningModelDescriptor {
    pub name: String,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl RunningModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// VRAM held by the model in bytes, when reported
    pub fn size_vram(&self) -> Option<u64> {
        self.attribute("size_vram").and_then(Value::as_u64)
    }
}

/// GPU usage as reported by the remote manager, in mebibytes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpuReport {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub total_mb: u64,
    #[serde(default)]
    pub used_mb: u64,
}

/// GPU usage held by the registry, in bytes
///
/// `used_bytes <= total_bytes` is expected but not enforced; reported values
/// are trusted as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpuInfo {
    pub name: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl GpuInfo {
    /// Fraction of GPU memory in use (0.0 when the total is unknown)
    pub fn usage_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}

impl From<GpuReport> for GpuInfo {
    fn from(report: GpuReport) -> Self {
        Self {
            name: report.name,
            total_bytes: report.total_mb.saturating_mul(BYTES_PER_MIB),
            used_bytes: report.used_mb.saturating_mul(BYTES_PER_MIB),
        }
    }
}

/// Raw `pull-progress` event payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressEvent {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub total: u64,
}

/// Snapshot of an in-flight pull
///
/// Each event replaces the snapshot wholesale. The default value is the empty
/// snapshot shown whenever no pull is running.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullProgress {
    /// Free-text phase label (e.g., "pulling manifest", "downloading")
    pub status: String,

    /// Units completed so far (server-defined unit)
    pub completed: u64,

    /// Total units (server-defined unit)
    pub total: u64,

    /// `round(completed / total * 100)`, 0 when `total` is 0; not clamped
    pub percentage: u64,
}

impl PullProgress {
    /// Status label of the snapshot installed when a pull starts
    pub const INITIALIZING: &'static str = "initializing";

    pub fn new(status: impl Into<String>, completed: u64, total: u64) -> Self {
        Self {
            status: status.into(),
            completed,
            total,
            percentage: Self::percentage_of(completed, total),
        }
    }

    /// Snapshot installed at the start of a pull, before any event arrives
    pub fn initializing() -> Self {
        Self::new(Self::INITIALIZING, 0, 0)
    }

    /// Whether this is the empty snapshot
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Integer percentage rounded half up
    ///
    /// `completed > total` yields values above 100.
    pub fn percentage_of(completed: u64, total: u64) -> u64 {
        if total == 0 {
            return 0;
        }
        let completed = u128::from(completed);
        let total = u128::from(total);
        let rounded = (completed * 200 + total) / (total * 2);
        u64::try_from(rounded).unwrap_or(u64::MAX)
    }
}

impl From<ProgressEvent> for PullProgress {
    fn from(event: ProgressEvent) -> Self {
        Self::new(event.status, event.completed, event.total)
    }
}

// Tests live in tests/models.rs
