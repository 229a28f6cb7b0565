//! Shared worker identity and lifecycle types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a worker, unique for the lifetime of the boss process.
///
/// The string form is chosen by the platform backend; the pool guarantees
/// uniqueness by handing the backend a sequence number that is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a worker that is still a pool member.
///
/// ```text
/// Provisioning ──ready──▶ Idle ◀──release── Busy
///                           └────acquire────▶┘
/// ```
///
/// Removal from the pool (scale-down, provisioning failure, close) is
/// terminal and is not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Backing instance requested but not yet confirmed ready.
    Provisioning,
    /// Ready and waiting in the idle queue.
    Idle,
    /// Held by exactly one dispatch.
    Busy,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Provisioning => "provisioning",
            WorkerState::Idle => "idle",
            WorkerState::Busy => "busy",
        }
    }

    /// Compact encoding for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            WorkerState::Provisioning => 0,
            WorkerState::Idle => 1,
            WorkerState::Busy => 2,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerState::Idle,
            2 => WorkerState::Busy,
            _ => WorkerState::Provisioning,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
