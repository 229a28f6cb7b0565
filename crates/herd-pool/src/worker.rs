//! A single pool member.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use herd_core::{WorkerId, WorkerState};

/// Backend-specific reference to a worker's backing instance
/// (instance id, roster slot, ...). Only the platform interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformHandle(String);

impl PlatformHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A worker record, created by `Platform::allocate` and owned by the pool.
pub struct Worker {
    seq: u64,
    id: WorkerId,
    address: String,
    handle: PlatformHandle,
    state: AtomicU8,
}

impl Worker {
    /// New workers start out `Provisioning`.
    pub fn new(seq: u64, id: WorkerId, address: impl Into<String>, handle: PlatformHandle) -> Self {
        Self {
            seq,
            id,
            address: address.into(),
            handle,
            state: AtomicU8::new(WorkerState::Provisioning.to_u8()),
        }
    }

    /// Allocation sequence number; orders workers by creation.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Network address (host only; the forwarder adds the worker port).
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn handle(&self) -> &PlatformHandle {
        &self.handle
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_idle(&self) -> bool {
        self.state() == WorkerState::Idle
    }

    /// Only the current holder of the worker may call this: the pool while
    /// publishing, or the dispatch that took it off the idle queue.
    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("seq", &self.seq)
            .field("id", &self.id)
            .field("address", &self.address)
            .field("handle", &self.handle)
            .field("state", &self.state())
            .finish()
    }
}
