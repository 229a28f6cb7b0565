//! Platform capability — how workers' backing instances come and go.
//!
//! The pool only ever talks to a backend through [`Platform`]:
//!
//! - `allocate` names a new worker (called under the membership lock,
//!   must not block)
//! - `provision` brings its instance up; the pool runs it on a spawned
//!   task and does not wait for it
//! - `destroy` tears the instance down; the pool awaits it
//!
//! Backends are picked by `platform.kind` in herd.toml.

pub mod mock;
pub mod static_hosts;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use herd_core::{HerdConfig, PlatformKind, WorkerId};
use thiserror::Error;

use crate::worker::Worker;

pub use mock::MockPlatform;
pub use static_hosts::StaticPlatform;

/// Errors raised by platform backends.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("no free hosts left to allocate")]
    Exhausted,

    #[error("worker id {0} already allocated")]
    DuplicateId(WorkerId),

    #[error("worker {worker} not ready after {after:?}")]
    NotReady { worker: WorkerId, after: Duration },

    #[error("{0}")]
    Backend(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

pub type PlatformFuture<'a> = Pin<Box<dyn Future<Output = PlatformResult<()>> + Send + 'a>>;

/// Backend-specific provisioning capability.
pub trait Platform: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Produce the identity and address for worker number `seq`.
    fn allocate(&self, seq: u64) -> PlatformResult<Worker>;

    /// Bring up the worker's backing instance. Resolves once it is ready
    /// to take requests.
    fn provision<'a>(&'a self, worker: &'a Worker) -> PlatformFuture<'a>;

    /// Tear down the worker's backing instance.
    fn destroy<'a>(&'a self, worker: &'a Worker) -> PlatformFuture<'a>;
}

/// Build the backend selected by `config.platform.kind`.
pub fn from_config(config: &HerdConfig) -> Arc<dyn Platform> {
    match config.platform.kind {
        PlatformKind::Mock => Arc::new(MockPlatform::new()),
        PlatformKind::Static => Arc::new(StaticPlatform::from_config(config)),
    }
}
