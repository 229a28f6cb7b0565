//! Pool error types.

use std::time::Duration;

use herd_core::WorkerId;
use herd_proxy::ProxyError;
use thiserror::Error;

use crate::platform::PlatformError;

/// Errors returned by pool operations. All of them are recoverable:
/// none leaves the pool in an inconsistent state.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("exceeded maximum number of workers ({cap})")]
    CapacityExceeded { cap: usize },

    #[error("worker pool is closed")]
    Closed,

    #[error("no idle worker became available within {0:?}")]
    AcquireTimeout(Duration),

    #[error("provisioning worker {worker} failed: {source}")]
    ProvisioningFailed {
        worker: WorkerId,
        #[source]
        source: PlatformError,
    },

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("proxy failure: {0}")]
    Proxy(#[from] ProxyError),
}

pub type PoolResult<T> = Result<T, PoolError>;
