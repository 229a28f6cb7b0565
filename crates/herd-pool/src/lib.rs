//! herd-pool — the worker pool behind the boss node.
//!
//! Owns pool membership and the idle-worker queue, and exposes the
//! operations that mutate them:
//!
//! - **Scale up**: register a worker as `Provisioning`, provision its
//!   backing instance in the background, publish it idle once ready
//! - **Scale down**: take one idle worker off the queue and destroy it
//! - **Dispatch**: take an idle worker, run one request on it, put it back
//! - **Close**: remove and destroy every member regardless of state
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//!   ├── Platform (allocate / provision / destroy, per backend)
//!   ├── Mutex<Members> (id → Worker, next seq, closed flag)
//!   ├── IdleQueue (blocking FIFO of idle workers)
//!   └── DispatchMode (canned mock reply | Forwarder)
//! ```
//!
//! A worker taken off the idle queue is held by exactly one caller until
//! it is published again. That single-owner handoff is what makes the
//! per-worker state safe to flip without holding the membership lock.

pub mod dispatch;
pub mod error;
pub mod platform;
pub mod pool;
pub mod queue;
pub mod worker;

pub use dispatch::{DispatchMode, LeasedBody, WorkerLease};
pub use error::{PoolError, PoolResult};
pub use platform::{MockPlatform, Platform, PlatformError, PlatformFuture, PlatformResult, StaticPlatform};
pub use pool::{PoolOptions, PoolSummary, ScaleUp, WorkerPool, WorkerStatus};
pub use queue::{IdleQueue, QueueClosed};
pub use worker::{PlatformHandle, Worker};
