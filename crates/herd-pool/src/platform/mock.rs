//! In-process platform for mock mode and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use herd_core::WorkerId;
use tracing::debug;

use super::{Platform, PlatformError, PlatformFuture, PlatformResult};
use crate::worker::{PlatformHandle, Worker};

/// Platform with no real instances behind its workers.
///
/// Records every provision and destroy call so tests can assert on them,
/// and can be told to delay or fail provisioning and destruction.
pub struct MockPlatform {
    address: String,
    provision_delay: Duration,
    fail_provisioning: AtomicBool,
    fail_destroy: AtomicBool,
    calls: Mutex<Calls>,
}

#[derive(Default)]
struct Calls {
    provisioned: Vec<WorkerId>,
    destroyed: Vec<WorkerId>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            provision_delay: Duration::ZERO,
            fail_provisioning: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Address handed to every allocated worker.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_provision_delay(mut self, delay: Duration) -> Self {
        self.provision_delay = delay;
        self
    }

    pub fn set_fail_provisioning(&self, fail: bool) {
        self.fail_provisioning.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Workers whose provisioning completed, in completion order.
    pub fn provisioned(&self) -> Vec<WorkerId> {
        self.calls.lock().expect("mock calls lock").provisioned.clone()
    }

    /// Every destroy call received, in call order (failed ones included).
    pub fn destroyed(&self) -> Vec<WorkerId> {
        self.calls.lock().expect("mock calls lock").destroyed.clone()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MockPlatform {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn allocate(&self, seq: u64) -> PlatformResult<Worker> {
        Ok(Worker::new(
            seq,
            WorkerId::new(format!("worker-{seq}")),
            self.address.clone(),
            PlatformHandle::new(format!("mock-{seq}")),
        ))
    }

    fn provision<'a>(&'a self, worker: &'a Worker) -> PlatformFuture<'a> {
        Box::pin(async move {
            if !self.provision_delay.is_zero() {
                tokio::time::sleep(self.provision_delay).await;
            }
            if self.fail_provisioning.load(Ordering::SeqCst) {
                return Err(PlatformError::Backend(format!(
                    "mock provisioning failure for {}",
                    worker.id()
                )));
            }
            debug!(worker = %worker.id(), "mock instance provisioned");
            self.calls
                .lock()
                .expect("mock calls lock")
                .provisioned
                .push(worker.id().clone());
            Ok(())
        })
    }

    fn destroy<'a>(&'a self, worker: &'a Worker) -> PlatformFuture<'a> {
        Box::pin(async move {
            self.calls
                .lock()
                .expect("mock calls lock")
                .destroyed
                .push(worker.id().clone());
            if self.fail_destroy.load(Ordering::SeqCst) {
                return Err(PlatformError::Backend(format!(
                    "mock destroy failure for {}",
                    worker.id()
                )));
            }
            debug!(worker = %worker.id(), "mock instance destroyed");
            Ok(())
        })
    }
}
