//! Static host roster platform.
//!
//! Workers are pre-existing hosts listed in `platform.hosts`. Allocation
//! leases a free host, provisioning waits for the host's readiness
//! endpoint, destruction returns the host to the roster.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use herd_core::{HerdConfig, WorkerId};
use tracing::{info, warn};

use super::{Platform, PlatformError, PlatformFuture, PlatformResult};
use crate::worker::{PlatformHandle, Worker};

pub struct StaticPlatform {
    free: Mutex<VecDeque<String>>,
    worker_port: u16,
    readiness_path: String,
    probe_interval: Duration,
    readiness_timeout: Duration,
}

impl StaticPlatform {
    pub fn new(
        hosts: Vec<String>,
        worker_port: u16,
        readiness_path: impl Into<String>,
        probe_interval: Duration,
        readiness_timeout: Duration,
    ) -> Self {
        Self {
            free: Mutex::new(hosts.into()),
            worker_port,
            readiness_path: readiness_path.into(),
            probe_interval,
            readiness_timeout,
        }
    }

    pub fn from_config(config: &HerdConfig) -> Self {
        Self::new(
            config.platform.hosts.clone(),
            config.proxy.worker_port,
            config.platform.readiness_path.clone(),
            config.probe_interval(),
            config.readiness_timeout(),
        )
    }

    /// Hosts not currently leased to a worker.
    pub fn free_hosts(&self) -> usize {
        self.free.lock().expect("roster lock").len()
    }
}

impl Platform for StaticPlatform {
    fn name(&self) -> &'static str {
        "static"
    }

    fn allocate(&self, seq: u64) -> PlatformResult<Worker> {
        let host = self
            .free
            .lock()
            .expect("roster lock")
            .pop_front()
            .ok_or(PlatformError::Exhausted)?;
        Ok(Worker::new(
            seq,
            WorkerId::new(format!("worker-{seq}")),
            host.clone(),
            PlatformHandle::new(host),
        ))
    }

    fn provision<'a>(&'a self, worker: &'a Worker) -> PlatformFuture<'a> {
        Box::pin(async move {
            let authority = format!("{}:{}", worker.address(), self.worker_port);
            let ready = herd_proxy::wait_ready(
                &authority,
                &self.readiness_path,
                self.probe_interval,
                self.readiness_timeout,
            )
            .await;
            if ready {
                info!(worker = %worker.id(), %authority, "static host ready");
                Ok(())
            } else {
                Err(PlatformError::NotReady {
                    worker: worker.id().clone(),
                    after: self.readiness_timeout,
                })
            }
        })
    }

    fn destroy<'a>(&'a self, worker: &'a Worker) -> PlatformFuture<'a> {
        Box::pin(async move {
            let host = worker.handle().as_str().to_string();
            let mut free = self.free.lock().expect("roster lock");
            if free.contains(&host) {
                warn!(worker = %worker.id(), %host, "host already back in roster");
            } else {
                free.push_back(host.clone());
                info!(worker = %worker.id(), %host, "static host released");
            }
            Ok(())
        })
    }
}
