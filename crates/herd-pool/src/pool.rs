//! Worker pool — membership, scale lifecycle, dispatch, shutdown.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use herd_core::{HerdConfig, WorkerId, WorkerState};
use herd_proxy::ForwardBody;
use http::{Request, Response};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::dispatch::{mock_response, DispatchMode, LeasedBody, WorkerLease};
use crate::error::{PoolError, PoolResult};
use crate::platform::{self, Platform, PlatformError};
use crate::queue::IdleQueue;
use crate::worker::Worker;

/// Tunables for a pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of members, provisioning workers included.
    pub capacity: usize,
    /// Bound on how long dispatch and scale-down wait for an idle worker.
    /// `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            capacity: 10,
            acquire_timeout: None,
        }
    }
}

impl PoolOptions {
    pub fn from_config(config: &HerdConfig) -> Self {
        Self {
            capacity: config.pool.worker_cap,
            acquire_timeout: config.acquire_timeout(),
        }
    }
}

/// One worker's entry in a status listing. Serializes as `{id: state}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub state: WorkerState,
}

impl Serialize for WorkerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.id, &self.state)?;
        map.end()
    }
}

/// Aggregate counts for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub capacity: usize,
    pub total: usize,
    pub provisioning: usize,
    pub idle: usize,
    pub busy: usize,
    pub destroy_failures: u64,
    pub closed: bool,
}

/// Handle returned by a successful scale-up.
///
/// The worker is already a member. Await [`ScaleUp::ready`] to learn how
/// provisioning ended, or drop the handle to leave it running unobserved.
#[derive(Debug)]
pub struct ScaleUp {
    id: WorkerId,
    ready: oneshot::Receiver<PoolResult<WorkerId>>,
}

impl ScaleUp {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Wait until the worker is idle and dispatchable, or provisioning
    /// failed and the worker was removed.
    pub async fn ready(self) -> PoolResult<WorkerId> {
        self.ready.await.map_err(|_| PoolError::Closed)?
    }
}

struct Members {
    next_seq: u64,
    workers: HashMap<WorkerId, Arc<Worker>>,
    closed: bool,
}

pub(crate) struct PoolInner {
    platform: Arc<dyn Platform>,
    mode: DispatchMode,
    options: PoolOptions,
    members: Mutex<Members>,
    idle: IdleQueue,
    destroy_failures: AtomicU64,
}

impl PoolInner {
    fn members(&self) -> MutexGuard<'_, Members> {
        self.members.lock().expect("pool members lock")
    }

    /// Mark `worker` idle and put it back on the idle queue, unless it has
    /// left the pool meanwhile. Holding the membership lock keeps this
    /// ordered against close draining the queue.
    fn publish(&self, worker: &Arc<Worker>) -> bool {
        let members = self.members();
        let is_member = members
            .workers
            .get(worker.id())
            .is_some_and(|m| Arc::ptr_eq(m, worker));
        if is_member && !members.closed {
            worker.set_state(WorkerState::Idle);
            self.idle.push(Arc::clone(worker));
        }
        is_member && !members.closed
    }

    /// End of a dispatch.
    pub(crate) fn release(&self, worker: &Arc<Worker>) {
        if self.publish(worker) {
            debug!(worker = %worker.id(), "worker released");
        } else {
            debug!(worker = %worker.id(), "worker left the pool while busy; not republished");
        }
    }

    fn remove(&self, worker: &Arc<Worker>) -> bool {
        let mut members = self.members();
        let is_member = members
            .workers
            .get(worker.id())
            .is_some_and(|m| Arc::ptr_eq(m, worker));
        if is_member {
            members.workers.remove(worker.id());
        }
        is_member
    }

    async fn acquire(&self) -> PoolResult<Arc<Worker>> {
        let popped = match self.options.acquire_timeout {
            Some(after) => tokio::time::timeout(after, self.idle.pop())
                .await
                .map_err(|_| PoolError::AcquireTimeout(after))?,
            None => self.idle.pop().await,
        };
        popped.map_err(|_| PoolError::Closed)
    }

    /// Best-effort destroy. Failures are logged and counted, never returned.
    async fn destroy(&self, worker: &Worker) {
        match self.platform.destroy(worker).await {
            Ok(()) => info!(worker = %worker.id(), "worker destroyed"),
            Err(e) => {
                self.destroy_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker = %worker.id(),
                    handle = worker.handle().as_str(),
                    error = %e,
                    "destroying worker instance failed"
                );
            }
        }
    }
}

/// The boss node's pool of workers.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(platform: Arc<dyn Platform>, mode: DispatchMode, options: PoolOptions) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                platform,
                mode,
                options,
                members: Mutex::new(Members {
                    next_seq: 0,
                    workers: HashMap::new(),
                    closed: false,
                }),
                idle: IdleQueue::new(),
                destroy_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Pool with the platform backend and dispatch mode `config` selects.
    pub fn from_config(config: &HerdConfig) -> Self {
        Self::new(
            platform::from_config(config),
            DispatchMode::from_config(config),
            PoolOptions::from_config(config),
        )
    }

    pub fn platform_name(&self) -> &'static str {
        self.inner.platform.name()
    }

    pub fn capacity(&self) -> usize {
        self.inner.options.capacity
    }

    /// Number of members, whatever their state.
    pub fn size(&self) -> usize {
        self.inner.members().workers.len()
    }

    /// Add a worker.
    ///
    /// The capacity check, id allocation and registration commit together
    /// under the membership lock. The worker starts out `Provisioning` and
    /// becomes dispatchable only once its backing instance is ready;
    /// provisioning runs on a background task.
    pub fn scale_up(&self) -> PoolResult<ScaleUp> {
        let worker = {
            let mut members = self.inner.members();
            if members.closed {
                return Err(PoolError::Closed);
            }
            let cap = self.inner.options.capacity;
            if members.workers.len() >= cap {
                warn!(cap, "scale-up rejected: pool at capacity");
                return Err(PoolError::CapacityExceeded { cap });
            }

            let seq = members.next_seq;
            members.next_seq += 1;
            let worker = Arc::new(self.inner.platform.allocate(seq)?);
            if members.workers.contains_key(worker.id()) {
                Err(worker)
            } else {
                members.workers.insert(worker.id().clone(), Arc::clone(&worker));
                Ok(worker)
            }
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(rejected) => {
                // Hand back whatever the platform leased for the rejected worker.
                let id = rejected.id().clone();
                warn!(worker = %id, "allocated worker id already in use; releasing it");
                let pool = Arc::clone(&self.inner);
                tokio::spawn(async move { pool.destroy(&rejected).await });
                return Err(PlatformError::DuplicateId(id).into());
            }
        };

        info!(
            worker = %worker.id(),
            address = worker.address(),
            platform = self.inner.platform.name(),
            "worker registered; provisioning"
        );

        let (tx, rx) = oneshot::channel();
        let pool = Arc::clone(&self.inner);
        let provisioning = Arc::clone(&worker);
        tokio::spawn(async move {
            let result = provision(&pool, provisioning).await;
            let _ = tx.send(result);
        });

        Ok(ScaleUp {
            id: worker.id().clone(),
            ready: rx,
        })
    }

    /// Scale up `count` workers and wait for all of them to be ready.
    ///
    /// Returns how many became ready; provisioning failures are logged and
    /// skipped, a rejected scale-up aborts.
    pub async fn warm_up(&self, count: usize) -> PoolResult<usize> {
        let mut pending = Vec::with_capacity(count);
        for _ in 0..count {
            pending.push(self.scale_up()?);
        }

        let mut ready = 0;
        for handle in pending {
            let id = handle.id().clone();
            match handle.ready().await {
                Ok(_) => ready += 1,
                Err(e) => warn!(worker = %id, error = %e, "warm-up worker did not become ready"),
            }
        }
        info!(requested = count, ready, "worker pool warmed");
        Ok(ready)
    }

    /// Remove one idle worker and destroy its instance.
    ///
    /// Waits until a worker is idle; busy workers are never taken since
    /// only idle workers are ever on the queue. Destroy failures are
    /// logged and counted in [`PoolSummary::destroy_failures`].
    pub async fn scale_down(&self) -> PoolResult<WorkerId> {
        loop {
            let worker = self.inner.acquire().await?;
            if !self.inner.remove(&worker) {
                debug!(worker = %worker.id(), "queued worker no longer a member; skipping");
                continue;
            }
            info!(worker = %worker.id(), "scaling down worker");
            self.inner.destroy(&worker).await;
            return Ok(worker.id().clone());
        }
    }

    /// Run one request on an idle worker.
    ///
    /// Waits for an idle worker, marks it busy, then either answers with
    /// the mock acknowledgement or forwards the request. The worker goes
    /// back on the idle queue when the response body has been streamed,
    /// or immediately when forwarding fails. Forward failures come back
    /// as [`PoolError::Proxy`] and are not retried.
    pub async fn dispatch(&self, req: Request<ForwardBody>) -> PoolResult<Response<ForwardBody>> {
        let worker = self.inner.acquire().await?;
        let lease = WorkerLease::new(Arc::clone(&self.inner), worker);
        debug!(worker = %lease.worker().id(), method = %req.method(), uri = %req.uri(), "dispatching");

        match &self.inner.mode {
            DispatchMode::Mock => Ok(mock_response(lease)),
            DispatchMode::Forward(forwarder) => {
                let resp = forwarder.forward(req, lease.worker().address()).await?;
                Ok(resp.map(|body| herd_proxy::boxed(LeasedBody::new(body, lease))))
            }
        }
    }

    /// Point-in-time state of every member, in creation order.
    pub fn status(&self) -> Vec<WorkerStatus> {
        let members = self.inner.members();
        let mut workers: Vec<&Arc<Worker>> = members.workers.values().collect();
        workers.sort_by_key(|w| w.seq());
        workers
            .into_iter()
            .map(|w| WorkerStatus {
                id: w.id().clone(),
                state: w.state(),
            })
            .collect()
    }

    /// Member states keyed by worker id.
    pub fn workers(&self) -> BTreeMap<WorkerId, WorkerState> {
        self.inner
            .members()
            .workers
            .values()
            .map(|w| (w.id().clone(), w.state()))
            .collect()
    }

    pub fn summary(&self) -> PoolSummary {
        let members = self.inner.members();
        let mut summary = PoolSummary {
            capacity: self.inner.options.capacity,
            total: members.workers.len(),
            provisioning: 0,
            idle: 0,
            busy: 0,
            destroy_failures: self.inner.destroy_failures.load(Ordering::Relaxed),
            closed: members.closed,
        };
        for worker in members.workers.values() {
            match worker.state() {
                WorkerState::Provisioning => summary.provisioning += 1,
                WorkerState::Idle => summary.idle += 1,
                WorkerState::Busy => summary.busy += 1,
            }
        }
        summary
    }

    /// Remove and destroy every member, idle or not.
    ///
    /// Waiters on the idle queue fail with [`PoolError::Closed`], as does
    /// every later scale-up or dispatch. Busy workers finish their current
    /// request but are not republished. Returns how many workers were
    /// destroyed; a second call destroys nothing.
    pub async fn close(&self) -> usize {
        let mut workers: Vec<Arc<Worker>> = {
            let mut members = self.inner.members();
            members.closed = true;
            self.inner.idle.close();
            self.inner.idle.drain();
            members.workers.drain().map(|(_, w)| w).collect()
        };
        workers.sort_by_key(|w| w.seq());

        info!(count = workers.len(), "closing worker pool");
        for worker in &workers {
            self.inner.destroy(worker).await;
        }
        workers.len()
    }
}

/// Background half of scale-up.
async fn provision(pool: &PoolInner, worker: Arc<Worker>) -> PoolResult<WorkerId> {
    let id = worker.id().clone();
    match pool.platform.provision(&worker).await {
        Ok(()) => {
            if pool.publish(&worker) {
                info!(worker = %id, "worker ready");
                Ok(id)
            } else {
                debug!(worker = %id, "worker left the pool during provisioning");
                Err(PoolError::Closed)
            }
        }
        Err(source) => {
            warn!(worker = %id, error = %source, "provisioning failed; removing worker");
            if pool.remove(&worker) {
                pool.destroy(&worker).await;
            }
            Err(PoolError::ProvisioningFailed { worker: id, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use herd_proxy::{full_body, Forwarder};
    use http::StatusCode;
    use http_body_util::BodyExt;

    use crate::platform::MockPlatform;

    fn mock_pool(capacity: usize) -> (Arc<MockPlatform>, WorkerPool) {
        mock_pool_with(MockPlatform::new(), capacity, None)
    }

    fn mock_pool_with(
        platform: MockPlatform,
        capacity: usize,
        acquire_timeout: Option<Duration>,
    ) -> (Arc<MockPlatform>, WorkerPool) {
        let platform = Arc::new(platform);
        let pool = WorkerPool::new(
            platform.clone(),
            DispatchMode::Mock,
            PoolOptions {
                capacity,
                acquire_timeout,
            },
        );
        (platform, pool)
    }

    fn request() -> Request<ForwardBody> {
        Request::builder().uri("/run").body(full_body("")).unwrap()
    }

    async fn body_text(resp: Response<ForwardBody>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn capacity_two_rejects_third_scale_up() {
        let (_, pool) = mock_pool(2);
        pool.scale_up().unwrap();
        pool.scale_up().unwrap();
        let err = pool.scale_up().unwrap_err();
        assert!(matches!(err, PoolError::CapacityExceeded { cap: 2 }));
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn mock_dispatch_names_worker() {
        let (_, pool) = mock_pool(1);
        let id = pool.scale_up().unwrap().ready().await.unwrap();

        let resp = pool.dispatch(request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, format!("hello from {id}\n"));
        assert_eq!(pool.summary().idle, 1);
    }

    #[tokio::test]
    async fn worker_is_busy_while_response_streams() {
        let (_, pool) = mock_pool(1);
        pool.scale_up().unwrap().ready().await.unwrap();

        let resp = pool.dispatch(request()).await.unwrap();
        assert_eq!(pool.status()[0].state, WorkerState::Busy);
        drop(resp);
        assert_eq!(pool.status()[0].state, WorkerState::Idle);
    }

    #[tokio::test]
    async fn unreachable_worker_is_gateway_error_and_stays_in_rotation() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let platform = Arc::new(MockPlatform::new());
        let pool = WorkerPool::new(
            platform,
            DispatchMode::Forward(Forwarder::new(port, Duration::from_secs(1), None)),
            PoolOptions {
                capacity: 1,
                acquire_timeout: Some(Duration::from_secs(2)),
            },
        );
        pool.scale_up().unwrap().ready().await.unwrap();

        let first = pool.dispatch(request()).await.unwrap_err();
        match &first {
            PoolError::Proxy(e) => assert_eq!(e.status(), StatusCode::BAD_GATEWAY),
            other => panic!("expected proxy failure, got {other:?}"),
        }

        // The same worker is acquired again rather than timing out.
        let second = pool.dispatch(request()).await.unwrap_err();
        assert!(matches!(second, PoolError::Proxy(_)));
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.summary().idle, 1);
    }

    #[tokio::test]
    async fn scale_down_waits_for_busy_worker() {
        let (platform, pool) = mock_pool(1);
        let id = pool.scale_up().unwrap().ready().await.unwrap();

        let held = pool.dispatch(request()).await.unwrap();

        let scaling = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.scale_down().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scaling.is_finished());
        assert_eq!(pool.size(), 1);
        assert!(platform.destroyed().is_empty());

        drop(held);
        let removed = scaling.await.unwrap().unwrap();
        assert_eq!(removed, id);
        assert_eq!(pool.size(), 0);
        assert_eq!(platform.destroyed(), vec![id]);
    }

    #[tokio::test]
    async fn scale_down_skips_provisioning_workers() {
        let (_, pool) = mock_pool_with(
            MockPlatform::new().with_provision_delay(Duration::from_millis(200)),
            1,
            Some(Duration::from_millis(30)),
        );
        pool.scale_up().unwrap();
        let err = pool.scale_down().await.unwrap_err();
        assert!(matches!(err, PoolError::AcquireTimeout(_)));
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let (_, pool) = mock_pool(2);
        pool.scale_up().unwrap().ready().await.unwrap();
        pool.scale_up().unwrap().ready().await.unwrap();
        pool.scale_down().await.unwrap();
        pool.scale_down().await.unwrap();

        let next = pool.scale_up().unwrap();
        assert_eq!(next.id().as_str(), "worker-2");
    }

    #[tokio::test]
    async fn worker_hidden_until_provisioned() {
        let (_, pool) = mock_pool_with(
            MockPlatform::new().with_provision_delay(Duration::from_millis(100)),
            1,
            Some(Duration::from_millis(20)),
        );
        let handle = pool.scale_up().unwrap();
        assert_eq!(pool.status()[0].state, WorkerState::Provisioning);
        assert!(matches!(
            pool.dispatch(request()).await.unwrap_err(),
            PoolError::AcquireTimeout(_)
        ));

        handle.ready().await.unwrap();
        assert!(pool.dispatch(request()).await.is_ok());
    }

    #[tokio::test]
    async fn failed_provisioning_removes_and_destroys_worker() {
        let platform = MockPlatform::new();
        platform.set_fail_provisioning(true);
        let (platform, pool) = mock_pool_with(platform, 2, None);

        let err = pool.scale_up().unwrap().ready().await.unwrap_err();
        assert!(matches!(err, PoolError::ProvisioningFailed { .. }));
        assert_eq!(pool.size(), 0);
        assert_eq!(platform.destroyed(), vec![WorkerId::new("worker-0")]);
    }

    #[tokio::test]
    async fn destroy_failure_is_counted_not_returned() {
        let (platform, pool) = mock_pool(1);
        pool.scale_up().unwrap().ready().await.unwrap();
        platform.set_fail_destroy(true);

        assert!(pool.scale_down().await.is_ok());
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.summary().destroy_failures, 1);
    }

    #[tokio::test]
    async fn close_destroys_every_member_once() {
        let (platform, pool) = mock_pool(3);
        pool.warm_up(3).await.unwrap();
        let held = pool.dispatch(request()).await.unwrap();

        assert_eq!(pool.close().await, 3);
        assert_eq!(pool.size(), 0);
        let destroyed: HashSet<_> = platform.destroyed().into_iter().collect();
        assert_eq!(destroyed.len(), 3);
        assert_eq!(platform.destroyed().len(), 3);

        // The busy worker's release does not resurrect it.
        drop(held);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.close().await, 0);
        assert_eq!(platform.destroyed().len(), 3);
    }

    #[tokio::test]
    async fn close_fails_waiters_and_later_calls() {
        let (_, pool) = mock_pool(1);
        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.dispatch(request()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.close().await;
        assert!(matches!(waiting.await.unwrap().unwrap_err(), PoolError::Closed));
        assert!(matches!(pool.scale_up().unwrap_err(), PoolError::Closed));
        assert!(matches!(pool.scale_down().await.unwrap_err(), PoolError::Closed));
        assert!(pool.summary().closed);
    }

    #[tokio::test]
    async fn close_during_provisioning_never_publishes() {
        let (platform, pool) = mock_pool_with(
            MockPlatform::new().with_provision_delay(Duration::from_millis(100)),
            1,
            None,
        );
        let handle = pool.scale_up().unwrap();

        assert_eq!(pool.close().await, 1);
        assert!(matches!(handle.ready().await.unwrap_err(), PoolError::Closed));
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.summary().idle, 0);
        assert!(pool.inner.idle.is_empty());
        assert_eq!(platform.destroyed(), vec![WorkerId::new("worker-0")]);
    }

    /// Hands out the same id every time.
    #[derive(Default)]
    struct FixedIdPlatform {
        destroyed: Mutex<Vec<u64>>,
    }

    impl Platform for FixedIdPlatform {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn allocate(&self, seq: u64) -> crate::platform::PlatformResult<Worker> {
            Ok(Worker::new(
                seq,
                WorkerId::new("worker-fixed"),
                "127.0.0.1",
                crate::worker::PlatformHandle::new(format!("fixed-{seq}")),
            ))
        }

        fn provision<'a>(&'a self, _worker: &'a Worker) -> crate::platform::PlatformFuture<'a> {
            Box::pin(async { Ok(()) })
        }

        fn destroy<'a>(&'a self, worker: &'a Worker) -> crate::platform::PlatformFuture<'a> {
            Box::pin(async move {
                self.destroyed.lock().unwrap().push(worker.seq());
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn duplicate_id_releases_allocated_worker() {
        let platform = Arc::new(FixedIdPlatform::default());
        let pool = WorkerPool::new(platform.clone(), DispatchMode::Mock, PoolOptions::default());

        pool.scale_up().unwrap().ready().await.unwrap();
        let err = pool.scale_up().unwrap_err();
        assert!(matches!(err, PoolError::Platform(PlatformError::DuplicateId(_))));
        assert_eq!(pool.size(), 1);

        for _ in 0..50 {
            if !platform.destroyed.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*platform.destroyed.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn status_serializes_as_single_entry_maps() {
        let (_, pool) = mock_pool(2);
        pool.warm_up(2).await.unwrap();
        let _held = pool.dispatch(request()).await.unwrap();

        let json = serde_json::to_value(pool.status()).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        for entry in entries {
            assert_eq!(entry.as_object().unwrap().len(), 1);
        }
        let busy = entries
            .iter()
            .filter(|e| e.as_object().unwrap().values().any(|v| v == "busy"))
            .count();
        assert_eq!(busy, 1);

        let summary = pool.summary();
        assert_eq!((summary.total, summary.idle, summary.busy), (2, 1, 1));
        assert_eq!(pool.workers().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scale_up_respects_capacity() {
        let (_, pool) = mock_pool(5);
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move { pool.scale_up().map(|h| h.id().clone()) }));
        }
        let mut ok = HashSet::new();
        for t in tasks {
            match t.await.unwrap() {
                Ok(id) => assert!(ok.insert(id)),
                Err(e) => assert!(matches!(e, PoolError::CapacityExceeded { cap: 5 })),
            }
        }
        assert_eq!(ok.len(), 5);
        assert_eq!(pool.size(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatch_never_shares_a_worker() {
        let (_, pool) = mock_pool(3);
        pool.warm_up(3).await.unwrap();
        let held = Arc::new(Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for _ in 0..40 {
            let pool = pool.clone();
            let held = Arc::clone(&held);
            tasks.push(tokio::spawn(async move {
                let resp = pool.dispatch(request()).await.unwrap();
                let (_, body) = resp.into_parts();
                // Peek at the worker name without finishing the body.
                let mut body = body;
                let frame = body.frame().await.unwrap().unwrap();
                let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
                assert!(held.lock().unwrap().insert(text.clone()), "{text} dispatched twice");
                tokio::time::sleep(Duration::from_millis(5)).await;
                held.lock().unwrap().remove(&text);
                drop(body);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        let summary = pool.summary();
        assert_eq!((summary.idle, summary.busy), (3, 0));
    }
}
