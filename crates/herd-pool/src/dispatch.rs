//! Dispatch plumbing: how a request runs on a worker and how the worker
//! gets back into rotation afterwards.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use herd_core::{HerdConfig, PlatformKind, WorkerState};
use herd_proxy::{full_body, BoxError, ForwardBody, Forwarder};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body::{Body, Frame, SizeHint};

use crate::pool::PoolInner;
use crate::worker::Worker;

/// What a dispatched request does once it holds a worker.
#[derive(Clone)]
pub enum DispatchMode {
    /// Answer `200 hello from <worker-id>` without leaving the process.
    Mock,
    /// Replay the request against the worker's endpoint.
    Forward(Forwarder),
}

impl DispatchMode {
    /// Mock platform dispatches in mock mode; every other backend forwards.
    pub fn from_config(config: &HerdConfig) -> Self {
        match config.platform.kind {
            PlatformKind::Mock => DispatchMode::Mock,
            PlatformKind::Static => DispatchMode::Forward(Forwarder::new(
                config.proxy.worker_port,
                config.connect_timeout(),
                config.request_timeout(),
            )),
        }
    }
}

/// Exclusive hold on a worker taken off the idle queue.
///
/// Creating a lease marks the worker busy; dropping it marks the worker
/// idle and publishes it again, exactly once, whatever the outcome of the
/// request.
pub struct WorkerLease {
    pool: Arc<PoolInner>,
    worker: Arc<Worker>,
}

impl WorkerLease {
    pub(crate) fn new(pool: Arc<PoolInner>, worker: Arc<Worker>) -> Self {
        worker.set_state(WorkerState::Busy);
        Self { pool, worker }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.pool.release(&self.worker);
    }
}

/// Response body that keeps its worker leased until the body has been
/// fully streamed (or dropped).
pub struct LeasedBody {
    inner: ForwardBody,
    lease: Option<WorkerLease>,
}

impl LeasedBody {
    pub fn new(inner: ForwardBody, lease: WorkerLease) -> Self {
        Self {
            inner,
            lease: Some(lease),
        }
    }
}

impl Body for LeasedBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(polled, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.lease.take();
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// The canned mock-mode acknowledgement.
pub(crate) fn mock_response(lease: WorkerLease) -> Response<ForwardBody> {
    let body = full_body(format!("hello from {}\n", lease.worker().id()));
    let mut resp = Response::new(herd_proxy::boxed(LeasedBody::new(body, lease)));
    *resp.status_mut() = StatusCode::OK;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}
