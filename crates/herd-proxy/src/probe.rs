//! Readiness probing for freshly provisioned workers.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result of a single readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint answered with a non-2xx status.
    Unhealthy,
    /// No answer: connect, handshake or request failed, or timed out.
    Failed,
}

/// Probe `http://<authority><path>` once.
pub async fn http_probe(authority: &str, path: &str, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, probe_once(authority, path)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%authority, %path, "readiness probe timed out");
            ProbeResult::Failed
        }
    }
}

async fn probe_once(authority: &str, path: &str) -> ProbeResult {
    let stream = match tokio::net::TcpStream::connect(authority).await {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, %authority, "readiness probe connect failed");
            return ProbeResult::Failed;
        }
    };

    let (mut sender, conn) = match hyper::client::conn::http1::handshake(TokioIo::new(stream)).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(error = %e, %authority, "readiness probe handshake failed");
            return ProbeResult::Failed;
        }
    };
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = match http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", authority)
        .header("user-agent", "herd-probe/0.1")
        .body(Empty::<Bytes>::new())
    {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, %authority, %path, "readiness probe request invalid");
            return ProbeResult::Failed;
        }
    };

    match sender.send_request(req).await {
        Ok(resp) if resp.status().is_success() => ProbeResult::Healthy,
        Ok(resp) => {
            debug!(status = %resp.status(), %authority, "readiness probe non-2xx");
            ProbeResult::Unhealthy
        }
        Err(e) => {
            debug!(error = %e, %authority, "readiness probe request failed");
            ProbeResult::Failed
        }
    }
}

/// Probe every `interval` until the endpoint is healthy or `deadline`
/// elapses. Returns whether the endpoint became healthy.
pub async fn wait_ready(authority: &str, path: &str, interval: Duration, deadline: Duration) -> bool {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return false;
        }
        if http_probe(authority, path, interval.min(remaining).max(Duration::from_millis(50))).await
            == ProbeResult::Healthy
        {
            info!(%authority, attempts, "worker endpoint ready");
            return true;
        }
        if started.elapsed() + interval >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}
