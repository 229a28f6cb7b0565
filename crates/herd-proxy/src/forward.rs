//! Request forwarding to worker endpoints.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, HOST};
use http::{Request, Response, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::error::{ProxyError, ProxyResult};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type flowing through the forwarder in both directions.
pub type ForwardBody = UnsyncBoxBody<Bytes, BoxError>;

/// Box any byte body into a `ForwardBody`.
pub fn boxed<B>(body: B) -> ForwardBody
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A complete, in-memory `ForwardBody`.
pub fn full_body(bytes: impl Into<Bytes>) -> ForwardBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Replays inbound requests against `<worker-address>:<worker_port>`.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, ForwardBody>,
    worker_port: u16,
    request_timeout: Option<Duration>,
}

impl Forwarder {
    pub fn new(worker_port: u16, connect_timeout: Duration, request_timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            worker_port,
            request_timeout,
        }
    }

    pub fn worker_port(&self) -> u16 {
        self.worker_port
    }

    /// Authority (`host:port`) the worker at `address` is reached on.
    pub fn worker_authority(&self, address: &str) -> String {
        format!("{address}:{}", self.worker_port)
    }

    /// Forward `req` to the worker at `address`.
    ///
    /// Method, headers and body are sent as received; only the scheme,
    /// authority and `Host` header are rewritten. The upstream status,
    /// headers and streaming body are returned unaltered. Transport
    /// failures are reported once and never retried.
    pub async fn forward(
        &self,
        mut req: Request<ForwardBody>,
        address: &str,
    ) -> ProxyResult<Response<ForwardBody>> {
        let authority = self.worker_authority(address);
        *req.uri_mut() = rewrite_uri(req.uri(), &authority)?;
        let host = HeaderValue::from_str(&authority)
            .map_err(|_| ProxyError::InvalidUri(authority.clone()))?;
        req.headers_mut().insert(HOST, host);

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let pending = self.client.request(req);

        let result = match self.request_timeout {
            Some(after) => match tokio::time::timeout(after, pending).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%authority, %method, %path, ?after, "forward timed out");
                    return Err(ProxyError::Timeout { authority, after });
                }
            },
            None => pending.await,
        };

        match result {
            Ok(resp) => {
                debug!(%authority, %method, %path, status = %resp.status(), "forwarded request");
                Ok(resp.map(boxed))
            }
            Err(source) => {
                warn!(%authority, %method, %path, error = %source, "forward failed");
                Err(ProxyError::Upstream { authority, source })
            }
        }
    }
}

/// Point `uri` at `http://<authority>`, keeping its path and query.
pub fn rewrite_uri(uri: &Uri, authority: &str) -> ProxyResult<Uri> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Uri::builder()
        .scheme("http")
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::InvalidUri(format!("{authority}{path_and_query}: {e}")))
}
