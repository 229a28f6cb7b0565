//! Forwarding error types.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Errors raised while forwarding a request to a worker.
///
/// Every variant is gateway-class: the caller's request was fine, the hop
/// to the worker was not.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(String),

    #[error("upstream {authority} unreachable: {source}")]
    Upstream {
        authority: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("upstream {authority} timed out after {after:?}")]
    Timeout { authority: String, after: Duration },
}

impl ProxyError {
    /// Status code reported to the original caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidUri(_) | ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
