//! herd-proxy — forwards dispatched requests to workers.
//!
//! The boss never executes work itself. Each dispatched request is
//! rewritten to target the chosen worker's fixed-port endpoint and
//! replayed there; the upstream response streams back untouched.
//!
//! # Components
//!
//! - **`forward`** — `Forwarder`, a pooled HTTP/1 client that rewrites
//!   scheme and authority and never retries
//! - **`probe`** — readiness probing used while a worker's backing
//!   instance is being provisioned

pub mod error;
pub mod forward;
pub mod probe;

pub use error::{ProxyError, ProxyResult};
pub use forward::{boxed, full_body, rewrite_uri, BoxError, ForwardBody, Forwarder};
pub use probe::{http_probe, wait_ready, ProbeResult};
