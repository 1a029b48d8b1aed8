//! The resilient transport stack: a pooled base [`reqwest::Client`] wrapped
//! by a fixed, composable middleware chain.
//!
//! Wrapper order, outer to inner, is fixed by design:
//! `Timeout -> Retry -> Logging -> Auth -> base client`. Retries must be
//! accounted for inside the outer timeout, logging must see the
//! post-auth request, and auth must be applied fresh on every retry
//! attempt (a 401/403 clears the cached credential before the retry).

mod auth;
mod logging;
mod pool;
mod retry;
mod timeout;

pub use auth::AuthMiddleware;
pub use logging::LoggingMiddleware;
pub use pool::{base_client, reset_shared_transport_for_tests, tls_verification_enabled};
pub use retry::{is_retryable_status, is_retry_once_status, is_success_status, RetryMiddleware};
pub use timeout::TimeoutMiddleware;

use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::auth::SharedAuthenticator;

/// Assembles the full `Timeout -> Retry -> Logging -> Auth -> base client`
/// chain for one provider client.
///
/// `insecure` mirrors the registry's `insecure_skip_verify` config flag;
/// honoured only when `FREIGHTLINER_ALLOW_INSECURE_TLS` is truthy (see
/// [`pool::tls_verification_enabled`]) -- otherwise verification stays on
/// and a warning is logged once per client construction.
pub fn build_client(
    authenticator: SharedAuthenticator,
    call_timeout: Duration,
    insecure: bool,
) -> ClientWithMiddleware {
    let base = pool::base_client(insecure);
    ClientBuilder::new(base)
        .with(TimeoutMiddleware::new(call_timeout))
        .with(RetryMiddleware::new())
        .with(LoggingMiddleware)
        .with(AuthMiddleware::new(authenticator))
        .build()
}
