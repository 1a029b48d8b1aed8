//! The outermost wrapper: bounds each call with a per-request deadline.

use std::time::Duration;

use reqwest::{Request, Response};
use reqwest_middleware::{Error, Extensions, Middleware, Next, Result};

/// Derives a timeout around the inner chain. Does not extend the caller's
/// own cancellation -- whichever fires first wins.
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Builds a middleware that bounds each request to `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl Middleware for TimeoutMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        match tokio::time::timeout(self.timeout, next.run(req, extensions)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Middleware(anyhow::anyhow!(
                "request exceeded timeout of {:?}",
                self.timeout
            ))),
        }
    }
}
