//! Structured per-request tracing, emitted after auth so the logged URL and
//! method reflect what was actually sent on the wire.

use std::time::Instant;

use reqwest::{Request, Response};
use reqwest_middleware::{Extensions, Middleware, Next, Result};

/// Emits one `tracing` event per request with method, URL, status (or
/// error), and duration.
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        let started = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = started.elapsed().as_millis();

        match &result {
            Ok(resp) => {
                tracing::debug!(
                    method = %method,
                    url = %url,
                    status = resp.status().as_u16(),
                    duration_ms = elapsed_ms,
                    "registry request completed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    method = %method,
                    url = %url,
                    duration_ms = elapsed_ms,
                    error = %err,
                    "registry request failed"
                );
            }
        }

        result
    }
}
