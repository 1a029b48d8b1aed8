//! Retry-with-jitter, applied to registry-flavoured status codes.
//!
//! Order matters: this middleware sits *outside* [`super::auth::AuthMiddleware`]
//! so that a fresh `Authorization` header is computed on every attempt --
//! a 401/403 clears the cached credential (see [`is_retry_once_status`])
//! before the inner auth middleware runs again.

use std::time::Duration;

use rand::Rng;
use reqwest::{Request, Response, StatusCode};
use reqwest_middleware::{Extensions, Middleware, Next, Result};

/// Base delay for the first retry; doubles every subsequent attempt.
const BASE_DELAY: Duration = Duration::from_millis(200);
/// Attempts beyond this are all backed off as if they were attempt 10.
const MAX_BACKOFF_ATTEMPT: u32 = 10;
/// No single backoff sleep exceeds this, regardless of attempt number.
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Fractional jitter applied to each computed delay (±25%).
const JITTER_FRACTION: f64 = 0.25;

/// Status codes that indicate success; none of these are retried.
pub fn is_success_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        200 | 201 | 202 | 204 | 206 | 302 | 307 | 308
    )
}

/// Status codes worth retrying with backoff: rate limiting, upstream
/// overload, and Cloudflare's 520-524 family.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        408 | 429 | 500 | 502 | 503 | 504 | 520..=524
    )
}

/// 401/403 are retried exactly once: they usually mean the cached token
/// just expired, not that the credential is permanently invalid.
pub fn is_retry_once_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 403)
}

fn backoff_delay(attempt: u32) -> Duration {
    let capped_attempt = attempt.min(MAX_BACKOFF_ATTEMPT);
    let base = BASE_DELAY.as_millis() as f64 * 2f64.powi(capped_attempt as i32 - 1);
    let jitter_factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
    let millis = (base * jitter_factor).min(MAX_BACKOFF.as_millis() as f64);
    Duration::from_millis(millis.max(0.0) as u64)
}

/// Classification of what the retry loop should do with a given outcome.
enum Disposition {
    Stop,
    RetryAfter(Duration),
    RetryOnceThenStop(Duration),
}

fn classify(status: Option<StatusCode>, retry_once_used: bool, attempt: u32) -> Disposition {
    match status {
        Some(status) if is_success_status(status) => Disposition::Stop,
        Some(status) if is_retryable_status(status) => {
            Disposition::RetryAfter(backoff_delay(attempt))
        }
        Some(status) if is_retry_once_status(status) && !retry_once_used => {
            Disposition::RetryOnceThenStop(backoff_delay(attempt))
        }
        Some(_) => Disposition::Stop,
        // Network-level errors (no status at all) are treated like any
        // other retryable failure.
        None => Disposition::RetryAfter(backoff_delay(attempt)),
    }
}

/// Retries transient failures with exponential backoff and jitter, per the
/// status-code taxonomy in [`is_success_status`]/[`is_retryable_status`]/
/// [`is_retry_once_status`].
pub struct RetryMiddleware {
    max_attempts: u32,
}

impl RetryMiddleware {
    /// Builds a retry middleware with the default attempt cap.
    pub fn new() -> Self {
        Self::with_max_attempts(MAX_BACKOFF_ATTEMPT)
    }

    /// Builds a retry middleware with an explicit attempt cap (used by
    /// tests to force deterministic short sequences).
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl Default for RetryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Middleware for RetryMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        // `reqwest::Request` is only `Clone`-able via `try_clone`, and that
        // fails for streamed bodies. A streamed PUT/POST is run once, no
        // matter what comes back; buffered bodies (and bodyless GETs) can
        // be replayed for every attempt.
        let mut attempt: u32 = 0;
        let mut retry_once_used = false;
        let mut pending_req = Some(req);

        loop {
            attempt += 1;
            let this_attempt = pending_req.take().expect("request available for this attempt");
            // Keep a clone around for a possible next attempt *before*
            // sending, since `next.run` consumes the request.
            let next_attempt = this_attempt.try_clone();

            let result = next.clone().run(this_attempt, extensions).await;

            let status = match &result {
                Ok(resp) => Some(resp.status()),
                Err(_) => None,
            };

            let can_retry = next_attempt.is_some() && attempt < self.max_attempts;
            if !can_retry {
                return result;
            }

            match classify(status, retry_once_used, attempt) {
                Disposition::Stop => return result,
                Disposition::RetryAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    pending_req = next_attempt;
                }
                Disposition::RetryOnceThenStop(delay) => {
                    retry_once_used = true;
                    tokio::time::sleep(delay).await;
                    pending_req = next_attempt;
                }
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_codes_are_not_retried() {
        for code in [200, 201, 202, 204, 206, 302, 307, 308] {
            assert!(is_success_status(StatusCode::from_u16(code).unwrap()));
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn five_xx_and_rate_limit_are_retryable() {
        for code in [408, 429, 500, 502, 503, 504, 520, 521, 524] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn bad_request_is_not_retried() {
        assert!(!is_retryable_status(StatusCode::from_u16(400).unwrap()));
        assert!(!is_retry_once_status(StatusCode::from_u16(400).unwrap()));
    }

    #[test]
    fn auth_errors_are_retry_once() {
        assert!(is_retry_once_status(StatusCode::from_u16(401).unwrap()));
        assert!(is_retry_once_status(StatusCode::from_u16(403).unwrap()));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let first = backoff_delay(1).as_millis();
        let second = backoff_delay(2).as_millis();
        // second should roughly double first, within jitter bounds.
        assert!(first >= 150 && first <= 250);
        assert!(second >= 300 && second <= 500);

        let huge = backoff_delay(20);
        assert!(huge <= MAX_BACKOFF);
    }
}
