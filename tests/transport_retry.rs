//! Exercises the `Timeout -> Retry -> Logging -> Auth -> base client` chain
//! against a real HTTP server (`mockito`) instead of just the status-code
//! classification helpers unit-tested alongside `lib/transport/retry.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use freightliner::auth::AnonymousAuthenticator;
use freightliner::transport::build_client;

fn anonymous_client(timeout: Duration) -> reqwest_middleware::ClientWithMiddleware {
    build_client(Arc::new(AnonymousAuthenticator), timeout, false)
}

#[test_log::test(tokio::test)]
async fn cloudflare_520_524_retries_then_succeeds() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;

    // Created first (oldest): once the newer 521 mock below is exhausted,
    // mockito falls back to this one.
    let ok = server
        .mock("GET", "/v2/library/alpine/tags/list")
        .with_status(200)
        .with_body("{\"tags\":[\"latest\"]}")
        .expect(1)
        .create_async()
        .await;
    // Created second (newest): mockito matches the most recently created
    // mock first, so the first two attempts land here until its `expect`
    // budget is spent.
    let unavailable = server
        .mock("GET", "/v2/library/alpine/tags/list")
        .with_status(521)
        .expect(2)
        .create_async()
        .await;

    let client = anonymous_client(Duration::from_secs(5));
    let url = format!("{}/v2/library/alpine/tags/list", server.url());
    let response = client.get(&url).send().await?;

    assert_eq!(response.status(), 200);
    unavailable.assert_async().await;
    ok.assert_async().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn rate_limit_429_then_success_backs_off_between_attempts() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;

    let ok = server
        .mock("PUT", "/v2/library/alpine/manifests/v1.0.0")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let rate_limited = server
        .mock("PUT", "/v2/library/alpine/manifests/v1.0.0")
        .with_status(429)
        .expect(1)
        .create_async()
        .await;

    let client = anonymous_client(Duration::from_secs(5));
    let url = format!("{}/v2/library/alpine/manifests/v1.0.0", server.url());

    let started = Instant::now();
    let response = client.put(&url).send().await?;
    let elapsed = started.elapsed();

    assert_eq!(response.status(), 200);
    rate_limited.assert_async().await;
    ok.assert_async().await;
    // Backoff for the first retry is 200ms base with up to 25% jitter
    // either way; allow slack for the jitter floor without flaking.
    assert!(
        elapsed >= Duration::from_millis(100),
        "expected a backoff sleep before the retry, got {elapsed:?}"
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn bad_request_is_not_retried() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let bad_request = server
        .mock("GET", "/v2/library/alpine/manifests/missing")
        .with_status(400)
        .expect(1)
        .create_async()
        .await;

    let client = anonymous_client(Duration::from_secs(5));
    let url = format!("{}/v2/library/alpine/manifests/missing", server.url());
    let response = client.get(&url).send().await?;

    assert_eq!(response.status(), 400);
    bad_request.assert_async().await;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn insecure_without_env_override_still_reaches_the_verified_client_path() -> anyhow::Result<()> {
    // `FREIGHTLINER_ALLOW_INSECURE_TLS` is unset in the test process, so
    // `insecure: true` here must still route through the verified base
    // client rather than one with certificate verification disabled.
    // `mockito` serves plain HTTP, so this doesn't exercise a certificate
    // rejection directly -- that decision is covered deterministically by
    // `tls_verification_enabled()`'s own unit tests in `lib/transport/pool.rs`.
    // This test instead confirms the end-to-end request path still works
    // when a registry is configured with `insecure_skip_verify` but the
    // environment override is absent.
    std::env::remove_var("FREIGHTLINER_ALLOW_INSECURE_TLS");

    let mut server = mockito::Server::new_async().await;
    let ok = server.mock("GET", "/v2/").with_status(200).expect(1).create_async().await;

    let client = build_client(Arc::new(AnonymousAuthenticator), Duration::from_secs(5), true);
    let url = format!("{}/v2/", server.url());
    let response = client.get(&url).send().await?;

    assert_eq!(response.status(), 200);
    ok.assert_async().await;
    Ok(())
}
