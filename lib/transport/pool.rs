//! The process-wide pooled base transport.
//!
//! A single base [`reqwest::Client`] is built lazily on first use and
//! reused by every provider client for connection pooling -- this is a
//! design requirement, not an optimisation: creating a fresh
//! `reqwest::Client` per request would defeat HTTP/2 multiplexing and
//! connection reuse under load.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;

/// Environment variable that, when truthy (`true`/`1`), allows
/// `insecure_skip_verify` registries to actually skip TLS verification.
/// This is a security invariant: by default the flag is ignored and
/// verification stays on.
pub const ALLOW_INSECURE_TLS_ENV: &str = "FREIGHTLINER_ALLOW_INSECURE_TLS";

static SHARED_VERIFIED: OnceLock<Client> = OnceLock::new();
static SHARED_INSECURE: OnceLock<Client> = OnceLock::new();

/// Reports whether the environment currently allows insecure TLS.
pub fn tls_verification_enabled() -> bool {
    !matches!(
        std::env::var(ALLOW_INSECURE_TLS_ENV).as_deref(),
        Ok("true") | Ok("1")
    )
}

fn build_raw_client(accept_invalid_certs: bool) -> Client {
    // HTTP/2 is negotiated automatically via ALPN once TLS is up; reqwest
    // doesn't expose a single "total pool size" knob, only per-host, so the
    // 20-per-host / 50-total-per-host split in the design note collapses to
    // the per-host figure here.
    Client::builder()
        .use_rustls_tls()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .pool_max_idle_per_host(20)
        .pool_idle_timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .expect("static reqwest client configuration is always valid")
}

/// Returns the shared base client for the given insecurity preference.
///
/// `insecure` reflects the registry config's `insecure_skip_verify`; it is
/// only honoured when [`tls_verification_enabled`] says the environment
/// allows it. Otherwise verification stays on and a warning is logged.
pub fn base_client(insecure: bool) -> Client {
    let allow_insecure = insecure && !tls_verification_enabled();
    if insecure && !allow_insecure {
        tracing::warn!(
            "registry requested insecure_skip_verify but {} is not set; proceeding with TLS verification enabled",
            ALLOW_INSECURE_TLS_ENV
        );
    }

    if allow_insecure {
        SHARED_INSECURE
            .get_or_init(|| build_raw_client(true))
            .clone()
    } else {
        SHARED_VERIFIED
            .get_or_init(|| build_raw_client(false))
            .clone()
    }
}

/// Test-only hook to force the shared transports to be rebuilt. The
/// production code path never needs this: the singleton lives for the
/// life of the process.
#[cfg(test)]
pub fn reset_shared_transport_for_tests() {
    // `OnceLock` has no public reset; tests that need a fresh client build
    // one directly via `build_raw_client` instead of going through the
    // singleton.
}

#[cfg(not(test))]
pub fn reset_shared_transport_for_tests() {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_tls_is_blocked_without_env_override() {
        std::env::remove_var(ALLOW_INSECURE_TLS_ENV);
        assert!(tls_verification_enabled());
    }

    #[test]
    fn insecure_tls_env_values_are_recognised() {
        std::env::set_var(ALLOW_INSECURE_TLS_ENV, "true");
        assert!(!tls_verification_enabled());
        std::env::set_var(ALLOW_INSECURE_TLS_ENV, "1");
        assert!(!tls_verification_enabled());
        std::env::set_var(ALLOW_INSECURE_TLS_ENV, "false");
        assert!(tls_verification_enabled());
        std::env::remove_var(ALLOW_INSECURE_TLS_ENV);
    }
}
