//! Layered configuration: built-in defaults, an optional file or URL, then
//! environment overrides, each validated before use.

mod load;
mod validate;

pub use load::{load_config, load_from_env, load_from_reader, resolve_config_path};
pub use validate::validate_registries;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration: every registry Freightliner knows how to talk
/// to, keyed by the short name used in [`crate::types::RepoRef::registry`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistriesConfig {
    /// Registries, keyed by name.
    #[serde(default)]
    pub registries: BTreeMap<String, RegistryConfig>,
    /// Defaults applied to every replication job unless overridden per
    /// request.
    #[serde(default)]
    pub defaults: JobDefaults,
}

/// One configured registry endpoint and its credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// The provider type: one of `ecr`, `gcr`, `ghcr`, `acr`, `generic`.
    pub registry_type: String,
    /// The registry's base URI (host, with optional path prefix).
    pub uri: String,
    /// AWS region, required for `ecr`.
    #[serde(default)]
    pub region: Option<String>,
    /// AWS account ID (`ecr`) or Azure Container Registry name (`acr`).
    #[serde(default)]
    pub account_id: Option<String>,
    /// Explicit auth strategy override (`basic`, `bearer`, `anonymous`).
    /// When unset, the provider authenticator picks its own default.
    #[serde(default)]
    pub auth_type: Option<String>,
    /// Static username, used by `generic` and as an ECR/GHCR override.
    #[serde(default)]
    pub username: Option<String>,
    /// Static password or token, used by `generic`/`ghcr`. May contain
    /// `${VAR}` placeholders resolved against the process environment.
    #[serde(default)]
    pub password: Option<String>,
    /// Path to a GCP service-account JSON key file.
    #[serde(default)]
    pub service_account_key_path: Option<String>,
    /// Azure AD tenant ID, required for `acr`.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Azure AD application (client) ID, required for `acr`.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Azure AD application client secret, required for `acr`. May contain
    /// `${VAR}` placeholders.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// AWS access key ID override; falls back to the environment/instance
    /// role when unset.
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    /// AWS secret access key override, paired with `aws_access_key_id`.
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    /// AWS session token, for temporary credentials.
    #[serde(default)]
    pub aws_session_token: Option<String>,
    /// Skip TLS certificate verification for this registry. Only honoured
    /// when `FREIGHTLINER_ALLOW_INSECURE_TLS` is set; see
    /// [`crate::transport::tls_verification_enabled`].
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Per-call HTTP timeout override, in human-readable form (`"30s"`).
    #[serde(default, with = "humantime_serde::option")]
    pub call_timeout: Option<std::time::Duration>,
}

/// Defaults applied to a [`crate::types::ReplicationJob`] unless the request
/// overrides them explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefaults {
    /// Default concurrent worker count for tree replication (0 = auto).
    #[serde(default)]
    pub workers: usize,
    /// Default checkpoint directory.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
    /// Default per-call HTTP timeout.
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: std::time::Duration,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            workers: 0,
            checkpoint_dir: default_checkpoint_dir(),
            call_timeout: default_call_timeout(),
        }
    }
}

fn default_checkpoint_dir() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".freightliner")
        .join("checkpoints")
        .to_string_lossy()
        .into_owned()
}

fn default_call_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(60)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_defaults_has_sane_fallbacks() {
        let defaults = JobDefaults::default();
        assert_eq!(defaults.workers, 0);
        assert_eq!(defaults.call_timeout, std::time::Duration::from_secs(60));
    }
}
