//! Generic OCI distribution-spec v2 authentication: Basic, Bearer, or
//! Anonymous, with `${VAR}` placeholders in `username`/`password` resolved
//! against the process environment at construction time so a checked-in
//! config file never needs to carry a raw secret.

use reqwest::header::HeaderValue;

use super::Authenticator;
use crate::config::RegistryConfig;
use crate::error::{FreightlinerError, FreightlinerResult};

/// Resolves a static Basic or Bearer credential for a generic registry.
pub struct GenericAuthenticator {
    mode: Mode,
}

enum Mode {
    Basic { user: String, pass: String },
    Bearer { token: String },
    Anonymous,
}

impl GenericAuthenticator {
    /// Builds an authenticator from config. `auth_type` selects the mode
    /// explicitly (`basic`, `bearer`, `anonymous`); when unset, the
    /// presence of `username`/`password` implies `basic`.
    pub fn from_config(config: &RegistryConfig) -> FreightlinerResult<Self> {
        let username = config.username.as_deref().map(resolve_env_placeholders);
        let password = config.password.as_deref().map(resolve_env_placeholders);

        let mode = match config.auth_type.as_deref() {
            Some("bearer") => Mode::Bearer {
                token: password.ok_or_else(|| {
                    FreightlinerError::invalid_input("bearer auth requires password (the token)")
                })?,
            },
            Some("anonymous") => Mode::Anonymous,
            Some("basic") | None => match (username, password) {
                (Some(user), Some(pass)) => Mode::Basic { user, pass },
                (None, None) => Mode::Anonymous,
                _ => {
                    return Err(FreightlinerError::invalid_input(
                        "basic auth requires both username and password",
                    ))
                }
            },
            Some(other) => {
                return Err(FreightlinerError::invalid_input(format!(
                    "'{other}' is not a supported generic auth_type (expected basic, bearer, or anonymous)"
                )))
            }
        };

        Ok(Self { mode })
    }
}

/// Replaces every `${VAR}` occurrence with the value of the environment
/// variable `VAR`, leaving the placeholder untouched if the variable is
/// unset.
fn resolve_env_placeholders(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var_name = &after[..end];
                if let Ok(value) = std::env::var(var_name) {
                    result.push_str(&value);
                } else {
                    result.push_str(&rest[start..start + 2 + end + 1]);
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    result.push_str(rest);
    result
}

#[async_trait::async_trait]
impl Authenticator for GenericAuthenticator {
    async fn auth_header(&self) -> FreightlinerResult<Option<HeaderValue>> {
        let value = match &self.mode {
            Mode::Basic { user, pass } => {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                let encoded = STANDARD.encode(format!("{user}:{pass}"));
                Some(format!("Basic {encoded}"))
            }
            Mode::Bearer { token } => Some(format!("Bearer {token}")),
            Mode::Anonymous => None,
        };
        value
            .map(|v| {
                HeaderValue::from_str(&v)
                    .map_err(|e| FreightlinerError::invalid_input(format!("invalid auth header: {e}")))
            })
            .transpose()
    }

    async fn invalidate(&self) {}

    fn provider(&self) -> &'static str {
        "generic"
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> RegistryConfig {
        RegistryConfig {
            registry_type: "generic".into(),
            uri: "registry.example.com".into(),
            region: None,
            account_id: None,
            auth_type: None,
            username: None,
            password: None,
            service_account_key_path: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_session_token: None,
            insecure_skip_verify: false,
            call_timeout: None,
        }
    }

    #[test]
    fn env_placeholder_is_substituted() {
        std::env::set_var("FREIGHTLINER_TEST_PASS", "swordfish");
        let resolved = resolve_env_placeholders("${FREIGHTLINER_TEST_PASS}");
        assert_eq!(resolved, "swordfish");
        std::env::remove_var("FREIGHTLINER_TEST_PASS");
    }

    #[test]
    fn unset_placeholder_is_left_literal() {
        std::env::remove_var("FREIGHTLINER_TEST_UNSET");
        let resolved = resolve_env_placeholders("${FREIGHTLINER_TEST_UNSET}");
        assert_eq!(resolved, "${FREIGHTLINER_TEST_UNSET}");
    }

    #[tokio::test]
    async fn no_credentials_is_anonymous() {
        let auth = GenericAuthenticator::from_config(&bare_config()).unwrap();
        assert!(auth.auth_header().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn basic_credentials_produce_basic_header() {
        let mut config = bare_config();
        config.username = Some("user".into());
        config.password = Some("pass".into());
        let auth = GenericAuthenticator::from_config(&config).unwrap();
        let header = auth.auth_header().await.unwrap().unwrap();
        assert!(header.to_str().unwrap().starts_with("Basic "));
    }

    #[tokio::test]
    async fn bearer_auth_type_uses_password_as_token() {
        let mut config = bare_config();
        config.auth_type = Some("bearer".into());
        config.password = Some("tok123".into());
        let auth = GenericAuthenticator::from_config(&config).unwrap();
        let header = auth.auth_header().await.unwrap().unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer tok123");
    }

    #[test]
    fn basic_requires_both_fields() {
        let mut config = bare_config();
        config.username = Some("user".into());
        assert!(GenericAuthenticator::from_config(&config).is_err());
    }
}
