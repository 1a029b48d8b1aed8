//! Per-provider credential resolution and caching.
//!
//! Every provider authenticator produces an `Authorization` header value on
//! demand and caches it according to the provider's own expiry rules (see
//! [`cache::TokenCache`]). The transport layer calls [`Authenticator::invalidate`]
//! when a request comes back 401/403 so the next attempt re-resolves instead
//! of replaying a stale header.

mod acr;
mod cache;
mod ecr;
mod generic;
mod ghcr;
mod gcr;

pub use acr::AcrAuthenticator;
pub use cache::TokenCache;
pub use ecr::EcrAuthenticator;
pub use gcr::GcrAuthenticator;
pub use generic::GenericAuthenticator;
pub use ghcr::GhcrAuthenticator;

use std::sync::Arc;

use reqwest::header::HeaderValue;

use crate::config::RegistryConfig;
use crate::error::FreightlinerResult;

/// Resolves and caches the credential used to talk to one registry.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the `Authorization` header value to attach to the next
    /// request, resolving and caching a fresh credential if needed.
    async fn auth_header(&self) -> FreightlinerResult<Option<HeaderValue>>;

    /// Drops any cached credential, forcing the next [`Authenticator::auth_header`]
    /// call to resolve from scratch. Called after a 401/403.
    async fn invalidate(&self);

    /// Short provider tag used in log lines (`"ecr"`, `"gcr"`, ...).
    fn provider(&self) -> &'static str;
}

/// Shared handle to an authenticator, held by a provider client and its
/// transport middleware chain alike.
pub type SharedAuthenticator = Arc<dyn Authenticator>;

/// An authenticator that never attaches a header. Used for registries
/// configured as `auth_type: anonymous` or as a generic-v2 fallback when no
/// credentials are configured.
pub struct AnonymousAuthenticator;

#[async_trait::async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn auth_header(&self) -> FreightlinerResult<Option<HeaderValue>> {
        Ok(None)
    }

    async fn invalidate(&self) {}

    fn provider(&self) -> &'static str {
        "anonymous"
    }
}

/// Builds the authenticator appropriate for a registry's configured type,
/// per [`crate::naming::classify_registry_type`].
pub fn build_authenticator(config: &RegistryConfig) -> FreightlinerResult<SharedAuthenticator> {
    use crate::naming::UriRegistryType;

    let registry_type = crate::naming::classify_registry_type(&config.registry_type)?;
    let authenticator: SharedAuthenticator = match registry_type {
        UriRegistryType::Ecr => Arc::new(ecr::EcrAuthenticator::from_config(config)?),
        UriRegistryType::Gcr => Arc::new(gcr::GcrAuthenticator::from_config(config)?),
        UriRegistryType::Ghcr => Arc::new(ghcr::GhcrAuthenticator::from_config(config)?),
        UriRegistryType::Acr => Arc::new(acr::AcrAuthenticator::from_config(config)?),
        UriRegistryType::Generic => {
            if config.auth_type.as_deref() == Some("anonymous") {
                Arc::new(AnonymousAuthenticator)
            } else {
                Arc::new(generic::GenericAuthenticator::from_config(config)?)
            }
        }
    };
    Ok(authenticator)
}
