//! The base client: owns one cached [`SharedRegistryClient`] per configured
//! registry and one cached [`BaseRepository`] per `(registry, repository)`
//! pair, so the copy engine and tree orchestrator never rebuild a transport
//! stack or re-list tags they've already fetched this run.

mod repository;

pub use repository::BaseRepository;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::auth::build_authenticator;
use crate::config::RegistriesConfig;
use crate::error::{FreightlinerError, FreightlinerResult};
use crate::naming::validate_repository_name;
use crate::registry::{build_registry_client, SharedRegistryClient};

/// Owns the registry client cache and repository cache for one replication
/// run (or one long-lived server process).
pub struct BaseClient {
    registries: RegistriesConfig,
    call_timeout: Duration,
    registry_clients: RwLock<HashMap<String, SharedRegistryClient>>,
    repositories: RwLock<HashMap<(String, String), Arc<BaseRepository>>>,
}

impl BaseClient {
    /// Builds a client over `registries`, using `call_timeout` for every
    /// provider client's transport stack unless a registry overrides it.
    pub fn new(registries: RegistriesConfig, call_timeout: Duration) -> Self {
        Self {
            registries,
            call_timeout,
            registry_clients: RwLock::new(HashMap::new()),
            repositories: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached [`SharedRegistryClient`] for `registry_name`,
    /// building (and caching) one on first use.
    pub async fn get_registry_client(&self, registry_name: &str) -> FreightlinerResult<SharedRegistryClient> {
        if let Some(client) = self.registry_clients.read().await.get(registry_name) {
            return Ok(client.clone());
        }

        let config = self
            .registries
            .registries
            .get(registry_name)
            .ok_or_else(|| FreightlinerError::not_found(format!("registry '{registry_name}' is not configured")))?;

        let mut guard = self.registry_clients.write().await;
        // Re-check: another caller may have raced us between the read lock
        // release above and taking the write lock.
        if let Some(client) = guard.get(registry_name) {
            return Ok(client.clone());
        }

        let authenticator = build_authenticator(config)?;
        let timeout = config.call_timeout.unwrap_or(self.call_timeout);
        let client = build_registry_client(config, authenticator, timeout)?;
        guard.insert(registry_name.to_string(), client.clone());
        Ok(client)
    }

    /// Returns the cached [`BaseRepository`] for `(registry_name, repository)`,
    /// building (and caching) one on first use.
    ///
    /// ## Errors
    ///
    /// Returns [`FreightlinerError::invalid_input`] if `repository` fails
    /// [`validate_repository_name`], or [`FreightlinerError::not_found`] if
    /// `registry_name` is not configured.
    pub async fn get_repository(
        &self,
        registry_name: &str,
        repository: &str,
    ) -> FreightlinerResult<Arc<BaseRepository>> {
        validate_repository_name(repository)?;
        let key = (registry_name.to_string(), repository.to_string());

        if let Some(repo) = self.repositories.read().await.get(&key) {
            return Ok(repo.clone());
        }

        let client = self.get_registry_client(registry_name).await?;

        let mut guard = self.repositories.write().await;
        if let Some(repo) = guard.get(&key) {
            return Ok(repo.clone());
        }
        let repo = Arc::new(BaseRepository::new(client, repository.to_string()));
        guard.insert(key, repo.clone());
        Ok(repo)
    }

    /// The configuration this client was built from.
    pub fn registries(&self) -> &RegistriesConfig {
        &self.registries
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_registry_is_not_found() {
        let client = BaseClient::new(RegistriesConfig::default(), Duration::from_secs(30));
        let err = client.get_registry_client("missing").await.unwrap_err();
        assert!(err.is_kind(crate::error::RegistryErrorKind::NotFound));
    }

    #[tokio::test]
    async fn invalid_repository_name_is_rejected() {
        let client = BaseClient::new(RegistriesConfig::default(), Duration::from_secs(30));
        let err = client.get_repository("missing", "").await.unwrap_err();
        assert!(err.is_kind(crate::error::RegistryErrorKind::InvalidInput));
    }
}
