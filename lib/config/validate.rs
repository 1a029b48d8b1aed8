//! Structural validation of a merged [`super::RegistriesConfig`].
//!
//! Validation never fails fast: every registry is checked and every
//! problem found is collected, so an operator sees the whole list of fixes
//! needed in one pass instead of playing whack-a-mole.

use super::{RegistriesConfig, RegistryConfig};
use crate::naming::is_valid_registry_type;

/// Validates `config`, returning one message per problem found. An empty
/// vec means the configuration is usable as-is.
pub fn validate_registries(config: &RegistriesConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.registries.is_empty() {
        problems.push("no registries configured".to_string());
    }

    for (name, registry) in &config.registries {
        validate_one(name, registry, &mut problems);
    }

    problems
}

fn validate_one(name: &str, registry: &RegistryConfig, problems: &mut Vec<String>) {
    if !is_valid_registry_type(&registry.registry_type) {
        problems.push(format!(
            "registry '{name}': unsupported registry_type '{}'",
            registry.registry_type
        ));
        // The type-specific checks below assume a recognised type; skip them.
        return;
    }

    if registry.uri.trim().is_empty() {
        problems.push(format!("registry '{name}': uri must not be empty"));
    }

    match registry.registry_type.as_str() {
        "ecr" => {
            if registry.region.is_none() {
                problems.push(format!("registry '{name}': ecr requires region"));
            }
            if registry.account_id.is_none() {
                problems.push(format!("registry '{name}': ecr requires account_id"));
            }
        }
        "acr" => {
            if registry.account_id.is_none() {
                problems.push(format!(
                    "registry '{name}': acr requires account_id (the registry name)"
                ));
            }
            let has_sp_credentials =
                registry.tenant_id.is_some() && registry.client_id.is_some() && registry.client_secret.is_some();
            let has_none = registry.tenant_id.is_none() && registry.client_id.is_none() && registry.client_secret.is_none();
            if !has_sp_credentials && !has_none {
                problems.push(format!(
                    "registry '{name}': acr service-principal auth requires tenant_id, client_id, and client_secret together"
                ));
            }
        }
        "ghcr" => {
            // A PAT is resolved at runtime from password/env, so no
            // required fields at config time.
        }
        "gcr" => {
            // Falls back to Application Default Credentials when no
            // service_account_key_path is set; nothing is strictly required.
        }
        "generic" => {
            if registry.auth_type.as_deref() == Some("basic") && registry.username.is_none() {
                problems.push(format!(
                    "registry '{name}': generic basic auth requires username"
                ));
            }
        }
        _ => unreachable!("unsupported types are filtered out above"),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with(registries: BTreeMap<String, RegistryConfig>) -> RegistriesConfig {
        RegistriesConfig {
            registries,
            defaults: super::super::JobDefaults::default(),
        }
    }

    fn bare(registry_type: &str) -> RegistryConfig {
        RegistryConfig {
            registry_type: registry_type.to_string(),
            uri: "example.com/repo".to_string(),
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
    fn empty_registries_is_a_problem() {
        let config = config_with(BTreeMap::new());
        let problems = validate_registries(&config);
        assert!(problems.iter().any(|p| p.contains("no registries")));
    }

    #[test]
    fn ecr_requires_region_and_account_id() {
        let mut registries = BTreeMap::new();
        registries.insert("src".to_string(), bare("ecr"));
        let config = config_with(registries);
        let problems = validate_registries(&config);
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn ecr_with_required_fields_passes() {
        let mut reg = bare("ecr");
        reg.region = Some("us-west-2".to_string());
        reg.account_id = Some("123456789012".to_string());
        let mut registries = BTreeMap::new();
        registries.insert("src".to_string(), reg);
        let config = config_with(registries);
        assert!(validate_registries(&config).is_empty());
    }

    #[test]
    fn acr_rejects_partial_service_principal() {
        let mut reg = bare("acr");
        reg.account_id = Some("myregistry".to_string());
        reg.tenant_id = Some("tenant".to_string());
        let mut registries = BTreeMap::new();
        registries.insert("dst".to_string(), reg);
        let config = config_with(registries);
        let problems = validate_registries(&config);
        assert!(problems.iter().any(|p| p.contains("tenant_id, client_id")));
    }

    #[test]
    fn unsupported_type_is_reported_without_further_checks() {
        let mut registries = BTreeMap::new();
        registries.insert("bad".to_string(), bare("bogus"));
        let config = config_with(registries);
        let problems = validate_registries(&config);
        assert_eq!(problems.len(), 1);
    }
}
