//! Loading and merging configuration from defaults, a file or URL, and the
//! process environment, in that order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{validate, RegistriesConfig, RegistryConfig};
use crate::error::{FreightlinerError, FreightlinerResult};

/// Resolves which registries file to load: an explicit `--config` flag
/// wins, then `FREIGHTLINER_CONFIG`, then the built-in default path
/// `~/.freightliner/registries.yaml`.
pub fn resolve_config_path(cli_flag: Option<PathBuf>) -> PathBuf {
    cli_flag
        .or_else(|| std::env::var("FREIGHTLINER_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".freightliner")
                .join("registries.yaml")
        })
}

/// The two structured formats a registries file may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Toml,
}

fn format_for_path(path: &str) -> ConfigFormat {
    if path.ends_with(".toml") {
        ConfigFormat::Toml
    } else {
        ConfigFormat::Yaml
    }
}

/// Parses `content` as a [`RegistriesConfig`] in the given format.
pub fn load_from_reader(content: &str, format_hint: &str) -> FreightlinerResult<RegistriesConfig> {
    let format = format_for_path(format_hint);
    match format {
        ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
        ConfigFormat::Toml => Ok(toml::from_str(content)?),
    }
}

/// Loads configuration from `source` (a local file path, or an `http(s)://`
/// URL), applies environment overrides, and validates the result.
///
/// ## Errors
///
/// Returns [`FreightlinerError::ConfigInvalidMany`] if the merged
/// configuration fails validation; an I/O, HTTP, YAML, or TOML error
/// propagates unchanged if loading itself fails.
pub async fn load_config(source: &str) -> FreightlinerResult<RegistriesConfig> {
    let content = if source.starts_with("http://") || source.starts_with("https://") {
        reqwest::get(source)
            .await
            .map_err(FreightlinerError::Http)?
            .error_for_status()
            .map_err(FreightlinerError::Http)?
            .text()
            .await
            .map_err(FreightlinerError::Http)?
    } else {
        tokio::fs::read_to_string(source).await?
    };

    let mut config = load_from_reader(&content, source)?;
    apply_env_overrides(&mut config);

    let problems = validate::validate_registries(&config);
    if !problems.is_empty() {
        return Err(FreightlinerError::ConfigInvalidMany(problems));
    }
    Ok(config)
}

/// Synthesizes a single-registry [`RegistriesConfig`] from legacy flat
/// environment variables, for deployments that configure Freightliner
/// without a registries file at all.
///
/// Recognises `FREIGHTLINER_REGISTRY_TYPE`, `FREIGHTLINER_REGISTRY_URI`,
/// `FREIGHTLINER_REGION`, and `FREIGHTLINER_ACCOUNT_ID`. Returns `None` if
/// the minimum required pair (`TYPE`, `URI`) is absent.
pub fn load_from_env() -> Option<RegistriesConfig> {
    let registry_type = std::env::var("FREIGHTLINER_REGISTRY_TYPE").ok()?;
    let uri = std::env::var("FREIGHTLINER_REGISTRY_URI").ok()?;

    let config = RegistryConfig {
        registry_type,
        uri,
        region: std::env::var("FREIGHTLINER_REGION").ok(),
        account_id: std::env::var("FREIGHTLINER_ACCOUNT_ID").ok(),
        auth_type: std::env::var("FREIGHTLINER_AUTH_TYPE").ok(),
        username: std::env::var("FREIGHTLINER_USERNAME").ok(),
        password: std::env::var("FREIGHTLINER_PASSWORD").ok(),
        service_account_key_path: std::env::var("FREIGHTLINER_SERVICE_ACCOUNT_KEY").ok(),
        tenant_id: std::env::var("FREIGHTLINER_TENANT_ID").ok(),
        client_id: std::env::var("FREIGHTLINER_CLIENT_ID").ok(),
        client_secret: std::env::var("FREIGHTLINER_CLIENT_SECRET").ok(),
        aws_access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
        aws_secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
        aws_session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        insecure_skip_verify: false,
        call_timeout: None,
    };

    let mut registries = BTreeMap::new();
    registries.insert("default".to_string(), config);
    Some(RegistriesConfig {
        registries,
        defaults: super::JobDefaults::default(),
    })
}

/// Overlays per-registry environment overrides of the form
/// `FREIGHTLINER_REGISTRY_<NAME>_PASSWORD`, letting operators inject
/// secrets into an otherwise-checked-in config file without editing it.
fn apply_env_overrides(config: &mut RegistriesConfig) {
    for (name, registry) in config.registries.iter_mut() {
        let key = name.to_uppercase().replace(['-', '.'], "_");
        if let Ok(password) = std::env::var(format!("FREIGHTLINER_REGISTRY_{key}_PASSWORD")) {
            registry.password = Some(password);
        }
        if let Ok(username) = std::env::var(format!("FREIGHTLINER_REGISTRY_{key}_USERNAME")) {
            registry.username = Some(username);
        }
        if let Ok(secret) = std::env::var(format!("FREIGHTLINER_REGISTRY_{key}_CLIENT_SECRET")) {
            registry.client_secret = Some(secret);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const YAML_SAMPLE: &str = r#"
registries:
  src:
    registry_type: gcr
    uri: gcr.io/my-project
  dst:
    registry_type: ecr
    uri: 123456789012.dkr.ecr.us-west-2.amazonaws.com
    region: us-west-2
    account_id: "123456789012"
"#;

    #[test]
    fn parses_yaml_registries() {
        let config = load_from_reader(YAML_SAMPLE, "registries.yaml").unwrap();
        assert_eq!(config.registries.len(), 2);
        assert_eq!(config.registries["src"].registry_type, "gcr");
    }

    #[test]
    fn env_overrides_apply_per_registry_password() {
        let mut config = load_from_reader(YAML_SAMPLE, "registries.yaml").unwrap();
        std::env::set_var("FREIGHTLINER_REGISTRY_SRC_PASSWORD", "secret-from-env");
        apply_env_overrides(&mut config);
        assert_eq!(
            config.registries["src"].password.as_deref(),
            Some("secret-from-env")
        );
        std::env::remove_var("FREIGHTLINER_REGISTRY_SRC_PASSWORD");
    }

    #[test]
    fn legacy_env_requires_type_and_uri() {
        std::env::remove_var("FREIGHTLINER_REGISTRY_TYPE");
        std::env::remove_var("FREIGHTLINER_REGISTRY_URI");
        assert!(load_from_env().is_none());
    }

    #[test]
    fn cli_flag_wins_over_env_and_default() {
        std::env::set_var("FREIGHTLINER_CONFIG", "/env/registries.yaml");
        let resolved = resolve_config_path(Some(PathBuf::from("/cli/registries.yaml")));
        assert_eq!(resolved, PathBuf::from("/cli/registries.yaml"));
        std::env::remove_var("FREIGHTLINER_CONFIG");
    }

    #[test]
    fn env_var_wins_over_default() {
        std::env::remove_var("FREIGHTLINER_CONFIG");
        std::env::set_var("FREIGHTLINER_CONFIG", "/env/registries.yaml");
        let resolved = resolve_config_path(None);
        assert_eq!(resolved, PathBuf::from("/env/registries.yaml"));
        std::env::remove_var("FREIGHTLINER_CONFIG");
    }
}
