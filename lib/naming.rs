//! Registry path and image reference parsing, plus the small set of
//! stateless naming helpers shared by every provider client.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{FreightlinerError, FreightlinerResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The OCI distribution spec's repository-name grammar: one or more
/// `/`-separated path components, each starting and ending with
/// `[a-z0-9]` and allowing `.`, `_`, `__`, or runs of `-` as internal
/// separators. Every provider we support (Docker Hub, ECR, GCR, ACR,
/// GHCR) accepts this grammar, so it is enforced once here rather than
/// per provider.
static REPOSITORY_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*)*$").unwrap()
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An ordered `(host, repository)` pair derived from a colon/slash-bearing
/// string.
///
/// Parsing splits on the first `/`: the left side is the host, the right
/// side is the (possibly multi-segment) repository. Bare names with no
/// slash have an empty host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPath {
    /// The registry host, empty for bare repository names.
    pub host: String,
    /// The repository name, always lowercase and non-empty.
    pub repository: String,
}

/// Parses `s` into a [`RegistryPath`].
///
/// ## Errors
///
/// Returns [`FreightlinerError::invalid_input`] if `s` has no `/` at all
/// (bare repository names with no host segment are rejected by this
/// helper, per the naming invariant that a path always has a host half --
/// use [`RegistryPath::bare`] to construct a hostless path directly) or if
/// the repository half is empty.
pub fn parse_registry_path(s: &str) -> FreightlinerResult<RegistryPath> {
    match s.split_once('/') {
        Some((host, repo)) if !repo.is_empty() => Ok(RegistryPath {
            host: host.to_string(),
            repository: repo.to_lowercase(),
        }),
        _ => Err(FreightlinerError::invalid_input(format!(
            "'{s}' is not a valid registry path (expected host/repository)"
        ))),
    }
}

/// Formats `(host, repository)` back into its canonical string form. The
/// inverse of [`parse_registry_path`].
pub fn format_registry_path(host: &str, repository: &str) -> String {
    format!("{host}/{repository}")
}

impl RegistryPath {
    /// Builds a hostless registry path directly, bypassing the `/`
    /// requirement [`parse_registry_path`] imposes.
    pub fn bare(repository: impl Into<String>) -> Self {
        Self {
            host: String::new(),
            repository: repository.into().to_lowercase(),
        }
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_registry_path(&self.host, &self.repository))
    }
}

/// The selector half of an [`ImageReference`]: either a tag or a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSelector {
    /// A human-readable tag.
    Tag(String),
    /// A content digest, `algo:hex`.
    Digest(String),
}

/// An atomic addressable unit inside the copy engine: `host/repo:tag` or
/// `host/repo@algo:hex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// The registry path this reference points into.
    pub path: RegistryPath,
    /// The tag or digest selector.
    pub selector: ImageSelector,
}

impl ImageReference {
    /// Builds a tag reference. Rejects an empty tag.
    pub fn with_tag(path: RegistryPath, tag: impl Into<String>) -> FreightlinerResult<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(FreightlinerError::invalid_input("tag must not be empty"));
        }
        Ok(Self {
            path,
            selector: ImageSelector::Tag(tag),
        })
    }

    /// Builds a digest reference. Rejects an empty digest.
    pub fn with_digest(path: RegistryPath, digest: impl Into<String>) -> FreightlinerResult<Self> {
        let digest = digest.into();
        if digest.is_empty() {
            return Err(FreightlinerError::invalid_input(
                "digest must not be empty",
            ));
        }
        Ok(Self {
            path,
            selector: ImageSelector::Digest(digest),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            ImageSelector::Tag(tag) => write!(f, "{}:{}", self.path, tag),
            ImageSelector::Digest(digest) => write!(f, "{}@{}", self.path, digest),
        }
    }
}

/// Validates a repository name against the OCI distribution spec's
/// repository-name grammar (lowercase path components separated by `/`,
/// `.`, `_`, `__`, or `-`).
pub fn validate_repository_name(name: &str) -> FreightlinerResult<()> {
    if name.is_empty() {
        return Err(FreightlinerError::invalid_input(
            "repository name must not be empty",
        ));
    }
    if !REPOSITORY_NAME_REGEX.is_match(name) {
        return Err(FreightlinerError::invalid_input(format!(
            "repository name '{name}' is not a valid lowercase, slash-separated repository path"
        )));
    }
    Ok(())
}

/// The registry flavours Freightliner knows how to drive, derived from a
/// [`crate::config::RegistryConfig`]'s `registry_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriRegistryType {
    /// Amazon Elastic Container Registry.
    Ecr,
    /// Google Container Registry / Artifact Registry.
    Gcr,
    /// GitHub Container Registry.
    Ghcr,
    /// Azure Container Registry.
    Acr,
    /// Any OCI distribution-spec v2 registry with no provider-specific
    /// control-plane behaviour.
    Generic,
}

/// Classifies a configured `registry_type` string into a [`UriRegistryType`].
///
/// ## Errors
///
/// Returns [`FreightlinerError::invalid_input`] if `registry_type` does not
/// name one of the five supported provider types.
pub fn classify_registry_type(registry_type: &str) -> FreightlinerResult<UriRegistryType> {
    match registry_type {
        "ecr" => Ok(UriRegistryType::Ecr),
        "gcr" => Ok(UriRegistryType::Gcr),
        "ghcr" => Ok(UriRegistryType::Ghcr),
        "acr" => Ok(UriRegistryType::Acr),
        "generic" => Ok(UriRegistryType::Generic),
        other => Err(FreightlinerError::invalid_input(format!(
            "'{other}' is not a supported registry type (expected ecr, gcr, ghcr, acr, or generic)"
        ))),
    }
}

/// Formats a fully-qualified repository URI for `registry_type`.
///
/// | type    | template                                              |
/// |---------|-------------------------------------------------------|
/// | ecr     | `{account_id}.dkr.ecr.{region}.amazonaws.com/{repo}`   |
/// | gcr     | `gcr.io/{account_id}/{repo}`                           |
/// | ghcr    | `ghcr.io/{repo}`                                       |
/// | acr     | `{account_id}.azurecr.io/{repo}`                       |
/// | generic | `{type}/{repo}`                                        |
pub fn format_repository_uri(
    registry_type: &str,
    account_id: &str,
    region: &str,
    repo: &str,
) -> String {
    match classify_registry_type(registry_type) {
        Ok(UriRegistryType::Ecr) => format!("{account_id}.dkr.ecr.{region}.amazonaws.com/{repo}"),
        Ok(UriRegistryType::Gcr) => format!("gcr.io/{account_id}/{repo}"),
        Ok(UriRegistryType::Ghcr) => format!("ghcr.io/{repo}"),
        Ok(UriRegistryType::Acr) => format!("{account_id}.azurecr.io/{repo}"),
        Ok(UriRegistryType::Generic) | Err(_) => format!("{registry_type}/{repo}"),
    }
}

/// Reports whether `s` names one of the five supported registry types.
pub fn is_valid_registry_type(s: &str) -> bool {
    matches!(s, "ecr" | "gcr" | "ghcr" | "acr" | "generic")
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_then_format_round_trips() {
        let cases = ["gcr.io/proj/app", "docker.io/library/alpine", "a/b/c"];
        for s in cases {
            let parsed = parse_registry_path(s).unwrap();
            assert_eq!(format_registry_path(&parsed.host, &parsed.repository), s);
        }
    }

    #[test]
    fn parse_lowercases_repository() {
        let parsed = parse_registry_path("Registry.Example.Com/My/Repo").unwrap();
        assert_eq!(parsed.repository, "my/repo");
    }

    #[test]
    fn parse_rejects_bare_name() {
        let err = parse_registry_path("just-a-repo").unwrap_err();
        assert!(err.is_kind(crate::error::RegistryErrorKind::InvalidInput));
    }

    #[test]
    fn parse_rejects_empty_repository() {
        let err = parse_registry_path("gcr.io/").unwrap_err();
        assert!(err.is_kind(crate::error::RegistryErrorKind::InvalidInput));
    }

    #[test]
    fn image_reference_rejects_empty_tag() {
        let path = parse_registry_path("gcr.io/proj/app").unwrap();
        assert!(ImageReference::with_tag(path, "").is_err());
    }

    #[test]
    fn image_reference_displays_tag_form() {
        let path = parse_registry_path("gcr.io/proj/app").unwrap();
        let r = ImageReference::with_tag(path, "v1").unwrap();
        assert_eq!(r.to_string(), "gcr.io/proj/app:v1");
    }

    #[test]
    fn image_reference_displays_digest_form() {
        let path = parse_registry_path("gcr.io/proj/app").unwrap();
        let r = ImageReference::with_digest(path, "sha256:deadbeef").unwrap();
        assert_eq!(r.to_string(), "gcr.io/proj/app@sha256:deadbeef");
    }

    #[test]
    fn repository_uri_templates() {
        assert_eq!(
            format_repository_uri("ecr", "123", "us-west-2", "app"),
            "123.dkr.ecr.us-west-2.amazonaws.com/app"
        );
        assert_eq!(
            format_repository_uri("gcr", "proj", "", "app"),
            "gcr.io/proj/app"
        );
        assert_eq!(
            format_repository_uri("ghcr", "", "", "org/app"),
            "ghcr.io/org/app"
        );
        assert_eq!(
            format_repository_uri("acr", "myregistry", "", "app"),
            "myregistry.azurecr.io/app"
        );
        assert_eq!(
            format_repository_uri("bogus", "", "", "org/app"),
            "bogus/org/app"
        );
    }

    #[test]
    fn registry_type_validity() {
        assert!(is_valid_registry_type("ecr"));
        assert!(is_valid_registry_type("gcr"));
        assert!(is_valid_registry_type("ghcr"));
        assert!(is_valid_registry_type("acr"));
        assert!(is_valid_registry_type("generic"));
        assert!(!is_valid_registry_type("bogus"));
    }

    #[test]
    fn classify_registry_type_rejects_unknown() {
        assert!(classify_registry_type("bogus").is_err());
        assert!(classify_registry_type("ecr").is_ok());
    }

    #[test]
    fn validate_repository_name_rejects_empty() {
        assert!(validate_repository_name("").is_err());
        assert!(validate_repository_name("library/alpine").is_ok());
    }

    #[test]
    fn validate_repository_name_accepts_the_distribution_spec_grammar() {
        assert!(validate_repository_name("my-org/my_app.v2").is_ok());
        assert!(validate_repository_name("a/b/c").is_ok());
    }

    #[test]
    fn validate_repository_name_rejects_uppercase_and_bad_separators() {
        assert!(validate_repository_name("Library/Alpine").is_err());
        assert!(validate_repository_name("app//double-slash").is_err());
        assert!(validate_repository_name("/leading-slash").is_err());
        assert!(validate_repository_name("trailing-slash/").is_err());
    }
}
