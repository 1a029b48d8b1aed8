//! Crate-wide error taxonomy.

use std::fmt;

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a freightliner operation.
pub type FreightlinerResult<T> = Result<T, FreightlinerError>;

/// The kind of a [`RegistryError`].
///
/// This is the taxonomy every registry-facing operation classifies its
/// failures into, independent of which provider produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    /// The requested resource does not exist.
    NotFound,
    /// The resource already exists and the operation does not allow overwrite.
    AlreadyExists,
    /// The caller supplied a malformed argument.
    InvalidInput,
    /// No credentials, or credentials were rejected.
    Unauthorized,
    /// Credentials were accepted but lack permission.
    Forbidden,
    /// An unexpected internal failure.
    Internal,
    /// The upstream registry is temporarily unavailable.
    Unavailable,
    /// The operation exceeded its deadline.
    Timeout,
    /// The operation is not supported by this provider.
    NotSupported,
    /// The operation was canceled by the caller.
    Canceled,
}

impl fmt::Display for RegistryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistryErrorKind::NotFound => "not found",
            RegistryErrorKind::AlreadyExists => "already exists",
            RegistryErrorKind::InvalidInput => "invalid input",
            RegistryErrorKind::Unauthorized => "unauthorized",
            RegistryErrorKind::Forbidden => "forbidden",
            RegistryErrorKind::Internal => "internal error",
            RegistryErrorKind::Unavailable => "unavailable",
            RegistryErrorKind::Timeout => "timeout",
            RegistryErrorKind::NotSupported => "not supported",
            RegistryErrorKind::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A classified registry error, optionally wrapping an underlying cause and
/// annotated with the host that produced it.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RegistryError {
    /// The error's classification.
    pub kind: RegistryErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// The registry host this error is about, if known.
    pub host: Option<String>,
    /// The underlying cause, if any.
    #[source]
    pub cause: Option<Box<FreightlinerError>>,
}

impl RegistryError {
    /// Builds a new classified error.
    pub fn new(kind: RegistryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            host: None,
            cause: None,
        }
    }

    /// Attaches a host annotation.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Wraps an underlying cause, preserving it for `is`/unwrap chains.
    pub fn with_cause(mut self, cause: FreightlinerError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Reports whether this error, or any error it wraps, is of `kind`.
    pub fn is(&self, kind: RegistryErrorKind) -> bool {
        if self.kind == kind {
            return true;
        }
        match self.cause.as_deref() {
            Some(FreightlinerError::Registry(inner)) => inner.is(kind),
            _ => false,
        }
    }
}

/// Groups two or more errors that occurred independently (e.g. across
/// concurrent tag copies). Its `Display` renders each member joined by `;`
/// and it unwraps to the first member for `source()` purposes.
#[derive(Debug, Error)]
#[error("{}", render_multi(.0))]
pub struct MultiError(pub Vec<FreightlinerError>);

fn render_multi(errs: &[FreightlinerError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Combines a list of optional errors: drops `None`s, returns `None` if the
/// result is empty, the single error if exactly one remains, or a
/// [`MultiError`] otherwise.
pub fn combine(errs: Vec<Option<FreightlinerError>>) -> Option<FreightlinerError> {
    let mut errs: Vec<FreightlinerError> = errs.into_iter().flatten().collect();
    match errs.len() {
        0 => None,
        1 => errs.pop(),
        _ => Some(FreightlinerError::Multi(MultiError(errs))),
    }
}

/// The crate-wide error type.
#[derive(pretty_error_debug::Debug, Error)]
pub enum FreightlinerError {
    /// A classified registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Several independent errors occurred.
    #[error(transparent)]
    Multi(#[from] MultiError),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP request error.
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),

    /// An HTTP middleware error (e.g. exhausted retries).
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML (de)serialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A TOML deserialization error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A malformed URL.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// A background task panicked or was aborted.
    #[error("join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration failed validation after merge.
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    /// Several configuration problems were found at once.
    #[error("configuration invalid: {0:?}")]
    ConfigInvalidMany(Vec<String>),

    /// An error not otherwise classified, carrying an optional suggestion
    /// that the CLI surfaces to the user.
    #[error("{message}")]
    Other {
        /// Human-readable detail.
        message: String,
        /// An actionable hint for the user, if any.
        suggestion: Option<String>,
    },
}

impl FreightlinerError {
    /// Builds a classified [`RegistryError`] of the given kind.
    pub fn registry(kind: RegistryErrorKind, message: impl Into<String>) -> Self {
        FreightlinerError::Registry(RegistryError::new(kind, message))
    }

    /// Shorthand for [`RegistryErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::registry(RegistryErrorKind::NotFound, message)
    }

    /// Shorthand for [`RegistryErrorKind::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::registry(RegistryErrorKind::InvalidInput, message)
    }

    /// Shorthand for [`RegistryErrorKind::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::registry(RegistryErrorKind::Unauthorized, message)
    }

    /// Shorthand for [`RegistryErrorKind::Canceled`].
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::registry(RegistryErrorKind::Canceled, message)
    }

    /// Attaches a user-facing suggestion, wrapping this error as the cause
    /// when it isn't already an [`Other`](FreightlinerError::Other) variant.
    pub fn with_suggestion(self, suggestion: impl Into<String>) -> Self {
        match self {
            FreightlinerError::Other { message, .. } => FreightlinerError::Other {
                message,
                suggestion: Some(suggestion.into()),
            },
            other => FreightlinerError::Other {
                message: other.to_string(),
                suggestion: Some(suggestion.into()),
            },
        }
    }

    /// Reports whether this error is classified as `kind`, looking through
    /// the `Registry` wrapper if present.
    pub fn is_kind(&self, kind: RegistryErrorKind) -> bool {
        matches!(self, FreightlinerError::Registry(e) if e.is(kind))
    }

    /// Renders the full `outer: inner: ...` chain for user-visible output.
    pub fn render_chain(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            parts.push(err.to_string());
            source = err.source();
        }
        parts.join(": ")
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_empty_is_none() {
        assert!(combine(vec![None, None]).is_none());
    }

    #[test]
    fn combine_single_passes_through() {
        let err = FreightlinerError::invalid_input("bad");
        let combined = combine(vec![None, Some(err)]).unwrap();
        assert!(matches!(combined, FreightlinerError::Registry(_)));
    }

    #[test]
    fn combine_multiple_joins_with_semicolon() {
        let a = FreightlinerError::invalid_input("a");
        let b = FreightlinerError::invalid_input("b");
        let combined = combine(vec![Some(a), Some(b)]).unwrap();
        assert!(combined.to_string().contains("a"));
        assert!(combined.to_string().contains("; "));
        assert!(combined.to_string().contains("b"));
    }

    #[test]
    fn registry_error_is_checks_wrapped_cause() {
        let inner = RegistryError::new(RegistryErrorKind::Unavailable, "flaky upstream");
        let outer = RegistryError::new(RegistryErrorKind::Internal, "copy failed")
            .with_cause(FreightlinerError::Registry(inner))
            .with_host("gcr.io");
        assert!(outer.is(RegistryErrorKind::Internal));
        assert!(outer.is(RegistryErrorKind::Unavailable));
        assert!(!outer.is(RegistryErrorKind::NotFound));
    }

    #[test]
    fn render_chain_joins_outer_and_inner() {
        let inner = RegistryError::new(RegistryErrorKind::Timeout, "dial timeout");
        let outer = RegistryError::new(RegistryErrorKind::Internal, "push failed")
            .with_cause(FreightlinerError::Registry(inner));
        let rendered = FreightlinerError::Registry(outer).render_chain();
        assert!(rendered.contains("push failed"));
        assert!(rendered.contains("dial timeout"));
    }
}
