//! Glob-based repository and tag filtering for tree replication.

use crate::error::{FreightlinerError, FreightlinerResult};

/// Compiles `patterns` into [`glob::Pattern`]s.
///
/// ## Errors
///
/// Returns [`FreightlinerError::invalid_input`] if any pattern is malformed.
fn compile(patterns: &[String]) -> FreightlinerResult<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| glob::Pattern::new(p).map_err(|e| FreightlinerError::invalid_input(format!("bad glob '{p}': {e}"))))
        .collect()
}

/// Reports whether `name` matches at least one pattern (an empty pattern
/// list matches nothing).
fn matches_any(patterns: &[glob::Pattern], name: &str) -> bool {
    patterns.iter().any(|p| p.matches(name))
}

/// Filters `candidates` by include/exclude glob pattern strings.
///
/// A candidate is kept if `include` is empty or it matches at least one
/// include pattern, *and* it matches none of the exclude patterns.
///
/// ## Errors
///
/// Returns [`FreightlinerError::invalid_input`] if any pattern is malformed.
pub fn filter_names(
    candidates: Vec<String>,
    include: &[String],
    exclude: &[String],
) -> FreightlinerResult<Vec<String>> {
    let include = compile(include)?;
    let exclude = compile(exclude)?;
    Ok(candidates
        .into_iter()
        .filter(|name| (include.is_empty() || matches_any(&include, name)) && !matches_any(&exclude, name))
        .collect())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_keeps_everything_not_excluded() {
        let names = vec!["app".into(), "helper-a".into(), "helper-b".into()];
        let kept = filter_names(names, &[], &["helper-*".to_string()]).unwrap();
        assert_eq!(kept, vec!["app".to_string()]);
    }

    #[test]
    fn include_narrows_to_matching_names() {
        let names = vec!["app".into(), "db".into()];
        let kept = filter_names(names, &["a*".to_string()], &[]).unwrap();
        assert_eq!(kept, vec!["app".to_string()]);
    }

    #[test]
    fn exclude_wins_over_include() {
        let names = vec!["app".into()];
        let kept = filter_names(names, &["a*".to_string()], &["app".to_string()]).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn malformed_pattern_is_invalid_input() {
        let err = filter_names(vec!["app".into()], &["[".to_string()], &[]).unwrap_err();
        assert!(err.is_kind(crate::error::RegistryErrorKind::InvalidInput));
    }
}
