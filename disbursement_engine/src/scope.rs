//! Multi-tenant row filtering.
//!
//! Aid programs are administered by organisations that may only see the beneficiaries inside
//! their own scope. A scope is a dot-separated hierarchy string stored on each registration,
//! e.g. `"zeeland.goes"`. The filter is passed explicitly to every repository call that reads
//! registration-linked rows, rather than living in ambient request state, so filtering is
//! testable without a fake request context.

/// A filter restricting queries to rows whose scope equals the filter scope or falls under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    scope: Option<String>,
}

impl ScopeFilter {
    /// No restriction: sees every row. For system-level callers (queue workers, sweeps).
    pub fn all() -> Self {
        Self { scope: None }
    }

    /// Restrict to `scope` and everything nested beneath it. An empty scope string is the same
    /// as no restriction.
    pub fn scoped(scope: &str) -> Self {
        if scope.is_empty() {
            Self::all()
        } else {
            Self { scope: Some(scope.to_string()) }
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.scope.is_none()
    }

    /// Whether a row with the given scope is visible through this filter.
    pub fn allows(&self, row_scope: &str) -> bool {
        match &self.scope {
            None => true,
            Some(scope) => row_scope == scope || row_scope.starts_with(&format!("{scope}.")),
        }
    }

    /// The filter scope, for building SQL where-clauses.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unrestricted_allows_everything() {
        let filter = ScopeFilter::all();
        assert!(filter.allows(""));
        assert!(filter.allows("zeeland"));
        assert!(filter.allows("zeeland.goes"));
    }

    #[test]
    fn scoped_allows_exact_and_nested() {
        let filter = ScopeFilter::scoped("zeeland");
        assert!(filter.allows("zeeland"));
        assert!(filter.allows("zeeland.goes"));
        assert!(!filter.allows("utrecht"));
        assert!(!filter.allows(""));
    }

    #[test]
    fn prefix_match_respects_separator() {
        let filter = ScopeFilter::scoped("zee");
        assert!(!filter.allows("zeeland"));
        assert!(filter.allows("zee.land"));
    }

    #[test]
    fn empty_scope_is_unrestricted() {
        assert!(ScopeFilter::scoped("").is_unrestricted());
    }
}
