//! Module-specifier resolution, supplied by the host pipeline.

use std::future::Future;

/// Path segment marking a module as an installed dependency rather than a
/// project-local source file.
pub const DEPENDENCY_DIR_SEGMENT: &str = "/node_modules/";

/// Asks the host to resolve an import specifier against the importing
/// module. `Ok(None)` means resolution fell through and the raw specifier
/// is used as-is; an `Err` aborts the transform for the whole module.
pub trait ModuleResolver {
    type Error: std::error::Error + Send + Sync + 'static;

    fn resolve(
        &self,
        specifier: &str,
        importer: &str,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;
}

/// Outcome of one resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Resolved module id, or `None` when resolution fell through.
    pub id: Option<String>,
}

impl ResolvedTarget {
    /// The path written into the lowered call: the resolved id, falling
    /// back to the raw specifier.
    pub fn actual_path<'a>(&'a self, raw_specifier: &'a str) -> &'a str {
        self.id.as_deref().unwrap_or(raw_specifier)
    }

    pub fn is_dependency_module(&self, raw_specifier: &str) -> bool {
        self.actual_path(raw_specifier)
            .contains(DEPENDENCY_DIR_SEGMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_raw_specifier() {
        let target = ResolvedTarget { id: None };
        assert_eq!(target.actual_path("./a"), "./a");
        assert!(!target.is_dependency_module("./a"));
    }

    #[test]
    fn dependency_detection_uses_the_resolved_path() {
        let target = ResolvedTarget {
            id: Some("/repo/node_modules/lodash/index.js".to_string()),
        };
        assert_eq!(target.actual_path("lodash"), "/repo/node_modules/lodash/index.js");
        assert!(target.is_dependency_module("lodash"));

        let local = ResolvedTarget {
            id: Some("/repo/src/util.ts".to_string()),
        };
        assert!(!local.is_dependency_module("./util"));
    }
}
