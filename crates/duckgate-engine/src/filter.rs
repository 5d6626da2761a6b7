//! Deny-list filter for client-supplied statements.
//!
//! The filter is a policy, not a parser: it lowercases the raw statement and
//! looks for blocked words by substring or prefix. A statement that only
//! mentions a blocked word inside an identifier, string literal or comment is
//! rejected as well (`SELECT * FROM t LIMIT 1 OFFSET 5` matches `set`).
//! Those false positives are accepted.
//!
//! A rejection never surfaces as an error. The original statement is dropped
//! and replaced by a fixed `SELECT` that returns one row naming the blocked
//! category, so the client receives it as ordinary data.
//!
//! | Category | Match | Replacement row |
//! |----------|-------|-----------------|
//! | settings introspection | contains `duckdb_settings` | `Function is disabled` |
//! | extension install | starts with `install` | `Extension installation disabled` |
//! | extension load | starts with `load` | `Extension loading is disabled` |
//! | configuration change | contains `set` | `Using SET is disabled` |
//! | pragma | contains `pragma` | `Using PRAGMA is disabled` |
//! | secret management | contains `secret` | `Using SECRET is disabled` |

use serde::Serialize;
use std::fmt;

/// The policy category that caused a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCategory {
    /// Reference to the engine's settings table function.
    SettingsIntrospection,
    /// Statement starting with `INSTALL`.
    ExtensionInstall,
    /// Statement starting with `LOAD`.
    ExtensionLoad,
    /// `SET` anywhere in the text.
    ConfigurationChange,
    /// `PRAGMA` anywhere in the text.
    Pragma,
    /// `SECRET` anywhere in the text.
    SecretManagement,
}

/// How a rule matches the lowercased statement.
#[derive(Debug, Clone, Copy)]
enum Match {
    Contains(&'static str),
    StartsWith(&'static str),
}

struct Rule {
    category: FilterCategory,
    pattern: Match,
    replacement: &'static str,
}

/// Rules in evaluation order; the first match wins.
const RULES: &[Rule] = &[
    Rule {
        category: FilterCategory::SettingsIntrospection,
        pattern: Match::Contains("duckdb_settings"),
        replacement: "select 'Function is disabled' as error",
    },
    Rule {
        category: FilterCategory::ExtensionInstall,
        pattern: Match::StartsWith("install"),
        replacement: "select 'Extension installation disabled' as error",
    },
    Rule {
        category: FilterCategory::ExtensionLoad,
        pattern: Match::StartsWith("load"),
        replacement: "select 'Extension loading is disabled' as error",
    },
    Rule {
        category: FilterCategory::ConfigurationChange,
        pattern: Match::Contains("set"),
        replacement: "select 'Using SET is disabled' as error",
    },
    Rule {
        category: FilterCategory::Pragma,
        pattern: Match::Contains("pragma"),
        replacement: "select 'Using PRAGMA is disabled' as error",
    },
    Rule {
        category: FilterCategory::SecretManagement,
        pattern: Match::Contains("secret"),
        replacement: "select 'Using SECRET is disabled' as error",
    },
];

impl FilterCategory {
    /// The fixed statement executed in place of a rejected one.
    pub fn replacement(self) -> &'static str {
        RULES
            .iter()
            .find(|rule| rule.category == self)
            .map(|rule| rule.replacement)
            .unwrap_or("select 'Statement is disabled' as error")
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterCategory::SettingsIntrospection => "settings introspection",
            FilterCategory::ExtensionInstall => "extension install",
            FilterCategory::ExtensionLoad => "extension load",
            FilterCategory::ConfigurationChange => "configuration change",
            FilterCategory::Pragma => "pragma",
            FilterCategory::SecretManagement => "secret management",
        };
        f.write_str(name)
    }
}

/// Outcome of filtering one statement. Both variants are executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict<'a> {
    /// The statement passed the filter unchanged.
    Allowed(&'a str),
    /// The statement was discarded in favour of `replacement`.
    Rejected {
        category: FilterCategory,
        replacement: &'static str,
    },
}

impl<'a> FilterVerdict<'a> {
    /// The statement that should actually be executed.
    pub fn statement(&self) -> &'a str {
        match self {
            FilterVerdict::Allowed(sql) => sql,
            FilterVerdict::Rejected { replacement, .. } => replacement,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, FilterVerdict::Rejected { .. })
    }
}

/// Classify `statement`.
///
/// With `filtering_enabled == false` every statement is allowed unchanged.
/// That switch exists for the session's own trusted setup statements and is
/// never exposed to HTTP callers.
pub fn filter(statement: &str, filtering_enabled: bool) -> FilterVerdict<'_> {
    if !filtering_enabled {
        return FilterVerdict::Allowed(statement);
    }

    let lowered = statement.to_lowercase();
    let trimmed = lowered.trim();

    for rule in RULES {
        let hit = match rule.pattern {
            Match::Contains(word) => lowered.contains(word),
            Match::StartsWith(word) => trimmed.starts_with(word),
        };
        if hit {
            return FilterVerdict::Rejected {
                category: rule.category,
                replacement: rule.replacement,
            };
        }
    }

    FilterVerdict::Allowed(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_category(sql: &str) -> Option<FilterCategory> {
        match filter(sql, true) {
            FilterVerdict::Rejected { category, .. } => Some(category),
            FilterVerdict::Allowed(_) => None,
        }
    }

    #[test]
    fn test_plain_select_is_allowed() {
        let verdict = filter("SELECT 1 AS a", true);
        assert_eq!(verdict, FilterVerdict::Allowed("SELECT 1 AS a"));
        assert_eq!(verdict.statement(), "SELECT 1 AS a");
        assert!(!verdict.is_rejected());
    }

    #[test]
    fn test_settings_function_any_case_any_position() {
        for sql in [
            "SELECT * FROM duckdb_settings()",
            "select name from DUCKDB_SETTINGS() where 1=1",
            "  WITH s AS (SELECT * FROM DuckDB_Settings()) SELECT * FROM s",
        ] {
            assert_eq!(
                rejected_category(sql),
                Some(FilterCategory::SettingsIntrospection),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_install_and_load_only_as_prefix() {
        assert_eq!(
            rejected_category("INSTALL httpfs;"),
            Some(FilterCategory::ExtensionInstall)
        );
        assert_eq!(
            rejected_category("   \n install spatial"),
            Some(FilterCategory::ExtensionInstall)
        );
        assert_eq!(
            rejected_category("Load json"),
            Some(FilterCategory::ExtensionLoad)
        );
        // Not at the start: no prefix match.
        assert_eq!(rejected_category("SELECT 'install' AS word"), None);
        assert_eq!(rejected_category("SELECT 'please load' AS word"), None);
    }

    #[test]
    fn test_set_pragma_secret_anywhere() {
        assert_eq!(
            rejected_category("SET threads=1"),
            Some(FilterCategory::ConfigurationChange)
        );
        assert_eq!(
            rejected_category("select 1; reset memory_limit"),
            Some(FilterCategory::ConfigurationChange)
        );
        assert_eq!(
            rejected_category("PRAGMA database_list"),
            Some(FilterCategory::Pragma)
        );
        assert_eq!(
            rejected_category("CALL pragma_version()"),
            Some(FilterCategory::Pragma)
        );
        assert_eq!(
            rejected_category("CREATE SECRET s (TYPE S3)"),
            Some(FilterCategory::SecretManagement)
        );
        assert_eq!(
            rejected_category("select * from duckdb_secrets()"),
            Some(FilterCategory::SecretManagement)
        );
    }

    #[test]
    fn test_false_positives_are_rejected() {
        // Blocked words inside identifiers, literals and comments still match.
        assert_eq!(
            rejected_category("SELECT * FROM range(10) LIMIT 2 OFFSET 3"),
            Some(FilterCategory::ConfigurationChange)
        );
        assert_eq!(
            rejected_category("SELECT 'top secret' AS label"),
            Some(FilterCategory::SecretManagement)
        );
        assert_eq!(
            rejected_category("SELECT 1 -- pragma in a comment"),
            Some(FilterCategory::Pragma)
        );
        assert_eq!(
            rejected_category("SELECT * FROM dataset"),
            Some(FilterCategory::ConfigurationChange)
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // Mentions both the settings function and SET; the settings rule runs first.
        assert_eq!(
            rejected_category("SELECT * FROM duckdb_settings() WHERE name = 'set'"),
            Some(FilterCategory::SettingsIntrospection)
        );
        // INSTALL statement containing a secret keyword.
        assert_eq!(
            rejected_category("install secret_ext"),
            Some(FilterCategory::ExtensionInstall)
        );
    }

    #[test]
    fn test_rejection_replaces_statement() {
        let verdict = filter("SET s3_region='us-east-1'", true);
        assert!(verdict.is_rejected());
        assert_eq!(verdict.statement(), "select 'Using SET is disabled' as error");
        assert_eq!(
            FilterCategory::ConfigurationChange.replacement(),
            verdict.statement()
        );
    }

    #[test]
    fn test_disabled_filter_passes_everything() {
        for sql in [
            "SET home_directory='/tmp'",
            "INSTALL httpfs",
            "LOAD json",
            "PRAGMA version",
            "SELECT * FROM duckdb_settings()",
            "CREATE SECRET s (TYPE ICEBERG, TOKEN 't')",
            "",
        ] {
            assert_eq!(filter(sql, false), FilterVerdict::Allowed(sql));
        }
    }

    #[test]
    fn test_every_category_has_distinct_replacement() {
        let categories = [
            FilterCategory::SettingsIntrospection,
            FilterCategory::ExtensionInstall,
            FilterCategory::ExtensionLoad,
            FilterCategory::ConfigurationChange,
            FilterCategory::Pragma,
            FilterCategory::SecretManagement,
        ];
        let replacements: std::collections::HashSet<_> =
            categories.iter().map(|c| c.replacement()).collect();
        assert_eq!(replacements.len(), categories.len());
    }
}
