//! Error taxonomy for the migration path.
//!
//! Pre-flight failures (missing company, blocked validation) abort before
//! any mutation; per-table failures carry the table name and abort the
//! remaining tables; integrity failures surface after data has been written.

use thiserror::Error;
use uuid::Uuid;

/// A segment rule payload that could not be parsed as JSON.
///
/// The migration path logs this and stores an empty rule object instead of
/// aborting the run; callers that want to fail hard can use
/// [`crate::segment_rules::try_rewrite_rule_fields`].
#[derive(Debug, Error)]
#[error("malformed segment rule JSON: {source}")]
pub struct MalformedRuleError {
    #[from]
    source: serde_json::Error,
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("source company {0} not found")]
    CompanyNotFound(Uuid),

    #[error("critical validation issues found - cannot proceed")]
    ValidationBlocked,

    #[error("invalid table '{name}' (valid tables: {valid})")]
    UnknownTable { name: String, valid: String },

    #[error(transparent)]
    MalformedRule(#[from] MalformedRuleError),

    #[error("data integrity validation failed: {}", format_issues(.issues))]
    IntegrityCheckFailed { issues: Vec<(String, i64)> },

    #[error("failed to migrate {table}")]
    Table {
        table: &'static str,
        #[source]
        source: Box<MigrationError>,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl MigrationError {
    /// Wrap an error with the table it occurred in.
    pub fn for_table(table: &'static str, source: MigrationError) -> Self {
        Self::Table {
            table,
            source: Box::new(source),
        }
    }
}

fn format_issues(issues: &[(String, i64)]) -> String {
    issues
        .iter()
        .map(|(issue, count)| format!("{issue}: {count} records"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_error_carries_table_name_and_source() {
        let inner = MigrationError::ValidationBlocked;
        let err = MigrationError::for_table("leads", inner);
        assert_eq!(err.to_string(), "failed to migrate leads");
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("critical validation"));
    }

    #[test]
    fn integrity_failure_lists_counts() {
        let err = MigrationError::IntegrityCheckFailed {
            issues: vec![("orphaned_leads".to_string(), 3)],
        };
        assert!(err.to_string().contains("orphaned_leads: 3 records"));
    }
}
