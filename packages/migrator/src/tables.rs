//! Migratable tables and their fixed dependency order.

use std::fmt;
use std::str::FromStr;

use crate::error::MigrationError;

/// Tables the mover knows how to migrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationTable {
    Organizations,
    LeadCustomFieldDefinitions,
    Leads,
    LeadCustomFieldValues,
    Conversions,
    Segments,
    Webhooks,
}

/// Fixed dependency order. Later tables hold foreign keys into earlier ones;
/// inserting out of order would violate referential integrity.
pub const DEPENDENCY_ORDER: [MigrationTable; 7] = [
    MigrationTable::Organizations,
    MigrationTable::LeadCustomFieldDefinitions,
    MigrationTable::Leads,
    MigrationTable::LeadCustomFieldValues,
    MigrationTable::Conversions,
    MigrationTable::Segments,
    MigrationTable::Webhooks,
];

impl MigrationTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organizations => "organizations",
            Self::LeadCustomFieldDefinitions => "leads_custom_fields_definitions",
            Self::Leads => "leads",
            Self::LeadCustomFieldValues => "leads_custom_fields",
            Self::Conversions => "conversions",
            Self::Segments => "segments",
            Self::Webhooks => "webhooks",
        }
    }

    /// Name of the transformation view this table is read from.
    pub fn view_name(&self) -> String {
        format!("{}_transformed", self.as_str())
    }
}

impl fmt::Display for MigrationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationTable {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DEPENDENCY_ORDER
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MigrationError::UnknownTable {
                name: s.to_string(),
                valid: valid_table_names(),
            })
    }
}

/// Comma-joined list of accepted table names, for error messages and usage.
pub fn valid_table_names() -> String {
    let mut names: Vec<&str> = DEPENDENCY_ORDER.iter().map(|t| t.as_str()).collect();
    names.push("all");
    names.join(", ")
}

/// Parse a comma-separated table list; the value `all` selects every table.
pub fn parse_table_list(input: &str) -> Result<Vec<MigrationTable>, MigrationError> {
    let parts: Vec<&str> = input
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() || parts.iter().any(|p| *p == "all") {
        return Ok(DEPENDENCY_ORDER.to_vec());
    }

    parts.into_iter().map(MigrationTable::from_str).collect()
}

/// Intersect a request with the fixed dependency order.
///
/// The order of the request is irrelevant; execution always follows
/// [`DEPENDENCY_ORDER`].
pub fn resolve_tables(requested: &[MigrationTable]) -> Vec<MigrationTable> {
    DEPENDENCY_ORDER
        .iter()
        .copied()
        .filter(|t| requested.contains(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_requests_run_in_dependency_order() {
        let requested = vec![
            MigrationTable::Webhooks,
            MigrationTable::Leads,
            MigrationTable::Organizations,
        ];
        let resolved = resolve_tables(&requested);
        assert_eq!(
            resolved,
            vec![
                MigrationTable::Organizations,
                MigrationTable::Leads,
                MigrationTable::Webhooks,
            ]
        );
    }

    #[test]
    fn all_selects_every_table_in_order() {
        let tables = parse_table_list("all").expect("parse");
        assert_eq!(tables, DEPENDENCY_ORDER.to_vec());
        // "all" mixed into a list still selects everything.
        let tables = parse_table_list("leads,all").expect("parse");
        assert_eq!(tables.len(), 7);
    }

    #[test]
    fn parses_trimmed_names() {
        let tables = parse_table_list(" leads , conversions ").expect("parse");
        assert_eq!(
            tables,
            vec![MigrationTable::Leads, MigrationTable::Conversions]
        );
    }

    #[test]
    fn unknown_table_is_rejected_with_valid_names() {
        let err = parse_table_list("leads,bogus").expect_err("must fail");
        let message = err.to_string();
        assert!(message.contains("bogus"));
        assert!(message.contains("organizations"));
        assert!(message.contains("all"));
    }

    #[test]
    fn view_names_follow_the_transformed_suffix() {
        assert_eq!(MigrationTable::Leads.view_name(), "leads_transformed");
        assert_eq!(
            MigrationTable::LeadCustomFieldValues.view_name(),
            "leads_custom_fields_transformed"
        );
    }
}
