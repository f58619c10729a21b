//! Installation and teardown of the transformation views on the source
//! database.
//!
//! The view scripts are compiled into the binary; parameters are substituted
//! textually because `CREATE VIEW` cannot take bind parameters.

use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::MigrationError;
use crate::sql_values::quote_literal;

const TRANSFORMATION_VIEWS: &str = include_str!("../sql/transformation-views.sql");
const CUSTOM_FIELDS_VIEWS: &str = include_str!("../sql/custom-fields-transformation.sql");
const CLEANUP_VIEWS: &str = include_str!("../sql/cleanup-views.sql");

/// Substitute the two script parameters with quoted literals.
pub fn parameterize_sql(sql: &str, source_company_id: &Uuid, target_org_id: &str) -> String {
    sql.replace(
        "$source_company_id",
        &quote_literal(&source_company_id.to_string()),
    )
    .replace("$target_org_id", &quote_literal(target_org_id))
}

/// Drop any stale views and create a fresh set scoped to the given company
/// and organization id.
pub async fn install(
    pool: &PgPool,
    source_company_id: &Uuid,
    target_org_id: &str,
) -> Result<(), MigrationError> {
    debug!(%source_company_id, target_org_id, "installing transformation views");

    sqlx::raw_sql(CLEANUP_VIEWS).execute(pool).await?;

    let main = parameterize_sql(TRANSFORMATION_VIEWS, source_company_id, target_org_id);
    sqlx::raw_sql(&main).execute(pool).await?;

    let custom_fields = parameterize_sql(CUSTOM_FIELDS_VIEWS, source_company_id, target_org_id);
    sqlx::raw_sql(&custom_fields).execute(pool).await?;

    Ok(())
}

/// Drop all transformation views. Failures are logged, never propagated;
/// cleanup must not mask the error that triggered it.
pub async fn cleanup(pool: &PgPool) {
    if let Err(error) = sqlx::raw_sql(CLEANUP_VIEWS).execute(pool).await {
        warn!(%error, "failed to drop transformation views");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_both_parameters_everywhere() {
        let company = Uuid::nil();
        let sql = "WHERE id = $source_company_id::uuid AND org = $target_org_id::text \
                   OR other = $source_company_id::uuid";
        let out = parameterize_sql(sql, &company, "abc123def456");
        assert!(!out.contains("$source_company_id"));
        assert!(!out.contains("$target_org_id"));
        assert!(out.contains("'00000000-0000-0000-0000-000000000000'::uuid"));
        assert!(out.contains("'abc123def456'::text"));
    }

    #[test]
    fn org_ids_are_quoted_as_literals() {
        let out = parameterize_sql("$target_org_id", &Uuid::nil(), "it's");
        assert_eq!(out, "'it''s'");
    }

    #[test]
    fn scripts_cover_every_view() {
        for view in [
            "organizations_transformed",
            "leads_transformed",
            "leads_custom_fields_definitions_transformed",
            "leads_custom_fields_transformed",
            "conversions_transformed",
            "segments_transformed",
            "webhooks_transformed",
            "migration_validation",
        ] {
            let created = TRANSFORMATION_VIEWS.contains(&format!("CREATE VIEW {view}"))
                || CUSTOM_FIELDS_VIEWS.contains(&format!("CREATE VIEW {view}"));
            assert!(created, "missing CREATE VIEW for {view}");
            assert!(
                CLEANUP_VIEWS.contains(&format!("DROP VIEW IF EXISTS {view};")),
                "missing DROP VIEW for {view}"
            );
        }
    }
}
