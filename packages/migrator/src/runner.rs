//! Migration orchestration.
//!
//! One run moves one source company into one freshly-created organization:
//! validate the company, install the transformation views, check data
//! quality, move tables in dependency order, then verify referential
//! integrity on the target. The views are dropped when the run ends,
//! whether it succeeded or not.

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::MigrationError;
use crate::field_mappings::FieldMappings;
use crate::ids::{self, ID_LEN};
use crate::mover::TableMover;
use crate::tables::{self, MigrationTable};
use crate::views;

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub source_company_id: Uuid,
    pub tables: Vec<MigrationTable>,
    pub dry_run: bool,
}

/// Per-view row count reported before moving anything.
#[derive(Debug, Clone)]
pub struct TableCount {
    pub table: MigrationTable,
    pub count: i64,
}

/// Outcome of a run. `executed` is false for dry runs, which stop after
/// reporting statistics.
#[derive(Debug)]
pub struct RunSummary {
    pub org_id: String,
    pub company_name: String,
    pub stats: Vec<TableCount>,
    pub executed: bool,
    pub moved: Vec<(MigrationTable, u64)>,
}

pub struct MigrationRunner {
    source: PgPool,
    target: PgPool,
    mappings: FieldMappings,
}

impl MigrationRunner {
    pub fn new(source: PgPool, target: PgPool) -> Self {
        Self {
            source,
            target,
            mappings: FieldMappings::default(),
        }
    }

    /// Run a migration end to end.
    ///
    /// The transformation views are dropped before this returns, on success
    /// and on failure alike.
    pub async fn run(&self, options: MigrationOptions) -> Result<RunSummary, MigrationError> {
        let company_name = self.validate_source_company(&options.source_company_id).await?;
        info!(company = %company_name, "found source company");

        let org_id = ids::short_id(ID_LEN);
        info!(org_id, "generated new organization id");

        let result = self.execute(&options, &org_id, company_name).await;
        views::cleanup(&self.source).await;
        result
    }

    /// Drop any transformation views left on the source database. Safe to
    /// call at any time, including after an interrupted run.
    pub async fn cleanup(&self) {
        views::cleanup(&self.source).await;
    }

    async fn execute(
        &self,
        options: &MigrationOptions,
        org_id: &str,
        company_name: String,
    ) -> Result<RunSummary, MigrationError> {
        views::install(&self.source, &options.source_company_id, org_id).await?;
        info!("transformation views created");

        self.validate_source_data().await?;

        let stats = self.migration_stats().await;
        for entry in &stats {
            info!(table = %entry.table, count = entry.count, "rows staged");
        }

        if options.dry_run {
            warn!("dry run mode - no data will be migrated");
            return Ok(RunSummary {
                org_id: org_id.to_string(),
                company_name,
                stats,
                executed: false,
                moved: Vec::new(),
            });
        }

        let ordered = tables::resolve_tables(&options.tables);
        let mover = TableMover::new(&self.source, &self.target, &self.mappings);
        let mut moved = Vec::with_capacity(ordered.len());
        for table in ordered {
            let count = mover.migrate_table(table).await?;
            moved.push((table, count));
        }

        self.validate_target_data(org_id).await?;
        info!(org_id, "migration completed");

        Ok(RunSummary {
            org_id: org_id.to_string(),
            company_name,
            stats,
            executed: true,
            moved,
        })
    }

    async fn validate_source_company(&self, company_id: &Uuid) -> Result<String, MigrationError> {
        let row: Option<(String, bool)> =
            sqlx::query_as("SELECT name, active FROM companies WHERE id = $1")
                .bind(company_id)
                .fetch_optional(&self.source)
                .await?;

        let (name, active) = row.ok_or(MigrationError::CompanyNotFound(*company_id))?;
        if !active {
            warn!(company = %name, "company is marked as inactive");
        }
        Ok(name)
    }

    /// Read the data-quality summary view. Only a missing source company
    /// blocks the run; other nonzero counts are logged and the rows in
    /// question are excluded by the views themselves.
    async fn validate_source_data(&self) -> Result<(), MigrationError> {
        let results: Vec<(String, i64)> =
            sqlx::query_as("SELECT issue, count FROM migration_validation")
                .fetch_all(&self.source)
                .await?;

        let mut blocked = false;
        for (issue, count) in &results {
            if issue == "source_company_exists" {
                if *count == 0 {
                    blocked = true;
                }
            } else if *count > 0 {
                warn!(issue = %issue, count, "data quality issue");
            }
        }

        if blocked {
            return Err(MigrationError::ValidationBlocked);
        }

        info!("source data validation passed");
        Ok(())
    }

    /// Count rows in each transformation view. A view that cannot be read
    /// counts as zero; statistics never block a run.
    async fn migration_stats(&self) -> Vec<TableCount> {
        let mut stats = Vec::with_capacity(tables::DEPENDENCY_ORDER.len());
        for table in tables::DEPENDENCY_ORDER {
            let query = format!("SELECT COUNT(*) FROM {}", table.view_name());
            let count = match sqlx::query_scalar::<_, i64>(&query)
                .fetch_one(&self.source)
                .await
            {
                Ok(count) => count,
                Err(error) => {
                    warn!(table = %table, %error, "could not count staged rows");
                    0
                }
            };
            stats.push(TableCount { table, count });
        }
        stats
    }

    /// Post-migration integrity check on the target: report record counts
    /// and fail the run if any orphaned rows exist under the new
    /// organization.
    async fn validate_target_data(&self, org_id: &str) -> Result<(), MigrationError> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT 'organizations'::text AS table_name, count(*) AS record_count \
             FROM organizations WHERE id = $1 \
             UNION ALL \
             SELECT 'leads', count(*) FROM leads WHERE organization_id = $1 \
             UNION ALL \
             SELECT 'conversions', count(*) FROM conversions WHERE organization_id = $1",
        )
        .bind(org_id)
        .fetch_all(&self.target)
        .await?;

        for (table_name, record_count) in &counts {
            info!(table = %table_name, count = record_count, "target record count");
        }

        let integrity: Vec<(String, i64)> = sqlx::query_as(
            "SELECT 'orphaned_leads'::text AS issue, count(*) AS count \
             FROM leads l \
             LEFT JOIN organizations o ON l.organization_id = o.id \
             WHERE l.organization_id = $1 AND o.id IS NULL \
             UNION ALL \
             SELECT 'orphaned_conversions', count(*) \
             FROM conversions c \
             LEFT JOIN leads l ON c.lead_id = l.id \
             WHERE c.organization_id = $1 AND l.id IS NULL",
        )
        .bind(org_id)
        .fetch_all(&self.target)
        .await?;

        let issues: Vec<(String, i64)> = integrity
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .collect();

        if !issues.is_empty() {
            return Err(MigrationError::IntegrityCheckFailed { issues });
        }

        info!("target data integrity validation passed");
        Ok(())
    }
}
