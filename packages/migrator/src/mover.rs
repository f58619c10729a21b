//! Per-table movement from the transformation views into the target schema.
//!
//! Each table has its own write policy: batch sizes, conflict handling, and
//! whether identity is preserved. Low-volume tables use parameterized binds;
//! the high-volume paths (leads, custom field values, conversions) build
//! multi-row `VALUES` statements through [`crate::sql_values`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::MigrationError;
use crate::field_mappings::FieldMappings;
use crate::ids::{self, ID_LEN, SECRET_LEN};
use crate::segment_rules;
use crate::sql_values::{
    nullable_number, nullable_timestamp, quote_literal, quote_nullable, tags_array_literal,
    timestamp_literal,
};
use crate::tables::MigrationTable;
use crate::webhook_mapping;

/// Conversions are pre-deduplicated by the view, so batches can be large.
const CONVERSION_BATCH_SIZE: usize = 200;
/// Custom field values are the highest-volume table; read and write in
/// fixed-size pages, each page in its own transaction.
const CUSTOM_FIELD_BATCH_SIZE: i64 = 1000;

/// Moves rows from source-side transformation views into the target schema.
pub struct TableMover<'a> {
    source: &'a PgPool,
    target: &'a PgPool,
    mappings: &'a FieldMappings,
}

#[derive(sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    name: String,
    website: Option<String>,
    logo: Option<String>,
    email: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LeadRow {
    id: String,
    organization_id: String,
    name: Option<String>,
    email: Option<String>,
    secondary_email: Option<String>,
    phone: Option<String>,
    secondary_phone: Option<String>,
    company: Option<String>,
    job_title: Option<String>,
    import_method: Option<String>,
    external_id: String,
    external_source: String,
    fit_score: Option<String>,
    interest: i64,
    total_conversions: i64,
    first_conversion_date: Option<DateTime<Utc>>,
    last_conversion_date: Option<DateTime<Utc>>,
    first_conversion_utm_source: Option<String>,
    first_conversion_utm_medium: Option<String>,
    first_conversion_utm_campaign: Option<String>,
    first_conversion_utm_content: Option<String>,
    first_conversion_utm_term: Option<String>,
    last_conversion_utm_source: Option<String>,
    last_conversion_utm_medium: Option<String>,
    last_conversion_utm_campaign: Option<String>,
    last_conversion_utm_content: Option<String>,
    last_conversion_utm_term: Option<String>,
    tags_json: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct FieldDefinitionRow {
    id: String,
    organization_id: String,
    field_key: String,
    label: String,
    #[sqlx(rename = "type")]
    field_type: String,
    description: Option<String>,
    is_required: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct FieldValueRow {
    lead_id: String,
    organization_id: String,
    field_key: String,
    field_value: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ConversionRow {
    id: String,
    organization_id: String,
    lead_id: String,
    name: Option<String>,
    identifier: Option<String>,
    external_id: String,
    external_source: String,
    date: DateTime<Utc>,
    value: Option<f64>,
    source: Option<String>,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    utm_content: Option<String>,
    utm_term: Option<String>,
    utm_channel: Option<String>,
    conversion_url: Option<String>,
    conversion_domain: Option<String>,
    device: Option<String>,
    raw_payload: Value,
    idempotency_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    id: String,
    organization_id: String,
    name: String,
    description: Option<String>,
    rule_json: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: String,
    organization_id: String,
    name: String,
    description: Option<String>,
    field_mapping: Option<Value>,
    sample_payload: Option<Value>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'a> TableMover<'a> {
    pub fn new(source: &'a PgPool, target: &'a PgPool, mappings: &'a FieldMappings) -> Self {
        Self {
            source,
            target,
            mappings,
        }
    }

    /// Move one table, returning the number of rows written.
    pub async fn migrate_table(&self, table: MigrationTable) -> Result<u64, MigrationError> {
        info!(table = %table, "migrating table");

        let result = match table {
            MigrationTable::Organizations => self.migrate_organizations().await,
            MigrationTable::LeadCustomFieldDefinitions => self.migrate_field_definitions().await,
            MigrationTable::Leads => self.migrate_leads().await,
            MigrationTable::LeadCustomFieldValues => self.migrate_field_values().await,
            MigrationTable::Conversions => self.migrate_conversions().await,
            MigrationTable::Segments => self.migrate_segments().await,
            MigrationTable::Webhooks => self.migrate_webhooks().await,
        };

        match result {
            Ok(0) => {
                warn!(table = %table, "no data found");
                Ok(0)
            }
            Ok(count) => {
                info!(table = %table, count, "migrated table");
                Ok(count)
            }
            Err(source) => Err(MigrationError::for_table(table.as_str(), source)),
        }
    }

    async fn migrate_organizations(&self) -> Result<u64, MigrationError> {
        let rows: Vec<OrganizationRow> =
            sqlx::query_as("SELECT * FROM organizations_transformed")
                .fetch_all(self.source)
                .await?;

        for row in &rows {
            sqlx::query(
                "INSERT INTO organizations (id, name, website, logo, email, is_active, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (id) DO UPDATE SET \
                   name = EXCLUDED.name, \
                   website = EXCLUDED.website, \
                   logo = EXCLUDED.logo, \
                   email = EXCLUDED.email, \
                   is_active = EXCLUDED.is_active, \
                   updated_at = EXCLUDED.updated_at",
            )
            .bind(&row.id)
            .bind(&row.name)
            .bind(&row.website)
            .bind(&row.logo)
            .bind(&row.email)
            .bind(row.is_active)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(self.target)
            .await?;
        }

        Ok(rows.len() as u64)
    }

    async fn migrate_field_definitions(&self) -> Result<u64, MigrationError> {
        let rows: Vec<FieldDefinitionRow> =
            sqlx::query_as("SELECT * FROM leads_custom_fields_definitions_transformed")
                .fetch_all(self.source)
                .await?;

        for row in &rows {
            sqlx::query(
                "INSERT INTO leads_custom_fields_definitions \
                   (id, organization_id, field_key, label, type, description, is_required, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (organization_id, field_key) DO UPDATE SET \
                   label = EXCLUDED.label, \
                   type = EXCLUDED.type, \
                   description = EXCLUDED.description, \
                   is_required = EXCLUDED.is_required, \
                   updated_at = EXCLUDED.updated_at",
            )
            .bind(&row.id)
            .bind(&row.organization_id)
            .bind(&row.field_key)
            .bind(&row.label)
            .bind(&row.field_type)
            .bind(&row.description)
            .bind(row.is_required)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(self.target)
            .await?;
        }

        Ok(rows.len() as u64)
    }

    /// Leads keep their source ids. Re-running a migration only refreshes
    /// `updated_at` on existing rows, so a lead never silently moves between
    /// organizations.
    async fn migrate_leads(&self) -> Result<u64, MigrationError> {
        let rows: Vec<LeadRow> = sqlx::query_as("SELECT * FROM leads_transformed")
            .fetch_all(self.source)
            .await?;

        for row in &rows {
            let statement = format!(
                "INSERT INTO leads (\
                   id, organization_id, name, email, secondary_email, phone, secondary_phone, \
                   company, job_title, import_method, external_id, external_source, \
                   fit_score, interest, total_conversions, first_conversion_date, last_conversion_date, \
                   first_conversion_utm_source, first_conversion_utm_medium, first_conversion_utm_campaign, \
                   first_conversion_utm_content, first_conversion_utm_term, \
                   last_conversion_utm_source, last_conversion_utm_medium, last_conversion_utm_campaign, \
                   last_conversion_utm_content, last_conversion_utm_term, \
                   tags, notes, created_at, updated_at\
                 ) VALUES (\
                   {id}, {org}, {name}, {email}, {secondary_email}, {phone}, {secondary_phone}, \
                   {company}, {job_title}, {import_method}, {external_id}, {external_source}, \
                   {fit_score}, {interest}, {total_conversions}, {first_date}, {last_date}, \
                   {fus}, {fum}, {fuc}, {fucontent}, {fut}, \
                   {lus}, {lum}, {luc}, {lucontent}, {lut}, \
                   {tags}, {notes}, {created_at}, {updated_at}\
                 ) ON CONFLICT (id) DO UPDATE SET updated_at = EXCLUDED.updated_at",
                id = quote_literal(&row.id),
                org = quote_literal(&row.organization_id),
                name = quote_nullable(row.name.as_deref()),
                email = quote_nullable(row.email.as_deref()),
                secondary_email = quote_nullable(row.secondary_email.as_deref()),
                phone = quote_nullable(row.phone.as_deref()),
                secondary_phone = quote_nullable(row.secondary_phone.as_deref()),
                company = quote_nullable(row.company.as_deref()),
                job_title = quote_nullable(row.job_title.as_deref()),
                import_method = quote_nullable(row.import_method.as_deref()),
                external_id = quote_literal(&row.external_id),
                external_source = quote_literal(&row.external_source),
                fit_score = quote_nullable(row.fit_score.as_deref()),
                interest = row.interest,
                total_conversions = row.total_conversions,
                first_date = nullable_timestamp(row.first_conversion_date.as_ref()),
                last_date = nullable_timestamp(row.last_conversion_date.as_ref()),
                fus = quote_nullable(row.first_conversion_utm_source.as_deref()),
                fum = quote_nullable(row.first_conversion_utm_medium.as_deref()),
                fuc = quote_nullable(row.first_conversion_utm_campaign.as_deref()),
                fucontent = quote_nullable(row.first_conversion_utm_content.as_deref()),
                fut = quote_nullable(row.first_conversion_utm_term.as_deref()),
                lus = quote_nullable(row.last_conversion_utm_source.as_deref()),
                lum = quote_nullable(row.last_conversion_utm_medium.as_deref()),
                luc = quote_nullable(row.last_conversion_utm_campaign.as_deref()),
                lucontent = quote_nullable(row.last_conversion_utm_content.as_deref()),
                lut = quote_nullable(row.last_conversion_utm_term.as_deref()),
                tags = tags_array_literal(row.tags_json.as_deref()),
                notes = quote_nullable(row.notes.as_deref()),
                created_at = timestamp_literal(&row.created_at),
                updated_at = timestamp_literal(&row.updated_at),
            );

            sqlx::raw_sql(&statement).execute(self.target).await?;
        }

        Ok(rows.len() as u64)
    }

    /// Custom field values are paged out of the view and written one page per
    /// transaction, so a failure loses at most one page of work.
    async fn migrate_field_values(&self) -> Result<u64, MigrationError> {
        let mut offset: i64 = 0;
        let mut total: u64 = 0;

        loop {
            let batch: Vec<FieldValueRow> = sqlx::query_as(
                "SELECT lead_id, organization_id, field_key, field_value, created_at \
                 FROM leads_custom_fields_transformed \
                 ORDER BY id \
                 LIMIT $1 OFFSET $2",
            )
            .bind(CUSTOM_FIELD_BATCH_SIZE)
            .bind(offset)
            .fetch_all(self.source)
            .await?;

            if batch.is_empty() {
                break;
            }

            let values: Vec<String> = batch
                .iter()
                .map(|row| {
                    format!(
                        "({}, {}, {}, {}, {})",
                        quote_literal(&row.lead_id),
                        quote_literal(&row.organization_id),
                        quote_literal(&row.field_key),
                        quote_nullable(row.field_value.as_deref()),
                        timestamp_literal(&row.created_at),
                    )
                })
                .collect();

            let statement = format!(
                "INSERT INTO leads_custom_fields (lead_id, organization_id, field_key, field_value, created_at) \
                 VALUES {} \
                 ON CONFLICT (lead_id, organization_id, field_key) DO UPDATE SET \
                   field_value = EXCLUDED.field_value, \
                   created_at = EXCLUDED.created_at",
                values.join(","),
            );

            let mut tx = self.target.begin().await?;
            match sqlx::raw_sql(&statement).execute(&mut *tx).await {
                Ok(_) => tx.commit().await?,
                Err(error) => {
                    tx.rollback().await?;
                    return Err(error.into());
                }
            }

            total += batch.len() as u64;
            offset += CUSTOM_FIELD_BATCH_SIZE;
            info!(total, "migrated custom field batch");
        }

        Ok(total)
    }

    /// Conversions are immutable events: multi-row inserts with
    /// `ON CONFLICT (id) DO NOTHING`, so re-runs skip rows already present.
    async fn migrate_conversions(&self) -> Result<u64, MigrationError> {
        let rows: Vec<ConversionRow> = sqlx::query_as("SELECT * FROM conversions_transformed")
            .fetch_all(self.source)
            .await?;

        let total_batches = rows.len().div_ceil(CONVERSION_BATCH_SIZE);
        for (index, batch) in rows.chunks(CONVERSION_BATCH_SIZE).enumerate() {
            let values: Vec<String> = batch.iter().map(conversion_values).collect();

            let statement = format!(
                "INSERT INTO conversions (\
                   id, organization_id, lead_id, name, identifier, external_id, external_source, \
                   date, value, source, utm_source, utm_medium, utm_campaign, utm_content, \
                   utm_term, utm_channel, conversion_url, conversion_domain, device, \
                   raw_payload, idempotency_hash, created_at\
                 ) VALUES {} \
                 ON CONFLICT (id) DO NOTHING",
                values.join(","),
            );

            sqlx::raw_sql(&statement).execute(self.target).await?;
            info!(batch = index + 1, total_batches, "processed conversion batch");
        }

        Ok(rows.len() as u64)
    }

    /// Segments keep their ids; rule JSON is rewritten to canonical field
    /// names on the way through.
    async fn migrate_segments(&self) -> Result<u64, MigrationError> {
        let rows: Vec<SegmentRow> = sqlx::query_as("SELECT * FROM segments_transformed")
            .fetch_all(self.source)
            .await?;

        for row in rows.iter() {
            // Malformed trees still migrate as-is; the warning points at
            // segments the application will fail to evaluate later.
            if let Err(error) = segment_rules::parse_rule_group(&row.rule_json) {
                warn!(segment_id = %row.id, %error, "segment rule does not match the rule model");
            }
            let rewritten = segment_rules::rewrite_rule_value(self.mappings, row.rule_json.clone());

            sqlx::query(
                "INSERT INTO segments (id, organization_id, name, description, rule_json, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO UPDATE SET \
                   name = EXCLUDED.name, \
                   description = EXCLUDED.description, \
                   rule_json = EXCLUDED.rule_json, \
                   updated_at = EXCLUDED.updated_at",
            )
            .bind(&row.id)
            .bind(&row.organization_id)
            .bind(&row.name)
            .bind(&row.description)
            .bind(&rewritten)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(self.target)
            .await?;
        }

        Ok(rows.len() as u64)
    }

    /// Webhooks are the one table that breaks identity: every row gets a
    /// fresh id and secret, and its field mapping is inverted to the
    /// canonical orientation.
    async fn migrate_webhooks(&self) -> Result<u64, MigrationError> {
        let rows: Vec<WebhookRow> = sqlx::query_as("SELECT * FROM webhooks_transformed")
            .fetch_all(self.source)
            .await?;

        for row in rows.iter() {
            let new_id = ids::short_id(ID_LEN);
            let secret_key = ids::short_id(SECRET_LEN);
            let mappings = row
                .field_mapping
                .clone()
                .map(|legacy| webhook_mapping::invert_mapping(self.mappings, legacy));

            info!(legacy_id = %row.id, new_id = %new_id, "assigning fresh webhook identity");

            sqlx::query(
                "INSERT INTO webhooks (\
                   id, organization_id, name, description, field_mappings, sample_payload, \
                   secret_key, is_active, created_at, updated_at\
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (id) DO UPDATE SET \
                   name = EXCLUDED.name, \
                   description = EXCLUDED.description, \
                   field_mappings = EXCLUDED.field_mappings, \
                   sample_payload = EXCLUDED.sample_payload, \
                   is_active = EXCLUDED.is_active, \
                   updated_at = EXCLUDED.updated_at",
            )
            .bind(&new_id)
            .bind(&row.organization_id)
            .bind(&row.name)
            .bind(&row.description)
            .bind(&mappings)
            .bind(&row.sample_payload)
            .bind(&secret_key)
            .bind(row.is_active)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(self.target)
            .await?;
        }

        Ok(rows.len() as u64)
    }
}

fn conversion_values(row: &ConversionRow) -> String {
    format!(
        "({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        quote_literal(&row.id),
        quote_literal(&row.organization_id),
        quote_literal(&row.lead_id),
        quote_nullable(row.name.as_deref()),
        quote_nullable(row.identifier.as_deref()),
        quote_literal(&row.external_id),
        quote_literal(&row.external_source),
        timestamp_literal(&row.date),
        nullable_number(row.value),
        quote_nullable(row.source.as_deref()),
        quote_nullable(row.utm_source.as_deref()),
        quote_nullable(row.utm_medium.as_deref()),
        quote_nullable(row.utm_campaign.as_deref()),
        quote_nullable(row.utm_content.as_deref()),
        quote_nullable(row.utm_term.as_deref()),
        quote_nullable(row.utm_channel.as_deref()),
        quote_nullable(row.conversion_url.as_deref()),
        quote_nullable(row.conversion_domain.as_deref()),
        quote_nullable(row.device.as_deref()),
        quote_literal(&row.raw_payload.to_string()),
        quote_literal(&row.idempotency_hash),
        timestamp_literal(&row.created_at),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_conversion() -> ConversionRow {
        ConversionRow {
            id: "c1".to_string(),
            organization_id: "org123".to_string(),
            lead_id: "l1".to_string(),
            name: Some("Webinar: O'Brien's Q&A".to_string()),
            identifier: Some("webinar-qa".to_string()),
            external_id: "c1".to_string(),
            external_source: "legacy_crm".to_string(),
            date: DateTime::parse_from_rfc3339("2025-08-25T23:00:00Z")
                .expect("valid rfc3339")
                .with_timezone(&Utc),
            value: None,
            source: None,
            utm_source: Some("newsletter".to_string()),
            utm_medium: None,
            utm_campaign: None,
            utm_content: None,
            utm_term: None,
            utm_channel: None,
            conversion_url: None,
            conversion_domain: None,
            device: None,
            raw_payload: json!({"note": "it's raw"}),
            idempotency_hash: "abc".to_string(),
            created_at: DateTime::parse_from_rfc3339("2025-08-25T23:00:01Z")
                .expect("valid rfc3339")
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn conversion_values_escape_free_text() {
        let rendered = conversion_values(&sample_conversion());
        assert!(rendered.contains("'Webinar: O''Brien''s Q&A'"));
        assert!(rendered.contains(r#"'{"note":"it''s raw"}'"#));
        assert!(rendered.contains("'2025-08-25T23:00:00.000Z'"));
    }

    #[test]
    fn conversion_values_render_absent_fields_as_null() {
        let rendered = conversion_values(&sample_conversion());
        // value, source, and the trailing utm fields are absent.
        assert!(rendered.contains(", NULL, NULL, 'newsletter', NULL,"));
    }
}
