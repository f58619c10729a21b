//! Selective tenant migration toolkit
//!
//! Moves one source company's CRM data (leads, conversions, custom fields,
//! segments, webhooks) out of the legacy database and into the current
//! schema, under a freshly generated organization id. The heavy lifting is
//! done by SQL transformation views installed in the source database; this
//! crate orchestrates the run, rewrites the JSON payloads that cannot be
//! reshaped in SQL (segment rule trees, webhook field mappings), and moves
//! rows table by table with idempotent upserts.
//!
//! Entry points:
//! - [`runner::MigrationRunner`] drives a full run (see `bin/migrate`)
//! - [`segment_rules::rewrite_rule_fields`] rewrites legacy field references
//!   inside segment rule JSON
//! - [`webhook_mapping::invert_mapping`] converts legacy webhook field
//!   mappings to the canonical orientation

pub mod backup;
pub mod config;
pub mod error;
pub mod field_mappings;
pub mod ids;
pub mod mover;
pub mod runner;
pub mod segment_rules;
pub mod sql_values;
pub mod tables;
pub mod views;
pub mod webhook_mapping;
