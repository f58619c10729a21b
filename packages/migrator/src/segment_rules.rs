//! Segment rule trees and the legacy field-reference rewriter.
//!
//! A segment's `rule_json` is a recursive boolean expression: groups combine
//! nested rules and groups with AND/OR, rules compare one field against a
//! value, and groups may carry a temporal filter. Evaluation happens inside a
//! stored procedure in the application database; this module only models the
//! tree and rewrites legacy field references during migration.
//!
//! The rewriter operates on raw `serde_json::Value` rather than the typed
//! model so that keys it does not know about survive the round-trip intact.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::MalformedRuleError;
use crate::field_mappings::{EntityType, FieldMappings};

// ---------------------------------------------------------------------------
// Typed rule model
// ---------------------------------------------------------------------------

/// A node is exactly one of rule or group, discriminated by the presence of
/// `field` (rule) vs `combinator` (group).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleNode {
    Rule(SegmentRule),
    Group(RuleGroup),
}

impl RuleNode {
    pub fn is_rule(&self) -> bool {
        matches!(self, Self::Rule(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

/// An individual comparison against one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// e.g. `"fit_score"`, `"custom_fields.source"`, `"interest"`
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_group: Option<FieldGroup>,
    pub operator: RuleOperator,
    /// Comparison value(s); shape depends on the operator.
    #[serde(default)]
    pub value: Value,
}

/// A group of rules and nested groups joined by one combinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub combinator: Combinator,
    #[serde(default)]
    pub rules: Vec<RuleNode>,
    /// Negate the entire group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_filter: Option<PeriodFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Lead,
    Conversion,
    CustomField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    And,
    Or,
}

/// Comparison operators. Legacy snake_case spellings are accepted on input
/// and normalized to the camelCase form on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleOperator {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "notEquals", alias = "not_equals")]
    NotEquals,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "notContains", alias = "not_contains")]
    NotContains,
    #[serde(rename = "startsWith", alias = "starts_with")]
    StartsWith,
    #[serde(rename = "endsWith", alias = "ends_with")]
    EndsWith,
    #[serde(rename = "lessThan", alias = "less_than")]
    LessThan,
    #[serde(rename = "greaterThan", alias = "greater_than")]
    GreaterThan,
    #[serde(rename = "greaterThanOrEqual", alias = "greater_than_or_equal")]
    GreaterThanOrEqual,
    #[serde(rename = "lessThanOrEqual", alias = "less_than_or_equal")]
    LessThanOrEqual,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "after")]
    After,
    #[serde(rename = "onDate")]
    OnDate,
    #[serde(rename = "notOnDate")]
    NotOnDate,
    #[serde(rename = "isEmpty", alias = "is_null")]
    IsEmpty,
    #[serde(rename = "isNotEmpty", alias = "is_not_null")]
    IsNotEmpty,
    #[serde(rename = "jsonKeyEquals")]
    JsonKeyEquals,
    #[serde(rename = "jsonContains")]
    JsonContains,
    #[serde(rename = "jsonKeyExists")]
    JsonKeyExists,
    #[serde(rename = "leadHasConversion")]
    LeadHasConversion,
    #[serde(rename = "leadNotHasConversion")]
    LeadNotHasConversion,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "older_than")]
    OlderThan,
    #[serde(rename = "newer_than")]
    NewerThan,
    #[serde(rename = "regex_match")]
    RegexMatch,
}

/// What date field a temporal filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFilterType {
    #[serde(rename = "lead.createdAt")]
    LeadCreatedAt,
    #[serde(rename = "conversion.first")]
    ConversionFirst,
    #[serde(rename = "conversion.last")]
    ConversionLast,
    #[serde(rename = "conversion.any")]
    ConversionAny,
    #[serde(rename = "conversion.first_strict")]
    ConversionFirstStrict,
    #[serde(rename = "conversion.last_strict")]
    ConversionLastStrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelativePeriod {
    Automatic,
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisQuarter,
    LastQuarter,
    None,
    Absolute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodValue {
    #[serde(rename = "type")]
    pub kind: PeriodKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_value: Option<RelativePeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Relative,
    Absolute,
    None,
    Automatic,
}

/// Temporal filter attached to a rule group.
///
/// Relative periods resolve against "now" at evaluation time, so two
/// evaluations of the same filter in different calendar instants may see
/// different ranges. That non-determinism is inherent and accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFilter {
    pub time_filter_type: TimeFilterType,
    pub period_value: PeriodValue,
}

impl RuleGroup {
    /// Parse a rule tree from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, MalformedRuleError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Check an already-parsed rule payload against the typed model.
///
/// The migration path moves `rule_json` as raw JSON either way; this flags
/// segments whose rules the application will not be able to evaluate.
pub fn parse_rule_group(value: &Value) -> Result<RuleGroup, MalformedRuleError> {
    Ok(serde_json::from_value(value.clone())?)
}

// ---------------------------------------------------------------------------
// Field rewriter
// ---------------------------------------------------------------------------

/// Rewrite legacy field references in segment rule JSON text.
///
/// Parse failures are logged and replaced with an empty rule object so a
/// single broken segment cannot abort a whole migration run. Use
/// [`try_rewrite_rule_fields`] to surface the parse error instead.
pub fn rewrite_rule_fields(mappings: &FieldMappings, rule_json: &str) -> String {
    match try_rewrite_rule_fields(mappings, rule_json) {
        Ok(rewritten) => rewritten,
        Err(err) => {
            warn!(error = %err, "failed to parse segment rule JSON, storing empty rule");
            "{}".to_string()
        }
    }
}

/// Rewrite legacy field references, surfacing malformed JSON as an error.
pub fn try_rewrite_rule_fields(
    mappings: &FieldMappings,
    rule_json: &str,
) -> Result<String, MalformedRuleError> {
    let parsed: Value = serde_json::from_str(rule_json)?;
    Ok(rewrite_rule_value(mappings, parsed).to_string())
}

/// Recursively rewrite every `field` key in a rule tree.
///
/// Arrays map element-wise; objects rewrite a string value under the literal
/// key `field` and recurse into every other value. Lookup tries the
/// conversion table first (it includes the lead-level UTM fields used by
/// segments) and falls back to the lead table only when no conversion
/// mapping changed the key. Idempotent: canonical keys are absent from both
/// tables and pass through unchanged.
pub fn rewrite_rule_value(mappings: &FieldMappings, value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| rewrite_rule_value(mappings, item))
                .collect(),
        ),
        Value::Object(mut map) => {
            if let Some(Value::String(field)) = map.get("field") {
                let field = field.as_str();
                let mut normalized = mappings.normalize(field, EntityType::Conversions);
                if normalized == field {
                    normalized = mappings.normalize(field, EntityType::Leads);
                }
                let normalized = normalized.to_string();
                map.insert("field".to_string(), Value::String(normalized));
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, val)| (key, rewrite_rule_value(mappings, val)))
                    .collect(),
            )
        }
        scalar => scalar,
    }
}
