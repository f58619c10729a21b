//! Field key mappings for the migration path only.
//!
//! These tables transform legacy field names into the standardized format the
//! application expects. The application itself only knows the new structure;
//! nothing outside the migration tooling should depend on this module.
//!
//! The tables are sparse overrides, not total functions: looking up a key
//! with no mapping returns the key unchanged.

use std::collections::HashMap;

/// Entity sections a field key can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Leads,
    Conversions,
    CustomFields,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leads => "leads",
            Self::Conversions => "conversions",
            Self::CustomFields => "custom_fields",
        }
    }

    /// Resolve a section name as it appears in webhook mapping JSON.
    pub fn from_section(section: &str) -> Option<Self> {
        match section {
            "leads" => Some(Self::Leads),
            "conversions" => Some(Self::Conversions),
            "custom_fields" => Some(Self::CustomFields),
            _ => None,
        }
    }
}

/// Immutable legacy-to-canonical field name tables, keyed by entity type.
///
/// Injected into the rule rewriter and the webhook mapping inverter so tests
/// can substitute alternate tables. [`FieldMappings::default`] ships the
/// fixed production tables.
#[derive(Debug, Clone)]
pub struct FieldMappings {
    conversions: HashMap<String, String>,
    leads: HashMap<String, String>,
    custom_fields: HashMap<String, String>,
}

impl FieldMappings {
    pub fn new(
        conversions: HashMap<String, String>,
        leads: HashMap<String, String>,
        custom_fields: HashMap<String, String>,
    ) -> Self {
        Self {
            conversions,
            leads,
            custom_fields,
        }
    }

    /// Normalize a field key for its entity type.
    ///
    /// Total over `(key, entity)`: returns the mapped value when one exists,
    /// otherwise the input key unchanged.
    pub fn normalize<'a>(&'a self, field_key: &'a str, entity: EntityType) -> &'a str {
        let table = match entity {
            EntityType::Conversions => &self.conversions,
            EntityType::Leads => &self.leads,
            EntityType::CustomFields => &self.custom_fields,
        };
        table.get(field_key).map(String::as_str).unwrap_or(field_key)
    }

    /// Normalize against a section name taken from JSON data.
    ///
    /// Unknown section names fall through to the identity, matching the
    /// normalizer's total-function contract.
    pub fn normalize_section<'a>(&'a self, field_key: &'a str, section: &str) -> &'a str {
        match EntityType::from_section(section) {
            Some(entity) => self.normalize(field_key, entity),
            None => field_key,
        }
    }
}

impl Default for FieldMappings {
    fn default() -> Self {
        let conversions = [
            ("conversion_name", "name"),
            ("conversion_identifier", "identifier"),
            ("conversion_date", "date"),
            ("conversion_url", "url"),
            ("conversion_domain", "domain"),
            ("conversion_value", "value"),
            // UTM field mappings
            ("traffic_source_source", "utm_source"),
            ("traffic_source_medium", "utm_medium"),
            ("traffic_source_campaign", "utm_campaign"),
            ("traffic_source_content", "utm_content"),
            ("traffic_source_term", "utm_term"),
            ("traffic_source_channel", "utm_channel"),
            // Lead-level UTM field mappings (for segments)
            ("last_traffic_source_campaign", "last_conversion_utm_campaign"),
            ("last_traffic_source_medium", "last_conversion_utm_medium"),
            ("last_traffic_source_source", "last_conversion_utm_source"),
            ("last_traffic_source_content", "last_conversion_utm_content"),
            ("last_traffic_source_term", "last_conversion_utm_term"),
            // Other conversion fields
            ("payload_raw_json", "raw_payload"),
        ];

        let leads = [
            ("mobile_phone", "phone"),
            ("personal_phone", "secondary_phone"),
        ];

        // No custom field overrides yet; reserved for future use.
        let custom_fields: [(&str, &str); 0] = [];

        fn build(pairs: &[(&str, &str)]) -> HashMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }

        Self {
            conversions: build(&conversions),
            leads: build(&leads),
            custom_fields: build(&custom_fields),
        }
    }
}
