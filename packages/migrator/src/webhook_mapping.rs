//! Webhook field-mapping inversion.
//!
//! Legacy webhooks stored `webhook_field -> target_field` per entity section,
//! with paths relative to `_structure.dataPath`. The current schema stores
//! the inverse orientation, `target_field -> full_webhook_path`, with paths
//! fully qualified. This module flips the pairs, re-roots every path under
//! the base data path, and normalizes target field keys through the
//! field-mapping tables.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::field_mappings::FieldMappings;

/// Base payload path used when legacy data carries no `_structure.dataPath`.
pub const DEFAULT_DATA_PATH: &str = "data.leads[0]";

const SECTIONS: [&str; 3] = ["leads", "conversions", "custom_fields"];

/// Convert a legacy webhook field mapping into the canonical orientation.
///
/// Anything that is not a JSON object is returned unchanged; that includes
/// `null` and arrays, which carry no field pairs to flip. `_structure` is
/// preserved verbatim, or synthesized with the
/// default data path when absent. When two legacy entries normalize to the
/// same target field the later one wins; each such collision is reported.
pub fn invert_mapping(mappings: &FieldMappings, legacy: Value) -> Value {
    let Value::Object(legacy_map) = legacy else {
        return legacy;
    };

    let base_data_path = legacy_map
        .get("_structure")
        .and_then(|s| s.get("dataPath"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_DATA_PATH)
        .to_string();

    let mut canonical = Map::new();
    for section in SECTIONS {
        let mut flipped = Map::new();
        if let Some(Value::Object(section_data)) = legacy_map.get(section) {
            for (webhook_field, target) in section_data {
                // Defensive cleanup: malformed legacy data sometimes leaked
                // the structure metadata into custom_fields.
                if section == "custom_fields"
                    && (webhook_field == "dataPath" || webhook_field == "structureInfo")
                {
                    continue;
                }
                let Some(target_field) = target.as_str() else {
                    warn!(section, webhook_field = %webhook_field, "skipping non-string target field");
                    continue;
                };

                // Paths are always re-rooted under the base data path, even
                // when the legacy key already contains separators.
                let full_webhook_path = build_full_webhook_path(webhook_field, &base_data_path);
                let normalized_target = mappings.normalize_section(target_field, section).to_string();

                if let Some(previous) =
                    flipped.insert(normalized_target.clone(), Value::String(full_webhook_path.clone()))
                {
                    warn!(
                        section,
                        target_field = %normalized_target,
                        kept = %full_webhook_path,
                        overwritten = %previous,
                        "webhook mapping collision, last write wins"
                    );
                }
            }
        }
        canonical.insert(section.to_string(), Value::Object(flipped));
    }

    let structure = legacy_map.get("_structure").cloned().unwrap_or_else(|| {
        json!({
            "dataPath": base_data_path,
            "structureInfo": "Migrated from old format"
        })
    });
    canonical.insert("_structure".to_string(), structure);

    Value::Object(canonical)
}

/// Prefix a relative webhook field with the base data path.
fn build_full_webhook_path(webhook_field: &str, base_data_path: &str) -> String {
    format!("{base_data_path}.{webhook_field}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mappings() -> FieldMappings {
        FieldMappings::default()
    }

    #[test]
    fn flips_and_re_roots_lead_fields() {
        let legacy = json!({
            "leads": {"mobile_phone": "phone"},
            "_structure": {"dataPath": "data.leads[0]", "structureInfo": "v1"}
        });
        let out = invert_mapping(&mappings(), legacy);
        assert_eq!(out["leads"]["phone"], "data.leads[0].mobile_phone");
        assert_eq!(out["_structure"]["structureInfo"], "v1");
    }

    #[test]
    fn normalizes_target_fields_per_section() {
        let legacy = json!({
            "leads": {"cell": "mobile_phone"},
            "conversions": {"evt_name": "conversion_name"}
        });
        let out = invert_mapping(&mappings(), legacy);
        // Target keys run through the section's mapping table.
        assert_eq!(out["leads"]["phone"], "data.leads[0].cell");
        assert_eq!(out["conversions"]["name"], "data.leads[0].evt_name");
    }

    #[test]
    fn dotted_keys_are_still_re_rooted() {
        let legacy = json!({
            "conversions": {"payload.utm.source": "traffic_source_source"}
        });
        let out = invert_mapping(&mappings(), legacy);
        assert_eq!(
            out["conversions"]["utm_source"],
            "data.leads[0].payload.utm.source"
        );
    }

    #[test]
    fn synthesizes_structure_when_absent() {
        let legacy = json!({"leads": {"email": "email"}});
        let out = invert_mapping(&mappings(), legacy);
        assert_eq!(out["_structure"]["dataPath"], DEFAULT_DATA_PATH);
        assert_eq!(out["leads"]["email"], "data.leads[0].email");
    }

    #[test]
    fn custom_data_path_is_honored() {
        let legacy = json!({
            "leads": {"email": "email"},
            "_structure": {"dataPath": "payload.contact", "structureInfo": ""}
        });
        let out = invert_mapping(&mappings(), legacy);
        assert_eq!(out["leads"]["email"], "payload.contact.email");
    }

    #[test]
    fn skips_structure_metadata_inside_custom_fields() {
        let legacy = json!({
            "custom_fields": {
                "dataPath": "data.leads[0]",
                "structureInfo": "oops",
                "utm_src": "source_field"
            }
        });
        let out = invert_mapping(&mappings(), legacy);
        let section = out["custom_fields"].as_object().expect("object");
        assert_eq!(section.len(), 1);
        assert_eq!(section["source_field"], "data.leads[0].utm_src");
    }

    #[test]
    fn collisions_keep_the_later_entry() {
        // Both legacy keys normalize to "phone"; serde_json maps iterate in
        // sorted key order, so "personal_line" comes after "cell" and wins.
        let legacy = json!({
            "leads": {
                "cell": "mobile_phone",
                "personal_line": "phone"
            }
        });
        let out = invert_mapping(&mappings(), legacy);
        assert_eq!(out["leads"]["phone"], "data.leads[0].personal_line");
    }

    #[test]
    fn non_objects_pass_through_unchanged() {
        let mappings = mappings();
        assert_eq!(invert_mapping(&mappings, Value::Null), Value::Null);
        assert_eq!(
            invert_mapping(&mappings, json!("string")),
            json!("string")
        );
        assert_eq!(invert_mapping(&mappings, json!(42)), json!(42));
    }

    #[test]
    fn arrays_pass_through_without_being_reshaped() {
        // An array has no sections to flip, so it is not rewritten into the
        // empty canonical shape.
        let legacy = json!([{"leads": {"cell": "mobile_phone"}}]);
        let out = invert_mapping(&mappings(), legacy.clone());
        assert_eq!(out, legacy);
    }
}
