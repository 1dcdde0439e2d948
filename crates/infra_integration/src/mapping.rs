//! Declarative field mapping
//!
//! Copies values between JSON documents along dot-separated paths. Used to
//! reshape workflow payloads into partner request formats and partner
//! responses back into the shapes rule conditions expect.

use serde_json::Value;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One source -> target path mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Dot path into the source document
    pub source: String,
    /// Dot path in the target document
    pub target: String,
    /// Value used when the source path is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// A required field absent in the source still emits the target key
    /// (with the default, or null), so consumers never see missing keys
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            default: None,
            required: false,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Applies mappings to a source document, producing a fresh target
pub fn apply_mappings(mappings: &[FieldMapping], source: &Value) -> Value {
    let mut target = Value::Object(serde_json::Map::new());
    for mapping in mappings {
        match get_path(source, &mapping.source) {
            Some(value) => set_path(&mut target, &mapping.target, value.clone()),
            None => {
                if mapping.required || mapping.default.is_some() {
                    if mapping.required && mapping.default.is_none() {
                        warn!(
                            source = %mapping.source,
                            target = %mapping.target,
                            "required field absent with no default, emitting null"
                        );
                    }
                    let fallback = mapping.default.clone().unwrap_or(Value::Null);
                    set_path(&mut target, &mapping.target, fallback);
                }
            }
        }
    }
    target
}

/// Resolves a dot path in a JSON document
///
/// Numeric segments index into arrays.
pub fn get_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a value at a dot path, creating intermediate objects
pub fn set_path(document: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = document;
    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(serde_json::Map::new());
    }
    current
        .as_object_mut()
        .unwrap()
        .insert(segments[segments.len() - 1].to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_maps_nested_paths() {
        let mappings = vec![
            FieldMapping::new("patient.member_id", "subscriber.id"),
            FieldMapping::new("patient.dob", "subscriber.birth_date"),
        ];
        let source = json!({ "patient": { "member_id": "M-1", "dob": "1950-04-02" } });

        let target = apply_mappings(&mappings, &source);
        assert_eq!(target, json!({
            "subscriber": { "id": "M-1", "birth_date": "1950-04-02" }
        }));
    }

    #[test]
    fn test_absent_optional_field_is_omitted() {
        let mappings = vec![FieldMapping::new("missing", "out")];
        let target = apply_mappings(&mappings, &json!({}));
        assert_eq!(target, json!({}));
    }

    #[test]
    fn test_absent_field_with_default_emits_default() {
        let mappings =
            vec![FieldMapping::new("service_type", "eq.code").with_default(json!("30"))];
        let target = apply_mappings(&mappings, &json!({}));
        assert_eq!(target, json!({ "eq": { "code": "30" } }));
    }

    #[test]
    fn test_required_absent_field_still_emits_target_key() {
        let mappings = vec![
            FieldMapping::new("payer_id", "payer.id").required(),
            FieldMapping::new("npi", "provider.npi")
                .with_default(json!("0000000000"))
                .required(),
        ];
        let target = apply_mappings(&mappings, &json!({}));
        assert_eq!(target, json!({
            "payer": { "id": null },
            "provider": { "npi": "0000000000" }
        }));
    }

    #[test]
    fn test_array_index_segment() {
        let mappings = vec![FieldMapping::new("diagnoses.0.code", "primary_diagnosis")];
        let source = json!({ "diagnoses": [{ "code": "E11.9" }, { "code": "I10" }] });
        let target = apply_mappings(&mappings, &source);
        assert_eq!(target, json!({ "primary_diagnosis": "E11.9" }));
    }
}
