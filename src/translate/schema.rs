//! JSON-schema sanitizer for tool parameter schemas.
//!
//! The upstream's function-declaration validator accepts a narrow subset of
//! JSON schema. This strips the keywords it rejects and rewrites nullable
//! type unions into the `nullable: true` form it expects. Pure function,
//! idempotent: `sanitize_schema(sanitize_schema(s)) == sanitize_schema(s)`.

use serde_json::Value;

/// `format` values the upstream recognises on string/number types. Everything
/// else (uri, uuid, email, ...) fails validation and is dropped.
const SUPPORTED_FORMATS: &[&str] = &["enum", "date-time"];

pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                match key.as_str() {
                    "$schema" | "additionalProperties" => continue,
                    "format" => {
                        match value.as_str() {
                            Some(f) if SUPPORTED_FORMATS.contains(&f) => {
                                out.insert(key.clone(), value.clone());
                            }
                            Some(f) => {
                                tracing::debug!(format = f, "dropping unsupported schema format");
                            }
                            None => {}
                        }
                        continue;
                    }
                    "type" => {
                        sanitize_type(value, &mut out);
                        continue;
                    }
                    _ => {}
                }
                out.insert(key.clone(), sanitize_schema(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

/// `type: ["string", "null"]` becomes `type: "string", nullable: true`; a
/// union of several concrete types keeps the first one.
fn sanitize_type(value: &Value, out: &mut serde_json::Map<String, Value>) {
    if let Some(types) = value.as_array() {
        let concrete: Vec<&Value> = types
            .iter()
            .filter(|t| t.as_str() != Some("null"))
            .collect();
        let had_null = concrete.len() != types.len();

        if let Some(first) = concrete.first() {
            out.insert("type".to_string(), (*first).clone());
        }
        if had_null {
            out.insert("nullable".to_string(), Value::Bool(true));
        }
    } else {
        out.insert("type".to_string(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_rejected_keywords() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "city": {"type": "string", "format": "uri"},
                "when": {"type": "string", "format": "date-time"}
            }
        });

        let cleaned = sanitize_schema(&schema);
        assert!(cleaned.get("$schema").is_none());
        assert!(cleaned.get("additionalProperties").is_none());
        assert!(cleaned["properties"]["city"].get("format").is_none());
        assert_eq!(cleaned["properties"]["when"]["format"], "date-time");
    }

    #[test]
    fn test_nullable_type_union() {
        let schema = json!({
            "type": "object",
            "properties": {
                "limit": {"type": ["integer", "null"]}
            }
        });

        let cleaned = sanitize_schema(&schema);
        assert_eq!(cleaned["properties"]["limit"]["type"], "integer");
        assert_eq!(cleaned["properties"]["limit"]["nullable"], true);
    }

    #[test]
    fn test_recurses_into_arrays_and_nested_objects() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {"type": "string", "format": "uuid"}
                }
            },
            "anyOf": [
                {"additionalProperties": false, "type": "object"}
            ]
        });

        let cleaned = sanitize_schema(&schema);
        assert!(cleaned["properties"]["items"]["items"]
            .get("format")
            .is_none());
        assert!(cleaned["anyOf"][0].get("additionalProperties").is_none());
    }

    #[test]
    fn test_idempotent() {
        let schema = json!({
            "$schema": "x",
            "type": ["string", "null"],
            "additionalProperties": false,
            "properties": {
                "a": {"type": ["number", "null"], "format": "float"}
            }
        });

        let once = sanitize_schema(&schema);
        let twice = sanitize_schema(&once);
        assert_eq!(once, twice);
    }
}
