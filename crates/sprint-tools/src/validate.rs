//! A minimal JSON-Schema-subset validator (§4.E "Validation"): just enough
//! of `type`/`required`/`enum` to catch malformed tool input before a
//! handler runs. Not a general-purpose schema engine — the tool schemas in
//! [`crate::schema`] only ever use this subset.

/// Returns the list of field-path violations, empty when `input` satisfies
/// `schema`. Only object schemas with flat (non-nested) properties are
/// supported, which is all the tools in [`crate::schema`] need.
pub fn validate(schema: &serde_json::Value, input: &serde_json::Value) -> Vec<String> {
    let mut errors = Vec::new();

    if !input.is_object() {
        errors.push("$: expected an object".to_string());
        return errors;
    }
    let input_obj = input.as_object().unwrap();

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for field in required {
            if let Some(name) = field.as_str() {
                if !input_obj.contains_key(name) {
                    errors.push(format!("{name}: required field is missing"));
                }
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
        for (name, value) in input_obj {
            let Some(prop_schema) = properties.get(name) else {
                continue; // additional properties are ignored, not rejected
            };
            if let Some(error) = check_type(name, prop_schema, value) {
                errors.push(error);
                continue;
            }
            if let Some(allowed) = prop_schema.get("enum").and_then(|v| v.as_array()) {
                if !allowed.contains(value) {
                    errors.push(format!("{name}: must be one of {allowed:?}"));
                }
            }
        }
    }

    errors
}

fn check_type(field: &str, prop_schema: &serde_json::Value, value: &serde_json::Value) -> Option<String> {
    let Some(expected) = prop_schema.get("type").and_then(|v| v.as_str()) else {
        return None;
    };
    let matches = match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };
    if matches {
        None
    } else {
        Some(format!("{field}: expected type `{expected}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "sprint_id": { "type": "string" },
                "max_results": { "type": "integer" },
                "state": { "type": "string", "enum": ["active", "closed"] }
            },
            "required": ["sprint_id"]
        })
    }

    #[test]
    fn valid_input_has_no_errors() {
        let input = json!({ "sprint_id": "44298", "max_results": 100 });
        assert!(validate(&schema(), &input).is_empty());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let input = json!({ "max_results": 100 });
        let errors = validate(&schema(), &input);
        assert_eq!(errors, vec!["sprint_id: required field is missing"]);
    }

    #[test]
    fn wrong_type_is_reported() {
        let input = json!({ "sprint_id": "x", "max_results": "not a number" });
        let errors = validate(&schema(), &input);
        assert!(errors.iter().any(|e| e.contains("max_results")));
    }

    #[test]
    fn enum_violation_is_reported() {
        let input = json!({ "sprint_id": "x", "state": "deleted" });
        let errors = validate(&schema(), &input);
        assert!(errors.iter().any(|e| e.contains("state")));
    }

    #[test]
    fn non_object_input_is_rejected() {
        let errors = validate(&schema(), &json!("not an object"));
        assert_eq!(errors, vec!["$: expected an object"]);
    }
}
