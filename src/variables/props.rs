/// Property processors and validators
///
/// Second phase of input resolution: once templates are resolved, each declared
/// prop is coerced to its schema type and checked. Errors are collected per prop
/// rather than stopping at the first one, so a failed step reports every
/// problem at once.

use crate::flow::condition::parse_date;
use crate::pieces::property::{PropertyDefinition, PropertyKind, PropertyMap};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Validation errors keyed by prop name
pub type PropErrors = BTreeMap<String, String>;

/// Process `input` against `props`
///
/// Undeclared keys are passed through untouched.
pub fn process_and_validate(props: &PropertyMap, input: &Value) -> (Value, PropErrors) {
    let mut processed = match input {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let mut errors = PropErrors::new();

    for (name, prop) in props {
        let raw = processed.get(name).cloned().filter(|v| !is_empty(v));
        let value = raw.or_else(|| prop.default_value.clone());

        match value {
            None => {
                if prop.required {
                    errors.insert(name.clone(), "Expected value but got nothing".to_string());
                }
                processed.remove(name);
            }
            Some(value) => match process_value(prop, value) {
                Ok(value) => {
                    processed.insert(name.clone(), value);
                }
                Err(message) => {
                    errors.insert(name.clone(), message);
                }
            },
        }
    }

    (Value::Object(processed), errors)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn process_value(prop: &PropertyDefinition, value: Value) -> Result<Value, String> {
    match &prop.kind {
        PropertyKind::ShortText | PropertyKind::LongText | PropertyKind::SecretText => Ok(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }),
        PropertyKind::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(|n| match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
                    _ => Value::Number(n),
                })
                .ok_or_else(|| format!("Expected a number but got '{}'", s)),
            other => Err(format!("Expected a number but got {}", other)),
        },
        PropertyKind::Checkbox => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(format!("Expected a boolean but got {}", other)),
        },
        PropertyKind::Json => match value {
            Value::String(s) => serde_json::from_str(&s).map_err(|e| format!("Expected valid JSON: {}", e)),
            other => Ok(other),
        },
        PropertyKind::Object => match parse_embedded(value) {
            value @ Value::Object(_) => Ok(value),
            other => Err(format!("Expected an object but got {}", other)),
        },
        PropertyKind::Array => match parse_embedded(value) {
            value @ Value::Array(_) => Ok(value),
            other => Err(format!("Expected an array but got {}", other)),
        },
        PropertyKind::DateTime => parse_date(&value)
            .map(|date| Value::String(date.to_rfc3339()))
            .ok_or_else(|| format!("Expected an ISO 8601 date but got {}", value)),
        PropertyKind::StaticDropdown { options } => {
            if options.contains(&value) {
                Ok(value)
            } else {
                Err(format!("Value {} is not one of the allowed options", value))
            }
        }
        PropertyKind::Dropdown { .. } | PropertyKind::File | PropertyKind::CustomAuth { .. } => Ok(value),
    }
}

/// Objects and arrays may arrive JSON-encoded inside a string
fn parse_embedded(value: Value) -> Value {
    match &value {
        Value::String(s) => serde_json::from_str(s).unwrap_or(value),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pieces::property::{DropdownOption, DropdownState};
    use serde_json::json;

    fn schema() -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("url".into(), PropertyDefinition::new("URL", PropertyKind::ShortText).required());
        props.insert("retries".into(), PropertyDefinition::new("Retries", PropertyKind::Number).default_value(json!(3)));
        props.insert("verbose".into(), PropertyDefinition::new("Verbose", PropertyKind::Checkbox));
        props.insert("body".into(), PropertyDefinition::new("Body", PropertyKind::Object));
        props.insert(
            "method".into(),
            PropertyDefinition::new(
                "Method",
                PropertyKind::StaticDropdown {
                    options: DropdownState::new(vec![
                        DropdownOption::new("GET", json!("GET")),
                        DropdownOption::new("POST", json!("POST")),
                    ]),
                },
            ),
        );
        props.insert("when".into(), PropertyDefinition::new("When", PropertyKind::DateTime));
        props
    }

    #[test]
    fn coerces_values_and_applies_defaults() {
        let input = json!({
            "url": 42,
            "verbose": "TRUE",
            "body": "{\"a\": 1}",
            "method": "POST",
            "when": "2024-01-02",
            "extra": [1]
        });
        let (processed, errors) = process_and_validate(&schema(), &input);

        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(processed["url"], json!("42"));
        assert_eq!(processed["retries"], json!(3));
        assert_eq!(processed["verbose"], json!(true));
        assert_eq!(processed["body"], json!({"a": 1}));
        assert_eq!(processed["when"], json!("2024-01-02T00:00:00+00:00"));
        assert_eq!(processed["extra"], json!([1]));
    }

    #[test]
    fn collects_every_error() {
        let input = json!({"retries": "many", "method": "PUT", "body": [1]});
        let (_, errors) = process_and_validate(&schema(), &input);

        assert_eq!(errors.len(), 4);
        assert_eq!(errors["url"], "Expected value but got nothing");
        assert!(errors["retries"].starts_with("Expected a number"));
        assert!(errors["method"].contains("allowed options"));
        assert!(errors["body"].starts_with("Expected an object"));
    }

    #[test]
    fn numeric_strings_become_numbers() {
        let (processed, errors) = process_and_validate(&schema(), &json!({"url": "x", "retries": " 5 "}));
        assert!(errors.is_empty());
        assert_eq!(processed["retries"], json!(5));
    }
}
