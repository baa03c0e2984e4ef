//! Typed value guards with deterministic messages.
//!
//! Guards protect the seams where callers hand the engine loose values:
//! generated accessor arguments, model setters, and id parameters. Every
//! rejection names the offending property so messages are stable and
//! testable.

use crate::{error::ValidationError, schema::AttributeType};
use serde_json::Value;
use uuid::Uuid;

fn required(property: &str, entity: &str) -> ValidationError {
    ValidationError::attribute(entity, property, format!("{property} is required"))
}

fn must_be(property: &str, entity: &str, expected: &str) -> ValidationError {
    ValidationError::attribute(entity, property, format!("{property} must be {expected}"))
}

/// Missing/null handling shared by all guards: `Ok(true)` means the value is
/// absent and allowed to be, `Ok(false)` means a concrete value is present.
fn check_presence(
    property: &str,
    value: Option<&Value>,
    entity: &str,
    nullable: bool,
) -> Result<bool, ValidationError> {
    match value {
        None | Some(Value::Null) => {
            if nullable {
                Ok(true)
            } else {
                Err(required(property, entity))
            }
        }
        Some(_) => Ok(false),
    }
}

/// Non-empty string.
pub fn guard_string(
    property: &str,
    value: Option<&Value>,
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    if check_presence(property, value, entity, nullable)? {
        return Ok(());
    }
    match value {
        Some(Value::String(text)) if !text.is_empty() => Ok(()),
        _ => Err(must_be(property, entity, "a non-empty string")),
    }
}

/// Finite JSON number.
pub fn guard_number(
    property: &str,
    value: Option<&Value>,
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    if check_presence(property, value, entity, nullable)? {
        return Ok(());
    }
    match value {
        Some(Value::Number(_)) => Ok(()),
        _ => Err(must_be(property, entity, "a number")),
    }
}

/// Boolean.
pub fn guard_boolean(
    property: &str,
    value: Option<&Value>,
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    if check_presence(property, value, entity, nullable)? {
        return Ok(());
    }
    match value {
        Some(Value::Bool(_)) => Ok(()),
        _ => Err(must_be(property, entity, "a boolean")),
    }
}

/// JSON array.
pub fn guard_list(
    property: &str,
    value: Option<&Value>,
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    if check_presence(property, value, entity, nullable)? {
        return Ok(());
    }
    match value {
        Some(Value::Array(_)) => Ok(()),
        _ => Err(must_be(property, entity, "a list")),
    }
}

/// JSON object.
pub fn guard_map(
    property: &str,
    value: Option<&Value>,
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    if check_presence(property, value, entity, nullable)? {
        return Ok(());
    }
    match value {
        Some(Value::Object(_)) => Ok(()),
        _ => Err(must_be(property, entity, "an object")),
    }
}

/// Member of a declared enum value set.
pub fn guard_enum(
    property: &str,
    value: Option<&Value>,
    allowed: &[String],
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    if check_presence(property, value, entity, nullable)? {
        return Ok(());
    }
    match value {
        Some(Value::String(text)) if allowed.iter().any(|v| v == text) => Ok(()),
        _ => Err(must_be(
            property,
            entity,
            &format!("one of [{}]", allowed.join(", ")),
        )),
    }
}

/// uuid-formatted identifier.
pub fn guard_id(
    property: &str,
    value: Option<&Value>,
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    if check_presence(property, value, entity, nullable)? {
        return Ok(());
    }
    match value {
        Some(Value::String(text)) if Uuid::parse_str(text).is_ok() => Ok(()),
        _ => Err(must_be(property, entity, "a valid UUID")),
    }
}

/// uuid-formatted identifier passed as a plain string parameter.
pub fn guard_id_str(property: &str, value: &str, entity: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(required(property, entity));
    }
    if Uuid::parse_str(value).is_err() {
        return Err(must_be(property, entity, "a valid UUID"));
    }
    Ok(())
}

/// Guard a value against a declared attribute type. Used by accessor
/// dispatch and model setters, where the attribute definition decides the
/// check.
pub fn guard_typed(
    property: &str,
    value: Option<&Value>,
    attribute_type: &AttributeType,
    entity: &str,
    nullable: bool,
) -> Result<(), ValidationError> {
    match attribute_type {
        AttributeType::String => guard_string(property, value, entity, nullable),
        AttributeType::Number => guard_number(property, value, entity, nullable),
        AttributeType::Boolean => guard_boolean(property, value, entity, nullable),
        AttributeType::List => guard_list(property, value, entity, nullable),
        AttributeType::Map => guard_map(property, value, entity, nullable),
        AttributeType::Enum(values) => guard_enum(property, value, values, entity, nullable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_value_names_the_property() {
        let err = guard_string("siteId", None, "Site", false).unwrap_err();
        assert_eq!(err.attribute.as_deref(), Some("siteId"));
        assert!(err.to_string().contains("siteId is required"));
    }

    #[test]
    fn nullable_values_pass_when_absent() {
        assert!(guard_number("rank", None, "Suggestion", true).is_ok());
        assert!(guard_number("rank", Some(&Value::Null), "Suggestion", true).is_ok());
    }

    #[test]
    fn enum_guard_checks_membership() {
        let allowed = vec!["NEW".to_string(), "RESOLVED".to_string()];
        assert!(guard_enum("status", Some(&json!("NEW")), &allowed, "Opportunity", false).is_ok());

        let err = guard_enum("status", Some(&json!("BOGUS")), &allowed, "Opportunity", false)
            .unwrap_err();
        assert!(err.to_string().contains("status must be one of"));
    }

    #[test]
    fn id_guard_rejects_malformed_uuids() {
        assert!(guard_id_str("siteId", "2ef7a9f3-02a4-4a9d-9a3a-3f63e5e7b9ab", "Site").is_ok());
        let err = guard_id_str("siteId", "not-a-uuid", "Site").unwrap_err();
        assert!(err.to_string().contains("siteId must be a valid UUID"));
    }
}
