//! Record preparation and hydration.
//!
//! A record is a plain attribute-name to value mapping. The write pipeline
//! is defaults, then `set` transforms, then validation; nothing invalid
//! reaches a backend. The read pipeline re-hydrates backend-skipped
//! defaults and applies `get` transforms, where a transform failure is
//! downgraded to a warning and the raw value kept.

use crate::{
    error::ValidationError,
    schema::{AttributeType, Schema},
};
use serde_json::{Map, Value};
use tracing::warn;

/// Attribute-name to value mapping, the unit of storage exchange.
pub type Record = Map<String, Value>;

/// Build a record from pairs; test and fixture convenience.
#[must_use]
pub fn record_from<S: Into<String>, V: Into<Value>>(
    pairs: impl IntoIterator<Item = (S, V)>,
) -> Record {
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

fn is_absent(record: &Record, name: &str) -> bool {
    matches!(record.get(name), None | Some(Value::Null))
}

/// Fill in every missing attribute that declares a default.
#[must_use]
pub fn apply_defaults(schema: &Schema, mut record: Record) -> Record {
    for attribute in schema.attributes() {
        if !is_absent(&record, attribute.name()) {
            continue;
        }
        if let Some(default) = attribute.default() {
            record.insert(attribute.name().to_string(), default.resolve());
        }
    }
    record
}

/// Run every `set` transform over the record. Transforms observe the record
/// as it stood before this pass and may veto by returning `None`.
#[must_use]
pub fn apply_set_transforms(schema: &Schema, mut record: Record) -> Record {
    let snapshot = record.clone();
    for attribute in schema.attributes() {
        let Some(setter) = attribute.setter() else {
            continue;
        };
        if let Some(value) = setter(snapshot.get(attribute.name()), &snapshot) {
            record.insert(attribute.name().to_string(), value);
        }
    }
    record
}

/// Validate a candidate record against every attribute's required/type/
/// custom rules. All failures are collected into one [`ValidationError`]
/// whose reason joins them in attribute declaration order.
pub fn validate_record(schema: &Schema, record: &Record) -> Result<(), ValidationError> {
    let mut failures: Vec<String> = Vec::new();
    let mut first_attribute: Option<String> = None;

    for attribute in schema.attributes() {
        let name = attribute.name();
        let value = record.get(name).filter(|v| !v.is_null());

        let mut fail = |reason: String| {
            if first_attribute.is_none() {
                first_attribute = Some(name.to_string());
            }
            failures.push(reason);
        };

        let Some(value) = value else {
            if attribute.is_required() {
                fail(format!("{name} is required"));
            }
            continue;
        };

        match attribute.attribute_type() {
            AttributeType::Enum(_) => {
                if !attribute.attribute_type().matches(value) {
                    fail(format!("{name} is invalid"));
                }
            }
            other => {
                if !other.matches(value) {
                    fail(format!("{name} must be {}", other.noun()));
                }
            }
        }

        if let Some(validate) = attribute.validator() {
            match validate(value) {
                Ok(true) => {}
                Ok(false) => fail(format!("{name} failed validation")),
                Err(reason) => fail(reason),
            }
        }
    }

    if failures.is_empty() {
        return Ok(());
    }

    Err(ValidationError {
        entity: schema.entity_name().to_string(),
        attribute: first_attribute,
        reason: failures.join(", "),
    })
}

/// Full write pipeline: defaults, `set` transforms, validation.
pub fn prepare_for_write(schema: &Schema, record: Record) -> Result<Record, ValidationError> {
    let record = apply_set_transforms(schema, apply_defaults(schema, record));
    validate_record(schema, &record)?;
    Ok(record)
}

/// Re-hydrate defaults for attributes intentionally excluded from backend
/// writes; normal attributes keep their projection behavior.
#[must_use]
pub fn apply_read_defaults(schema: &Schema, mut record: Record) -> Record {
    for attribute in schema.attributes() {
        if !attribute.is_db_skipped() || !is_absent(&record, attribute.name()) {
            continue;
        }
        if let Some(default) = attribute.default() {
            record.insert(attribute.name().to_string(), default.resolve());
        }
    }
    record
}

/// Apply every attribute's `get` transform to a fetched record. A transform
/// failure must never fail the whole read: it is logged and the raw value
/// kept. Absent values are skipped.
#[must_use]
pub fn apply_get_transforms(schema: &Schema, mut record: Record) -> Record {
    let snapshot = record.clone();
    for attribute in schema.attributes() {
        let Some(getter) = attribute.getter() else {
            continue;
        };
        let Some(value) = snapshot.get(attribute.name()).filter(|v| !v.is_null()) else {
            continue;
        };

        match getter(value, &snapshot) {
            Ok(transformed) => {
                record.insert(attribute.name().to_string(), transformed);
            }
            Err(reason) => {
                warn!(
                    entity = schema.entity_name(),
                    attribute = attribute.name(),
                    %reason,
                    "failed to apply getter; keeping raw value"
                );
            }
        }
    }
    record
}

/// Read pipeline applied to every row a backend returns.
#[must_use]
pub fn hydrate(schema: &Schema, record: Record) -> Record {
    apply_get_transforms(schema, apply_read_defaults(schema, record))
}

/// Advance an ISO timestamp to be strictly greater than `previous`.
/// Falls back to previous + 1s when the candidate does not advance it.
fn advance_timestamp(previous: &Value, candidate: Value) -> Value {
    use chrono::{DateTime, Duration, SecondsFormat};

    let Some(previous_text) = previous.as_str() else {
        return candidate;
    };
    let Ok(previous_at) = DateTime::parse_from_rfc3339(previous_text) else {
        return candidate;
    };

    let advanced = candidate
        .as_str()
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .is_some_and(|candidate_at| candidate_at > previous_at);
    if advanced {
        return candidate;
    }

    Value::String(
        (previous_at + Duration::seconds(1)).to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Re-run watcher-bound `set` transforms for a save that changed the given
/// updates. `updatedAt` is bumped strictly above its previous value even
/// when the recomputation would not have advanced it, so saves are always
/// observable in timestamp order.
#[must_use]
pub fn apply_update_watchers(
    schema: &Schema,
    mut record: Record,
    mut updates: Record,
) -> (Record, Record) {
    if updates.is_empty() {
        return (record, updates);
    }

    let changed: Vec<String> = updates.keys().cloned().collect();
    let changed_refs: Vec<&str> = changed.iter().map(String::as_str).collect();
    let snapshot = record.clone();

    for attribute in schema.attributes() {
        let Some(setter) = attribute.setter() else {
            continue;
        };
        if !attribute.watch_spec().triggers_on(&changed_refs) {
            continue;
        }

        let Some(mut value) = setter(snapshot.get(attribute.name()), &snapshot) else {
            continue;
        };

        if attribute.name() == "updatedAt" {
            if let Some(previous) = snapshot.get("updatedAt") {
                value = advance_timestamp(previous, value);
            }
        }

        record.insert(attribute.name().to_string(), value.clone());
        updates.insert(attribute.name().to_string(), value);
    }

    (record, updates)
}
