//! Deterministic in-memory implementations of both backend protocols,
//! plus the fixture schemas the engine's own tests run against. The
//! doubles reproduce the protocol contracts — cursor pagination,
//! unprocessed batch reporting, the malformed-input error class — without
//! a network, and count every call so tests can assert what did (or did
//! not) reach a backend.

pub mod fixtures;
pub mod memory_rest;
pub mod memory_store;

pub use fixtures::{key_value_fixture, relational_fixture};
pub use memory_rest::MemoryRestClient;
pub use memory_store::MemoryEntityStore;

use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::Mutex,
};

///
/// CallLog
/// Per-operation call counter shared by both backend doubles.
///

#[derive(Debug, Default)]
pub struct CallLog {
    counts: Mutex<HashMap<String, usize>>,
}

impl CallLog {
    pub fn record(&self, operation: &str) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(operation.to_string()).or_insert(0) += 1;
        }
    }

    #[must_use]
    pub fn count(&self, operation: &str) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total calls across all operations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    /// Total calls for operations that write.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.counts
            .lock()
            .map(|counts| {
                counts
                    .iter()
                    .filter(|(op, _)| {
                        matches!(
                            op.as_str(),
                            "create" | "put" | "patch" | "delete" | "insert" | "update"
                                | "upsert"
                        )
                    })
                    .map(|(_, count)| count)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        if let Ok(mut counts) = self.counts.lock() {
            counts.clear();
        }
    }
}

/// Total order over JSON values for sorting and range checks: numbers
/// numerically, strings lexicographically, everything else by rendering.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Inclusive range check used by `between` translations.
#[must_use]
pub fn value_in_range(value: &Value, start: &Value, end: &Value) -> bool {
    compare_values(value, start) != Ordering::Less
        && compare_values(value, end) != Ordering::Greater
}
