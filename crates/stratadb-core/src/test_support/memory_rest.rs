//! In-memory relational REST backend.
//!
//! Stores column-space rows per table and executes built requests the way
//! the real interface would: filters, multi-column ordering, inclusive
//! ranges, and the `{data, error}` envelope. Identifier columns are
//! uuid-typed: filtering them with a malformed value fails with the
//! invalid-input error code, which is what drives the engine's per-key
//! fallback.

use crate::{
    backend::relational::{RestClient, RestFilter, RestRequest, RestResponse, RestVerb},
    error::RestError,
    record::Record,
    test_support::{CallLog, compare_values},
};
use async_trait::async_trait;
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap, sync::Mutex};
use uuid::Uuid;

///
/// MemoryRestClient
///

#[derive(Debug, Default)]
pub struct MemoryRestClient {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    fail_next: Mutex<Option<RestError>>,
    pub calls: CallLog,
}

impl MemoryRestClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently stored for a table, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Fail the next request with the given error, once.
    pub fn inject_error(&self, error: RestError) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(error);
        }
    }

    fn is_uuid_column(column: &str) -> bool {
        column == "id" || column.ends_with("_id")
    }

    /// Validate filter values against uuid-typed columns the way the
    /// database would, before any row is considered.
    fn check_filter_types(filters: &[RestFilter]) -> Option<RestError> {
        for filter in filters {
            let (column, values) = match filter {
                RestFilter::Eq(column, value) => (column, vec![value]),
                RestFilter::In(column, values) => (column, values.iter().collect()),
                _ => continue,
            };
            if !Self::is_uuid_column(column) {
                continue;
            }
            for value in values {
                let valid = value
                    .as_str()
                    .is_some_and(|text| Uuid::parse_str(text).is_ok());
                if !valid {
                    return Some(RestError::invalid_input(format!(
                        "invalid input syntax for type uuid: {value}"
                    )));
                }
            }
        }
        None
    }

    fn matches(row: &Record, filter: &RestFilter) -> bool {
        match filter {
            RestFilter::Eq(column, value) => row.get(column) == Some(value),
            RestFilter::Ilike(column, pattern) => row
                .get(column)
                .and_then(Value::as_str)
                .is_some_and(|text| text.eq_ignore_ascii_case(pattern)),
            RestFilter::In(column, values) => row
                .get(column)
                .is_some_and(|value| values.contains(value)),
            RestFilter::Gte(column, value) => row
                .get(column)
                .is_some_and(|v| compare_values(v, value) != Ordering::Less),
            RestFilter::Lte(column, value) => row
                .get(column)
                .is_some_and(|v| compare_values(v, value) != Ordering::Greater),
            RestFilter::Contains(column, values) => row
                .get(column)
                .and_then(Value::as_array)
                .is_some_and(|items| values.iter().all(|value| items.contains(value))),
        }
    }

    fn matches_all(row: &Record, filters: &[RestFilter]) -> bool {
        filters.iter().all(|filter| Self::matches(row, filter))
    }

    fn order_rows(rows: &mut [Record], order: &[(String, bool)]) {
        rows.sort_by(|a, b| {
            for (column, ascending) in order {
                let ordering = compare_values(
                    a.get(column).unwrap_or(&Value::Null),
                    b.get(column).unwrap_or(&Value::Null),
                );
                let ordering = if *ascending { ordering } else { ordering.reverse() };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    fn project(row: &Record, columns: &str) -> Record {
        if columns == "*" {
            return row.clone();
        }
        let selected: Vec<&str> = columns.split(',').map(str::trim).collect();
        row.iter()
            .filter(|(column, _)| selected.contains(&column.as_str()))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    fn execute_select(&self, request: &RestRequest) -> RestResponse {
        let mut rows: Vec<Record> = self
            .rows(&request.table)
            .into_iter()
            .filter(|row| Self::matches_all(row, &request.filters))
            .collect();

        Self::order_rows(&mut rows, &request.order);

        let (start, end) = request.range.unwrap_or((0, usize::MAX - 1));
        let data: Vec<Record> = rows
            .into_iter()
            .skip(start)
            .take(end.saturating_sub(start) + 1)
            .map(|row| Self::project(&row, &request.columns))
            .collect();

        RestResponse::data(data)
    }

    fn execute_write(&self, request: &RestRequest) -> RestResponse {
        let Ok(mut tables) = self.tables.lock() else {
            return RestResponse::error(RestError::new("store poisoned"));
        };
        let rows = tables.entry(request.table.clone()).or_default();

        match request.verb {
            RestVerb::Insert => {
                rows.extend(request.payload.iter().cloned());
                RestResponse::data(request.payload.clone())
            }
            RestVerb::Upsert => {
                let conflict_column = request.on_conflict.clone().unwrap_or_else(|| "id".into());
                for item in &request.payload {
                    let key = item.get(&conflict_column);
                    match rows
                        .iter_mut()
                        .find(|row| key.is_some() && row.get(&conflict_column) == key)
                    {
                        Some(existing) => *existing = item.clone(),
                        None => rows.push(item.clone()),
                    }
                }
                RestResponse::data(request.payload.clone())
            }
            RestVerb::Update => {
                let updates = request.payload.first().cloned().unwrap_or_default();
                let mut updated = Vec::new();
                for row in rows
                    .iter_mut()
                    .filter(|row| Self::matches_all(row, &request.filters))
                {
                    for (column, value) in &updates {
                        row.insert(column.clone(), value.clone());
                    }
                    updated.push(row.clone());
                }
                RestResponse::data(updated)
            }
            RestVerb::Delete => {
                let removed: Vec<Record> = rows
                    .iter()
                    .filter(|row| Self::matches_all(row, &request.filters))
                    .cloned()
                    .collect();
                rows.retain(|row| !Self::matches_all(row, &request.filters));
                RestResponse::data(removed)
            }
            RestVerb::Select => RestResponse::error(RestError::new("select is not a write")),
        }
    }
}

#[async_trait]
impl RestClient for MemoryRestClient {
    async fn execute(&self, request: RestRequest) -> RestResponse {
        let operation = match request.verb {
            RestVerb::Select => "select",
            RestVerb::Insert => "insert",
            RestVerb::Update => "update",
            RestVerb::Upsert => "upsert",
            RestVerb::Delete => "delete",
        };
        self.calls.record(operation);

        if let Ok(mut slot) = self.fail_next.lock() {
            if let Some(error) = slot.take() {
                return RestResponse::error(error);
            }
        }

        if let Some(error) = Self::check_filter_types(&request.filters) {
            return RestResponse::error(error);
        }

        match request.verb {
            RestVerb::Select => self.execute_select(&request),
            _ => self.execute_write(&request),
        }
    }
}
