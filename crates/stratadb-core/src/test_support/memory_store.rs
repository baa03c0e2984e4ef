//! In-memory key-value entity store.
//!
//! Behaves like the single-table entity proxy: primary-key CRUD, batch
//! put/get/delete with `unprocessed` reporting, and per-index query
//! proxies with native opaque-cursor pagination. Keys that are not valid
//! identifiers are reported under `unprocessed` rather than failing the
//! batch.

use crate::{
    backend::keyvalue::{EntityStoreClient, StoreOutput, StoreQuery},
    error::StoreError,
    naming::entity_name_to_id_name,
    query::WhereClause,
    record::Record,
    test_support::{CallLog, compare_values, value_in_range},
};
use async_trait::async_trait;
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap, sync::Mutex};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 100;

///
/// MemoryEntityStore
///

#[derive(Debug)]
pub struct MemoryEntityStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    page_size: usize,
    pub calls: CallLog,
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Small page sizes force the engine's pagination loop in tests.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            page_size: page_size.max(1),
            calls: CallLog::default(),
        }
    }

    /// Rows currently stored for an entity, in insertion order.
    #[must_use]
    pub fn rows(&self, entity: &str) -> Vec<Record> {
        self.tables
            .lock()
            .map(|tables| tables.get(entity).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row_count(&self, entity: &str) -> usize {
        self.rows(entity).len()
    }

    fn id_of(entity: &str, record: &Record) -> Option<String> {
        record
            .get(&entity_name_to_id_name(entity))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    fn project(record: &Record, attributes: Option<&[String]>) -> Record {
        attributes.map_or_else(
            || record.clone(),
            |attrs| {
                record
                    .iter()
                    .filter(|(key, _)| attrs.iter().any(|attr| attr == *key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            },
        )
    }

    fn matches_filters(record: &Record, filters: &[WhereClause]) -> bool {
        filters.iter().all(|clause| match clause {
            WhereClause::Eq(attr, value) => record.get(attr) == Some(value),
            WhereClause::Contains(attr, value) => record
                .get(attr)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        })
    }

    fn sort_records(entity: &str, records: &mut [Record], sort_fields: &[String], ascending: bool) {
        let id_name = entity_name_to_id_name(entity);
        records.sort_by(|a, b| {
            for field in sort_fields {
                let ordering = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            compare_values(
                a.get(&id_name).unwrap_or(&Value::Null),
                b.get(&id_name).unwrap_or(&Value::Null),
            )
        });
        if !ascending {
            records.reverse();
        }
    }
}

#[async_trait]
impl EntityStoreClient for MemoryEntityStore {
    async fn create(&self, entity: &str, item: Record) -> Result<StoreOutput, StoreError> {
        self.calls.record("create");

        let id = Self::id_of(entity, &item)
            .ok_or_else(|| StoreError::unavailable("item is missing its key"))?;

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::unavailable("store poisoned"))?;
        let rows = tables.entry(entity.to_string()).or_default();

        if rows
            .iter()
            .any(|row| Self::id_of(entity, row).as_deref() == Some(id.as_str()))
        {
            return Err(StoreError::conflict(format!(
                "item with key [{id}] already exists"
            )));
        }

        rows.push(item.clone());
        Ok(StoreOutput::data(vec![item]))
    }

    async fn put(&self, entity: &str, items: Vec<Record>) -> Result<StoreOutput, StoreError> {
        self.calls.record("put");

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::unavailable("store poisoned"))?;
        let rows = tables.entry(entity.to_string()).or_default();

        for item in &items {
            let id = Self::id_of(entity, item);
            match rows
                .iter_mut()
                .find(|row| Self::id_of(entity, row) == id && id.is_some())
            {
                Some(existing) => *existing = item.clone(),
                None => rows.push(item.clone()),
            }
        }

        Ok(StoreOutput::data(items))
    }

    async fn get(
        &self,
        entity: &str,
        keys: &[Record],
        attributes: Option<&[String]>,
    ) -> Result<StoreOutput, StoreError> {
        self.calls.record("get");

        let id_name = entity_name_to_id_name(entity);
        let rows = self.rows(entity);

        let mut data = Vec::new();
        let mut unprocessed = Vec::new();
        for key in keys {
            let id = key.get(&id_name).and_then(Value::as_str);
            // Malformed keys cannot be resolved in this round; the store
            // reports them back instead of failing the batch.
            let Some(id) = id.filter(|id| Uuid::parse_str(id).is_ok()) else {
                unprocessed.push(key.clone());
                continue;
            };

            if let Some(row) = rows
                .iter()
                .find(|row| Self::id_of(entity, row).as_deref() == Some(id))
            {
                data.push(Self::project(row, attributes));
            }
        }

        Ok(StoreOutput {
            data,
            cursor: None,
            unprocessed,
        })
    }

    async fn delete(&self, entity: &str, keys: &[Record]) -> Result<StoreOutput, StoreError> {
        self.calls.record("delete");

        let id_name = entity_name_to_id_name(entity);
        let ids: Vec<&str> = keys
            .iter()
            .filter_map(|key| key.get(&id_name).and_then(Value::as_str))
            .collect();

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::unavailable("store poisoned"))?;
        if let Some(rows) = tables.get_mut(entity) {
            rows.retain(|row| {
                Self::id_of(entity, row)
                    .is_none_or(|id| !ids.contains(&id.as_str()))
            });
        }

        Ok(StoreOutput::default())
    }

    async fn patch(
        &self,
        entity: &str,
        key: &Record,
        set: Record,
    ) -> Result<StoreOutput, StoreError> {
        self.calls.record("patch");

        let id_name = entity_name_to_id_name(entity);
        let id = key
            .get(&id_name)
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::unavailable("patch key is missing its id"))?;

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::unavailable("store poisoned"))?;
        let rows = tables.entry(entity.to_string()).or_default();
        let row = rows
            .iter_mut()
            .find(|row| Self::id_of(entity, row).as_deref() == Some(id))
            .ok_or_else(|| StoreError::not_found(format!("item with key [{id}] not found")))?;

        for (name, value) in set {
            row.insert(name, value);
        }

        Ok(StoreOutput::data(vec![row.clone()]))
    }

    async fn query(
        &self,
        entity: &str,
        _index: &str,
        query: StoreQuery,
    ) -> Result<StoreOutput, StoreError> {
        self.calls.record("query");

        let mut matches: Vec<Record> = self
            .rows(entity)
            .into_iter()
            .filter(|row| {
                query.keys.iter().all(|(facet, value)| {
                    // The synthetic all-partition facet scopes the index,
                    // not the rows.
                    facet == "pk" || row.get(facet) == Some(value)
                })
            })
            .filter(|row| {
                query.between.as_ref().is_none_or(|between| {
                    row.get(&between.attribute)
                        .is_some_and(|value| value_in_range(value, &between.start, &between.end))
                })
            })
            .filter(|row| Self::matches_filters(row, &query.filters))
            .collect();

        Self::sort_records(entity, &mut matches, &query.sort_fields, query.ascending);

        let offset: usize = query
            .cursor
            .as_deref()
            .and_then(|cursor| cursor.parse().ok())
            .unwrap_or(0);
        let page_size = query.limit.unwrap_or(self.page_size).max(1);

        let page: Vec<Record> = matches
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|row| Self::project(row, query.attributes.as_deref()))
            .collect();

        let next_offset = offset + page.len();
        let cursor = (next_offset < matches.len()).then(|| next_offset.to_string());

        Ok(StoreOutput {
            data: page,
            cursor,
            unprocessed: Vec::new(),
        })
    }
}
