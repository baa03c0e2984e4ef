//! Key-value backend: entity-proxy client protocol and its adapter.
//!
//! The client exposes create/put/get/delete/patch plus per-index query
//! proxies, each returning `{data, cursor?, unprocessed?}`. Pagination is
//! native: an opaque cursor is returned while more items remain. The
//! adapter resolves engine queries onto this protocol; the unscoped `all`
//! index is backed by a synthetic partition value.

use crate::{
    backend::{BackendKind, BatchGetOutput, QueryPage, StorageAdapter},
    error::{DataAccessError, StoreError},
    naming::entity_name_to_all_pk_value,
    query::{Between, OrderDirection, QueryOptions, WhereClause},
    record::Record,
    schema::Schema,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

/// Synthetic partition facet name used by the `all` index.
pub const ALL_PARTITION_FACET: &str = "pk";

///
/// StoreQuery
/// Query parameters handed to one of the client's index proxies.
///

#[derive(Clone, Debug, Default)]
pub struct StoreQuery {
    pub keys: Record,
    /// Sort facets of the queried index, in declaration order. The proxy
    /// orders items by these before applying `order`.
    pub sort_fields: Vec<String>,
    pub ascending: bool,
    pub limit: Option<usize>,
    pub attributes: Option<Vec<String>>,
    pub between: Option<Between>,
    pub filters: Vec<WhereClause>,
    pub cursor: Option<String>,
}

///
/// StoreOutput
/// Response envelope of every entity-proxy call.
///

#[derive(Clone, Debug, Default)]
pub struct StoreOutput {
    pub data: Vec<Record>,
    pub cursor: Option<String>,
    pub unprocessed: Vec<Record>,
}

impl StoreOutput {
    #[must_use]
    pub fn data(data: Vec<Record>) -> Self {
        Self {
            data,
            cursor: None,
            unprocessed: Vec::new(),
        }
    }
}

///
/// EntityStoreClient
///
/// Protocol of the key-value entity-modeling proxy. Implementations are
/// external; the engine ships a deterministic in-memory one for tests.
///

#[async_trait]
pub trait EntityStoreClient: Send + Sync {
    /// Insert one item; fails with a conflict when the key already exists.
    async fn create(&self, entity: &str, item: Record) -> Result<StoreOutput, StoreError>;

    /// Batch upsert. Items the store could not take in this round come back
    /// under `unprocessed`.
    async fn put(&self, entity: &str, items: Vec<Record>) -> Result<StoreOutput, StoreError>;

    /// Batch read by primary keys. Unresolvable keys come back under
    /// `unprocessed`.
    async fn get(
        &self,
        entity: &str,
        keys: &[Record],
        attributes: Option<&[String]>,
    ) -> Result<StoreOutput, StoreError>;

    /// Batch delete by primary keys.
    async fn delete(&self, entity: &str, keys: &[Record]) -> Result<StoreOutput, StoreError>;

    /// Partial update of one item by primary key.
    async fn patch(&self, entity: &str, key: &Record, set: Record)
    -> Result<StoreOutput, StoreError>;

    /// Query one page through the named index proxy.
    async fn query(
        &self,
        entity: &str,
        index: &str,
        query: StoreQuery,
    ) -> Result<StoreOutput, StoreError>;
}

///
/// KeyValueAdapter
/// Storage strategy over an [`EntityStoreClient`].
///

#[derive(Clone)]
pub struct KeyValueAdapter {
    client: Arc<dyn EntityStoreClient>,
}

impl KeyValueAdapter {
    #[must_use]
    pub fn new(client: Arc<dyn EntityStoreClient>) -> Self {
        Self { client }
    }

    fn id_key(schema: &Schema, id: &str) -> Record {
        let mut key = Record::new();
        key.insert(schema.id_name().to_string(), Value::String(id.to_string()));
        key
    }

    fn wrap(schema: &Schema, action: &str, err: StoreError) -> DataAccessError {
        DataAccessError::backend(schema.entity_name(), action, err)
    }

    /// Composite keys have no native delete path; resolve them to primary
    /// identifiers through the matching index, then batch-delete.
    async fn resolve_ids_for_key(
        &self,
        schema: &Schema,
        key: &Record,
    ) -> Result<Vec<String>, DataAccessError> {
        let key_names: Vec<&str> = key.keys().map(String::as_str).collect();
        let index_name = schema.find_index_name_by_keys(&key_names);
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let output = self
                .client
                .query(
                    schema.entity_name(),
                    &index_name,
                    StoreQuery {
                        keys: key.clone(),
                        sort_fields: schema
                            .index(&index_name)
                            .map(|index| index.sort_facets().to_vec())
                            .unwrap_or_default(),
                        ascending: true,
                        attributes: Some(vec![schema.id_name().to_string()]),
                        cursor,
                        ..StoreQuery::default()
                    },
                )
                .await
                .map_err(|err| Self::wrap(schema, "remove by index keys", err))?;

            ids.extend(
                output
                    .data
                    .iter()
                    .filter_map(|record| record.get(schema.id_name()))
                    .filter_map(Value::as_str)
                    .map(ToString::to_string),
            );

            cursor = output.cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(ids)
    }
}

#[async_trait]
impl StorageAdapter for KeyValueAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    async fn get_by_id(
        &self,
        schema: &Schema,
        id: &str,
        attributes: Option<&[String]>,
    ) -> Result<Option<Record>, DataAccessError> {
        let keys = [Self::id_key(schema, id)];
        let output = self
            .client
            .get(schema.entity_name(), &keys, attributes)
            .await
            .map_err(|err| Self::wrap(schema, "find by id", err))?;

        Ok(output.data.into_iter().next())
    }

    async fn query_page(
        &self,
        schema: &Schema,
        index_name: &str,
        keys: &Record,
        options: &QueryOptions,
        cursor: Option<&str>,
    ) -> Result<QueryPage, DataAccessError> {
        let index = schema.index(index_name).ok_or_else(|| {
            DataAccessError::query(
                schema.entity_name(),
                "query",
                format!("query proxy [{index_name}] not found"),
            )
        })?;

        let mut query_keys = keys.clone();
        if index.is_all() {
            // The all index lives under one synthetic partition value.
            query_keys.insert(
                ALL_PARTITION_FACET.to_string(),
                Value::String(entity_name_to_all_pk_value(schema.entity_name())),
            );
        }

        let output = self
            .client
            .query(
                schema.entity_name(),
                index_name,
                StoreQuery {
                    keys: query_keys,
                    sort_fields: index.sort_facets().to_vec(),
                    ascending: options.order == OrderDirection::Asc,
                    limit: options.limit,
                    attributes: options.attributes.clone(),
                    between: options.between.clone(),
                    filters: options.filters.clone(),
                    cursor: cursor.map(ToString::to_string),
                },
            )
            .await
            .map_err(|err| Self::wrap(schema, "query", err))?;

        Ok(QueryPage {
            records: output.data,
            cursor: output.cursor,
        })
    }

    async fn insert(
        &self,
        schema: &Schema,
        record: Record,
        upsert: bool,
    ) -> Result<Record, DataAccessError> {
        let output = if upsert {
            self.client
                .put(schema.entity_name(), vec![record.clone()])
                .await
        } else {
            self.client.create(schema.entity_name(), record.clone()).await
        }
        .map_err(|err| Self::wrap(schema, "create", err))?;

        Ok(output.data.into_iter().next().unwrap_or(record))
    }

    async fn insert_many(
        &self,
        schema: &Schema,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, DataAccessError> {
        let output = self
            .client
            .put(schema.entity_name(), records.clone())
            .await
            .map_err(|err| Self::wrap(schema, "create many", err))?;

        if !output.unprocessed.is_empty() {
            // Surfaced, never retried; retry policy belongs to the caller.
            error!(
                entity = schema.entity_name(),
                unprocessed = output.unprocessed.len(),
                "failed to process all items in batch write"
            );
        }

        Ok(records)
    }

    async fn update_by_keys(
        &self,
        schema: &Schema,
        keys: &Record,
        updates: Record,
    ) -> Result<(), DataAccessError> {
        self.client
            .patch(schema.entity_name(), keys, updates)
            .await
            .map_err(|err| Self::wrap(schema, "update", err))?;
        Ok(())
    }

    async fn delete_by_ids(&self, schema: &Schema, ids: &[String]) -> Result<(), DataAccessError> {
        let keys: Vec<Record> = ids.iter().map(|id| Self::id_key(schema, id)).collect();
        self.client
            .delete(schema.entity_name(), &keys)
            .await
            .map_err(|err| Self::wrap(schema, "remove by ids", err))?;
        Ok(())
    }

    async fn delete_by_keys(
        &self,
        schema: &Schema,
        keys: &[Record],
    ) -> Result<(), DataAccessError> {
        let id_name = schema.id_name();
        let all_primary = keys
            .iter()
            .all(|key| key.len() == 1 && key.contains_key(id_name));

        if all_primary {
            self.client
                .delete(schema.entity_name(), keys)
                .await
                .map_err(|err| Self::wrap(schema, "remove by index keys", err))?;
            return Ok(());
        }

        let mut ids = Vec::new();
        for key in keys {
            ids.extend(self.resolve_ids_for_key(schema, key).await?);
        }
        if ids.is_empty() {
            return Ok(());
        }

        self.delete_by_ids(schema, &ids).await
    }

    async fn batch_get(
        &self,
        schema: &Schema,
        keys: &[Record],
        attributes: Option<&[String]>,
    ) -> Result<BatchGetOutput, DataAccessError> {
        let output = self
            .client
            .get(schema.entity_name(), keys, attributes)
            .await
            .map_err(|err| Self::wrap(schema, "batch get by keys", err))?;

        Ok(BatchGetOutput {
            data: output.data,
            unprocessed: output.unprocessed,
        })
    }
}
