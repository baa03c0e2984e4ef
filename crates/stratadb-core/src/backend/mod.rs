//! Storage backends.
//!
//! The engine talks to storage through one [`StorageAdapter`] interface
//! with two concrete implementations, selected once at collection
//! construction: [`keyvalue::KeyValueAdapter`] over an entity-proxy client,
//! and [`relational::RelationalAdapter`] over a REST query client. All
//! query translation lives inside the adapters; collections never inspect
//! which backend is active beyond diagnostics.

pub mod keyvalue;
pub mod relational;

use crate::{error::DataAccessError, query::QueryOptions, record::Record, schema::Schema};
use async_trait::async_trait;

///
/// BackendKind
/// Diagnostic label only; never used for behavior switches.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display)]
pub enum BackendKind {
    #[display("key-value")]
    KeyValue,
    #[display("relational")]
    Relational,
}

///
/// QueryPage
/// One page of raw records plus the continuation cursor, when more remain.
///

#[derive(Clone, Debug)]
pub struct QueryPage {
    pub records: Vec<Record>,
    pub cursor: Option<String>,
}

///
/// BatchGetOutput
///
/// Raw result of a multi-key lookup. `unprocessed` holds exactly the keys
/// the backend could not resolve in one round; the engine surfaces them
/// without retrying.
///

#[derive(Clone, Debug, Default)]
pub struct BatchGetOutput {
    pub data: Vec<Record>,
    pub unprocessed: Vec<Record>,
}

///
/// StorageAdapter
///
/// Backend strategy consumed by collections. Records crossing this
/// boundary are already validated (writes) and not yet hydrated (reads);
/// schema transforms stay in the collection layer.
///

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Primary-key lookup, optionally projected to a subset of attributes.
    async fn get_by_id(
        &self,
        schema: &Schema,
        id: &str,
        attributes: Option<&[String]>,
    ) -> Result<Option<Record>, DataAccessError>;

    /// One page of an index query. `index_name` is already resolved by the
    /// collection; `cursor` resumes from a previous page.
    async fn query_page(
        &self,
        schema: &Schema,
        index_name: &str,
        keys: &Record,
        options: &QueryOptions,
        cursor: Option<&str>,
    ) -> Result<QueryPage, DataAccessError>;

    /// Insert one validated record; `upsert` overwrites an existing row
    /// with the same identifier instead of failing.
    async fn insert(
        &self,
        schema: &Schema,
        record: Record,
        upsert: bool,
    ) -> Result<Record, DataAccessError>;

    /// Write many validated records in one backend round (native batch
    /// write or bulk insert). Returns the stored records.
    async fn insert_many(
        &self,
        schema: &Schema,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, DataAccessError>;

    /// Apply a partial update to the rows matching `keys`.
    async fn update_by_keys(
        &self,
        schema: &Schema,
        keys: &Record,
        updates: Record,
    ) -> Result<(), DataAccessError>;

    /// Delete by primary identifiers.
    async fn delete_by_ids(&self, schema: &Schema, ids: &[String]) -> Result<(), DataAccessError>;

    /// Delete by composite key maps. Backends use native multi-key delete
    /// where the key shape allows and fall back to one filtered delete per
    /// key otherwise.
    async fn delete_by_keys(&self, schema: &Schema, keys: &[Record]) -> Result<(), DataAccessError>;

    /// Multi-key lookup with partial-failure reporting.
    async fn batch_get(
        &self,
        schema: &Schema,
        keys: &[Record],
        attributes: Option<&[String]>,
    ) -> Result<BatchGetOutput, DataAccessError>;
}
