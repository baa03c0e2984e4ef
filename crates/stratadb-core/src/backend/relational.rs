//! Relational backend: REST query protocol and its adapter.
//!
//! The client executes `select/insert/update/upsert/delete` requests built
//! through a filter chain (`eq/ilike/in/gte/lte/range/order`) and answers
//! with a `{data, error}` envelope. The adapter owns the translation:
//! camelCase attributes to snake_case columns, key facets to filters,
//! index facets to an ordered tiebroken sort, and offset/limit pagination
//! behind an opaque base64 cursor token.

use crate::{
    backend::{BackendKind, BatchGetOutput, QueryPage, StorageAdapter},
    error::{DataAccessError, RestError},
    naming::{to_db_column, to_model_field},
    query::{OrderDirection, QueryOptions, WhereClause},
    record::Record,
    schema::Schema,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use futures::future::{join_all, try_join_all};
use serde_json::{Value, json};
use std::{collections::BTreeMap, sync::Arc};

/// Page size used when a query sets no explicit limit.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Column every entity's identifier attribute maps to.
const ID_COLUMN: &str = "id";

///
/// RestVerb
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestVerb {
    Select,
    Insert,
    Update,
    Upsert,
    Delete,
}

///
/// RestFilter
/// One filter step of a builder chain.
///

#[derive(Clone, Debug, PartialEq)]
pub enum RestFilter {
    Eq(String, Value),
    Ilike(String, String),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
    Contains(String, Vec<Value>),
}

///
/// RestRequest
///
/// One fully-built REST call. Constructed through the same builder chain
/// the wire client exposes, then handed to [`RestClient::execute`].
///

#[derive(Clone, Debug)]
pub struct RestRequest {
    pub table: String,
    pub verb: RestVerb,
    pub columns: String,
    pub payload: Vec<Record>,
    pub on_conflict: Option<String>,
    pub filters: Vec<RestFilter>,
    pub order: Vec<(String, bool)>,
    pub range: Option<(usize, usize)>,
}

impl RestRequest {
    #[must_use]
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            verb: RestVerb::Select,
            columns: "*".to_string(),
            payload: Vec::new(),
            on_conflict: None,
            filters: Vec::new(),
            order: Vec::new(),
            range: None,
        }
    }

    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.verb = RestVerb::Select;
        self.columns = columns.into();
        self
    }

    #[must_use]
    pub fn insert(mut self, rows: Vec<Record>) -> Self {
        self.verb = RestVerb::Insert;
        self.payload = rows;
        self
    }

    #[must_use]
    pub fn upsert(mut self, rows: Vec<Record>, on_conflict: impl Into<String>) -> Self {
        self.verb = RestVerb::Upsert;
        self.payload = rows;
        self.on_conflict = Some(on_conflict.into());
        self
    }

    #[must_use]
    pub fn update(mut self, row: Record) -> Self {
        self.verb = RestVerb::Update;
        self.payload = vec![row];
        self
    }

    #[must_use]
    pub fn delete(mut self) -> Self {
        self.verb = RestVerb::Delete;
        self
    }

    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.filters.push(RestFilter::Eq(column.into(), value));
        self
    }

    #[must_use]
    pub fn ilike(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filters
            .push(RestFilter::Ilike(column.into(), pattern.into()));
        self
    }

    #[must_use]
    pub fn in_(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(RestFilter::In(column.into(), values));
        self
    }

    #[must_use]
    pub fn gte(mut self, column: impl Into<String>, value: Value) -> Self {
        self.filters.push(RestFilter::Gte(column.into(), value));
        self
    }

    #[must_use]
    pub fn lte(mut self, column: impl Into<String>, value: Value) -> Self {
        self.filters.push(RestFilter::Lte(column.into(), value));
        self
    }

    #[must_use]
    pub fn contains(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters
            .push(RestFilter::Contains(column.into(), values));
        self
    }

    #[must_use]
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push((column.into(), ascending));
        self
    }

    /// Inclusive row window, offset-based.
    #[must_use]
    pub fn range(mut self, start: usize, end: usize) -> Self {
        self.range = Some((start, end));
        self
    }
}

///
/// RestResponse
/// `{data, error}` envelope; exactly one side is meaningful.
///

#[derive(Clone, Debug, Default)]
pub struct RestResponse {
    pub data: Option<Vec<Record>>,
    pub error: Option<RestError>,
}

impl RestResponse {
    #[must_use]
    pub const fn data(rows: Vec<Record>) -> Self {
        Self {
            data: Some(rows),
            error: None,
        }
    }

    #[must_use]
    pub const fn error(error: RestError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }
}

///
/// RestClient
/// Protocol of the relational REST query interface.
///

#[async_trait]
pub trait RestClient: Send + Sync {
    async fn execute(&self, request: RestRequest) -> RestResponse;
}

///
/// FieldMaps
///
/// Bidirectional attribute/column name maps for one schema. The identifier
/// attribute always maps to `id`; attributes flagged backend-skipped have
/// no column at all.
///

#[derive(Clone, Debug, Default)]
pub struct FieldMaps {
    pub to_db: BTreeMap<String, String>,
    pub to_model: BTreeMap<String, String>,
}

impl FieldMaps {
    #[must_use]
    pub fn for_schema(schema: &Schema) -> Self {
        let mut maps = Self::default();
        for attribute in schema.attributes() {
            if attribute.is_db_skipped() {
                continue;
            }
            let column = if attribute.name() == schema.id_name() {
                ID_COLUMN.to_string()
            } else {
                attribute
                    .db_column_override()
                    .map_or_else(|| to_db_column(attribute.name()), ToString::to_string)
            };
            maps.to_db.insert(attribute.name().to_string(), column.clone());
            maps.to_model.insert(column, attribute.name().to_string());
        }
        maps
    }

    #[must_use]
    pub fn column(&self, attribute: &str) -> String {
        self.to_db
            .get(attribute)
            .cloned()
            .unwrap_or_else(|| to_db_column(attribute))
    }

    #[must_use]
    pub fn field(&self, column: &str) -> String {
        self.to_model
            .get(column)
            .cloned()
            .unwrap_or_else(|| to_model_field(column))
    }
}

/// Project a model-space record into column space, dropping attributes with
/// no column (backend-specific fields never leak across).
#[must_use]
pub fn to_db_record(record: &Record, maps: &FieldMaps) -> Record {
    record
        .iter()
        .filter_map(|(key, value)| {
            maps.to_db
                .get(key)
                .map(|column| (column.clone(), value.clone()))
        })
        .collect()
}

/// Lift a column-space row into model space. Nulls are dropped for
/// key-value parity (absent attribute, not null attribute), single-element
/// `[null]` arrays collapse to absent, and timestamps are normalized.
#[must_use]
pub fn from_db_record(row: &Record, maps: &FieldMaps) -> Record {
    row.iter()
        .filter_map(|(column, value)| {
            if value.is_null() {
                return None;
            }
            if let Value::Array(items) = value {
                if items.len() == 1 && items[0].is_null() {
                    return None;
                }
            }
            Some((maps.field(column), normalize_value(value)))
        })
        .collect()
}

/// The relational store returns timestamps with a `+00:00` offset and
/// variable fractional-second precision. Normalize to `Z`-suffixed
/// ISO-8601 with exactly three fractional digits so both backends agree.
#[must_use]
pub fn normalize_value(value: &Value) -> Value {
    let Some(text) = value.as_str() else {
        return value.clone();
    };
    let Some(stripped) = text.strip_suffix("+00:00") else {
        return value.clone();
    };
    if !stripped.contains('T') {
        return value.clone();
    }

    let normalized = match stripped.split_once('.') {
        Some((datetime, fraction)) => {
            let millis: String = fraction.chars().take(3).collect();
            format!("{datetime}.{millis:0<3}Z")
        }
        None => format!("{stripped}.000Z"),
    };

    Value::String(normalized)
}

/// Opaque continuation token for offset pagination.
#[must_use]
pub fn encode_cursor(offset: usize) -> String {
    BASE64.encode(json!({ "offset": offset }).to_string())
}

/// Decode a continuation token; anything unreadable restarts from zero.
#[must_use]
pub fn decode_cursor(cursor: Option<&str>) -> usize {
    let Some(cursor) = cursor else {
        return 0;
    };
    BASE64
        .decode(cursor)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .and_then(|decoded| decoded.get("offset").and_then(Value::as_u64))
        .map_or(0, |offset| usize::try_from(offset).unwrap_or(0))
}

///
/// RelationalAdapter
/// Storage strategy over a [`RestClient`].
///

#[derive(Clone)]
pub struct RelationalAdapter {
    client: Arc<dyn RestClient>,
}

impl RelationalAdapter {
    #[must_use]
    pub fn new(client: Arc<dyn RestClient>) -> Self {
        Self { client }
    }

    fn wrap(schema: &Schema, action: &str, err: RestError) -> DataAccessError {
        DataAccessError::backend(schema.entity_name(), action, err)
    }

    fn select_columns(maps: &FieldMaps, attributes: Option<&[String]>) -> String {
        attributes.map_or_else(
            || "*".to_string(),
            |attrs| {
                attrs
                    .iter()
                    .map(|attr| maps.column(attr))
                    .collect::<Vec<_>>()
                    .join(",")
            },
        )
    }

    /// Equality filters for key facets; attributes flagged case-insensitive
    /// match through `ilike` instead.
    fn apply_key_filters(
        mut request: RestRequest,
        schema: &Schema,
        maps: &FieldMaps,
        keys: &Record,
    ) -> RestRequest {
        for (name, value) in keys {
            let column = maps.column(name);
            let case_insensitive = schema
                .attribute(name)
                .is_some_and(|attr| attr.is_case_insensitive());

            request = match (case_insensitive, value.as_str()) {
                (true, Some(text)) => request.ilike(column, text.to_string()),
                _ => request.eq(column, value.clone()),
            };
        }
        request
    }

    fn apply_where(request: RestRequest, maps: &FieldMaps, filters: &[WhereClause]) -> RestRequest {
        filters.iter().fold(request, |request, clause| match clause {
            WhereClause::Eq(attr, value) => request.eq(maps.column(attr), value.clone()),
            WhereClause::Contains(attr, value) => {
                let values = match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                request.contains(maps.column(attr), values)
            }
        })
    }

    /// Keys usable for one bulk `IN` call: every key is the same single
    /// facet with a defined value.
    fn resolve_bulk_key_field(keys: &[Record]) -> Option<String> {
        let first = keys.first()?;
        if first.len() != 1 {
            return None;
        }
        let field = first.keys().next()?.clone();

        let uniform = keys.iter().all(|key| {
            key.len() == 1
                && key
                    .get(&field)
                    .is_some_and(|value| !value.is_null())
        });
        uniform.then_some(field)
    }

    async fn find_one_by_keys(
        &self,
        schema: &Schema,
        maps: &FieldMaps,
        key: &Record,
        attributes: Option<&[String]>,
    ) -> Result<Option<Record>, RestError> {
        let request = Self::apply_key_filters(
            RestRequest::from(schema.table_name())
                .select(Self::select_columns(maps, attributes))
                .range(0, 0),
            schema,
            maps,
            key,
        );

        let response = self.client.execute(request).await;
        if let Some(error) = response.error {
            return Err(error);
        }
        Ok(response
            .data
            .unwrap_or_default()
            .first()
            .map(|row| from_db_record(row, maps)))
    }
}

#[async_trait]
impl StorageAdapter for RelationalAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn get_by_id(
        &self,
        schema: &Schema,
        id: &str,
        attributes: Option<&[String]>,
    ) -> Result<Option<Record>, DataAccessError> {
        let maps = FieldMaps::for_schema(schema);
        let mut key = Record::new();
        key.insert(schema.id_name().to_string(), Value::String(id.to_string()));

        self.find_one_by_keys(schema, &maps, &key, attributes)
            .await
            .map_err(|err| Self::wrap(schema, "find by id", err))
    }

    async fn query_page(
        &self,
        schema: &Schema,
        index_name: &str,
        keys: &Record,
        options: &QueryOptions,
        cursor: Option<&str>,
    ) -> Result<QueryPage, DataAccessError> {
        let maps = FieldMaps::for_schema(schema);
        let index = schema.index(index_name).ok_or_else(|| {
            DataAccessError::query(
                schema.entity_name(),
                "query",
                format!("query proxy [{index_name}] not found"),
            )
        })?;

        let ascending = options.order == OrderDirection::Asc;
        let mut request = RestRequest::from(schema.table_name())
            .select(Self::select_columns(&maps, options.attributes.as_deref()));

        // Order facet-by-facet in index declaration order, with the
        // identifier as a deterministic tiebreaker unless already ordered.
        let mut order_columns = Vec::new();
        for facet in index.sort_facets() {
            order_columns.push(maps.column(facet));
        }
        if !order_columns.iter().any(|column| column == ID_COLUMN) {
            order_columns.push(ID_COLUMN.to_string());
        }
        for column in order_columns {
            request = request.order(column, ascending);
        }

        request = Self::apply_key_filters(request, schema, &maps, keys);
        if let Some(between) = &options.between {
            let column = maps.column(&between.attribute);
            request = request
                .gte(column.clone(), between.start.clone())
                .lte(column, between.end.clone());
        }
        request = Self::apply_where(request, &maps, &options.filters);

        let offset = decode_cursor(cursor);
        let page_size = options.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        request = request.range(offset, offset + page_size - 1);

        let response = self.client.execute(request).await;
        if let Some(error) = response.error {
            return Err(Self::wrap(schema, "query", error));
        }

        let rows = response.data.unwrap_or_default();
        let records: Vec<Record> = rows.iter().map(|row| from_db_record(row, &maps)).collect();
        let cursor = (records.len() == page_size).then(|| encode_cursor(offset + page_size));

        Ok(QueryPage { records, cursor })
    }

    async fn insert(
        &self,
        schema: &Schema,
        record: Record,
        upsert: bool,
    ) -> Result<Record, DataAccessError> {
        let maps = FieldMaps::for_schema(schema);
        let payload = to_db_record(&record, &maps);

        let request = if upsert {
            RestRequest::from(schema.table_name()).upsert(vec![payload], ID_COLUMN)
        } else {
            RestRequest::from(schema.table_name()).insert(vec![payload])
        };

        let response = self.client.execute(request).await;
        if let Some(error) = response.error {
            return Err(Self::wrap(schema, "create", error));
        }

        Ok(response
            .data
            .unwrap_or_default()
            .first()
            .map_or(record, |row| from_db_record(row, &maps)))
    }

    async fn insert_many(
        &self,
        schema: &Schema,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, DataAccessError> {
        let maps = FieldMaps::for_schema(schema);
        let payload: Vec<Record> = records.iter().map(|r| to_db_record(r, &maps)).collect();

        let response = self
            .client
            .execute(RestRequest::from(schema.table_name()).insert(payload))
            .await;
        if let Some(error) = response.error {
            return Err(Self::wrap(schema, "create many", error));
        }

        let rows = response.data.unwrap_or_default();
        if rows.is_empty() {
            return Ok(records);
        }
        Ok(rows.iter().map(|row| from_db_record(row, &maps)).collect())
    }

    async fn update_by_keys(
        &self,
        schema: &Schema,
        keys: &Record,
        updates: Record,
    ) -> Result<(), DataAccessError> {
        let maps = FieldMaps::for_schema(schema);
        let request = Self::apply_key_filters(
            RestRequest::from(schema.table_name()).update(to_db_record(&updates, &maps)),
            schema,
            &maps,
            keys,
        );

        let response = self.client.execute(request).await;
        if let Some(error) = response.error {
            return Err(Self::wrap(schema, "update", error));
        }
        Ok(())
    }

    async fn delete_by_ids(&self, schema: &Schema, ids: &[String]) -> Result<(), DataAccessError> {
        let values = ids
            .iter()
            .map(|id| Value::String(id.clone()))
            .collect::<Vec<_>>();
        let request = RestRequest::from(schema.table_name())
            .delete()
            .in_(ID_COLUMN, values);

        let response = self.client.execute(request).await;
        if let Some(error) = response.error {
            return Err(Self::wrap(schema, "remove by ids", error));
        }
        Ok(())
    }

    async fn delete_by_keys(
        &self,
        schema: &Schema,
        keys: &[Record],
    ) -> Result<(), DataAccessError> {
        let maps = FieldMaps::for_schema(schema);

        // Single-facet keys collapse into one IN delete; composite keys
        // fall back to one filtered delete per key.
        if let Some(field) = Self::resolve_bulk_key_field(keys) {
            let column = maps.column(&field);
            let values: Vec<Value> = keys.iter().filter_map(|key| key.get(&field).cloned()).collect();
            let request = RestRequest::from(schema.table_name())
                .delete()
                .in_(column, values);

            let response = self.client.execute(request).await;
            return match response.error {
                Some(error) => Err(Self::wrap(schema, "remove by index keys", error)),
                None => Ok(()),
            };
        }

        try_join_all(keys.iter().map(|key| {
            let request = Self::apply_key_filters(
                RestRequest::from(schema.table_name()).delete(),
                schema,
                &maps,
                key,
            );
            async move {
                let response = self.client.execute(request).await;
                match response.error {
                    Some(error) => Err(Self::wrap(schema, "remove by index keys", error)),
                    None => Ok(()),
                }
            }
        }))
        .await?;

        Ok(())
    }

    async fn batch_get(
        &self,
        schema: &Schema,
        keys: &[Record],
        attributes: Option<&[String]>,
    ) -> Result<BatchGetOutput, DataAccessError> {
        let maps = FieldMaps::for_schema(schema);

        if let Some(field) = Self::resolve_bulk_key_field(keys) {
            let column = maps.column(&field);
            let values: Vec<Value> = keys.iter().filter_map(|key| key.get(&field).cloned()).collect();
            let request = RestRequest::from(schema.table_name())
                .select(Self::select_columns(&maps, attributes))
                .in_(column, values);

            let response = self.client.execute(request).await;
            match response.error {
                None => {
                    let rows = response.data.unwrap_or_default();
                    return Ok(BatchGetOutput {
                        data: rows.iter().map(|row| from_db_record(row, &maps)).collect(),
                        unprocessed: Vec::new(),
                    });
                }
                Some(error) if error.is_invalid_input() => {
                    // One malformed key poisons the whole bulk call; fall
                    // back to per-key lookups that absorb it.
                }
                Some(error) => {
                    return Err(Self::wrap(schema, "batch get by keys", error));
                }
            }
        }

        let maps_ref = &maps;
        let lookups = join_all(keys.iter().map(|key| async move {
            match self.find_one_by_keys(schema, maps_ref, key, attributes).await {
                Ok(record) => Ok(record),
                Err(error) if error.is_invalid_input() => Ok(None),
                Err(error) => Err(error),
            }
        }))
        .await;

        let mut data = Vec::new();
        for lookup in lookups {
            match lookup {
                Ok(Some(record)) => data.push(record),
                Ok(None) => {}
                Err(error) => return Err(Self::wrap(schema, "batch get by keys", error)),
            }
        }

        Ok(BatchGetOutput {
            data,
            unprocessed: Vec::new(),
        })
    }
}
