//! Per-entity façade.
//!
//! A [`Collection`] wires one schema to the injected storage adapter and
//! exposes the whole data-access surface: CRUD, index queries with
//! automatic pagination, generated accessors, batch operations, and
//! relationship sync. Collections are owned by the registry and reach
//! sibling collections through it for reference traversal.

use crate::{
    accessor::{Accessor, AccessorKind, build_accessors},
    backend::{BackendKind, StorageAdapter},
    error::{DataAccessError, ValidationError},
    guards::guard_id_str,
    model::{Model, Related},
    naming::entity_name_to_id_name,
    query::{Paged, QueryOptions},
    record::{Record, hydrate, prepare_for_write},
    registry::RegistryInner,
    schema::{ALL_INDEX, PRIMARY_INDEX, Schema},
};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

///
/// CreateOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct CreateOptions {
    /// Overwrite an existing row with the same identifier instead of
    /// failing.
    pub upsert: bool,
}

///
/// ErrorItem
/// One batch-create input that failed validation, returned verbatim.
///

#[derive(Clone, Debug)]
pub struct ErrorItem {
    pub item: Record,
    pub error: ValidationError,
}

///
/// CreateManyResult
///
/// Partial-success envelope of `create_many`. The two lists always sum to
/// the input length.
///

#[derive(Clone, Debug, Default)]
pub struct CreateManyResult {
    pub created_items: Vec<Model>,
    pub error_items: Vec<ErrorItem>,
}

///
/// BatchGetResult
/// `{data, unprocessed}` envelope of `batch_get_by_keys`. Unprocessed keys
/// are surfaced, never retried.
///

#[derive(Clone, Debug, Default)]
pub struct BatchGetResult {
    pub data: Vec<Model>,
    pub unprocessed: Vec<Record>,
}

///
/// AccessorResult
/// Result of dispatching a generated accessor by name.
///

#[derive(Clone, Debug)]
pub enum AccessorResult {
    Many(Vec<Model>),
    One(Option<Model>),
}

impl AccessorResult {
    #[must_use]
    pub fn into_many(self) -> Vec<Model> {
        match self {
            Self::Many(models) => models,
            Self::One(model) => model.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn into_one(self) -> Option<Model> {
        match self {
            Self::One(model) => model,
            Self::Many(models) => models.into_iter().next(),
        }
    }
}

///
/// Collection
///

pub struct Collection {
    schema: Arc<Schema>,
    adapter: Arc<dyn StorageAdapter>,
    registry: Weak<RegistryInner>,
    self_ref: Weak<Self>,
    accessors: Vec<Accessor>,
}

impl Collection {
    pub(crate) fn new(
        schema: Arc<Schema>,
        adapter: Arc<dyn StorageAdapter>,
        registry: Weak<RegistryInner>,
        self_ref: Weak<Self>,
    ) -> Self {
        let accessors = build_accessors(&schema);
        Self {
            schema,
            adapter,
            registry,
            self_ref,
            accessors,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.schema.entity_name()
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.adapter.kind()
    }

    /// Generated accessor descriptors, introspectable by name.
    #[must_use]
    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    fn handle(&self) -> Result<Arc<Self>, DataAccessError> {
        self.self_ref.upgrade().ok_or_else(|| {
            DataAccessError::query(
                self.entity_name(),
                "resolve collection",
                "collection handle dropped",
            )
        })
    }

    /// Reach a sibling collection through the registry.
    pub fn sibling(&self, entity_name: &str) -> Result<Arc<Self>, DataAccessError> {
        let registry = self.registry.upgrade().ok_or_else(|| {
            DataAccessError::query(
                self.entity_name(),
                "resolve collection",
                "entity registry dropped",
            )
        })?;
        registry.collection(entity_name).ok_or_else(|| {
            DataAccessError::query(
                self.entity_name(),
                "resolve collection",
                format!("collection not found for [{entity_name}]"),
            )
        })
    }

    /// Wrap one raw record: hydrate through the schema's read pipeline and
    /// hand out a model bound to this collection.
    pub(crate) fn wrap(&self, record: Record) -> Result<Model, DataAccessError> {
        if record.is_empty() {
            warn!(
                entity = self.entity_name(),
                "failed to create instance: record is empty"
            );
        }
        Ok(Model::new(
            self.handle()?,
            hydrate(&self.schema, record),
        ))
    }

    fn wrap_all(&self, records: Vec<Record>) -> Result<Vec<Model>, DataAccessError> {
        records
            .into_iter()
            .filter(|record| !record.is_empty())
            .map(|record| self.wrap(record))
            .collect()
    }

    fn seed_parent(&self, created: &[Model], parent: &Model) {
        let foreign_key = entity_name_to_id_name(parent.entity_name());
        for child in created {
            let matches = child
                .get(&foreign_key)
                .and_then(Value::as_str)
                .is_some_and(|value| value == parent.id());
            if matches {
                child.cache_reference(parent.entity_name(), Related::One(parent.clone()));
            } else {
                warn!(
                    entity = self.entity_name(),
                    parent = parent.entity_name(),
                    "failed to associate parent with child: parent is invalid"
                );
            }
        }
    }

    /// Resolve the index a query should run against, and validate an
    /// explicitly requested one.
    fn resolve_index(
        &self,
        keys: &Record,
        options: &QueryOptions,
    ) -> Result<String, DataAccessError> {
        if let Some(index_name) = &options.index {
            if self.schema.index(index_name).is_none() {
                error!(
                    entity = self.entity_name(),
                    index = index_name.as_str(),
                    "failed to query: query proxy not found"
                );
                return Err(DataAccessError::query(
                    self.entity_name(),
                    "query",
                    format!("query proxy [{index_name}] not found"),
                ));
            }
            return Ok(index_name.clone());
        }

        if keys.is_empty() {
            return Err(DataAccessError::query(
                self.entity_name(),
                "query",
                "keys are required",
            ));
        }

        let key_names: Vec<&str> = keys.keys().map(String::as_str).collect();
        Ok(self.schema.find_index_name_by_keys(&key_names))
    }

    /// Shared query loop: one page when a limit is set (or paging is
    /// explicitly off), otherwise every page until the cursor runs dry.
    /// Page N+1 is requested only after page N's cursor is known.
    async fn query_by_index_keys(
        &self,
        keys: &Record,
        options: &QueryOptions,
    ) -> Result<(Vec<Model>, Option<String>), DataAccessError> {
        let index_name = self.resolve_index(keys, options)?;
        let fetch_all = options.should_fetch_all_pages();

        let mut records = Vec::new();
        let mut cursor = options.cursor.clone();

        loop {
            let page = self
                .adapter
                .query_page(&self.schema, &index_name, keys, options, cursor.as_deref())
                .await?;

            records.extend(page.records);
            cursor = page.cursor;

            if !fetch_all || cursor.is_none() {
                break;
            }
        }

        Ok((self.wrap_all(records)?, cursor))
    }

    /// Create one entity and persist it directly; no `save()` needed
    /// afterwards.
    pub async fn create(&self, item: Record) -> Result<Model, DataAccessError> {
        self.create_with_options(item, CreateOptions::default())
            .await
    }

    pub async fn create_with_options(
        &self,
        item: Record,
        options: CreateOptions,
    ) -> Result<Model, DataAccessError> {
        if item.is_empty() {
            error!(entity = self.entity_name(), "failed to create: data is required");
            return Err(DataAccessError::query(
                self.entity_name(),
                "create",
                "data is required",
            ));
        }

        let prepared = prepare_for_write(&self.schema, item)?;
        let stored = self
            .adapter
            .insert(&self.schema, prepared, options.upsert)
            .await?;
        self.wrap(stored)
    }

    /// Create many entities in one backend round. Invalid items are routed
    /// to `error_items` with their original input; valid items are written
    /// and returned as models. With a `parent`, each created child whose
    /// foreign key matches is seeded with the parent reference.
    pub async fn create_many(
        &self,
        items: Vec<Record>,
        parent: Option<&Model>,
    ) -> Result<CreateManyResult, DataAccessError> {
        if items.is_empty() {
            error!(
                entity = self.entity_name(),
                "failed to create many: items must be a non-empty array"
            );
            return Err(DataAccessError::query(
                self.entity_name(),
                "create many",
                "items must be a non-empty array",
            ));
        }

        let mut validated = Vec::new();
        let mut error_items = Vec::new();
        for item in items {
            match prepare_for_write(&self.schema, item.clone()) {
                Ok(prepared) => validated.push(prepared),
                Err(validation) => error_items.push(ErrorItem {
                    item,
                    error: validation,
                }),
            }
        }

        let created_items = if validated.is_empty() {
            Vec::new()
        } else {
            let stored = self.adapter.insert_many(&self.schema, validated).await?;
            self.wrap_all(stored)?
        };

        if let Some(parent) = parent {
            self.seed_parent(&created_items, parent);
        }

        info!(
            entity = self.entity_name(),
            created = created_items.len(),
            failed = error_items.len(),
            "created items"
        );

        Ok(CreateManyResult {
            created_items,
            error_items,
        })
    }

    /// Primary-key lookup.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Model>, DataAccessError> {
        guard_id_str(self.schema.id_name(), id, self.entity_name())?;

        let record = self.adapter.get_by_id(&self.schema, id, None).await?;
        record.map(|record| self.wrap(record)).transpose()
    }

    /// Existence probe projected to the identifier attribute only.
    pub async fn exists_by_id(&self, id: &str) -> Result<bool, DataAccessError> {
        guard_id_str(self.schema.id_name(), id, self.entity_name())?;

        let projection = vec![self.schema.id_name().to_string()];
        let record = self
            .adapter
            .get_by_id(&self.schema, id, Some(&projection))
            .await?;
        Ok(record.is_some())
    }

    /// List every entity through the `all` index (or the primary index
    /// when none is declared).
    pub async fn all(
        &self,
        sort_keys: Record,
        options: QueryOptions,
    ) -> Result<Vec<Model>, DataAccessError> {
        let options = options.index(self.all_index_name());
        let (models, _) = self.query_by_index_keys(&sort_keys, &options).await?;
        Ok(models)
    }

    /// First entity of the `all` index scope.
    pub async fn find_by_all(
        &self,
        sort_keys: Record,
        options: QueryOptions,
    ) -> Result<Option<Model>, DataAccessError> {
        let options = options
            .index(self.all_index_name())
            .limit(1)
            .fetch_all_pages(false);
        let (models, _) = self.query_by_index_keys(&sort_keys, &options).await?;
        Ok(models.into_iter().next())
    }

    fn all_index_name(&self) -> &str {
        if self.schema.all_index().is_some() {
            ALL_INDEX
        } else {
            PRIMARY_INDEX
        }
    }

    /// First entity matching the index keys, or nothing.
    pub async fn find_by_index_keys(
        &self,
        keys: &Record,
        options: QueryOptions,
    ) -> Result<Option<Model>, DataAccessError> {
        let options = options.limit(1).fetch_all_pages(false);
        let (models, _) = self.query_by_index_keys(keys, &options).await?;
        Ok(models.into_iter().next())
    }

    /// Every entity matching the index keys, paginated transparently.
    pub async fn all_by_index_keys(
        &self,
        keys: &Record,
        options: QueryOptions,
    ) -> Result<Vec<Model>, DataAccessError> {
        let (models, _) = self.query_by_index_keys(keys, &options).await?;
        Ok(models)
    }

    /// Cursor form: one batch of results plus the continuation cursor to
    /// resume from.
    pub async fn all_by_index_keys_paged(
        &self,
        keys: &Record,
        options: QueryOptions,
    ) -> Result<Paged<Model>, DataAccessError> {
        let (models, cursor) = self.query_by_index_keys(keys, &options).await?;
        Ok(Paged::new(models, cursor))
    }

    /// Dispatch a generated accessor by name. Facet arguments are
    /// positional in index declaration order; each is validated before the
    /// query runs.
    pub async fn invoke_accessor(
        &self,
        name: &str,
        args: &[Value],
        options: QueryOptions,
    ) -> Result<AccessorResult, DataAccessError> {
        let accessor = self
            .accessors
            .iter()
            .find(|accessor| accessor.name == name)
            .cloned()
            .ok_or_else(|| {
                DataAccessError::query(
                    self.entity_name(),
                    "invoke accessor",
                    format!("accessor [{name}] not found"),
                )
            })?;

        let keys = accessor.bind_keys(&self.schema, args)?;
        let options = options.index(accessor.index_name.clone());

        match accessor.kind {
            AccessorKind::All => Ok(AccessorResult::Many(
                self.all_by_index_keys(&keys, options).await?,
            )),
            AccessorKind::Find => Ok(AccessorResult::One(
                self.find_by_index_keys(&keys, options).await?,
            )),
        }
    }

    /// Multi-key lookup. Keys the backend could not resolve in one round
    /// come back under `unprocessed`; retrying them is the caller's call.
    pub async fn batch_get_by_keys(
        &self,
        keys: &[Record],
        options: QueryOptions,
    ) -> Result<BatchGetResult, DataAccessError> {
        if keys.is_empty() {
            return Err(DataAccessError::query(
                self.entity_name(),
                "batch get by keys",
                "keys must be a non-empty array",
            ));
        }

        let output = self
            .adapter
            .batch_get(&self.schema, keys, options.attributes.as_deref())
            .await?;

        Ok(BatchGetResult {
            data: self.wrap_all(output.data)?,
            unprocessed: output.unprocessed,
        })
    }

    /// Batch delete by identifiers. Does not cascade; dependent records
    /// are untouched.
    pub async fn remove_by_ids(&self, ids: &[String]) -> Result<(), DataAccessError> {
        if ids.is_empty() {
            error!(
                entity = self.entity_name(),
                "failed to remove: ids must be a non-empty array"
            );
            return Err(DataAccessError::query(
                self.entity_name(),
                "remove by ids",
                "ids must be a non-empty array",
            ));
        }

        info!(entity = self.entity_name(), count = ids.len(), "removing items");
        self.adapter.delete_by_ids(&self.schema, ids).await
    }

    /// Batch delete by composite key maps.
    pub async fn remove_by_index_keys(&self, keys: &[Record]) -> Result<(), DataAccessError> {
        if keys.is_empty() {
            return Err(DataAccessError::query(
                self.entity_name(),
                "remove by index keys",
                "keys must be a non-empty array",
            ));
        }
        for key in keys {
            if key.is_empty() {
                return Err(DataAccessError::query(
                    self.entity_name(),
                    "remove by index keys",
                    "key must be a non-empty object",
                ));
            }
        }

        self.adapter.delete_by_keys(&self.schema, keys).await?;
        info!(entity = self.entity_name(), count = keys.len(), "removed items");
        Ok(())
    }

    /// Apply a partial update to the rows matching `keys`.
    pub async fn update_by_keys(
        &self,
        keys: &Record,
        updates: Record,
    ) -> Result<(), DataAccessError> {
        if keys.is_empty() || updates.is_empty() {
            return Err(DataAccessError::query(
                self.entity_name(),
                "update",
                "keys and updates are required",
            ));
        }

        self.adapter.update_by_keys(&self.schema, keys, updates).await
    }

    /// Persist a set of models wholesale, re-running their watchers. Used
    /// for bulk status flips where per-model `save()` calls would be
    /// wasteful.
    pub async fn save_many(&self, models: &mut [Model]) -> Result<(), DataAccessError> {
        if models.is_empty() {
            return Err(DataAccessError::query(
                self.entity_name(),
                "save many",
                "items must be a non-empty array",
            ));
        }

        for model in models.iter_mut() {
            model.mark_all_dirty();
            model.save().await?;
        }
        Ok(())
    }

    /// Primary-key delete used by `Model::remove` after its cascade.
    pub(crate) async fn delete_record(&self, id: &str) -> Result<(), DataAccessError> {
        self.adapter
            .delete_by_ids(&self.schema, &[id.to_string()])
            .await
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("entity", &self.entity_name())
            .field("backend", &self.adapter.kind())
            .field("accessors", &self.accessors.len())
            .finish_non_exhaustive()
    }
}
