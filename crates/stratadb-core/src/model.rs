//! Single-record wrapper.
//!
//! A [`Model`] is instantiated only by its collection, wraps one hydrated
//! record, tracks dirty attributes for `save()`, and resolves declared
//! references through the entity registry, caching what it fetches.

use crate::{
    collection::Collection,
    error::{DataAccessError, ValidationError},
    guards::{guard_id, guard_typed},
    naming::entity_name_to_id_name,
    record::{Record, apply_update_watchers},
    schema::{ReferenceKind, Schema},
};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};
use tracing::info;

///
/// Related
/// Resolved value of one declared reference.
///

#[derive(Clone, Debug, Default)]
pub enum Related {
    #[default]
    None,
    One(Model),
    Many(Vec<Model>),
}

impl Related {
    /// Flatten into a list of models for cascade traversal.
    #[must_use]
    pub fn into_models(self) -> Vec<Model> {
        match self {
            Self::None => Vec::new(),
            Self::One(model) => vec![model],
            Self::Many(models) => models,
        }
    }
}

///
/// Model
///

#[derive(Clone)]
pub struct Model {
    collection: Arc<Collection>,
    record: Record,
    updates: Record,
    reference_cache: Arc<Mutex<HashMap<String, Related>>>,
}

impl Model {
    pub(crate) fn new(collection: Arc<Collection>, record: Record) -> Self {
        Self {
            collection,
            record,
            updates: Record::new(),
            reference_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        self.collection.schema()
    }

    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.schema().entity_name()
    }

    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// The generated identifier. Records wrapped by a collection always
    /// carry one; an empty string only ever signals a corrupted row.
    #[must_use]
    pub fn id(&self) -> &str {
        self.record
            .get(self.schema().id_name())
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record.get(name).filter(|value| !value.is_null())
    }

    #[must_use]
    pub fn created_at(&self) -> Option<&str> {
        self.get("createdAt").and_then(Value::as_str)
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<&str> {
        self.get("updatedAt").and_then(Value::as_str)
    }

    #[must_use]
    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }

    /// Set one attribute, fluent. Validates against the attribute type
    /// (identifier format for reference attributes) and rejects read-only
    /// attributes; the change is persisted on the next `save()`.
    pub fn set(&mut self, name: &str, value: Value) -> Result<&mut Self, ValidationError> {
        let entity = self.entity_name().to_string();
        let Some(attribute) = self.schema().attribute(name) else {
            return Err(ValidationError::attribute(
                &entity,
                name,
                format!("property {name} does not exist on entity {entity}"),
            ));
        };

        if attribute.is_read_only() {
            return Err(ValidationError::attribute(
                entity,
                name,
                format!("the property {name} is read-only and cannot be updated"),
            ));
        }

        let nullable = !attribute.is_required();
        let candidate = Some(&value).filter(|v| !v.is_null());
        if self.schema().is_reference_attribute(name) {
            guard_id(name, candidate, &entity, nullable)?;
        } else {
            guard_typed(name, candidate, attribute.attribute_type(), &entity, nullable)?;
        }

        self.record.insert(name.to_string(), value.clone());
        self.updates.insert(name.to_string(), value);
        Ok(self)
    }

    /// Persist pending updates. Re-runs watcher-bound transforms, bumps
    /// `updatedAt` strictly above its previous value, and writes through
    /// the collection's update path. No-op when nothing is dirty.
    pub async fn save(&mut self) -> Result<&mut Self, DataAccessError> {
        if self.updates.is_empty() {
            return Ok(self);
        }

        info!(
            entity = self.entity_name(),
            id = self.id(),
            "saving entity"
        );

        let (record, updates) =
            apply_update_watchers(self.schema(), self.record.clone(), self.updates.clone());

        let mut keys = Record::new();
        keys.insert(
            self.schema().id_name().to_string(),
            Value::String(self.id().to_string()),
        );
        self.collection.update_by_keys(&keys, updates).await?;

        self.record = record;
        self.updates.clear();
        self.clear_reference_cache();
        Ok(self)
    }

    /// Remove this record. Entities with declared dependent references
    /// cascade first: junction rows and dependents are removed before the
    /// parent row.
    pub async fn remove(&self) -> Result<(), DataAccessError> {
        self.collection.remove_model(self).await
    }

    /// Resolve a declared reference to `target`, consulting the cache
    /// first. Traversals tolerate dangling rows: a junction row whose far
    /// side is missing simply contributes nothing.
    pub async fn related(&self, target: &str) -> Result<Related, DataAccessError> {
        if let Some(cached) = self.cached_reference(target) {
            return Ok(cached);
        }

        let Some(reference) = self
            .schema()
            .references()
            .iter()
            .find(|r| r.target() == target)
            .cloned()
        else {
            return Err(DataAccessError::query(
                self.entity_name(),
                "fetch reference",
                format!("no reference to [{target}] is declared"),
            ));
        };

        let target_collection = self.collection.sibling(target)?;
        let own_fk = entity_name_to_id_name(self.entity_name());

        let related = match reference.kind() {
            ReferenceKind::BelongsTo => {
                let foreign_key = entity_name_to_id_name(target);
                match self.get(&foreign_key).and_then(Value::as_str) {
                    Some(id) => target_collection
                        .find_by_id(id)
                        .await?
                        .map_or(Related::None, Related::One),
                    None => Related::None,
                }
            }
            ReferenceKind::HasOne => {
                let mut keys = Record::new();
                keys.insert(own_fk, Value::String(self.id().to_string()));
                target_collection
                    .find_by_index_keys(&keys, Default::default())
                    .await?
                    .map_or(Related::None, Related::One)
            }
            ReferenceKind::HasMany => {
                let mut keys = Record::new();
                keys.insert(own_fk, Value::String(self.id().to_string()));
                Related::Many(
                    target_collection
                        .all_by_index_keys(&keys, Default::default())
                        .await?,
                )
            }
            ReferenceKind::HasManyThrough => Related::Many(
                self.collection
                    .related_through(self.id(), reference.target())
                    .await?,
            ),
        };

        self.cache_reference(target, related.clone());
        Ok(related)
    }

    /// Export the schema-declared attributes as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut json = serde_json::Map::new();
        for attribute in self.schema().attributes() {
            if let Some(value) = self.record.get(attribute.name()) {
                if !value.is_null() {
                    json.insert(attribute.name().to_string(), value.clone());
                }
            }
        }
        Value::Object(json)
    }

    /// Stage the whole record as dirty so the next `save()` rewrites it.
    pub(crate) fn mark_all_dirty(&mut self) {
        self.updates = self.record.clone();
    }

    #[must_use]
    pub(crate) fn cached_reference(&self, target: &str) -> Option<Related> {
        self.reference_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(target).cloned())
    }

    pub(crate) fn cache_reference(&self, target: &str, related: Related) {
        if let Ok(mut cache) = self.reference_cache.lock() {
            cache.insert(target.to_string(), related);
        }
    }

    pub(crate) fn clear_reference_cache(&self) {
        if let Ok(mut cache) = self.reference_cache.lock() {
            cache.clear();
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entity", &self.entity_name())
            .field("id", &self.id())
            .field("dirty", &self.updates.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
