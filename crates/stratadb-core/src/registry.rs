//! Entity registry.
//!
//! The registry owns one collection per registered schema, all sharing the
//! injected storage adapter. Models and collections reach sibling
//! collections through it when traversing references or syncing junction
//! rows.

use crate::{
    backend::StorageAdapter,
    collection::Collection,
    error::DataAccessError,
    schema::Schema,
};
use std::{collections::HashMap, sync::Arc};

///
/// RegistryInner
/// Shared collection table; collections hold a weak handle to it.
///

pub(crate) struct RegistryInner {
    collections: HashMap<String, Arc<Collection>>,
}

impl RegistryInner {
    pub(crate) fn collection(&self, entity_name: &str) -> Option<Arc<Collection>> {
        self.collections.get(entity_name).cloned()
    }
}

///
/// EntityRegistry
///
/// Composition root applications hold on to. One registry per backend
/// handle; the storage strategy is chosen here, once, for every
/// collection.
///

#[derive(Clone)]
pub struct EntityRegistry {
    inner: Arc<RegistryInner>,
}

impl EntityRegistry {
    #[must_use]
    pub fn builder(adapter: Arc<dyn StorageAdapter>) -> EntityRegistryBuilder {
        EntityRegistryBuilder {
            adapter,
            schemas: Vec::new(),
        }
    }

    pub fn collection(&self, entity_name: &str) -> Result<Arc<Collection>, DataAccessError> {
        self.inner.collection(entity_name).ok_or_else(|| {
            DataAccessError::query(
                entity_name,
                "resolve collection",
                format!("collection not found for [{entity_name}]"),
            )
        })
    }

    /// Registered entity names, sorted for deterministic iteration.
    #[must_use]
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.collections.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.entity_names())
            .finish()
    }
}

///
/// EntityRegistryBuilder
///

pub struct EntityRegistryBuilder {
    adapter: Arc<dyn StorageAdapter>,
    schemas: Vec<Schema>,
}

impl EntityRegistryBuilder {
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    #[must_use]
    pub fn build(self) -> EntityRegistry {
        let adapter = self.adapter;
        let schemas = self.schemas;

        let inner = Arc::new_cyclic(|registry_weak| {
            let collections = schemas
                .into_iter()
                .map(|schema| {
                    let schema = Arc::new(schema);
                    let entity_name = schema.entity_name().to_string();
                    let collection = Arc::new_cyclic(|self_weak| {
                        Collection::new(
                            schema.clone(),
                            adapter.clone(),
                            registry_weak.clone(),
                            self_weak.clone(),
                        )
                    });
                    (entity_name, collection)
                })
                .collect();

            RegistryInner { collections }
        });

        EntityRegistry { inner }
    }
}
