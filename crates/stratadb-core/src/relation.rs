//! Relationship sync and cascading delete.
//!
//! Junction rows carry no independent lifecycle: `set_related` reconciles
//! them against a requested target list via symmetric difference, and the
//! cascade removes them before their parent row. The two cascade phases
//! are sequential awaited steps, deliberately not atomic; a crash between
//! them leaves junction rows pointing at a still-existing parent, and the
//! read path tolerates rows whose far side is gone.

use crate::{
    collection::{Collection, ErrorItem},
    error::{DataAccessError, ValidationError},
    guards::guard_id_str,
    model::Model,
    naming::{decapitalize, entity_name_to_id_name},
    query::QueryOptions,
    record::Record,
    schema::{Reference, ReferenceKind},
};
use serde_json::Value;
use std::{future::Future, pin::Pin};
use tracing::{error, info};

///
/// ResolvedUpdates
/// Symmetric difference between the current and requested target sets.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvedUpdates {
    pub to_delete: Vec<String>,
    pub to_create: Vec<String>,
}

/// Compute which junction rows to remove and which to add so the stored
/// set becomes exactly `wanted`. Order-stable so writes are deterministic.
#[must_use]
pub fn resolve_updates(existing: &[String], wanted: &[String]) -> ResolvedUpdates {
    let to_delete = existing
        .iter()
        .filter(|id| !wanted.contains(id))
        .cloned()
        .collect();
    let to_create = wanted
        .iter()
        .filter(|id| !existing.contains(id))
        .cloned()
        .collect();

    ResolvedUpdates {
        to_delete,
        to_create,
    }
}

///
/// SetRelatedResult
///

#[derive(Clone, Debug, Default)]
pub struct SetRelatedResult {
    pub created_items: Vec<Model>,
    pub error_items: Vec<ErrorItem>,
    pub removed_count: usize,
}

/// Key roles inside a junction entity for one through-reference.
struct JunctionKeys {
    self_fk: String,
    target_fk: String,
    owner_fk: Option<String>,
}

impl Collection {
    fn through_reference(&self, target: &str) -> Result<Reference, DataAccessError> {
        self.schema()
            .reference_to(ReferenceKind::HasManyThrough, target)
            .cloned()
            .ok_or_else(|| {
                DataAccessError::query(
                    self.entity_name(),
                    "set related",
                    format!("no junction reference to [{target}] is declared"),
                )
            })
    }

    /// Derive the junction's key roles: this entity's foreign key, the
    /// target's foreign key, and the denormalized owner key (the junction's
    /// remaining belongs-to reference, when one is declared).
    fn junction_keys(&self, junction: &Collection, target: &str) -> JunctionKeys {
        let self_fk = entity_name_to_id_name(self.entity_name());
        let target_fk = entity_name_to_id_name(target);

        let owner_fk = junction
            .schema()
            .references_by_kind(ReferenceKind::BelongsTo)
            .map(Reference::target)
            .find(|owner| *owner != self.entity_name() && *owner != target)
            .map(entity_name_to_id_name);

        JunctionKeys {
            self_fk,
            target_fk,
            owner_fk,
        }
    }

    /// Replace the junction-backed target set of `entity` with
    /// `target_ids`. Only the difference is written: rows for additions
    /// are created, rows for removals deleted, and a second call with the
    /// same targets performs zero writes.
    pub async fn set_related(
        &self,
        owner_id: &str,
        entity: &Model,
        target: &str,
        target_ids: &[String],
    ) -> Result<SetRelatedResult, DataAccessError> {
        let reference = self.through_reference(target)?;
        let junction_name = reference.junction().unwrap_or_default().to_string();
        let junction = self.sibling(&junction_name)?;
        let keys = self.junction_keys(&junction, target);

        if entity.id().is_empty() {
            return Err(ValidationError::new(
                self.entity_name(),
                format!("{} is required", decapitalize(self.entity_name())),
            )
            .into());
        }
        if let Some(owner_fk) = &keys.owner_fk {
            guard_id_str(owner_fk, owner_id, self.entity_name())?;
        }
        for target_id in target_ids {
            guard_id_str(&keys.target_fk, target_id, self.entity_name())?;
        }

        let mut existing_keys = Record::new();
        existing_keys.insert(
            keys.self_fk.clone(),
            Value::String(entity.id().to_string()),
        );
        let existing = junction
            .all_by_index_keys(&existing_keys, QueryOptions::new())
            .await?;
        let existing_ids: Vec<String> = existing
            .iter()
            .filter_map(|row| row.get(&keys.target_fk))
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect();

        let updates = resolve_updates(&existing_ids, target_ids);

        let mut removed_count = 0;
        if !updates.to_delete.is_empty() {
            let delete_keys: Vec<Record> = updates
                .to_delete
                .iter()
                .map(|target_id| {
                    let mut key = Record::new();
                    key.insert(keys.target_fk.clone(), Value::String(target_id.clone()));
                    key.insert(keys.self_fk.clone(), Value::String(entity.id().to_string()));
                    key
                })
                .collect();

            match junction.remove_by_index_keys(&delete_keys).await {
                Ok(()) => removed_count = updates.to_delete.len(),
                Err(err) => {
                    error!(
                        entity = self.entity_name(),
                        junction = junction.entity_name(),
                        %err,
                        "remove operation failed"
                    );
                }
            }
        }

        let mut created_items = Vec::new();
        let mut error_items = Vec::new();
        if !updates.to_create.is_empty() {
            let rows: Vec<Record> = updates
                .to_create
                .iter()
                .map(|target_id| {
                    let mut row = Record::new();
                    if let Some(owner_fk) = &keys.owner_fk {
                        row.insert(owner_fk.clone(), Value::String(owner_id.to_string()));
                    }
                    row.insert(keys.self_fk.clone(), Value::String(entity.id().to_string()));
                    row.insert(keys.target_fk.clone(), Value::String(target_id.clone()));
                    row
                })
                .collect();

            match junction.create_many(rows, None).await {
                Ok(result) => {
                    created_items = result.created_items;
                    error_items = result.error_items;
                }
                Err(err) => {
                    error!(
                        entity = self.entity_name(),
                        junction = junction.entity_name(),
                        %err,
                        "create operation failed"
                    );
                }
            }
        }

        info!(
            entity = self.entity_name(),
            id = entity.id(),
            removed = removed_count,
            added = created_items.len(),
            failed = error_items.len(),
            "set related targets"
        );

        Ok(SetRelatedResult {
            created_items,
            error_items,
            removed_count,
        })
    }

    /// Resolve a through-reference: junction rows scoped to `entity_id`,
    /// then a batch get of the far side. Junction rows whose target is
    /// gone contribute nothing; a dangling row never fails the traversal.
    pub async fn related_through(
        &self,
        entity_id: &str,
        target: &str,
    ) -> Result<Vec<Model>, DataAccessError> {
        let reference = self.through_reference(target)?;
        let junction_name = reference.junction().unwrap_or_default().to_string();
        let junction = self.sibling(&junction_name)?;
        let keys = self.junction_keys(&junction, target);

        let mut junction_keys = Record::new();
        junction_keys.insert(keys.self_fk, Value::String(entity_id.to_string()));
        let rows = junction
            .all_by_index_keys(&junction_keys, QueryOptions::new())
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let target_collection = self.sibling(target)?;
        let target_keys: Vec<Record> = rows
            .iter()
            .filter_map(|row| row.get(&keys.target_fk))
            .filter_map(Value::as_str)
            .map(|id| {
                let mut key = Record::new();
                key.insert(
                    target_collection.schema().id_name().to_string(),
                    Value::String(id.to_string()),
                );
                key
            })
            .collect();
        if target_keys.is_empty() {
            return Ok(Vec::new());
        }

        let result = target_collection
            .batch_get_by_keys(&target_keys, QueryOptions::new())
            .await?;
        Ok(result.data)
    }

    /// Cascading delete. Phase one removes every junction row referencing
    /// this entity (scoped strictly to its identifier) and every dependent
    /// flagged for removal; phase two removes the entity row itself. The
    /// phases are sequential so a mid-cascade failure leaves junction rows
    /// pointing at a still-existing parent, never orphaned references to a
    /// deleted one.
    pub(crate) fn remove_model<'a>(
        &'a self,
        model: &'a Model,
    ) -> Pin<Box<dyn Future<Output = Result<(), DataAccessError>> + Send + 'a>> {
        Box::pin(async move {
        let id = model.id().to_string();

        for reference in self
            .schema()
            .references_by_kind(ReferenceKind::HasManyThrough)
        {
            let junction_name = reference.junction().unwrap_or_default().to_string();
            let junction = self.sibling(&junction_name)?;
            let keys = self.junction_keys(&junction, reference.target());

            let mut scope = Record::new();
            scope.insert(keys.self_fk.clone(), Value::String(id.clone()));
            let rows = junction
                .all_by_index_keys(&scope, QueryOptions::new())
                .await?;
            if rows.is_empty() {
                continue;
            }

            let row_keys: Vec<Record> = rows
                .iter()
                .filter_map(|row| {
                    let target_id = row.get(&keys.target_fk)?.as_str()?;
                    let mut key = Record::new();
                    key.insert(
                        keys.target_fk.clone(),
                        Value::String(target_id.to_string()),
                    );
                    key.insert(keys.self_fk.clone(), Value::String(id.clone()));
                    Some(key)
                })
                .collect();
            junction.remove_by_index_keys(&row_keys).await?;
        }

        let mut dependents = Vec::new();
        for reference in self.schema().references() {
            let cascades = matches!(
                reference.kind(),
                ReferenceKind::HasMany | ReferenceKind::HasOne
            ) && reference.removes_dependents();
            if !cascades {
                continue;
            }
            dependents.extend(model.related(reference.target()).await?.into_models());
        }

        info!(
            entity = self.entity_name(),
            id = id.as_str(),
            dependents = dependents.len(),
            "removing entity and dependents"
        );

        for dependent in &dependents {
            let removal: Pin<Box<dyn Future<Output = Result<(), DataAccessError>> + Send + '_>> =
                Box::pin(dependent.remove());
            removal.await?;
        }

        self.delete_record(&id).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn resolve_updates_is_a_symmetric_difference() {
        let updates = resolve_updates(&ids(&["a", "b", "c"]), &ids(&["b", "c", "d"]));
        assert_eq!(updates.to_delete, ids(&["a"]));
        assert_eq!(updates.to_create, ids(&["d"]));
    }

    #[test]
    fn resolve_updates_converges_to_zero_writes() {
        let wanted = ids(&["a", "b"]);
        let updates = resolve_updates(&wanted, &wanted);
        assert_eq!(updates, ResolvedUpdates::default());
    }

    #[test]
    fn resolve_updates_handles_empty_sides() {
        let updates = resolve_updates(&[], &ids(&["a"]));
        assert_eq!(updates.to_create, ids(&["a"]));
        assert!(updates.to_delete.is_empty());

        let updates = resolve_updates(&ids(&["a"]), &[]);
        assert_eq!(updates.to_delete, ids(&["a"]));
        assert!(updates.to_create.is_empty());
    }
}
