//! Schema AST and builder.
//!
//! A [`Schema`] declares one entity: attributes, indexes, and references.
//! [`SchemaBuilder`] seeds every entity with the engine-owned attributes
//! (generated id, createdAt, updatedAt) and the primary index, then lets
//! the caller add the rest. Index ordering is enforced at build time for
//! deterministic output: primary first, `all` second (if present),
//! belongs-to indexes sorted alphabetically next, other indexes sorted
//! alphabetically last.

pub mod attribute;
pub mod index;
pub mod reference;

pub use attribute::{Attribute, AttributeDefault, AttributeType, GetFn, SetFn, ValidateFn, Watch};
pub use index::{ALL_INDEX, Index, IndexKind, PRIMARY_INDEX};
pub use reference::{Reference, ReferenceKind};

use crate::naming::{
    entity_name_to_id_name, entity_name_to_table_name, key_names_to_index_name,
};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Engine timestamp format: ISO-8601, millisecond precision, `Z` suffix.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

///
/// SchemaError
/// Declaration-time rejection raised by [`SchemaBuilder::build`].
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("entity name is required and must be non-empty")]
    MissingEntityName,

    #[error("attribute name is required and must be non-empty")]
    MissingAttributeName,

    #[error("duplicate attribute [{name}]")]
    DuplicateAttribute { name: String },

    #[error("index name [{name}] is reserved")]
    ReservedIndexName { name: String },

    #[error("duplicate index [{name}]")]
    DuplicateIndex { name: String },

    #[error("index [{index}] names unknown attribute [{facet}]")]
    UnknownFacet { index: String, facet: String },

    #[error("reference to [{target}] must name a junction entity")]
    MissingJunction { target: String },
}

///
/// Schema
///
/// Immutable description of one entity. Constructed only through
/// [`SchemaBuilder`] so the engine-owned attributes and index ordering are
/// always present.
///

#[derive(Clone, Debug)]
pub struct Schema {
    entity_name: String,
    id_name: String,
    table_name: String,
    attributes: Vec<Attribute>,
    indexes: Vec<Index>,
    references: Vec<Reference>,
}

impl Schema {
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Name of the generated identifier attribute (`Site` -> `siteId`).
    #[must_use]
    pub fn id_name(&self) -> &str {
        &self.id_name
    }

    /// Relational table name (snake_case plural unless overridden).
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name() == name)
    }

    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|index| index.name() == name)
    }

    #[must_use]
    pub fn primary_index(&self) -> &Index {
        // The builder always seeds the primary index.
        self.indexes
            .iter()
            .find(|index| index.is_primary())
            .unwrap_or(&self.indexes[0])
    }

    #[must_use]
    pub fn all_index(&self) -> Option<&Index> {
        self.indexes.iter().find(|index| index.is_all())
    }

    /// Secondary access paths: everything except the primary index.
    pub fn secondary_indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.iter().filter(|index| !index.is_primary())
    }

    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn references_by_kind(&self, kind: ReferenceKind) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(move |r| r.kind() == kind)
    }

    #[must_use]
    pub fn reference_to(&self, kind: ReferenceKind, target: &str) -> Option<&Reference> {
        self.references
            .iter()
            .find(|r| r.kind() == kind && r.target() == target)
    }

    /// Whether an attribute is the foreign key of a declared belongs-to
    /// reference. Setters validate such attributes as identifiers.
    #[must_use]
    pub fn is_reference_attribute(&self, name: &str) -> bool {
        self.references_by_kind(ReferenceKind::BelongsTo)
            .any(|r| entity_name_to_id_name(r.target()) == name)
    }

    /// Resolve an index name for a set of query key names: progressively
    /// shorten the key list looking for a `by<K1>And<K2>...` index, then
    /// fall back to the `all` index, then to the primary index.
    #[must_use]
    pub fn find_index_name_by_keys<S: AsRef<str>>(&self, key_names: &[S]) -> String {
        for length in (1..=key_names.len()).rev() {
            let candidate = key_names_to_index_name(&key_names[..length]);
            if self.index(&candidate).is_some() {
                return candidate;
            }
        }

        if self.all_index().is_some() {
            ALL_INDEX.to_string()
        } else {
            PRIMARY_INDEX.to_string()
        }
    }
}

///
/// SchemaBuilder
///
/// Fluent schema constructor. Seeds the generated id attribute
/// (uuid-v4 default, uuid-validated, read-only), audited timestamps
/// (`createdAt` read-only; `updatedAt` read-only with a wildcard watcher),
/// and the primary index on the id.
///

pub struct SchemaBuilder {
    entity_name: String,
    id_name: String,
    table_name: Option<String>,
    attributes: Vec<Attribute>,
    all_index: Option<Index>,
    belongs_to_indexes: Vec<Index>,
    other_indexes: Vec<Index>,
    references: Vec<Reference>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new(entity_name: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let id_name = entity_name_to_id_name(&entity_name);

        let attributes = vec![
            Attribute::string(id_name.clone())
                .required()
                .read_only()
                .default_fn(|| Value::String(Uuid::new_v4().to_string()))
                .validate(|value| {
                    Ok(value
                        .as_str()
                        .is_some_and(|text| Uuid::parse_str(text).is_ok()))
                }),
            Attribute::string("createdAt")
                .required()
                .read_only()
                .default_fn(|| Value::String(now_timestamp())),
            Attribute::string("updatedAt")
                .required()
                .read_only()
                .watch_all()
                .default_fn(|| Value::String(now_timestamp()))
                .set(|_, _| Some(Value::String(now_timestamp()))),
        ];

        Self {
            entity_name,
            id_name,
            table_name: None,
            attributes,
            all_index: None,
            belongs_to_indexes: Vec::new(),
            other_indexes: Vec::new(),
            references: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add the `all` index: an unscoped listing sorted by the given
    /// attributes.
    #[must_use]
    pub fn all_index<S: Into<String>>(mut self, sort_keys: impl IntoIterator<Item = S>) -> Self {
        self.all_index = Some(Index::new(
            ALL_INDEX,
            IndexKind::All,
            Vec::new(),
            sort_keys.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Add a generic secondary index. The name must not be `primary` or
    /// `all`; by convention it is `by<Facet>And<Facet>...` so query key
    /// resolution can find it.
    #[must_use]
    pub fn index<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        partition: impl IntoIterator<Item = S>,
        sort: impl IntoIterator<Item = S>,
    ) -> Self {
        self.other_indexes.push(Index::new(
            name,
            IndexKind::Other,
            partition.into_iter().map(Into::into).collect(),
            sort.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Declare a belongs-to reference. Adds the foreign-key attribute
    /// (uuid-validated, optional when the reference is optional) and a
    /// `by<ForeignKey>` index so lookups by that key have an access path.
    #[must_use]
    pub fn belongs_to(self, target: impl Into<String>) -> Self {
        self.belongs_to_ref(Reference::new(ReferenceKind::BelongsTo, target))
    }

    #[must_use]
    pub fn belongs_to_ref(mut self, reference: Reference) -> Self {
        let foreign_key = entity_name_to_id_name(reference.target());
        let required = reference.is_required();

        let mut attribute = Attribute::string(foreign_key.clone()).validate(move |value| {
            let valid = value
                .as_str()
                .is_some_and(|text| Uuid::parse_str(text).is_ok());
            Ok(valid || (!required && value.is_null()))
        });
        if required {
            attribute = attribute.required();
        }
        self.attributes.push(attribute);

        self.belongs_to_indexes.push(Index::new(
            key_names_to_index_name(&[foreign_key.as_str()]),
            IndexKind::BelongsTo,
            vec![foreign_key],
            reference.reference_sort_keys().to_vec(),
        ));
        self.references.push(reference);
        self
    }

    #[must_use]
    pub fn has_one(mut self, target: impl Into<String>) -> Self {
        self.references
            .push(Reference::new(ReferenceKind::HasOne, target));
        self
    }

    #[must_use]
    pub fn has_one_ref(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    #[must_use]
    pub fn has_many(mut self, target: impl Into<String>) -> Self {
        self.references
            .push(Reference::new(ReferenceKind::HasMany, target));
        self
    }

    #[must_use]
    pub fn has_many_ref(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Declare a many-to-many reference through a junction entity.
    #[must_use]
    pub fn has_many_through(
        mut self,
        target: impl Into<String>,
        junction: impl Into<String>,
    ) -> Self {
        self.references
            .push(Reference::new(ReferenceKind::HasManyThrough, target).through(junction));
        self
    }

    /// Override the derived relational table name.
    #[must_use]
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        if self.entity_name.is_empty() {
            return Err(SchemaError::MissingEntityName);
        }

        let mut seen = std::collections::HashSet::new();
        for attribute in &self.attributes {
            if attribute.name().is_empty() {
                return Err(SchemaError::MissingAttributeName);
            }
            if !seen.insert(attribute.name().to_string()) {
                return Err(SchemaError::DuplicateAttribute {
                    name: attribute.name().to_string(),
                });
            }
        }

        for reference in &self.references {
            if reference.kind() == ReferenceKind::HasManyThrough && reference.junction().is_none() {
                return Err(SchemaError::MissingJunction {
                    target: reference.target().to_string(),
                });
            }
        }

        let mut indexes = vec![Index::new(
            PRIMARY_INDEX,
            IndexKind::Primary,
            vec![self.id_name.clone()],
            Vec::new(),
        )];
        if let Some(all) = self.all_index {
            indexes.push(all);
        }

        let mut belongs_to = self.belongs_to_indexes;
        belongs_to.sort_by(|a, b| a.name().cmp(b.name()));
        let mut other = self.other_indexes;
        other.sort_by(|a, b| a.name().cmp(b.name()));
        indexes.extend(belongs_to);
        indexes.extend(other);

        let mut index_names = std::collections::HashSet::new();
        for index in &indexes {
            if !index_names.insert(index.name().to_string()) {
                if index.name() == PRIMARY_INDEX || index.name() == ALL_INDEX {
                    return Err(SchemaError::ReservedIndexName {
                        name: index.name().to_string(),
                    });
                }
                return Err(SchemaError::DuplicateIndex {
                    name: index.name().to_string(),
                });
            }

            for facet in index.facets() {
                let known = self.attributes.iter().any(|attr| attr.name() == facet);
                if !known {
                    return Err(SchemaError::UnknownFacet {
                        index: index.name().to_string(),
                        facet: facet.to_string(),
                    });
                }
            }
        }

        let table_name = self
            .table_name
            .unwrap_or_else(|| entity_name_to_table_name(&self.entity_name));

        Ok(Schema {
            entity_name: self.entity_name,
            id_name: self.id_name,
            table_name,
            attributes: self.attributes,
            indexes,
            references: self.references,
        })
    }
}
