//! Generated index accessors.
//!
//! Every non-primary index yields two accessors per facet prefix:
//! `allBy<F1>And<F2>...` returning every match and `findBy...` returning
//! the first or nothing. Facet order is argument order, and a missing
//! required facet fails with an error naming that facet. Accessors are
//! plain descriptors dispatched by name through the collection; nothing is
//! synthesized at runtime.

use crate::{
    error::ValidationError,
    guards::guard_typed,
    naming::key_names_to_accessor_name,
    record::Record,
    schema::Schema,
};
use serde_json::Value;
use std::collections::HashSet;

///
/// AccessorKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessorKind {
    /// Returns every matching record.
    All,
    /// Returns the first match or nothing.
    Find,
}

///
/// Accessor
/// One generated query entry point, named from an index facet prefix.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Accessor {
    pub name: String,
    pub index_name: String,
    pub key_names: Vec<String>,
    pub kind: AccessorKind,
}

impl Accessor {
    /// Validate positional facet arguments in declaration order and build
    /// the query key map. Arguments beyond the facet list are rejected so
    /// call shapes stay unambiguous.
    pub fn bind_keys(&self, schema: &Schema, args: &[Value]) -> Result<Record, ValidationError> {
        if args.len() > self.key_names.len() {
            return Err(ValidationError::new(
                schema.entity_name(),
                format!(
                    "{} takes at most {} arguments",
                    self.name,
                    self.key_names.len()
                ),
            ));
        }

        let mut keys = Record::new();
        for (position, facet) in self.key_names.iter().enumerate() {
            let value = args.get(position).filter(|value| !value.is_null());

            let Some(attribute) = schema.attribute(facet) else {
                return Err(ValidationError::attribute(
                    schema.entity_name(),
                    facet,
                    format!("{facet} is not a declared attribute"),
                ));
            };

            guard_typed(
                facet,
                value,
                attribute.attribute_type(),
                schema.entity_name(),
                false,
            )?;

            if let Some(value) = value {
                keys.insert(facet.clone(), value.clone());
            }
        }

        Ok(keys)
    }
}

/// Build the accessor set for a schema: for every secondary index except
/// `all`, one `allBy`/`findBy` pair per facet prefix. When two indexes
/// share a facet prefix, the first index in schema order keeps the name.
#[must_use]
pub fn build_accessors(schema: &Schema) -> Vec<Accessor> {
    let mut accessors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for index in schema.secondary_indexes() {
        if index.is_all() {
            continue;
        }

        let facets = index.facets();
        for prefix_len in 1..=facets.len() {
            let prefix = &facets[..prefix_len];
            let all_name = key_names_to_accessor_name("allBy", prefix);
            if !seen.insert(all_name.clone()) {
                continue;
            }

            let key_names: Vec<String> = prefix.iter().map(ToString::to_string).collect();
            accessors.push(Accessor {
                name: all_name,
                index_name: index.name().to_string(),
                key_names: key_names.clone(),
                kind: AccessorKind::All,
            });
            accessors.push(Accessor {
                name: key_names_to_accessor_name("findBy", prefix),
                index_name: index.name().to_string(),
                key_names,
                kind: AccessorKind::Find,
            });
        }
    }

    accessors
}
