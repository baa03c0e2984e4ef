//! Name derivations shared by schemas, accessors, and the relational
//! translator.
//!
//! All engine-facing names are camelCase (attributes, facets, generated
//! accessors); relational column and table names are snake_case. Entity
//! names are PascalCase.

use convert_case::{Case, Casing};

/// Uppercase the first character (`siteId` -> `SiteId`).
#[must_use]
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

/// Lowercase the first character (`Site` -> `site`).
#[must_use]
pub fn decapitalize(value: &str) -> String {
    let mut chars = value.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().collect::<String>() + chars.as_str()
    })
}

/// Identifier attribute name for an entity (`Site` -> `siteId`).
#[must_use]
pub fn entity_name_to_id_name(entity_name: &str) -> String {
    format!("{}Id", decapitalize(entity_name))
}

/// Inverse of [`entity_name_to_id_name`] (`siteId` -> `Site`).
#[must_use]
pub fn id_name_to_entity_name(id_name: &str) -> String {
    capitalize(id_name.strip_suffix("Id").unwrap_or(id_name))
}

/// Synthetic partition value backing the key-value `all` index
/// (`SiteTopPage` -> `ALL_SITE_TOP_PAGES`).
#[must_use]
pub fn entity_name_to_all_pk_value(entity_name: &str) -> String {
    format!(
        "ALL_{}",
        pluralize(&entity_name.to_case(Case::Snake)).to_uppercase()
    )
}

/// Index name generated from key names
/// (`["siteId", "status"]` -> `bySiteIdAndStatus`).
#[must_use]
pub fn key_names_to_index_name<S: AsRef<str>>(key_names: &[S]) -> String {
    let joined = key_names
        .iter()
        .map(|name| capitalize(name.as_ref()))
        .collect::<Vec<_>>()
        .join("And");

    format!("by{joined}")
}

/// Accessor name generated from a prefix and key names
/// (`"allBy"`, `["siteId"]` -> `allBySiteId`).
#[must_use]
pub fn key_names_to_accessor_name<S: AsRef<str>>(prefix: &str, key_names: &[S]) -> String {
    let joined = key_names
        .iter()
        .map(|name| capitalize(name.as_ref()))
        .collect::<Vec<_>>()
        .join("And");

    format!("{prefix}{joined}")
}

/// Relational table name for an entity (`SiteTopPage` -> `site_top_pages`).
#[must_use]
pub fn entity_name_to_table_name(entity_name: &str) -> String {
    pluralize(&entity_name.to_case(Case::Snake))
}

/// Relational column name for an attribute (`baseURL` -> `base_url`).
#[must_use]
pub fn to_db_column(attribute_name: &str) -> String {
    attribute_name.to_case(Case::Snake)
}

/// Engine-facing attribute name for a relational column
/// (`base_url` -> `baseUrl`).
#[must_use]
pub fn to_model_field(column_name: &str) -> String {
    column_name.to_case(Case::Camel)
}

// English pluralization for the handful of shapes entity names take.
// Irregular table names are handled by per-schema overrides instead.
fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        let penultimate = stem.chars().last();
        if penultimate.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }

    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }

    format!("{word}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_names_round_trip() {
        assert_eq!(entity_name_to_id_name("Site"), "siteId");
        assert_eq!(entity_name_to_id_name("FixSuggestion"), "fixSuggestionId");
        assert_eq!(id_name_to_entity_name("siteId"), "Site");
        assert_eq!(id_name_to_entity_name("fixSuggestionId"), "FixSuggestion");
    }

    #[test]
    fn index_and_accessor_names() {
        assert_eq!(
            key_names_to_index_name(&["siteId", "status"]),
            "bySiteIdAndStatus"
        );
        assert_eq!(
            key_names_to_accessor_name("allBy", &["siteId"]),
            "allBySiteId"
        );
        assert_eq!(
            key_names_to_accessor_name("findBy", &["siteId", "status", "createdAt"]),
            "findBySiteIdAndStatusAndCreatedAt"
        );
    }

    #[test]
    fn table_names_are_snake_plurals() {
        assert_eq!(entity_name_to_table_name("Site"), "sites");
        assert_eq!(entity_name_to_table_name("Opportunity"), "opportunities");
        assert_eq!(entity_name_to_table_name("SiteTopPage"), "site_top_pages");
        assert_eq!(entity_name_to_table_name("Fix"), "fixes");
    }

    #[test]
    fn all_pk_value_is_upper_plural() {
        assert_eq!(entity_name_to_all_pk_value("Site"), "ALL_SITES");
        assert_eq!(
            entity_name_to_all_pk_value("Opportunity"),
            "ALL_OPPORTUNITIES"
        );
    }

    #[test]
    fn column_mapping_round_trips_camel_case() {
        assert_eq!(to_db_column("fixEntityCreatedAt"), "fix_entity_created_at");
        assert_eq!(to_model_field("fix_entity_created_at"), "fixEntityCreatedAt");
    }
}
