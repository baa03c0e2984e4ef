//! Fixture schemas and pre-wired registries.
//!
//! A small but complete entity graph: sites own opportunities,
//! opportunities own suggestions and fixes, and fixes relate to
//! suggestions many-to-many through a junction carrying the opportunity as
//! its denormalized owner key.

use crate::{
    backend::{
        StorageAdapter,
        keyvalue::KeyValueAdapter,
        relational::RelationalAdapter,
    },
    registry::EntityRegistry,
    schema::{Attribute, Reference, ReferenceKind, Schema, SchemaBuilder},
    test_support::{MemoryEntityStore, MemoryRestClient},
};
use std::sync::Arc;

#[must_use]
pub fn site_schema() -> Schema {
    SchemaBuilder::new("Site")
        .attribute(Attribute::string("baseURL").required())
        .attribute(Attribute::string("name").case_insensitive())
        .attribute(
            Attribute::enumeration("deliveryType", ["aem_edge", "aem_cs", "other"])
                .default_value("aem_edge"),
        )
        .attribute(Attribute::enumeration("status", ["ACTIVE", "INACTIVE"]).default_value("ACTIVE"))
        .attribute(Attribute::list("tags"))
        .attribute(Attribute::map("config"))
        .all_index(["updatedAt"])
        .index("byStatus", ["status"], ["updatedAt"])
        .has_many_ref(Reference::new(ReferenceKind::HasMany, "Opportunity").remove_dependents())
        .build()
        .expect("site schema must build")
}

#[must_use]
pub fn opportunity_schema() -> Schema {
    SchemaBuilder::new("Opportunity")
        .attribute(Attribute::string("title").required())
        .attribute(
            Attribute::enumeration("status", ["NEW", "IN_PROGRESS", "RESOLVED"])
                .default_value("NEW"),
        )
        .attribute(Attribute::number("projectedTrafficLost"))
        .attribute(Attribute::map("data"))
        .all_index(["updatedAt"])
        .belongs_to("Site")
        .index("bySiteIdAndStatus", ["siteId", "status"], ["updatedAt"])
        .has_many_ref(Reference::new(ReferenceKind::HasMany, "Suggestion").remove_dependents())
        .has_many("Fix")
        .build()
        .expect("opportunity schema must build")
}

#[must_use]
pub fn suggestion_schema() -> Schema {
    SchemaBuilder::new("Suggestion")
        .attribute(
            Attribute::enumeration("status", ["NEW", "APPROVED", "FIXED"]).default_value("NEW"),
        )
        .attribute(Attribute::number("rank").required())
        .attribute(Attribute::map("data"))
        .belongs_to("Opportunity")
        .index(
            "byOpportunityIdAndStatus",
            ["opportunityId", "status"],
            ["rank"],
        )
        .build()
        .expect("suggestion schema must build")
}

#[must_use]
pub fn fix_schema() -> Schema {
    SchemaBuilder::new("Fix")
        .attribute(
            Attribute::enumeration("status", ["PENDING", "DEPLOYED", "FAILED"])
                .default_value("PENDING"),
        )
        .attribute(Attribute::string("executedBy"))
        .attribute(Attribute::map("changeDetails"))
        .belongs_to("Opportunity")
        .has_many_through("Suggestion", "FixSuggestion")
        .build()
        .expect("fix schema must build")
}

/// Junction between fixes and suggestions. Rows are keyed by the foreign
/// key pair and carry the opportunity as a denormalized owner reference;
/// they have no lifecycle of their own.
#[must_use]
pub fn fix_suggestion_schema() -> Schema {
    SchemaBuilder::new("FixSuggestion")
        .belongs_to("Fix")
        .belongs_to("Suggestion")
        .belongs_to("Opportunity")
        .index(
            "bySuggestionIdAndFixId",
            ["suggestionId", "fixId"],
            ["updatedAt"],
        )
        .build()
        .expect("junction schema must build")
}

fn registry_with(adapter: Arc<dyn StorageAdapter>) -> EntityRegistry {
    EntityRegistry::builder(adapter)
        .schema(site_schema())
        .schema(opportunity_schema())
        .schema(suggestion_schema())
        .schema(fix_schema())
        .schema(fix_suggestion_schema())
        .build()
}

/// Registry over the in-memory key-value store, plus the store handle for
/// call-count assertions.
#[must_use]
pub fn key_value_fixture() -> (EntityRegistry, Arc<MemoryEntityStore>) {
    key_value_fixture_with_page_size(100)
}

#[must_use]
pub fn key_value_fixture_with_page_size(
    page_size: usize,
) -> (EntityRegistry, Arc<MemoryEntityStore>) {
    let store = Arc::new(MemoryEntityStore::with_page_size(page_size));
    let adapter = Arc::new(KeyValueAdapter::new(store.clone()));
    (registry_with(adapter), store)
}

/// Registry over the in-memory relational backend, plus the client handle
/// for call-count assertions.
#[must_use]
pub fn relational_fixture() -> (EntityRegistry, Arc<MemoryRestClient>) {
    let client = Arc::new(MemoryRestClient::new());
    let adapter = Arc::new(RelationalAdapter::new(client.clone()));
    (registry_with(adapter), client)
}
