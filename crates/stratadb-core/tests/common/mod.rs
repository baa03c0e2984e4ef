//! Shared harness for the engine integration suites: fixture registries
//! over both in-memory backends and record builders for the fixture
//! entity graph.

#![allow(dead_code)]

use serde_json::json;
use stratadb_core::prelude::*;

pub use stratadb_core::test_support::{
    MemoryEntityStore, MemoryRestClient, fixtures::key_value_fixture_with_page_size,
    key_value_fixture, relational_fixture,
};

pub fn site_record(base_url: &str) -> Record {
    record_from([
        ("baseURL", json!(base_url)),
        ("name", json!("Example Site")),
        ("tags", json!(["prod", "edge"])),
        ("config", json!({"imports": ["cwv"]})),
    ])
}

pub fn opportunity_record(site_id: &str, title: &str) -> Record {
    record_from([
        ("siteId", json!(site_id)),
        ("title", json!(title)),
        ("data", json!({"kind": "broken-backlinks"})),
    ])
}

pub fn suggestion_record(opportunity_id: &str, rank: i64) -> Record {
    record_from([
        ("opportunityId", json!(opportunity_id)),
        ("rank", json!(rank)),
        ("data", json!({"url": format!("https://example.com/{rank}")})),
    ])
}

pub fn fix_record(opportunity_id: &str) -> Record {
    record_from([
        ("opportunityId", json!(opportunity_id)),
        ("executedBy", json!("importer")),
    ])
}

pub async fn create_site(registry: &EntityRegistry, base_url: &str) -> Model {
    registry
        .collection("Site")
        .expect("site collection")
        .create(site_record(base_url))
        .await
        .expect("site must create")
}

pub async fn create_opportunity(registry: &EntityRegistry, site_id: &str, title: &str) -> Model {
    registry
        .collection("Opportunity")
        .expect("opportunity collection")
        .create(opportunity_record(site_id, title))
        .await
        .expect("opportunity must create")
}

pub async fn create_suggestion(registry: &EntityRegistry, opportunity_id: &str, rank: i64) -> Model {
    registry
        .collection("Suggestion")
        .expect("suggestion collection")
        .create(suggestion_record(opportunity_id, rank))
        .await
        .expect("suggestion must create")
}

pub async fn create_fix(registry: &EntityRegistry, opportunity_id: &str) -> Model {
    registry
        .collection("Fix")
        .expect("fix collection")
        .create(fix_record(opportunity_id))
        .await
        .expect("fix must create")
}

/// Ids of a model list, for order/membership comparisons.
pub fn ids_of(models: &[Model]) -> Vec<String> {
    models.iter().map(|m| m.id().to_string()).collect()
}
