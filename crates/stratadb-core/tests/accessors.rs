//! Generated accessor dispatch: facet-prefix naming, argument order,
//! deterministic per-facet errors.

mod common;

use common::*;
use serde_json::json;
use stratadb_core::prelude::*;

#[tokio::test]
async fn accessor_names_follow_index_facet_prefixes() {
    let (registry, _) = key_value_fixture();
    let opportunities = registry
        .collection("Opportunity")
        .expect("opportunity collection");

    let names: Vec<&str> = opportunities
        .accessors()
        .iter()
        .map(|a| a.name.as_str())
        .collect();

    assert!(names.contains(&"allBySiteId"));
    assert!(names.contains(&"findBySiteId"));
    assert!(names.contains(&"allBySiteIdAndStatus"));
    assert!(names.contains(&"allBySiteIdAndStatusAndUpdatedAt"));
    // No index starts at status alone, and the primary index never gets
    // generated accessors.
    assert!(!names.contains(&"allByStatus"));
    assert!(!names.contains(&"allByOpportunityId"));
}

#[tokio::test]
async fn all_accessor_scopes_to_the_given_facet_values() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let opportunities = registry
            .collection("Opportunity")
            .expect("opportunity collection");
        let site_a = create_site(&registry, "https://a.example.com").await;
        let site_b = create_site(&registry, "https://b.example.com").await;

        create_opportunity(&registry, site_a.id(), "A one").await;
        create_opportunity(&registry, site_a.id(), "A two").await;
        create_opportunity(&registry, site_b.id(), "B one").await;

        let result = opportunities
            .invoke_accessor("allBySiteId", &[json!(site_a.id())], QueryOptions::new())
            .await
            .expect("accessor must run");
        let models = result.into_many();

        assert_eq!(models.len(), 2);
        for model in &models {
            assert_eq!(model.get("siteId"), Some(&json!(site_a.id())));
        }
    }
}

#[tokio::test]
async fn find_accessor_returns_first_match_or_nothing() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let opportunities = registry
            .collection("Opportunity")
            .expect("opportunity collection");
        let site = create_site(&registry, "https://example.com").await;
        create_opportunity(&registry, site.id(), "Broken backlinks").await;

        let found = opportunities
            .invoke_accessor(
                "findBySiteIdAndStatus",
                &[json!(site.id()), json!("NEW")],
                QueryOptions::new(),
            )
            .await
            .expect("accessor must run")
            .into_one();
        assert!(found.is_some());

        let missing = opportunities
            .invoke_accessor(
                "findBySiteIdAndStatus",
                &[json!(site.id()), json!("RESOLVED")],
                QueryOptions::new(),
            )
            .await
            .expect("accessor must run")
            .into_one();
        assert!(missing.is_none());
    }
}

#[tokio::test]
async fn missing_facet_errors_name_the_facet() {
    let (registry, store) = key_value_fixture();
    let opportunities = registry
        .collection("Opportunity")
        .expect("opportunity collection");

    let err = opportunities
        .invoke_accessor("allBySiteId", &[], QueryOptions::new())
        .await
        .expect_err("first facet missing");
    assert!(err.to_string().contains("siteId is required"));

    let err = opportunities
        .invoke_accessor(
            "allBySiteIdAndStatus",
            &[json!("2ef7a9f3-02a4-4a9d-9a3a-3f63e5e7b9ab")],
            QueryOptions::new(),
        )
        .await
        .expect_err("second facet missing");
    assert!(err.to_string().contains("status is required"));

    assert_eq!(store.calls.total(), 0, "facet validation precedes the backend");
}

#[tokio::test]
async fn facet_values_are_type_checked_in_order() {
    let (registry, _) = key_value_fixture();
    let opportunities = registry
        .collection("Opportunity")
        .expect("opportunity collection");

    let err = opportunities
        .invoke_accessor(
            "allBySiteIdAndStatus",
            &[json!("2ef7a9f3-02a4-4a9d-9a3a-3f63e5e7b9ab"), json!("BOGUS")],
            QueryOptions::new(),
        )
        .await
        .expect_err("enum facet must be checked");
    assert!(err.to_string().contains("status must be one of"));
}

#[tokio::test]
async fn unknown_accessor_is_a_deterministic_error() {
    let (registry, _) = key_value_fixture();
    let opportunities = registry
        .collection("Opportunity")
        .expect("opportunity collection");

    let err = opportunities
        .invoke_accessor("allByNonsense", &[], QueryOptions::new())
        .await
        .expect_err("unknown accessor");
    assert!(err.to_string().contains("accessor [allByNonsense] not found"));
}
