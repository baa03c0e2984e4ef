//! Single-record lifecycle against both backends: create, find, exists,
//! update, upsert, and model save semantics.

mod common;

use common::*;
use serde_json::json;
use stratadb_core::prelude::*;

#[tokio::test]
async fn create_then_find_round_trips_on_both_backends() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        let created = sites
            .create(site_record("https://example.com"))
            .await
            .expect("create must succeed");

        let id = created.id().to_string();
        assert!(uuid::Uuid::parse_str(&id).is_ok(), "engine assigns a uuid id");
        assert!(created.created_at().is_some());
        assert!(created.updated_at().is_some());
        // Defaults landed before the write.
        assert_eq!(created.get("status"), Some(&json!("ACTIVE")));
        assert_eq!(created.get("deliveryType"), Some(&json!("aem_edge")));

        let found = sites
            .find_by_id(&id)
            .await
            .expect("find must succeed")
            .expect("record must exist");

        assert_eq!(found.id(), id);
        assert_eq!(found.get("baseURL"), Some(&json!("https://example.com")));
        assert_eq!(found.get("tags"), Some(&json!(["prod", "edge"])));
        assert_eq!(found.get("config"), Some(&json!({"imports": ["cwv"]})));
        assert_eq!(found.created_at(), created.created_at());
        assert_eq!(found.updated_at(), created.updated_at());
    }
}

#[tokio::test]
async fn enum_violation_is_rejected_before_any_backend_call() {
    let (registry, store) = key_value_fixture();
    let sites = registry.collection("Site").expect("site collection");

    let mut record = site_record("https://example.com");
    record.insert("status".to_string(), json!("LAUNCHING"));

    let err = sites.create(record).await.expect_err("must fail validation");
    assert!(matches!(err, DataAccessError::Validation(_)));
    assert!(err.to_string().contains("status is invalid"));
    assert_eq!(store.calls.total(), 0, "nothing may reach the backend");

    let (registry, client) = relational_fixture();
    let sites = registry.collection("Site").expect("site collection");
    let mut record = site_record("https://example.com");
    record.insert("status".to_string(), json!("LAUNCHING"));

    let err = sites.create(record).await.expect_err("must fail validation");
    assert!(matches!(err, DataAccessError::Validation(_)));
    assert_eq!(client.calls.total(), 0, "nothing may reach the backend");
}

#[tokio::test]
async fn exists_by_id_probes_without_hydrating() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        let site = create_site(&registry, "https://example.com").await;

        assert!(sites.exists_by_id(site.id()).await.expect("probe must work"));
        assert!(
            !sites
                .exists_by_id("8c4a8a7e-98c2-4d3b-a1f7-6f0f2a8e8a11")
                .await
                .expect("probe must work")
        );

        let err = sites.exists_by_id("not-a-uuid").await.expect_err("guarded");
        assert!(err.to_string().contains("siteId must be a valid UUID"));
    }
}

#[tokio::test]
async fn find_by_id_requires_a_valid_identifier() {
    let (registry, store) = key_value_fixture();
    let sites = registry.collection("Site").expect("site collection");

    let err = sites.find_by_id("").await.expect_err("guarded");
    assert!(err.to_string().contains("siteId is required"));
    assert_eq!(store.calls.total(), 0);
}

#[tokio::test]
async fn update_by_keys_applies_partial_updates() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        let site = create_site(&registry, "https://example.com").await;

        let keys = record_from([("siteId", json!(site.id()))]);
        sites
            .update_by_keys(&keys, record_from([("status", json!("INACTIVE"))]))
            .await
            .expect("update must succeed");

        let found = sites
            .find_by_id(site.id())
            .await
            .expect("find must succeed")
            .expect("record must exist");
        assert_eq!(found.get("status"), Some(&json!("INACTIVE")));
        assert_eq!(
            found.get("baseURL"),
            Some(&json!("https://example.com")),
            "untouched attributes survive"
        );
    }
}

#[tokio::test]
async fn upsert_overwrites_instead_of_failing() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        let site = create_site(&registry, "https://example.com").await;

        let mut replacement = site_record("https://renamed.example.com");
        replacement.insert("siteId".to_string(), json!(site.id()));

        let upserted = sites
            .create_with_options(replacement, CreateOptions { upsert: true })
            .await
            .expect("upsert must succeed");

        assert_eq!(upserted.id(), site.id());
        let found = sites
            .find_by_id(site.id())
            .await
            .expect("find must succeed")
            .expect("record must exist");
        assert_eq!(
            found.get("baseURL"),
            Some(&json!("https://renamed.example.com"))
        );
    }
}

#[tokio::test]
async fn key_value_create_conflicts_on_existing_identifier() {
    let (registry, _store) = key_value_fixture();
    let sites = registry.collection("Site").expect("site collection");
    let site = create_site(&registry, "https://example.com").await;

    let mut duplicate = site_record("https://duplicate.example.com");
    duplicate.insert("siteId".to_string(), json!(site.id()));

    let err = sites.create(duplicate).await.expect_err("must conflict");
    assert!(matches!(err, DataAccessError::Backend { .. }));
}

#[tokio::test]
async fn model_save_bumps_updated_at_strictly() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let opportunities = registry
            .collection("Opportunity")
            .expect("opportunity collection");
        let site = create_site(&registry, "https://example.com").await;
        let mut opportunity = create_opportunity(&registry, site.id(), "Broken backlinks").await;

        let before = opportunity.updated_at().expect("timestamp set").to_string();

        opportunity
            .set("status", json!("IN_PROGRESS"))
            .expect("setter must accept a declared enum value");
        assert!(opportunity.has_updates());
        opportunity.save().await.expect("save must succeed");

        let after = opportunity.updated_at().expect("timestamp set").to_string();
        assert!(after > before, "updatedAt must advance strictly: {after} vs {before}");

        let found = opportunities
            .find_by_id(opportunity.id())
            .await
            .expect("find must succeed")
            .expect("record must exist");
        assert_eq!(found.get("status"), Some(&json!("IN_PROGRESS")));
        assert_eq!(found.updated_at(), Some(after.as_str()));
    }
}

#[tokio::test]
async fn save_without_changes_is_a_no_op() {
    let (registry, store) = key_value_fixture();
    let site = create_site(&registry, "https://example.com").await;
    let mut model = registry
        .collection("Site")
        .expect("site collection")
        .find_by_id(site.id())
        .await
        .expect("find must succeed")
        .expect("record must exist");

    let writes_before = store.calls.writes();
    model.save().await.expect("save must succeed");
    assert_eq!(store.calls.writes(), writes_before, "clean save writes nothing");
}

#[tokio::test]
async fn setters_reject_read_only_and_undeclared_attributes() {
    let (registry, _) = key_value_fixture();
    let site = create_site(&registry, "https://example.com").await;
    let mut model = site;

    let err = model
        .set("createdAt", json!("2030-01-01T00:00:00.000Z"))
        .expect_err("read-only");
    assert!(err.to_string().contains("read-only"));

    let err = model.set("nonsense", json!(1)).expect_err("undeclared");
    assert!(err.to_string().contains("does not exist"));

    let err = model.set("status", json!("LAUNCHING")).expect_err("enum");
    assert!(err.to_string().contains("status must be one of"));
}

#[tokio::test]
async fn reference_setters_validate_identifier_format() {
    let (registry, _) = key_value_fixture();
    let site = create_site(&registry, "https://example.com").await;
    let mut opportunity = create_opportunity(&registry, site.id(), "Broken backlinks").await;

    let err = opportunity
        .set("siteId", json!("not-a-uuid"))
        .expect_err("reference format");
    assert!(err.to_string().contains("siteId must be a valid UUID"));

    opportunity
        .set("siteId", json!("9b2f3c44-0a4e-4d6a-bb1d-0f5ddc0a1234"))
        .expect("well-formed id must pass");
}

#[tokio::test]
async fn create_requires_data() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        let err = sites.create(Record::new()).await.expect_err("must reject");
        assert!(err.to_string().contains("data is required"));
    }
}

#[tokio::test]
async fn save_many_rewrites_and_bumps_every_model() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        create_site(&registry, "https://one.example.com").await;
        create_site(&registry, "https://two.example.com").await;

        let mut models = sites
            .all(Record::new(), QueryOptions::new())
            .await
            .expect("list must succeed");
        assert_eq!(models.len(), 2);
        let before: Vec<String> = models
            .iter()
            .map(|m| m.updated_at().expect("timestamp").to_string())
            .collect();

        sites.save_many(&mut models).await.expect("save many");

        for (model, before) in models.iter().zip(before) {
            let after = model.updated_at().expect("timestamp");
            assert!(after > before.as_str());
        }
    }
}
