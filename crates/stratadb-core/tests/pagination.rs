//! Pagination, ordering, range conditions, and projections across both
//! backends.

mod common;

use common::*;
use serde_json::json;
use stratadb_core::prelude::*;

async fn seed_suggestions(registry: &EntityRegistry, count: i64) -> (Model, String) {
    let site = create_site(registry, "https://example.com").await;
    let opportunity = create_opportunity(registry, site.id(), "Broken backlinks").await;
    for rank in 1..=count {
        create_suggestion(registry, opportunity.id(), rank).await;
    }
    let id = opportunity.id().to_string();
    (opportunity, id)
}

/// Concatenating every page from the transparent loop must equal looping
/// manually with paging disabled, in order and membership.
#[tokio::test]
async fn fetch_all_pages_equals_manual_cursor_loop() {
    // Key-value: the store's native page size forces several rounds.
    let (registry, _store) = key_value_fixture_with_page_size(3);
    let suggestions = registry
        .collection("Suggestion")
        .expect("suggestion collection");
    let (_opportunity, opportunity_id) = seed_suggestions(&registry, 7).await;
    let keys = record_from([("opportunityId", json!(opportunity_id))]);

    let all_at_once = suggestions
        .all_by_index_keys(&keys, QueryOptions::new())
        .await
        .expect("query must succeed");
    assert_eq!(all_at_once.len(), 7);

    let mut manual = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut options = QueryOptions::new().fetch_all_pages(false);
        if let Some(token) = &cursor {
            options = options.cursor(token.clone());
        }
        let page = suggestions
            .all_by_index_keys_paged(&keys, options)
            .await
            .expect("page must succeed");
        let (data, next) = page.into_parts();
        if data.is_empty() {
            break;
        }
        manual.extend(data);
        match next {
            Some(token) => cursor = Some(token),
            None => break,
        }
    }

    assert_eq!(ids_of(&all_at_once), ids_of(&manual));

    // Relational: an explicit limit sets the page size; the loop walks
    // offset cursors.
    let (registry, _client) = relational_fixture();
    let suggestions = registry
        .collection("Suggestion")
        .expect("suggestion collection");
    let (_opportunity, opportunity_id) = seed_suggestions(&registry, 7).await;
    let keys = record_from([("opportunityId", json!(opportunity_id))]);

    let all_at_once = suggestions
        .all_by_index_keys(&keys, QueryOptions::new().limit(3).fetch_all_pages(true))
        .await
        .expect("query must succeed");
    assert_eq!(all_at_once.len(), 7);

    let mut manual = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut options = QueryOptions::new().limit(3).fetch_all_pages(false);
        if let Some(token) = &cursor {
            options = options.cursor(token.clone());
        }
        let page = suggestions
            .all_by_index_keys_paged(&keys, options)
            .await
            .expect("page must succeed");
        let (data, next) = page.into_parts();
        if data.is_empty() {
            break;
        }
        manual.extend(data);
        match next {
            Some(token) => cursor = Some(token),
            None => break,
        }
    }

    assert_eq!(ids_of(&all_at_once), ids_of(&manual));
}

#[tokio::test]
async fn paged_queries_resume_from_the_returned_cursor() {
    for registry in [
        key_value_fixture_with_page_size(2).0,
        relational_fixture().0,
    ] {
        let suggestions = registry
            .collection("Suggestion")
            .expect("suggestion collection");
        let (_opportunity, opportunity_id) = seed_suggestions(&registry, 5).await;
        let keys = record_from([("opportunityId", json!(opportunity_id))]);

        let first = suggestions
            .all_by_index_keys_paged(
                &keys,
                QueryOptions::new().limit(2).fetch_all_pages(false),
            )
            .await
            .expect("first page");
        assert_eq!(first.data.len(), 2);
        let cursor = first.cursor.clone().expect("more pages remain");

        let second = suggestions
            .all_by_index_keys_paged(
                &keys,
                QueryOptions::new()
                    .limit(2)
                    .fetch_all_pages(false)
                    .cursor(cursor),
            )
            .await
            .expect("second page");
        assert_eq!(second.data.len(), 2);

        let first_ids = ids_of(&first.data);
        for model in &second.data {
            assert!(
                !first_ids.contains(&model.id().to_string()),
                "pages must not overlap"
            );
        }
    }
}

#[tokio::test]
async fn order_direction_follows_the_index_sort_facets() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let suggestions = registry
            .collection("Suggestion")
            .expect("suggestion collection");
        let (_opportunity, opportunity_id) = seed_suggestions(&registry, 4).await;

        let ascending = suggestions
            .invoke_accessor(
                "allByOpportunityIdAndStatus",
                &[json!(opportunity_id), json!("NEW")],
                QueryOptions::new().order(OrderDirection::Asc),
            )
            .await
            .expect("accessor must run")
            .into_many();
        let ranks: Vec<i64> = ascending
            .iter()
            .filter_map(|m| m.get("rank").and_then(|v| v.as_i64()))
            .collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);

        let descending = suggestions
            .invoke_accessor(
                "allByOpportunityIdAndStatus",
                &[json!(opportunity_id), json!("NEW")],
                QueryOptions::new().order(OrderDirection::Desc),
            )
            .await
            .expect("accessor must run")
            .into_many();
        let ranks: Vec<i64> = descending
            .iter()
            .filter_map(|m| m.get("rank").and_then(|v| v.as_i64()))
            .collect();
        assert_eq!(ranks, vec![4, 3, 2, 1]);
    }
}

#[tokio::test]
async fn between_restricts_to_an_inclusive_range() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let suggestions = registry
            .collection("Suggestion")
            .expect("suggestion collection");
        let (_opportunity, opportunity_id) = seed_suggestions(&registry, 5).await;
        let keys = record_from([("opportunityId", json!(opportunity_id))]);

        let ranged = suggestions
            .all_by_index_keys(
                &keys,
                QueryOptions::new().between(Between::new("rank", 2, 4)),
            )
            .await
            .expect("query must succeed");

        let mut ranks: Vec<i64> = ranged
            .iter()
            .filter_map(|m| m.get("rank").and_then(|v| v.as_i64()))
            .collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![2, 3, 4]);
    }
}

#[tokio::test]
async fn attribute_projection_limits_returned_columns() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let suggestions = registry
            .collection("Suggestion")
            .expect("suggestion collection");
        let (_opportunity, opportunity_id) = seed_suggestions(&registry, 2).await;
        let keys = record_from([("opportunityId", json!(opportunity_id))]);

        let projected = suggestions
            .all_by_index_keys(
                &keys,
                QueryOptions::new().attributes(["suggestionId", "status"]),
            )
            .await
            .expect("query must succeed");

        for model in &projected {
            assert!(!model.id().is_empty());
            assert_eq!(model.get("status"), Some(&json!("NEW")));
            assert!(model.get("rank").is_none(), "unselected attributes stay absent");
        }
    }
}

#[tokio::test]
async fn where_clauses_filter_after_the_key_condition() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let opportunities = registry
            .collection("Opportunity")
            .expect("opportunity collection");
        let site = create_site(&registry, "https://example.com").await;
        let mut resolved = create_opportunity(&registry, site.id(), "Resolved one").await;
        resolved
            .set("status", json!("RESOLVED"))
            .expect("declared enum value");
        resolved.save().await.expect("save must succeed");
        create_opportunity(&registry, site.id(), "Open one").await;

        let keys = record_from([("siteId", json!(site.id()))]);
        let filtered = opportunities
            .all_by_index_keys(
                &keys,
                QueryOptions::new().filter(WhereClause::Eq(
                    "status".to_string(),
                    json!("RESOLVED"),
                )),
            )
            .await
            .expect("query must succeed");

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].get("title"), Some(&json!("Resolved one")));
    }
}

#[tokio::test]
async fn all_lists_every_entity_and_find_by_all_picks_one() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        create_site(&registry, "https://one.example.com").await;
        create_site(&registry, "https://two.example.com").await;
        create_site(&registry, "https://three.example.com").await;

        let listed = sites
            .all(Record::new(), QueryOptions::new())
            .await
            .expect("list must succeed");
        assert_eq!(listed.len(), 3);

        let one = sites
            .find_by_all(Record::new(), QueryOptions::new())
            .await
            .expect("find by all must succeed");
        assert!(one.is_some());
    }
}

#[tokio::test]
async fn unknown_explicit_index_is_rejected() {
    let (registry, _) = key_value_fixture();
    let sites = registry.collection("Site").expect("site collection");

    let err = sites
        .all_by_index_keys(
            &record_from([("status", json!("ACTIVE"))]),
            QueryOptions::new().index("byNonsense"),
        )
        .await
        .expect_err("unknown index");
    assert!(err.to_string().contains("query proxy [byNonsense] not found"));
}
