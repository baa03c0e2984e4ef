//! Relationship sync, cascade ordering, and traversal tolerance.

mod common;

use common::*;
use serde_json::json;
use stratadb_core::prelude::*;

struct Graph {
    registry: EntityRegistry,
    opportunity: Model,
    fix: Model,
    suggestions: Vec<Model>,
}

async fn seed_graph(registry: EntityRegistry, suggestion_count: i64) -> Graph {
    let site = create_site(&registry, "https://example.com").await;
    let opportunity = create_opportunity(&registry, site.id(), "Broken backlinks").await;
    let fix = create_fix(&registry, opportunity.id()).await;
    let mut suggestions = Vec::new();
    for rank in 1..=suggestion_count {
        suggestions.push(create_suggestion(&registry, opportunity.id(), rank).await);
    }
    Graph {
        registry,
        opportunity,
        fix,
        suggestions,
    }
}

#[tokio::test]
async fn set_related_reconciles_junction_rows() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let graph = seed_graph(registry, 3).await;
        let fixes = graph.registry.collection("Fix").expect("fix collection");

        let first_two: Vec<String> = graph.suggestions[..2]
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        let result = fixes
            .set_related(graph.opportunity.id(), &graph.fix, "Suggestion", &first_two)
            .await
            .expect("set related must succeed");
        assert_eq!(result.created_items.len(), 2);
        assert_eq!(result.removed_count, 0);
        assert!(result.error_items.is_empty());

        // Junction rows carry the denormalized owner reference.
        for row in &result.created_items {
            assert_eq!(row.get("opportunityId"), Some(&json!(graph.opportunity.id())));
            assert_eq!(row.get("fixId"), Some(&json!(graph.fix.id())));
        }

        // Replace one target: exactly one create and one remove.
        let replaced: Vec<String> = vec![
            graph.suggestions[1].id().to_string(),
            graph.suggestions[2].id().to_string(),
        ];
        let result = fixes
            .set_related(graph.opportunity.id(), &graph.fix, "Suggestion", &replaced)
            .await
            .expect("set related must succeed");
        assert_eq!(result.created_items.len(), 1);
        assert_eq!(result.removed_count, 1);

        let related = fixes
            .related_through(graph.fix.id(), "Suggestion")
            .await
            .expect("traversal must succeed");
        let mut related_ids = ids_of(&related);
        related_ids.sort();
        let mut expected = replaced.clone();
        expected.sort();
        assert_eq!(related_ids, expected);
    }
}

#[tokio::test]
async fn set_related_is_idempotent() {
    let (registry, store) = key_value_fixture();
    let graph = seed_graph(registry, 2).await;
    let fixes = graph.registry.collection("Fix").expect("fix collection");

    let targets: Vec<String> = graph.suggestions.iter().map(|s| s.id().to_string()).collect();
    fixes
        .set_related(graph.opportunity.id(), &graph.fix, "Suggestion", &targets)
        .await
        .expect("first sync must succeed");

    let writes_before = store.calls.writes();
    let result = fixes
        .set_related(graph.opportunity.id(), &graph.fix, "Suggestion", &targets)
        .await
        .expect("second sync must succeed");

    assert!(result.created_items.is_empty());
    assert_eq!(result.removed_count, 0);
    assert_eq!(
        store.calls.writes(),
        writes_before,
        "an identical target set performs zero writes"
    );
}

#[tokio::test]
async fn set_related_requires_the_owner_reference() {
    let (registry, _) = key_value_fixture();
    let graph = seed_graph(registry, 1).await;
    let fixes = graph.registry.collection("Fix").expect("fix collection");

    let targets = vec![graph.suggestions[0].id().to_string()];
    let err = fixes
        .set_related("", &graph.fix, "Suggestion", &targets)
        .await
        .expect_err("owner is mandatory");
    assert!(err.to_string().contains("opportunityId is required"));

    let err = fixes
        .set_related("not-a-uuid", &graph.fix, "Suggestion", &targets)
        .await
        .expect_err("owner must be well-formed");
    assert!(err.to_string().contains("opportunityId must be a valid UUID"));
}

#[tokio::test]
async fn cascade_removes_only_the_removed_entitys_junction_rows() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let graph = seed_graph(registry, 2).await;
        let fixes = graph.registry.collection("Fix").expect("fix collection");
        let suggestions_collection = graph
            .registry
            .collection("Suggestion")
            .expect("suggestion collection");

        let fix_a = graph.fix.clone();
        let fix_b = create_fix(&graph.registry, graph.opportunity.id()).await;
        let shared = graph.suggestions[0].id().to_string();
        let only_a = graph.suggestions[1].id().to_string();

        fixes
            .set_related(
                graph.opportunity.id(),
                &fix_a,
                "Suggestion",
                &[shared.clone(), only_a.clone()],
            )
            .await
            .expect("sync a");
        fixes
            .set_related(graph.opportunity.id(), &fix_b, "Suggestion", &[shared.clone()])
            .await
            .expect("sync b");

        fix_a.remove().await.expect("cascade remove must succeed");

        assert!(fixes.find_by_id(fix_a.id()).await.expect("find").is_none());
        assert!(fixes.find_by_id(fix_b.id()).await.expect("find").is_some());

        // The sibling's junction row to the shared target is untouched.
        let b_targets = fixes
            .related_through(fix_b.id(), "Suggestion")
            .await
            .expect("traversal must succeed");
        assert_eq!(ids_of(&b_targets), vec![shared.clone()]);

        // Junction targets themselves survive; only rows were cascaded.
        assert!(
            suggestions_collection
                .find_by_id(&shared)
                .await
                .expect("find")
                .is_some()
        );
        assert!(
            suggestions_collection
                .find_by_id(&only_a)
                .await
                .expect("find")
                .is_some()
        );
    }
}

#[tokio::test]
async fn cascade_removes_dependents_before_the_parent() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let sites = registry.collection("Site").expect("site collection");
        let opportunities = registry
            .collection("Opportunity")
            .expect("opportunity collection");
        let suggestions = registry
            .collection("Suggestion")
            .expect("suggestion collection");

        let site = create_site(&registry, "https://example.com").await;
        let opportunity_one = create_opportunity(&registry, site.id(), "One").await;
        let opportunity_two = create_opportunity(&registry, site.id(), "Two").await;
        create_suggestion(&registry, opportunity_one.id(), 1).await;
        create_suggestion(&registry, opportunity_one.id(), 2).await;
        create_suggestion(&registry, opportunity_two.id(), 1).await;

        site.remove().await.expect("cascade remove must succeed");

        assert!(sites.find_by_id(site.id()).await.expect("find").is_none());
        assert!(
            opportunities
                .find_by_id(opportunity_one.id())
                .await
                .expect("find")
                .is_none()
        );
        assert!(
            opportunities
                .find_by_id(opportunity_two.id())
                .await
                .expect("find")
                .is_none()
        );
        let leftover = suggestions
            .all(Record::new(), QueryOptions::new())
            .await
            .expect("list must succeed");
        assert!(leftover.is_empty(), "dependent suggestions cascade too");
    }
}

#[tokio::test]
async fn traversal_tolerates_dangling_junction_rows() {
    for registry in [key_value_fixture().0, relational_fixture().0] {
        let graph = seed_graph(registry, 2).await;
        let fixes = graph.registry.collection("Fix").expect("fix collection");
        let suggestions_collection = graph
            .registry
            .collection("Suggestion")
            .expect("suggestion collection");

        let kept = graph.suggestions[0].id().to_string();
        let doomed = graph.suggestions[1].id().to_string();
        fixes
            .set_related(
                graph.opportunity.id(),
                &graph.fix,
                "Suggestion",
                &[kept.clone(), doomed.clone()],
            )
            .await
            .expect("sync");

        // Remove the target directly, leaving its junction row dangling —
        // the visible half of the cascade's non-atomicity window.
        suggestions_collection
            .remove_by_ids(&[doomed.clone()])
            .await
            .expect("direct remove");

        let related = fixes
            .related_through(graph.fix.id(), "Suggestion")
            .await
            .expect("a dangling junction row must not fail the traversal");
        assert_eq!(ids_of(&related), vec![kept]);
    }
}

#[tokio::test]
async fn belongs_to_and_has_many_traversals_resolve_and_cache() {
    let (registry, store) = key_value_fixture();
    let site = create_site(&registry, "https://example.com").await;
    let opportunity = create_opportunity(&registry, site.id(), "One").await;
    create_opportunity(&registry, site.id(), "Two").await;

    let related = opportunity.related("Site").await.expect("belongs-to");
    assert!(matches!(related, Related::One(ref parent) if parent.id() == site.id()));

    let calls_before = store.calls.total();
    let again = opportunity.related("Site").await.expect("cached");
    assert!(matches!(again, Related::One(_)));
    assert_eq!(store.calls.total(), calls_before, "second traversal is cached");

    let children = site.related("Opportunity").await.expect("has-many");
    match children {
        Related::Many(models) => assert_eq!(models.len(), 2),
        other => panic!("expected many, got {other:?}"),
    }

    let undeclared = opportunity.related("Fix").await;
    assert!(undeclared.is_ok(), "declared has-many resolves");
}

#[tokio::test]
async fn undeclared_references_are_rejected() {
    let (registry, _) = key_value_fixture();
    let site = create_site(&registry, "https://example.com").await;

    let err = site.related("Suggestion").await.expect_err("no such reference");
    assert!(err.to_string().contains("no reference to [Suggestion] is declared"));
}
