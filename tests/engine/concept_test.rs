use std::sync::Arc;

use semql::config::Settings;
use semql::engine::QueryEngine;
use semql::error::IssueKind;
use semql::model::{Comparator, DataValue, Description, EntityPage, Property, NS_MAIN};
use semql::planner::QueryOptions;
use semql::store::{SqliteStore, Store};

fn engine_with_people() -> (Arc<SqliteStore>, QueryEngine) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let age = Property::new("Age");
    for (name, years) in [("Alice", 30.0), ("Bob", 17.0), ("Carol", 18.0), ("Dave", 45.0)] {
        let page = EntityPage::new(name, NS_MAIN);
        store
            .add_instance(&page, &EntityPage::category("Person"))
            .unwrap();
        store
            .add_property_value(&page, &age, &DataValue::Number(years))
            .unwrap();
    }
    store
        .store_concept(
            &EntityPage::concept("Adults"),
            &Description::and([
                Description::class("Person"),
                Description::value("Age", Comparator::GreaterEq, DataValue::Number(18.0)),
            ]),
        )
        .unwrap();
    let engine = QueryEngine::new(store.clone(), Settings::default());
    (store, engine)
}

fn titles(rows: &[EntityPage]) -> Vec<&str> {
    rows.iter().map(|row| row.title.as_str()).collect()
}

#[test]
fn test_concept_query() {
    let (_store, engine) = engine_with_people();
    let result = engine
        .execute(&Description::concept("Adults"), QueryOptions::instances())
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Alice", "Carol", "Dave"]);
    assert!(result.errors.is_empty());
}

#[test]
fn test_nested_concepts() {
    let (store, engine) = engine_with_people();
    store
        .store_concept(
            &EntityPage::concept("Seniors"),
            &Description::and([
                Description::concept("Adults"),
                Description::value("Age", Comparator::GreaterEq, DataValue::Number(40.0)),
            ]),
        )
        .unwrap();

    let result = engine
        .execute(&Description::concept("Seniors"), QueryOptions::instances())
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Dave"]);

    let either = Description::or([
        Description::concept("Seniors"),
        Description::page(EntityPage::new("Bob", NS_MAIN)),
    ]);
    let result = engine.execute(&either, QueryOptions::instances()).unwrap();
    assert_eq!(titles(&result.rows), vec!["Bob", "Dave"]);
}

#[test]
fn test_self_referencing_concept_is_empty() {
    let (store, engine) = engine_with_people();
    store
        .store_concept(&EntityPage::concept("Loop"), &Description::concept("Loop"))
        .unwrap();

    let result = engine
        .execute(&Description::concept("Loop"), QueryOptions::instances())
        .unwrap();
    assert!(result.rows.is_empty());
    assert!(!result.has_more);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, IssueKind::RecursionDetected);
}

#[test]
fn test_recursive_branch_degrades_only_itself() {
    let (store, engine) = engine_with_people();
    store
        .store_concept(
            &EntityPage::concept("Spiral"),
            &Description::or([
                Description::concept("Spiral"),
                Description::page(EntityPage::new("Bob", NS_MAIN)),
            ]),
        )
        .unwrap();

    let result = engine
        .execute(&Description::concept("Spiral"), QueryOptions::instances())
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Bob"]);
    assert_eq!(result.errors[0].kind, IssueKind::RecursionDetected);
}

#[test]
fn test_refresh_serves_cached_members() {
    let (store, engine) = engine_with_people();
    let refresh = engine.refresh_concept("Adults").unwrap().unwrap();
    assert_eq!(refresh.count, 3);
    assert!(refresh.issues.is_empty());

    // Not visible until the cache is dropped.
    let erin = EntityPage::new("Erin", NS_MAIN);
    store
        .add_instance(&erin, &EntityPage::category("Person"))
        .unwrap();
    store
        .add_property_value(&erin, &Property::new("Age"), &DataValue::Number(50.0))
        .unwrap();

    let debug = engine
        .execute(&Description::concept("Adults"), QueryOptions::debug())
        .unwrap()
        .debug
        .unwrap();
    assert!(debug.contains("smw_concept_cache"), "{}", debug);

    let cached = engine
        .execute(&Description::concept("Adults"), QueryOptions::count())
        .unwrap();
    assert_eq!(cached.count, Some(3));

    assert!(engine.delete_concept_cache("Adults").unwrap());
    let live = engine
        .execute(&Description::concept("Adults"), QueryOptions::count())
        .unwrap();
    assert_eq!(live.count, Some(4));
}

#[test]
fn test_failed_refresh_keeps_serving_cache() {
    let (store, engine) = engine_with_people();
    engine.refresh_concept("Adults").unwrap();
    store
        .execute("UPDATE smw_fpt_conc SET concept_txt = '{\"broken\": true}'")
        .unwrap();

    assert!(engine.refresh_concept("Adults").is_err());
    let cached = engine
        .execute(&Description::concept("Adults"), QueryOptions::count())
        .unwrap();
    assert_eq!(cached.count, Some(3));
    assert!(cached.errors.is_empty());
}

#[test]
fn test_refresh_unknown_concept() {
    let (_store, engine) = engine_with_people();
    assert!(engine.refresh_concept("Nobody").unwrap().is_none());
    assert!(!engine.delete_concept_cache("Nobody").unwrap());
}

#[test]
fn test_resolve_concept() {
    let (_store, engine) = engine_with_people();
    let resolved = engine.resolve_concept("Adults").unwrap().unwrap();
    assert!(resolved.materializations.is_empty());
    assert!(resolved.issues.is_empty());
    assert!(engine.resolve_concept("Missing").unwrap().is_none());
}
