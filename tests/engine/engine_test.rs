use std::sync::Arc;

use semql::config::Settings;
use semql::engine::QueryEngine;
use semql::error::{IssueKind, QueryError};
use semql::model::{
    Comparator, DataValue, Description, EntityPage, Property, NS_MAIN, REDIRECT_MARKER,
};
use semql::planner::{QueryOptions, SortKey};
use semql::store::SqliteStore;

fn person() -> EntityPage {
    EntityPage::category("Person")
}

/// Alice (30), Bob (17), Carol (18) and Dave (45) are people; Eve (40) is not.
fn people() -> (Arc<SqliteStore>, QueryEngine) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let age = Property::new("Age");
    for (name, years, is_person) in [
        ("Alice", 30.0, true),
        ("Bob", 17.0, true),
        ("Carol", 18.0, true),
        ("Dave", 45.0, true),
        ("Eve", 40.0, false),
    ] {
        let page = EntityPage::new(name, NS_MAIN);
        if is_person {
            store.add_instance(&page, &person()).unwrap();
        }
        store
            .add_property_value(&page, &age, &DataValue::Number(years))
            .unwrap();
    }
    let engine = QueryEngine::new(store.clone(), Settings::default());
    (store, engine)
}

fn adults() -> Description {
    Description::and([
        Description::class("Person"),
        Description::value("Age", Comparator::GreaterEq, DataValue::Number(18.0)),
    ])
}

fn titles(rows: &[EntityPage]) -> Vec<&str> {
    rows.iter().map(|row| row.title.as_str()).collect()
}

#[test]
fn test_class_and_value_conjunction() {
    let (_store, engine) = people();
    let result = engine.execute(&adults(), QueryOptions::instances()).unwrap();

    assert_eq!(titles(&result.rows), vec!["Alice", "Carol", "Dave"]);
    assert!(!result.has_more);
    assert!(result.count.is_none());
    assert!(result.errors.is_empty());
    assert!(result.rows.iter().all(|row| row.id.is_some()));
}

#[test]
fn test_count_mode() {
    let (_store, engine) = people();
    let result = engine.execute(&adults(), QueryOptions::count()).unwrap();
    assert_eq!(result.count, Some(3));
    assert!(result.rows.is_empty());

    let everyone = engine
        .execute(&Description::class("Person"), QueryOptions::count())
        .unwrap();
    assert_eq!(everyone.count, Some(4));
}

#[test]
fn test_pagination() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    for i in 0..25 {
        let page = EntityPage::new(&format!("Member {:02}", i), NS_MAIN);
        store.add_instance(&page, &person()).unwrap();
    }
    let engine = QueryEngine::new(store, Settings::default());
    let query = Description::class("Person");

    let first = engine
        .execute(&query, QueryOptions::instances().limit(10))
        .unwrap();
    assert_eq!(first.rows.len(), 10);
    assert!(first.has_more);
    assert_eq!(first.rows[0].title, "Member_00");
    assert_eq!(first.rows[9].title, "Member_09");

    let last = engine
        .execute(&query, QueryOptions::instances().limit(10).offset(20))
        .unwrap();
    assert_eq!(last.rows.len(), 5);
    assert!(!last.has_more);
    assert_eq!(last.rows[0].title, "Member_20");
}

#[test]
fn test_exactly_limit_matches_has_no_more() {
    let (_store, engine) = people();
    let result = engine
        .execute(&adults(), QueryOptions::instances().limit(3))
        .unwrap();
    assert_eq!(result.rows.len(), 3);
    assert!(!result.has_more);
}

#[test]
fn test_sort_by_property() {
    let (_store, engine) = people();
    let query = Description::and([
        Description::class("Person"),
        Description::value("Age", Comparator::GreaterEq, DataValue::Number(0.0)),
    ]);
    let result = engine
        .execute(&query, QueryOptions::instances().sort(SortKey::desc("Age")))
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Dave", "Alice", "Carol", "Bob"]);
    assert!(result.errors.is_empty());
}

#[test]
fn test_sort_by_entity_descending() {
    let (_store, engine) = people();
    let result = engine
        .execute(
            &Description::class("Person"),
            QueryOptions::instances().sort(SortKey::entity(false)),
        )
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Dave", "Carol", "Bob", "Alice"]);
}

#[test]
fn test_unresolvable_sort_is_a_warning() {
    let (_store, engine) = people();
    let result = engine
        .execute(
            &Description::class("Person"),
            QueryOptions::instances().sort(SortKey::asc("Height")),
        )
        .unwrap();
    assert_eq!(result.rows.len(), 4);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, IssueKind::UnresolvableSort);
    assert_eq!(result.rows[0].title, "Alice");
}

#[test]
fn test_redirects_are_excluded() {
    let (store, engine) = people();
    let robert = EntityPage::new("Robert", NS_MAIN);
    store
        .create_redirect(&robert, &EntityPage::new("Bob", NS_MAIN))
        .unwrap();
    store
        .add_instance(&robert.with_interwiki(REDIRECT_MARKER), &person())
        .unwrap();

    let result = engine
        .execute(&Description::class("Person"), QueryOptions::instances())
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Alice", "Bob", "Carol", "Dave"]);
}

#[test]
fn test_unknown_property_fails_query() {
    let (_store, engine) = people();
    let query = Description::and([
        Description::class("Person"),
        Description::value("Height", Comparator::Greater, DataValue::Number(1.5)),
    ]);
    match engine.execute(&query, QueryOptions::instances()) {
        Err(QueryError::Compilation(issues)) => {
            assert!(issues.iter().any(|issue| issue.is_fatal()));
            assert_eq!(issues[0].kind, IssueKind::UnknownProperty);
        }
        other => panic!("expected a compilation error, got {:?}", other),
    }
}

#[test]
fn test_unknown_class_is_empty() {
    let (_store, engine) = people();
    let result = engine
        .execute(&Description::class("Robot"), QueryOptions::instances())
        .unwrap();
    assert!(result.rows.is_empty());
    assert!(!result.has_more);
    assert!(result.errors.is_empty());
}

#[test]
fn test_debug_mode() {
    let (_store, engine) = people();
    let result = engine
        .execute(&adults(), QueryOptions::debug().limit(10))
        .unwrap();
    let debug = result.debug.unwrap();
    assert!(debug.starts_with("SELECT DISTINCT"), "{}", debug);
    assert!(debug.contains("LIMIT 11 OFFSET 0"), "{}", debug);
    assert!(debug.contains("smw_di_number"), "{}", debug);
    assert!(result.rows.is_empty());
}

#[test]
fn test_subcategory_members() {
    let (store, engine) = people();
    let student = EntityPage::category("Student");
    store.add_subclass(&student, &person()).unwrap();
    store
        .add_instance(&EntityPage::new("Frank", NS_MAIN), &student)
        .unwrap();

    let result = engine
        .execute(&Description::class("Person"), QueryOptions::count())
        .unwrap();
    assert_eq!(result.count, Some(5));

    let students = engine
        .execute(&Description::class("Student"), QueryOptions::instances())
        .unwrap();
    assert_eq!(titles(&students.rows), vec!["Frank"]);
}

#[test]
fn test_text_pattern() {
    let (store, engine) = people();
    let name = Property::new("Nickname");
    store
        .add_property_value(
            &EntityPage::new("Alice", NS_MAIN),
            &name,
            &DataValue::Text("Ally".into()),
        )
        .unwrap();
    store
        .add_property_value(
            &EntityPage::new("Dave", NS_MAIN),
            &name,
            &DataValue::Text("Davey".into()),
        )
        .unwrap();

    let query = Description::value("Nickname", Comparator::Like, DataValue::Text("Al*".into()));
    let result = engine.execute(&query, QueryOptions::instances()).unwrap();
    assert_eq!(titles(&result.rows), vec!["Alice"]);
}

#[test]
fn test_page_values_and_nested_property() {
    let (store, engine) = people();
    let knows = Property::new("Knows");
    let alice = EntityPage::new("Alice", NS_MAIN);
    let eve = EntityPage::new("Eve", NS_MAIN);
    store
        .add_property_value(&alice, &knows, &DataValue::Page(EntityPage::new("Bob", NS_MAIN)))
        .unwrap();
    store
        .add_property_value(&eve, &knows, &DataValue::Page(EntityPage::new("Dave", NS_MAIN)))
        .unwrap();
    store
        .add_property_value(
            &EntityPage::new("Dave", NS_MAIN),
            &knows,
            &DataValue::Page(EntityPage::new("Zed", NS_MAIN)),
        )
        .unwrap();

    let knows_bob = Description::value(
        "Knows",
        Comparator::Equal,
        DataValue::Page(EntityPage::new("Bob", NS_MAIN)),
    );
    let result = engine.execute(&knows_bob, QueryOptions::instances()).unwrap();
    assert_eq!(titles(&result.rows), vec!["Alice"]);

    let knows_a_person = Description::some_property("Knows", Description::class("Person"));
    let result = engine
        .execute(&knows_a_person, QueryOptions::instances())
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Alice", "Eve"]);

    let knows_anyone = Description::some_property("Knows", Description::Thing);
    let result = engine.execute(&knows_anyone, QueryOptions::count()).unwrap();
    assert_eq!(result.count, Some(3));
}

#[test]
fn test_subproperty_values_match_parent() {
    let (store, engine) = people();
    let relative = Property::new("Relative");
    let sibling = Property::new("Sibling");
    store.add_subproperty(&sibling, &relative).unwrap();
    store
        .add_property_value(
            &EntityPage::new("Carol", NS_MAIN),
            &sibling,
            &DataValue::Page(EntityPage::new("Dave", NS_MAIN)),
        )
        .unwrap();

    let query = Description::value(
        "Relative",
        Comparator::Equal,
        DataValue::Page(EntityPage::new("Dave", NS_MAIN)),
    );
    let result = engine.execute(&query, QueryOptions::instances()).unwrap();
    assert_eq!(titles(&result.rows), vec!["Carol"]);
}

fn shallow_hierarchy() -> (Arc<SqliteStore>, QueryEngine) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut settings = Settings::default();
    settings.hierarchy.max_depth = 2;
    let engine = QueryEngine::new(store.clone(), settings);
    (store, engine)
}

#[test]
fn test_deep_subcategories_are_dropped() {
    let (store, engine) = shallow_hierarchy();
    for level in 0..4 {
        let category = EntityPage::category(&format!("Level {}", level));
        if level > 0 {
            store
                .add_subclass(&category, &EntityPage::category(&format!("Level {}", level - 1)))
                .unwrap();
        }
        store
            .add_instance(&EntityPage::new(&format!("Member {}", level), NS_MAIN), &category)
            .unwrap();
    }

    let result = engine
        .execute(&Description::class("Level 0"), QueryOptions::instances())
        .unwrap();
    assert_eq!(titles(&result.rows), vec!["Member_0", "Member_1", "Member_2"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, IssueKind::RecursionLimitExceeded);
}

#[test]
fn test_deep_subproperties_are_dropped() {
    let (store, engine) = shallow_hierarchy();
    let target = EntityPage::new("Dave", NS_MAIN);
    for level in 0..4 {
        let property = Property::new(&format!("Related {}", level));
        if level > 0 {
            store
                .add_subproperty(&property, &Property::new(&format!("Related {}", level - 1)))
                .unwrap();
        }
        store
            .add_property_value(
                &EntityPage::new(&format!("Member {}", level), NS_MAIN),
                &property,
                &DataValue::Page(target.clone()),
            )
            .unwrap();
    }

    let query = Description::value("Related 0", Comparator::Equal, DataValue::Page(target));
    let result = engine.execute(&query, QueryOptions::instances()).unwrap();
    assert_eq!(titles(&result.rows), vec!["Member_0", "Member_1", "Member_2"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, IssueKind::RecursionLimitExceeded);
}

#[test]
fn test_results_populate_id_cache() {
    let (_store, engine) = people();
    let result = engine.execute(&adults(), QueryOptions::instances()).unwrap();
    for row in &result.rows {
        let cached = engine.id_cache().entity(row.id.unwrap()).unwrap();
        assert_eq!(cached.title, row.title);
    }
}
