use std::sync::Arc;

use semql::config::Settings;
use semql::engine::QueryEngine;
use semql::error::{IssueKind, QueryError};
use semql::model::{Comparator, DataValue, Description, EntityPage, Property, NS_MAIN};
use semql::planner::QueryOptions;
use semql::store::{SqliteStore, Store};

/// `n` categories with one member each, plus a page in none of them.
fn categories(n: usize) -> (Arc<SqliteStore>, QueryEngine) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    for i in 0..n {
        store
            .add_instance(
                &EntityPage::new(&format!("Member {:02}", i), NS_MAIN),
                &EntityPage::category(&format!("Group {:02}", i)),
            )
            .unwrap();
    }
    store
        .create_entity(&EntityPage::new("Outsider", NS_MAIN))
        .unwrap();

    let engine = QueryEngine::new(store.clone(), Settings::default());
    (store, engine)
}

/// `n` pages with `Age` values `0..n`.
fn ages(n: usize) -> (Arc<SqliteStore>, QueryEngine) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let age = Property::new("Age");
    for i in 0..n {
        store
            .add_property_value(
                &EntityPage::new(&format!("Person {:02}", i), NS_MAIN),
                &age,
                &DataValue::Number(i as f64),
            )
            .unwrap();
    }
    let engine = QueryEngine::new(store.clone(), Settings::default());
    (store, engine)
}

fn any_age(n: usize) -> Description {
    Description::or(
        (0..n).map(|i| Description::value("Age", Comparator::Equal, DataValue::Number(i as f64))),
    )
}

fn any_group(n: usize) -> Description {
    Description::or((0..n).map(|i| Description::class(&format!("Group {:02}", i))))
}

fn temporary_tables(store: &SqliteStore) -> i64 {
    store
        .query("SELECT COUNT(*) FROM sqlite_temp_master WHERE name LIKE 'smw_tmp_%'")
        .unwrap()[0]
        .get_i64(0)
        .unwrap()
}

#[test]
fn test_wide_disjunction_uses_one_temporary_table() {
    let (_store, engine) = categories(50);
    let debug = engine
        .execute(&any_group(50), QueryOptions::debug())
        .unwrap()
        .debug
        .unwrap();
    assert_eq!(debug.matches("CREATE TEMPORARY TABLE").count(), 1, "{}", debug);
    assert_eq!(debug.matches("INSERT OR IGNORE INTO").count(), 50);
    let select = debug.split(";\n").last().unwrap();
    assert!(!select.contains(" IN (SELECT DISTINCT"), "{}", select);
}

#[test]
fn test_wide_disjunction_results() {
    let (store, engine) = categories(50);
    let result = engine
        .execute(&any_group(50), QueryOptions::instances().limit(100))
        .unwrap();
    assert_eq!(result.rows.len(), 50);
    assert!(!result.has_more);
    assert_eq!(result.rows[0].title, "Member_00");
    assert_eq!(result.rows[49].title, "Member_49");
    assert_eq!(temporary_tables(&store), 0);

    let count = engine
        .execute(&any_group(50), QueryOptions::count())
        .unwrap();
    assert_eq!(count.count, Some(50));
    assert_eq!(temporary_tables(&store), 0);
}

#[test]
fn test_narrow_disjunction_is_inline() {
    let (_store, engine) = categories(20);
    let result = engine
        .execute(&any_group(20), QueryOptions::debug())
        .unwrap();
    let debug = result.debug.unwrap();
    assert!(!debug.contains("CREATE TEMPORARY TABLE"), "{}", debug);
    assert_eq!(debug.matches(" IN (SELECT DISTINCT").count(), 20);

    let result = engine
        .execute(&any_group(5), QueryOptions::instances())
        .unwrap();
    assert_eq!(result.rows.len(), 5);
}

#[test]
fn test_arity_threshold() {
    let (_store, engine) = categories(21);
    let debug = engine
        .execute(&any_group(21), QueryOptions::debug())
        .unwrap()
        .debug
        .unwrap();
    assert_eq!(debug.matches("CREATE TEMPORARY TABLE").count(), 1);
}

#[test]
fn test_wide_disjunction_inside_conjunction() {
    let (store, engine) = categories(30);
    for i in [3, 7, 11] {
        store
            .add_instance(
                &EntityPage::new(&format!("Member {:02}", i), NS_MAIN),
                &EntityPage::category("Chosen"),
            )
            .unwrap();
    }
    let query = Description::and([Description::class("Chosen"), any_group(30)]);
    let result = engine.execute(&query, QueryOptions::instances()).unwrap();
    let titles: Vec<&str> = result.rows.iter().map(|row| row.title.as_str()).collect();
    assert_eq!(titles, vec!["Member_03", "Member_07", "Member_11"]);
    assert_eq!(temporary_tables(&store), 0);
}

#[test]
fn test_fifty_value_branches_with_default_settings() {
    let (store, engine) = ages(60);
    let debug = engine
        .execute(&any_age(50), QueryOptions::debug())
        .unwrap()
        .debug
        .unwrap();
    assert_eq!(debug.matches("CREATE TEMPORARY TABLE").count(), 1, "{}", debug);
    assert_eq!(debug.matches("INSERT OR IGNORE INTO").count(), 50);

    let result = engine
        .execute(&any_age(50), QueryOptions::count())
        .unwrap();
    assert_eq!(result.count, Some(50));
    assert!(result.errors.is_empty());
    assert_eq!(temporary_tables(&store), 0);
}

#[test]
fn test_too_large_query_is_rejected() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = QueryEngine::new(store, Settings::default());
    let err = engine
        .execute(&any_group(65), QueryOptions::instances())
        .unwrap_err();
    match err {
        QueryError::Compilation(issues) => {
            assert_eq!(issues[0].kind, IssueKind::QueryTooComplex)
        }
        other => panic!("unexpected error: {}", other),
    }
}
