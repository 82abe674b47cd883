use std::sync::Arc;

use semql::cache::{HierarchyCache, IdCache};
use semql::config::Settings;
use semql::engine::QueryEngine;
use semql::model::{Comparator, DataValue, Description, EntityPage, Property, NS_MAIN};
use semql::planner::{QueryOptions, SegmentGraphBuilder, Services};
use semql::store::SqliteStore;

struct Fixture {
    services: Services,
    engine: QueryEngine,
}

fn fixture() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let age = Property::new("Age");
    let knows = Property::new("Knows");
    for (name, years, category) in [
        ("Alice", 30.0, "Person"),
        ("Bob", 17.0, "Person"),
        ("Rex", 4.0, "Dog"),
        ("Tom", 9.0, "Cat"),
    ] {
        let page = EntityPage::new(name, NS_MAIN);
        store
            .add_instance(&page, &EntityPage::category(category))
            .unwrap();
        store
            .add_property_value(&page, &age, &DataValue::Number(years))
            .unwrap();
    }
    store
        .add_property_value(
            &EntityPage::new("Alice", NS_MAIN),
            &knows,
            &DataValue::Page(EntityPage::new("Rex", NS_MAIN)),
        )
        .unwrap();

    let settings = Arc::new(Settings::default());
    let ids = Arc::new(IdCache::new());
    let hierarchy = Arc::new(HierarchyCache::new());
    let services = Services::new(store.clone(), ids.clone(), hierarchy.clone(), settings.clone());
    let engine = QueryEngine::with_caches(store, ids, hierarchy, (*settings).clone());
    Fixture { services, engine }
}

fn samples() -> Vec<Description> {
    vec![
        Description::class("Person"),
        Description::classes(["Dog", "Cat"]),
        Description::value("Age", Comparator::Less, DataValue::Number(10.0)),
        Description::some_property("Knows", Description::class("Dog")),
        Description::and([
            Description::class("Person"),
            Description::value("Age", Comparator::Greater, DataValue::Number(20.0)),
        ]),
        Description::or([Description::class("Dog"), Description::namespace(NS_MAIN)]),
    ]
}

impl Fixture {
    fn count(&self, description: &Description) -> Option<u64> {
        self.engine
            .execute(description, QueryOptions::count())
            .unwrap()
            .count
    }

    fn titles(&self, description: &Description) -> Vec<String> {
        self.engine
            .execute(description, QueryOptions::instances())
            .unwrap()
            .rows
            .into_iter()
            .map(|row| row.title)
            .collect()
    }
}

#[test]
fn test_build_is_deterministic() {
    let fx = fixture();
    let builder = SegmentGraphBuilder::new(&fx.services);
    for description in samples() {
        let first = builder.build(&description).unwrap();
        let second = builder.build(&description.clone()).unwrap();
        assert_eq!(first, second, "{}", description);

        let debug = |d: &Description| {
            fx.engine
                .execute(d, QueryOptions::debug())
                .unwrap()
                .debug
                .unwrap()
        };
        assert_eq!(debug(&description), debug(&description), "{}", description);
    }
}

#[test]
fn test_conjunction_with_thing_is_absorbed() {
    let fx = fixture();
    let builder = SegmentGraphBuilder::new(&fx.services);
    for description in samples() {
        let absorbed = Description::and([Description::Thing, description.clone()]);
        assert_eq!(
            builder.build(&description).unwrap(),
            builder.build(&absorbed).unwrap(),
            "{}",
            description
        );
        assert_eq!(fx.titles(&description), fx.titles(&absorbed));
    }
}

#[test]
fn test_conjunction_with_nothing_is_empty() {
    let fx = fixture();
    let builder = SegmentGraphBuilder::new(&fx.services);
    for description in samples() {
        let empty = Description::and([description.clone(), Description::nothing()]);
        assert!(builder.build(&empty).unwrap().is_empty_match(), "{}", description);
        assert_eq!(fx.count(&empty), Some(0));
    }
}

#[test]
fn test_disjunction_with_nothing_is_identity() {
    let fx = fixture();
    let builder = SegmentGraphBuilder::new(&fx.services);
    for description in samples() {
        let widened = Description::or([Description::nothing(), description.clone()]);
        assert_eq!(
            builder.build(&description).unwrap(),
            builder.build(&widened).unwrap(),
            "{}",
            description
        );
    }
}

#[test]
fn test_disjunction_with_thing_matches_everything() {
    let fx = fixture();
    let everything = fx.count(&Description::Thing);
    for description in samples() {
        let widened = Description::or([description.clone(), Description::Thing]);
        assert_eq!(fx.count(&widened), everything, "{}", description);
    }
}

#[test]
fn test_conjunction_is_commutative() {
    let fx = fixture();
    let samples = samples();
    for a in &samples {
        for b in &samples {
            let ab = Description::and([a.clone(), b.clone()]);
            let ba = Description::and([b.clone(), a.clone()]);
            assert_eq!(fx.titles(&ab), fx.titles(&ba), "{} / {}", a, b);
        }
    }
}

#[test]
fn test_disjunction_is_union() {
    let fx = fixture();
    let samples = samples();
    for a in &samples {
        for b in &samples {
            let mut expected: Vec<String> = fx.titles(a);
            expected.extend(fx.titles(b));
            expected.sort();
            expected.dedup();

            let mut union = fx.titles(&Description::or([a.clone(), b.clone()]));
            union.sort();
            assert_eq!(union, expected, "{} / {}", a, b);
        }
    }
}
