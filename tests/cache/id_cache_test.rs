use std::sync::Arc;
use std::thread;

use semql::cache::{EntityIdLookup, HierarchyCache, IdCache};
use semql::config::Settings;
use semql::engine::QueryEngine;
use semql::model::{Description, EntityPage, NS_MAIN, REDIRECT_MARKER};
use semql::planner::QueryOptions;
use semql::store::SqliteStore;

fn people(store: &SqliteStore, n: usize) -> Vec<EntityPage> {
    (0..n)
        .map(|i| {
            let page = EntityPage::new(&format!("Person {:03}", i), NS_MAIN);
            store
                .add_instance(&page, &EntityPage::category("Person"))
                .unwrap();
            page
        })
        .collect()
}

#[test]
fn test_round_trip_through_store() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let cache = Arc::new(IdCache::new());
    let lookup = EntityIdLookup::new(store.clone(), cache.clone());
    let page = EntityPage::new("Alice", NS_MAIN).with_sort_key("Liddell, Alice");
    let id = store.create_entity(&page).unwrap();

    assert_eq!(lookup.resolve(&page.key()).unwrap(), Some((id, "Liddell, Alice".into())));
    let cached = cache.entity(id).unwrap();
    assert_eq!(cached.title, "Alice");
    assert_eq!(cached.sort_key.as_deref(), Some("Liddell, Alice"));
    assert_eq!(cache.lookup(&page.fingerprint()), Some((id, "Liddell, Alice".into())));
}

#[test]
fn test_repeated_store_is_idempotent() {
    let cache = IdCache::new();
    let page = EntityPage::new("Alice", NS_MAIN);
    for _ in 0..3 {
        cache.store(&page, 5, "Alice").unwrap();
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.entity(5).unwrap().id, Some(5));
}

#[test]
fn test_redirect_companion_through_lookup() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let lookup = EntityIdLookup::new(store.clone(), Arc::new(IdCache::new()));
    let source = EntityPage::new("Bobby", NS_MAIN);
    let source_id = store
        .create_redirect(&source, &EntityPage::new("Bob", NS_MAIN))
        .unwrap();

    let redirect = source.clone().with_interwiki(REDIRECT_MARKER);
    assert_eq!(lookup.id_of(&redirect).unwrap(), Some(source_id));
    assert_eq!(lookup.cache().lookup(&source.fingerprint()).map(|(id, _)| id), Some(0));
    assert_eq!(lookup.id_of(&source).unwrap(), None);
}

#[test]
fn test_invalidation_forces_reload() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let lookup = EntityIdLookup::new(store.clone(), Arc::new(IdCache::new()));
    let page = EntityPage::new("Alice", NS_MAIN);
    let id = store.create_entity(&page).unwrap();

    assert_eq!(lookup.id_of(&page).unwrap(), Some(id));
    lookup.cache().invalidate_by_id(id);
    assert!(lookup.cache().is_empty());
    assert_eq!(lookup.id_of(&page).unwrap(), Some(id));
    assert_eq!(lookup.cache().len(), 1);
}

#[test]
fn test_concurrent_writers_agree() {
    let cache = Arc::new(IdCache::new());
    let pages: Vec<EntityPage> = (0..100)
        .map(|i| EntityPage::new(&format!("Page {}", i), NS_MAIN))
        .collect();

    thread::scope(|s| {
        for _ in 0..8 {
            let cache = cache.clone();
            let pages = &pages;
            s.spawn(move || {
                for (i, page) in pages.iter().enumerate() {
                    let id = i as i64 + 1;
                    cache.store(page, id, &page.default_sort_key()).unwrap();
                    assert_eq!(cache.lookup(&page.fingerprint()).map(|(id, _)| id), Some(id));
                }
            });
        }
    });

    assert_eq!(cache.len(), 100);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(cache.entity(i as i64 + 1).unwrap().title, page.title);
    }
}

#[test]
fn test_concurrent_lookups_share_one_cache() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pages = people(&store, 40);
    let lookup = Arc::new(EntityIdLookup::new(store.clone(), Arc::new(IdCache::new())));

    let resolved: Vec<Vec<Option<i64>>> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lookup = lookup.clone();
                let pages = &pages;
                s.spawn(move || {
                    pages
                        .iter()
                        .map(|page| lookup.id_of(page).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for ids in &resolved[1..] {
        assert_eq!(ids, &resolved[0]);
    }
    assert!(resolved[0].iter().all(Option::is_some));
    assert_eq!(lookup.cache().len(), 40);
}

#[test]
fn test_concurrent_queries_share_caches() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    people(&store, 30);
    let ids = Arc::new(IdCache::new());
    let hierarchy = Arc::new(HierarchyCache::new());

    let counts: Vec<Option<u64>> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = QueryEngine::with_caches(
                    store.clone(),
                    ids.clone(),
                    hierarchy.clone(),
                    Settings::default(),
                );
                s.spawn(move || {
                    engine
                        .execute(&Description::class("Person"), QueryOptions::count())
                        .unwrap()
                        .count
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(counts, vec![Some(30); 4]);
    // The category id landed in the shared cache.
    assert!(ids.lookup(&EntityPage::category("Person").fingerprint()).is_some());
}
