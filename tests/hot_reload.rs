//! Concurrent lookups while the registry is being replaced

mod common;

use common::{builtins, node};
use placement_core::PlacementId;
use placement_filter::country::CountryCode;
use placement_filter::handle::PlacementHandle;
use placement_filter::PlacementConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const US_ONLY: &str = r#"10:country("us");11:country("us")"#;
const DE_ONLY: &str = r#"10:country("de");11:country("de")"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_a_partial_registry() {
    let handle = Arc::new(PlacementHandle::new(US_ONLY.parse().unwrap()));
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let handle = Arc::clone(&handle);
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let us = node(CountryCode::US);
                let de = node(CountryCode::DE);
                let mut checks = 0u64;
                let (a, b) = (PlacementId::new(10), PlacementId::new(11));
                while !stop.load(Ordering::Relaxed) {
                    {
                        let snapshot = handle.snapshot();
                        let registry = &snapshot.registry;
                        // both entries always come from the same load
                        assert_eq!(registry.matches(a, &us), registry.matches(b, &us));
                        assert_eq!(registry.matches(a, &de), registry.matches(b, &de));
                        assert_ne!(registry.matches(a, &us), registry.matches(a, &de));
                    }
                    checks += 1;
                    if checks % 64 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                checks
            })
        })
        .collect();

    for round in 0..50 {
        let next = if round % 2 == 0 { DE_ONLY } else { US_ONLY };
        handle.replace(next.parse().unwrap());
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(handle.version(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_from_tasks() {
    let handle = Arc::new(PlacementHandle::new(builtins()));

    let writers: Vec<_> = (0..16u16)
        .map(|i| {
            let handle = Arc::clone(&handle);
            tokio::task::spawn_blocking(move || {
                handle.update(|registry| {
                    registry.load_definitions(&format!(r#"{}:placement(1) && country("!de")"#, 100 + i))
                })
            })
        })
        .collect();

    for writer in writers {
        assert_eq!(writer.await.unwrap().unwrap(), 1);
    }

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.version, 16);
    assert_eq!(snapshot.registry.user_defined().count(), 16);
    assert!(snapshot
        .registry
        .matches(PlacementId::new(107), &node(CountryCode::FR)));
}

#[tokio::test]
async fn test_reload_from_file() {
    let file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
    let handle = PlacementHandle::new(builtins());

    let mut config = PlacementConfig::example();
    config.to_file(file.path()).unwrap();
    handle.replace(PlacementConfig::from_file(file.path()).unwrap().into_registry().unwrap());
    assert!(handle.matches(PlacementId::new(10), &node(CountryCode::US)));

    config.placements.retain(|entry| entry.id != PlacementId::new(10));
    config.to_file(file.path()).unwrap();
    let before = handle.snapshot().loaded_at;
    handle.replace(PlacementConfig::from_file(file.path()).unwrap().into_registry().unwrap());

    assert!(!handle.matches(PlacementId::new(10), &node(CountryCode::US)));
    assert_eq!(handle.version(), 2);
    assert!(handle.snapshot().loaded_at >= before);
}
