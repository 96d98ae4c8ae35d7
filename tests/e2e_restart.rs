//! Restart behavior: journal replay warms the cache, counters are recovered
//! from the store, and nothing is minted twice.

mod common;

use std::path::PathBuf;

use common::{catalog_file, measurement};
use pretty_assertions::assert_eq;
use roadtwin::{EntityType, MemoryStore, ShadowKind, TwinConfig, TwinSync};

fn config(dir: &std::path::Path) -> TwinConfig {
    let mut config = TwinConfig::default();
    config.catalog_path = catalog_file(dir);
    config.journal_dir = Some(dir.join("shadows"));
    config.timestamp.max_jitter_minutes = 0;
    config
}

#[tokio::test]
async fn test_restart_reuses_shadows_and_counters() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let store = MemoryStore::new();

    {
        let twin = TwinSync::from_config(&config, store.clone()).await.unwrap();
        twin.process(&measurement("TL451", 78, 1)).await.unwrap();
        twin.process(&measurement("TL77", 5, 1)).await.unwrap();
        assert_eq!(twin.resolver().stats().catalog_lookups, 2);
    }

    let journal: PathBuf = dir.path().join("shadows").join("road_shadows.csv");
    assert!(journal.exists());

    let twin = TwinSync::from_config(&config, store.clone()).await.unwrap();
    assert_eq!(twin.resolver().cache().len(ShadowKind::Road), 2);
    assert_eq!(twin.synchronizer().counters().get(EntityType::Road), 2);
    assert_eq!(twin.synchronizer().counters().get(EntityType::RoadSegment), 2);

    let outcome = twin.process(&measurement("TL451", 59, 2)).await.unwrap();
    assert!(!outcome.is_created());
    assert_eq!(twin.resolver().stats().catalog_lookups, 0);

    let outcome = twin.process(&measurement("TL452", 33, 2)).await.unwrap();
    assert_eq!(outcome.segment_id(), "RS003");
    assert_eq!(outcome.observation_id(), "TFO003");
    assert_eq!(store.count(EntityType::Road), 2);
}

#[tokio::test]
async fn test_missing_catalog_file_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.catalog_path = dir.path().join("nope.csv");
    let err = TwinSync::from_config(&config, MemoryStore::new()).await.err().unwrap();
    assert_eq!(err.kind(), roadtwin::ErrorKind::Catalog);
}
