//! Allocator uniqueness under concurrency: many tasks allocating against
//! one registry file must never produce a duplicate identifier.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mesa::adapters::FileIdRegistry;
use mesa::ports::IdAllocator;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn a_thousand_concurrent_allocations_have_zero_duplicates() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(
        FileIdRegistry::new(dir.path().join("ids.txt"))
            .with_backoff_base(Duration::from_millis(2))
            .with_lock_retries(14),
    );

    let mut handles = Vec::new();
    for _ in 0..1000 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move { registry.allocate().await }));
    }

    let mut issued = HashSet::new();
    for handle in handles {
        let id = handle.await.unwrap().expect("allocation failed");
        assert!(issued.insert(id.clone()), "duplicate identifier {}", id);
    }
    assert_eq!(issued.len(), 1000);

    // the registry file records every issued identifier
    let content = std::fs::read_to_string(dir.path().join("ids.txt")).unwrap();
    let on_disk: HashSet<&str> = content.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(on_disk.len(), 1000);
    for id in &issued {
        assert!(on_disk.contains(id.as_str()));
    }
}

#[tokio::test]
async fn two_registries_on_the_same_file_stay_disjoint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ids.txt");

    let a = FileIdRegistry::new(&path).with_backoff_base(Duration::from_millis(2));
    let b = FileIdRegistry::new(&path).with_backoff_base(Duration::from_millis(2));

    let mut issued = HashSet::new();
    for _ in 0..25 {
        assert!(issued.insert(a.allocate().await.unwrap()));
        assert!(issued.insert(b.allocate().await.unwrap()));
    }
    assert_eq!(issued.len(), 50);
}
