// Consistency tests for concurrent mutations against the filesystem backend
// Ensures readers never observe partially written objects

mod common;

use bytes::Bytes;
use common::seeded_bytes;
use satchel_storage::{FilesystemBackend, ObjectStore, StorageError};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::Duration;

#[tokio::test]
async fn test_concurrent_create_during_listing() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(FilesystemBackend::new(temp_dir.path()).await.unwrap());

    for i in 0..100 {
        backend
            .put(&format!("attachments/{i}_a.bin"), Bytes::from(vec![i as u8]))
            .await
            .unwrap();
    }

    let backend_for_list = backend.clone();
    let backend_for_create = backend.clone();

    let list_handle = tokio::spawn(async move {
        let mut keys = Vec::new();
        for _ in 0..4 {
            keys = backend_for_list.list("attachments").await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        keys
    });

    let create_handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        for i in 100..150 {
            backend_for_create
                .put(&format!("attachments/{i}_a.bin"), Bytes::from(vec![i as u8]))
                .await
                .unwrap();
        }
    });

    let (keys, create_result) = tokio::join!(list_handle, create_handle);
    let keys = keys.unwrap();
    create_result.unwrap();

    assert!(
        keys.len() >= 100,
        "Should see at least original objects, got {}",
        keys.len()
    );
    assert!(
        keys.len() <= 150,
        "Should not see more than total objects, got {}",
        keys.len()
    );
    let unique: HashSet<_> = keys.iter().collect();
    for i in 0..100 {
        assert!(
            unique.contains(&format!("attachments/{i}_a.bin")),
            "pre-existing key {i} missing from listing"
        );
    }
}

#[tokio::test]
async fn test_concurrent_delete_is_reported_once() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(FilesystemBackend::new(temp_dir.path()).await.unwrap());
    backend
        .put("attachments/7_clip.mp4", seeded_bytes(7, 4096))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let backend = backend.clone();
        handles.push(tokio::spawn(async move {
            backend.delete("attachments/7_clip.mp4").await
        }));
    }

    let mut deleted = 0;
    let mut not_found = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => deleted += 1,
            Err(StorageError::NotFound(_)) => not_found += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(deleted, 1);
    assert_eq!(not_found, 7);
    assert!(!backend.exists("attachments/7_clip.mp4").await.unwrap());
}

#[tokio::test]
async fn test_readers_see_whole_objects_during_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(FilesystemBackend::new(temp_dir.path()).await.unwrap());

    let first = seeded_bytes(1, 256 * 1024);
    let second = seeded_bytes(2, 256 * 1024);
    backend.put("attachments/1_big", first.clone()).await.unwrap();

    let writer = {
        let backend = backend.clone();
        let (first, second) = (first.clone(), second.clone());
        tokio::spawn(async move {
            for i in 0..20 {
                let data = if i % 2 == 0 { second.clone() } else { first.clone() };
                backend.put("attachments/1_big", data).await.unwrap();
            }
        })
    };

    for _ in 0..50 {
        let data = backend.get("attachments/1_big").await.unwrap();
        assert!(
            data == first || data == second,
            "reader observed a torn write of {} bytes",
            data.len()
        );
    }

    writer.await.unwrap();

    // Only the target survives; temp files are renamed away.
    let keys = backend.list("attachments").await.unwrap();
    assert_eq!(keys, vec!["attachments/1_big".to_string()]);
}
