// SQLite metadata store tests: ordering, tombstones, transactional deletes

use satchel_core::media::MediaRef;
use satchel_core::{ChunkId, RecordState, TodoId, TodoRecord};
use satchel_metadata::{
    ChunkRepo, ChunkStats, MetadataError, MetadataStore, SqliteStore, TodoRepo,
};
use tempfile::TempDir;

async fn open_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::new(dir.path().join("satchel.db"), 1)
        .await
        .unwrap();
    (dir, store)
}

/// A second connection to the store's database, for raw SQL.
async fn side_connection(dir: &TempDir) -> sqlx::SqlitePool {
    sqlx::SqlitePool::connect(&format!("sqlite:{}", dir.path().join("satchel.db").display()))
        .await
        .unwrap()
}

fn chunked_record(id: i64, chunks: u32) -> TodoRecord {
    let todo_id = TodoId::from_raw(id);
    TodoRecord::new(
        todo_id,
        format!("todo {id}"),
        Some(MediaRef::Chunked {
            content_type: "video/mp4".to_string(),
            name: "clip.mp4".to_string(),
            size: u64::from(chunks) * 4,
            chunk_ids: (0..chunks).map(|i| ChunkId::new(todo_id, i)).collect(),
        }),
    )
}

async fn put_chunks(store: &SqliteStore, record: &TodoRecord) {
    for id in record.media.as_ref().unwrap().chunk_ids() {
        store.put_chunk(id, &[id.seq() as u8; 4]).await.unwrap();
    }
}

#[tokio::test]
async fn test_list_orders_by_id_regardless_of_insert_order() {
    let (_dir, store) = open_store().await;

    for id in [30, 10, 20] {
        store
            .insert_todo(&TodoRecord::new(TodoId::from_raw(id), "t", None))
            .await
            .unwrap();
    }

    let ids: Vec<i64> = store
        .list_todos()
        .await
        .unwrap()
        .iter()
        .map(|r| r.id.as_i64())
        .collect();
    assert_eq!(ids, vec![10, 20, 30]);
    assert_eq!(store.max_todo_id().await.unwrap(), Some(30));
}

#[tokio::test]
async fn test_insert_duplicate_id_rejected() {
    let (_dir, store) = open_store().await;
    let record = TodoRecord::new(TodoId::from_raw(5), "a", None);
    store.insert_todo(&record).await.unwrap();

    match store.insert_todo(&record).await {
        Err(MetadataError::AlreadyExists(_)) => {}
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
}

#[tokio::test]
async fn test_media_survives_storage() {
    let (_dir, store) = open_store().await;
    let record = chunked_record(1_700_000_000_001, 3);
    store.insert_todo(&record).await.unwrap();

    let loaded = store.get_todo(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.media, record.media);
    assert_eq!(loaded.text, record.text);
    assert_eq!(loaded.state, RecordState::Committed);
    assert!(store.get_todo(TodoId::from_raw(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_legacy_media_row_is_readable() {
    let (dir, store) = open_store().await;
    let raw = side_connection(&dir).await;

    sqlx::query(
        "INSERT INTO todos (id, text, media, state, schema_version, created_at) VALUES (?, ?, ?, 'committed', 0, ?)",
    )
    .bind(77_i64)
    .bind("old")
    .bind(r#"{"type":"image/png","name":"cat.png","size":8,"chunkIds":["77_0"]}"#)
    .bind(time::OffsetDateTime::now_utc())
    .execute(&raw)
    .await
    .unwrap();

    let record = store.get_todo(TodoId::from_raw(77)).await.unwrap().unwrap();
    let media = record.media.unwrap();
    assert_eq!(media.chunk_ids(), &[ChunkId::parse("77_0").unwrap()]);
    assert_eq!(media.content_type(), "image/png");
}

#[tokio::test]
async fn test_tombstone_and_delete() {
    let (_dir, store) = open_store().await;
    let id = TodoId::from_raw(9);
    store
        .insert_todo(&TodoRecord::new(id, "x", None))
        .await
        .unwrap();

    store.mark_pending_delete(id).await.unwrap();
    store.mark_pending_delete(id).await.unwrap();
    assert!(store.get_todo(id).await.unwrap().unwrap().is_pending_delete());

    store.delete_todo(id).await.unwrap();
    assert!(matches!(
        store.delete_todo(id).await,
        Err(MetadataError::NotFound(_))
    ));
    assert!(matches!(
        store.mark_pending_delete(id).await,
        Err(MetadataError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_todo_with_chunks_removes_both() {
    let (_dir, store) = open_store().await;
    let keep = chunked_record(100, 2);
    let gone = chunked_record(200, 3);
    for record in [&keep, &gone] {
        put_chunks(&store, record).await;
        store.insert_todo(record).await.unwrap();
    }

    let removed = store
        .delete_todo_with_chunks(gone.id, gone.media.as_ref().unwrap().chunk_ids())
        .await
        .unwrap();
    assert_eq!(removed, 3);

    assert!(store.get_todo(gone.id).await.unwrap().is_none());
    let remaining = store.list_chunk_ids().await.unwrap();
    assert_eq!(remaining, keep.media.as_ref().unwrap().chunk_ids().to_vec());
}

#[tokio::test]
async fn test_delete_todo_with_chunks_rolls_back_on_failure() {
    let (dir, store) = open_store().await;
    let raw = side_connection(&dir).await;
    let record = chunked_record(300, 3);
    put_chunks(&store, &record).await;
    store.insert_todo(&record).await.unwrap();

    // Make the record delete fail after the chunk deletes have run.
    sqlx::raw_sql(
        "CREATE TRIGGER refuse_todo_delete BEFORE DELETE ON todos BEGIN SELECT RAISE(ABORT, 'refused'); END;",
    )
    .execute(&raw)
    .await
    .unwrap();

    let result = store
        .delete_todo_with_chunks(record.id, record.media.as_ref().unwrap().chunk_ids())
        .await;
    assert!(matches!(result, Err(MetadataError::Database(_))));

    assert!(store.get_todo(record.id).await.unwrap().is_some());
    assert_eq!(store.list_chunk_ids().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_delete_todo_with_chunks_missing_record_keeps_chunks() {
    let (_dir, store) = open_store().await;
    let record = chunked_record(400, 2);
    put_chunks(&store, &record).await;

    let result = store
        .delete_todo_with_chunks(record.id, record.media.as_ref().unwrap().chunk_ids())
        .await;
    assert!(matches!(result, Err(MetadataError::NotFound(_))));
    assert_eq!(store.list_chunk_ids().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_chunk_crud_and_stats() {
    let (_dir, store) = open_store().await;
    let a0 = ChunkId::new(TodoId::from_raw(1), 0);
    let a1 = ChunkId::new(TodoId::from_raw(1), 1);
    let b0 = ChunkId::new(TodoId::from_raw(2), 0);

    store.put_chunk(&a1, b"world").await.unwrap();
    store.put_chunk(&a0, b"hello ").await.unwrap();
    store.put_chunk(&b0, b"x").await.unwrap();
    store.put_chunk(&b0, b"yz").await.unwrap();

    assert_eq!(store.get_chunk(&a0).await.unwrap().unwrap(), b"hello ");
    assert_eq!(store.get_chunk(&b0).await.unwrap().unwrap(), b"yz");
    assert!(store.chunk_exists(&a1).await.unwrap());
    assert_eq!(store.list_chunk_ids().await.unwrap(), vec![a0, a1, b0]);
    assert_eq!(
        store.chunk_stats().await.unwrap(),
        ChunkStats {
            count: 3,
            total_size: 13,
            files: 2
        }
    );

    assert_eq!(store.delete_chunks(&[a0, a0, b0]).await.unwrap(), 2);
    assert!(store.get_chunk(&a0).await.unwrap().is_none());
    assert_eq!(store.delete_chunks(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reopen_preserves_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("satchel.db");

    {
        let store = SqliteStore::new(&path, 1).await.unwrap();
        store
            .insert_todo(&TodoRecord::new(TodoId::from_raw(11), "persist", None))
            .await
            .unwrap();
        store.close().await;
    }

    let store = SqliteStore::new(&path, 1).await.unwrap();
    let records = store.list_todos().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "persist");
}
