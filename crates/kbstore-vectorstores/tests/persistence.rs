use kbstore_vectorstores::persistence::{read_snapshot, vector_storage_path};
use kbstore_vectorstores::{BasicVectorDb, BasicVectorDbConfig, ChunkMetadata, KbError, VectorDb};
use tempfile::TempDir;

fn chunk(doc_id: &str, chunk_index: usize) -> ChunkMetadata {
    ChunkMetadata::new(doc_id, chunk_index, format!("Header{chunk_index}"), format!("Text{chunk_index}"))
}

fn config(dir: &TempDir) -> BasicVectorDbConfig {
    BasicVectorDbConfig::new("test_db", dir.path().to_string_lossy().into_owned())
}

#[tokio::test]
async fn save_and_load() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir).with_auto_save(false)).unwrap();
    db.add_vectors(
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        vec![chunk("1", 0), chunk("2", 1)],
    )
    .await
    .unwrap();
    db.save().await.unwrap();

    let fresh = BasicVectorDb::new(config(&dir)).unwrap();
    fresh.load().await.unwrap();

    let metadata = fresh.metadata().await;
    assert_eq!(metadata.len(), 2);
    assert_eq!(metadata[0].doc_id, "1");
    assert_eq!(metadata[1].doc_id, "2");
}

#[tokio::test]
async fn snapshot_lives_at_derived_path() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    let expected = dir.path().join("vector_storage").join("test_db.json");
    assert_eq!(db.storage_path(), expected.as_path());
    assert_eq!(
        vector_storage_path(&dir.path().to_string_lossy(), "test_db"),
        expected
    );

    db.save().await.unwrap();
    assert!(expected.exists());
}

#[tokio::test]
async fn insertion_order_survives_many_batches() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();

    let mut expected = Vec::new();
    for batch in 0..5usize {
        let metadata: Vec<ChunkMetadata> = (0..3).map(|i| chunk(&format!("doc{batch}"), i)).collect();
        let vectors: Vec<Vec<f32>> = (0..3)
            .map(|i| vec![batch as f32 + 0.25, i as f32 - 1.0, 1.0 / 3.0])
            .collect();
        expected.extend(metadata.clone());
        db.add_vectors(vectors, metadata).await.unwrap();
    }
    db.save().await.unwrap();

    let fresh = BasicVectorDb::open(config(&dir)).await.unwrap();
    assert_eq!(fresh.metadata().await, expected);
    assert_eq!(fresh.vectors().await, db.vectors().await);
}

#[tokio::test]
async fn vectors_round_trip_bit_exact() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    let original = vec![
        vec![0.1f32, -0.333_333_34, 1.0e-30, f32::MAX],
        vec![0.000_123_45, 7.654_321, -0.0, 12345.678],
    ];
    db.add_vectors(original.clone(), vec![chunk("p", 0), chunk("p", 1)])
        .await
        .unwrap();

    let fresh = BasicVectorDb::open(config(&dir)).await.unwrap();
    let reloaded = fresh.vectors().await;
    for (a, b) in original.iter().flatten().zip(reloaded.iter().flatten()) {
        assert_eq!(a.to_bits() & 0x7fff_ffff, b.to_bits() & 0x7fff_ffff);
    }
}

#[tokio::test]
async fn add_vectors_auto_saves() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    db.add_vectors(vec![vec![1.0, 0.0]], vec![chunk("1", 0)])
        .await
        .unwrap();
    assert!(db.storage_path().exists());

    let snapshot = read_snapshot(db.storage_path()).await.unwrap().unwrap();
    assert_eq!(snapshot.kb_id, "test_db");
    assert_eq!(snapshot.dimension, Some(2));
    assert_eq!(snapshot.metadata, vec![chunk("1", 0)]);
}

#[tokio::test]
async fn auto_save_off_leaves_disk_alone() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir).with_auto_save(false)).unwrap();
    db.add_vectors(vec![vec![1.0, 0.0]], vec![chunk("1", 0)])
        .await
        .unwrap();
    db.remove_document("1").await.unwrap();
    assert!(!db.storage_path().exists());
}

#[tokio::test]
async fn remove_then_save_then_reload() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    db.add_vectors(
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        vec![chunk("1", 0), chunk("2", 1)],
    )
    .await
    .unwrap();

    let hits = db.search(&[1.0, 0.0], 1, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.doc_id, "1");
    assert!(hits[0].similarity >= 0.99);

    db.remove_document("1").await.unwrap();
    assert_eq!(db.get_num_vectors().await.unwrap(), 1);
    db.save().await.unwrap();

    let fresh = BasicVectorDb::new(config(&dir)).unwrap();
    fresh.load().await.unwrap();
    assert_eq!(fresh.get_num_vectors().await.unwrap(), 1);
    assert_eq!(fresh.metadata().await[0].doc_id, "2");
}

#[tokio::test]
async fn load_without_snapshot_keeps_state() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir).with_auto_save(false)).unwrap();
    db.load().await.unwrap();
    assert_eq!(db.get_num_vectors().await.unwrap(), 0);

    db.add_vectors(vec![vec![1.0, 0.0]], vec![chunk("1", 0)])
        .await
        .unwrap();
    db.load().await.unwrap();
    assert_eq!(db.get_num_vectors().await.unwrap(), 1);
}

#[tokio::test]
async fn load_overwrites_in_memory_rows() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir).with_auto_save(false)).unwrap();
    db.add_vectors(vec![vec![1.0, 0.0]], vec![chunk("saved", 0)])
        .await
        .unwrap();
    db.save().await.unwrap();

    db.add_vectors(vec![vec![0.0, 1.0]], vec![chunk("unsaved", 0)])
        .await
        .unwrap();
    assert_eq!(db.get_num_vectors().await.unwrap(), 2);

    db.load().await.unwrap();
    let metadata = db.metadata().await;
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0].doc_id, "saved");
    // The index must follow the reloaded rows.
    let hits = db.search(&[0.0, 1.0], 5, None).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn delete_removes_snapshot_but_not_memory() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    db.add_vectors(
        vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        vec![chunk("1", 0), chunk("2", 1)],
    )
    .await
    .unwrap();

    assert!(db.storage_path().exists());
    db.delete().await.unwrap();
    assert!(!db.storage_path().exists());
    assert_eq!(db.get_num_vectors().await.unwrap(), 2);

    // Deleting again is harmless.
    db.delete().await.unwrap();
}

#[tokio::test]
async fn failed_auto_save_rolls_back_the_batch() {
    let dir = TempDir::new().unwrap();
    // A regular file where the storage root should be makes directory
    // creation fail.
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();
    let db = BasicVectorDb::new(BasicVectorDbConfig::new(
        "kb",
        blocker.to_string_lossy().into_owned(),
    ))
    .unwrap();

    let err = db
        .add_vectors(vec![vec![1.0, 0.0]], vec![chunk("1", 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, KbError::Io(_)));
    assert_eq!(db.get_num_vectors().await.unwrap(), 0);
    assert_eq!(db.dimension().await, None);
}

#[tokio::test]
async fn failed_auto_save_keeps_removed_rows() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    db.add_vectors(
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
        vec![chunk("1", 0), chunk("2", 0), chunk("1", 1)],
    )
    .await
    .unwrap();

    // Swap the snapshot directory for a regular file so the next write fails.
    let storage = db.storage_path().parent().unwrap().to_path_buf();
    std::fs::remove_dir_all(&storage).unwrap();
    std::fs::write(&storage, b"x").unwrap();

    // An absent id never reaches the disk.
    db.remove_document("missing").await.unwrap();

    let err = db.remove_document("1").await.unwrap_err();
    assert!(matches!(err, KbError::Io(_)));
    assert_eq!(db.get_num_vectors().await.unwrap(), 3);
    assert_eq!(
        db.metadata().await,
        vec![chunk("1", 0), chunk("2", 0), chunk("1", 1)]
    );
    let hits = db.search(&[1.0, 0.0], 1, None).await.unwrap();
    assert_eq!(hits[0].metadata, chunk("1", 0));
}

#[tokio::test]
async fn snapshot_for_other_kb_is_rejected() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_string_lossy().into_owned();
    let a = BasicVectorDb::new(BasicVectorDbConfig::new("a", root.clone())).unwrap();
    a.add_vectors(vec![vec![1.0]], vec![chunk("1", 0)]).await.unwrap();

    let b = BasicVectorDb::new(BasicVectorDbConfig::new("b", root)).unwrap();
    std::fs::create_dir_all(b.storage_path().parent().unwrap()).unwrap();
    std::fs::copy(a.storage_path(), b.storage_path()).unwrap();

    let err = b.load().await.unwrap_err();
    assert!(matches!(err, KbError::Serialization(_)));
    assert_eq!(b.get_num_vectors().await.unwrap(), 0);
}

#[tokio::test]
async fn corrupt_snapshot_is_a_serialization_error() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    std::fs::create_dir_all(db.storage_path().parent().unwrap()).unwrap();
    std::fs::write(db.storage_path(), b"{not json").unwrap();

    let err = db.load().await.unwrap_err();
    assert!(matches!(err, KbError::Serialization(_)));
}

#[tokio::test]
async fn snapshot_with_unequal_arrays_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = BasicVectorDb::new(config(&dir)).unwrap();
    std::fs::create_dir_all(db.storage_path().parent().unwrap()).unwrap();
    let body = serde_json::json!({
        "format_version": 1,
        "kb_id": "test_db",
        "dimension": 2,
        "vectors": [[1.0, 0.0]],
        "metadata": [],
    });
    std::fs::write(db.storage_path(), body.to_string()).unwrap();

    let err = db.load().await.unwrap_err();
    assert!(matches!(err, KbError::Serialization(_)));
}
