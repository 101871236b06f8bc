use kbstore::core::{ChunkMetadata, KbError, MetadataFilter, VectorDb};
use kbstore::vectorstores::{from_descriptor, BasicVectorDb, BasicVectorDbConfig, SearchStrategy};

#[tokio::main]
async fn main() -> Result<(), KbError> {
    // Store operations log through tracing; RUST_LOG=debug shows searches.
    tracing_subscriber::fmt::init();

    let root = std::env::temp_dir().join("kb_quickstart");
    let config = BasicVectorDbConfig::new("test_db", root.to_string_lossy().into_owned());
    let db = BasicVectorDb::new(config)?;

    println!("=== Add ===");
    db.add_vectors(
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        vec![
            ChunkMetadata::new("1", 0, "Header1", "Text1"),
            ChunkMetadata::new("2", 1, "Header2", "Text2"),
            ChunkMetadata::new("2", 2, "Header3", "Text3"),
        ],
    )
    .await?;
    println!("{} vectors at {}", db.get_num_vectors().await?, db.storage_path().display());

    println!("\n=== Search ===");
    for hit in db.search(&[1.0, 0.0], 2, None).await? {
        println!("  {} #{}  {:.4}", hit.metadata.doc_id, hit.metadata.chunk_index, hit.similarity);
    }

    println!("\n=== Filtered brute-force search ===");
    let filter = MetadataFilter::equals("doc_id", "2");
    for hit in db
        .search_with_strategy(&[1.0, 0.0], 10, Some(&filter), SearchStrategy::BruteForce)
        .await?
    {
        println!("  {} #{}  {:.4}", hit.metadata.doc_id, hit.metadata.chunk_index, hit.similarity);
    }

    println!("\n=== Remove and reload ===");
    db.remove_document("1").await?;
    let descriptor = db.to_descriptor();
    println!("descriptor: {descriptor}");

    let reopened = from_descriptor(descriptor)?;
    reopened.load().await?;
    println!("reloaded {} vectors", reopened.get_num_vectors().await?);

    reopened.delete().await?;
    Ok(())
}
