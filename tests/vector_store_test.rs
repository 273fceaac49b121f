use std::fs;

use sha2::{Digest, Sha256};
use topicsieve::{EmbeddingProvider, StoreError, VectorSource, VectorStore, VectorTable};

const TABLE: &str = "cat -5.0 1.0 0.0\nstock -6.0 0.0 1.0\n";

fn hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[test]
fn test_table_paths() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = VectorStore::new(dir.path().join("vectors"))?;
    assert!(store.root().exists());

    let path = store.table_path("en_small");
    assert!(path.ends_with("en_small/vectors.txt"));
    assert!(!store.is_downloaded("en_small"));
    assert!(matches!(store.downloaded_path("en_small"), Err(StoreError::NotDownloaded(_))));
    Ok(())
}

#[test]
fn test_verify_cached_table() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = VectorStore::new(dir.path())?;
    let source = VectorSource::new("en_small", "https://example.invalid/en_small.txt", hash(TABLE.as_bytes()));

    // Missing table
    assert!(!store.verify(&source)?);

    let path = store.table_path(&source.name);
    fs::create_dir_all(path.parent().unwrap())?;
    fs::write(&path, TABLE)?;
    assert!(store.verify(&source)?);
    assert_eq!(store.downloaded_path(&source.name)?, path);

    let table = VectorTable::from_file(&path)?;
    assert_eq!(table.dimensions(), 2);
    assert_eq!(table.len(), 2);

    // Corrupt file and verify
    fs::write(&path, "corrupted data")?;
    assert!(!store.verify(&source)?);

    store.remove_download(&source.name)?;
    assert!(!store.is_downloaded(&source.name));
    Ok(())
}

#[test]
fn test_ensure_downloaded_uses_verified_cache() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = VectorStore::new(dir.path())?;
    // The URL is never contacted when the cached copy verifies.
    let source = VectorSource::new("cached", "http://127.0.0.1:1/cached.txt", hash(TABLE.as_bytes()));

    let path = store.table_path(&source.name);
    fs::create_dir_all(path.parent().unwrap())?;
    fs::write(&path, TABLE)?;

    assert_eq!(tokio_test::block_on(store.ensure_downloaded(&source))?, path);
    Ok(())
}

#[tokio::test]
async fn test_failed_download_reports_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let store = VectorStore::new(dir.path())?;
    let source = VectorSource::new("missing", "http://127.0.0.1:1/missing.txt", hash(b""));

    let result = store.ensure_downloaded(&source).await;
    assert!(matches!(result, Err(StoreError::DownloadError(_))));
    assert!(!store.is_downloaded(&source.name));
    Ok(())
}
