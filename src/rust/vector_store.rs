use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Environment variable overriding the cache root
pub const CACHE_ENV: &str = "TOPICSIEVE_CACHE";

const TABLE_FILE: &str = "vectors.txt";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Vector table not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Download failed with status {0}")]
    DownloadStatus(u16),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Vector table verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

/// Where a pretrained vector table can be fetched from and its expected SHA-256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSource {
    pub name: String,
    pub url: String,
    pub sha256: String,
}

impl VectorSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            sha256: sha256.into().to_lowercase(),
        }
    }

    /// Derives a cache name from the last path segment of the URL.
    pub fn from_url(url: impl Into<String>, sha256: impl Into<String>) -> Self {
        let url = url.into();
        let name = url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .unwrap_or("vectors")
            .to_string();
        Self::new(name, url, sha256)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Local cache of downloaded vector tables, verified by SHA-256.
#[derive(Clone)]
pub struct VectorStore {
    root: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl VectorStore {
    /// Creates a new VectorStore in the default cache directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_dir())
    }

    /// Returns the default cache directory path
    pub fn get_default_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var(CACHE_ENV) {
            return PathBuf::from(path).join("vectors");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("topicsieve").join("vectors");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("topicsieve").join("vectors");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("topicsieve").join("vectors")
    }

    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(TABLE_FILE)
    }

    pub fn is_downloaded(&self, name: &str) -> bool {
        let path = self.table_path(name);
        log::debug!("Vector table path: {:?} (exists: {})", path, path.exists());
        path.exists()
    }

    /// Path of a table that must already be present.
    pub fn downloaded_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let path = self.table_path(name);
        if path.exists() {
            Ok(path)
        } else {
            Err(StoreError::NotDownloaded(name.to_string()))
        }
    }

    fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, StoreError> {
        log::info!("Verifying file: {:?}", path);
        let bytes = fs::read(path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Calculated hash: {}", hash);
        log::debug!("Expected hash:   {}", expected_hash);
        Ok(hash == expected_hash)
    }

    /// `Ok(false)` when the table is missing or its hash does not match.
    pub fn verify(&self, source: &VectorSource) -> Result<bool, StoreError> {
        let path = self.table_path(&source.name);
        if !path.exists() {
            log::info!("Vector table {:?} does not exist", path);
            return Ok(false);
        }
        self.verify_file(&path, &source.sha256)
    }

    /// Downloads the table, verifying it before it is written to the cache.
    pub async fn download(&self, source: &VectorSource) -> Result<PathBuf, StoreError> {
        let _lock = self.download_lock.lock().await;
        let path = self.table_path(&source.name);

        log::info!("Downloading vector table from {} to {:?}", source.url, path);
        let response = reqwest::get(&source.url).await?;
        log::info!("Download response status: {}", response.status());
        if !response.status().is_success() {
            return Err(StoreError::DownloadStatus(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = sha256_hex(&bytes);
        if hash != source.sha256 {
            log::error!("Vector table hash mismatch: expected {}, got {}", source.sha256, hash);
            return Err(StoreError::HashMismatch {
                expected: source.sha256.clone(),
                actual: hash,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &bytes)?;

        if !self.verify_file(&path, &source.sha256)? {
            return Err(self.discard_unverified(&source.name));
        }

        log::info!("Vector table downloaded and verified successfully");
        Ok(path)
    }

    /// Removes a table that failed verification. A failed removal is logged;
    /// the verification failure is what gets reported.
    fn discard_unverified(&self, name: &str) -> StoreError {
        if let Err(e) = self.remove_download(name) {
            log::warn!("Failed to remove unverified vector table '{}': {}", name, e);
        }
        StoreError::VerificationFailed
    }

    pub fn remove_download(&self, name: &str) -> Result<(), StoreError> {
        let path = self.table_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Ensures that a table is downloaded and verified.
    /// If it doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_downloaded(&self, source: &VectorSource) -> Result<PathBuf, StoreError> {
        if !self.is_downloaded(&source.name) {
            log::info!("Vector table '{}' not found, downloading...", source.name);
            return self.download(source).await;
        }

        if self.verify(source)? {
            log::info!("Vector table '{}' verified", source.name);
            Ok(self.table_path(&source.name))
        } else {
            log::warn!("Vector table '{}' failed verification, re-downloading", source.name);
            self.remove_download(&source.name)?;
            self.download(source).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dir_honours_env() {
        env::set_var(CACHE_ENV, "/tmp/topicsieve-test-cache");
        let path = VectorStore::get_default_dir();
        env::remove_var(CACHE_ENV);
        assert_eq!(path, PathBuf::from("/tmp/topicsieve-test-cache/vectors"));
    }

    #[test]
    fn test_source_name_from_url() {
        let source = VectorSource::from_url("https://example.com/tables/en_small.txt?dl=1", "ABC");
        assert_eq!(source.name, "en_small.txt");
        assert_eq!(source.sha256, "abc");

        let source = VectorSource::from_url("", "abc");
        assert_eq!(source.name, "vectors");
    }

    #[test]
    fn test_source_name_never_leaves_cache_root() {
        for url in ["https://example.com/tables/..", "https://example.com/tables/../", "https://example.com/."] {
            assert_eq!(VectorSource::from_url(url, "abc").name, "vectors", "{}", url);
        }

        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(dir.path()).unwrap();
        let source = VectorSource::from_url("https://example.com/tables/..?x=1", "abc");
        assert!(store.table_path(&source.name).starts_with(store.root()));
    }

    #[test]
    fn test_discard_unverified_reports_verification_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(dir.path()).unwrap();
        // A directory in place of the table file makes removal fail.
        fs::create_dir_all(store.table_path("stuck")).unwrap();

        let err = store.discard_unverified("stuck");
        assert!(matches!(err, StoreError::VerificationFailed));
        assert!(store.table_path("stuck").is_dir());

        let path = store.table_path("plain");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
        assert!(matches!(store.discard_unverified("plain"), StoreError::VerificationFailed));
        assert!(!path.exists());
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
