//! On-disk configuration store.
//!
//! Layout next to the configured path:
//! ```text
//! settings.xml            content of the last applied revision
//! settings.xml.revision   JSON metadata (version, checksum, applied_at)
//! settings.xml.tmp        scratch file, only present mid-write
//! ```
//! Both files are replaced with write-temp + fsync + rename, so readers see
//! either the old or the new content, never a partial one.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::StoreConfig;
use crate::store::revision::{checksum, ConfigRevision};
use crate::store::source::FetchError;
use crate::unix_secs;

/// Writing or reading the store failed.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode revision metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sidecar metadata describing the file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RevisionMeta {
    version: u64,
    checksum: String,
    applied_at: u64,
}

/// Result of checking fetched bytes against the last applied revision.
#[derive(Debug)]
pub enum Prepared {
    /// New content, ready to persist.
    Changed(ConfigRevision),
    /// Same content as what is already applied.
    Unchanged(Arc<ConfigRevision>),
}

/// Validates, persists and publishes configuration revisions.
///
/// Writes are not internally serialized; callers hold the reload gate.
pub struct ConfigStore {
    path: PathBuf,
    meta_path: PathBuf,
    max_bytes: usize,
    current: ArcSwapOption<ConfigRevision>,
    /// Highest version ever committed or found on disk.
    last_version: AtomicU64,
    /// Unadopted files found at open; only consulted while `current` is None.
    found: Found,
}

/// Raw bytes of the files present at open, `None` where a file was absent.
#[derive(Default)]
struct Found {
    data: Option<Vec<u8>>,
    meta: Option<Vec<u8>>,
}

impl ConfigStore {
    /// Open the store, adopting the revision on disk if its metadata checks out.
    ///
    /// Files that cannot be adopted are remembered, so a rollback before the
    /// first commit puts them back instead of deleting them.
    pub async fn open(config: &StoreConfig) -> Result<Self, PersistError> {
        let path = config.path.clone();
        let meta_path = sibling(&path, ".revision");

        let meta_raw = read_if_exists(&meta_path).await?;
        let data = read_if_exists(&path).await?;

        let meta = meta_raw.as_deref().and_then(|raw| {
            match serde_json::from_slice::<RevisionMeta>(raw) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!(path = %meta_path.display(), error = %e, "Ignoring unreadable revision metadata");
                    None
                }
            }
        });
        let last_version = meta.as_ref().map(|m| m.version).unwrap_or(0);

        let (current, found) = match (meta, data) {
            (Some(meta), Some(data)) if meta.checksum == checksum(&data) => {
                tracing::info!(
                    path = %path.display(),
                    version = meta.version,
                    checksum = %meta.checksum,
                    "Loaded applied configuration"
                );
                let rev = Arc::new(ConfigRevision::new(meta.version, data));
                (Some(rev), Found::default())
            }
            (meta, data) => {
                match (&meta, &data) {
                    (Some(meta), Some(_)) => tracing::warn!(
                        path = %path.display(),
                        version = meta.version,
                        "Configuration does not match its revision metadata; treating as unknown"
                    ),
                    (None, Some(_)) => tracing::warn!(
                        path = %path.display(),
                        "Configuration has no revision metadata; treating as unknown"
                    ),
                    (_, None) => {
                        tracing::info!(path = %path.display(), "No applied configuration yet")
                    }
                }
                (None, Found { data, meta: meta_raw })
            }
        };

        Ok(Self {
            path,
            meta_path,
            max_bytes: config.max_bytes,
            current: ArcSwapOption::new(current),
            last_version: AtomicU64::new(last_version),
            found,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last successfully applied revision.
    pub fn current(&self) -> Option<Arc<ConfigRevision>> {
        self.current.load_full()
    }

    /// Validate fetched bytes and assign the next version.
    pub fn prepare(&self, data: Vec<u8>) -> Result<Prepared, FetchError> {
        if data.is_empty() {
            return Err(FetchError::Empty);
        }
        if data.len() > self.max_bytes {
            return Err(FetchError::TooLarge {
                size: data.len(),
                limit: self.max_bytes,
            });
        }

        if let Some(current) = self.current() {
            if current.checksum() == checksum(&data) {
                return Ok(Prepared::Unchanged(current));
            }
        }

        let version = self.last_version.load(Ordering::Acquire) + 1;
        Ok(Prepared::Changed(ConfigRevision::new(version, data)))
    }

    /// Atomically write `rev` and its metadata to disk.
    ///
    /// On error the files are as they were before the call: a failed data
    /// write replaced nothing, and a failed metadata write is rolled back.
    pub async fn persist(&self, rev: &ConfigRevision) -> Result<(), PersistError> {
        let meta = encode_meta(rev)?;
        write_atomic(&self.path, rev.data()).await?;

        if let Err(e) = write_atomic(&self.meta_path, &meta).await {
            if let Err(restore_err) = self.restore().await {
                tracing::error!(error = %restore_err, "Failed to roll back partially persisted configuration");
            }
            return Err(e);
        }

        tracing::debug!(
            path = %self.path.display(),
            version = rev.version(),
            size = rev.data().len(),
            "Configuration persisted"
        );
        Ok(())
    }

    /// Publish `rev` as the last applied revision.
    pub fn commit(&self, rev: ConfigRevision) -> Arc<ConfigRevision> {
        let rev = Arc::new(rev);
        self.last_version.fetch_max(rev.version(), Ordering::AcqRel);
        self.current.store(Some(rev.clone()));
        rev
    }

    /// Put the disk back to the last applied revision. Before the first
    /// commit, put back whatever was found at open, or remove the files if
    /// nothing was there.
    pub async fn restore(&self) -> Result<(), PersistError> {
        match self.current() {
            Some(previous) => {
                tracing::warn!(version = previous.version(), "Restoring previous configuration");
                let meta = encode_meta(&previous)?;
                write_atomic(&self.path, previous.data()).await?;
                write_atomic(&self.meta_path, &meta).await
            }
            None => {
                tracing::warn!(path = %self.path.display(), "Restoring configuration found at startup");
                put_back(&self.path, self.found.data.as_deref()).await?;
                put_back(&self.meta_path, self.found.meta.as_deref()).await
            }
        }
    }
}

fn encode_meta(rev: &ConfigRevision) -> Result<Vec<u8>, PersistError> {
    let meta = RevisionMeta {
        version: rev.version(),
        checksum: rev.checksum().to_string(),
        applied_at: unix_secs(SystemTime::now()),
    };
    Ok(serde_json::to_vec_pretty(&meta)?)
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, PersistError> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write `data` to `path`, or remove `path` when there is nothing to write.
async fn put_back(path: &Path, data: Option<&[u8]>) -> Result<(), PersistError> {
    match data {
        Some(data) => write_atomic(path, data).await,
        None => remove_if_exists(path).await,
    }
}

/// `<path><suffix>` in the same directory, so rename stays on one filesystem.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PersistError> {
    let tmp = sibling(path, ".tmp");

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(source) = result {
        match fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %tmp.display(), error = %e, "Failed to remove temporary file")
            }
        }
        return Err(PersistError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    // fsync the directory so the rename itself is durable
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let synced = match fs::File::open(&dir).await {
        Ok(handle) => handle.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = synced {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to sync directory after rename");
    }

    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), PersistError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_config(dir: &Path) -> StoreConfig {
        StoreConfig {
            path: dir.join("settings.xml"),
            max_bytes: 64,
        }
    }

    fn changed(prepared: Prepared) -> ConfigRevision {
        match prepared {
            Prepared::Changed(rev) => rev,
            Prepared::Unchanged(rev) => panic!("expected new revision, got {:?}", rev),
        }
    }

    #[tokio::test]
    async fn test_open_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(&store_config(dir.path())).await.unwrap();
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_prepare_rejects_bad_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(&store_config(dir.path())).await.unwrap();

        assert!(matches!(store.prepare(Vec::new()), Err(FetchError::Empty)));
        assert!(matches!(
            store.prepare(vec![b'x'; 65]),
            Err(FetchError::TooLarge { size: 65, limit: 64 })
        ));
    }

    #[tokio::test]
    async fn test_persist_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        let store = ConfigStore::open(&config).await.unwrap();

        let rev = changed(store.prepare(b"<config>v1</config>".to_vec()).unwrap());
        assert_eq!(rev.version(), 1);
        store.persist(&rev).await.unwrap();
        store.commit(rev);

        assert_eq!(std::fs::read(&config.path).unwrap(), b"<config>v1</config>");
        assert!(!sibling(&config.path, ".tmp").exists());
        let meta: RevisionMeta =
            serde_json::from_slice(&std::fs::read(sibling(&config.path, ".revision")).unwrap())
                .unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(store.current().unwrap().version(), 1);

        let next = changed(store.prepare(b"<config>v2</config>".to_vec()).unwrap());
        assert_eq!(next.version(), 2);
    }

    #[tokio::test]
    async fn test_same_content_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(&store_config(dir.path())).await.unwrap();

        let rev = changed(store.prepare(b"same".to_vec()).unwrap());
        store.persist(&rev).await.unwrap();
        store.commit(rev);

        match store.prepare(b"same".to_vec()).unwrap() {
            Prepared::Unchanged(rev) => assert_eq!(rev.version(), 1),
            Prepared::Changed(rev) => panic!("unexpected new revision {:?}", rev),
        }
    }

    #[tokio::test]
    async fn test_reopen_keeps_version() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        {
            let store = ConfigStore::open(&config).await.unwrap();
            let rev = changed(store.prepare(b"first".to_vec()).unwrap());
            store.persist(&rev).await.unwrap();
            store.commit(rev);
        }

        let store = ConfigStore::open(&config).await.unwrap();
        let current = store.current().unwrap();
        assert_eq!(current.version(), 1);
        assert_eq!(current.data(), b"first");
        assert_eq!(changed(store.prepare(b"second".to_vec()).unwrap()).version(), 2);
    }

    #[tokio::test]
    async fn test_tampered_file_is_unknown_but_versions_continue() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        {
            let store = ConfigStore::open(&config).await.unwrap();
            let rev = changed(store.prepare(b"first".to_vec()).unwrap());
            store.persist(&rev).await.unwrap();
            store.commit(rev);
        }
        std::fs::write(&config.path, b"edited by hand").unwrap();

        let store = ConfigStore::open(&config).await.unwrap();
        assert!(store.current().is_none());
        assert_eq!(changed(store.prepare(b"first".to_vec()).unwrap()).version(), 2);
    }

    #[tokio::test]
    async fn test_restore_previous_revision() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        let store = ConfigStore::open(&config).await.unwrap();

        let v1 = changed(store.prepare(b"v1".to_vec()).unwrap());
        store.persist(&v1).await.unwrap();
        store.commit(v1);

        let v2 = changed(store.prepare(b"v2".to_vec()).unwrap());
        store.persist(&v2).await.unwrap();
        assert_eq!(std::fs::read(&config.path).unwrap(), b"v2");

        store.restore().await.unwrap();
        assert_eq!(std::fs::read(&config.path).unwrap(), b"v1");
        assert_eq!(store.current().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn test_restore_without_previous_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        let store = ConfigStore::open(&config).await.unwrap();

        let v1 = changed(store.prepare(b"v1".to_vec()).unwrap());
        store.persist(&v1).await.unwrap();
        store.restore().await.unwrap();

        assert!(!config.path.exists());
        assert!(!sibling(&config.path, ".revision").exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("missing").join("settings.xml"),
            max_bytes: 64,
        };
        let store = ConfigStore::open(&config).await.unwrap();

        let rev = changed(store.prepare(b"v1".to_vec()).unwrap());
        let err = store.persist(&rev).await.unwrap_err();
        assert!(matches!(err, PersistError::Write { .. }));
        assert!(!config.path.exists());
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_data_write_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        std::fs::write(&config.path, b"operator config").unwrap();
        std::fs::create_dir(sibling(&config.path, ".tmp")).unwrap();

        let store = ConfigStore::open(&config).await.unwrap();
        assert!(store.current().is_none());

        let rev = changed(store.prepare(b"v1".to_vec()).unwrap());
        let err = store.persist(&rev).await.unwrap_err();
        assert!(matches!(err, PersistError::Write { ref path, .. } if *path == config.path));
        assert_eq!(std::fs::read(&config.path).unwrap(), b"operator config");
        assert!(!sibling(&config.path, ".revision").exists());
    }

    #[tokio::test]
    async fn test_failed_metadata_write_puts_found_file_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        let meta_path = sibling(&config.path, ".revision");
        std::fs::write(&config.path, b"operator config").unwrap();
        std::fs::create_dir(sibling(&meta_path, ".tmp")).unwrap();

        let store = ConfigStore::open(&config).await.unwrap();
        let rev = changed(store.prepare(b"v1".to_vec()).unwrap());
        let err = store.persist(&rev).await.unwrap_err();
        assert!(matches!(err, PersistError::Write { ref path, .. } if *path == meta_path));
        assert_eq!(std::fs::read(&config.path).unwrap(), b"operator config");
        assert!(!meta_path.exists());
    }

    #[tokio::test]
    async fn test_restore_before_first_commit_keeps_found_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = store_config(dir.path());
        std::fs::write(&config.path, b"operator config").unwrap();

        let store = ConfigStore::open(&config).await.unwrap();
        let v1 = changed(store.prepare(b"v1".to_vec()).unwrap());
        store.persist(&v1).await.unwrap();
        assert_eq!(std::fs::read(&config.path).unwrap(), b"v1");

        store.restore().await.unwrap();
        assert_eq!(std::fs::read(&config.path).unwrap(), b"operator config");
        assert!(!sibling(&config.path, ".revision").exists());
    }
}
