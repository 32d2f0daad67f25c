//! Snapshot persistence.
//!
//! The store is written as a single JSON document so restarts do not begin
//! with a cold cache.
//!
//! # File Format
//!
//! ```text
//! {
//!   "version": 1,
//!   "saved_at": "<rfc3339>",
//!   "entries": [
//!     { "kind": "team-table", "id": "...", "value": ...,
//!       "fetched_at": "<rfc3339>", "ttl": { "secs": 3600, "nanos": 0 } }
//!   ]
//! }
//! ```
//!
//! Unknown fields are ignored when loading.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use fussball_core::constants::{MAX_SNAPSHOT_BYTES, SNAPSHOT_FORMAT_VERSION};
use fussball_core::error::{FussballError, Result};
use fussball_core::{Payload, ResourceKey, ResourceKind};

use crate::store::{Entry, RestoreReport, Snapshot, Store};

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: Vec<SnapshotRecord>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    kind: ResourceKind,
    id: String,
    value: Payload,
    fetched_at: DateTime<Utc>,
    ttl: Duration,
}

/// Serializes a snapshot to the on-disk JSON document.
pub fn encode(snapshot: &Snapshot, saved_at: DateTime<Utc>) -> Result<Vec<u8>> {
    let file = SnapshotFile {
        version: SNAPSHOT_FORMAT_VERSION,
        saved_at,
        entries: snapshot
            .entries
            .iter()
            .map(|(key, entry)| SnapshotRecord {
                kind: key.kind,
                id: key.id.clone(),
                value: entry.value.clone(),
                fetched_at: entry.fetched_at,
                ttl: entry.ttl,
            })
            .collect(),
    };
    Ok(serde_json::to_vec(&file)?)
}

/// Parses the on-disk JSON document.
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    let file: SnapshotFile = serde_json::from_slice(bytes)?;
    if file.version != SNAPSHOT_FORMAT_VERSION {
        return Err(FussballError::Persistence(format!(
            "unsupported snapshot version {} (expected {})",
            file.version, SNAPSHOT_FORMAT_VERSION
        )));
    }

    // Keys were normalized when first built; records keep their file order.
    let entries = file
        .entries
        .into_iter()
        .map(|record| {
            let key = ResourceKey {
                kind: record.kind,
                id: record.id,
            };
            let entry = Entry {
                value: record.value,
                fetched_at: record.fetched_at,
                ttl: record.ttl,
            };
            (key, entry)
        })
        .collect();

    Ok(Snapshot { entries })
}

/// Reads and writes the cache snapshot file.
pub struct PersistenceManager {
    /// Path to the snapshot file
    path: PathBuf,
    /// Larger files are rejected on load
    max_bytes: u64,
    /// Successful writes so far
    writes: AtomicU64,
    /// Serializes writers sharing the temp file
    write_lock: Mutex<()>,
}

impl PersistenceManager {
    /// Creates a manager for the snapshot at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_bytes: MAX_SNAPSHOT_BYTES,
            writes: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Overrides the size limit for loaded files.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of snapshots written successfully.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp: OsString = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    /// Writes `snapshot` atomically: temp file, fsync, rename.
    #[instrument(skip(self, snapshot), fields(entries = snapshot.len()))]
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let contents = encode(snapshot, Utc::now())?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(path = ?self.path, bytes = contents.len(), "Snapshot saved");
        Ok(())
    }

    /// Snapshots `store` and writes it.
    pub async fn save_store(&self, store: &Store) -> Result<()> {
        self.save(&store.snapshot()).await
    }

    /// Reads the snapshot file.
    ///
    /// A missing file is an empty snapshot. An oversized or unparsable file
    /// is an error.
    #[instrument(skip(self))]
    pub async fn try_load(&self) -> Result<Snapshot> {
        let metadata = match fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No snapshot file");
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.len() > self.max_bytes {
            return Err(FussballError::Persistence(format!(
                "snapshot is {} bytes, limit is {}",
                metadata.len(),
                self.max_bytes
            )));
        }

        let bytes = fs::read(&self.path).await?;
        decode(&bytes)
    }

    /// Reads the snapshot file, treating any failure as an empty snapshot.
    pub async fn load(&self) -> Snapshot {
        match self.try_load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Ignoring unreadable snapshot");
                Snapshot::default()
            }
        }
    }

    /// Loads the snapshot file into `store`.
    pub async fn restore_into(&self, store: &Store) -> RestoreReport {
        let snapshot = self.load().await;
        let report = store.restore(snapshot);
        info!(
            loaded = report.loaded,
            stale = report.stale,
            skipped = report.skipped,
            "Restored cache snapshot"
        );
        report
    }

    /// Saves `store` every `interval` until shutdown, then once more.
    ///
    /// With a `retention`, entries stale for longer than it are purged
    /// before each periodic save.
    pub async fn run_periodic(
        self: Arc<Self>,
        store: Arc<Store>,
        interval: Duration,
        retention: Option<Duration>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "Periodic snapshots enabled");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Some(retention) = retention {
                        let purged = store.purge_expired(retention);
                        if purged > 0 {
                            info!(purged, "Purged long-expired entries");
                        }
                    }
                    if let Err(e) = self.save_store(&store).await {
                        warn!(error = %e, "Periodic snapshot failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.save_store(&store).await {
            warn!(error = %e, "Final snapshot failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn entry(value: serde_json::Value, secs: i64, ttl: u64) -> Entry {
        Entry {
            value: Arc::new(value),
            fetched_at: Utc.timestamp_opt(1_716_600_000 + secs, 0).unwrap(),
            ttl: Duration::from_secs(ttl),
        }
    }

    fn sample() -> Snapshot {
        Snapshot {
            entries: vec![
                (ResourceKey::club_teams("C1"), entry(json!([{ "id": "T1" }]), 0, 7200)),
                (ResourceKey::team_table("T1"), entry(json!(null), 10, 3600)),
                (ResourceKey::search("fc test"), entry(json!([]), 20, 900)),
            ],
        }
    }

    #[test]
    fn test_encode_decode_empty() {
        let bytes = encode(&Snapshot::default(), Utc::now()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Snapshot::default());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let doc = json!({
            "version": 1,
            "saved_at": "2024-05-25T12:00:00Z",
            "writer": "newer build",
            "entries": [{
                "kind": "team-table",
                "id": "T1",
                "value": { "entries": [] },
                "fetched_at": "2024-05-25T11:00:00Z",
                "ttl": { "secs": 3600, "nanos": 0 },
                "etag": "abc"
            }]
        });
        let snapshot = decode(&serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries[0].0, ResourceKey::team_table("T1"));
        assert_eq!(snapshot.entries[0].1.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_decode_rejects_other_version() {
        let doc = json!({ "version": 99, "saved_at": "2024-05-25T12:00:00Z", "entries": [] });
        let err = decode(&serde_json::to_vec(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, FussballError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PersistenceManager::new(dir.path().join("nested/cache.json"));

        manager.save(&sample()).await.unwrap();
        assert_eq!(manager.try_load().await.unwrap(), sample());
        assert_eq!(manager.writes(), 1);
        assert!(!manager.temp_path().exists());
    }

    #[test]
    fn test_decode_keeps_ids_verbatim() {
        let snapshot = Snapshot {
            entries: vec![
                (
                    ResourceKey { kind: ResourceKind::Search, id: "FC Test".into() },
                    entry(json!([]), 0, 900),
                ),
                (
                    ResourceKey { kind: ResourceKind::ClubTeams, id: " C1 ".into() },
                    entry(json!([]), 5, 7200),
                ),
            ],
        };
        let bytes = encode(&snapshot, Utc::now()).unwrap();
        let loaded = decode(&bytes).unwrap();

        assert_eq!(loaded.entries[0].0.id, "FC Test");
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_save_load_empty_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PersistenceManager::new(dir.path().join("cache.json"));

        manager.save(&Snapshot::default()).await.unwrap();
        assert!(manager.try_load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PersistenceManager::new(dir.path().join("absent.json"));

        assert!(manager.try_load().await.unwrap().is_empty());
        assert!(manager.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_yields_working_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{\"version\": 1, \"entries\": [trunc").unwrap();
        let manager = PersistenceManager::new(&path);

        assert!(manager.try_load().await.is_err());

        let store = Store::new();
        let report = manager.restore_into(&store).await;
        assert_eq!(report.loaded, 0);

        store.put(ResourceKey::club_info("C"), Arc::new(json!(1)), Duration::from_secs(60));
        manager.save_store(&store).await.unwrap();
        assert_eq!(manager.try_load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversize_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PersistenceManager::new(dir.path().join("cache.json")).with_max_bytes(16);

        manager.save(&sample()).await.unwrap();
        assert!(manager.try_load().await.is_err());
        assert!(manager.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_periodic_final_save_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(PersistenceManager::new(dir.path().join("cache.json")));
        let store = Arc::new(Store::new());
        store.put(ResourceKey::club_teams("C"), Arc::new(json!([])), Duration::from_secs(60));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(manager.clone().run_periodic(
            store,
            Duration::from_secs(3600),
            None,
            rx,
        ));
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(manager.writes(), 1);
        assert_eq!(manager.try_load().await.unwrap().len(), 1);
    }

    fn arb_key() -> impl Strategy<Value = ResourceKey> {
        (0..ResourceKind::ALL.len(), "[A-Za-z0-9 _-]{0,12}").prop_map(|(i, id)| ResourceKey {
            kind: ResourceKind::ALL[i],
            id,
        })
    }

    fn arb_value() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            Just(json!(null)),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z ]{0,16}".prop_map(|s| json!(s)),
            prop::collection::vec("[a-z]{1,8}", 0..4).prop_map(|v| json!({ "items": v })),
        ]
    }

    fn arb_entry() -> impl Strategy<Value = Entry> {
        (arb_value(), 0i64..10_000_000, 0u32..1_000_000_000, 1u64..100_000).prop_map(
            |(value, secs, nanos, ttl)| Entry {
                value: Arc::new(value),
                fetched_at: Utc.timestamp_opt(1_700_000_000 + secs, nanos).unwrap(),
                ttl: Duration::from_secs(ttl),
            },
        )
    }

    proptest! {
        #[test]
        fn prop_decode_encode_roundtrip(
            entries in prop::collection::vec((arb_key(), arb_entry()), 0..16)
        ) {
            let snapshot = Snapshot { entries };
            let bytes = encode(&snapshot, Utc::now()).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), snapshot);
        }
    }
}
