//! File-based persistence store
//!
//! # Directory Structure
//!
//! ```text
//! {base}/
//! └── {run_id}/
//!     ├── snapshot_00001_decomposing.json[.zst]
//!     ├── snapshot_00002_researching.json[.zst]
//!     ├── iterations.jsonl
//!     ├── report.json
//!     ├── citations.json
//!     ├── lease.json
//!     └── lease.lock
//! ```
//!
//! Snapshots, reports and leases are written to a temporary file and renamed
//! into place, so readers never observe a partial file.
//!
//! Lease changes run under `lease.lock`, created exclusively, so two stores
//! over the same directory (in one process or several) cannot both take a
//! run.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Lease, PersistenceStore, Snapshot};
use crate::error::PersistenceError;
use crate::research::citations::Citation;
use crate::research::state::{IterationRecord, ResearchState, RunPhase};
use crate::research::synthesis::FinalReport;

const ITERATIONS_FILE: &str = "iterations.jsonl";
const REPORT_FILE: &str = "report.json";
const CITATIONS_FILE: &str = "citations.json";
const LEASE_FILE: &str = "lease.json";
const LEASE_LOCK_FILE: &str = "lease.lock";

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);
/// A lock file older than this was left behind by a dead process
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Exclusive lock over a run's lease file; removed on drop
struct LeaseLock {
    path: PathBuf,
}

impl LeaseLock {
    async fn acquire(dir: &Path) -> Result<Self, PersistenceError> {
        let path = dir.join(LEASE_LOCK_FILE);

        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path).await {
                        debug!(path = %path.display(), "Removing stale lease lock");
                        let _ = fs::remove_file(&path).await;
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(PersistenceError::io(format!(
                        "Failed to create lease lock: {}",
                        e
                    )))
                }
            }
        }

        Err(PersistenceError::io(format!(
            "Lease lock still held: {}",
            path.display()
        )))
    }

    async fn is_stale(path: &Path) -> bool {
        match fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified
                .elapsed()
                .map(|age| age > LOCK_STALE_AFTER)
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

impl Drop for LeaseLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Store that keeps each run in its own directory
#[derive(Debug)]
pub struct FileStore {
    base_path: PathBuf,
    compression: bool,
    /// Serializes read-modify-write sequences within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `base_path`; snapshots are zstd-compressed
    /// when `compression` is set
    pub fn new(base_path: impl Into<PathBuf>, compression: bool) -> Self {
        Self {
            base_path: base_path.into(),
            compression,
            write_lock: Mutex::new(()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base_path.join(run_id)
    }

    fn snapshot_path(&self, run_id: &str, sequence: u64, phase: RunPhase) -> PathBuf {
        let extension = if self.compression { "json.zst" } else { "json" };
        self.run_dir(run_id).join(format!(
            "snapshot_{:05}_{}.{}",
            sequence,
            phase.as_str(),
            extension
        ))
    }

    async fn ensure_dir(&self, run_id: &str) -> Result<PathBuf, PersistenceError> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to create {}: {}", dir.display(), e)))?;
        Ok(dir)
    }

    fn compress(data: &[u8]) -> Result<Vec<u8>, PersistenceError> {
        let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3)
            .map_err(|e| PersistenceError::Compression(format!("init failed: {}", e)))?;
        encoder
            .write_all(data)
            .map_err(|e| PersistenceError::Compression(format!("write failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| PersistenceError::Compression(format!("finish failed: {}", e)))
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>, PersistenceError> {
        zstd::stream::decode_all(data)
            .map_err(|e| PersistenceError::Compression(format!("decompression failed: {}", e)))
    }

    /// Write `data` to `path` via temp file + rename
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to create temp file: {}", e)))?;
        file.write_all(data)
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to write data: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to sync file: {}", e)))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to rename file: {}", e)))
    }

    async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(value)?;
        Self::write_atomic(path, &json).await
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Parse the sequence number from a snapshot filename
    fn parse_sequence(path: &Path) -> Option<u64> {
        let filename = path.file_name()?.to_str()?;
        let rest = filename.strip_prefix("snapshot_")?;
        if filename.ends_with(".tmp") {
            return None;
        }
        rest.split('_').next()?.parse().ok()
    }

    /// Snapshot files of a run, sorted by sequence
    async fn list_snapshots(&self, run_id: &str) -> Result<Vec<(u64, PathBuf)>, PersistenceError> {
        let dir = self.run_dir(run_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PersistenceError::io(format!(
                    "Failed to read {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to read entry: {}", e)))?
        {
            let path = entry.path();
            if let Some(sequence) = Self::parse_sequence(&path) {
                snapshots.push((sequence, path));
            }
        }

        snapshots.sort_by_key(|(sequence, _)| *sequence);
        Ok(snapshots)
    }
}

#[async_trait]
impl PersistenceStore for FileStore {
    async fn save_snapshot(
        &self,
        run_id: &str,
        phase: RunPhase,
        state: &ResearchState,
    ) -> Result<u64, PersistenceError> {
        let _guard = self.write_lock.lock().await;
        self.ensure_dir(run_id).await?;

        let sequence = self
            .list_snapshots(run_id)
            .await?
            .last()
            .map(|(sequence, _)| sequence + 1)
            .unwrap_or(1);

        let snapshot = Snapshot {
            run_id: run_id.to_string(),
            phase,
            sequence,
            state: state.clone(),
            saved_at: Utc::now(),
        };

        let json = serde_json::to_vec_pretty(&snapshot)?;
        let data = if self.compression {
            Self::compress(&json)?
        } else {
            json
        };

        let path = self.snapshot_path(run_id, sequence, phase);
        Self::write_atomic(&path, &data).await?;
        debug!(run_id, sequence, phase = phase.as_str(), bytes = data.len(), "Snapshot saved");
        Ok(sequence)
    }

    async fn load_snapshot(&self, run_id: &str) -> Result<Option<Snapshot>, PersistenceError> {
        let Some((_, path)) = self.list_snapshots(run_id).await?.pop() else {
            return Ok(None);
        };

        let data = fs::read(&path)
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to read {}: {}", path.display(), e)))?;

        let compressed = path.extension().and_then(|e| e.to_str()) == Some("zst");
        let json = if compressed {
            Self::decompress(&data)?
        } else {
            data
        };

        Ok(Some(serde_json::from_slice(&json)?))
    }

    async fn append_iteration_record(
        &self,
        run_id: &str,
        record: &IterationRecord,
    ) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.ensure_dir(run_id).await?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(ITERATIONS_FILE))
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to open iteration log: {}", e)))?;
        file.write_all(&line)
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to append iteration: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| PersistenceError::io(format!("Failed to sync iteration log: {}", e)))
    }

    async fn iteration_records(
        &self,
        run_id: &str,
    ) -> Result<Vec<IterationRecord>, PersistenceError> {
        let path = self.run_dir(run_id).join(ITERATIONS_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PersistenceError::io(format!(
                    "Failed to read iteration log: {}",
                    e
                )))
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(PersistenceError::from))
            .collect()
    }

    async fn save_final_report(
        &self,
        run_id: &str,
        report: &FinalReport,
        citations: &[Citation],
    ) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.ensure_dir(run_id).await?;
        Self::write_json(&dir.join(CITATIONS_FILE), &citations).await?;
        Self::write_json(&dir.join(REPORT_FILE), report).await
    }

    async fn load_final_report(
        &self,
        run_id: &str,
    ) -> Result<Option<FinalReport>, PersistenceError> {
        Self::read_json(&self.run_dir(run_id).join(REPORT_FILE)).await
    }

    async fn acquire_lease(
        &self,
        run_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Lease, PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.ensure_dir(run_id).await?;
        let _lock = LeaseLock::acquire(&dir).await?;
        let path = dir.join(LEASE_FILE);

        if let Some(existing) = Self::read_json::<Lease>(&path).await? {
            if !existing.available_to(owner) {
                return Err(PersistenceError::LeaseHeld {
                    run_id: run_id.to_string(),
                    owner: existing.owner,
                });
            }
        }

        let lease = Lease::new(run_id, owner, ttl);
        Self::write_json(&path, &lease).await?;
        Ok(lease)
    }

    async fn renew_lease(&self, lease: &Lease, ttl: Duration) -> Result<Lease, PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.run_dir(&lease.run_id);
        let _lock = LeaseLock::acquire(&dir).await?;
        let path = dir.join(LEASE_FILE);

        match Self::read_json::<Lease>(&path).await? {
            Some(current) if current.owner == lease.owner => {
                let renewed = Lease::new(&lease.run_id, &lease.owner, ttl);
                Self::write_json(&path, &renewed).await?;
                Ok(renewed)
            }
            _ => Err(PersistenceError::LeaseLost(lease.run_id.clone())),
        }
    }

    async fn release_lease(&self, lease: &Lease) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let dir = self.run_dir(&lease.run_id);
        let _lock = LeaseLock::acquire(&dir).await?;
        let path = dir.join(LEASE_FILE);

        if let Some(current) = Self::read_json::<Lease>(&path).await? {
            if current.owner == lease.owner {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| PersistenceError::io(format!("Failed to remove lease: {}", e)))?;
            }
        }
        Ok(())
    }
}
