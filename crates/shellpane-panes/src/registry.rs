use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shellpane_types::home_dir;

use super::tmux::PaneHost;
use super::KIND_TERMINAL;

/// One registered pane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaneRecord {
    pub session_id: String,
    pub pane_handle: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// The durable registry shape, fully rewritten on every mutation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryData {
    pub panes: HashMap<String, PaneRecord>,
    pub default_pane: Option<String>,
}

/// Storage behind the registry, injectable so tests can run in memory.
pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<RegistryData>;
    fn save(&self, data: &RegistryData) -> Result<()>;

    /// Pre-registry single-pane file, retained for migration only.
    fn legacy_default_pane(&self) -> Option<String> {
        None
    }
}

/// File-backed store under the shellpane home directory.
///
/// Writes go to a temp file that is atomically renamed over the registry,
/// so readers never observe a torn write. Two processes saving at once
/// still race read-modify-write: the last writer wins, a known limitation
/// of the shared-file design.
pub struct FileStore {
    path: PathBuf,
    legacy_path: Option<PathBuf>,
}

impl FileStore {
    pub fn new(path: PathBuf, legacy_path: Option<PathBuf>) -> Self {
        Self { path, legacy_path }
    }

    /// Default location: `~/.shellpane/panes.json`, with the legacy
    /// single-pane file next to it.
    pub fn default_location() -> Result<Self> {
        let dir = home_dir()
            .context("Failed to get home directory")?
            .join(".shellpane");
        Ok(Self::new(dir.join("panes.json"), Some(dir.join("last-pane"))))
    }
}

impl RegistryStore for FileStore {
    fn load(&self) -> Result<RegistryData> {
        if !self.path.exists() {
            return Ok(RegistryData::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn save(&self, data: &RegistryData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn legacy_default_pane(&self) -> Option<String> {
        let path = self.legacy_path.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        let handle = raw.trim();
        if handle.is_empty() {
            None
        } else {
            Some(handle.to_string())
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<RegistryData>,
    pub legacy: Option<String>,
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<RegistryData> {
        Ok(self.data.lock().unwrap().clone())
    }

    fn save(&self, data: &RegistryData) -> Result<()> {
        *self.data.lock().unwrap() = data.clone();
        Ok(())
    }

    fn legacy_default_pane(&self) -> Option<String> {
        self.legacy.clone()
    }
}

/// Durable mapping from session ids to pane handles.
///
/// Liveness is checked on access against the multiplexer; a record whose
/// pane no longer answers is evicted and reported as not found, never
/// returned stale.
pub struct PaneRegistry {
    store: Box<dyn RegistryStore>,
    host: Arc<dyn PaneHost>,
}

impl PaneRegistry {
    pub fn new(store: Box<dyn RegistryStore>, host: Arc<dyn PaneHost>) -> Self {
        Self { store, host }
    }

    /// Upsert a record. Non-terminal kinds also become the default pane,
    /// the single-surface convenience used when no session id is given.
    pub fn save(&self, session_id: &str, pane_handle: &str, kind: &str) -> Result<()> {
        let mut data = self.store.load()?;
        data.panes.insert(
            session_id.to_string(),
            PaneRecord {
                session_id: session_id.to_string(),
                pane_handle: pane_handle.to_string(),
                kind: kind.to_string(),
                created_at: Utc::now(),
            },
        );
        if kind != KIND_TERMINAL {
            data.default_pane = Some(pane_handle.to_string());
        }
        self.store.save(&data)
    }

    /// Resolve a session to its live pane handle.
    ///
    /// With no id, falls back to the default pane, then to the legacy
    /// single-pane file. Verification failure evicts and returns None.
    pub async fn lookup(&self, session_id: Option<&str>) -> Result<Option<String>> {
        let mut data = self.store.load()?;

        if let Some(id) = session_id {
            let Some(record) = data.panes.get(id) else {
                return Ok(None);
            };
            let handle = record.pane_handle.clone();
            if self.host.verify_pane(&handle).await {
                return Ok(Some(handle));
            }
            data.panes.remove(id);
            if data.default_pane.as_deref() == Some(handle.as_str()) {
                data.default_pane = None;
            }
            self.store.save(&data)?;
            return Ok(None);
        }

        if let Some(handle) = data.default_pane.clone() {
            if self.host.verify_pane(&handle).await {
                return Ok(Some(handle));
            }
            data.default_pane = None;
            data.panes.retain(|_, r| r.pane_handle != handle);
            self.store.save(&data)?;
        }

        if let Some(handle) = self.store.legacy_default_pane() {
            if self.host.verify_pane(&handle).await {
                return Ok(Some(handle));
            }
        }

        Ok(None)
    }

    /// All currently-live records. Dead panes are garbage-collected as a
    /// side effect.
    pub async fn list(&self) -> Result<Vec<PaneRecord>> {
        let mut data = self.store.load()?;

        let mut dead: Vec<String> = Vec::new();
        for (id, record) in &data.panes {
            if !self.host.verify_pane(&record.pane_handle).await {
                dead.push(id.clone());
            }
        }

        if !dead.is_empty() {
            for id in &dead {
                if let Some(record) = data.panes.remove(id) {
                    if data.default_pane.as_deref() == Some(record.pane_handle.as_str()) {
                        data.default_pane = None;
                    }
                }
            }
            self.store.save(&data)?;
        }

        let mut records: Vec<PaneRecord> = data.panes.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Destroy a session's pane and forget it. The record is deleted even
    /// if the multiplexer reports the destruction failed.
    pub async fn remove(&self, session_id: &str) -> Result<()> {
        let mut data = self.store.load()?;
        let Some(record) = data.panes.remove(session_id) else {
            return Ok(());
        };
        let _ = self.host.kill_pane(&record.pane_handle).await;
        if data.default_pane.as_deref() == Some(record.pane_handle.as_str()) {
            data.default_pane = None;
        }
        self.store.save(&data)
    }

    pub fn host(&self) -> &Arc<dyn PaneHost> {
        &self.host
    }
}
