// Draft persistence
//
// A draft is a JSON snapshot of the wizard under `<record_type>_draft_<user|anonymous>`. It never
// holds file bytes: attachments are kept as display metadata and have to be picked again on resume
// unless the server already holds them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;

use super::fields::{CATEGORY_ID, SUB_CATEGORY_ID};
use crate::error::WizardError;
use crate::models::responses::FileReference;
use crate::models::state::{
    AnswerMap, Attachment, AttachmentGroup, AttachmentMetadata, FieldMap, RecordKind, WizardState,
};
use crate::utils::logging::mask_draft_key;

pub const DRAFT_FORMAT_VERSION: u32 = 1;
pub const ANONYMOUS_USER_KEY: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    pub version: u32,
    pub kind: RecordKind,
    pub fields: FieldMap,
    pub question_answers: AnswerMap,
    #[serde(default)]
    pub attachment_metadata: Vec<AttachmentMetadata>,
    pub current_step: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub sub_category_id: Option<String>,
}

impl DraftRecord {
    pub fn capture(state: &WizardState, timestamp: DateTime<Utc>) -> Self {
        let mut attachment_metadata: Vec<AttachmentMetadata> = state
            .testimony_attachments
            .iter()
            .map(|a| a.metadata(AttachmentGroup::Testimony))
            .collect();
        attachment_metadata.extend(
            state
                .attachments
                .iter()
                .map(|a| a.metadata(AttachmentGroup::General)),
        );

        let optional_text = |name: &str| {
            let v = state.field_text(name);
            (!v.is_empty()).then(|| v.to_string())
        };

        Self {
            version: DRAFT_FORMAT_VERSION,
            kind: state.kind,
            fields: state.fields.clone(),
            question_answers: state.question_answers.clone(),
            attachment_metadata,
            current_step: state.current_step,
            timestamp,
            category_id: optional_text(CATEGORY_ID),
            sub_category_id: optional_text(SUB_CATEGORY_ID),
        }
    }
}

/// Attachments rebuilt from draft metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredAttachments {
    pub testimony: Vec<Attachment>,
    pub general: Vec<Attachment>,
    /// Names of files the user has to pick again.
    pub to_reselect: Vec<String>,
}

/// Uploaded entries with a server path come back as persisted references; everything else becomes
/// a re-select placeholder.
pub fn restore_attachments(metadata: &[AttachmentMetadata]) -> RestoredAttachments {
    let mut out = RestoredAttachments::default();
    for m in metadata {
        let attachment = match (&m.server_path, m.uploaded) {
            (Some(path), true) if !path.trim().is_empty() => Attachment::persisted(FileReference {
                file_name: m.name.clone(),
                url: path.clone(),
            }),
            _ => {
                out.to_reselect.push(m.name.clone());
                Attachment::reselect(m.clone())
            }
        };
        match m.group {
            AttachmentGroup::Testimony => out.testimony.push(attachment),
            AttachmentGroup::General => out.general.push(attachment),
        }
    }
    out
}

pub fn draft_key(record_type: &str, user_id: Option<&str>) -> String {
    let user = user_id
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(ANONYMOUS_USER_KEY);
    format!("{}_draft_{}", record_type, user)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("storage failure: {0}")]
    Io(String),
}

/// Durable key/value backend for drafts.
#[async_trait]
pub trait DraftStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// =========================
// In-memory backend
// =========================

#[derive(Default)]
pub struct MemoryDraftStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<u64>,
    writes: AtomicU32,
}

impl MemoryDraftStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DraftStorage for MemoryDraftStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_raw(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.lock();
        if let Some(quota) = self.quota_bytes {
            let others: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let needed = others + value.len() as u64;
            if needed > quota {
                return Err(StorageError::QuotaExceeded(format!(
                    "{} bytes needed, {} allowed",
                    needed, quota
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

// =========================
// File-backed backend
// =========================

/// One `<key>.json` per draft inside `folder`; the folder total is capped at `quota_bytes`.
pub struct FileDraftStorage {
    folder: PathBuf,
    quota_bytes: u64,
}

impl FileDraftStorage {
    pub fn new(folder: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            folder: folder.into(),
            quota_bytes,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.folder.join(format!("{}.json", safe))
    }

    async fn usage_excluding(&self, exclude: &Path) -> u64 {
        let mut total = 0u64;
        let Ok(mut dir) = tokio::fs::read_dir(&self.folder).await else {
            return 0;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path == exclude || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                total += meta.len();
            }
        }
        total
    }
}

/// ENOSPC / EDQUOT (Linux numbering) on unix, ERROR_DISK_FULL / ERROR_HANDLE_DISK_FULL on windows.
#[cfg(unix)]
fn is_disk_full(e: &std::io::Error) -> bool {
    matches!(e.raw_os_error(), Some(28) | Some(122))
}

#[cfg(windows)]
fn is_disk_full(e: &std::io::Error) -> bool {
    matches!(e.raw_os_error(), Some(112) | Some(39))
}

#[cfg(not(any(unix, windows)))]
fn is_disk_full(_e: &std::io::Error) -> bool {
    false
}

async fn write_file_with_retries(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("json.tmp");
    let mut last_err = String::from("Failed to write draft");

    for attempt in 1..=3u32 {
        let started = Instant::now();
        let result = timeout(Duration::from_secs(10), async {
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, path).await
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!(
                    "[PHASE: drafts] [STEP: fs] write ok (attempt={}, path={:?}, bytes={}, duration_ms={})",
                    attempt,
                    path,
                    bytes.len(),
                    started.elapsed().as_millis()
                );
                return Ok(());
            }
            Ok(Err(e)) if is_disk_full(&e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(StorageError::QuotaExceeded(e.to_string()));
            }
            Ok(Err(e)) => {
                warn!(
                    "[PHASE: drafts] [STEP: fs] write failed (attempt={}, path={:?}, error={:?})",
                    attempt, path, e
                );
                last_err = e.to_string();
            }
            Err(_) => {
                warn!(
                    "[PHASE: drafts] [STEP: fs] write timed out (attempt={}, path={:?})",
                    attempt, path
                );
                last_err = "write timed out".to_string();
            }
        }

        let backoff_ms = 50_u64.saturating_mul(1_u64 << (attempt - 1));
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
    }

    Err(StorageError::Io(last_err))
}

#[async_trait]
impl DraftStorage for FileDraftStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.folder)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to create draft folder: {}", e)))?;

        let path = self.path_for(key);
        let needed = self.usage_excluding(&path).await + value.len() as u64;
        if needed > self.quota_bytes {
            return Err(StorageError::QuotaExceeded(format!(
                "{} bytes needed, {} allowed",
                needed, self.quota_bytes
            )));
        }

        write_file_with_retries(&path, value.as_bytes()).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

// =========================
// Draft store
// =========================

pub struct DraftStore {
    storage: Arc<dyn DraftStorage>,
    key: String,
    explicitly_saved: bool,
    last_saved_at: Option<DateTime<Utc>>,
}

impl DraftStore {
    pub fn new(storage: Arc<dyn DraftStorage>, record_type: &str, user_id: Option<&str>) -> Self {
        Self {
            storage,
            key: draft_key(record_type, user_id),
            explicitly_saved: false,
            last_saved_at: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The current content was saved explicitly and has not been edited since.
    pub fn is_explicitly_saved(&self) -> bool {
        self.explicitly_saved
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn mark_dirty(&mut self) {
        self.explicitly_saved = false;
    }

    /// The in-memory content was just restored from the stored draft saved at `saved_at`.
    pub fn mark_restored(&mut self, saved_at: DateTime<Utc>) {
        self.explicitly_saved = true;
        self.last_saved_at = Some(saved_at);
    }

    pub async fn save(&mut self, state: &WizardState) -> Result<DateTime<Utc>, WizardError> {
        let now = Utc::now();
        let record = DraftRecord::capture(state, now);
        let json = serde_json::to_string(&record)
            .map_err(|e| WizardError::Storage(format!("serialization failed: {}", e)))?;

        match self.storage.write(&self.key, &json).await {
            Ok(()) => {
                self.explicitly_saved = true;
                self.last_saved_at = Some(now);
                info!(
                    "[PHASE: drafts] [STEP: save] Draft saved (key={}, step={}, bytes={})",
                    mask_draft_key(&self.key),
                    record.current_step,
                    json.len()
                );
                Ok(now)
            }
            Err(StorageError::QuotaExceeded(details)) => {
                warn!(
                    "[PHASE: drafts] [STEP: save] Quota exceeded (key={}): {}",
                    mask_draft_key(&self.key),
                    details
                );
                Err(WizardError::StorageQuota)
            }
            Err(StorageError::Io(details)) => {
                warn!(
                    "[PHASE: drafts] [STEP: save] Save failed (key={}): {}",
                    mask_draft_key(&self.key),
                    details
                );
                Err(WizardError::Storage(details))
            }
        }
    }

    /// Stored draft, if any. Corrupt or unknown-version drafts are cleared and reported as absent.
    pub async fn load(&mut self) -> Result<Option<DraftRecord>, WizardError> {
        let raw = match self.storage.read(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => return Err(WizardError::Storage(e.to_string())),
        };

        match serde_json::from_str::<DraftRecord>(&raw) {
            Ok(record) if record.version == DRAFT_FORMAT_VERSION => {
                info!(
                    "[PHASE: drafts] [STEP: load] Draft loaded (key={}, step={}, saved_at={})",
                    mask_draft_key(&self.key),
                    record.current_step,
                    record.timestamp.to_rfc3339()
                );
                Ok(Some(record))
            }
            Ok(record) => {
                warn!(
                    "[PHASE: drafts] [STEP: load] Unsupported draft version {} (key={}); clearing",
                    record.version,
                    mask_draft_key(&self.key)
                );
                self.discard_corrupt().await;
                Ok(None)
            }
            Err(e) => {
                warn!(
                    "[PHASE: drafts] [STEP: load] Corrupt draft (key={}): {}; clearing",
                    mask_draft_key(&self.key),
                    e
                );
                self.discard_corrupt().await;
                Ok(None)
            }
        }
    }

    async fn discard_corrupt(&mut self) {
        if let Err(e) = self.storage.remove(&self.key).await {
            warn!("[PHASE: drafts] [STEP: load] Could not clear corrupt draft: {}", e);
        }
    }

    pub async fn exists(&self) -> bool {
        matches!(self.storage.read(&self.key).await, Ok(Some(_)))
    }

    pub async fn clear(&mut self) -> Result<(), WizardError> {
        self.storage
            .remove(&self.key)
            .await
            .map_err(|e| WizardError::Storage(e.to_string()))?;
        self.explicitly_saved = false;
        self.last_saved_at = None;
        info!(
            "[PHASE: drafts] [STEP: clear] Draft cleared (key={})",
            mask_draft_key(&self.key)
        );
        Ok(())
    }
}
