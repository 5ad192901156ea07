// Wizard state (in-memory)
//
// NOTE: This is the single mutable model behind the wizard. It is owned by the orchestrator and is
// only mutated through its methods; drafts and change snapshots are derived from it, never the
// other way around.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use super::responses::FileReference;

pub type FieldMap = BTreeMap<String, FieldValue>;
pub type AnswerMap = BTreeMap<String, String>;

/// Record-type discriminator; selects the step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Questionnaire,
    Testimony,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Questionnaire => "questionnaire",
            RecordKind::Testimony => "testimony",
        }
    }

    /// Testimony records carry a dedicated, required attachment group.
    pub fn requires_testimony_attachment(&self) -> bool {
        matches!(self, RecordKind::Testimony)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Calendar date for date-like values (timestamps collapse to their UTC date).
    pub fn calendar_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::DateTime(dt) => Some(dt.date_naive()),
            FieldValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) => serde_json::Value::String(s.trim().to_string()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

// =========================
// Attachments
// =========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentGroup {
    Testimony,
    General,
}

/// Where the bytes of a user-selected file live until upload.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Bytes(Arc<Vec<u8>>),
    Path(PathBuf),
}

/// A file the user picked locally and that has not been uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub content: FileContent,
}

impl LocalFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: bytes.len() as u64,
            content: FileContent::Bytes(Arc::new(bytes)),
        }
    }

    /// Size is taken from the file picker metadata; the path is only read at upload time.
    pub fn from_path(
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size,
            content: FileContent::Path(path.into()),
        }
    }

    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.content {
            FileContent::Bytes(b) => Ok(b.as_ref().clone()),
            FileContent::Path(p) => tokio::fs::read(p).await,
        }
    }
}

/// Display-only description of an attachment; this is what drafts persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMetadata {
    pub name: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub uploaded: bool,
    pub server_path: Option<String>,
    pub group: AttachmentGroup,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentSource {
    NewFile(LocalFile),
    Persisted(FileReference),
    /// Restored from a draft without its bytes; the user has to pick the file again.
    Reselect(AttachmentMetadata),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub source: AttachmentSource,
    pub preview_url: Option<String>,
    pub is_uploaded: bool,
}

impl Attachment {
    pub fn new_file(file: LocalFile) -> Self {
        Self {
            source: AttachmentSource::NewFile(file),
            preview_url: None,
            is_uploaded: false,
        }
    }

    pub fn persisted(reference: FileReference) -> Self {
        let preview_url = Some(reference.url.clone());
        Self {
            source: AttachmentSource::Persisted(reference),
            preview_url,
            is_uploaded: true,
        }
    }

    pub fn reselect(metadata: AttachmentMetadata) -> Self {
        Self {
            source: AttachmentSource::Reselect(metadata),
            preview_url: None,
            is_uploaded: false,
        }
    }

    pub fn display_name(&self) -> &str {
        match &self.source {
            AttachmentSource::NewFile(f) => &f.name,
            AttachmentSource::Persisted(r) => &r.file_name,
            AttachmentSource::Reselect(m) => &m.name,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self.source, AttachmentSource::NewFile(_))
    }

    /// Placeholders restored from a draft cannot be sent; everything else can.
    pub fn is_submittable(&self) -> bool {
        !matches!(self.source, AttachmentSource::Reselect(_))
    }

    pub fn metadata(&self, group: AttachmentGroup) -> AttachmentMetadata {
        match &self.source {
            AttachmentSource::NewFile(f) => AttachmentMetadata {
                name: f.name.clone(),
                size: Some(f.size),
                content_type: Some(f.content_type.clone()),
                uploaded: false,
                server_path: None,
                group,
            },
            AttachmentSource::Persisted(r) => AttachmentMetadata {
                name: r.file_name.clone(),
                size: None,
                content_type: None,
                uploaded: true,
                server_path: Some(r.url.clone()),
                group,
            },
            AttachmentSource::Reselect(m) => AttachmentMetadata {
                group,
                ..m.clone()
            },
        }
    }
}

// =========================
// Wizard state
// =========================

#[derive(Debug, Clone, PartialEq)]
pub struct WizardState {
    pub kind: RecordKind,
    pub fields: FieldMap,
    pub question_answers: AnswerMap,
    pub attachments: Vec<Attachment>,
    pub testimony_attachments: Vec<Attachment>,
    pub current_step: usize,
    /// Field and question keys the UI should render errors for.
    pub touched: BTreeSet<String>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            kind: RecordKind::default(),
            fields: FieldMap::new(),
            question_answers: AnswerMap::new(),
            attachments: Vec::new(),
            testimony_attachments: Vec::new(),
            current_step: 1,
            touched: BTreeSet::new(),
        }
    }
}

impl WizardState {
    /// Trimmed text value of a field, or "" when unset / not text.
    pub fn field_text(&self, name: &str) -> &str {
        self.fields
            .get(name)
            .and_then(FieldValue::as_text)
            .map(str::trim)
            .unwrap_or("")
    }

    pub fn group(&self, group: AttachmentGroup) -> &Vec<Attachment> {
        match group {
            AttachmentGroup::Testimony => &self.testimony_attachments,
            AttachmentGroup::General => &self.attachments,
        }
    }

    pub fn group_mut(&mut self, group: AttachmentGroup) -> &mut Vec<Attachment> {
        match group {
            AttachmentGroup::Testimony => &mut self.testimony_attachments,
            AttachmentGroup::General => &mut self.attachments,
        }
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        WizardSnapshot {
            kind: self.kind,
            fields: self.fields.clone(),
            question_answers: self.question_answers.clone(),
            attachment_count: self.attachments.len(),
            testimony_attachment_count: self.testimony_attachments.len(),
        }
    }
}

/// Deep copy of the comparable parts of a [`WizardState`], captured when an existing record is
/// opened for editing.
#[derive(Debug, Clone, PartialEq)]
pub struct WizardSnapshot {
    pub kind: RecordKind,
    pub fields: FieldMap,
    pub question_answers: AnswerMap,
    pub attachment_count: usize,
    pub testimony_attachment_count: usize,
}
