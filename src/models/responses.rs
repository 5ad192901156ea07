// API response models
// Shapes returned by the record service (questions, uploads, persisted records).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::requests::QuestionAnswerDto;
use super::state::RecordKind;

// =========================
// Generic wrapper (every endpoint answers with this envelope)
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            message: None,
        }
    }

    /// Server-provided explanation for a failed call, if any.
    pub fn failure_message(&self) -> Option<String> {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .filter(|m| !m.trim().is_empty())
    }
}

// =========================
// Questions
// =========================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    pub id: String,
    pub order: i32,
    #[serde(default)]
    pub is_required: bool,
    #[serde(rename = "type", default = "default_question_type")]
    pub question_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub category_id: Option<String>,
}

fn default_question_type() -> String {
    "text".to_string()
}

// =========================
// Files
// =========================

/// Stable reference to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    pub file_name: String,
    pub url: String,
}

// =========================
// Records
// =========================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub id: String,
    pub kind: RecordKind,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub question_answers: Vec<QuestionAnswerDto>,
    #[serde(default)]
    pub attachments: Vec<FileReference>,
    #[serde(default)]
    pub testimony_attachments: Vec<FileReference>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
