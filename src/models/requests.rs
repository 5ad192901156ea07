// API request models
// Payload assembled by the wizard for the create/update record endpoints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::responses::FileReference;
use super::state::RecordKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswerDto {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    pub kind: RecordKind,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub question_answers: Vec<QuestionAnswerDto>,
    /// Testimony attachments first, general attachments second; within a group persisted
    /// references precede freshly uploaded ones.
    #[serde(default)]
    pub attachments: Vec<FileReference>,
}
