// Wizard error taxonomy
//
// Validation problems are local and always recoverable; upload/submission failures carry the message
// the user should see (server text when present, a generic fallback otherwise). Nothing here is fatal:
// every error leaves the wizard editable.

use thiserror::Error;

/// A step failed validation. `step` is 1-indexed and relative to the active record kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Step {step} ({label}) needs attention")]
pub struct StepInvalid {
    pub step: usize,
    pub label: &'static str,
    /// Field names / `question:<id>` keys that failed.
    pub fields: Vec<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] StepInvalid),

    #[error("{0}")]
    Upload(String),

    #[error("{0}")]
    Submission(String),

    #[error("Not enough local storage to save the draft. Remove some attachments or clear old drafts and try again.")]
    StorageQuota,

    #[error("The draft could not be saved: {0}")]
    Storage(String),

    #[error("A submission is already in progress")]
    SubmitInFlight,

    #[error("Drafts are only available while creating a new record")]
    DraftUnavailable,

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Question '{0}' is not part of the loaded question set")]
    UnknownQuestion(String),

    #[error("'{field}' expects a {expected} value")]
    InvalidFieldValue {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Answer for '{question_id}' is not accepted: {message}")]
    InvalidAnswer {
        question_id: String,
        message: String,
    },

    #[error("Questions for category '{category_id}' could not be loaded: {message}")]
    SchemaLoad {
        category_id: String,
        message: String,
    },

    #[error("The record could not be loaded: {0}")]
    RecordLoad(String),

    #[error("Step {requested} does not exist (this record has {total} steps)")]
    StepOutOfRange { requested: usize, total: usize },

    #[error("No attachment at position {index}")]
    AttachmentIndex { index: usize },

    #[error("{0}")]
    FileRejected(#[from] crate::wizard::attachments::FileRejection),
}

impl WizardError {
    /// Step the host should navigate to, for validation failures.
    pub fn failing_step(&self) -> Option<usize> {
        match self {
            WizardError::Validation(invalid) => Some(invalid.step),
            _ => None,
        }
    }
}
