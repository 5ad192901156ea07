// Record service collaborators
//
// The wizard talks to the outside world only through `RecordApi`. Production uses `HttpRecordApi`;
// smoke modes and tests use `DemoRecordApi` or local stubs.

use async_trait::async_trait;

use crate::models::requests::RecordPayload;
use crate::models::responses::{FileReference, PersistedRecord, QuestionDto};
use crate::models::state::LocalFile;

pub mod demo;
pub mod http;

pub use demo::DemoRecordApi;
pub use http::HttpRecordApi;

/// Error returned by the record service.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Server-provided explanation (safe to show in UI)
    pub server_message: Option<String>,
    /// Internal details for logging
    pub internal_details: String,
    /// Transport-level failures (timeouts, connection resets) may be retried for reads.
    pub retryable: bool,
}

impl ApiError {
    /// The server answered and rejected the request.
    pub fn server(message: Option<String>, internal_details: impl Into<String>) -> Self {
        Self {
            server_message: message.filter(|m| !m.trim().is_empty()),
            internal_details: internal_details.into(),
            retryable: false,
        }
    }

    /// The request never produced a usable answer.
    pub fn transport(internal_details: impl Into<String>) -> Self {
        Self {
            server_message: None,
            internal_details: internal_details.into(),
            retryable: true,
        }
    }

    /// Message to surface: the server's text verbatim, otherwise the caller's fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.server_message {
            Some(m) => write!(f, "{}", m),
            None => write!(f, "{}", self.internal_details),
        }
    }
}

impl std::error::Error for ApiError {}

/// Trait for the record service endpoints the wizard needs.
#[async_trait]
pub trait RecordApi: Send + Sync {
    /// Dynamic questions for a category, in server order.
    async fn fetch_questions(&self, category_id: &str) -> Result<Vec<QuestionDto>, ApiError>;

    /// Upload a batch; one reference per file, in input order. Fails as a whole.
    async fn upload_files(&self, files: &[LocalFile]) -> Result<Vec<FileReference>, ApiError>;

    async fn create_record(&self, payload: &RecordPayload) -> Result<PersistedRecord, ApiError>;

    async fn update_record(
        &self,
        record_id: &str,
        payload: &RecordPayload,
    ) -> Result<PersistedRecord, ApiError>;

    async fn fetch_record(&self, record_id: &str) -> Result<PersistedRecord, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_prefers_server_text() {
        let err = ApiError::server(Some("Category is closed".to_string()), "HTTP 422");
        assert_eq!(err.user_message("Submission failed"), "Category is closed");
        assert_eq!(err.to_string(), "Category is closed");
        assert!(!err.retryable);
    }

    #[test]
    fn blank_server_message_falls_back() {
        let err = ApiError::server(Some("  ".to_string()), "HTTP 500");
        assert_eq!(err.user_message("Submission failed"), "Submission failed");

        let transport = ApiError::transport("connection reset");
        assert!(transport.retryable);
        assert_eq!(transport.user_message("Upload failed"), "Upload failed");
        assert_eq!(transport.to_string(), "connection reset");
    }
}
