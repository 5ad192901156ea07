// In-memory record service
// Backs the smoke modes and orchestrator tests. Failures can be injected per call.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{ApiError, RecordApi};
use crate::models::requests::RecordPayload;
use crate::models::responses::{FileReference, PersistedRecord, QuestionDto};
use crate::models::state::LocalFile;

pub const DEMO_CATEGORY_HARASSMENT: &str = "harassment";
pub const DEMO_CATEGORY_LABOR: &str = "labor";

#[derive(Default)]
struct DemoInner {
    questions: HashMap<String, Vec<QuestionDto>>,
    records: BTreeMap<String, PersistedRecord>,
    created: Vec<RecordPayload>,
    updated: Vec<(String, RecordPayload)>,
    upload_batches: Vec<Vec<String>>,
    fail_next_upload: Option<String>,
    fail_next_submission: Option<String>,
    failing_question_fetches: u32,
}

#[derive(Default)]
pub struct DemoRecordApi {
    inner: Mutex<DemoInner>,
    question_fetches: AtomicU32,
}

pub fn question(
    id: &str,
    order: i32,
    is_required: bool,
    question_type: &str,
    options: &[&str],
) -> QuestionDto {
    QuestionDto {
        id: id.to_string(),
        order,
        is_required,
        question_type: question_type.to_string(),
        label: Some(id.replace('-', " ")),
        options: options.iter().map(|o| o.to_string()).collect(),
        category_id: None,
    }
}

impl DemoRecordApi {
    /// Service pre-seeded with two categories that share one question id.
    pub fn seeded() -> Self {
        let api = Self::default();
        api.set_questions(
            DEMO_CATEGORY_HARASSMENT,
            vec![
                question("frequency", 2, true, "single_choice", &["once", "weekly", "daily"]),
                question("witnesses", 1, true, "yes_no", &[]),
                question("reported-before", 3, false, "text", &[]),
            ],
        );
        api.set_questions(
            DEMO_CATEGORY_LABOR,
            vec![
                question("witnesses", 1, true, "yes_no", &[]),
                question("unpaid-wages", 2, true, "number", &[]),
                question(
                    "contract-issues",
                    3,
                    false,
                    "multi_choice",
                    &["no contract", "withheld passport", "excess hours"],
                ),
            ],
        );
        api
    }

    fn lock(&self) -> MutexGuard<'_, DemoInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_questions(&self, category_id: &str, mut questions: Vec<QuestionDto>) {
        for q in questions.iter_mut() {
            q.category_id = Some(category_id.to_string());
        }
        self.lock()
            .questions
            .insert(category_id.to_string(), questions);
    }

    pub fn insert_record(&self, record: PersistedRecord) {
        self.lock().records.insert(record.id.clone(), record);
    }

    /// The next upload batch fails with this server message (blank = no server message).
    pub fn fail_next_upload(&self, message: impl Into<String>) {
        self.lock().fail_next_upload = Some(message.into());
    }

    /// The next create/update fails with this server message (blank = no server message).
    pub fn fail_next_submission(&self, message: impl Into<String>) {
        self.lock().fail_next_submission = Some(message.into());
    }

    /// The next `count` question fetches fail.
    pub fn fail_question_fetches(&self, count: u32) {
        self.lock().failing_question_fetches = count;
    }

    pub fn created_payloads(&self) -> Vec<RecordPayload> {
        self.lock().created.clone()
    }

    pub fn updated_payloads(&self) -> Vec<(String, RecordPayload)> {
        self.lock().updated.clone()
    }

    /// File names per upload call, in call order.
    pub fn upload_batches(&self) -> Vec<Vec<String>> {
        self.lock().upload_batches.clone()
    }

    pub fn question_fetches(&self) -> u32 {
        self.question_fetches.load(Ordering::SeqCst)
    }

    fn persist(id: String, payload: &RecordPayload) -> PersistedRecord {
        PersistedRecord {
            id,
            kind: payload.kind,
            fields: payload.fields.clone(),
            question_answers: payload.question_answers.clone(),
            attachments: payload.attachments.clone(),
            testimony_attachments: Vec::new(),
            updated_at: Some(Utc::now()),
        }
    }
}

#[async_trait]
impl RecordApi for DemoRecordApi {
    async fn fetch_questions(&self, category_id: &str) -> Result<Vec<QuestionDto>, ApiError> {
        self.question_fetches.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if inner.failing_question_fetches > 0 {
            inner.failing_question_fetches -= 1;
            return Err(ApiError::transport("demo: question service unavailable"));
        }
        Ok(inner.questions.get(category_id).cloned().unwrap_or_default())
    }

    async fn upload_files(&self, files: &[LocalFile]) -> Result<Vec<FileReference>, ApiError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_upload.take() {
            return Err(ApiError::server(Some(message), "demo: injected upload failure"));
        }
        inner
            .upload_batches
            .push(files.iter().map(|f| f.name.clone()).collect());

        Ok(files
            .iter()
            .map(|f| FileReference {
                file_name: f.name.clone(),
                url: format!("demo://uploads/{}/{}", uuid::Uuid::new_v4(), f.name),
            })
            .collect())
    }

    async fn create_record(&self, payload: &RecordPayload) -> Result<PersistedRecord, ApiError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_submission.take() {
            return Err(ApiError::server(Some(message), "demo: injected create failure"));
        }
        inner.created.push(payload.clone());
        let record = Self::persist(uuid::Uuid::new_v4().to_string(), payload);
        inner.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        record_id: &str,
        payload: &RecordPayload,
    ) -> Result<PersistedRecord, ApiError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_submission.take() {
            return Err(ApiError::server(Some(message), "demo: injected update failure"));
        }
        if !inner.records.contains_key(record_id) {
            return Err(ApiError::server(
                Some("Record not found".to_string()),
                format!("demo: unknown record {}", record_id),
            ));
        }
        inner
            .updated
            .push((record_id.to_string(), payload.clone()));
        let record = Self::persist(record_id.to_string(), payload);
        inner.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn fetch_record(&self, record_id: &str) -> Result<PersistedRecord, ApiError> {
        self.lock().records.get(record_id).cloned().ok_or_else(|| {
            ApiError::server(
                Some("Record not found".to_string()),
                format!("demo: unknown record {}", record_id),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn payload() -> RecordPayload {
        RecordPayload {
            kind: crate::models::state::RecordKind::Questionnaire,
            fields: BTreeMap::new(),
            question_answers: Vec::new(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn seeded_categories_share_one_question() {
        let api = DemoRecordApi::seeded();
        let a = api.fetch_questions(DEMO_CATEGORY_HARASSMENT).await.unwrap();
        let b = api.fetch_questions(DEMO_CATEGORY_LABOR).await.unwrap();
        assert!(a.iter().any(|q| q.id == "witnesses"));
        assert!(b.iter().any(|q| q.id == "witnesses"));
        assert_eq!(api.question_fetches(), 2);
        assert!(api.fetch_questions("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let api = DemoRecordApi::seeded();
        api.fail_next_submission("Duplicate report");
        let err = api.create_record(&payload()).await.unwrap_err();
        assert_eq!(err.user_message("x"), "Duplicate report");
        assert!(api.create_record(&payload()).await.is_ok());
        assert_eq!(api.created_payloads().len(), 1);

        api.fail_question_fetches(1);
        assert!(api.fetch_questions(DEMO_CATEGORY_LABOR).await.is_err());
        assert!(api.fetch_questions(DEMO_CATEGORY_LABOR).await.is_ok());
    }

    #[tokio::test]
    async fn uploads_return_one_reference_per_file_in_order() {
        let api = DemoRecordApi::seeded();
        let files = vec![
            LocalFile::from_bytes("a.pdf", "application/pdf", vec![1]),
            LocalFile::from_bytes("b.png", "image/png", vec![2]),
        ];
        let refs = api.upload_files(&files).await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].file_name, "a.pdf");
        assert_eq!(refs[1].file_name, "b.png");
        assert!(refs[0].url.starts_with("demo://uploads/"));
        assert_eq!(api.upload_batches(), vec![vec!["a.pdf".to_string(), "b.png".to_string()]]);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let api = DemoRecordApi::seeded();
        assert!(api.update_record("missing", &payload()).await.is_err());
        let created = api.create_record(&payload()).await.unwrap();
        assert!(api.update_record(&created.id, &payload()).await.is_ok());
        assert_eq!(api.fetch_record(&created.id).await.unwrap().id, created.id);
    }
}
