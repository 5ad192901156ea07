// Wizard orchestrator
//
// Owns the wizard state and is the only thing that mutates it. Submission runs
// Validating -> (Uploading) -> Submitting -> Done; any failure goes through Failed back to Editing
// with the draft left alone. The edit-mode original snapshot is taken once when the record loads
// and never replaced; after a successful update the wizard closes without confirmation until the
// next edit.

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::attachments::{pending_uploads, AddFilesOutcome, AttachmentPipeline, AttachmentPolicy};
use super::changes;
use super::drafts::{restore_attachments, DraftStorage, DraftStore};
use super::fields::{coerce_field, spec_for, value_from_json, CATEGORY_ID, FIELD_CATALOG, SUB_CATEGORY_ID};
use super::schema::{AnswerRehydrator, QuestionSchema, QuestionSchemaLoader, SchemaReload, SchemaStatus};
use super::steps;
use crate::api::RecordApi;
use crate::config::WizardConfig;
use crate::error::{StepInvalid, WizardError};
use crate::models::requests::RecordPayload;
use crate::models::responses::{FileReference, PersistedRecord};
use crate::models::state::{
    AnswerMap, Attachment, AttachmentGroup, FieldValue, LocalFile, RecordKind, WizardSnapshot,
    WizardState,
};
use crate::utils::logging::mask_sensitive;

const SUBMISSION_FALLBACK_MESSAGE: &str = "The record could not be saved. Please try again.";
const RECORD_LOAD_FALLBACK_MESSAGE: &str = "The record could not be loaded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Editing,
    Validating,
    Uploading,
    Submitting,
    Done,
    Failed,
}

impl SubmissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionPhase::Editing => "editing",
            SubmissionPhase::Validating => "validating",
            SubmissionPhase::Uploading => "uploading",
            SubmissionPhase::Submitting => "submitting",
            SubmissionPhase::Done => "done",
            SubmissionPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardMode {
    Add,
    Edit { record_id: String },
}

/// Host notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    PhaseChanged(SubmissionPhase),
    StepInvalid { step: usize, label: &'static str },
    Warning(String),
    RecordSaved { record_id: String, created: bool },
    DraftSaved { at: DateTime<Utc> },
}

pub type WizardEmitter = Arc<dyn Fn(WizardEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    CloseImmediately,
    OfferSaveDraft,
    ConfirmDiscardChanges,
}

/// Single-flight flag for submissions. Clones share the flag so a host can check it from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct SubmissionGate {
    busy: Arc<AtomicBool>,
}

impl SubmissionGate {
    pub fn try_begin(&self) -> Option<SubmissionGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SubmissionGuard {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Releases the gate when dropped, including when the submit future is dropped mid-flight.
#[derive(Debug)]
pub struct SubmissionGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    pub record: PersistedRecord,
    pub created: bool,
    pub uploaded_files: usize,
    pub question_answers: usize,
    pub attachments: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftRestore {
    pub current_step: usize,
    pub saved_at: DateTime<Utc>,
    pub applied_answers: Vec<String>,
    pub dropped_answers: Vec<String>,
    /// Files that were not uploaded when the draft was saved and must be picked again.
    pub files_to_reselect: Vec<String>,
}

pub struct WizardOrchestrator {
    api: Arc<dyn RecordApi>,
    state: WizardState,
    mode: WizardMode,
    original: Option<WizardSnapshot>,
    loader: QuestionSchemaLoader,
    rehydrator: AnswerRehydrator,
    attachments: AttachmentPipeline,
    drafts: DraftStore,
    phase: SubmissionPhase,
    gate: SubmissionGate,
    emitter: Option<WizardEmitter>,
}

impl WizardOrchestrator {
    pub fn new(
        api: Arc<dyn RecordApi>,
        storage: Arc<dyn DraftStorage>,
        user_id: Option<&str>,
        cfg: &WizardConfig,
    ) -> Self {
        info!(
            "[PHASE: wizard] [STEP: init] Wizard created (user={})",
            user_id.map(mask_sensitive).unwrap_or_else(|| "anonymous".to_string())
        );
        Self {
            loader: QuestionSchemaLoader::new(api.clone()),
            rehydrator: AnswerRehydrator::new(
                cfg.rehydration.max_attempts,
                cfg.rehydration.interval(),
            ),
            attachments: AttachmentPipeline::new(
                api.clone(),
                AttachmentPolicy {
                    max_file_bytes: cfg.attachments.max_file_bytes,
                },
            ),
            drafts: DraftStore::new(storage, &cfg.drafts.record_type, user_id),
            api,
            state: WizardState::default(),
            mode: WizardMode::Add,
            original: None,
            phase: SubmissionPhase::Editing,
            gate: SubmissionGate::default(),
            emitter: None,
        }
    }

    pub fn with_emitter(mut self, emitter: WizardEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    // =========================
    // Accessors
    // =========================

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn mode(&self) -> &WizardMode {
        &self.mode
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    pub fn current_step(&self) -> usize {
        self.state.current_step
    }

    pub fn total_steps(&self) -> usize {
        steps::total_steps(self.state.kind)
    }

    pub fn step_labels(&self) -> Vec<&'static str> {
        steps::step_labels(self.state.kind)
    }

    pub fn questions(&self) -> &[QuestionSchema] {
        self.loader.questions()
    }

    pub fn schema_status(&self) -> SchemaStatus {
        self.loader.status()
    }

    pub fn subscribe_schema(&self) -> tokio::sync::watch::Receiver<SchemaStatus> {
        self.loader.subscribe()
    }

    pub fn original_snapshot(&self) -> Option<&WizardSnapshot> {
        self.original.as_ref()
    }

    pub fn draft_saved_at(&self) -> Option<DateTime<Utc>> {
        self.drafts.last_saved_at()
    }

    pub fn submission_gate(&self) -> SubmissionGate {
        self.gate.clone()
    }

    fn emit(&self, event: WizardEvent) {
        if let Some(emitter) = &self.emitter {
            emitter(event);
        }
    }

    fn warn_host(&self, message: String) {
        warn!("[PHASE: wizard] {}", message);
        self.emit(WizardEvent::Warning(message));
    }

    fn set_phase(&mut self, phase: SubmissionPhase) {
        if self.phase == phase {
            return;
        }
        info!(
            "[PHASE: submit] [STEP: {}] {} -> {}",
            phase.as_str(),
            self.phase.as_str(),
            phase.as_str()
        );
        self.phase = phase;
        self.emit(WizardEvent::PhaseChanged(phase));
    }

    /// Any edit invalidates the saved draft and leaves a finished submission behind.
    fn touch(&mut self) {
        self.drafts.mark_dirty();
        if self.phase == SubmissionPhase::Done {
            self.set_phase(SubmissionPhase::Editing);
        }
    }

    fn reset_form(&mut self) {
        self.state = WizardState::default();
        self.original = None;
        self.loader.clear();
        self.drafts.mark_dirty();
    }

    // =========================
    // Lifecycle
    // =========================

    /// Start an empty add-mode wizard. Returns whether a stored draft is available to resume.
    pub async fn open_add(&mut self) -> bool {
        self.reset_form();
        self.mode = WizardMode::Add;
        self.set_phase(SubmissionPhase::Editing);
        let exists = self.drafts.exists().await;
        info!(
            "[PHASE: wizard] [STEP: open] Add mode (draft_available={})",
            exists
        );
        exists
    }

    /// Fetch an existing record, hydrate the wizard from it and capture the original snapshot.
    pub async fn open_edit(&mut self, record_id: &str) -> Result<(), WizardError> {
        let record = self.api.fetch_record(record_id).await.map_err(|e| {
            warn!(
                "[PHASE: wizard] [STEP: open] Record fetch failed: {}",
                e.internal_details
            );
            WizardError::RecordLoad(e.user_message(RECORD_LOAD_FALLBACK_MESSAGE))
        })?;

        self.reset_form();
        self.mode = WizardMode::Edit {
            record_id: record.id.clone(),
        };
        self.set_phase(SubmissionPhase::Editing);
        self.state.kind = record.kind;

        for (name, value) in &record.fields {
            match spec_for(name) {
                Some(spec) => {
                    if let Some(v) = value_from_json(spec, value) {
                        self.state.fields.insert(name.clone(), v);
                    }
                }
                None => log::debug!("[PHASE: wizard] [STEP: open] Ignoring unknown field '{}'", name),
            }
        }

        self.state.attachments = record
            .attachments
            .iter()
            .cloned()
            .map(Attachment::persisted)
            .collect();
        self.state.testimony_attachments = record
            .testimony_attachments
            .iter()
            .cloned()
            .map(Attachment::persisted)
            .collect();

        let stored: AnswerMap = record
            .question_answers
            .iter()
            .map(|a| (a.question_id.clone(), a.answer.clone()))
            .collect();
        self.rehydrate_answers(&stored).await;

        self.original = Some(self.state.snapshot());
        info!(
            "[PHASE: wizard] [STEP: open] Edit mode (record={}, kind={}, answers={}, attachments={})",
            record.id,
            record.kind.as_str(),
            self.state.question_answers.len(),
            self.state.attachments.len() + self.state.testimony_attachments.len()
        );
        Ok(())
    }

    /// Load the schema of the current category and apply `stored` answers once it is ready.
    async fn rehydrate_answers(&mut self, stored: &AnswerMap) -> (Vec<String>, Vec<String>) {
        let category = self.state.field_text(CATEGORY_ID).to_string();
        if category.is_empty() {
            if !stored.is_empty() {
                self.warn_host(format!(
                    "{} stored answer(s) dropped because no category is selected",
                    stored.len()
                ));
            }
            return (Vec::new(), stored.keys().cloned().collect());
        }

        let outcome = self
            .rehydrator
            .rehydrate(&mut self.loader, &category, stored, &mut self.state.question_answers)
            .await;
        if outcome.gave_up {
            self.warn_host(format!(
                "Questions for the selected category could not be loaded; {} stored answer(s) were dropped",
                outcome.dropped.len()
            ));
        }
        (outcome.applied, outcome.dropped)
    }

    /// Host unmount or navigation away. Pending results are no longer of interest.
    pub fn abandon(&mut self) {
        info!("[PHASE: wizard] [STEP: abandon] Wizard abandoned (phase={})", self.phase.as_str());
        self.reset_form();
        self.mode = WizardMode::Add;
        self.set_phase(SubmissionPhase::Editing);
    }

    // =========================
    // Editing
    // =========================

    pub fn set_kind(&mut self, kind: RecordKind) {
        if self.state.kind == kind {
            return;
        }
        self.state.kind = kind;
        let total = steps::total_steps(kind);
        if self.state.current_step > total {
            self.state.current_step = total;
        }
        if !kind.requires_testimony_attachment() && !self.state.testimony_attachments.is_empty() {
            self.warn_host(format!(
                "{} testimony attachment(s) are kept but will not be submitted with a {} record",
                self.state.testimony_attachments.len(),
                kind.as_str()
            ));
        }
        self.touch();
    }

    /// Set a scalar field. Changing the category reloads its question set, keeping answers for
    /// questions that exist in both.
    pub async fn set_field(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Option<SchemaReload>, WizardError> {
        let spec = spec_for(name).ok_or_else(|| WizardError::UnknownField(name.to_string()))?;
        let value = coerce_field(spec, value.into()).ok_or(WizardError::InvalidFieldValue {
            field: spec.name,
            expected: spec.kind.describe(),
        })?;
        self.touch();

        if spec.name != CATEGORY_ID {
            self.state.fields.insert(spec.name.to_string(), value);
            return Ok(None);
        }

        let previous = self.state.field_text(CATEGORY_ID).to_string();
        let next = value.as_text().map(str::trim).unwrap_or("").to_string();
        self.state.fields.insert(spec.name.to_string(), value);
        if next == previous && (next.is_empty() || self.loader.is_ready_for(&next)) {
            return Ok(None);
        }
        self.state.fields.remove(SUB_CATEGORY_ID);

        if next.is_empty() {
            self.loader.clear();
            self.state.question_answers.clear();
            return Ok(None);
        }

        match self
            .loader
            .load(&next, true, &mut self.state.question_answers)
            .await
        {
            Ok(reload) => Ok(Some(reload)),
            Err(e) => {
                self.warn_host(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn clear_field(&mut self, name: &str) -> Result<(), WizardError> {
        let spec = spec_for(name).ok_or_else(|| WizardError::UnknownField(name.to_string()))?;
        if spec.name == CATEGORY_ID {
            self.set_field(CATEGORY_ID, "").await?;
        }
        self.state.fields.remove(spec.name);
        self.touch();
        Ok(())
    }

    pub fn set_answer(
        &mut self,
        question_id: &str,
        answer: impl Into<String>,
    ) -> Result<(), WizardError> {
        let question = self
            .loader
            .question(question_id)
            .ok_or_else(|| WizardError::UnknownQuestion(question_id.to_string()))?;
        let answer = answer.into();
        question
            .check_answer(&answer)
            .map_err(|message| WizardError::InvalidAnswer {
                question_id: question_id.to_string(),
                message,
            })?;
        self.state
            .question_answers
            .insert(question_id.to_string(), answer);
        self.touch();
        Ok(())
    }

    /// Multi-choice answers are stored as a JSON array of the selected options.
    pub fn set_multi_answer<S: AsRef<str>>(
        &mut self,
        question_id: &str,
        selected: &[S],
    ) -> Result<(), WizardError> {
        let encoded = serde_json::Value::Array(
            selected
                .iter()
                .map(|s| serde_json::Value::String(s.as_ref().to_string()))
                .collect(),
        )
        .to_string();
        self.set_answer(question_id, encoded)
    }

    pub fn add_attachments(&mut self, group: AttachmentGroup, files: Vec<LocalFile>) -> AddFilesOutcome {
        let outcome = self
            .attachments
            .add_files(self.state.group_mut(group), files);
        for rejection in &outcome.rejected {
            self.emit(WizardEvent::Warning(rejection.to_string()));
        }
        if !outcome.accepted.is_empty() {
            self.touch();
        }
        outcome
    }

    pub fn remove_attachment(
        &mut self,
        group: AttachmentGroup,
        index: usize,
    ) -> Result<Attachment, WizardError> {
        let list = self.state.group_mut(group);
        if index >= list.len() {
            return Err(WizardError::AttachmentIndex { index });
        }
        let removed = list.remove(index);
        self.touch();
        Ok(removed)
    }

    /// Replace a restored placeholder (or any entry) with a freshly picked file.
    pub fn reselect_attachment(
        &mut self,
        group: AttachmentGroup,
        index: usize,
        file: LocalFile,
    ) -> Result<(), WizardError> {
        self.attachments.policy().check(&file)?;
        let list = self.state.group_mut(group);
        let slot = list
            .get_mut(index)
            .ok_or(WizardError::AttachmentIndex { index })?;
        *slot = Attachment::new_file(file);
        self.touch();
        Ok(())
    }

    // =========================
    // Navigation
    // =========================

    fn report_invalid(&self, invalid: &StepInvalid) {
        info!(
            "[PHASE: wizard] [STEP: validate] Step {} ({}) invalid: {:?}",
            invalid.step, invalid.label, invalid.fields
        );
        self.emit(WizardEvent::StepInvalid {
            step: invalid.step,
            label: invalid.label,
        });
    }

    fn navigation_result<T>(&self, result: Result<T, WizardError>) -> Result<T, WizardError> {
        if let Err(WizardError::Validation(invalid)) = &result {
            self.report_invalid(invalid);
        }
        result
    }

    /// First failing step before `target`, if any.
    pub fn can_advance(&mut self, target: usize) -> Option<usize> {
        steps::can_advance(&mut self.state, &self.loader, target)
            .err()
            .map(|invalid| invalid.step)
    }

    pub fn next_step(&mut self) -> Result<usize, WizardError> {
        let result = steps::next_step(&mut self.state, &self.loader);
        self.navigation_result(result)
    }

    pub fn previous_step(&mut self) -> usize {
        steps::previous_step(&mut self.state)
    }

    pub fn go_to_step(&mut self, target: usize) -> Result<(), WizardError> {
        let result = steps::go_to_step(&mut self.state, &self.loader, target);
        self.navigation_result(result)
    }

    // =========================
    // Drafts
    // =========================

    pub async fn save_draft(&mut self) -> Result<DateTime<Utc>, WizardError> {
        if self.mode != WizardMode::Add {
            return Err(WizardError::DraftUnavailable);
        }
        let at = self.drafts.save(&self.state).await?;
        self.emit(WizardEvent::DraftSaved { at });
        Ok(at)
    }

    /// Replace the current content with the stored draft. `None` when there is nothing to resume.
    pub async fn resume_draft(&mut self) -> Result<Option<DraftRestore>, WizardError> {
        if self.mode != WizardMode::Add {
            return Err(WizardError::DraftUnavailable);
        }
        let Some(record) = self.drafts.load().await? else {
            return Ok(None);
        };

        self.reset_form();
        self.state.kind = record.kind;
        self.state.fields = record.fields.clone();
        if let Some(category) = &record.category_id {
            if self.state.field_text(CATEGORY_ID).is_empty() {
                self.state
                    .fields
                    .insert(CATEGORY_ID.to_string(), FieldValue::Text(category.clone()));
            }
        }

        let restored = restore_attachments(&record.attachment_metadata);
        self.state.testimony_attachments = restored.testimony;
        self.state.attachments = restored.general;

        let (applied, dropped) = self.rehydrate_answers(&record.question_answers).await;

        let total = steps::total_steps(self.state.kind);
        self.state.current_step = record.current_step.clamp(1, total);

        if !restored.to_reselect.is_empty() {
            self.warn_host(format!(
                "Please select these file(s) again: {}",
                restored.to_reselect.join(", ")
            ));
        }
        self.drafts.mark_restored(record.timestamp);

        Ok(Some(DraftRestore {
            current_step: self.state.current_step,
            saved_at: record.timestamp,
            applied_answers: applied,
            dropped_answers: dropped,
            files_to_reselect: restored.to_reselect,
        }))
    }

    pub async fn discard_draft(&mut self) -> Result<(), WizardError> {
        self.drafts.clear().await
    }

    // =========================
    // Change detection
    // =========================

    /// Edit mode only; always false in add mode.
    pub fn has_changes(&self) -> bool {
        self.original
            .as_ref()
            .map(|original| changes::has_changes(&self.state, original))
            .unwrap_or(false)
    }

    pub fn has_form_data(&self) -> bool {
        changes::has_form_data(&self.state)
    }

    pub fn close_decision(&self) -> CloseDecision {
        match self.mode {
            WizardMode::Add => {
                if self.has_form_data() && !self.drafts.is_explicitly_saved() {
                    CloseDecision::OfferSaveDraft
                } else {
                    CloseDecision::CloseImmediately
                }
            }
            WizardMode::Edit { .. } => {
                if self.phase != SubmissionPhase::Done && self.has_changes() {
                    CloseDecision::ConfirmDiscardChanges
                } else {
                    CloseDecision::CloseImmediately
                }
            }
        }
    }

    // =========================
    // Submission
    // =========================

    /// Payload for the current state and the given attachment references.
    pub fn build_payload(&self, attachments: Vec<FileReference>) -> RecordPayload {
        let kind = self.state.kind;
        let fields = FIELD_CATALOG
            .iter()
            .filter(|spec| spec.section.applies_to(kind))
            .filter_map(|spec| {
                self.state
                    .fields
                    .get(spec.name)
                    .filter(|v| !v.is_empty())
                    .map(|v| (spec.name.to_string(), v.to_json()))
            })
            .collect();

        let question_answers = match kind {
            RecordKind::Questionnaire => self.loader.answered_in_order(&self.state.question_answers),
            RecordKind::Testimony => Vec::new(),
        };

        RecordPayload {
            kind,
            fields,
            question_answers,
            attachments,
        }
    }

    fn fail_submission(&mut self, error: &WizardError) {
        self.set_phase(SubmissionPhase::Failed);
        self.warn_host(error.to_string());
        self.set_phase(SubmissionPhase::Editing);
    }

    /// Validate everything, upload new files, then create or update the record.
    pub async fn submit(&mut self) -> Result<SubmitReceipt, WizardError> {
        let _guard = self.gate.try_begin().ok_or(WizardError::SubmitInFlight)?;

        self.set_phase(SubmissionPhase::Validating);
        let total = steps::total_steps(self.state.kind);
        if let Err(invalid) = steps::can_advance(&mut self.state, &self.loader, total + 1) {
            self.report_invalid(&invalid);
            self.set_phase(SubmissionPhase::Editing);
            return Err(invalid.into());
        }

        let testimony_active = self.state.kind.requires_testimony_attachment();
        let mut pending = pending_uploads(&self.state.attachments);
        if testimony_active {
            pending += pending_uploads(&self.state.testimony_attachments);
        }
        if pending > 0 {
            self.set_phase(SubmissionPhase::Uploading);
        }

        let uploaded = {
            let state = &mut self.state;
            let testimony = if testimony_active {
                Some(&mut state.testimony_attachments)
            } else {
                None
            };
            self.attachments
                .prepare_submission(testimony, &mut state.attachments)
                .await
        };
        let references = match uploaded {
            Ok(refs) => refs,
            Err(e) => {
                self.fail_submission(&e);
                return Err(e);
            }
        };

        self.set_phase(SubmissionPhase::Submitting);
        let payload = self.build_payload(references);
        let created = self.mode == WizardMode::Add;
        info!(
            "[PHASE: submit] [STEP: submitting] Sending record (created={}, fields={}, answers={}, attachments={})",
            created,
            payload.fields.len(),
            payload.question_answers.len(),
            payload.attachments.len()
        );

        let result = match &self.mode {
            WizardMode::Add => self.api.create_record(&payload).await,
            WizardMode::Edit { record_id } => self.api.update_record(record_id, &payload).await,
        };
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "[PHASE: submit] [STEP: submitting] Record rejected: {}",
                    e.internal_details
                );
                let err = WizardError::Submission(e.user_message(SUBMISSION_FALLBACK_MESSAGE));
                self.fail_submission(&err);
                return Err(err);
            }
        };

        self.set_phase(SubmissionPhase::Done);
        let receipt = SubmitReceipt {
            created,
            uploaded_files: pending,
            question_answers: payload.question_answers.len(),
            attachments: payload.attachments.len(),
            record,
        };
        self.emit(WizardEvent::RecordSaved {
            record_id: receipt.record.id.clone(),
            created,
        });

        if created {
            if let Err(e) = self.drafts.clear().await {
                warn!("[PHASE: submit] [STEP: done] Draft could not be cleared: {}", e);
            }
            self.reset_form();
        }

        info!(
            "[PHASE: submit] [STEP: done] Record {} saved",
            receipt.record.id
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::demo::{DemoRecordApi, DEMO_CATEGORY_HARASSMENT, DEMO_CATEGORY_LABOR};
    use crate::models::requests::QuestionAnswerDto;
    use crate::wizard::drafts::MemoryDraftStorage;
    use crate::wizard::fields::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct Harness {
        api: Arc<DemoRecordApi>,
        storage: Arc<MemoryDraftStorage>,
        events: Arc<Mutex<Vec<WizardEvent>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                api: Arc::new(DemoRecordApi::seeded()),
                storage: Arc::new(MemoryDraftStorage::new()),
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn wizard(&self) -> WizardOrchestrator {
            let mut cfg = WizardConfig::default();
            cfg.rehydration.interval_ms = 1;
            cfg.rehydration.max_attempts = 3;
            let events = self.events.clone();
            WizardOrchestrator::new(self.api.clone(), self.storage.clone(), Some("user-0001"), &cfg)
                .with_emitter(Arc::new(move |e: WizardEvent| events.lock().unwrap().push(e)))
        }

        fn phases(&self) -> Vec<SubmissionPhase> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    WizardEvent::PhaseChanged(p) => Some(*p),
                    _ => None,
                })
                .collect()
        }

        fn warnings(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    WizardEvent::Warning(w) => Some(w.clone()),
                    _ => None,
                })
                .collect()
        }

        fn clear_events(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    async fn fill_basic_info(w: &mut WizardOrchestrator, category: &str) {
        w.set_field(CITY_ID, "riga").await.unwrap();
        w.set_field(CATEGORY_ID, category).await.unwrap();
        w.set_field(VIOLATION_DATE, NaiveDate::from_ymd_opt(2026, 4, 1).unwrap())
            .await
            .unwrap();
        w.set_field(LOCATION, "harbour").await.unwrap();
        w.set_field(REPORTER_ROLE, "victim").await.unwrap();
    }

    fn pdf(name: &str) -> LocalFile {
        LocalFile::from_bytes(name, "application/pdf", vec![7u8; 32])
    }

    #[tokio::test]
    async fn add_mode_questionnaire_happy_path() {
        let h = Harness::new();
        let mut w = h.wizard();
        assert!(!w.open_add().await);

        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        assert_eq!(w.questions().len(), 3);
        assert_eq!(w.next_step().unwrap(), 2);
        assert_eq!(w.next_step().unwrap(), 3);
        assert_eq!(w.next_step().unwrap(), 4);

        w.set_answer("witnesses", "yes").unwrap();
        w.set_answer("unpaid-wages", "1200").unwrap();
        assert_eq!(w.next_step().unwrap(), 5);
        assert_eq!(w.next_step().unwrap(), 6);
        assert_eq!(w.step_labels()[5], "Review");

        h.clear_events();
        let receipt = w.submit().await.unwrap();
        assert!(receipt.created);
        assert_eq!(receipt.question_answers, 2);
        assert_eq!(receipt.attachments, 0);

        let created = h.api.created_payloads();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].question_answers.len(), 2);
        assert_eq!(created[0].attachments.len(), 0);
        assert_eq!(created[0].question_answers[0].question_id, "witnesses");
        assert_eq!(created[0].fields.get(CITY_ID), Some(&serde_json::json!("riga")));
        assert_eq!(
            created[0].fields.get(VIOLATION_DATE),
            Some(&serde_json::json!("2026-04-01"))
        );
        assert!(h.api.upload_batches().is_empty());

        assert_eq!(
            h.phases(),
            vec![
                SubmissionPhase::Validating,
                SubmissionPhase::Submitting,
                SubmissionPhase::Done
            ]
        );
        // Add mode resets after success
        assert_eq!(w.current_step(), 1);
        assert!(!w.has_form_data());
    }

    #[tokio::test]
    async fn submit_with_invalid_step_is_blocked_without_moving() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        w.go_to_step(4).unwrap();

        let err = w.submit().await.unwrap_err();
        assert_eq!(err.failing_step(), Some(4));
        assert_eq!(w.current_step(), 4);
        assert_eq!(w.phase(), SubmissionPhase::Editing);
        assert!(w.state().touched.contains("question:witnesses"));
        assert!(h.api.created_payloads().is_empty());
        assert!(h
            .events
            .lock()
            .unwrap()
            .contains(&WizardEvent::StepInvalid { step: 4, label: "Questions" }));
    }

    #[tokio::test]
    async fn draft_resume_restores_step_fields_and_answers() {
        let h = Harness::new();
        {
            let mut w = h.wizard();
            w.open_add().await;
            fill_basic_info(&mut w, DEMO_CATEGORY_HARASSMENT).await;
            w.go_to_step(3).unwrap();
            w.set_answer("frequency", "weekly").unwrap();
            w.save_draft().await.unwrap();
            assert_eq!(w.close_decision(), CloseDecision::CloseImmediately);
        }

        // Simulated reload: a fresh wizard over the same storage.
        let mut w = h.wizard();
        assert!(w.open_add().await);
        assert!(w.questions().is_empty());
        let restore = w.resume_draft().await.unwrap().unwrap();

        assert_eq!(restore.current_step, 3);
        assert_eq!(w.current_step(), 3);
        assert_eq!(w.state().field_text(CITY_ID), "riga");
        assert_eq!(restore.applied_answers, vec!["frequency".to_string()]);
        assert_eq!(
            w.state().question_answers.get("frequency").map(String::as_str),
            Some("weekly")
        );
        assert_eq!(w.questions().len(), 3);
        assert_eq!(w.close_decision(), CloseDecision::CloseImmediately);
    }

    #[tokio::test]
    async fn resume_warns_about_files_to_reselect_and_keeps_uploaded_ones() {
        let h = Harness::new();
        {
            let mut w = h.wizard();
            w.open_add().await;
            w.add_attachments(AttachmentGroup::General, vec![pdf("local.pdf")]);
            w.save_draft().await.unwrap();
        }
        let mut w = h.wizard();
        w.open_add().await;
        h.clear_events();
        let restore = w.resume_draft().await.unwrap().unwrap();
        assert_eq!(restore.files_to_reselect, vec!["local.pdf".to_string()]);
        assert!(h.warnings().iter().any(|m| m.contains("local.pdf")));
        assert_eq!(w.state().attachments.len(), 1);

        // Placeholder is not submitted; picking the file again makes it uploadable.
        let payload = w.build_payload(Vec::new());
        assert!(payload.attachments.is_empty());
        w.reselect_attachment(AttachmentGroup::General, 0, pdf("local.pdf"))
            .unwrap();
        assert!(w.state().attachments[0].is_new());
    }

    #[tokio::test]
    async fn restored_placeholder_blocks_submit_until_file_is_picked_again() {
        let h = Harness::new();
        {
            let mut w = h.wizard();
            w.open_add().await;
            fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
            w.set_answer("witnesses", "yes").unwrap();
            w.set_answer("unpaid-wages", "40").unwrap();
            w.add_attachments(AttachmentGroup::General, vec![pdf("ev.pdf")]);
            w.save_draft().await.unwrap();
        }
        let mut w = h.wizard();
        w.open_add().await;
        w.resume_draft().await.unwrap().unwrap();
        h.clear_events();

        let err = w.submit().await.unwrap_err();
        assert_eq!(err.failing_step(), Some(5));
        assert_eq!(w.phase(), SubmissionPhase::Editing);
        assert!(w.state().touched.contains(steps::RESELECT_ATTACHMENTS_KEY));
        assert!(h.api.created_payloads().is_empty());
        assert!(h.api.upload_batches().is_empty());
        assert!(h
            .events
            .lock()
            .unwrap()
            .contains(&WizardEvent::StepInvalid { step: 5, label: "Attachments" }));

        w.reselect_attachment(AttachmentGroup::General, 0, pdf("ev.pdf"))
            .unwrap();
        let receipt = w.submit().await.unwrap();
        assert_eq!(receipt.uploaded_files, 1);
        assert_eq!(receipt.attachments, 1);
        assert_eq!(h.api.created_payloads()[0].attachments[0].file_name, "ev.pdf");
    }

    #[tokio::test]
    async fn removing_restored_placeholder_also_unblocks_submit() {
        let h = Harness::new();
        {
            let mut w = h.wizard();
            w.open_add().await;
            fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
            w.set_answer("witnesses", "no").unwrap();
            w.set_answer("unpaid-wages", "0").unwrap();
            w.add_attachments(AttachmentGroup::General, vec![pdf("ev.pdf")]);
            w.save_draft().await.unwrap();
        }
        let mut w = h.wizard();
        w.open_add().await;
        w.resume_draft().await.unwrap().unwrap();
        assert!(w.submit().await.is_err());

        w.remove_attachment(AttachmentGroup::General, 0).unwrap();
        let receipt = w.submit().await.unwrap();
        assert_eq!(receipt.attachments, 0);
        assert_eq!(h.api.created_payloads().len(), 1);
    }

    #[tokio::test]
    async fn typed_fields_are_parsed_or_rejected() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;

        for (name, raw, expected) in [
            (VIOLATION_DATE, "not-a-date", "date"),
            (VICTIM_COUNT, "many", "number"),
            (IS_ANONYMOUS, "maybe", "yes/no"),
        ] {
            match w.set_field(name, raw).await {
                Err(WizardError::InvalidFieldValue { field, expected: kind }) => {
                    assert_eq!(field, name);
                    assert_eq!(kind, expected);
                }
                other => panic!("{} accepted {:?}: {:?}", name, raw, other),
            }
            assert!(w.state().fields.get(name).is_none());
        }
        assert!(!w.has_form_data());

        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        w.set_field(VIOLATION_DATE, "2026-04-02").await.unwrap();
        w.set_field(VICTIM_COUNT, "3").await.unwrap();
        w.set_field(IS_ANONYMOUS, "yes").await.unwrap();
        assert_eq!(w.state().fields.get(VICTIM_COUNT), Some(&FieldValue::Number(3.0)));
        assert_eq!(w.state().fields.get(IS_ANONYMOUS), Some(&FieldValue::Bool(true)));

        w.set_answer("witnesses", "yes").unwrap();
        w.set_answer("unpaid-wages", "90").unwrap();
        w.submit().await.unwrap();
        let fields = &h.api.created_payloads()[0].fields;
        assert_eq!(fields.get(VIOLATION_DATE), Some(&serde_json::json!("2026-04-02")));
        assert_eq!(fields.get(VICTIM_COUNT), Some(&serde_json::json!(3.0)));
        assert_eq!(fields.get(IS_ANONYMOUS), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn choice_answers_outside_the_offered_options_are_rejected() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        w.set_field(CATEGORY_ID, DEMO_CATEGORY_HARASSMENT).await.unwrap();

        assert!(matches!(
            w.set_answer("frequency", "hourly"),
            Err(WizardError::InvalidAnswer { ref question_id, .. }) if question_id == "frequency"
        ));
        assert!(w.state().question_answers.get("frequency").is_none());
        w.set_answer("frequency", "weekly").unwrap();
        w.set_answer("reported-before", "only to a colleague").unwrap();

        w.set_field(CATEGORY_ID, DEMO_CATEGORY_LABOR).await.unwrap();
        assert!(w
            .set_multi_answer("contract-issues", &["no written contract", "overtime"])
            .is_err());
        assert!(w.state().question_answers.get("contract-issues").is_none());

        w.set_multi_answer("contract-issues", &["no contract", "excess hours"])
            .unwrap();
        assert_eq!(
            w.state().question_answers.get("contract-issues").map(String::as_str),
            Some(r#"["no contract","excess hours"]"#)
        );
    }

    #[tokio::test]
    async fn edit_mode_orders_persisted_before_new_files() {
        let h = Harness::new();
        h.api.insert_record(PersistedRecord {
            id: "rec-1".to_string(),
            kind: RecordKind::Questionnaire,
            fields: BTreeMap::from([
                (CITY_ID.to_string(), serde_json::json!("riga")),
                (CATEGORY_ID.to_string(), serde_json::json!(DEMO_CATEGORY_LABOR)),
                (VIOLATION_DATE.to_string(), serde_json::json!("2026-01-05")),
                (LOCATION.to_string(), serde_json::json!("docks")),
                (REPORTER_ROLE.to_string(), serde_json::json!("witness")),
            ]),
            question_answers: vec![
                QuestionAnswerDto {
                    question_id: "witnesses".to_string(),
                    answer: "no".to_string(),
                },
                QuestionAnswerDto {
                    question_id: "unpaid-wages".to_string(),
                    answer: "300".to_string(),
                },
            ],
            attachments: vec![FileReference {
                file_name: "contract.pdf".to_string(),
                url: "/files/contract.pdf".to_string(),
            }],
            testimony_attachments: Vec::new(),
            updated_at: None,
        });

        let mut w = h.wizard();
        w.open_edit("rec-1").await.unwrap();
        assert!(!w.has_changes());
        assert_eq!(w.close_decision(), CloseDecision::CloseImmediately);
        assert_eq!(w.state().question_answers.len(), 2);

        let outcome = w.add_attachments(AttachmentGroup::General, vec![pdf("p1.pdf"), pdf("p2.pdf")]);
        assert_eq!(outcome.accepted.len(), 2);
        assert!(w.has_changes());
        assert_eq!(w.close_decision(), CloseDecision::ConfirmDiscardChanges);

        h.clear_events();
        let receipt = w.submit().await.unwrap();
        assert!(!receipt.created);
        assert_eq!(receipt.uploaded_files, 2);

        let updated = h.api.updated_payloads();
        assert_eq!(updated.len(), 1);
        let names: Vec<&str> = updated[0]
            .1
            .attachments
            .iter()
            .map(|r| r.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["contract.pdf", "p1.pdf", "p2.pdf"]);
        assert_eq!(
            h.phases(),
            vec![
                SubmissionPhase::Validating,
                SubmissionPhase::Uploading,
                SubmissionPhase::Submitting,
                SubmissionPhase::Done
            ]
        );

        // The loaded baseline stays as it was; a finished update closes without asking.
        assert_eq!(w.original_snapshot().unwrap().attachment_count, 1);
        assert!(w.has_changes());
        assert_eq!(w.close_decision(), CloseDecision::CloseImmediately);

        w.set_field(LOCATION, "pier 4").await.unwrap();
        assert_eq!(w.phase(), SubmissionPhase::Editing);
        assert_eq!(w.close_decision(), CloseDecision::ConfirmDiscardChanges);
    }

    #[tokio::test]
    async fn has_changes_flips_on_single_field_edit() {
        let h = Harness::new();
        h.api.insert_record(PersistedRecord {
            id: "rec-2".to_string(),
            kind: RecordKind::Testimony,
            fields: BTreeMap::from([(CITY_ID.to_string(), serde_json::json!("riga"))]),
            question_answers: Vec::new(),
            attachments: Vec::new(),
            testimony_attachments: Vec::new(),
            updated_at: None,
        });
        let mut w = h.wizard();
        w.open_edit("rec-2").await.unwrap();
        assert!(!w.has_changes());
        assert!(matches!(w.save_draft().await, Err(WizardError::DraftUnavailable)));

        w.set_field(PHONE, "+371 2000 0000").await.unwrap();
        assert!(w.has_changes());
    }

    #[tokio::test]
    async fn testimony_requires_attachment_questionnaire_does_not() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        w.set_kind(RecordKind::Testimony);
        assert_eq!(w.total_steps(), 7);
        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        w.set_field(TESTIMONY_TEXT, "I saw it happen").await.unwrap();
        w.go_to_step(5).unwrap();
        assert_eq!(w.can_advance(6), Some(5));
        assert!(w.next_step().is_err());

        w.add_attachments(AttachmentGroup::Testimony, vec![pdf("statement.pdf")]);
        assert_eq!(w.next_step().unwrap(), 6);

        let mut q = h.wizard();
        q.open_add().await;
        fill_basic_info(&mut q, DEMO_CATEGORY_LABOR).await;
        q.set_answer("witnesses", "no").unwrap();
        q.set_answer("unpaid-wages", "0").unwrap();
        q.go_to_step(5).unwrap();
        assert_eq!(q.next_step().unwrap(), 6);
    }

    #[tokio::test]
    async fn testimony_payload_puts_testimony_files_first() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        w.set_kind(RecordKind::Testimony);
        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        w.set_field(TESTIMONY_TEXT, "statement").await.unwrap();
        w.add_attachments(AttachmentGroup::General, vec![pdf("photo.pdf")]);
        w.add_attachments(AttachmentGroup::Testimony, vec![pdf("testimony.pdf")]);
        w.set_answer("witnesses", "yes").unwrap();

        w.submit().await.unwrap();
        let created = h.api.created_payloads();
        let names: Vec<&str> = created[0]
            .attachments
            .iter()
            .map(|r| r.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["testimony.pdf", "photo.pdf"]);
        assert!(created[0].question_answers.is_empty());
        assert!(created[0].fields.contains_key(TESTIMONY_TEXT));
    }

    #[tokio::test]
    async fn switching_to_questionnaire_clamps_step_and_drops_testimony_from_payload() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        w.set_kind(RecordKind::Testimony);
        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        w.set_field(TESTIMONY_TEXT, "statement").await.unwrap();
        w.add_attachments(AttachmentGroup::Testimony, vec![pdf("testimony.pdf")]);
        w.set_answer("witnesses", "yes").unwrap();
        w.set_answer("unpaid-wages", "10").unwrap();
        w.go_to_step(7).unwrap();

        h.clear_events();
        w.set_kind(RecordKind::Questionnaire);
        assert_eq!(w.current_step(), 6);
        assert_eq!(h.warnings().len(), 1);
        assert_eq!(w.state().testimony_attachments.len(), 1);

        w.submit().await.unwrap();
        let created = h.api.created_payloads();
        assert!(created[0].attachments.is_empty());
        assert!(!created[0].fields.contains_key(TESTIMONY_TEXT));
        assert_eq!(created[0].question_answers.len(), 2);
    }

    #[tokio::test]
    async fn category_switch_keeps_shared_answers_and_resets_sub_category() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        w.set_field(CATEGORY_ID, DEMO_CATEGORY_HARASSMENT).await.unwrap();
        w.set_field(SUB_CATEGORY_ID, "workplace").await.unwrap();
        w.set_answer("witnesses", "yes").unwrap();
        w.set_answer("frequency", "daily").unwrap();

        let reload = w
            .set_field(CATEGORY_ID, DEMO_CATEGORY_LABOR)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reload.dropped, vec!["frequency".to_string()]);
        assert_eq!(w.state().question_answers.len(), 1);
        assert_eq!(w.state().field_text(SUB_CATEGORY_ID), "");
        assert!(matches!(
            w.set_answer("frequency", "daily"),
            Err(WizardError::UnknownQuestion(_))
        ));

        w.clear_field(CATEGORY_ID).await.unwrap();
        assert!(w.questions().is_empty());
        assert!(w.state().question_answers.is_empty());
        assert_eq!(w.schema_status(), SchemaStatus::Idle);
    }

    #[tokio::test]
    async fn upload_failure_keeps_draft_and_returns_to_editing() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        w.set_answer("witnesses", "yes").unwrap();
        w.set_answer("unpaid-wages", "5").unwrap();
        w.add_attachments(AttachmentGroup::General, vec![pdf("evidence.pdf")]);
        w.save_draft().await.unwrap();

        h.api.fail_next_upload("Upload service is under maintenance");
        h.clear_events();
        let err = w.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "Upload service is under maintenance");
        assert_eq!(w.phase(), SubmissionPhase::Editing);
        assert_eq!(
            h.phases(),
            vec![
                SubmissionPhase::Validating,
                SubmissionPhase::Uploading,
                SubmissionPhase::Failed,
                SubmissionPhase::Editing
            ]
        );
        assert!(h.storage.get_raw("private_violation_draft_user-0001").is_some());
        assert!(w.state().attachments[0].is_new());
        assert!(!w.submission_gate().is_busy());

        // Retry succeeds and clears the draft.
        w.submit().await.unwrap();
        assert!(h.storage.get_raw("private_violation_draft_user-0001").is_none());
    }

    #[tokio::test]
    async fn submission_failure_does_not_reupload_on_retry() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        fill_basic_info(&mut w, DEMO_CATEGORY_LABOR).await;
        w.set_answer("witnesses", "yes").unwrap();
        w.set_answer("unpaid-wages", "5").unwrap();
        w.add_attachments(AttachmentGroup::General, vec![pdf("evidence.pdf")]);

        h.api.fail_next_submission("");
        let err = w.submit().await.unwrap_err();
        assert_eq!(err.to_string(), SUBMISSION_FALLBACK_MESSAGE);
        assert_eq!(h.api.upload_batches().len(), 1);
        assert!(w.state().attachments[0].is_uploaded);

        let receipt = w.submit().await.unwrap();
        assert_eq!(receipt.uploaded_files, 0);
        assert_eq!(receipt.attachments, 1);
        assert_eq!(h.api.upload_batches().len(), 1);
    }

    #[tokio::test]
    async fn second_submit_is_rejected_while_one_is_in_flight() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        let held = w.submission_gate().try_begin().unwrap();
        assert!(matches!(w.submit().await, Err(WizardError::SubmitInFlight)));
        drop(held);
        assert!(!w.submission_gate().is_busy());
    }

    #[tokio::test]
    async fn close_decision_in_add_mode() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        assert_eq!(w.close_decision(), CloseDecision::CloseImmediately);

        w.set_field(LOCATION, "square").await.unwrap();
        assert_eq!(w.close_decision(), CloseDecision::OfferSaveDraft);

        w.save_draft().await.unwrap();
        assert_eq!(w.close_decision(), CloseDecision::CloseImmediately);

        w.set_field(LOCATION, "market").await.unwrap();
        assert_eq!(w.close_decision(), CloseDecision::OfferSaveDraft);

        w.discard_draft().await.unwrap();
        w.abandon();
        assert!(!w.has_form_data());
        assert!(!w.open_add().await);
    }

    #[tokio::test]
    async fn quota_error_is_distinct_on_save() {
        let api = Arc::new(DemoRecordApi::seeded());
        let storage = Arc::new(MemoryDraftStorage::with_quota(16));
        let mut w = WizardOrchestrator::new(api, storage, None, &WizardConfig::default());
        w.open_add().await;
        w.set_field(LOCATION, "square").await.unwrap();
        assert!(matches!(w.save_draft().await, Err(WizardError::StorageQuota)));
        assert_eq!(w.close_decision(), CloseDecision::OfferSaveDraft);
    }

    #[tokio::test]
    async fn rejected_files_are_reported_individually() {
        let h = Harness::new();
        let mut w = h.wizard();
        w.open_add().await;
        h.clear_events();
        let outcome = w.add_attachments(
            AttachmentGroup::General,
            vec![
                pdf("ok.pdf"),
                LocalFile::from_bytes("virus.exe", "application/x-msdownload", vec![1]),
            ],
        );
        assert_eq!(outcome.accepted, vec!["ok.pdf".to_string()]);
        assert_eq!(h.warnings().len(), 1);
        assert!(h.warnings()[0].contains("virus.exe"));
        assert!(matches!(
            w.remove_attachment(AttachmentGroup::General, 3),
            Err(WizardError::AttachmentIndex { index: 3 })
        ));
        assert_eq!(
            w.remove_attachment(AttachmentGroup::General, 0).unwrap().display_name(),
            "ok.pdf"
        );
    }

    #[tokio::test]
    async fn edit_mode_rehydration_fails_open_when_schema_never_loads() {
        let h = Harness::new();
        h.api.insert_record(PersistedRecord {
            id: "rec-3".to_string(),
            kind: RecordKind::Questionnaire,
            fields: BTreeMap::from([(CATEGORY_ID.to_string(), serde_json::json!(DEMO_CATEGORY_LABOR))]),
            question_answers: vec![QuestionAnswerDto {
                question_id: "witnesses".to_string(),
                answer: "yes".to_string(),
            }],
            attachments: Vec::new(),
            testimony_attachments: Vec::new(),
            updated_at: None,
        });
        h.api.fail_question_fetches(10);

        let mut w = h.wizard();
        w.open_edit("rec-3").await.unwrap();
        assert!(w.state().question_answers.is_empty());
        assert_eq!(h.api.question_fetches(), 3);
        assert!(!h.warnings().is_empty());
        assert!(!w.has_changes());
    }
}
