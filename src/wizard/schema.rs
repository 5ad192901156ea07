// Dynamic question schema
//
// The loader owns the question set for one category at a time and publishes its status on a watch
// channel. Loads are awaited by the caller; answers are carried across reloads by question id.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::api::RecordApi;
use crate::error::WizardError;
use crate::models::requests::QuestionAnswerDto;
use crate::models::responses::QuestionDto;
use crate::models::state::AnswerMap;
use crate::utils::validation::answer_is_present;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    Text,
    Textarea,
    Number,
    Date,
    YesNo,
    SingleChoice,
    MultiChoice,
}

impl QuestionType {
    /// Unknown types render as plain text.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "text" => QuestionType::Text,
            "textarea" => QuestionType::Textarea,
            "number" => QuestionType::Number,
            "date" => QuestionType::Date,
            "yes_no" | "yesno" | "boolean" => QuestionType::YesNo,
            "single_choice" | "select" | "radio" => QuestionType::SingleChoice,
            "multi_choice" | "multiselect" | "checkbox" => QuestionType::MultiChoice,
            other => {
                debug!("[PHASE: schema] Unknown question type '{}', using text", other);
                QuestionType::Text
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSchema {
    pub id: String,
    pub order: i32,
    pub is_required: bool,
    pub question_type: QuestionType,
    pub category_id: String,
    pub label: String,
    pub options: Vec<String>,
}

impl QuestionSchema {
    fn from_dto(dto: QuestionDto, category_id: &str) -> Self {
        Self {
            label: dto.label.clone().unwrap_or_else(|| dto.id.clone()),
            question_type: QuestionType::parse(&dto.question_type),
            category_id: dto
                .category_id
                .unwrap_or_else(|| category_id.to_string()),
            id: dto.id,
            order: dto.order,
            is_required: dto.is_required,
            options: dto.options,
        }
    }

    pub fn is_answered(&self, answers: &AnswerMap) -> bool {
        answers
            .get(&self.id)
            .map(|a| answer_is_present(a))
            .unwrap_or(false)
    }

    /// Choice answers must come from `options` when the server lists any. Blank answers clear.
    pub fn check_answer(&self, answer: &str) -> Result<(), String> {
        let answer = answer.trim();
        if self.options.is_empty() || answer.is_empty() {
            return Ok(());
        }
        let offered = |choice: &str| self.options.iter().any(|o| o.trim() == choice.trim());
        match self.question_type {
            QuestionType::SingleChoice => {
                if offered(answer) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not one of the options", answer))
                }
            }
            QuestionType::MultiChoice => {
                let selected: Vec<String> = serde_json::from_str(answer)
                    .map_err(|_| "expected a list of selected options".to_string())?;
                match selected.iter().find(|s| !offered(s.as_str())) {
                    Some(unknown) => Err(format!("'{}' is not one of the options", unknown)),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    Idle,
    Loading {
        category_id: String,
        generation: u64,
    },
    Ready {
        category_id: String,
        generation: u64,
        question_count: usize,
    },
    Failed {
        category_id: String,
        generation: u64,
        message: String,
    },
}

/// Result of one completed schema load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReload {
    pub category_id: String,
    pub question_count: usize,
    /// Question ids whose answers survived the reload.
    pub kept: Vec<String>,
    /// Question ids whose answers were discarded because the question no longer exists.
    pub dropped: Vec<String>,
}

pub struct QuestionSchemaLoader {
    api: Arc<dyn RecordApi>,
    questions: Vec<QuestionSchema>,
    status_tx: watch::Sender<SchemaStatus>,
    generation: u64,
}

impl QuestionSchemaLoader {
    pub fn new(api: Arc<dyn RecordApi>) -> Self {
        let (status_tx, _) = watch::channel(SchemaStatus::Idle);
        Self {
            api,
            questions: Vec::new(),
            status_tx,
            generation: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SchemaStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> SchemaStatus {
        self.status_tx.borrow().clone()
    }

    /// Current question controls, sorted by `order` (ties keep fetch order).
    pub fn questions(&self) -> &[QuestionSchema] {
        &self.questions
    }

    pub fn question(&self, id: &str) -> Option<&QuestionSchema> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.status_tx.borrow(), SchemaStatus::Ready { .. })
    }

    pub fn is_ready_for(&self, category_id: &str) -> bool {
        matches!(
            &*self.status_tx.borrow(),
            SchemaStatus::Ready { category_id: c, .. } if c == category_id
        )
    }

    /// Tear down all controls (category cleared).
    pub fn clear(&mut self) {
        self.generation += 1;
        self.questions.clear();
        self.status_tx.send_replace(SchemaStatus::Idle);
    }

    /// Load the questions for `category_id`.
    ///
    /// With `preserve_answers`, answers for ids present in the new schema are re-applied and the rest
    /// are dropped; without it all answers are cleared. On failure no controls exist and the
    /// captured answers are put back untouched so a later load can still apply them.
    pub async fn load(
        &mut self,
        category_id: &str,
        preserve_answers: bool,
        answers: &mut AnswerMap,
    ) -> Result<SchemaReload, WizardError> {
        self.generation += 1;
        let generation = self.generation;

        let captured = std::mem::take(answers);
        let captured = if preserve_answers {
            captured
        } else {
            AnswerMap::new()
        };

        self.questions.clear();
        self.status_tx.send_replace(SchemaStatus::Loading {
            category_id: category_id.to_string(),
            generation,
        });
        info!(
            "[PHASE: schema] [STEP: load] Loading questions for category {} (generation {})",
            category_id, generation
        );

        let dtos = match self.api.fetch_questions(category_id).await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "[PHASE: schema] [STEP: load] Question fetch failed for category {}: {}",
                    category_id, e.internal_details
                );
                *answers = captured;
                let message = e.user_message("Questions could not be loaded");
                self.status_tx.send_replace(SchemaStatus::Failed {
                    category_id: category_id.to_string(),
                    generation,
                    message: message.clone(),
                });
                return Err(WizardError::SchemaLoad {
                    category_id: category_id.to_string(),
                    message,
                });
            }
        };

        let mut questions: Vec<QuestionSchema> = dtos
            .into_iter()
            .map(|d| QuestionSchema::from_dto(d, category_id))
            .collect();
        questions.sort_by_key(|q| q.order);
        self.questions = questions;

        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        for (id, answer) in captured {
            if self.question(&id).is_some() {
                answers.insert(id.clone(), answer);
                kept.push(id);
            } else {
                dropped.push(id);
            }
        }

        if !dropped.is_empty() {
            info!(
                "[PHASE: schema] [STEP: load] Dropped {} answer(s) for questions no longer in category {}",
                dropped.len(),
                category_id
            );
        }

        self.status_tx.send_replace(SchemaStatus::Ready {
            category_id: category_id.to_string(),
            generation,
            question_count: self.questions.len(),
        });

        Ok(SchemaReload {
            category_id: category_id.to_string(),
            question_count: self.questions.len(),
            kept,
            dropped,
        })
    }

    /// Answered questions in schema order, trimmed, for the submission payload.
    pub fn answered_in_order(&self, answers: &AnswerMap) -> Vec<QuestionAnswerDto> {
        self.questions
            .iter()
            .filter(|q| q.is_answered(answers))
            .filter_map(|q| {
                answers.get(&q.id).map(|a| QuestionAnswerDto {
                    question_id: q.id.clone(),
                    answer: a.trim().to_string(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RehydrationOutcome {
    pub applied: Vec<String>,
    pub dropped: Vec<String>,
    pub attempts: u32,
    /// The schema never became ready; every stored answer was dropped.
    pub gave_up: bool,
}

/// Applies stored answers once the schema for their category is ready, retrying a bounded number of
/// times and failing open.
#[derive(Debug, Clone)]
pub struct AnswerRehydrator {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl AnswerRehydrator {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub async fn rehydrate(
        &self,
        loader: &mut QuestionSchemaLoader,
        category_id: &str,
        stored: &AnswerMap,
        answers: &mut AnswerMap,
    ) -> RehydrationOutcome {
        let mut outcome = RehydrationOutcome::default();

        while outcome.attempts < self.max_attempts {
            outcome.attempts += 1;

            if !loader.is_ready_for(category_id) {
                if let Err(e) = loader.load(category_id, true, answers).await {
                    warn!(
                        "[PHASE: schema] [STEP: rehydrate] Attempt {}/{} failed: {}",
                        outcome.attempts, self.max_attempts, e
                    );
                    if outcome.attempts < self.max_attempts {
                        tokio::time::sleep(self.interval).await;
                    }
                    continue;
                }
            }

            for (id, answer) in stored {
                if loader.question(id).is_some() {
                    answers.insert(id.clone(), answer.clone());
                    outcome.applied.push(id.clone());
                } else {
                    outcome.dropped.push(id.clone());
                }
            }
            info!(
                "[PHASE: schema] [STEP: rehydrate] Applied {} answer(s), dropped {} (attempts={})",
                outcome.applied.len(),
                outcome.dropped.len(),
                outcome.attempts
            );
            return outcome;
        }

        outcome.dropped = stored.keys().cloned().collect();
        outcome.gave_up = true;
        warn!(
            "[PHASE: schema] [STEP: rehydrate] Schema for category {} never became ready; dropping {} stored answer(s)",
            category_id,
            outcome.dropped.len()
        );
        outcome
    }
}
