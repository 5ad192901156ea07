// Step sequencing and validation
//
// Steps are 1-indexed and relative to the record kind. Validation marks the checked fields as
// touched so the host can render their errors.

use super::fields::{section_fields, FieldSection, FieldSpec, Requirement, CATEGORY_ID};
use super::schema::QuestionSchemaLoader;
use crate::error::{StepInvalid, WizardError};
use crate::models::state::{Attachment, RecordKind, WizardState};
use crate::utils::validation::is_valid_email;

pub const TESTIMONY_ATTACHMENTS_KEY: &str = "testimonyAttachments";
pub const QUESTIONS_KEY: &str = "questions";
pub const RESELECT_ATTACHMENTS_KEY: &str = "reselectAttachments";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    BasicInfo,
    ContactInfo,
    Details,
    Questions,
    TestimonyContent,
    TestimonyAttachments,
    Attachments,
    Review,
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::BasicInfo => "Basic information",
            StepKind::ContactInfo => "Contact information",
            StepKind::Details => "Incident details",
            StepKind::Questions => "Questions",
            StepKind::TestimonyContent => "Testimony",
            StepKind::TestimonyAttachments => "Testimony attachments",
            StepKind::Attachments => "Attachments",
            StepKind::Review => "Review",
        }
    }

    fn section(&self) -> Option<FieldSection> {
        match self {
            StepKind::BasicInfo => Some(FieldSection::BasicInfo),
            StepKind::ContactInfo => Some(FieldSection::ContactInfo),
            StepKind::Details => Some(FieldSection::Details),
            StepKind::TestimonyContent => Some(FieldSection::TestimonyContent),
            _ => None,
        }
    }
}

const QUESTIONNAIRE_STEPS: [StepKind; 6] = [
    StepKind::BasicInfo,
    StepKind::ContactInfo,
    StepKind::Details,
    StepKind::Questions,
    StepKind::Attachments,
    StepKind::Review,
];

const TESTIMONY_STEPS: [StepKind; 7] = [
    StepKind::BasicInfo,
    StepKind::ContactInfo,
    StepKind::Details,
    StepKind::TestimonyContent,
    StepKind::TestimonyAttachments,
    StepKind::Attachments,
    StepKind::Review,
];

pub fn step_sequence(kind: RecordKind) -> &'static [StepKind] {
    match kind {
        RecordKind::Questionnaire => &QUESTIONNAIRE_STEPS,
        RecordKind::Testimony => &TESTIMONY_STEPS,
    }
}

pub fn total_steps(kind: RecordKind) -> usize {
    step_sequence(kind).len()
}

pub fn step_kind(kind: RecordKind, step: usize) -> Option<StepKind> {
    step.checked_sub(1)
        .and_then(|i| step_sequence(kind).get(i))
        .copied()
}

pub fn step_labels(kind: RecordKind) -> Vec<&'static str> {
    step_sequence(kind).iter().map(StepKind::label).collect()
}

fn check_field(state: &WizardState, spec: &FieldSpec) -> Option<String> {
    let value = state.fields.get(spec.name);
    let missing = spec.is_default(value);
    if value.is_some_and(|v| !spec.accepts(v)) {
        return Some(format!("{} must be a valid {}", spec.label, spec.kind.describe()));
    }

    match spec.requirement {
        Requirement::Optional => None,
        Requirement::Required if missing => Some(format!("{} is required", spec.label)),
        Requirement::Required => None,
        Requirement::RequiredWhen { field, equals } => {
            let active = state.field_text(field).eq_ignore_ascii_case(equals);
            (active && missing).then(|| format!("{} is required", spec.label))
        }
        Requirement::Email => {
            let text = state.field_text(spec.name);
            (!text.is_empty() && !is_valid_email(text))
                .then(|| "Enter a valid email address".to_string())
        }
    }
}

/// Restored draft entries whose file has to be picked again before anything can be sent.
fn pending_reselect(group: &[Attachment]) -> Option<String> {
    let names: Vec<&str> = group
        .iter()
        .filter(|a| !a.is_submittable())
        .map(Attachment::display_name)
        .collect();
    (!names.is_empty()).then(|| {
        format!("Select these files again or remove them: {}", names.join(", "))
    })
}

/// Validate one step of the active kind. Steps outside the sequence are trivially valid.
pub fn validate_step(
    state: &mut WizardState,
    loader: &QuestionSchemaLoader,
    step: usize,
) -> Result<(), StepInvalid> {
    let Some(kind) = step_kind(state.kind, step) else {
        return Ok(());
    };

    let mut fields = Vec::new();
    let mut messages = Vec::new();

    if let Some(section) = kind.section() {
        for spec in section_fields(section) {
            state.touched.insert(spec.name.to_string());
            if let Some(msg) = check_field(state, spec) {
                fields.push(spec.name.to_string());
                messages.push(msg);
            }
        }
    }

    match kind {
        StepKind::Questions => {
            let category = state.field_text(CATEGORY_ID).to_string();
            if category.is_empty() {
                fields.push(QUESTIONS_KEY.to_string());
                messages.push("Select a category to load its questions".to_string());
            } else if !loader.is_ready_for(&category) {
                fields.push(QUESTIONS_KEY.to_string());
                messages.push("Questions for the selected category are not loaded yet".to_string());
            } else {
                for q in loader.questions().iter().filter(|q| q.is_required) {
                    let key = format!("question:{}", q.id);
                    state.touched.insert(key.clone());
                    if !q.is_answered(&state.question_answers) {
                        fields.push(key);
                        messages.push(format!("'{}' needs an answer", q.label));
                    }
                }
            }
        }
        StepKind::TestimonyAttachments => {
            state.touched.insert(TESTIMONY_ATTACHMENTS_KEY.to_string());
            let usable = state
                .testimony_attachments
                .iter()
                .filter(|a| a.is_submittable())
                .count();
            if usable == 0 {
                fields.push(TESTIMONY_ATTACHMENTS_KEY.to_string());
                messages.push("Attach at least one testimony file".to_string());
            }
            if let Some(msg) = pending_reselect(&state.testimony_attachments) {
                state.touched.insert(RESELECT_ATTACHMENTS_KEY.to_string());
                fields.push(RESELECT_ATTACHMENTS_KEY.to_string());
                messages.push(msg);
            }
        }
        StepKind::Attachments => {
            if let Some(msg) = pending_reselect(&state.attachments) {
                state.touched.insert(RESELECT_ATTACHMENTS_KEY.to_string());
                fields.push(RESELECT_ATTACHMENTS_KEY.to_string());
                messages.push(msg);
            }
        }
        _ => {}
    }

    if fields.is_empty() {
        Ok(())
    } else {
        Err(StepInvalid {
            step,
            label: kind.label(),
            fields,
            messages,
        })
    }
}

/// Re-validate steps `1..target` in order; the first failure wins.
pub fn can_advance(
    state: &mut WizardState,
    loader: &QuestionSchemaLoader,
    target: usize,
) -> Result<(), StepInvalid> {
    for step in 1..target {
        validate_step(state, loader, step)?;
    }
    Ok(())
}

/// Jump to `target` if every step before it is valid; otherwise stay put.
pub fn go_to_step(
    state: &mut WizardState,
    loader: &QuestionSchemaLoader,
    target: usize,
) -> Result<(), WizardError> {
    let total = total_steps(state.kind);
    if target == 0 || target > total {
        return Err(WizardError::StepOutOfRange {
            requested: target,
            total,
        });
    }
    can_advance(state, loader, target)?;
    state.current_step = target;
    Ok(())
}

/// Validate the current step and move forward (clamped at the last step).
pub fn next_step(
    state: &mut WizardState,
    loader: &QuestionSchemaLoader,
) -> Result<usize, WizardError> {
    let current = state.current_step;
    validate_step(state, loader, current)?;
    state.current_step = (current + 1).min(total_steps(state.kind));
    Ok(state.current_step)
}

/// Going back never validates.
pub fn previous_step(state: &mut WizardState) -> usize {
    state.current_step = state.current_step.saturating_sub(1).max(1);
    state.current_step
}
