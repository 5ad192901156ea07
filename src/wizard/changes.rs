// Change detection
// Decides whether closing the wizard would throw away user work.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use super::fields::{spec_for, FieldKind};
use crate::models::state::{FieldMap, FieldValue, WizardSnapshot, WizardState};
use crate::utils::validation::answer_is_present;

#[derive(Debug, PartialEq)]
enum Comparable {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

fn comparable(name: &str, value: Option<&FieldValue>) -> Comparable {
    let spec = spec_for(name);
    let is_default = match spec {
        Some(s) => s.is_default(value),
        None => value.map(FieldValue::is_empty).unwrap_or(true),
    };
    let Some(value) = value else {
        return Comparable::Empty;
    };
    if is_default {
        return Comparable::Empty;
    }

    let date_field = spec.map(|s| s.kind == FieldKind::Date).unwrap_or(false);
    if date_field || matches!(value, FieldValue::Date(_) | FieldValue::DateTime(_)) {
        if let Some(d) = value.calendar_date() {
            return Comparable::Date(d);
        }
    }

    match value {
        FieldValue::Text(s) => Comparable::Text(s.trim().to_string()),
        FieldValue::Number(n) => Comparable::Number(*n),
        FieldValue::Bool(b) => Comparable::Bool(*b),
        FieldValue::Date(d) => Comparable::Date(*d),
        FieldValue::DateTime(dt) => Comparable::Date(dt.date_naive()),
    }
}

fn fields_differ(current: &FieldMap, original: &FieldMap) -> bool {
    let names: BTreeSet<&String> = current.keys().chain(original.keys()).collect();
    names
        .into_iter()
        .any(|name| comparable(name, current.get(name)) != comparable(name, original.get(name)))
}

/// Edit mode: does the current state differ from the snapshot taken when the record was opened?
pub fn has_changes(current: &WizardState, original: &WizardSnapshot) -> bool {
    if current.kind != original.kind {
        return true;
    }
    if fields_differ(&current.fields, &original.fields) {
        return true;
    }

    let ids: BTreeSet<&String> = current
        .question_answers
        .keys()
        .chain(original.question_answers.keys())
        .collect();
    let answers_differ = ids.into_iter().any(|id| {
        let a = current.question_answers.get(id).map(|s| s.trim()).unwrap_or("");
        let b = original.question_answers.get(id).map(|s| s.trim()).unwrap_or("");
        a != b
    });
    if answers_differ {
        return true;
    }

    current.attachments.len() != original.attachment_count
        || current.testimony_attachments.len() != original.testimony_attachment_count
}

/// Add mode: has the user entered anything worth keeping?
pub fn has_form_data(state: &WizardState) -> bool {
    let any_field = state
        .fields
        .iter()
        .any(|(name, value)| comparable(name, Some(value)) != Comparable::Empty);

    any_field
        || state.question_answers.values().any(|a| answer_is_present(a))
        || !state.attachments.is_empty()
        || !state.testimony_attachments.is_empty()
}
