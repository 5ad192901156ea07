// Scalar field catalog
// Which fields exist, which step owns them, their declared defaults and requirement rules.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::models::state::{FieldValue, RecordKind};

pub const CITY_ID: &str = "cityId";
pub const CATEGORY_ID: &str = "categoryId";
pub const SUB_CATEGORY_ID: &str = "subCategoryId";
pub const VIOLATION_DATE: &str = "violationDate";
pub const LOCATION: &str = "location";
pub const REPORTER_ROLE: &str = "reporterRole";
pub const REPORTER_ROLE_OTHER: &str = "reporterRoleOther";
pub const REPORTER_NAME: &str = "reporterName";
pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";
pub const IS_ANONYMOUS: &str = "isAnonymous";
pub const PERPETRATOR_TYPE: &str = "perpetratorType";
pub const VICTIM_COUNT: &str = "victimCount";
pub const DESCRIPTION: &str = "description";
pub const TESTIMONY_TEXT: &str = "testimonyText";

/// Sentinel value of the reporter-role selector that unlocks the free-text role field.
pub const ROLE_OTHER: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Date,
}

impl FieldKind {
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Bool => "yes/no",
            FieldKind::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSection {
    BasicInfo,
    ContactInfo,
    Details,
    TestimonyContent,
}

impl FieldSection {
    pub fn applies_to(&self, kind: RecordKind) -> bool {
        match self {
            FieldSection::TestimonyContent => kind == RecordKind::Testimony,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Optional,
    Required,
    /// Required only while another field holds the given value.
    RequiredWhen {
        field: &'static str,
        equals: &'static str,
    },
    /// Optional, but must be a well-formed email when present.
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub section: FieldSection,
    pub requirement: Requirement,
}

impl FieldSpec {
    pub fn declared_default(&self) -> Option<FieldValue> {
        match self.kind {
            FieldKind::Bool => Some(FieldValue::Bool(false)),
            _ => None,
        }
    }

    /// True when `value` already has this field's kind. Blank text is accepted for every kind.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self.kind, value) {
            (_, FieldValue::Text(s)) if s.trim().is_empty() => true,
            (FieldKind::Text, FieldValue::Text(_)) | (FieldKind::Bool, FieldValue::Bool(_)) => true,
            (FieldKind::Number, FieldValue::Number(n)) => n.is_finite(),
            (FieldKind::Date, FieldValue::Date(_) | FieldValue::DateTime(_)) => true,
            _ => false,
        }
    }

    /// True when `value` is indistinguishable from the declared default.
    pub fn is_default(&self, value: Option<&FieldValue>) -> bool {
        match (value, self.declared_default()) {
            (None, _) => true,
            (Some(v), None) => v.is_empty(),
            (Some(v), Some(d)) => *v == d,
        }
    }
}

const fn field(
    name: &'static str,
    label: &'static str,
    kind: FieldKind,
    section: FieldSection,
    requirement: Requirement,
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind,
        section,
        requirement,
    }
}

pub const FIELD_CATALOG: &[FieldSpec] = &[
    field(CITY_ID, "City", FieldKind::Text, FieldSection::BasicInfo, Requirement::Required),
    field(CATEGORY_ID, "Category", FieldKind::Text, FieldSection::BasicInfo, Requirement::Required),
    field(SUB_CATEGORY_ID, "Sub-category", FieldKind::Text, FieldSection::BasicInfo, Requirement::Optional),
    field(VIOLATION_DATE, "Violation date", FieldKind::Date, FieldSection::BasicInfo, Requirement::Required),
    field(LOCATION, "Location", FieldKind::Text, FieldSection::BasicInfo, Requirement::Required),
    field(REPORTER_ROLE, "Reporter role", FieldKind::Text, FieldSection::BasicInfo, Requirement::Required),
    field(
        REPORTER_ROLE_OTHER,
        "Reporter role (other)",
        FieldKind::Text,
        FieldSection::BasicInfo,
        Requirement::RequiredWhen {
            field: REPORTER_ROLE,
            equals: ROLE_OTHER,
        },
    ),
    field(REPORTER_NAME, "Name", FieldKind::Text, FieldSection::ContactInfo, Requirement::Optional),
    field(EMAIL, "Email", FieldKind::Text, FieldSection::ContactInfo, Requirement::Email),
    field(PHONE, "Phone", FieldKind::Text, FieldSection::ContactInfo, Requirement::Optional),
    field(IS_ANONYMOUS, "Report anonymously", FieldKind::Bool, FieldSection::ContactInfo, Requirement::Optional),
    field(PERPETRATOR_TYPE, "Perpetrator type", FieldKind::Text, FieldSection::Details, Requirement::Optional),
    field(VICTIM_COUNT, "Number of victims", FieldKind::Number, FieldSection::Details, Requirement::Optional),
    field(DESCRIPTION, "Description", FieldKind::Text, FieldSection::Details, Requirement::Optional),
    field(TESTIMONY_TEXT, "Testimony", FieldKind::Text, FieldSection::TestimonyContent, Requirement::Required),
];

pub fn spec_for(name: &str) -> Option<&'static FieldSpec> {
    FIELD_CATALOG.iter().find(|f| f.name == name)
}

pub fn section_fields(section: FieldSection) -> impl Iterator<Item = &'static FieldSpec> {
    FIELD_CATALOG.iter().filter(move |f| f.section == section)
}

/// Convert a stored JSON value into a typed field value. Nulls and blanks yield `None`.
pub fn value_from_json(spec: &FieldSpec, value: &Value) -> Option<FieldValue> {
    match (spec.kind, value) {
        (_, Value::Null) => None,
        (FieldKind::Text, Value::String(s)) => Some(FieldValue::Text(s.clone())),
        (FieldKind::Text, Value::Number(n)) => Some(FieldValue::Text(n.to_string())),
        (FieldKind::Text, Value::Bool(b)) => Some(FieldValue::Text(b.to_string())),
        (FieldKind::Number, Value::Number(n)) => n.as_f64().map(FieldValue::Number),
        (FieldKind::Number, Value::String(s)) => s.trim().parse::<f64>().ok().map(FieldValue::Number),
        (FieldKind::Bool, Value::Bool(b)) => Some(FieldValue::Bool(*b)),
        (FieldKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(FieldValue::Bool(true)),
            "false" | "no" | "0" => Some(FieldValue::Bool(false)),
            _ => None,
        },
        (FieldKind::Date, Value::String(s)) => {
            let s = s.trim();
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Some(FieldValue::Date(d))
            } else {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc)))
            }
        }
        _ => None,
    }
}

/// Bring a host-supplied value to the field's kind. Blank text passes through so it can still
/// clear a field; anything else that does not read as the field's kind yields `None`.
pub fn coerce_field(spec: &FieldSpec, value: FieldValue) -> Option<FieldValue> {
    if spec.accepts(&value) {
        return Some(value);
    }
    match value_from_json(spec, &value.to_json())? {
        FieldValue::Number(n) if !n.is_finite() => None,
        coerced => Some(coerced),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<&str> = FIELD_CATALOG.iter().map(|f| f.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn core_basic_info_fields_are_required() {
        for name in [CITY_ID, CATEGORY_ID, VIOLATION_DATE, LOCATION, REPORTER_ROLE] {
            let spec = spec_for(name).unwrap();
            assert_eq!(spec.section, FieldSection::BasicInfo);
            assert_eq!(spec.requirement, Requirement::Required, "{} should be required", name);
        }
        assert!(section_fields(FieldSection::Details).all(|f| f.requirement == Requirement::Optional));
    }

    #[test]
    fn testimony_section_only_applies_to_testimony() {
        assert!(FieldSection::TestimonyContent.applies_to(RecordKind::Testimony));
        assert!(!FieldSection::TestimonyContent.applies_to(RecordKind::Questionnaire));
        assert!(FieldSection::BasicInfo.applies_to(RecordKind::Questionnaire));
    }

    #[test]
    fn defaults_treat_blank_and_false_as_untouched() {
        let anon = spec_for(IS_ANONYMOUS).unwrap();
        assert!(anon.is_default(None));
        assert!(anon.is_default(Some(&FieldValue::Bool(false))));
        assert!(!anon.is_default(Some(&FieldValue::Bool(true))));

        let city = spec_for(CITY_ID).unwrap();
        assert!(city.is_default(Some(&FieldValue::Text("  ".to_string()))));
        assert!(!city.is_default(Some(&FieldValue::Text("Riga".to_string()))));
    }

    #[test]
    fn json_values_are_coerced_per_kind() {
        let date = spec_for(VIOLATION_DATE).unwrap();
        assert_eq!(
            value_from_json(date, &json!("2026-03-14")),
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()))
        );
        let from_ts = value_from_json(date, &json!("2026-03-14T22:30:00Z")).unwrap();
        assert_eq!(from_ts.calendar_date(), NaiveDate::from_ymd_opt(2026, 3, 14));

        let count = spec_for(VICTIM_COUNT).unwrap();
        assert_eq!(value_from_json(count, &json!(3)), Some(FieldValue::Number(3.0)));
        assert_eq!(value_from_json(count, &json!("4")), Some(FieldValue::Number(4.0)));

        let city = spec_for(CITY_ID).unwrap();
        assert_eq!(value_from_json(city, &json!(12)), Some(FieldValue::Text("12".to_string())));
        assert_eq!(value_from_json(city, &Value::Null), None);
    }

    #[test]
    fn coerce_parses_text_into_typed_kinds() {
        let date = spec_for(VIOLATION_DATE).unwrap();
        assert_eq!(
            coerce_field(date, "2026-04-01".into()),
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()))
        );
        assert!(matches!(
            coerce_field(date, "2026-04-01T08:30:00Z".into()),
            Some(FieldValue::DateTime(_))
        ));
        assert_eq!(coerce_field(date, "not-a-date".into()), None);
        assert_eq!(coerce_field(date, FieldValue::Number(3.0)), None);

        let count = spec_for(VICTIM_COUNT).unwrap();
        assert_eq!(coerce_field(count, " 3 ".into()), Some(FieldValue::Number(3.0)));
        assert_eq!(coerce_field(count, "many".into()), None);
        assert_eq!(coerce_field(count, "inf".into()), None);
        assert_eq!(coerce_field(count, true.into()), None);

        let anonymous = spec_for(IS_ANONYMOUS).unwrap();
        assert_eq!(coerce_field(anonymous, "Yes".into()), Some(FieldValue::Bool(true)));
        assert_eq!(coerce_field(anonymous, "0".into()), Some(FieldValue::Bool(false)));
        assert_eq!(coerce_field(anonymous, "maybe".into()), None);
    }

    #[test]
    fn coerce_keeps_text_fields_and_blank_clears() {
        let location = spec_for(LOCATION).unwrap();
        assert_eq!(
            coerce_field(location, "central market".into()),
            Some(FieldValue::Text("central market".to_string()))
        );
        assert_eq!(coerce_field(location, true.into()), Some(FieldValue::Text("true".to_string())));

        let count = spec_for(VICTIM_COUNT).unwrap();
        assert_eq!(coerce_field(count, "  ".into()), Some(FieldValue::Text("  ".to_string())));
        assert_eq!(FieldKind::Bool.describe(), "yes/no");
    }
}
