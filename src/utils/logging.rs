// Logging utilities
// Structured logging with JSON and human-readable formats

use log::Level;
use serde_json::json;

/// Tags pulled out of a log message (`[PHASE: submit] [STEP: upload] ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMetadata {
    pub phase: Option<String>,
    pub step: Option<String>,
    pub message: String,
}

/// Mask a value, keeping only the first and last few characters.
pub fn mask_sensitive(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }

    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", start, end)
}

/// Mask the local part of an email address; the domain stays visible for troubleshooting.
pub fn mask_email(email: &str) -> String {
    let e = email.trim();
    if e.is_empty() {
        return String::new();
    }
    match e.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Draft keys embed the acting user id; never log it in full.
pub fn mask_draft_key(key: &str) -> String {
    match key.rsplit_once("_draft_") {
        Some((record_type, user)) if user != crate::wizard::drafts::ANONYMOUS_USER_KEY => {
            format!("{}_draft_{}", record_type, mask_sensitive(user))
        }
        _ => key.to_string(),
    }
}

fn extract_tag(message: &str, tag: &str) -> (Option<String>, String) {
    let marker = format!("[{}:", tag);
    let Some(start) = message.find(&marker) else {
        return (None, message.to_string());
    };
    let Some(len) = message[start..].find(']') else {
        return (None, message.to_string());
    };

    let value = message[start + marker.len()..start + len].trim().to_string();
    let cleaned = format!("{} {}", &message[..start], &message[start + len + 1..])
        .trim()
        .to_string();
    (Some(value), cleaned)
}

/// Parse phase and step tags out of a log message.
pub fn parse_log_metadata(message: &str) -> LogMetadata {
    let (phase, rest) = extract_tag(message, "PHASE");
    let (step, rest) = extract_tag(&rest, "STEP");
    LogMetadata {
        phase,
        step,
        message: rest,
    }
}

/// Format log entry as one JSON line
pub fn format_json_log(timestamp: &str, level: Level, target: &str, meta: &LogMetadata) -> String {
    let mut entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": meta.message,
    });

    if let Some(phase) = &meta.phase {
        entry["phase"] = json!(phase);
    }
    if let Some(step) = &meta.step {
        entry["step"] = json!(step);
    }

    serde_json::to_string(&entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    meta: &LogMetadata,
) -> String {
    let mut line = format!("[{}] [{}]", timestamp, level.as_str());

    if let Some(phase) = &meta.phase {
        line.push_str(&format!(" [PHASE: {}]", phase));
    }
    if let Some(step) = &meta.step {
        line.push_str(&format!(" [STEP: {}]", step));
    }

    line.push_str(&format!(" [{}] {}", target, meta.message));
    line
}
