// Input validation utilities

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

/// Loose shape check: something@domain.tld, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let e = email.trim();
    if e.is_empty() {
        return false;
    }
    match email_regex() {
        Some(re) => re.is_match(e),
        None => e.contains('@'),
    }
}

/// File types accepted by the attachment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedFileType {
    Image,
    Video,
    Pdf,
    Doc,
    Docx,
}

const DOC_MIME: &str = "application/msword";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Classify a file by its declared content type, falling back to the extension when the picker
/// reported nothing useful.
pub fn classify_file(name: &str, content_type: &str) -> Option<AllowedFileType> {
    let ct = content_type.trim().to_ascii_lowercase();
    let ct = ct.split(';').next().unwrap_or("").trim().to_string();

    if ct.is_empty() || ct == "application/octet-stream" {
        return classify_by_extension(name);
    }

    if ct.starts_with("image/") {
        Some(AllowedFileType::Image)
    } else if ct.starts_with("video/") {
        Some(AllowedFileType::Video)
    } else if ct == "application/pdf" {
        Some(AllowedFileType::Pdf)
    } else if ct == DOC_MIME {
        Some(AllowedFileType::Doc)
    } else if ct == DOCX_MIME {
        Some(AllowedFileType::Docx)
    } else {
        None
    }
}

fn classify_by_extension(name: &str) -> Option<AllowedFileType> {
    let ext = std::path::Path::new(name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "heic" => Some(AllowedFileType::Image),
        "mp4" | "mov" | "avi" | "mkv" | "webm" => Some(AllowedFileType::Video),
        "pdf" => Some(AllowedFileType::Pdf),
        "doc" => Some(AllowedFileType::Doc),
        "docx" => Some(AllowedFileType::Docx),
        _ => None,
    }
}

/// Multi-choice answers are JSON arrays; an empty array is unanswered.
pub fn answer_is_present(answer: &str) -> bool {
    let a = answer.trim();
    if a.is_empty() {
        return false;
    }
    if a.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(a) {
            return !items.is_empty();
        }
    }
    true
}
