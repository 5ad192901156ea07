// Attachment pipeline
//
// Files are checked locally when picked and uploaded only at submit time. Submission is two-phase:
// upload every new file of a group as one batch, then reference `persisted ++ new` in that order.

use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::api::RecordApi;
use crate::error::WizardError;
use crate::models::responses::FileReference;
use crate::models::state::{Attachment, AttachmentSource, LocalFile};
use crate::utils::validation::{classify_file, AllowedFileType};

const UPLOAD_FALLBACK_MESSAGE: &str = "File upload failed. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileRejection {
    #[error("'{name}' is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("'{name}' has an unsupported type ({content_type}); allowed: images, videos, PDF, DOC, DOCX")]
    UnsupportedType { name: String, content_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_file_bytes: u64,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: 100 * 1024 * 1024,
        }
    }
}

impl AttachmentPolicy {
    pub fn check(&self, file: &LocalFile) -> Result<AllowedFileType, FileRejection> {
        if file.size > self.max_file_bytes {
            return Err(FileRejection::TooLarge {
                name: file.name.clone(),
                size: file.size,
                limit: self.max_file_bytes,
            });
        }
        classify_file(&file.name, &file.content_type).ok_or_else(|| {
            FileRejection::UnsupportedType {
                name: file.name.clone(),
                content_type: if file.content_type.trim().is_empty() {
                    "unknown".to_string()
                } else {
                    file.content_type.clone()
                },
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddFilesOutcome {
    pub accepted: Vec<String>,
    pub rejected: Vec<FileRejection>,
}

/// Number of attachments in a group that still need uploading.
pub fn pending_uploads(group: &[Attachment]) -> usize {
    group.iter().filter(|a| a.is_new()).count()
}

/// Already persisted references of a group, in display order.
pub fn persisted_references(group: &[Attachment]) -> Vec<FileReference> {
    group
        .iter()
        .filter_map(|a| match &a.source {
            AttachmentSource::Persisted(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

/// Final ordering for a group: persisted references as-is, then freshly uploaded ones.
pub fn assemble(persisted: Vec<FileReference>, uploaded: Vec<FileReference>) -> Vec<FileReference> {
    let mut out = persisted;
    out.extend(uploaded);
    out
}

pub struct AttachmentPipeline {
    api: Arc<dyn RecordApi>,
    policy: AttachmentPolicy,
}

impl AttachmentPipeline {
    pub fn new(api: Arc<dyn RecordApi>, policy: AttachmentPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> AttachmentPolicy {
        self.policy
    }

    /// Append the acceptable files to `group`; rejected files are reported individually.
    pub fn add_files(&self, group: &mut Vec<Attachment>, files: Vec<LocalFile>) -> AddFilesOutcome {
        let mut outcome = AddFilesOutcome::default();
        for file in files {
            match self.policy.check(&file) {
                Ok(_) => {
                    outcome.accepted.push(file.name.clone());
                    group.push(Attachment::new_file(file));
                }
                Err(rejection) => {
                    warn!("[PHASE: attachments] [STEP: add] Rejected file: {}", rejection);
                    outcome.rejected.push(rejection);
                }
            }
        }
        outcome
    }

    /// Upload one batch. All files succeed or the whole batch fails.
    pub async fn upload(&self, files: &[LocalFile]) -> Result<Vec<FileReference>, WizardError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            "[PHASE: submit] [STEP: upload] Uploading {} file(s)",
            files.len()
        );
        let refs = self.api.upload_files(files).await.map_err(|e| {
            warn!(
                "[PHASE: submit] [STEP: upload] Upload batch failed: {}",
                e.internal_details
            );
            WizardError::Upload(e.user_message(UPLOAD_FALLBACK_MESSAGE))
        })?;

        if refs.len() != files.len() {
            return Err(WizardError::Upload(UPLOAD_FALLBACK_MESSAGE.to_string()));
        }
        Ok(refs)
    }

    /// Upload the new files of one group and rewrite it as `persisted ++ uploaded ++ placeholders`.
    /// Returns the group's references in payload order. On failure the group is untouched.
    pub async fn commit_group(
        &self,
        group: &mut Vec<Attachment>,
    ) -> Result<Vec<FileReference>, WizardError> {
        let new_files: Vec<LocalFile> = group
            .iter()
            .filter_map(|a| match &a.source {
                AttachmentSource::NewFile(f) => Some(f.clone()),
                _ => None,
            })
            .collect();

        let persisted = persisted_references(group);
        let uploaded = self.upload(&new_files).await?;

        let placeholders: Vec<Attachment> = group
            .iter()
            .filter(|a| !a.is_submittable())
            .cloned()
            .collect();

        let references = assemble(persisted, uploaded);
        let mut rewritten: Vec<Attachment> = references
            .iter()
            .cloned()
            .map(Attachment::persisted)
            .collect();
        rewritten.extend(placeholders);
        *group = rewritten;

        Ok(references)
    }

    /// Commit both groups; the testimony group (when active) comes first in the merged list.
    pub async fn prepare_submission(
        &self,
        testimony: Option<&mut Vec<Attachment>>,
        general: &mut Vec<Attachment>,
    ) -> Result<Vec<FileReference>, WizardError> {
        let mut merged = Vec::new();
        if let Some(group) = testimony {
            merged.extend(self.commit_group(group).await?);
        }
        merged.extend(self.commit_group(general).await?);
        Ok(merged)
    }
}
