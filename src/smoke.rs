// Non-interactive proof modes
//
// Each mode drives the wizard end to end against local collaborators, writes a transcript into the
// log folder and fails with an error when an expectation is not met.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::api::demo::{DemoRecordApi, DEMO_CATEGORY_HARASSMENT, DEMO_CATEGORY_LABOR};
use crate::config::WizardConfig;
use crate::models::state::{AttachmentGroup, LocalFile};
use crate::utils::path_resolver::{resolve_draft_folder, resolve_log_folder};
use crate::wizard::fields::{CATEGORY_ID, CITY_ID, LOCATION, REPORTER_ROLE, VIOLATION_DATE};
use crate::wizard::{
    CloseDecision, DraftStorage, FileDraftStorage, WizardEvent, WizardOrchestrator,
};

pub const WIZARD_SMOKE_TRANSCRIPT: &str = "wizard_smoke_transcript.log";
pub const DRAFT_SMOKE_TRANSCRIPT: &str = "draft_smoke_transcript.log";

struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    fn new(title: &str) -> Self {
        Self {
            lines: vec![format!("{} begin", title)],
        }
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    async fn write(&self, path: &Path) -> Result<()> {
        let mut body = self.lines.join("\n");
        body.push('\n');
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write transcript {:?}", path))
    }
}

fn expect(cond: bool, what: &str) -> Result<()> {
    if !cond {
        bail!("smoke expectation failed: {}", what);
    }
    Ok(())
}

async fn fill_basic_info(wizard: &mut WizardOrchestrator, category: &str) -> Result<()> {
    wizard.set_field(CITY_ID, "riga").await?;
    wizard.set_field(CATEGORY_ID, category).await?;
    let date = NaiveDate::from_ymd_opt(2026, 3, 14).context("invalid smoke date")?;
    wizard.set_field(VIOLATION_DATE, date).await?;
    wizard.set_field(LOCATION, "central market").await?;
    wizard.set_field(REPORTER_ROLE, "witness").await?;
    Ok(())
}

/// Add-mode questionnaire against the demo collaborator: validation stop, category switch,
/// attachment upload, submission and event transcript.
pub async fn wizard_smoke(cfg: &WizardConfig) -> Result<PathBuf> {
    let started = Instant::now();
    let log_dir = resolve_log_folder(cfg.logging.folder.as_deref())?;
    let transcript_path = log_dir.join(WIZARD_SMOKE_TRANSCRIPT);
    let mut t = Transcript::new("WIZARD_SMOKE");
    t.push(format!("log_dir={}", log_dir.to_string_lossy()));

    let api = Arc::new(DemoRecordApi::seeded());
    let storage = Arc::new(crate::wizard::MemoryDraftStorage::new());
    let events: Arc<Mutex<Vec<WizardEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut wizard = WizardOrchestrator::new(api.clone(), storage, Some("smoke-user"), cfg)
        .with_emitter(Arc::new(move |e: WizardEvent| {
            sink.lock().unwrap_or_else(|p| p.into_inner()).push(e)
        }));

    let draft_available = wizard.open_add().await;
    t.push(format!("EVENT open mode=add draft_available={}", draft_available));

    fill_basic_info(&mut wizard, DEMO_CATEGORY_HARASSMENT).await?;
    t.push(format!(
        "EVENT schema category={} questions={}",
        DEMO_CATEGORY_HARASSMENT,
        wizard.questions().len()
    ));
    wizard.set_answer("witnesses", "yes")?;

    let reload = wizard
        .set_field(CATEGORY_ID, DEMO_CATEGORY_LABOR)
        .await?
        .context("category switch did not reload questions")?;
    t.push(format!(
        "EVENT schema-switch category={} kept={:?} dropped={:?}",
        reload.category_id, reload.kept, reload.dropped
    ));
    expect(reload.kept == vec!["witnesses".to_string()], "shared answer kept")?;

    match wizard.go_to_step(5) {
        Err(e) => t.push(format!(
            "EVENT navigate target=5 result=blocked step={:?}",
            e.failing_step()
        )),
        Ok(()) => bail!("navigation past unanswered questions was allowed"),
    }
    wizard.set_answer("unpaid-wages", "1500")?;
    wizard.set_multi_answer("contract-issues", &["no contract", "excess hours"])?;
    wizard.go_to_step(5)?;
    t.push(format!("EVENT navigate target=5 result=ok step={}", wizard.current_step()));

    let added = wizard.add_attachments(
        AttachmentGroup::General,
        vec![
            LocalFile::from_bytes("receipt.pdf", "application/pdf", b"%PDF-1.4 smoke".to_vec()),
            LocalFile::from_bytes("payload.exe", "application/x-msdownload", vec![0x4d, 0x5a]),
        ],
    );
    t.push(format!(
        "EVENT attachments accepted={} rejected={}",
        added.accepted.len(),
        added.rejected.len()
    ));
    expect(added.rejected.len() == 1, "executable rejected")?;

    expect(
        wizard.close_decision() == CloseDecision::OfferSaveDraft,
        "unsaved add-mode data offers a draft",
    )?;

    let receipt = wizard.submit().await?;
    t.push(format!(
        "EVENT submit result=ok created={} answers={} attachments={} uploaded={}",
        receipt.created, receipt.question_answers, receipt.attachments, receipt.uploaded_files
    ));
    expect(api.created_payloads().len() == 1, "one record created")?;
    expect(receipt.question_answers == 3, "three answers submitted")?;

    for event in events.lock().unwrap_or_else(|p| p.into_inner()).iter() {
        t.push(format!("emit {:?}", event));
    }

    t.push(format!("elapsed_ms={}", started.elapsed().as_millis()));
    t.push("ExitCode=0");
    t.write(&transcript_path).await?;
    info!(
        "[PHASE: smoke] [STEP: wizard] Transcript written to {:?}",
        transcript_path
    );
    Ok(transcript_path)
}

/// File-backed draft round trip: save, reload in a fresh wizard, resume, discard.
pub async fn draft_smoke(cfg: &WizardConfig) -> Result<PathBuf> {
    let started = Instant::now();
    let log_dir = resolve_log_folder(cfg.logging.folder.as_deref())?;
    let transcript_path = log_dir.join(DRAFT_SMOKE_TRANSCRIPT);
    let draft_dir = resolve_draft_folder(cfg.drafts.folder.as_deref())?;
    let mut t = Transcript::new("DRAFT_SMOKE");
    t.push(format!("draft_dir={}", draft_dir.to_string_lossy()));

    let api = Arc::new(DemoRecordApi::seeded());
    let storage: Arc<dyn DraftStorage> =
        Arc::new(FileDraftStorage::new(draft_dir.clone(), cfg.drafts.quota_bytes));

    let saved_at = {
        let mut wizard = WizardOrchestrator::new(api.clone(), storage.clone(), Some("smoke-user"), cfg);
        wizard.open_add().await;
        fill_basic_info(&mut wizard, DEMO_CATEGORY_HARASSMENT).await?;
        wizard.go_to_step(3)?;
        wizard.set_answer("frequency", "weekly")?;
        wizard.add_attachments(
            AttachmentGroup::General,
            vec![LocalFile::from_bytes("photo.jpg", "image/jpeg", vec![0xff, 0xd8, 0xff])],
        );
        let at = wizard.save_draft().await?;
        t.push(format!("EVENT save step={} at={}", wizard.current_step(), at.to_rfc3339()));
        at
    };

    let mut wizard = WizardOrchestrator::new(api, storage, Some("smoke-user"), cfg);
    let available = wizard.open_add().await;
    t.push(format!("EVENT reopen draft_available={}", available));
    expect(available, "draft visible after reopen")?;

    let restore = wizard
        .resume_draft()
        .await?
        .context("draft disappeared before resume")?;
    t.push(format!(
        "EVENT resume step={} applied={:?} dropped={:?} reselect={:?}",
        restore.current_step, restore.applied_answers, restore.dropped_answers, restore.files_to_reselect
    ));
    expect(restore.current_step == 3, "step restored")?;
    expect(restore.saved_at == saved_at, "timestamp restored")?;
    expect(
        restore.files_to_reselect == vec!["photo.jpg".to_string()],
        "unuploaded file flagged for reselection",
    )?;

    wizard.discard_draft().await?;
    let still_there = wizard.open_add().await;
    t.push(format!("EVENT discard draft_available={}", still_there));
    expect(!still_there, "draft removed")?;

    t.push(format!("elapsed_ms={}", started.elapsed().as_millis()));
    t.push("ExitCode=0");
    t.write(&transcript_path).await?;
    info!(
        "[PHASE: smoke] [STEP: drafts] Transcript written to {:?}",
        transcript_path
    );
    Ok(transcript_path)
}
