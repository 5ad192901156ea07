// Record wizard
//
// Field catalog, step validation, question schema, attachments, drafts and change detection. The
// orchestrator ties them together and owns the state.

pub mod attachments;
pub mod changes;
pub mod drafts;
pub mod fields;
pub mod orchestrator;
pub mod schema;
pub mod steps;

pub use drafts::{DraftStorage, FileDraftStorage, MemoryDraftStorage};
pub use orchestrator::{
    CloseDecision, SubmissionPhase, SubmitReceipt, WizardEmitter, WizardEvent, WizardMode,
    WizardOrchestrator,
};
