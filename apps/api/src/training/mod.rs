// Training: the per-session state machine that ties intake, extraction,
// refinement and persistence together for each uploaded example document.

pub mod conversation;
pub mod document;
pub mod handlers;
pub mod intake;
pub mod messages;
pub mod readiness;
pub mod registry;
pub mod session;
pub mod store;

use thiserror::Error;
use uuid::Uuid;

use crate::refinement::RefinementError;
use crate::solutions::repository::StoreError;
use document::DocumentStatus;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Document {0} not found in this session")]
    DocumentNotFound(Uuid),

    #[error("Document {0} is busy with another operation")]
    DocumentBusy(Uuid),

    #[error("Cannot {action} document {id} while it is {status}")]
    InvalidTransition {
        id: Uuid,
        action: &'static str,
        status: DocumentStatus,
    },

    #[error("Feedback text must not be empty")]
    EmptyFeedback,

    #[error(transparent)]
    Refinement(#[from] RefinementError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Upload task failed: {0}")]
    TaskFailed(String),
}
