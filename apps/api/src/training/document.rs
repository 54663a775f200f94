use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::{ExtractionResult, ScoredExtraction};
use crate::models::document::{DocumentContent, DocumentKind};
use crate::training::conversation::ConversationLog;
use crate::training::messages::{
    extraction_summary, APPROVED_AI, APPROVED_USER, NEEDS_WORK_AI, NEEDS_WORK_USER,
};
use crate::training::TrainingError;

/// processing → ready ⇄ {approved, needs_work}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Approved,
    NeedsWork,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Approved => "approved",
            DocumentStatus::NeedsWork => "needs_work",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded example document and everything training has done to it.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingDocument {
    pub id: Uuid,
    pub label: String,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    #[serde(skip_serializing)]
    pub source: Option<DocumentContent>,
    extraction: Option<ScoredExtraction>,
    conversation: ConversationLog,
    pub persisted_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TrainingDocument {
    pub fn new(label: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            kind,
            status: DocumentStatus::Processing,
            source: None,
            extraction: None,
            conversation: ConversationLog::default(),
            persisted_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn extraction(&self) -> Option<&ScoredExtraction> {
        self.extraction.as_ref()
    }

    pub fn confidence(&self) -> Option<u8> {
        self.extraction.as_ref().map(ScoredExtraction::confidence)
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.conversation
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.conversation.push_user(text);
    }

    pub fn push_ai(&mut self, text: impl Into<String>) {
        self.conversation.push_ai(text);
    }

    /// Replaces the extraction (result and confidence together) and moves to `ready`.
    pub fn record_extraction(&mut self, result: ExtractionResult) -> &ScoredExtraction {
        self.status = DocumentStatus::Ready;
        self.extraction.insert(ScoredExtraction::new(result))
    }

    /// Upload-time success: record the result and greet with a summary of it.
    pub fn complete_processing(&mut self, result: ExtractionResult) {
        let summary = extraction_summary(self.record_extraction(result));
        self.push_ai(summary);
    }

    pub fn approve(&mut self) -> Result<(), TrainingError> {
        self.require_ready("approve")?;
        self.status = DocumentStatus::Approved;
        self.push_user(APPROVED_USER);
        self.push_ai(APPROVED_AI);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), TrainingError> {
        self.require_ready("reject")?;
        self.status = DocumentStatus::NeedsWork;
        self.push_user(NEEDS_WORK_USER);
        self.push_ai(NEEDS_WORK_AI);
        Ok(())
    }

    pub fn ensure_accepts_feedback(&self) -> Result<(), TrainingError> {
        if self.status == DocumentStatus::Processing {
            return Err(self.invalid("send feedback to"));
        }
        Ok(())
    }

    fn require_ready(&self, action: &'static str) -> Result<(), TrainingError> {
        if self.status != DocumentStatus::Ready {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> TrainingError {
        TrainingError::InvalidTransition {
            id: self.id,
            action,
            status: self.status,
        }
    }
}
