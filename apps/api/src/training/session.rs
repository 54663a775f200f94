//! Training Session Orchestrator.
//!
//! A session owns the solution draft being trained and every training document.
//! Nothing else writes to either: handlers send a `TrainingEvent` to
//! `TrainingSession::handle` (or call the matching method directly).
//!
//! Locking: state sits behind a std `Mutex` that is only held for short,
//! synchronous sections. Model and store calls run with the lock released while
//! the document id sits in the busy set, so one document never has two calls in
//! flight but different documents progress concurrently. `BusyGuard` clears the
//! flag when the operation ends, including when the request future is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::extraction::ExtractionInvoker;
use crate::refinement::RefinementEngine;
use crate::solutions::repository::{SolutionUpdate, StoreError};
use crate::training::document::{DocumentStatus, TrainingDocument};
use crate::training::intake::{DocumentIntake, UploadedFile};
use crate::training::messages::{
    NO_SOURCE_AI, PROCESSING_FAILED_AI, REFINEMENT_FAILED_AI, REPROCESSED_AFTER_FEEDBACK_AI,
    REPROCESSED_AI, REPROCESS_FAILED_AI,
};
use crate::training::readiness::{ReadinessGate, ReadinessReport, SessionMode};
use crate::training::store::TrainingStore;
use crate::training::TrainingError;

/// Collaborators a session calls out to.
#[derive(Clone)]
pub struct SessionDeps {
    pub invoker: ExtractionInvoker,
    pub engine: RefinementEngine,
    pub intake: Arc<dyn DocumentIntake>,
    pub store: Arc<dyn TrainingStore>,
}

/// The solution configuration as the session sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionDraft {
    /// Set when the solution has a durable record; instruction changes are then persisted.
    pub solution_id: Option<Uuid>,
    pub system_instructions: String,
    pub output_structure: String,
}

#[derive(Debug)]
pub enum TrainingEvent {
    Upload(UploadedFile),
    Approve(Uuid),
    Reject(Uuid),
    Feedback { document_id: Uuid, text: String },
    Reprocess(Uuid),
    Delete(Uuid),
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub document: TrainingDocument,
    pub instructions_updated: bool,
    pub needs_clarification: bool,
    /// Best-effort steps that failed without failing the operation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DocumentOutcome {
    fn new(document: TrainingDocument) -> Self {
        Self {
            document,
            instructions_updated: false,
            needs_clarification: false,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Document(DocumentOutcome),
    Deleted { document_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub mode: SessionMode,
    pub solution: SolutionDraft,
    pub documents: Vec<TrainingDocument>,
    pub readiness: ReadinessReport,
}

struct SessionState {
    solution: SolutionDraft,
    documents: Vec<TrainingDocument>,
    busy: HashSet<Uuid>,
}

impl SessionState {
    fn document(&self, id: Uuid) -> Result<&TrainingDocument, TrainingError> {
        self.documents
            .iter()
            .find(|d| d.id == id)
            .ok_or(TrainingError::DocumentNotFound(id))
    }

    fn document_mut(&mut self, id: Uuid) -> Result<&mut TrainingDocument, TrainingError> {
        self.documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(TrainingError::DocumentNotFound(id))
    }

    /// Marks an existing, idle document busy.
    fn claim(&mut self, id: Uuid) -> Result<(), TrainingError> {
        self.ensure_idle(id)?;
        self.busy.insert(id);
        Ok(())
    }

    fn ensure_idle(&self, id: Uuid) -> Result<(), TrainingError> {
        self.document(id)?;
        if self.busy.contains(&id) {
            return Err(TrainingError::DocumentBusy(id));
        }
        Ok(())
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases a document's busy flag on drop.
struct BusyGuard<'a> {
    state: &'a Mutex<SessionState>,
    id: Uuid,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).busy.remove(&self.id);
    }
}

pub struct TrainingSession {
    id: Uuid,
    mode: SessionMode,
    gate: ReadinessGate,
    deps: SessionDeps,
    state: Mutex<SessionState>,
}

impl TrainingSession {
    pub fn new(
        solution: SolutionDraft,
        mode: SessionMode,
        gate: ReadinessGate,
        deps: SessionDeps,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            gate,
            deps,
            state: Mutex::new(SessionState {
                solution,
                documents: Vec::new(),
                busy: HashSet::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    /// Must be created right after the id was put in the busy set.
    fn release_on_drop(&self, id: Uuid) -> BusyGuard<'_> {
        BusyGuard {
            state: &self.state,
            id,
        }
    }

    pub fn solution(&self) -> SolutionDraft {
        self.lock().solution.clone()
    }

    pub fn has_documents(&self) -> bool {
        !self.lock().documents.is_empty()
    }

    pub fn document(&self, id: Uuid) -> Result<TrainingDocument, TrainingError> {
        let state = self.lock();
        let document = state.document(id)?.clone();
        Ok(document)
    }

    pub fn readiness(&self) -> ReadinessReport {
        let state = self.lock();
        self.gate.evaluate(&state.documents, self.mode)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            id: self.id,
            mode: self.mode,
            solution: state.solution.clone(),
            documents: state.documents.clone(),
            readiness: self.gate.evaluate(&state.documents, self.mode),
        }
    }

    /// Single entry point for every document operation.
    pub async fn handle(&self, event: TrainingEvent) -> Result<TrainingOutcome, TrainingError> {
        match event {
            TrainingEvent::Upload(file) => self.upload(file).await.map(TrainingOutcome::Document),
            TrainingEvent::Approve(id) => self.approve(id).map(TrainingOutcome::Document),
            TrainingEvent::Reject(id) => self.reject(id).map(TrainingOutcome::Document),
            TrainingEvent::Feedback { document_id, text } => self
                .send_feedback(document_id, &text)
                .await
                .map(TrainingOutcome::Document),
            TrainingEvent::Reprocess(id) => self.reprocess(id).await.map(TrainingOutcome::Document),
            TrainingEvent::Delete(id) => self
                .delete_document(id)
                .await
                .map(|()| TrainingOutcome::Deleted { document_id: id }),
        }
    }

    // ── Upload ──────────────────────────────────────────────────────────────

    /// Creates the document in `processing`, runs intake and extraction, and
    /// saves it as a data item when the solution is durable.
    pub async fn upload(&self, file: UploadedFile) -> Result<DocumentOutcome, TrainingError> {
        let document = TrainingDocument::new(file.file_name.clone(), file.kind());
        let id = document.id;
        let (instructions, structure, solution_id) = {
            let mut state = self.lock();
            state.documents.push(document);
            state.busy.insert(id);
            (
                state.solution.system_instructions.clone(),
                state.solution.output_structure.clone(),
                state.solution.solution_id,
            )
        };
        let _busy = self.release_on_drop(id);
        info!(
            "Session {}: processing upload '{}' as document {id}",
            self.id, file.file_name
        );

        let content = match self.deps.intake.process(&file).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Session {}: intake failed for document {id}: {e}", self.id);
                let mut state = self.lock();
                let doc = state.document_mut(id)?;
                doc.status = DocumentStatus::NeedsWork;
                doc.push_ai(PROCESSING_FAILED_AI);
                let mut outcome = DocumentOutcome::new(doc.clone());
                outcome.warnings.push(e.to_string());
                return Ok(outcome);
            }
        };
        let stored_content = content.as_str().to_string();

        let extraction = self
            .deps
            .invoker
            .extract(&content, &instructions, &structure)
            .await;

        let mut outcome = {
            let mut state = self.lock();
            let doc = state.document_mut(id)?;
            doc.source = Some(content);
            let mut warnings = Vec::new();
            match extraction {
                Ok(result) => doc.complete_processing(result),
                Err(e) => {
                    warn!("Session {}: extraction failed for document {id}: {e}", self.id);
                    doc.status = DocumentStatus::NeedsWork;
                    doc.push_ai(PROCESSING_FAILED_AI);
                    warnings.push(e.to_string());
                }
            }
            let mut outcome = DocumentOutcome::new(doc.clone());
            outcome.warnings = warnings;
            outcome
        };

        if let Some(solution_id) = solution_id {
            let document = &outcome.document;
            let saved = self
                .deps
                .store
                .save_document(
                    solution_id,
                    document.kind,
                    &stored_content,
                    &document.label,
                    document.extraction().map(|s| s.result()),
                )
                .await;
            match saved {
                Ok(persisted_id) => {
                    let mut state = self.lock();
                    let doc = state.document_mut(id)?;
                    doc.persisted_id = Some(persisted_id);
                    outcome.document = doc.clone();
                }
                Err(e) => {
                    warn!("Session {}: could not save document {id}: {e}", self.id);
                    outcome
                        .warnings
                        .push(format!("The document was not saved: {e}"));
                }
            }
        }

        info!(
            "Session {}: document {id} is {}",
            self.id, outcome.document.status
        );
        Ok(outcome)
    }

    /// Runs one upload pipeline per file concurrently. Results come back in the
    /// order the files were given.
    pub async fn upload_many(
        self: &Arc<Self>,
        files: Vec<UploadedFile>,
    ) -> Vec<Result<DocumentOutcome, TrainingError>> {
        let handles: Vec<_> = files
            .into_iter()
            .map(|file| {
                let session = Arc::clone(self);
                tokio::spawn(async move {
                    match session.handle(TrainingEvent::Upload(file)).await? {
                        TrainingOutcome::Document(outcome) => Ok(outcome),
                        TrainingOutcome::Deleted { document_id } => Err(TrainingError::TaskFailed(
                            format!("upload of {document_id} ended without a document"),
                        )),
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(TrainingError::TaskFailed(e.to_string())),
            });
        }
        results
    }

    // ── Review ──────────────────────────────────────────────────────────────

    pub fn approve(&self, id: Uuid) -> Result<DocumentOutcome, TrainingError> {
        let mut state = self.lock();
        state.ensure_idle(id)?;
        let doc = state.document_mut(id)?;
        doc.approve()?;
        info!("Session {}: document {id} approved", self.id);
        Ok(DocumentOutcome::new(doc.clone()))
    }

    pub fn reject(&self, id: Uuid) -> Result<DocumentOutcome, TrainingError> {
        let mut state = self.lock();
        state.ensure_idle(id)?;
        let doc = state.document_mut(id)?;
        doc.reject()?;
        info!("Session {}: document {id} marked needs_work", self.id);
        Ok(DocumentOutcome::new(doc.clone()))
    }

    // ── Feedback ────────────────────────────────────────────────────────────

    /// One refinement turn. A clarification only adds the model's question.
    /// An actionable answer replaces the instructions (last write wins) and
    /// re-extracts this document with them; a failed re-extraction keeps the
    /// previous result.
    pub async fn send_feedback(
        &self,
        id: Uuid,
        text: &str,
    ) -> Result<DocumentOutcome, TrainingError> {
        let feedback = text.trim();
        if feedback.is_empty() {
            return Err(TrainingError::EmptyFeedback);
        }

        let (history, instructions, structure) = {
            let mut state = self.lock();
            state.ensure_idle(id)?;
            let doc = state.document_mut(id)?;
            doc.ensure_accepts_feedback()?;
            let history = doc.conversation().entries().to_vec();
            doc.push_user(feedback);
            state.busy.insert(id);
            (
                history,
                state.solution.system_instructions.clone(),
                state.solution.output_structure.clone(),
            )
        };
        let _busy = self.release_on_drop(id);

        let refinement = match self
            .deps
            .engine
            .refine(&instructions, &structure, &history, feedback)
            .await
        {
            Ok(refinement) => refinement,
            Err(e) => {
                warn!("Session {}: refinement failed for document {id}: {e}", self.id);
                let mut state = self.lock();
                state.document_mut(id)?.push_ai(REFINEMENT_FAILED_AI);
                return Err(e.into());
            }
        };

        if refinement.needs_clarification {
            let mut state = self.lock();
            let doc = state.document_mut(id)?;
            doc.push_ai(&refinement.ai_reply);
            info!("Session {}: feedback on document {id} needs clarification", self.id);
            let mut outcome = DocumentOutcome::new(doc.clone());
            outcome.needs_clarification = true;
            return Ok(outcome);
        }

        let (solution_id, source) = {
            let mut state = self.lock();
            state.solution.system_instructions = refinement.updated_instructions.clone();
            let doc = state.document_mut(id)?;
            doc.push_ai(&refinement.ai_reply);
            let source = doc.source.clone();
            (state.solution.solution_id, source)
        };
        info!("Session {}: instructions updated from document {id}", self.id);

        let mut warnings = Vec::new();
        if let Some(solution_id) = solution_id {
            let update = SolutionUpdate::instructions(refinement.updated_instructions.clone());
            if let Err(e) = self.deps.store.update_solution(solution_id, update).await {
                warn!("Session {}: could not save updated instructions: {e}", self.id);
                warnings.push(format!("The updated instructions were not saved: {e}"));
            }
        }

        match source {
            Some(content) => {
                let extraction = self
                    .deps
                    .invoker
                    .extract(&content, &refinement.updated_instructions, &structure)
                    .await;
                match extraction {
                    Ok(result) => {
                        let persisted_id = {
                            let mut state = self.lock();
                            let doc = state.document_mut(id)?;
                            doc.record_extraction(result.clone());
                            doc.push_ai(REPROCESSED_AFTER_FEEDBACK_AI);
                            doc.persisted_id
                        };
                        if let Some(persisted_id) = persisted_id {
                            if let Err(e) = self
                                .deps
                                .store
                                .update_document_output(persisted_id, &result)
                                .await
                            {
                                warn!("Session {}: could not save new output for {id}: {e}", self.id);
                                warnings.push(format!("The new output was not saved: {e}"));
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Session {}: re-extraction failed for document {id}: {e}", self.id);
                        warnings.push(format!("Re-processing failed, previous output kept: {e}"));
                    }
                }
            }
            None => warnings.push("The document has no readable content to re-process".to_string()),
        }

        let mut outcome = DocumentOutcome::new(self.document(id)?);
        outcome.instructions_updated = true;
        outcome.warnings = warnings;
        Ok(outcome)
    }

    // ── Reprocess / delete ──────────────────────────────────────────────────

    /// Re-extracts with the instructions as they are now, which may include
    /// updates made while training other documents.
    pub async fn reprocess(&self, id: Uuid) -> Result<DocumentOutcome, TrainingError> {
        let (source, instructions, structure) = {
            let mut state = self.lock();
            state.claim(id)?;
            let source = state.document(id)?.source.clone();
            (
                source,
                state.solution.system_instructions.clone(),
                state.solution.output_structure.clone(),
            )
        };
        let _busy = self.release_on_drop(id);

        let Some(content) = source else {
            let mut state = self.lock();
            let doc = state.document_mut(id)?;
            doc.push_ai(NO_SOURCE_AI);
            let mut outcome = DocumentOutcome::new(doc.clone());
            outcome
                .warnings
                .push("The document has no readable content to re-process".to_string());
            return Ok(outcome);
        };

        let extraction = self
            .deps
            .invoker
            .extract(&content, &instructions, &structure)
            .await;

        let mut warnings = Vec::new();
        let to_persist = {
            let mut state = self.lock();
            let doc = state.document_mut(id)?;
            match extraction {
                Ok(result) => {
                    doc.record_extraction(result.clone());
                    doc.push_ai(REPROCESSED_AI);
                    doc.persisted_id.map(|persisted_id| (persisted_id, result))
                }
                Err(e) => {
                    warn!("Session {}: re-processing failed for document {id}: {e}", self.id);
                    doc.push_ai(REPROCESS_FAILED_AI);
                    warnings.push(e.to_string());
                    None
                }
            }
        };

        if let Some((persisted_id, result)) = to_persist {
            if let Err(e) = self
                .deps
                .store
                .update_document_output(persisted_id, &result)
                .await
            {
                warn!("Session {}: could not save new output for {id}: {e}", self.id);
                warnings.push(format!("The new output was not saved: {e}"));
            }
        }

        let mut outcome = DocumentOutcome::new(self.document(id)?);
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// Removes the document. A durable record is deleted first; if that fails
    /// the document stays in the session. A record that no longer exists
    /// counts as deleted.
    pub async fn delete_document(&self, id: Uuid) -> Result<(), TrainingError> {
        let persisted_id = {
            let mut state = self.lock();
            state.claim(id)?;
            state.document(id)?.persisted_id
        };
        let _busy = self.release_on_drop(id);

        if let Some(persisted_id) = persisted_id {
            match self.deps.store.delete_document(persisted_id).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => {
                    info!("Session {}: record for document {id} was already gone", self.id);
                }
                Err(e) => {
                    warn!("Session {}: could not delete record for document {id}: {e}", self.id);
                    return Err(e.into());
                }
            }
        }

        let mut state = self.lock();
        state.documents.retain(|d| d.id != id);
        info!("Session {}: document {id} deleted", self.id);
        Ok(())
    }
}
