use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::{non_empty_or, DEFAULT_INSTRUCTIONS, DEFAULT_OUTPUT_STRUCTURE};
use crate::models::solution::SolutionRow;
use crate::solutions::repository;
use crate::state::AppState;
use crate::training::intake::UploadedFile;
use crate::training::readiness::SessionMode;
use crate::training::session::{
    DocumentOutcome, SessionSnapshot, SolutionDraft, TrainingEvent, TrainingOutcome,
    TrainingSession,
};

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    pub solution_id: Option<Uuid>,
    pub system_instructions: Option<String>,
    pub output_structure: Option<String>,
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub documents: Vec<DocumentOutcome>,
    pub errors: Vec<String>,
}

/// Reads every multipart field that carries a file name. Other fields are ignored.
pub async fn collect_uploads(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        files.push(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }
    if files.is_empty() {
        return Err(AppError::Validation(
            "The upload must contain at least one file".to_string(),
        ));
    }
    Ok(files)
}

/// A solution that is published or already carries its own instructions is
/// being edited rather than trained from scratch.
fn session_mode(solution: &SolutionRow) -> SessionMode {
    let instructions = solution.system_instructions.trim();
    if solution.is_published() || (!instructions.is_empty() && instructions != DEFAULT_INSTRUCTIONS)
    {
        SessionMode::Editing
    } else {
        SessionMode::NewSolution
    }
}

async fn find_session(
    state: &AppState,
    session_id: Uuid,
) -> Result<std::sync::Arc<TrainingSession>, AppError> {
    state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Training session {session_id} not found")))
}

async fn dispatch(
    state: &AppState,
    session_id: Uuid,
    event: TrainingEvent,
) -> Result<Json<TrainingOutcome>, AppError> {
    let session = find_session(state, session_id).await?;
    let outcome = session.handle(event).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/training/sessions
pub async fn handle_start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let (draft, mode) = match req.solution_id {
        Some(id) => {
            let solution = repository::get_solution(&state.db, id).await?;
            let mode = session_mode(&solution);
            let instructions = req
                .system_instructions
                .unwrap_or(solution.system_instructions);
            let structure = req
                .output_structure
                .unwrap_or(solution.model_output_structure);
            (
                SolutionDraft {
                    solution_id: Some(id),
                    system_instructions: non_empty_or(&instructions, DEFAULT_INSTRUCTIONS)
                        .to_string(),
                    output_structure: non_empty_or(&structure, DEFAULT_OUTPUT_STRUCTURE)
                        .to_string(),
                },
                mode,
            )
        }
        None => (
            SolutionDraft {
                solution_id: None,
                system_instructions: non_empty_or(
                    req.system_instructions.as_deref().unwrap_or_default(),
                    DEFAULT_INSTRUCTIONS,
                )
                .to_string(),
                output_structure: non_empty_or(
                    req.output_structure.as_deref().unwrap_or_default(),
                    DEFAULT_OUTPUT_STRUCTURE,
                )
                .to_string(),
            },
            SessionMode::NewSolution,
        ),
    };

    let session = TrainingSession::new(
        draft,
        mode,
        state.config.readiness,
        state.session_deps(),
    );
    let session = state.sessions.insert(session).await;
    Ok((StatusCode::CREATED, Json(session.snapshot())))
}

/// GET /api/v1/training/sessions/:sid
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, session_id).await?;
    Ok(Json(session.snapshot()))
}

/// DELETE /api/v1/training/sessions/:sid
pub async fn handle_close_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .remove(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Training session {session_id} not found")))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/training/sessions/:sid/documents
pub async fn handle_upload(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let session = find_session(&state, session_id).await?;
    let files = collect_uploads(multipart).await?;

    let mut response = UploadResponse {
        documents: Vec::with_capacity(files.len()),
        errors: Vec::new(),
    };
    for result in session.upload_many(files).await {
        match result {
            Ok(outcome) => response.documents.push(outcome),
            Err(e) => {
                warn!("Session {session_id}: upload failed: {e}");
                response.errors.push(e.to_string());
            }
        }
    }
    Ok(Json(response))
}

/// POST /api/v1/training/sessions/:sid/documents/:did/approve
pub async fn handle_approve(
    State(state): State<AppState>,
    Path((session_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TrainingOutcome>, AppError> {
    dispatch(&state, session_id, TrainingEvent::Approve(document_id)).await
}

/// POST /api/v1/training/sessions/:sid/documents/:did/reject
pub async fn handle_reject(
    State(state): State<AppState>,
    Path((session_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TrainingOutcome>, AppError> {
    dispatch(&state, session_id, TrainingEvent::Reject(document_id)).await
}

/// POST /api/v1/training/sessions/:sid/documents/:did/feedback
pub async fn handle_feedback(
    State(state): State<AppState>,
    Path((session_id, document_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<TrainingOutcome>, AppError> {
    dispatch(
        &state,
        session_id,
        TrainingEvent::Feedback {
            document_id,
            text: req.text,
        },
    )
    .await
}

/// POST /api/v1/training/sessions/:sid/documents/:did/reprocess
pub async fn handle_reprocess(
    State(state): State<AppState>,
    Path((session_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TrainingOutcome>, AppError> {
    dispatch(&state, session_id, TrainingEvent::Reprocess(document_id)).await
}

/// DELETE /api/v1/training/sessions/:sid/documents/:did
pub async fn handle_delete_document(
    State(state): State<AppState>,
    Path((session_id, document_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let session = find_session(&state, session_id).await?;
    session.handle(TrainingEvent::Delete(document_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
