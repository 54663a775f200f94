use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::ScoredExtraction;
use crate::models::data_item::DataItemRow;
use crate::models::solution::SolutionRow;
use crate::solutions::repository::{self, NewSolution, SolutionUpdate};
use crate::solutions::schema_gen::{generate_output_structure, GeneratedStructure};
use crate::solutions::{is_valid_slug, slugify};
use crate::state::AppState;
use crate::training::handlers::collect_uploads;

#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    pub slug: Option<String>,
}

#[derive(Deserialize)]
pub struct OutputSchemaRequest {
    pub description: String,
}

/// POST /api/v1/solutions
pub async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<NewSolution>,
) -> Result<(StatusCode, Json<SolutionRow>), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Solution name is required".to_string()));
    }
    let row = repository::create_solution(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/solutions
pub async fn handle_list_published(
    State(state): State<AppState>,
) -> Result<Json<Vec<SolutionRow>>, AppError> {
    Ok(Json(repository::list_published(&state.db).await?))
}

/// GET /api/v1/solutions/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SolutionRow>, AppError> {
    Ok(Json(repository::get_solution(&state.db, id).await?))
}

/// GET /api/v1/solutions/slug/:slug
pub async fn handle_get_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<SolutionRow>, AppError> {
    Ok(Json(repository::get_solution_by_slug(&state.db, &slug).await?))
}

/// PATCH /api/v1/solutions/:id
///
/// Instructions belong to the live training session while one holds documents
/// for this solution, so edits to them are refused until it closes.
pub async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<SolutionUpdate>,
) -> Result<Json<SolutionRow>, AppError> {
    if update.touches_instructions() && state.sessions.is_training(id).await {
        return Err(AppError::Conflict(format!(
            "Solution {id} is being trained; its instructions are managed by the training session"
        )));
    }
    Ok(Json(repository::update_solution(&state.db, id, &update).await?))
}

/// DELETE /api/v1/solutions/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.is_training(id).await {
        return Err(AppError::Conflict(format!(
            "Solution {id} is being trained; close the training session before deleting it"
        )));
    }
    repository::delete_solution(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/solutions/:id/publish
pub async fn handle_publish(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<SolutionRow>, AppError> {
    let slug = match req.slug {
        Some(slug) => slug.trim().to_string(),
        None => {
            let solution = repository::get_solution(&state.db, id).await?;
            slugify(&solution.name)
        }
    };
    if !is_valid_slug(&slug) {
        return Err(AppError::Validation(format!(
            "'{slug}' is not a valid slug (lowercase letters, digits and single hyphens)"
        )));
    }
    Ok(Json(repository::publish_solution(&state.db, id, &slug).await?))
}

/// GET /api/v1/solutions/:id/data-items
pub async fn handle_list_data_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DataItemRow>>, AppError> {
    repository::get_solution(&state.db, id).await?;
    Ok(Json(repository::list_data_items(&state.db, id).await?))
}

/// POST /api/v1/solutions/output-schema
pub async fn handle_output_schema(
    State(state): State<AppState>,
    Json(req): Json<OutputSchemaRequest>,
) -> Result<Json<GeneratedStructure>, AppError> {
    if req.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Describe the fields you want extracted".to_string(),
        ));
    }
    let generated = generate_output_structure(state.llm.as_ref(), &req.description).await?;
    Ok(Json(generated))
}

/// POST /api/v1/solutions/:id/run
///
/// Runs the stored instructions against the first uploaded file.
pub async fn handle_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ScoredExtraction>, AppError> {
    let solution = repository::get_solution(&state.db, id).await?;
    let file = collect_uploads(multipart)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;

    let content = state
        .intake
        .process(&file)
        .await
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;
    let result = state
        .invoker()
        .extract(
            &content,
            &solution.system_instructions,
            &solution.model_output_structure,
        )
        .await?;
    repository::increment_usage(&state.db, id).await?;

    if result.is_degraded() {
        warn!("Solution {id} produced unstructured output for '{}'", file.file_name);
    } else {
        info!(
            "Ran solution {id} on '{}': {} fields",
            file.file_name,
            result.field_count()
        );
    }
    Ok(Json(ScoredExtraction::new(result)))
}
