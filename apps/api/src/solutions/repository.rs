//! SQLite access for solutions and their training data items.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::data_item::DataItemRow;
use crate::models::document::DocumentKind;
use crate::models::solution::{SolutionRow, SolutionStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Slug '{0}' is already taken")]
    SlugTaken(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSolution {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub problem_description: String,
    #[serde(default)]
    pub target_users: String,
    #[serde(default)]
    pub system_instructions: String,
    #[serde(default)]
    pub model_output_structure: String,
}

/// Partial update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SolutionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub problem_description: Option<String>,
    pub target_users: Option<String>,
    pub system_instructions: Option<String>,
    pub model_output_structure: Option<String>,
}

impl SolutionUpdate {
    pub fn instructions(text: impl Into<String>) -> Self {
        Self {
            system_instructions: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn touches_instructions(&self) -> bool {
        self.system_instructions.is_some()
    }
}

pub struct NewDataItem<'a> {
    pub solution_id: Uuid,
    pub kind: DocumentKind,
    pub label: &'a str,
    pub content: &'a str,
    pub model_output: Option<&'a Value>,
}

// ────────────────────────────────────────────────────────────────────────────
// Solutions
// ────────────────────────────────────────────────────────────────────────────

pub async fn create_solution(pool: &SqlitePool, new: &NewSolution) -> Result<SolutionRow, StoreError> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, SolutionRow>(
        r#"
        INSERT INTO solutions
            (id, name, description, problem_description, target_users,
             system_instructions, model_output_structure, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.problem_description)
    .bind(&new.target_users)
    .bind(&new.system_instructions)
    .bind(&new.model_output_structure)
    .bind(SolutionStatus::Draft.as_str())
    .bind(now)
    .fetch_one(pool)
    .await?;

    info!("Created draft solution {}", row.id);
    Ok(row)
}

pub async fn get_solution(pool: &SqlitePool, id: Uuid) -> Result<SolutionRow, StoreError> {
    sqlx::query_as::<_, SolutionRow>("SELECT * FROM solutions WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Solution {id}")))
}

pub async fn get_solution_by_slug(pool: &SqlitePool, slug: &str) -> Result<SolutionRow, StoreError> {
    sqlx::query_as::<_, SolutionRow>("SELECT * FROM solutions WHERE slug = ?1 AND status = ?2")
        .bind(slug)
        .bind(SolutionStatus::Published.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Solution '{slug}'")))
}

/// Published solutions, most used first.
pub async fn list_published(pool: &SqlitePool) -> Result<Vec<SolutionRow>, StoreError> {
    Ok(sqlx::query_as::<_, SolutionRow>(
        "SELECT * FROM solutions WHERE status = ?1 ORDER BY usage_count DESC, created_at DESC",
    )
    .bind(SolutionStatus::Published.as_str())
    .fetch_all(pool)
    .await?)
}

pub async fn update_solution(
    pool: &SqlitePool,
    id: Uuid,
    update: &SolutionUpdate,
) -> Result<SolutionRow, StoreError> {
    sqlx::query_as::<_, SolutionRow>(
        r#"
        UPDATE solutions SET
            name                   = COALESCE(?1, name),
            description            = COALESCE(?2, description),
            problem_description    = COALESCE(?3, problem_description),
            target_users           = COALESCE(?4, target_users),
            system_instructions    = COALESCE(?5, system_instructions),
            model_output_structure = COALESCE(?6, model_output_structure),
            updated_at             = ?7
        WHERE id = ?8
        RETURNING *
        "#,
    )
    .bind(&update.name)
    .bind(&update.description)
    .bind(&update.problem_description)
    .bind(&update.target_users)
    .bind(&update.system_instructions)
    .bind(&update.model_output_structure)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("Solution {id}")))
}

pub async fn publish_solution(pool: &SqlitePool, id: Uuid, slug: &str) -> Result<SolutionRow, StoreError> {
    let result = sqlx::query_as::<_, SolutionRow>(
        "UPDATE solutions SET slug = ?1, status = ?2, updated_at = ?3 WHERE id = ?4 RETURNING *",
    )
    .bind(slug)
    .bind(SolutionStatus::Published.as_str())
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await;

    match result {
        Ok(Some(row)) => {
            info!("Published solution {id} as '{slug}'");
            Ok(row)
        }
        Ok(None) => Err(StoreError::NotFound(format!("Solution {id}"))),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(StoreError::SlugTaken(slug.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the solution; its data items go with it via ON DELETE CASCADE.
pub async fn delete_solution(pool: &SqlitePool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM solutions WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("Solution {id}")));
    }
    info!("Deleted solution {id}");
    Ok(())
}

pub async fn increment_usage(pool: &SqlitePool, id: Uuid) -> Result<(), StoreError> {
    sqlx::query("UPDATE solutions SET usage_count = usage_count + 1 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Data items
// ────────────────────────────────────────────────────────────────────────────

pub async fn insert_data_item(pool: &SqlitePool, item: NewDataItem<'_>) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let model_output = item.model_output.map(serde_json::to_string).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO data_items
            (id, solution_id, kind, label, content, model_output, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        "#,
    )
    .bind(id)
    .bind(item.solution_id)
    .bind(item.kind.as_str())
    .bind(item.label)
    .bind(item.content)
    .bind(model_output)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn update_data_item_output(pool: &SqlitePool, id: Uuid, output: &Value) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE data_items SET model_output = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(serde_json::to_string(output)?)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("Data item {id}")));
    }
    Ok(())
}

pub async fn delete_data_item(pool: &SqlitePool, id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM data_items WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("Data item {id}")));
    }
    Ok(())
}

pub async fn list_data_items(pool: &SqlitePool, solution_id: Uuid) -> Result<Vec<DataItemRow>, StoreError> {
    Ok(sqlx::query_as::<_, DataItemRow>(
        "SELECT * FROM data_items WHERE solution_id = ?1 ORDER BY created_at ASC",
    )
    .bind(solution_id)
    .fetch_all(pool)
    .await?)
}
