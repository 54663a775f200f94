//! Durable side of a training session, as the orchestrator sees it.
//!
//! Each call either fully succeeds or reports failure; the orchestrator never
//! assumes a partial write. `AppState` carries an `Arc<dyn TrainingStore>`.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::extraction::ExtractionResult;
use crate::models::document::DocumentKind;
use crate::models::solution::SolutionRow;
use crate::solutions::repository::{self, NewDataItem, SolutionUpdate, StoreError};

#[async_trait]
pub trait TrainingStore: Send + Sync {
    /// Saves an uploaded document as a data item and returns its id.
    async fn save_document(
        &self,
        solution_id: Uuid,
        kind: DocumentKind,
        content: &str,
        label: &str,
        result: Option<&ExtractionResult>,
    ) -> Result<Uuid, StoreError>;

    async fn update_document_output(
        &self,
        id: Uuid,
        result: &ExtractionResult,
    ) -> Result<(), StoreError>;

    async fn delete_document(&self, id: Uuid) -> Result<(), StoreError>;

    async fn update_solution(
        &self,
        solution_id: Uuid,
        update: SolutionUpdate,
    ) -> Result<SolutionRow, StoreError>;
}

pub struct SqliteTrainingStore {
    pool: SqlitePool,
}

impl SqliteTrainingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrainingStore for SqliteTrainingStore {
    async fn save_document(
        &self,
        solution_id: Uuid,
        kind: DocumentKind,
        content: &str,
        label: &str,
        result: Option<&ExtractionResult>,
    ) -> Result<Uuid, StoreError> {
        let output = result.map(ExtractionResult::render);
        repository::insert_data_item(
            &self.pool,
            NewDataItem {
                solution_id,
                kind,
                label,
                content,
                model_output: output.as_ref(),
            },
        )
        .await
    }

    async fn update_document_output(
        &self,
        id: Uuid,
        result: &ExtractionResult,
    ) -> Result<(), StoreError> {
        repository::update_data_item_output(&self.pool, id, &result.render()).await
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), StoreError> {
        repository::delete_data_item(&self.pool, id).await
    }

    async fn update_solution(
        &self,
        solution_id: Uuid,
        update: SolutionUpdate,
    ) -> Result<SolutionRow, StoreError> {
        repository::update_solution(&self.pool, solution_id, &update).await
    }
}
