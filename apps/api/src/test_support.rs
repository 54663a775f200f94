//! Test doubles shared by unit tests across the crate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::extraction::{ExtractionInvoker, ExtractionResult};
use crate::llm_client::{ChatModel, ChatRequest, LlmError};
use crate::models::document::{DocumentContent, DocumentKind};
use crate::models::solution::SolutionRow;
use crate::refinement::RefinementEngine;
use crate::solutions::repository::{SolutionUpdate, StoreError};
use crate::state::AppState;
use crate::training::intake::{DocumentIntake, IntakeError, UploadedFile};
use crate::training::readiness::ReadinessGate;
use crate::training::registry::SessionRegistry;
use crate::training::session::SessionDeps;
use crate::training::store::{SqliteTrainingStore, TrainingStore};

/// Replays queued replies in order and records every request it receives.
/// Runs out of script as `LlmError::EmptyContent`.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, u16>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queues an API error with the given HTTP status.
    pub fn fail(&self, status: u16) {
        self.replies.lock().unwrap().push_back(Err(status));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(status)) => Err(LlmError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Err(LlmError::EmptyContent),
        }
    }
}

/// Treats every upload as UTF-8 text. Files named `*.broken` fail intake.
pub struct StaticIntake;

#[async_trait]
impl DocumentIntake for StaticIntake {
    async fn process(&self, file: &UploadedFile) -> Result<DocumentContent, IntakeError> {
        if file.file_name.ends_with(".broken") {
            return Err(IntakeError {
                file_name: file.file_name.clone(),
                details: "unreadable test file".to_string(),
            });
        }
        Ok(DocumentContent::Text {
            text: String::from_utf8_lossy(&file.bytes).into_owned(),
        })
    }
}

/// In-memory `TrainingStore` with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<Uuid, Option<Value>>>,
    solution_updates: Mutex<Vec<(Uuid, SolutionUpdate)>>,
    pub fail_saves: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn output(&self, id: Uuid) -> Option<Value> {
        self.items.lock().unwrap().get(&id).cloned().flatten()
    }

    pub fn solution_updates(&self) -> Vec<(Uuid, SolutionUpdate)> {
        self.solution_updates.lock().unwrap().clone()
    }

    fn unavailable() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl TrainingStore for MemoryStore {
    async fn save_document(
        &self,
        _solution_id: Uuid,
        _kind: DocumentKind,
        _content: &str,
        _label: &str,
        result: Option<&ExtractionResult>,
    ) -> Result<Uuid, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let id = Uuid::new_v4();
        self.items
            .lock()
            .unwrap()
            .insert(id, result.map(ExtractionResult::render));
        Ok(id)
    }

    async fn update_document_output(
        &self,
        id: Uuid,
        result: &ExtractionResult,
    ) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        match self.items.lock().unwrap().get_mut(&id) {
            Some(output) => {
                *output = Some(result.render());
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("Data item {id}"))),
        }
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.items
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("Data item {id}")))
    }

    async fn update_solution(
        &self,
        solution_id: Uuid,
        update: SolutionUpdate,
    ) -> Result<SolutionRow, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut row = solution_row(solution_id);
        if let Some(instructions) = &update.system_instructions {
            row.system_instructions = instructions.clone();
        }
        self.solution_updates
            .lock()
            .unwrap()
            .push((solution_id, update));
        Ok(row)
    }
}

pub fn solution_row(id: Uuid) -> SolutionRow {
    let now = Utc::now();
    SolutionRow {
        id,
        slug: None,
        name: "Test Solution".to_string(),
        description: String::new(),
        problem_description: String::new(),
        target_users: String::new(),
        usage_count: 0,
        system_instructions: String::new(),
        model_output_structure: String::new(),
        status: "draft".to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn session_deps(model: Arc<ScriptedModel>, store: Arc<MemoryStore>) -> SessionDeps {
    SessionDeps {
        invoker: ExtractionInvoker::new(model.clone()),
        engine: RefinementEngine::new(model),
        intake: Arc::new(StaticIntake),
        store,
    }
}

pub fn text_file(name: &str, body: &str) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: Some("text/plain".to_string()),
        bytes: Bytes::from(body.to_string()),
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        llama_api_key: "test-key".to_string(),
        llama_api_url: "http://localhost:9".to_string(),
        llm_timeout_secs: 5,
        port: 0,
        rust_log: "debug".to_string(),
        max_upload_bytes: 1024 * 1024,
        readiness: ReadinessGate::default(),
    }
}

/// App state over an in-memory database, with the given model and text-only intake.
pub fn app_state(model: Arc<ScriptedModel>, db: SqlitePool) -> AppState {
    AppState {
        db: db.clone(),
        llm: model,
        intake: Arc::new(StaticIntake),
        store: Arc::new(SqliteTrainingStore::new(db)),
        sessions: SessionRegistry::default(),
        config: test_config(),
    }
}
