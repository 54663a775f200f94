use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::extraction::ExtractionInvoker;
use crate::llm_client::ChatModel;
use crate::refinement::RefinementEngine;
use crate::training::intake::DocumentIntake;
use crate::training::registry::SessionRegistry;
use crate::training::session::SessionDeps;
use crate::training::store::TrainingStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Pluggable chat model. Production: `LlmClient` against the Llama API.
    pub llm: Arc<dyn ChatModel>,
    pub intake: Arc<dyn DocumentIntake>,
    pub store: Arc<dyn TrainingStore>,
    pub sessions: SessionRegistry,
    pub config: Config,
}

impl AppState {
    pub fn invoker(&self) -> ExtractionInvoker {
        ExtractionInvoker::new(Arc::clone(&self.llm))
    }

    pub fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            invoker: self.invoker(),
            engine: RefinementEngine::new(Arc::clone(&self.llm)),
            intake: Arc::clone(&self.intake),
            store: Arc::clone(&self.store),
        }
    }
}
