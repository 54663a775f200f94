use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::training::session::TrainingSession;

/// Live training sessions, keyed by session id. Sessions are in-memory only.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<TrainingSession>>>>,
}

impl SessionRegistry {
    pub async fn insert(&self, session: TrainingSession) -> Arc<TrainingSession> {
        let session = Arc::new(session);
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));
        info!("Training session {} opened", session.id());
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<TrainingSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<TrainingSession>> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            info!("Training session {id} closed");
        }
        removed
    }

    /// True when some session is training this solution and already holds documents.
    pub async fn is_training(&self, solution_id: Uuid) -> bool {
        self.sessions.read().await.values().any(|session| {
            session.solution().solution_id == Some(solution_id) && session.has_documents()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::DEFAULT_INSTRUCTIONS;
    use crate::test_support::{session_deps, text_file, MemoryStore, ScriptedModel};
    use crate::training::readiness::{ReadinessGate, SessionMode};
    use crate::training::session::SolutionDraft;

    fn session_for(solution_id: Option<Uuid>, model: &Arc<ScriptedModel>) -> TrainingSession {
        TrainingSession::new(
            SolutionDraft {
                solution_id,
                system_instructions: DEFAULT_INSTRUCTIONS.to_string(),
                output_structure: "{}".to_string(),
            },
            SessionMode::NewSolution,
            ReadinessGate::default(),
            session_deps(model.clone(), MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = SessionRegistry::default();
        let model = ScriptedModel::new();
        let session = registry.insert(session_for(None, &model)).await;

        assert!(registry.get(session.id()).await.is_some());
        assert!(registry.remove(session.id()).await.is_some());
        assert!(registry.get(session.id()).await.is_none());
        assert!(registry.remove(session.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_is_training_requires_documents() {
        let registry = SessionRegistry::default();
        let model = ScriptedModel::new();
        let solution_id = Uuid::new_v4();
        let session = registry.insert(session_for(Some(solution_id), &model)).await;
        assert!(!registry.is_training(solution_id).await);

        model.reply(r#"{"a": 1}"#);
        session.upload(text_file("a.txt", "a")).await.unwrap();
        assert!(registry.is_training(solution_id).await);
        assert!(!registry.is_training(Uuid::new_v4()).await);
    }
}
