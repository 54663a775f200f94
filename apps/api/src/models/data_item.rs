use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted training document attached to a solution.
/// `model_output` holds the rendered extraction result as JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DataItemRow {
    pub id: Uuid,
    pub solution_id: Uuid,
    pub kind: String,
    pub label: String,
    pub content: String,
    pub model_output: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
impl DataItemRow {
    pub fn output(&self) -> Option<serde_json::Value> {
        self.model_output
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}
