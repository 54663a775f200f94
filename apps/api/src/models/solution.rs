use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolutionStatus {
    Draft,
    Published,
}

impl SolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SolutionStatus::Draft => "draft",
            SolutionStatus::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SolutionRow {
    pub id: Uuid,
    pub slug: Option<String>,
    pub name: String,
    pub description: String,
    pub problem_description: String,
    pub target_users: String,
    pub usage_count: i64,
    pub system_instructions: String,
    pub model_output_structure: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SolutionRow {
    pub fn status(&self) -> SolutionStatus {
        if self.status == SolutionStatus::Published.as_str() {
            SolutionStatus::Published
        } else {
            SolutionStatus::Draft
        }
    }

    pub fn is_published(&self) -> bool {
        self.status() == SolutionStatus::Published
    }
}
