use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: i64,
    pub workspace_id: i64,
    pub creator_id: i64,
    pub public_id: Option<String>,
    pub name: String,
    /// Relative to the configured upload directory
    pub file_path: String,
    pub file_type: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
