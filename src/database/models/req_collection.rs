use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReqCollection {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
