use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub workspace_id: i64,
    pub public_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub default_module_id: Option<i64>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
