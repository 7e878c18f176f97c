use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub id: i64,
    pub workspace_id: i64,
    pub req_collection_id: Option<i64>,
    pub public_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub rules: Option<String>,
    pub shared: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Module as embedded in product responses, with its requirement count
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModuleSummary {
    pub id: i64,
    pub public_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub shared: bool,
    pub requirement_count: i64,
}
