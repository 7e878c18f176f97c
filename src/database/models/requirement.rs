use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// One version of a requirement. Versions share `base_req_id` and `public_id`;
/// the hierarchy is expressed through `parent_req_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Requirement {
    pub id: i64,
    pub workspace_id: i64,
    pub req_collection_id: i64,
    pub base_req_id: Option<i64>,
    pub parent_req_id: Option<i64>,
    pub prev_version: Option<i64>,
    pub author_id: i64,
    pub owner_id: Option<i64>,
    pub public_id: Option<String>,
    pub name: String,
    pub definition: String,
    pub version_number: i32,
    pub level: String,
    pub priority: String,
    pub functional: bool,
    pub validation_method: String,
    pub status: String,
    pub rationale: Option<String>,
    pub notes: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
