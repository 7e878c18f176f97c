use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Parameter {
    pub id: i64,
    pub workspace_id: i64,
    pub base_param_id: Option<i64>,
    pub prev_version: Option<i64>,
    pub author_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub param_type: String,
    pub description: Option<String>,
    pub value: Option<Value>,
    pub group_id: Option<i64>,
    pub version_number: i32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
