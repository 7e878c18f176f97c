use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Release {
    pub id: i64,
    pub module_id: i64,
    pub prev_release: Option<i64>,
    pub public_id: Option<String>,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub draft: bool,
    pub release_date: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
