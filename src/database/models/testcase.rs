use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestCase {
    pub id: i64,
    pub workspace_id: i64,
    pub public_id: Option<String>,
    pub name: String,
    pub test_method: String,
    pub expected_results: String,
    pub execution_mode: String,
    pub notes: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestRun {
    pub id: i64,
    pub testcase_id: i64,
    pub executor_id: Option<i64>,
    pub result: String,
    pub executed_at: DateTime<Utc>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
