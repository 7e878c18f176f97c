use axum::{extract::State, Extension};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{in_workspace, optional_text, parse_enum, required_text};
use crate::api::{ApiJson, ApiPath, ApiQuery, ListQuery, ListSpec};
use crate::database::models::{TestCase, TestRun};
use crate::database::Repository;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, Page, ValidatedWorkspace};
use crate::services::CurrentUser;
use crate::state::AppState;
use crate::types::{ExecutionMode, TestMethod, TestResult};

const LIST: ListSpec = ListSpec::newest_first(&["name", "expected_results", "notes"]);

#[derive(Debug, Default, Deserialize)]
pub struct TestCaseFilters {
    pub test_method: Option<String>,
    pub execution_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTestCase {
    pub name: String,
    #[serde(default = "default_test_method")]
    pub test_method: TestMethod,
    pub expected_results: String,
    #[serde(default = "default_execution_mode")]
    pub execution_mode: ExecutionMode,
    pub notes: Option<String>,
    pub metadata: Option<Value>,
}

fn default_test_method() -> TestMethod {
    TestMethod::Manual
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Interactive
}

#[derive(Debug, Deserialize)]
pub struct UpdateTestCase {
    pub name: Option<String>,
    pub test_method: Option<TestMethod>,
    pub expected_results: Option<String>,
    pub execution_mode: Option<ExecutionMode>,
    pub notes: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTestRun {
    pub result: TestResult,
    pub executor_id: Option<i64>,
    pub executed_at: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTestRun {
    pub result: Option<TestResult>,
    pub executor_id: Option<i64>,
    pub executed_at: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

fn testcases(state: &AppState) -> Repository<TestCase> {
    Repository::new("testcases", "Test case", state.pool.clone())
}

async fn ensure_testcase(state: &AppState, workspace_id: i64, testcase_id: i64) -> Result<(), ApiError> {
    testcases(state)
        .find_in_workspace(workspace_id, testcase_id)
        .await
        .map_err(|_| ApiError::not_found("Test case not found in this workspace"))?;
    Ok(())
}

/// GET /api/v1/workspaces/:workspace_id/testcases
pub async fn list(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiQuery(query): ApiQuery<ListQuery>,
    ApiQuery(filters): ApiQuery<TestCaseFilters>,
) -> ApiResult<Page<TestCase>> {
    let mut conditions = in_workspace(workspace.id());
    if let Some(method) = filters.test_method.as_deref() {
        conditions.insert("test_method".into(), parse_enum("test_method", method, TestMethod::parse)?.as_str().into());
    }
    if let Some(mode) = filters.execution_mode.as_deref() {
        conditions.insert(
            "execution_mode".into(),
            parse_enum("execution_mode", mode, ExecutionMode::parse)?.as_str().into(),
        );
    }

    let request = query.into_request(&LIST, conditions)?;
    let (items, total) = testcases(&state).select_page(request.filter).await?;
    Ok(ApiResponse::success(Page::new(items, request.page, request.limit, total)))
}

/// POST /api/v1/workspaces/:workspace_id/testcases
pub async fn create(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiJson(body): ApiJson<CreateTestCase>,
) -> ApiResult<TestCase> {
    let name = required_text("name", &body.name)?;
    required_text("expected_results", &body.expected_results)?;

    let testcase = sqlx::query_as::<_, TestCase>(
        r#"
        INSERT INTO testcases (workspace_id, name, test_method, expected_results, execution_mode, notes, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(workspace.id())
    .bind(name)
    .bind(body.test_method.as_str())
    .bind(&body.expected_results)
    .bind(body.execution_mode.as_str())
    .bind(&body.notes)
    .bind(body.metadata.clone().unwrap_or_else(|| json!({})))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        "Test case {} ({}) created in workspace {}",
        testcase.id,
        testcase.public_id.as_deref().unwrap_or("-"),
        workspace.id()
    );
    Ok(ApiResponse::created(testcase))
}

/// GET /api/v1/workspaces/:workspace_id/testcases/:testcase_id
pub async fn get(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, testcase_id)): ApiPath<(i64, i64)>,
) -> ApiResult<TestCase> {
    let testcase = testcases(&state).find_in_workspace(workspace.id(), testcase_id).await?;
    Ok(ApiResponse::success(testcase))
}

/// PUT /api/v1/workspaces/:workspace_id/testcases/:testcase_id
pub async fn update(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, testcase_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<UpdateTestCase>,
) -> ApiResult<TestCase> {
    let name = optional_text("name", body.name.as_deref())?;
    let expected = optional_text("expected_results", body.expected_results.as_deref())?;

    let testcase = sqlx::query_as::<_, TestCase>(
        r#"
        UPDATE testcases
        SET name = COALESCE($3, name),
            test_method = COALESCE($4, test_method),
            expected_results = COALESCE($5, expected_results),
            execution_mode = COALESCE($6, execution_mode),
            notes = COALESCE($7, notes),
            metadata = COALESCE($8, metadata)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(testcase_id)
    .bind(workspace.id())
    .bind(name)
    .bind(body.test_method.map(|m| m.as_str()))
    .bind(expected)
    .bind(body.execution_mode.map(|m| m.as_str()))
    .bind(&body.notes)
    .bind(&body.metadata)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Test case not found in this workspace"))?;

    Ok(ApiResponse::success(testcase))
}

/// DELETE /api/v1/workspaces/:workspace_id/testcases/:testcase_id - runs go with it
pub async fn delete(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, testcase_id)): ApiPath<(i64, i64)>,
) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM testcases WHERE id = $1 AND workspace_id = $2")
        .bind(testcase_id)
        .bind(workspace.id())
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Test case not found in this workspace"));
    }
    tracing::info!("Test case {} deleted from workspace {}", testcase_id, workspace.id());
    Ok(ApiResponse::no_content())
}

/// GET /api/v1/workspaces/:workspace_id/testcases/:testcase_id/runs - most recent first
pub async fn list_runs(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, testcase_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Vec<TestRun>> {
    ensure_testcase(&state, workspace.id(), testcase_id).await?;
    let runs = sqlx::query_as::<_, TestRun>(
        "SELECT * FROM testruns WHERE testcase_id = $1 ORDER BY executed_at DESC, id DESC",
    )
    .bind(testcase_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(ApiResponse::success(runs))
}

/// POST /api/v1/workspaces/:workspace_id/testcases/:testcase_id/runs - executor defaults to the caller
pub async fn create_run(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    Extension(current): Extension<CurrentUser>,
    ApiPath((_, testcase_id)): ApiPath<(i64, i64)>,
    ApiJson(body): ApiJson<CreateTestRun>,
) -> ApiResult<TestRun> {
    ensure_testcase(&state, workspace.id(), testcase_id).await?;

    let run = sqlx::query_as::<_, TestRun>(
        r#"
        INSERT INTO testruns (testcase_id, executor_id, result, executed_at, metadata)
        VALUES ($1, $2, $3, COALESCE($4, NOW()), $5)
        RETURNING *
        "#,
    )
    .bind(testcase_id)
    .bind(body.executor_id.unwrap_or(current.user_id))
    .bind(body.result.as_str())
    .bind(body.executed_at)
    .bind(body.metadata.unwrap_or_else(|| json!({})))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!("Test run {} recorded for test case {}: {}", run.id, testcase_id, run.result);
    Ok(ApiResponse::created(run))
}

/// PUT /api/v1/workspaces/:workspace_id/testcases/:testcase_id/runs/:run_id
pub async fn update_run(
    State(state): State<AppState>,
    Extension(workspace): Extension<ValidatedWorkspace>,
    ApiPath((_, testcase_id, run_id)): ApiPath<(i64, i64, i64)>,
    ApiJson(body): ApiJson<UpdateTestRun>,
) -> ApiResult<TestRun> {
    ensure_testcase(&state, workspace.id(), testcase_id).await?;

    let run = sqlx::query_as::<_, TestRun>(
        r#"
        UPDATE testruns
        SET result = COALESCE($3, result),
            executor_id = COALESCE($4, executor_id),
            executed_at = COALESCE($5, executed_at),
            metadata = COALESCE($6, metadata)
        WHERE id = $1 AND testcase_id = $2
        RETURNING *
        "#,
    )
    .bind(run_id)
    .bind(testcase_id)
    .bind(body.result.map(|r| r.as_str()))
    .bind(body.executor_id)
    .bind(body.executed_at)
    .bind(&body.metadata)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Test run not found in this workspace"))?;

    Ok(ApiResponse::success(run))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testcase_defaults() {
        let body: CreateTestCase = serde_json::from_value(json!({
            "name": "Leak check",
            "expected_results": "No pressure drop over 10 minutes"
        }))
        .unwrap();
        assert_eq!(body.test_method, TestMethod::Manual);
        assert_eq!(body.execution_mode, ExecutionMode::Interactive);
    }

    #[test]
    fn run_result_is_validated() {
        assert!(serde_json::from_value::<CreateTestRun>(json!({ "result": "passed" })).is_ok());
        assert!(serde_json::from_value::<CreateTestRun>(json!({ "result": "flaky" })).is_err());

        let run: CreateTestRun =
            serde_json::from_value(json!({ "result": "failed", "executed_at": "2024-05-01T10:00:00Z" })).unwrap();
        assert!(run.executed_at.is_some());
    }
}
