// handlers/v1 - workspace-scoped resources under /api/v1

pub mod assets;
pub mod groups;
pub mod modules;
pub mod parameters;
pub mod products;
pub mod releases;
pub mod req_collections;
pub mod requirements;
pub mod tags;
pub mod testcases;
pub mod workspaces;

use serde_json::{Map, Value};

use crate::error::ApiError;

/// List conditions every workspace-owned table starts from
pub(crate) fn in_workspace(workspace_id: i64) -> Map<String, Value> {
    let mut conditions = Map::new();
    conditions.insert("workspace_id".to_string(), Value::from(workspace_id));
    conditions
}

/// Trimmed, non-empty value of a required text field
pub(crate) fn required_text<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::invalid_field(field, "is required"));
    }
    Ok(value)
}

/// Same as `required_text` for optional update fields
pub(crate) fn optional_text<'a>(field: &str, value: Option<&'a str>) -> Result<Option<&'a str>, ApiError> {
    value.map(|v| required_text(field, v)).transpose()
}

/// Unique violations become a 409 with a resource-specific message
pub(crate) fn unique_conflict(err: sqlx::Error, message: impl FnOnce() -> String) -> ApiError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => ApiError::conflict(message()),
        _ => ApiError::from(err),
    }
}

/// Parse an enum-valued query or body field
pub(crate) fn parse_enum<T>(field: &str, value: &str, parse: fn(&str) -> Option<T>) -> Result<T, ApiError> {
    parse(value).ok_or_else(|| ApiError::invalid_field(field, format!("unknown value '{}'", value)))
}
