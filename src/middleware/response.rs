use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// `meta` block attached to every envelope
pub fn response_meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "requestId": format!("req_{}", Uuid::new_v4().simple()),
    })
}

/// Wrapper for API responses that automatically adds success envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: Option<StatusCode>,
    pub extra_meta: Map<String, Value>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: None,
            extra_meta: Map::new(),
        }
    }

    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            data,
            status_code: Some(status_code),
            extra_meta: Map::new(),
        }
    }

    pub fn created(data: T) -> Self {
        Self::with_status(data, StatusCode::CREATED)
    }

    /// Merge an additional key into the `meta` block
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra_meta.insert(key.to_string(), value.into());
        self
    }
}

impl ApiResponse<()> {
    /// 204 No Content; the envelope is omitted
    pub fn no_content() -> Self {
        Self::with_status((), StatusCode::NO_CONTENT)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }

        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return crate::error::ApiError::internal_server_error("Failed to serialize response data")
                    .into_response();
            }
        };

        let mut meta = response_meta();
        if let Value::Object(map) = &mut meta {
            map.extend(self.extra_meta);
        }

        let envelope = json!({
            "success": true,
            "data": data_value,
            "meta": meta,
        });

        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

/// List payload: `{ items, pagination }`
#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T: Serialize> Page<T> {
    pub fn new(items: Vec<T>, page: i64, limit: i64, total: i64) -> Self {
        Self {
            items,
            pagination: Pagination::new(page, limit, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let p = Pagination::new(1, 20, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);

        let p = Pagination::new(2, 20, 41);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(p.has_prev);

        let p = Pagination::new(3, 20, 41);
        assert!(!p.has_next);
    }

    #[test]
    fn pagination_serializes_camel_case() {
        let value = serde_json::to_value(Pagination::new(1, 10, 25)).unwrap();
        assert_eq!(value["totalPages"], json!(3));
        assert_eq!(value["hasNext"], json!(true));
        assert_eq!(value["hasPrev"], json!(false));
    }

    #[test]
    fn meta_has_request_id() {
        let meta = response_meta();
        let id = meta["requestId"].as_str().unwrap();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 4 + 32);
        assert!(meta["timestamp"].is_string());
    }

    #[tokio::test]
    async fn extra_meta_is_merged() {
        let response = ApiResponse::created(json!({"id": 1}))
            .with_meta("default_module_created", true)
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["meta"]["default_module_created"], json!(true));
        assert!(body["meta"]["requestId"].is_string());
    }

    #[test]
    fn no_content_has_empty_body() {
        let response = ApiResponse::no_content().into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
