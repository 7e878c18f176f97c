// routes.rs - router assembly: public, auth, organization and workspace-scoped groups

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::config;
use crate::handlers::{self, v1};
use crate::middleware::{require_auth, resolve_identity, validate_workspace};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health))
        .route("/api/health", get(handlers::root::health))
        .nest("/api/auth", auth_routes(state.clone()))
        .nest("/api/v1", v1_routes(state.clone()))
        // Global middleware
        .layer(DefaultBodyLimit::max(config().api.max_request_size_bytes))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_routes(state: AppState) -> Router<AppState> {
    use handlers::auth;

    let protected = Router::new()
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/health", get(auth::auth_health))
        .route("/dev/users", get(auth::dev_users))
        .merge(protected)
}

fn v1_routes(state: AppState) -> Router<AppState> {
    use v1::workspaces;

    Router::new()
        .route("/organizations/debug", get(handlers::organizations::debug_list))
        .route("/workspaces", get(workspaces::list).post(workspaces::create))
        .route(
            "/workspaces/:workspace_id",
            get(workspaces::get).put(workspaces::update).delete(workspaces::delete),
        )
        .nest("/workspaces/:workspace_id", workspace_routes(state.clone()))
        // Layers run bottom-up: authenticate, then sync identity
        .route_layer(middleware::from_fn_with_state(state.clone(), resolve_identity))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

/// Everything under `/api/v1/workspaces/:workspace_id`, behind the workspace access check
fn workspace_routes(state: AppState) -> Router<AppState> {
    use v1::{assets, groups, modules, parameters, products, releases, req_collections, requirements, tags, testcases};

    let upload_limit = config().uploads.max_file_size_bytes;

    Router::new()
        .route("/products", get(products::list).post(products::create))
        .route(
            "/products/:product_id",
            get(products::get).put(products::update).delete(products::delete),
        )
        .route("/products/:product_id/deletion-preview", get(products::deletion_preview))
        .route("/modules", get(modules::list).post(modules::create))
        .route(
            "/modules/:module_id",
            get(modules::get).put(modules::update).delete(modules::delete),
        )
        .route("/req-collections", get(req_collections::list).post(req_collections::create))
        .route(
            "/req-collections/:collection_id",
            get(req_collections::get)
                .put(req_collections::update)
                .delete(req_collections::delete),
        )
        .route("/requirements", get(requirements::list).post(requirements::create))
        .route(
            "/requirements/:req_id",
            get(requirements::get).put(requirements::update).delete(requirements::delete),
        )
        .route(
            "/requirements/:req_id/versions",
            get(requirements::list_versions).post(requirements::create_version),
        )
        .route(
            "/requirements/:req_id/tags/:tag_id",
            post(requirements::add_tag).delete(requirements::remove_tag),
        )
        .route("/parameters", get(parameters::list).post(parameters::create))
        .route(
            "/parameters/:param_id",
            get(parameters::get).put(parameters::update).delete(parameters::delete),
        )
        .route("/parameters/:param_id/versions", post(parameters::create_version))
        .route("/testcases", get(testcases::list).post(testcases::create))
        .route(
            "/testcases/:testcase_id",
            get(testcases::get).put(testcases::update).delete(testcases::delete),
        )
        .route(
            "/testcases/:testcase_id/runs",
            get(testcases::list_runs).post(testcases::create_run),
        )
        .route("/testcases/:testcase_id/runs/:run_id", put(testcases::update_run))
        .route("/releases", get(releases::list).post(releases::create))
        .route(
            "/releases/:release_id",
            get(releases::get).put(releases::update).delete(releases::delete),
        )
        .route("/releases/:release_id/publish", post(releases::publish))
        .route("/tags", get(tags::list).post(tags::create))
        .route("/tags/:tag_id", get(tags::get).put(tags::update).delete(tags::delete))
        .route("/groups", get(groups::list).post(groups::create))
        .route(
            "/groups/:group_id",
            get(groups::get).put(groups::update).delete(groups::delete),
        )
        .route(
            "/assets",
            get(assets::list)
                .post(assets::upload)
                // Multipart framing on top of the largest accepted file
                .layer(DefaultBodyLimit::max(upload_limit + 64 * 1024)),
        )
        .route(
            "/assets/:asset_id",
            get(assets::get).put(assets::update).delete(assets::delete),
        )
        .route("/assets/:asset_id/download", get(assets::download))
        .route_layer(middleware::from_fn_with_state(state, validate_workspace))
}

fn cors_layer() -> CorsLayer {
    let origins: Vec<HeaderValue> = config()
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() || config().security.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins).allow_credentials(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::auth::MockAuthClient;
    use crate::database::DatabaseManager;

    fn test_app() -> Router {
        let pool = DatabaseManager::disconnected_pool().unwrap();
        let auth = Arc::new(MockAuthClient::from_config(crate::config::config()));
        app(AppState::new(pool, auth))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &Router, username: &str) -> Value {
        let request = Request::post("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "username": username, "password": username }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn root_describes_service() {
        let response = test_app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["name"], json!("Nema Core API"));
        assert!(body["meta"]["requestId"].as_str().unwrap().starts_with("req_"));
    }

    #[tokio::test]
    async fn v1_requires_token() {
        let app = test_app();
        for path in ["/api/v1/workspaces", "/api/v1/workspaces/1/products", "/api/v1/organizations/debug"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", path);
            let body = body_json(response).await;
            assert_eq!(body["success"], json!(false));
            assert_eq!(body["error"]["code"], json!("UNAUTHORIZED"));
        }
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let request = Request::get("/api/auth/me")
            .header("authorization", "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mock_login_then_me() {
        let app = test_app();
        let login = login(&app, "admin").await;
        assert_eq!(login["data"]["token_type"], json!("bearer"));
        assert_eq!(login["data"]["user"]["username"], json!("admin"));

        let token = login["data"]["access_token"].as_str().unwrap();
        let request = Request::get("/api/auth/me")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["data"]["username"], json!("admin"));
        assert_eq!(me["data"]["is_admin"], json!(true));
        assert_eq!(me["data"]["is_editor"], json!(true));
    }

    #[tokio::test]
    async fn refresh_issues_new_tokens() {
        let app = test_app();
        let login = login(&app, "editor").await;
        let refresh_token = login["data"]["refresh_token"].as_str().unwrap();

        let request = Request::post("/api/auth/refresh")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "refresh_token": refresh_token }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["user"]["username"], json!("editor"));
    }

    #[tokio::test]
    async fn wrong_password_is_401() {
        let request = Request::post("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "username": "admin", "password": "nope" }).to_string()))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_login_field_is_validation_error() {
        let request = Request::post("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "username": "admin" }).to_string()))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn auth_health_and_dev_users() {
        let app = test_app();
        let response = app
            .clone()
            .oneshot(Request::get("/api/auth/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["auth_provider"], json!("mock"));
        assert_eq!(body["data"]["mock_auth"], json!(true));

        let response = app
            .oneshot(Request::get("/api/auth/dev/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["users"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn health_without_database_is_503() {
        let response = test_app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!("SERVICE_UNAVAILABLE"));
    }
}
