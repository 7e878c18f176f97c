mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    for path in ["/health", "/api/health"] {
        let res = client.get(server.url(path)).send().await?;
        let status = res.status();
        let body: Value = res.json().await?;

        if common::database_configured() {
            assert_eq!(status, StatusCode::OK, "{}", path);
            assert_eq!(body["data"]["database"], json!("ok"));
        } else {
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", path);
            assert_eq!(body["success"], json!(false));
        }
    }
    Ok(())
}

#[tokio::test]
async fn root_lists_service_info() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(server.url("/")).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["name"], json!("Nema Core API"));
    assert!(body["meta"]["timestamp"].is_string());
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_404() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(server.url("/api/v2/nothing")).await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}
