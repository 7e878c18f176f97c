mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn login_me_refresh_logout() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": "editor", "password": "editor" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let login: Value = res.json().await?;
    assert_eq!(login["data"]["token_type"], json!("bearer"));
    let access = login["data"]["access_token"].as_str().unwrap().to_string();
    let refresh = login["data"]["refresh_token"].as_str().unwrap().to_string();

    let res = client.get(server.url("/api/auth/me")).bearer_auth(&access).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await?;
    assert_eq!(me["data"]["username"], json!("editor"));
    assert_eq!(me["data"]["is_editor"], json!(true));
    assert_eq!(me["data"]["is_admin"], json!(false));

    let res = client
        .post(server.url("/api/auth/refresh"))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let refreshed: Value = res.json().await?;
    assert!(refreshed["data"]["access_token"].is_string());

    let res = client.post(server.url("/api/auth/logout")).bearer_auth(&access).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn refresh_token_is_not_an_access_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let login: Value = client
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": "viewer", "password": "viewer" }))
        .send()
        .await?
        .json()
        .await?;
    let refresh = login["data"]["refresh_token"].as_str().unwrap();

    let res = client.get(server.url("/api/auth/me")).bearer_auth(refresh).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::Client::new()
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": "admin", "password": "wrong" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["success"], json!(false));
    Ok(())
}

#[tokio::test]
async fn v1_routes_require_bearer_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    for path in ["/api/v1/workspaces", "/api/v1/workspaces/1/requirements", "/api/v1/workspaces/1/assets"] {
        let res = client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", path);
    }

    let res = client
        .get(server.url("/api/v1/workspaces"))
        .header("authorization", "Token abc")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn dev_users_listed_in_mock_mode() -> Result<()> {
    let server = common::ensure_server().await?;
    let body: Value = reqwest::get(server.url("/api/auth/dev/users")).await?.json().await?;
    let users = body["data"]["users"].as_array().unwrap();
    assert!(users.iter().any(|u| u["username"] == json!("admin")));
    assert!(users.iter().all(|u| u.get("password").is_none()));
    Ok(())
}
