//! End-to-end flows against Postgres. Skipped unless DATABASE_URL is set.

mod common;

use anyhow::Result;
use common::{unique, ApiClient};
use reqwest::StatusCode;
use serde_json::{json, Value};

macro_rules! require_database {
    () => {
        if !common::database_configured() {
            eprintln!("DATABASE_URL not set; skipping");
            return Ok(());
        }
    };
}

async fn create_workspace(api: &ApiClient) -> Result<i64> {
    let (status, body) = api
        .post("/api/v1/workspaces", json!({ "name": unique("Workspace"), "description": "integration" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    Ok(body["data"]["id"].as_i64().unwrap())
}

#[tokio::test]
async fn product_creation_builds_default_module() -> Result<()> {
    require_database!();
    let server = common::ensure_server().await?;
    let api = ApiClient::login(server, "admin").await?;
    let ws = create_workspace(&api).await?;

    let (status, body) = api
        .post(&format!("/api/v1/workspaces/{}/products", ws), json!({ "name": "Rover" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["meta"]["default_module_created"], json!(true));
    let product_id = body["data"]["product"]["id"].as_i64().unwrap();
    assert!(body["data"]["product"]["public_id"].as_str().unwrap().starts_with("PROD-"));
    assert_eq!(body["data"]["default_module"]["name"], json!("Rover Base Module"));
    assert_eq!(body["data"]["req_collection"]["name"], json!("Rover Requirements"));

    // Same name in the same workspace conflicts
    let (status, _) = api
        .post(&format!("/api/v1/workspaces/{}/products", ws), json!({ "name": "Rover" }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, preview) = api
        .get(&format!("/api/v1/workspaces/{}/products/{}/deletion-preview", ws, product_id))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["data"]["modules_to_delete"].as_array().unwrap().len(), 1);

    let (status, _) = api.delete(&format!("/api/v1/workspaces/{}/products/{}", ws, product_id)).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, modules) = api.get(&format!("/api/v1/workspaces/{}/modules", ws)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(modules["data"]["pagination"]["total"], json!(0));
    Ok(())
}

#[tokio::test]
async fn requirement_versions_share_public_id() -> Result<()> {
    require_database!();
    let server = common::ensure_server().await?;
    let api = ApiClient::login(server, "admin").await?;
    let ws = create_workspace(&api).await?;

    let (_, collection) = api
        .post(&format!("/api/v1/workspaces/{}/req-collections", ws), json!({ "name": "System" }))
        .await?;
    let collection_id = collection["data"]["id"].as_i64().unwrap();

    let (status, created) = api
        .post(
            &format!("/api/v1/workspaces/{}/requirements", ws),
            json!({
                "req_collection_id": collection_id,
                "name": "Braking",
                "definition": "The rover shall stop within 2 m.",
                "level": "L1"
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let req_id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["status"], json!("draft"));
    assert_eq!(created["data"]["version_number"], json!(1));

    let (status, v2) = api
        .post(
            &format!("/api/v1/workspaces/{}/requirements/{}/versions", ws, req_id),
            json!({ "definition": "The rover shall stop within 1.5 m." }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", v2);
    assert_eq!(v2["data"]["version_number"], json!(2));
    assert_eq!(v2["data"]["public_id"], created["data"]["public_id"]);
    assert_eq!(v2["data"]["prev_version"], json!(req_id));

    let (_, versions) = api
        .get(&format!("/api/v1/workspaces/{}/requirements/{}/versions", ws, req_id))
        .await?;
    let numbers: Vec<i64> = versions["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2]);

    // Bad enum in a filter is a validation error, not an empty page
    let (status, _) = api
        .get(&format!("/api/v1/workspaces/{}/requirements?status=shipped", ws))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn tags_attach_and_filter_requirements() -> Result<()> {
    require_database!();
    let server = common::ensure_server().await?;
    let api = ApiClient::login(server, "admin").await?;
    let ws = create_workspace(&api).await?;

    let (_, collection) = api
        .post(&format!("/api/v1/workspaces/{}/req-collections", ws), json!({ "name": "Tagged" }))
        .await?;
    let collection_id = collection["data"]["id"].as_i64().unwrap();

    let mut ids = Vec::new();
    for name in ["Alpha", "Beta"] {
        let (_, created) = api
            .post(
                &format!("/api/v1/workspaces/{}/requirements", ws),
                json!({ "req_collection_id": collection_id, "name": name, "definition": name, "level": "L2" }),
            )
            .await?;
        ids.push(created["data"]["id"].as_i64().unwrap());
    }

    let (status, tag) = api
        .post(&format!("/api/v1/workspaces/{}/tags", ws), json!({ "name": "safety", "color": "f80" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["data"]["color"], json!("#F80"));
    let tag_id = tag["data"]["id"].as_i64().unwrap();

    let (status, _) = api
        .post(&format!("/api/v1/workspaces/{}/requirements/{}/tags/{}", ws, ids[0], tag_id), Value::Null)
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (_, page) = api
        .get(&format!("/api/v1/workspaces/{}/requirements?tag_id={}", ws, tag_id))
        .await?;
    let items = page["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], json!(ids[0]));

    let (_, detail) = api.get(&format!("/api/v1/workspaces/{}/requirements/{}", ws, ids[0])).await?;
    assert_eq!(detail["data"]["tags"][0]["name"], json!("safety"));

    let (status, _) = api
        .delete(&format!("/api/v1/workspaces/{}/requirements/{}/tags/{}", ws, ids[1], tag_id))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn published_release_is_frozen() -> Result<()> {
    require_database!();
    let server = common::ensure_server().await?;
    let api = ApiClient::login(server, "admin").await?;
    let ws = create_workspace(&api).await?;

    let (_, product) = api
        .post(&format!("/api/v1/workspaces/{}/products", ws), json!({ "name": "Lander" }))
        .await?;
    let module_id = product["data"]["default_module"]["id"].as_i64().unwrap();

    let (status, release) = api
        .post(
            &format!("/api/v1/workspaces/{}/releases", ws),
            json!({ "module_id": module_id, "name": "First", "version": "1.0.0" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", release);
    assert_eq!(release["data"]["draft"], json!(true));
    let release_id = release["data"]["id"].as_i64().unwrap();

    let (status, published) = api
        .post(&format!("/api/v1/workspaces/{}/releases/{}/publish", ws, release_id), json!({}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["data"]["draft"], json!(false));
    assert!(published["data"]["release_date"].is_string());

    let (status, _) = api
        .put(&format!("/api/v1/workspaces/{}/releases/{}", ws, release_id), json!({ "name": "Renamed" }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .post(
            &format!("/api/v1/workspaces/{}/releases", ws),
            json!({ "module_id": module_id, "name": "Again", "version": "1.0.0" }),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn other_organization_cannot_see_workspace() -> Result<()> {
    require_database!();
    let server = common::ensure_server().await?;
    let admin = ApiClient::login(server, "admin").await?;
    let ws = create_workspace(&admin).await?;

    // The mock "demo" user belongs to a different tenant
    let outsider = ApiClient::login(server, "demo").await?;
    let (status, _) = outsider.get(&format!("/api/v1/workspaces/{}/products", ws)).await?;
    assert!(
        status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND,
        "unexpected status {}",
        status
    );
    Ok(())
}

async fn create_module(api: &ApiClient, ws: i64, name: &str, shared: bool) -> Result<i64> {
    let (status, body) = api
        .post(
            &format!("/api/v1/workspaces/{}/modules", ws),
            json!({ "name": name, "shared": shared, "create_new_req_collection": true }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    Ok(body["data"]["id"].as_i64().unwrap())
}

fn linked_module_ids(details: &Value) -> Vec<i64> {
    let mut ids: Vec<i64> = details["data"]["modules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn only_shared_workspace_modules_are_linked_and_survive_delete() -> Result<()> {
    require_database!();
    let server = common::ensure_server().await?;
    let api = ApiClient::login(server, "admin").await?;
    let ws = create_workspace(&api).await?;
    let other_ws = create_workspace(&api).await?;

    let shared = create_module(&api, ws, "Telemetry", true).await?;
    let private = create_module(&api, ws, "Private", false).await?;
    let foreign = create_module(&api, other_ws, "Foreign", true).await?;

    let (status, created) = api
        .post(
            &format!("/api/v1/workspaces/{}/products", ws),
            json!({ "name": "Lander", "selected_module_ids": [shared, private, foreign] }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let product_id = created["data"]["product"]["id"].as_i64().unwrap();
    let default_module = created["data"]["default_module"]["id"].as_i64().unwrap();

    let (_, details) = api
        .get(&format!("/api/v1/workspaces/{}/products/{}?include_details=true", ws, product_id))
        .await?;
    assert_eq!(linked_module_ids(&details), vec![shared]);
    assert_eq!(details["data"]["default_module"]["id"], json!(default_module));

    let (_, preview) = api
        .get(&format!("/api/v1/workspaces/{}/products/{}/deletion-preview", ws, product_id))
        .await?;
    let unlink: Vec<i64> = preview["data"]["modules_to_unlink"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(unlink, vec![shared]);

    let (status, _) = api.delete(&format!("/api/v1/workspaces/{}/products/{}", ws, product_id)).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = api.get(&format!("/api/v1/workspaces/{}/modules/{}", ws, default_module)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    for module_id in [shared, private] {
        let (status, _) = api.get(&format!("/api/v1/workspaces/{}/modules/{}", ws, module_id)).await?;
        assert_eq!(status, StatusCode::OK, "module {} should survive", module_id);
    }
    Ok(())
}

#[tokio::test]
async fn update_replaces_linked_modules() -> Result<()> {
    require_database!();
    let server = common::ensure_server().await?;
    let api = ApiClient::login(server, "admin").await?;
    let ws = create_workspace(&api).await?;

    let first = create_module(&api, ws, "Power", true).await?;
    let second = create_module(&api, ws, "Thermal", true).await?;

    let (_, created) = api
        .post(
            &format!("/api/v1/workspaces/{}/products", ws),
            json!({ "name": "Orbiter", "selected_module_ids": [first] }),
        )
        .await?;
    let product_id = created["data"]["product"]["id"].as_i64().unwrap();
    let default_module = created["data"]["default_module"]["id"].as_i64().unwrap();

    let (status, updated) = api
        .put(
            &format!("/api/v1/workspaces/{}/products/{}", ws, product_id),
            json!({ "selected_module_ids": [second, default_module] }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    // The default module is never a linked module
    assert_eq!(linked_module_ids(&updated), vec![second]);

    // Without selected_module_ids the links stay as they are
    let (_, renamed) = api
        .put(&format!("/api/v1/workspaces/{}/products/{}", ws, product_id), json!({ "name": "Orbiter II" }))
        .await?;
    assert_eq!(renamed["data"]["name"], json!("Orbiter II"));
    assert_eq!(linked_module_ids(&renamed), vec![second]);
    Ok(())
}
