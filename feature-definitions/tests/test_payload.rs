use anyhow::Result;
use assert_json_diff::{assert_json_eq, assert_json_include};
use reqwest::StatusCode;
use serde_json::{json, Value};

use feature_definitions::config::DEFAULT_TEST_CONFIG;
use feature_definitions::encryption::PayloadEncryptor;
use feature_definitions::store::{InMemoryFeatureStore, SeedData};

use crate::common::*;

pub mod common;

fn seed(features: Value, connections: Value) -> InMemoryFeatureStore {
    let seed: SeedData = serde_json::from_value(json!({
        "organizations": [{
            "id": "org_1",
            "environments": [
                {"id": "production"},
                {"id": "staging", "projects": ["prj_a"]}
            ],
            "projects": [{"id": "prj_a"}, {"id": "prj_b"}]
        }],
        "sdkConnections": connections,
        "features": features,
    }))
    .expect("valid seed data");
    InMemoryFeatureStore::from_seed(seed)
}

fn stored_feature(id: &str, project: Option<&str>, environments: Value) -> Value {
    let mut feature = json!({
        "id": id,
        "organization": "org_1",
        "valueType": "boolean",
        "defaultValue": "true",
        "environmentSettings": environments,
        "dateCreated": "2024-01-01T00:00:00Z",
        "dateUpdated": "2024-03-01T12:00:00Z",
    });
    if let Some(project) = project {
        feature["project"] = json!(project);
    }
    feature
}

#[tokio::test]
async fn it_serves_the_compiled_payload() -> Result<()> {
    let store = seed(
        json!([
            {
                "id": "show-banner",
                "organization": "org_1",
                "valueType": "boolean",
                "defaultValue": "true",
                "environmentSettings": {
                    "production": {
                        "enabled": true,
                        "rules": [{
                            "id": "fr_1",
                            "type": "rollout",
                            "enabled": true,
                            "value": "false",
                            "coverage": 1.5,
                            "hashAttribute": "id"
                        }]
                    }
                },
                "dateCreated": "2024-01-01T00:00:00Z",
                "dateUpdated": "2024-02-01T00:00:00Z"
            },
            stored_feature("off-in-prod", None, json!({"production": {"enabled": false}}))
        ]),
        json!([{"key": "sdk-prod", "organization": "org_1"}]),
    );
    let server = ServerHandle::for_store(store).await;

    let res = server.get_payload("sdk-prod").await;
    assert_eq!(StatusCode::OK, res.status());

    let json_data = res.json::<Value>().await?;
    assert_json_eq!(
        json_data,
        json!({
            "status": 200,
            "features": {
                "show-banner": {
                    "defaultValue": true,
                    "rules": [{"force": false, "coverage": 1.0, "hashAttribute": "id"}]
                }
            },
            "dateUpdated": "2024-02-01T00:00:00Z"
        })
    );

    Ok(())
}

#[tokio::test]
async fn it_recovers_from_malformed_stored_documents() -> Result<()> {
    let mut config = stored_feature("config", None, json!({}));
    config["valueType"] = json!("json");
    config["defaultValue"] = json!("{oops");
    config["environmentSettings"] = json!({
        "production": {
            "enabled": true,
            "rules": [
                {
                    "type": "force",
                    "enabled": true,
                    "condition": "{\"country\": ",
                    "value": "{\"a\": 1}"
                },
                {
                    "type": "experiment",
                    "enabled": true,
                    "values": [{"value": "[1]", "weight": 0.5}, {"value": "nope", "weight": 0.5}],
                    "coverage": 1.0,
                    "namespace": {"enabled": true, "name": "ns", "range": [null, "0.5"]}
                },
                {
                    "type": "experiment",
                    "enabled": true,
                    "values": [{"value": "{}", "weight": 1.0}],
                    "coverage": 1.0,
                    "namespace": {"enabled": true, "name": "ns", "range": ["0.1"]}
                },
                {"type": "schedule", "enabled": true, "value": "true"}
            ]
        }
    });

    let mut limit = stored_feature("limit", None, json!({"production": {"enabled": true}}));
    limit["valueType"] = json!("number");
    limit["defaultValue"] = json!("12px");

    let store = seed(
        json!([config, limit]),
        json!([{"key": "sdk-prod", "organization": "org_1"}]),
    );
    let server = ServerHandle::for_store(store).await;

    let res = server.get_payload("sdk-prod").await;
    assert_eq!(StatusCode::OK, res.status());
    assert_json_eq!(
        res.json::<Value>().await?["features"],
        json!({
            "config": {
                "defaultValue": null,
                "rules": [
                    {"force": {"a": 1}},
                    {
                        "variations": [[1], null],
                        "coverage": 1.0,
                        "weights": [0.5, 0.5],
                        "namespace": ["ns", 0.0, 0.5]
                    },
                    {
                        "variations": [{}],
                        "coverage": 1.0,
                        "weights": [1.0],
                        "namespace": ["ns", 0.1, 0.0]
                    }
                ]
            },
            "limit": {"defaultValue": 12}
        })
    );

    Ok(())
}

#[tokio::test]
async fn it_accepts_the_key_as_query_param_or_bearer() -> Result<()> {
    let store = seed(
        json!([stored_feature("flag", None, json!({"production": {"enabled": true}}))]),
        json!([{"key": "sdk-prod", "organization": "org_1"}]),
    );
    let server = ServerHandle::for_store(store).await;

    let res = server.get("/api/features?api_key=sdk-prod").await;
    assert_eq!(StatusCode::OK, res.status());
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({"features": {"flag": {"defaultValue": true}}})
    );

    let res = reqwest::Client::new()
        .get(format!("http://{:?}/api/features", server.addr))
        .bearer_auth("sdk-prod")
        .send()
        .await?;
    assert_eq!(StatusCode::OK, res.status());

    Ok(())
}

#[tokio::test]
async fn it_rejects_missing_and_unknown_keys() -> Result<()> {
    let server = ServerHandle::for_store(seed(json!([]), json!([]))).await;

    let res = server.get("/api/features").await;
    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    assert_json_eq!(
        res.json::<Value>().await?,
        json!({"status": 400, "message": "Missing API key in request"})
    );

    let res = server.get_payload("sdk-unknown").await;
    assert_eq!(StatusCode::UNAUTHORIZED, res.status());

    Ok(())
}

#[tokio::test]
async fn it_rejects_environments_the_organization_lacks() -> Result<()> {
    let store = seed(
        json!([]),
        json!([{"key": "sdk-dev", "organization": "org_1", "environment": "dev"}]),
    );
    let server = ServerHandle::for_store(store).await;

    let res = server.get_payload("sdk-dev").await;
    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({"message": "Unknown environment: dev"})
    );

    Ok(())
}

#[tokio::test]
async fn it_scopes_payloads_by_project() -> Result<()> {
    let enabled_everywhere = json!({
        "production": {"enabled": true},
        "staging": {"enabled": true}
    });
    let store = seed(
        json!([
            stored_feature("a", Some("prj_a"), enabled_everywhere.clone()),
            stored_feature("b", Some("prj_b"), enabled_everywhere.clone()),
            stored_feature("global", None, enabled_everywhere),
        ]),
        json!([
            {"key": "sdk-prod", "organization": "org_1"},
            {"key": "sdk-prod-b", "organization": "org_1", "projects": ["prj_b"]},
            {"key": "sdk-staging", "organization": "org_1", "environment": "staging"}
        ]),
    );
    let server = ServerHandle::for_store(store).await;

    let ids = |payload: &Value| -> Vec<String> {
        payload["features"]
            .as_object()
            .map(|features| features.keys().cloned().collect())
            .unwrap_or_default()
    };

    let all = server.get_payload("sdk-prod").await.json::<Value>().await?;
    assert_eq!(ids(&all), vec!["a", "b", "global"]);

    let only_b = server.get_payload("sdk-prod-b").await.json::<Value>().await?;
    assert_eq!(ids(&only_b), vec!["b"]);

    let by_query = server
        .get("/api/features/sdk-prod?project=prj_a")
        .await
        .json::<Value>()
        .await?;
    assert_eq!(ids(&by_query), vec!["a"]);

    // staging is restricted to prj_a
    let staging = server.get_payload("sdk-staging").await.json::<Value>().await?;
    assert_eq!(ids(&staging), vec!["a"]);

    Ok(())
}

#[tokio::test]
async fn it_sees_every_project_when_not_strict() -> Result<()> {
    let store = seed(
        json!([
            stored_feature("a", Some("prj_a"), json!({"staging": {"enabled": true}})),
            stored_feature("b", Some("prj_b"), json!({"staging": {"enabled": true}})),
        ]),
        json!([{"key": "sdk-staging", "organization": "org_1", "environment": "staging"}]),
    );
    let mut config = DEFAULT_TEST_CONFIG.clone();
    config.strict_environment_projects = "false".parse().unwrap();
    let server = ServerHandle::for_config(config, store).await;

    let payload = server.get_payload("sdk-staging").await.json::<Value>().await?;
    assert_json_include!(
        actual: payload,
        expected: json!({"features": {"a": {}, "b": {}}})
    );

    Ok(())
}

#[tokio::test]
async fn it_encrypts_payloads_for_encrypted_connections() -> Result<()> {
    let key = PayloadEncryptor::generate_base64_key();
    let store = seed(
        json!([stored_feature("flag", None, json!({"production": {"enabled": true}}))]),
        json!([{
            "key": "sdk-secret",
            "organization": "org_1",
            "encryptPayload": true,
            "encryptionKey": key
        }]),
    );
    let server = ServerHandle::for_store(store).await;

    let res = server.get_payload("sdk-secret").await;
    assert_eq!(StatusCode::OK, res.status());
    let payload = res.json::<Value>().await?;
    assert_json_eq!(payload["features"], json!({}));
    assert_eq!(payload["dateUpdated"], json!("2024-03-01T12:00:00Z"));

    let envelope = payload["encryptedFeatures"].as_str().unwrap();
    let decrypted = PayloadEncryptor::from_base64_key(&key)?.decrypt(envelope)?;
    assert_json_eq!(
        serde_json::from_str::<Value>(&decrypted)?,
        json!({"flag": {"defaultValue": true}})
    );

    Ok(())
}
