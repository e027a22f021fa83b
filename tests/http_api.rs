//! API-level tests: the router is exercised with in-process requests over
//! an in-memory search backend seeded through the real indexer.

use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use sanscreen::{
    build_client, AppState, AuditLog, Catalog, Dataset, FetchSettings, IndexNaming, Indexer,
    IngestConfig, MemoryProvider, SearchProvider, Settings,
};

fn seed_entities() -> Vec<Value> {
    vec![
        json!({
            "id": "Q7747",
            "schema": "Person",
            "properties": {
                "name": ["Vladimir Putin"],
                "birthDate": ["1952-10-07"],
                "citizenship": ["ru"],
                "gender": ["male"],
            },
            "datasets": ["eu_fsf"],
            "referents": ["gb-hmt-14196"],
            "target": true,
            "first_seen": "2021-01-01T00:00:00",
            "last_seen": "2024-01-01T00:00:00",
            "last_change": "2023-06-01T00:00:00",
        }),
        json!({
            "id": "ru-gazbank",
            "schema": "Company",
            "properties": {
                "name": ["Gazprom Bank OOO"],
                "country": ["ru"],
                "registrationNumber": ["7744001497"],
            },
            "datasets": ["eu_fsf"],
            "target": true,
        }),
        json!({
            "id": "p-smith",
            "schema": "Person",
            "properties": {"name": ["John Smith"], "citizenship": ["gb"]},
            "datasets": ["eu_fsf"],
        }),
        json!({
            "id": "sanction-q7747",
            "schema": "Sanction",
            "properties": {
                "entity": ["Q7747"],
                "authority": ["European Union"],
                "program": ["EU restrictive measures"],
                "startDate": ["2022-02-25"],
            },
            "datasets": ["eu_fsf"],
        }),
    ]
}

async fn test_app() -> (Router, Arc<AppState>) {
    let provider = Arc::new(MemoryProvider::new());
    let shared: Arc<dyn SearchProvider> = provider.clone();
    let naming = IndexNaming::new("sanscreen", "001").unwrap();
    let audit = AuditLog::new(shared.clone(), naming.audit_index(), naming.alias(), "000100");
    let client = build_client(&FetchSettings::default()).unwrap();
    let indexer = Indexer::new(
        shared.clone(),
        naming.clone(),
        audit,
        client.clone(),
        IngestConfig::default(),
    );

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("entities.ftm.json");
    let mut file = std::fs::File::create(&path).unwrap();
    for entity in seed_entities() {
        writeln!(file, "{entity}").unwrap();
    }
    drop(file);

    let mut dataset = Dataset::new("default");
    dataset.title = Some("Consolidated test list".to_string());
    dataset.version = Some("20240101000000".to_string());
    dataset.entities_url = Some(path.to_string_lossy().to_string());
    dataset.children = vec!["eu_fsf".to_string()];
    assert!(indexer.update_dataset(&dataset, false).await.unwrap());

    let mut catalog = Catalog::default();
    catalog.insert(dataset);

    let settings = Settings {
        update_token: "sesame".to_string(),
        auto_reindex: false,
        ..Settings::default()
    };
    let state = AppState::assemble(settings, shared, catalog, client);
    (sanscreen::build_router(state.clone()), state)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body, headers)
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn match_body() -> Value {
    json!({
        "queries": {
            "vv": {
                "schema": "Person",
                "properties": {
                    "name": ["Vladimir Putin"],
                    "birthDate": ["1952"],
                    "country": "Russia",
                }
            }
        }
    })
}

#[tokio::test]
async fn search_finds_the_target_first() {
    let (router, _) = test_app().await;
    let (status, body, headers) = get(&router, "/search/default?q=vladimir+putin").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-trace-id"));
    assert!(headers.contains_key("traceparent"));
    assert_eq!(body["results"][0]["id"], "Q7747");
    assert!(body["results"][0]["first_seen"].as_str().unwrap().starts_with("20"));
    assert!(body["total"]["value"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn search_filters_apply() {
    let (router, _) = test_app().await;

    let (status, body, _) =
        get(&router, "/search/default?q=vladimir+putin&exclude_dataset=eu_fsf").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"]["value"], 0);

    let (_, body, _) = get(&router, "/search/default?q=&schema=Company").await;
    assert_eq!(body["total"]["value"], 1);
    assert_eq!(body["results"][0]["id"], "ru-gazbank");

    let (_, body, _) = get(&router, "/search/default?q=&countries=gb").await;
    assert_eq!(body["results"][0]["id"], "p-smith");

    let (_, body, _) = get(&router, "/search/default?q=&target=true").await;
    let total = body["total"]["value"].as_u64().unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn suggest_completes_names() {
    let (router, _) = test_app().await;
    let (status, body, _) = get(&router, "/search/default/suggest?prefix=vladi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["id"], "Q7747");
    assert_eq!(body["results"][0]["name"], "Vladimir Putin");

    let (_, body, _) = get(&router, "/search/default/suggest?prefix=").await;
    assert_eq!(body["total"]["value"], 0);
}

#[tokio::test]
async fn search_facets_and_paging_errors() {
    let (router, _) = test_app().await;

    let (status, body, _) = get(&router, "/search/default?q=&facets=countries").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["facets"]["countries"]["values"].is_array());

    let (status, _, _) = get(&router, "/search/default?q=x&limit=501").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, _) = get(&router, "/search/default?q=x&offset=9500").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, _) = get(&router, "/search/nope?q=x").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body, _) = get(&router, "/search/default?q=x&schema=Wizard").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("schema"));
}

#[tokio::test]
async fn match_scores_the_example() {
    let (router, _) = test_app().await;
    let (status, body) = post(
        &router,
        "/match/default?algorithm=name-based&threshold=0.7",
        match_body(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = &body["responses"]["vv"];
    assert_eq!(response["results"][0]["id"], "Q7747");
    assert!(response["results"][0]["score"].as_f64().unwrap() > 0.70);
    assert_eq!(response["results"][0]["match"], true);
    // The query echo carries the normalized country code.
    assert_eq!(response["query"]["properties"]["country"][0], "ru");
    assert_eq!(body["matcher"]["name"], "name-based");
}

#[tokio::test]
async fn match_respects_threshold_and_cutoff() {
    let (router, _) = test_app().await;
    let (status, body) = post(
        &router,
        "/match/default?algorithm=name-based&threshold=0.99&cutoff=0.98",
        match_body(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    for result in body["responses"]["vv"]["results"].as_array().unwrap() {
        let score = result["score"].as_f64().unwrap();
        assert!(score > 0.98);
        assert_eq!(result["match"], score >= 0.99);
    }
}

#[tokio::test]
async fn match_excluded_ids_remove_referents_too() {
    let (router, _) = test_app().await;
    // gb-hmt-14196 is a referent of Q7747; excluding it must drop the
    // canonical record as well.
    let (status, body) = post(
        &router,
        "/match/default?algorithm=name-based&exclude_entity_ids=gb-hmt-14196",
        match_body(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["responses"]["vv"]["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn match_rejects_bad_requests() {
    let (router, _) = test_app().await;

    let (status, body) = post(&router, "/match/default?algorithm=neural-net", match_body()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("neural-net"));

    let (status, _) = post(&router, "/match/default", json!({"queries": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &router,
        "/match/default",
        json!({"queries": {"q1": {"schema": "Wizard", "properties": {}}}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&router, "/match/default?limit=100000", match_body()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = post(&router, "/match/nope", match_body()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn entity_fetch_nested_and_redirects() {
    let (router, _) = test_app().await;

    // A referent id redirects to the canonical entity.
    let (status, _, headers) = get(&router, "/entities/gb-hmt-14196").await;
    assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(headers.get("location").unwrap(), "/entities/Q7747");

    // The nested fetch folds the sanction in under its reverse property.
    let (status, body, _) = get(&router, "/entities/Q7747").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "Q7747");
    let sanctions = body["properties"]["sanctions"].as_array().unwrap();
    assert_eq!(sanctions[0]["id"], "sanction-q7747");
    assert_eq!(sanctions[0]["properties"]["program"][0], "EU restrictive measures");

    // Without nesting the properties stay plain.
    let (_, body, _) = get(&router, "/entities/Q7747?nested=false").await;
    assert!(body["properties"]["sanctions"].is_null());

    let (status, _, _) = get(&router, "/entities/who-is-this").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn adjacency_is_paginated_per_property() {
    let (router, _) = test_app().await;

    let (status, body, _) = get(&router, "/entities/Q7747/adjacent").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sanctions"]["total"]["value"], 1);
    assert_eq!(body["sanctions"]["results"][0]["id"], "sanction-q7747");

    let (status, body, _) = get(&router, "/entities/Q7747/adjacent/sanctions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["id"], "sanction-q7747");

    let (status, _, _) = get(&router, "/entities/Q7747/adjacent/unknownProp").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_admin_endpoints() {
    let (router, _) = test_app().await;

    let (status, body, _) = get(&router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, _) = get(&router, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = get(&router, "/catalog").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["datasets"][0]["name"], "default");

    let (status, body, _) = get(&router, "/algorithms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default"], "logic-v1");

    // The update trigger requires the shared token.
    let (status, _) = post(&router, "/updatez?token=wrong", json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = post(&router, "/updatez", json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn readyz_fails_without_an_aliased_index() {
    let provider = Arc::new(MemoryProvider::new());
    let shared: Arc<dyn SearchProvider> = provider;
    let client = build_client(&FetchSettings::default()).unwrap();
    let settings = Settings { auto_reindex: false, ..Settings::default() };
    let state = AppState::assemble(settings, shared, Catalog::default(), client);
    let router = sanscreen::build_router(state);

    let (status, body, _) = get(&router, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn trace_context_round_trips() {
    let (router, _) = test_app().await;
    let inbound = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("traceparent", inbound)
                .header("tracestate", "other=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let headers = response.headers();
    let outbound = headers.get("traceparent").unwrap().to_str().unwrap();
    assert!(outbound.starts_with("00-0af7651916cd43dd8448eb211c80319c-"));
    assert_ne!(outbound, inbound);
    let state = headers.get("tracestate").unwrap().to_str().unwrap();
    assert!(state.starts_with("sanscrn="));
    assert!(state.contains("other=abc"));
    assert_eq!(
        headers.get("x-trace-id").unwrap().to_str().unwrap(),
        "0af7651916cd43dd8448eb211c80319c"
    );
}
