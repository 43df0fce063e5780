use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::semantic::SemanticSearchService;
use crate::web;

use super::support::{
    flaky_encoder, gated_encoder, test_config, test_service, HASH_DIMENSIONS,
};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();

    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(app: &Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    send(app, request).await
}

fn hero_payload() -> Value {
    json!({
        "contents": [
            {"id": 1, "baslik": "X", "tur": "film", "aciklama": "a hero story", "yil": 2020},
            {"id": 2, "baslik": "Y", "tur": "kitap", "aciklama": "a hero story"},
            {"id": 3, "baslik": "Z", "tur": "film", "aciklama": "totally unrelated topic", "puan": 7.5}
        ]
    })
}

fn app_in(dir: &std::path::Path) -> Router {
    web::router(Arc::new(test_service(dir)))
}

#[tokio::test]
async fn test_health_before_index() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());

    let (status, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["index_size"], 0);
}

#[tokio::test]
async fn test_index_then_search() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());

    let (status, body) = post(&app, "/index", hero_payload()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["indexed_count"], 3);
    assert_eq!(body["dimension"], HASH_DIMENSIONS);
    assert_eq!(body["persisted"], true);

    let (status, body) = post(
        &app,
        "/search",
        json!({"query": "hero story", "limit": 2, "tur": "film"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "hero story");
    assert_eq!(body["total"], 2);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], 1);
    assert_eq!(results[0]["baslik"], "X");
    assert_eq!(results[0]["tur"], "film");
    assert_eq!(results[0]["yil"], 2020);
    assert_eq!(results[0]["neden"], "Film: related");
    assert!(results[0]["score"].as_f64().unwrap() > 0.5);
    assert_eq!(results[1]["id"], 3);
    assert_eq!(results[1]["puan"], 7.5);

    let (_, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["index_size"], 3);
}

#[tokio::test]
async fn test_recommend_with_english_category() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());
    post(&app, "/index", hero_payload()).await;

    let (status, body) = post(
        &app,
        "/recommend",
        json!({"query": "hero story", "category": "Book"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["results"][0]["id"], 2);
    assert_eq!(body["results"][0]["tur"], "kitap");
    assert_eq!(body["results"][0]["neden"], "Book: related");
}

#[tokio::test]
async fn test_default_limit() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());
    post(&app, "/index", hero_payload()).await;

    let (status, body) = post(&app, "/search", json!({"query": "anything"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn test_client_errors() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());

    let (status, body) = post(&app, "/search", json!({"query": "hero"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not been built"));

    let (status, _) = post(&app, "/index", json!({"contents": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    post(&app, "/index", hero_payload()).await;

    let (status, body) = post(&app, "/search", json!({"query": "hero", "tur": "music"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("music"));

    let (status, _) = post(&app, "/search", json!({"query": "hero", "limit": 0})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_encoder_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let (encoder, _) = flaky_encoder(usize::MAX);
    let service =
        SemanticSearchService::with_encoder(test_config(), dir.path().to_path_buf(), encoder);
    let app = web::router(Arc::new(service));

    let (status, body) = post(&app, "/index", hero_payload()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("model unavailable"));

    let (status, _) = post(&app, "/embed", json!({"text": "hero"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_embed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());

    let (status, body) = post(&app, "/embed", json!({"text": "hero story"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dimension"], HASH_DIMENSIONS);
    assert_eq!(body["embedding"].as_array().unwrap().len(), HASH_DIMENSIONS);
}

#[tokio::test]
async fn test_health_answers_while_model_loads() {
    let dir = tempfile::tempdir().unwrap();
    let (encoder, started, release) = gated_encoder();
    let service = Arc::new(SemanticSearchService::with_encoder(
        test_config(),
        dir.path().to_path_buf(),
        encoder,
    ));
    let app = web::router(service.clone());

    let loading = {
        let service = service.clone();
        std::thread::spawn(move || service.warm_up().is_ok())
    };
    started.recv().unwrap();

    let (status, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], false);

    release.send(()).unwrap();
    assert!(loading.join().unwrap());

    let (_, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(body["model_loaded"], true);
}

#[tokio::test]
async fn test_malformed_body_gets_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());

    let (status, body) = post(&app, "/search", json!({"limit": 5})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("query"));

    let (status, body) = post(&app, "/recommend", json!({"query": "x", "limit": -1})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let request = Request::post("/index")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
