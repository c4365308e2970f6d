mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use common::{sample_payload, template_url, timeouts, wait_until_gone, Script, ScriptedFactory};
use invoice_render_server::preview::PreviewRegistry;
use invoice_render_server::render::pipeline::PipelineOptions;
use invoice_render_server::render::{OutputDirectoryPrompt, RenderPipeline, SignalBus};
use invoice_render_server::{routes, AppState};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

fn app_state(script: Script, dir: &TempDir) -> web::Data<AppState> {
    let previews = PreviewRegistry::new("http://localhost:8080", Duration::from_secs(60));
    let pipeline = RenderPipeline::new(
        SignalBus::new(),
        Arc::new(ScriptedFactory::new(script)),
        Arc::new(OutputDirectoryPrompt::new(dir.path().join("out"))),
        Arc::new(previews.clone()),
        PipelineOptions {
            template: template_url(dir.path()),
            timeouts: timeouts(200),
            scratch_dir: dir.path().join("scratch"),
        },
    );
    web::Data::new(AppState::new(Arc::new(pipeline), previews))
}

fn render_body(mode: &str, destination: Option<&str>) -> Value {
    json!({
        "payload": sample_payload("Asha Verma"),
        "mode": mode,
        "destination": destination,
    })
}

#[actix_web::test]
async fn test_render_save_returns_saved_path() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(Script::Normal, &dir))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/invoices/render")
        .set_json(render_body("SAVE", Some("asha march")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["succeeded"], true);
    let path = PathBuf::from(body["path"].as_str().unwrap());
    assert_eq!(path, dir.path().join("out").join("asha march.pdf"));
    assert!(path.exists());
    assert!(body.get("error").is_none());
}

#[actix_web::test]
async fn test_render_save_without_destination_is_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(Script::Normal, &dir))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/invoices/render")
        .set_json(render_body("SAVE", None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["succeeded"], false);
    assert!(body.get("error").is_none());
    assert_eq!(body["message"], "no document produced: save cancelled");
}

#[actix_web::test]
async fn test_render_rejects_empty_invoice() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(Script::Normal, &dir))
            .configure(routes),
    )
    .await;

    let mut body = render_body("PRINT", None);
    body["payload"]["line_items"] = json!([]);
    let req = test::TestRequest::post()
        .uri("/api/invoices/render")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_request");
}

#[actix_web::test]
async fn test_malformed_json_gets_error_response() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(Script::Normal, &dir))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/invoices/render")
        .set_json(json!({ "mode": "FAX" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "BadRequest");
}

#[actix_web::test]
async fn test_render_timeout_maps_to_gateway_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(Script::StallRender, &dir))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/invoices/render")
        .set_json(render_body("PRINT", None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "timeout");
    assert!(body.get("preview_url").is_none());
}

#[actix_web::test]
async fn test_print_preview_is_served_until_closed() {
    let dir = tempfile::tempdir().unwrap();
    let state = app_state(Script::Normal, &dir);
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/api/invoices/render")
        .set_json(render_body("PRINT", None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["succeeded"], true);

    let url = body["preview_url"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:8080/previews/"));
    let id = Uuid::parse_str(url.rsplit('/').next().unwrap()).unwrap();
    let artifact = state.previews.artifact(&id).await.expect("preview open");
    assert!(artifact.exists());

    let req = test::TestRequest::get()
        .uri(&format!("/previews/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let pdf = test::read_body(resp).await;
    assert!(pdf.starts_with(b"%PDF"));

    let req = test::TestRequest::post()
        .uri(&format!("/api/previews/{}/close", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(wait_until_gone(&artifact, Duration::from_secs(2)).await);

    let req = test::TestRequest::post()
        .uri(&format!("/api/previews/{}/close", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/previews/{}", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_metrics_endpoint_reports_renders() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(Script::Normal, &dir))
            .configure(routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/invoices/render")
        .set_json(render_body("SAVE", Some("metrics")))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(text.contains("invoice_renders_total"));
}
