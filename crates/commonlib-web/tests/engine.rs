//! End-to-end tests of the web engine through its router.

use axum::extract::{Path, Request};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::Extension;
use axum_test::TestServer;
use serde_json::Value;

use commonlib_httpcomm::HttpError;
use commonlib_web::{ApiError, Method, Templates, WebEngine};

async fn tag_group(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    res.headers_mut()
        .insert("x-group", HeaderValue::from_static("api"));
    res
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

fn server(engine: WebEngine) -> TestServer {
    TestServer::new(engine.into_router()).unwrap()
}

#[tokio::test]
async fn test_route_with_gin_style_parameter() {
    let mut engine = WebEngine::new([]).unwrap();
    engine.add_route(
        None,
        "/hello/:name",
        Method::Get,
        None,
        |Path(name): Path<String>| async move { format!("hello {name}") },
    );

    let response = server(engine).get("/hello/world").await;
    response.assert_status_ok();
    response.assert_text("hello world");
}

#[tokio::test]
async fn test_method_mismatch_is_rejected() {
    let mut engine = WebEngine::new([]).unwrap();
    engine.add_route(None, "/orders", Method::Post, None, || async { "created" });

    let response = server(engine).get("/orders").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_group_layer_applies_to_group_only() {
    let mut engine = WebEngine::new([]).unwrap();
    let api = engine.new_group("/api");
    api.use_layer(from_fn(tag_group));
    engine.add_route(Some(&api), "/orders", Method::Get, None, || async { "orders" });
    engine.add_route(None, "/health", Method::Get, None, || async { "ok" });

    let server = server(engine);

    let grouped = server.get("/api/orders").await;
    grouped.assert_status_ok();
    assert_eq!(grouped.header("x-group"), "api");

    let plain = server.get("/health").await;
    plain.assert_status_ok();
    assert!(plain.maybe_header("x-group").is_none());
}

#[tokio::test]
async fn test_engine_layer_applies_to_routes_added_later() {
    let mut engine = WebEngine::new([]).unwrap();
    engine.use_layer(from_fn(tag_group));
    engine.add_route(None, "/late", Method::Get, None, || async { "late" });

    let response = server(engine).get("/late").await;
    assert_eq!(response.header("x-group"), "api");
}

#[tokio::test]
async fn test_api_error_response() {
    let mut engine = WebEngine::new([]).unwrap();
    engine.add_route(None, "/orders/:id", Method::Get, None, || async {
        Err::<String, _>(ApiError::not_found("no such order"))
    });
    engine.add_route(None, "/remote", Method::Get, None, || async {
        Err::<String, ApiError>(HttpError::new(500, "upstream down").into())
    });
    engine.add_route(None, "/secret", Method::Get, None, || async {
        Err::<String, ApiError>(anyhow::anyhow!("password=hunter2").into())
    });

    let server = server(engine);

    let response = server.get("/orders/7").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert!(response.text().contains('\n'), "body should be indented");
    let body: Value = response.json();
    assert_eq!(body["error"], "Not Found: no such order");

    let response = server.get("/remote").await;
    response.assert_status(StatusCode::FAILED_DEPENDENCY);

    let response = server.get("/secret").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "Internal Server Error: internal server error");
}

#[tokio::test]
async fn test_panic_is_recovered_as_empty_500() {
    let mut engine = WebEngine::new([]).unwrap();
    engine.add_route(None, "/explode", Method::Get, None, explode);
    engine.add_route(None, "/fine", Method::Get, None, || async { "fine" });

    let server = server(engine);

    let response = server.get("/explode").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.as_bytes().is_empty());

    server.get("/fine").await.assert_status_ok();
}

#[tokio::test]
async fn test_cors_preflight_mirrors_origin() {
    let mut engine = WebEngine::new([]).unwrap();
    engine.add_route(None, "/orders", Method::Post, None, || async { "created" });

    let response = server(engine)
        .method(axum::http::Method::OPTIONS, "/orders")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://app.example.com"),
        )
        .add_header(
            HeaderName::from_static("access-control-request-method"),
            HeaderValue::from_static("POST"),
        )
        .await;

    assert_eq!(response.header("access-control-allow-origin"), "https://app.example.com");
    assert_eq!(response.header("access-control-allow-credentials"), "true");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let mut engine = WebEngine::new([]).unwrap();
    engine.add_route(None, "/ping", Method::Get, None, || async { "pong" });
    let server = server(engine);

    let response = server
        .get("/ping")
        .add_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("req-42"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "req-42");

    let response = server.get("/ping").await;
    assert_eq!(response.header("x-request-id").len(), 36);
}

#[tokio::test]
async fn test_static_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "static content").unwrap();

    let mut engine = WebEngine::new([]).unwrap();
    engine.static_directory(dir.path());

    let response = server(engine).get("/static/hello.txt").await;
    response.assert_status_ok();
    response.assert_text("static content");
}

#[tokio::test]
async fn test_handlers_render_loaded_templates() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.html"), "<h1>Hei {{ name }}</h1>").unwrap();

    let mut engine = WebEngine::new([]).unwrap();
    engine
        .load_html_glob(&format!("{}/*.html", dir.path().display()))
        .unwrap();
    engine.add_route(
        None,
        "/greet/:name",
        Method::Get,
        None,
        |Extension(templates): Extension<Templates>, Path(name): Path<String>| async move {
            templates.render("greeting.html", &serde_json::json!({ "name": name }))
        },
    );
    engine.add_route(
        None,
        "/broken",
        Method::Get,
        None,
        |Extension(templates): Extension<Templates>| async move {
            templates.render("nope.html", &serde_json::json!({}))
        },
    );

    let server = server(engine);

    let response = server.get("/greet/Oslo").await;
    response.assert_status_ok();
    response.assert_text("<h1>Hei Oslo</h1>");
    assert!(response.header("content-type").to_str().unwrap().starts_with("text/html"));

    server
        .get("/broken")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_load_html_glob_rejects_invalid_template() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.html"), "{{ unclosed").unwrap();

    let mut engine = WebEngine::new([]).unwrap();
    let err = engine
        .load_html_glob(&format!("{}/*.html", dir.path().display()))
        .unwrap_err();
    assert!(matches!(err, commonlib_web::Error::Template(_)));
}
