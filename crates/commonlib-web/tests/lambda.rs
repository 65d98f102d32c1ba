//! The Lambda proxy path, driven without the Lambda runtime.

use axum::extract::Path;
use axum::http::StatusCode;

use commonlib_core::test_utils::load_resource_file;
use commonlib_web::{ApiError, Method, WebEngine};

fn request(method: &str, uri: &str, body: lambda_http::Body) -> lambda_http::Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

fn echo_engine() -> WebEngine {
    let mut engine = WebEngine::new([]).unwrap();
    engine.add_route(
        None,
        "/echo/:word",
        Method::Post,
        None,
        |Path(word): Path<String>, body: String| async move { format!("{word}:{body}") },
    );
    engine.add_route(None, "/missing", Method::Get, None, || async {
        Err::<String, _>(ApiError::not_found(""))
    });
    engine
}

#[tokio::test]
async fn test_lambda_handler_routes_requests() {
    let handler = echo_engine().lambda_handler();

    let response = handler
        .handle(request(
            "POST",
            "https://api.example.com/echo/hi",
            lambda_http::Body::Text("there".to_string()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"hi:there");

    let response = handler
        .handle(request(
            "GET",
            "https://api.example.com/missing",
            lambda_http::Body::Empty,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lambda_handler_serves_api_gateway_proxy_event() {
    let event = load_resource_file("tests/resources/apigw_proxy_event.json");
    let request = lambda_http::request::from_str(std::str::from_utf8(&event).unwrap()).unwrap();

    let response = echo_engine().lambda_handler().handle(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"hi:there");
}
