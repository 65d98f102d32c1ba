//! OpenAPI document and Swagger UI routes.

use axum_test::TestServer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use commonlib_web::{Annotations, Method, WebEngine, WebOption};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
struct CreateOrder {
    item: String,
    quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
struct Order {
    id: String,
    item: String,
}

fn documented_engine() -> WebEngine {
    let mut engine = WebEngine::new([WebOption::openapi(
        "Orders",
        "1.2.3",
        "Order management",
        "https://unpkg.com/swagger-ui-dist@5.11.0/",
    )])
    .unwrap();
    assert!(engine.openapi_enabled());

    let orders = engine.new_group("/orders");
    engine.add_route(
        Some(&orders),
        "",
        Method::Post,
        Some(
            Annotations::new()
                .summary("Create an order")
                .request::<CreateOrder>()
                .response::<Order>(201),
        ),
        || async { "created" },
    );
    engine.add_route(
        Some(&orders),
        "/:id",
        Method::Get,
        Some(Annotations::new().response::<Order>(200).empty_response(404)),
        || async { "order" },
    );
    engine.add_route(None, "/internal", Method::Get, None, || async { "hidden" });
    engine
}

#[tokio::test]
async fn test_openapi_json_lists_annotated_routes() {
    let server = TestServer::new(documented_engine().into_router()).unwrap();

    let response = server.get("/openapi.json").await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/json");
    let doc: Value = response.json();

    assert_eq!(doc["openapi"], "3.1.0");
    assert_eq!(doc["info"]["title"], "Orders");
    assert_eq!(doc["info"]["version"], "1.2.3");

    let create = &doc["paths"]["/orders"]["post"];
    assert_eq!(create["operationId"], "POST-/orders");
    assert_eq!(create["summary"], "Create an order");
    assert_eq!(
        create["requestBody"]["content"]["application/json"]["schema"]["$ref"],
        "#/components/schemas/CreateOrder"
    );

    let get = &doc["paths"]["/orders/{id}"]["get"];
    assert_eq!(get["operationId"], "GET-/orders/{id}");
    assert_eq!(get["parameters"][0]["name"], "id");

    assert!(doc["components"]["schemas"]["Order"].is_object());
    assert!(doc["paths"]["/internal"].is_null());
    assert!(doc["paths"]["/openapi.json"].is_null());
}

#[tokio::test]
async fn test_docs_serves_swagger_ui() {
    let server = TestServer::new(documented_engine().into_router()).unwrap();

    let response = server.get("/docs").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("https://unpkg.com/swagger-ui-dist@5.11.0/swagger-ui-bundle.js"));
    assert!(html.contains("url: '/openapi.json'"));
}

#[tokio::test]
async fn test_openapi_disabled_by_default() {
    let engine = WebEngine::new([]).unwrap();
    assert!(!engine.openapi_enabled());
    assert!(!engine.tracing_enabled());

    let server = TestServer::new(engine.into_router()).unwrap();
    server
        .get("/openapi.json")
        .await
        .assert_status(axum::http::StatusCode::NOT_FOUND);
}
