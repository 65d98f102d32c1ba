//! OpenAPI 3.1 document built from route annotations.
//!
//! Routes registered with [`Annotations`] are added to the document served on
//! `/openapi.json`. `/docs` serves a Swagger UI page loading its assets from
//! a configurable distribution URL.

use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{KnownFormat, ObjectBuilder, Schema, SchemaFormat, Type};
use utoipa::openapi::{
    Components, ContentBuilder, Deprecated, InfoBuilder, OpenApi, OpenApiBuilder, Paths, Ref,
    RefOr, Required, ResponseBuilder,
};
use utoipa::ToSchema;

use crate::engine::Method;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Schema of a typed body, with the component schemas it refers to.
#[derive(Debug, Clone)]
pub struct TypedSchema {
    name: String,
    schema: RefOr<Schema>,
    dependencies: Vec<(String, RefOr<Schema>)>,
}

impl TypedSchema {
    pub fn of<T: ToSchema>() -> Self {
        let mut dependencies = Vec::new();
        T::schemas(&mut dependencies);
        Self {
            name: T::name().into_owned(),
            schema: T::schema(),
            dependencies,
        }
    }
}

#[derive(Debug, Clone)]
enum ResponseBody {
    Json(TypedSchema),
    Html,
    File { content_type: String },
    Empty,
}

#[derive(Debug, Clone)]
enum Annotation {
    Id(String),
    Summary(String),
    Description(String),
    Deprecated,
    Tags(Vec<String>),
    Request(TypedSchema),
    Response { status: u16, body: ResponseBody },
    QueryParameter { name: String, required: bool },
}

/// Metadata for one route in the OpenAPI document.
///
/// ```ignore
/// Annotations::new()
///     .summary("Get an order")
///     .tags(["orders"])
///     .response::<Order>(200)
///     .empty_response(404)
/// ```
#[derive(Debug, Clone, Default)]
pub struct Annotations(Vec<Annotation>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the generated `"<METHOD>-<path>"` operation id.
    pub fn id(self, id: impl Into<String>) -> Self {
        self.push(Annotation::Id(id.into()))
    }

    pub fn summary(self, summary: impl Into<String>) -> Self {
        self.push(Annotation::Summary(summary.into()))
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.push(Annotation::Description(description.into()))
    }

    pub fn deprecated(self) -> Self {
        self.push(Annotation::Deprecated)
    }

    pub fn tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Annotation::Tags(tags.into_iter().map(Into::into).collect()))
    }

    /// JSON request body of type `T`.
    pub fn request<T: ToSchema>(self) -> Self {
        self.push(Annotation::Request(TypedSchema::of::<T>()))
    }

    /// JSON response of type `T`.
    pub fn response<T: ToSchema>(self, status: u16) -> Self {
        self.push(Annotation::Response {
            status,
            body: ResponseBody::Json(TypedSchema::of::<T>()),
        })
    }

    pub fn html_response(self, status: u16) -> Self {
        self.push(Annotation::Response {
            status,
            body: ResponseBody::Html,
        })
    }

    /// Binary response with the given content type.
    pub fn file_response(self, status: u16, content_type: impl Into<String>) -> Self {
        self.push(Annotation::Response {
            status,
            body: ResponseBody::File {
                content_type: content_type.into(),
            },
        })
    }

    pub fn empty_response(self, status: u16) -> Self {
        self.push(Annotation::Response {
            status,
            body: ResponseBody::Empty,
        })
    }

    pub fn query_parameter(self, name: impl Into<String>, required: bool) -> Self {
        self.push(Annotation::QueryParameter {
            name: name.into(),
            required,
        })
    }

    fn push(mut self, annotation: Annotation) -> Self {
        self.0.push(annotation);
        self
    }
}

/// The OpenAPI document and Swagger UI page of a service.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    doc: OpenApi,
    swagger_ui_html: String,
}

impl OpenApiDocument {
    pub fn new(title: &str, version: &str, description: &str, swagger_ui_dist_url: &str) -> Self {
        let info = InfoBuilder::new()
            .title(title)
            .version(version)
            .description(Some(description))
            .build();
        let doc = OpenApiBuilder::new().info(info).paths(Paths::new()).build();

        Self {
            doc,
            swagger_ui_html: swagger_ui_html(swagger_ui_dist_url.trim_end_matches('/')),
        }
    }

    /// Add an operation. `path` uses `{name}` or `{*name}` for parameters.
    pub fn add(&mut self, method: Method, path: &str, annotations: &Annotations) {
        let path = openapi_path(path);
        let mut operation = OperationBuilder::new()
            .operation_id(Some(format!("{}-{}", method.as_str(), path)));

        for name in path_parameters(&path) {
            operation = operation.parameter(
                ParameterBuilder::new()
                    .name(name)
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .schema(Some(string_schema()))
                    .build(),
            );
        }

        for annotation in &annotations.0 {
            operation = match annotation {
                Annotation::Id(id) => operation.operation_id(Some(id.clone())),
                Annotation::Summary(s) => operation.summary(Some(s.clone())),
                Annotation::Description(d) => operation.description(Some(d.clone())),
                Annotation::Deprecated => operation.deprecated(Some(Deprecated::True)),
                Annotation::Tags(tags) => operation.tags(Some(tags.clone())),
                Annotation::QueryParameter { name, required } => operation.parameter(
                    ParameterBuilder::new()
                        .name(name.clone())
                        .parameter_in(ParameterIn::Query)
                        .required(if *required {
                            Required::True
                        } else {
                            Required::False
                        })
                        .schema(Some(string_schema()))
                        .build(),
                ),
                Annotation::Request(typed) => {
                    let schema = self.register(typed);
                    let body = RequestBodyBuilder::new()
                        .content(
                            JSON_CONTENT_TYPE,
                            ContentBuilder::new().schema(Some(schema)).build(),
                        )
                        .required(Some(Required::True))
                        .build();
                    operation.request_body(Some(body))
                }
                Annotation::Response { status, body } => {
                    let description = http::StatusCode::from_u16(*status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("")
                        .to_string();
                    let mut response = ResponseBuilder::new().description(description);
                    response = match body {
                        ResponseBody::Json(typed) => {
                            let schema = self.register(typed);
                            response.content(
                                JSON_CONTENT_TYPE,
                                ContentBuilder::new().schema(Some(schema)).build(),
                            )
                        }
                        ResponseBody::Html => response.content(
                            "text/html",
                            ContentBuilder::new().schema(Some(string_schema())).build(),
                        ),
                        ResponseBody::File { content_type } => response.content(
                            content_type.clone(),
                            ContentBuilder::new().schema(Some(binary_schema())).build(),
                        ),
                        ResponseBody::Empty => response,
                    };
                    operation.response(status.to_string(), response.build())
                }
            };
        }

        self.doc
            .paths
            .add_path_operation(path, vec![method.openapi_method()], operation.build());
    }

    /// Register the component schemas of `typed` and return a reference to it.
    fn register(&mut self, typed: &TypedSchema) -> RefOr<Schema> {
        let components = self.doc.components.get_or_insert_with(Components::default);
        for (name, schema) in &typed.dependencies {
            components
                .schemas
                .entry(name.clone())
                .or_insert_with(|| schema.clone());
        }

        if typed.name.is_empty() {
            return typed.schema.clone();
        }
        components
            .schemas
            .entry(typed.name.clone())
            .or_insert_with(|| typed.schema.clone());
        RefOr::Ref(Ref::from_schema_name(typed.name.clone()))
    }

    pub fn document(&self) -> &OpenApi {
        &self.doc
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.doc)
    }

    pub fn swagger_ui_html(&self) -> &str {
        &self.swagger_ui_html
    }
}

impl Method {
    fn openapi_method(self) -> HttpMethod {
        match self {
            Method::Get => HttpMethod::Get,
            Method::Post => HttpMethod::Post,
            Method::Put => HttpMethod::Put,
            Method::Patch => HttpMethod::Patch,
            Method::Delete => HttpMethod::Delete,
        }
    }
}

fn string_schema() -> RefOr<Schema> {
    RefOr::T(Schema::Object(
        ObjectBuilder::new().schema_type(Type::String).build(),
    ))
}

fn binary_schema() -> RefOr<Schema> {
    RefOr::T(Schema::Object(
        ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Binary)))
            .build(),
    ))
}

/// `/files/{*rest}` becomes `/files/{rest}`.
fn openapi_path(path: &str) -> String {
    path.replace("{*", "{")
}

fn path_parameters(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| name.trim_start_matches('*').to_string())
        .collect()
}

fn swagger_ui_html(dist_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <meta name="description" content="SwaggerUI" />
  <title>SwaggerUI</title>
  <link rel="stylesheet" href="{dist_url}/swagger-ui.css" />
  <link rel="icon" type="image/x-icon" href="{dist_url}/favicon-32x32.png">
</head>
<body>
<div id="swagger-ui"></div>
<script src="{dist_url}/swagger-ui-bundle.js" crossorigin></script>
<script>
  window.onload = () => {{
    window.ui = SwaggerUIBundle({{
      url: '/openapi.json',
      dom_id: '#swagger-ui',
    }});
  }};
</script>
</body>
</html>
"#
    )
}
