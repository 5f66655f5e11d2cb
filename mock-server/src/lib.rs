//! Fixture server for exercising the gateway over real HTTP.
//!
//! Every route is stateless. Echo routes reflect what the client sent so
//! tests can assert on headers and bodies; the status, slow and charset
//! routes produce the failure and timing conditions the gateway must
//! normalize.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Multipart, Path},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

const TEXT_UTF8: &str = "text/plain; charset=utf-8";

/// What `/echo` saw.
#[derive(Debug, Serialize)]
pub struct Echo {
    pub method: String,
    pub headers: Map<String, Value>,
    pub body: Value,
}

pub fn app() -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/echo", any(echo_object))
        .route("/echo/array", any(echo_array))
        .route("/upload", post(upload))
        .route("/status/{code}", get(status))
        .route("/status/{code}/empty", get(status_empty))
        .route("/slow/{ms}", get(slow))
        .route("/charset/{name}", get(charset))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn ping() -> &'static str {
    "pong"
}

async fn echo_object(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_string(), Value::String(value))
        })
        .collect();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    Json(Echo {
        method: method.as_str().to_string(),
        headers,
        body,
    })
}

async fn echo_array(body: Bytes) -> Result<Json<Vec<Value>>, (StatusCode, String)> {
    if body.is_empty() {
        return Ok(Json(Vec::new()));
    }
    serde_json::from_slice(&body)
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("expected a JSON array: {e}")))
}

async fn upload(mut multipart: Multipart) -> Result<Response, (StatusCode, String)> {
    let mut fields = Vec::new();
    let mut stored = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(bad_request)?;
                stored = Some(format!("{name}:{file_name} ({} bytes, {mime})", data.len()));
            }
            None => {
                let value = field.text().await.map_err(bad_request)?;
                fields.push(format!("{name}={value}"));
            }
        }
    }

    let Some(stored) = stored else {
        return Err((StatusCode::BAD_REQUEST, "missing file part".to_string()));
    };
    let id = Uuid::new_v4();
    tracing::debug!(%id, %stored, "upload received");
    let receipt = format!("stored {stored} as {id}; fields: {}", fields.join("&"));
    Ok(([(header::CONTENT_TYPE, TEXT_UTF8)], receipt).into_response())
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    let body = serde_json::json!({ "error": format!("status {code}") });
    (status, Json(body)).into_response()
}

async fn status_empty(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

/// Declares `name` as the charset of a plain ASCII body.
async fn charset(Path(name): Path<String>) -> Response {
    ([(header::CONTENT_TYPE, format!("text/plain; charset={name}"))], "hello").into_response()
}

fn bad_request(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}
