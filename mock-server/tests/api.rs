use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::app;
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- ping ---

#[tokio::test]
async fn ping_returns_text() {
    let resp = app().oneshot(get("/ping")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[http::header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(body_bytes(resp).await, "pong");
}

// --- echo ---

#[tokio::test]
async fn echo_reflects_method_headers_and_body() {
    let mut req = json_request("PATCH", "/echo", r#"{"title":"Walk dog"}"#);
    req.headers_mut()
        .insert("authorization", "Bearer abc123".parse().unwrap());

    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let echo = body_json(resp).await;
    assert_eq!(echo["method"], "PATCH");
    assert_eq!(echo["headers"]["authorization"], "Bearer abc123");
    assert_eq!(echo["body"]["title"], "Walk dog");
}

#[tokio::test]
async fn echo_without_body_reports_null() {
    let resp = app().oneshot(get("/echo")).await.unwrap();
    let echo = body_json(resp).await;
    assert_eq!(echo["method"], "GET");
    assert!(echo["body"].is_null());
}

#[tokio::test]
async fn echo_array_returns_the_array() {
    let resp = app()
        .oneshot(json_request("POST", "/echo/array", r#"[1,"two",{"three":3}]"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let items = body_json(resp).await;
    assert_eq!(items.as_array().unwrap().len(), 3);
    assert_eq!(items[2]["three"], 3);
}

#[tokio::test]
async fn echo_array_rejects_objects() {
    let resp = app()
        .oneshot(json_request("POST", "/echo/array", r#"{"not":"an array"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- upload ---

#[tokio::test]
async fn upload_reports_file_and_fields() {
    let body = "--XYZ\r\n\
        Content-Disposition: form-data; name=\"album\"\r\n\r\n\
        holiday\r\n\
        --XYZ\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
        Content-Type: image/png\r\n\r\n\
        abc\r\n\
        --XYZ--\r\n";
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(http::header::CONTENT_TYPE, "multipart/form-data;boundary=XYZ")
        .body(body.to_string())
        .unwrap();

    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(resp).await.to_vec()).unwrap();
    assert!(text.starts_with("stored file:a.png (3 bytes, image/png)"), "{text}");
    assert!(text.ends_with("fields: album=holiday"), "{text}");
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let body = "--XYZ\r\nContent-Disposition: form-data; name=\"k\"\r\n\r\nv\r\n--XYZ--\r\n";
    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(http::header::CONTENT_TYPE, "multipart/form-data;boundary=XYZ")
        .body(body.to_string())
        .unwrap();

    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_bytes(resp).await, "missing file part");
}

// --- status ---

#[tokio::test]
async fn status_route_returns_error_body() {
    let resp = app().oneshot(get("/status/422")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "status 422");
}

#[tokio::test]
async fn empty_status_route_has_no_body() {
    let resp = app().oneshot(get("/status/503/empty")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_bytes(resp).await.is_empty());
}

// --- slow / charset ---

#[tokio::test]
async fn slow_route_eventually_answers() {
    let resp = app().oneshot(get("/slow/10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "done");
}

#[tokio::test]
async fn charset_route_declares_requested_charset() {
    let resp = app().oneshot(get("/charset/x-klingon")).await.unwrap();
    assert_eq!(
        resp.headers()[http::header::CONTENT_TYPE],
        "text/plain; charset=x-klingon"
    );
    assert_eq!(body_bytes(resp).await, "hello");
}
