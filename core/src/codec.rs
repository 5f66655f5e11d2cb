//! Body codecs for the four call shapes.
//!
//! # Design
//! `RequestBody` turns a request payload into bytes plus the content type
//! the payload needs. `ResponseCodec` turns a successful `HttpResponse`
//! into the payload handed to the caller. `Gateway::send` is generic over
//! the response codec, so every shape shares one dispatch and one failure
//! normalization path.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::charset::{self, DEFAULT_JSON_CHARSET, DEFAULT_TEXT_CHARSET};
use crate::error::ApiError;
use crate::headers::{HeaderSet, CONTENT_TYPE, JSON_BODY_CONTENT_TYPE};
use crate::http::HttpResponse;
use crate::multipart::{self, MultipartForm};

/// Payload of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

impl RequestBody {
    /// Encode the body, adjusting `headers` for its content type.
    ///
    /// JSON bodies keep a caller-provided `Content-Type`. Multipart bodies
    /// always replace it, since the boundary must match the encoded bytes.
    pub fn encode(&self, headers: &mut HeaderSet) -> Result<Option<Vec<u8>>, ApiError> {
        match self {
            RequestBody::Empty => Ok(None),
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| ApiError::SerializationError(e.to_string()))?;
                if !headers.contains(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, JSON_BODY_CONTENT_TYPE);
                }
                Ok(Some(bytes))
            }
            RequestBody::Multipart(form) => {
                let boundary = multipart::new_boundary();
                headers.insert(CONTENT_TYPE, multipart::content_type(&boundary));
                Ok(Some(form.encode(&boundary)))
            }
        }
    }
}

/// Decodes a 2xx response into a call shape's payload.
pub trait ResponseCodec: Send + 'static {
    type Output: Send + 'static;

    fn decode(response: &HttpResponse) -> Result<Self::Output, ApiError>;
}

/// Raw text. Falls back to lossy UTF-8 when the declared charset is
/// unknown.
pub struct Text;

impl ResponseCodec for Text {
    type Output = String;

    fn decode(response: &HttpResponse) -> Result<String, ApiError> {
        let charset = charset::parse_charset(&response.headers, DEFAULT_TEXT_CHARSET);
        Ok(charset::decode(&response.body, &charset)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned()))
    }
}

/// A JSON object.
pub struct JsonObject;

impl ResponseCodec for JsonObject {
    type Output = Map<String, Value>;

    fn decode(response: &HttpResponse) -> Result<Self::Output, ApiError> {
        decode_json(response)
    }
}

/// A JSON array.
pub struct JsonArray;

impl ResponseCodec for JsonArray {
    type Output = Vec<Value>;

    fn decode(response: &HttpResponse) -> Result<Self::Output, ApiError> {
        decode_json(response)
    }
}

/// Upload confirmation text. Unlike `Text`, an unknown charset is a failure.
pub struct UploadText;

impl ResponseCodec for UploadText {
    type Output = String;

    fn decode(response: &HttpResponse) -> Result<String, ApiError> {
        let charset = charset::parse_charset(&response.headers, DEFAULT_TEXT_CHARSET);
        charset::decode(&response.body, &charset)
    }
}

/// Any JSON document deserialized into `T`.
pub struct Json<T>(PhantomData<fn() -> T>);

impl<T> ResponseCodec for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn decode(response: &HttpResponse) -> Result<T, ApiError> {
        decode_json(response)
    }
}

fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    let charset = charset::parse_charset(&response.headers, DEFAULT_JSON_CHARSET);
    let text = charset::decode(&response.body, &charset)
        .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| ApiError::DeserializationError(e.to_string()))
}
