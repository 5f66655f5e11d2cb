//! Request gateway over a shared, tag-cancellable HTTP dispatch queue.
//!
//! # Overview
//! `Gateway` holds a default header set (content type, accept type,
//! optional bearer token) and issues plain-text, JSON-object, JSON-array
//! and multipart-upload requests. Every call returns immediately; the
//! outcome arrives once, on a dispatch worker, as an `Outcome<T>`:
//! either the shape's payload or a `Failure { status, message }`.
//!
//! # Design
//! - Building a request (`Gateway::build_*_request`) is pure and separate
//!   from dispatching it, so header and body rules are testable without
//!   the network.
//! - `RequestQueue` owns the worker pool and the tag table. The gateway
//!   only submits work and registers completions.
//! - `Transport` is the I/O seam; `UreqTransport` is the default.
//! - All failures, whatever their origin, are normalized by
//!   `ApiError::into_failure`.

pub mod charset;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod headers;
pub mod http;
pub mod multipart;
pub mod queue;
pub mod transport;

pub use codec::{Json, JsonArray, JsonObject, RequestBody, ResponseCodec, Text, UploadText};
pub use config::{ConfigError, GatewayConfig, QueueConfig};
pub use error::{ApiError, Failure, Outcome, NO_RESPONSE_STATUS, UNKNOWN_ERROR_MESSAGE};
pub use gateway::{Gateway, RequestOptions};
pub use headers::HeaderSet;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use multipart::{FilePart, MultipartForm};
pub use queue::{QueueError, RequestQueue, Tag};
pub use transport::{Transport, TransportError, UreqTransport};
