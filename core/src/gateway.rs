//! The request gateway: default headers, the four call shapes, and
//! cancellation.
//!
//! # Design
//! Each call shape is split the same way: a `build_*_request` method
//! produces the exact `HttpRequest` to be sent (no I/O), and the matching
//! `request_*` method enqueues it through `send`, which is generic over the
//! response codec. Every outcome goes through one normalization path, so
//! all shapes report failures identically.
//!
//! Per-call headers in `RequestOptions` replace the defaults entirely, for
//! every shape. The codec may still add the body's content type.
//!
//! The dispatch queue is either injected (`with_queue`) or created on the
//! first call and reused for the gateway's lifetime. Creation happens under
//! a lock, so at most one queue ever exists per gateway.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::codec::{JsonArray, JsonObject, RequestBody, ResponseCodec, Text, UploadText};
use crate::config::{GatewayConfig, QueueConfig};
use crate::error::{ApiError, Outcome};
use crate::headers::HeaderSet;
use crate::http::{HttpMethod, HttpRequest};
use crate::multipart::MultipartForm;
use crate::queue::{RequestQueue, Tag};
use crate::transport::{Transport, UreqTransport};

/// Per-call settings shared by every call shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Replaces the gateway's default headers when set.
    pub headers: Option<HeaderSet>,
    pub tag: Option<Tag>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn headers(mut self, headers: HeaderSet) -> Self {
        self.headers = Some(headers);
        self
    }
}

pub struct Gateway {
    defaults: HeaderSet,
    queue_config: QueueConfig,
    transport: Arc<dyn Transport>,
    queue: Mutex<Option<Arc<RequestQueue>>>,
    queues_started: AtomicUsize,
}

impl Gateway {
    /// A gateway whose queue is created on first use with `UreqTransport`.
    pub fn new(config: GatewayConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(config.queue.timeout()));
        Self::with_transport(config, transport)
    }

    /// A gateway whose lazily created queue uses `transport`.
    pub fn with_transport(config: GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            defaults: HeaderSet::defaults(&config.content_type, &config.accept, config.token.as_deref()),
            queue_config: config.queue,
            transport,
            queue: Mutex::new(None),
            queues_started: AtomicUsize::new(0),
        }
    }

    /// A gateway that dispatches through an existing queue and shares its
    /// transport.
    pub fn with_queue(config: GatewayConfig, queue: Arc<RequestQueue>) -> Self {
        let gateway = Self::with_transport(config, Arc::clone(queue.transport()));
        *gateway.queue.lock().unwrap_or_else(PoisonError::into_inner) = Some(queue);
        gateway
    }

    pub fn default_headers(&self) -> &HeaderSet {
        &self.defaults
    }

    /// Whether a dispatch queue exists yet.
    pub fn has_queue(&self) -> bool {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_text_request(&self, url: &str, method: HttpMethod, options: &RequestOptions) -> HttpRequest {
        let headers = self.effective_headers(options);
        HttpRequest {
            method,
            url: url.to_string(),
            headers: headers.into_vec(),
            body: None,
        }
    }

    pub fn build_object_request(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<&Map<String, Value>>,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        let body = body.map_or(RequestBody::Empty, |map| RequestBody::Json(Value::Object(map.clone())));
        self.build_request(url, method, &body, options)
    }

    pub fn build_array_request(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<&[Value]>,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        let body = body.map_or(RequestBody::Empty, |items| RequestBody::Json(Value::Array(items.to_vec())));
        self.build_request(url, method, &body, options)
    }

    /// Uploads are always `POST`.
    pub fn build_upload_request(
        &self,
        url: &str,
        form: &MultipartForm,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        self.build_request(url, HttpMethod::Post, &RequestBody::Multipart(form.clone()), options)
    }

    pub fn build_request(
        &self,
        url: &str,
        method: HttpMethod,
        body: &RequestBody,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = self.effective_headers(options);
        let body = body.encode(&mut headers)?;
        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers: headers.into_vec(),
            body,
        })
    }

    fn effective_headers(&self, options: &RequestOptions) -> HeaderSet {
        options.headers.clone().unwrap_or_else(|| self.defaults.clone())
    }

    // -----------------------------------------------------------------------
    // Call shapes
    // -----------------------------------------------------------------------

    pub fn request_text<F>(&self, url: &str, method: HttpMethod, options: RequestOptions, on_complete: F)
    where
        F: FnOnce(Outcome<String>) + Send + 'static,
    {
        let request = self.build_text_request(url, method, &options);
        self.send::<Text, _>(request, options.tag, on_complete);
    }

    pub fn request_object<F>(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<Map<String, Value>>,
        options: RequestOptions,
        on_complete: F,
    ) where
        F: FnOnce(Outcome<Map<String, Value>>) + Send + 'static,
    {
        match self.build_object_request(url, method, body.as_ref(), &options) {
            Ok(request) => self.send::<JsonObject, _>(request, options.tag, on_complete),
            Err(err) => on_complete(Err(err.into_failure())),
        }
    }

    pub fn request_array<F>(
        &self,
        url: &str,
        method: HttpMethod,
        body: Option<Vec<Value>>,
        options: RequestOptions,
        on_complete: F,
    ) where
        F: FnOnce(Outcome<Vec<Value>>) + Send + 'static,
    {
        match self.build_array_request(url, method, body.as_deref(), &options) {
            Ok(request) => self.send::<JsonArray, _>(request, options.tag, on_complete),
            Err(err) => on_complete(Err(err.into_failure())),
        }
    }

    pub fn upload<F>(&self, url: &str, form: MultipartForm, options: RequestOptions, on_complete: F)
    where
        F: FnOnce(Outcome<String>) + Send + 'static,
    {
        match self.build_upload_request(url, &form, &options) {
            Ok(request) => self.send::<UploadText, _>(request, options.tag, on_complete),
            Err(err) => on_complete(Err(err.into_failure())),
        }
    }

    /// Enqueue a pre-built request and decode its response with `C`.
    pub fn send<C, F>(&self, request: HttpRequest, tag: Option<Tag>, on_complete: F)
    where
        C: ResponseCodec,
        F: FnOnce(Outcome<C::Output>) + Send + 'static,
    {
        let queue = match self.queue() {
            Ok(queue) => queue,
            Err(err) => {
                warn!(error = %err, "request dropped before dispatch");
                on_complete(Err(err.into_failure()));
                return;
            }
        };

        queue.add(
            request,
            tag,
            Box::new(move |result| {
                let outcome = result.map_err(ApiError::from).and_then(|response| {
                    if response.is_success() {
                        C::decode(&response)
                    } else {
                        Err(ApiError::HttpError {
                            status: response.status,
                            body: response.body,
                        })
                    }
                });
                let outcome = outcome.map_err(|err| {
                    match &err {
                        ApiError::DeserializationError(reason) => warn!(%reason, "response did not parse"),
                        other => debug!(error = %other, "request failed"),
                    }
                    err.into_failure()
                });
                on_complete(outcome);
            }),
        );
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel every pending request tagged `tag`. A no-op before the first
    /// call creates the queue.
    pub fn cancel(&self, tag: impl Into<Tag>) -> usize {
        let tag = tag.into();
        match self.existing_queue() {
            Some(queue) => queue.cancel(&tag),
            None => 0,
        }
    }

    /// Cancel every pending request.
    pub fn cancel_all(&self) -> usize {
        self.existing_queue().map_or(0, |queue| queue.cancel_all())
    }

    fn existing_queue(&self) -> Option<Arc<RequestQueue>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn queue(&self) -> Result<Arc<RequestQueue>, ApiError> {
        let mut slot = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(queue) = slot.as_ref() {
            return Ok(Arc::clone(queue));
        }
        let queue = RequestQueue::with_transport(&self.queue_config, Arc::clone(&self.transport))
            .map_err(|e| ApiError::QueueUnavailable(e.to_string()))?;
        let queue = Arc::new(queue);
        self.queues_started.fetch_add(1, Ordering::AcqRel);
        *slot = Some(Arc::clone(&queue));
        Ok(queue)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("defaults", &self.defaults)
            .field("has_queue", &self.has_queue())
            .field("queues_started", &self.queues_started.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
