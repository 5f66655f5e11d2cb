//! C-ABI wrapper around `gateway-core`.
//!
//! # Overview
//! Exposes the gateway's four call shapes, tag cancellation and logging
//! setup through `extern "C"` functions, so any language with a C FFI can
//! issue requests without linking to Rust's runtime or serde directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Argument problems (null pointers, invalid UTF-8, malformed JSON
//!   bodies) are reported synchronously as an `FfiStatus`, and the callback
//!   is never invoked for them.
//! - Network outcomes always arrive through the `FfiCallback`, on a
//!   dispatch worker thread, as a borrowed `FfiOutcome`. JSON payloads are
//!   re-serialized to text before crossing the boundary.
//! - The only heap object C owns is the `FfiGateway`, released with
//!   `gateway_free`.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use gateway_core::{GatewayConfig, HeaderSet, MultipartForm, RequestOptions};
use serde_json::{Map, Value};

use types::*;

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// Run an entry point body, turning panics into `FfiStatus::Panic`.
fn guard<F>(body: F) -> FfiStatus
where
    F: FnOnce() -> Result<(), FfiStatus>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => FfiStatus::Ok,
        Ok(Err(status)) => status,
        Err(_) => FfiStatus::Panic,
    }
}

unsafe fn gateway_ref<'a>(gateway: *const FfiGateway) -> Result<&'a FfiGateway, FfiStatus> {
    if gateway.is_null() {
        return Err(FfiStatus::NullArg);
    }
    Ok(unsafe { &*gateway })
}

unsafe fn required_str<'a>(ptr: *const c_char) -> Result<&'a str, FfiStatus> {
    if ptr.is_null() {
        return Err(FfiStatus::NullArg);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiStatus::InvalidUtf8)
}

unsafe fn optional_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, FfiStatus> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { required_str(ptr) }.map(Some)
}

unsafe fn read_pairs(ptr: *const FfiHeader, len: usize) -> Result<Vec<(String, String)>, FfiStatus> {
    if len == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err(FfiStatus::NullArg);
    }
    let pairs = unsafe { std::slice::from_raw_parts(ptr, len) };
    pairs
        .iter()
        .map(|pair| {
            let key = unsafe { required_str(pair.key) }?;
            let value = unsafe { required_str(pair.value) }?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

unsafe fn read_options(options: *const FfiRequestOptions) -> Result<RequestOptions, FfiStatus> {
    let mut out = RequestOptions::new();
    if options.is_null() {
        return Ok(out);
    }
    let options = unsafe { &*options };
    if let Some(tag) = unsafe { optional_str(options.tag) }? {
        out = out.tag(tag);
    }
    if !options.headers.is_null() {
        let pairs = unsafe { read_pairs(options.headers, options.headers_len) }?;
        out = out.headers(pairs.into_iter().collect::<HeaderSet>());
    }
    Ok(out)
}

fn callback_target(callback: Option<FfiCallback>, user_data: *mut c_void) -> Result<CallbackTarget, FfiStatus> {
    callback
        .map(|cb| CallbackTarget::new(cb, user_data))
        .ok_or(FfiStatus::NullArg)
}

// ---------------------------------------------------------------------------
// Gateway lifecycle
// ---------------------------------------------------------------------------

/// Create a gateway with JSON default headers. `token` may be null.
///
/// Returns null if `token` is not valid UTF-8 or if an internal panic occurs.
/// The caller must free the returned pointer with `gateway_free`.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_new(token: *const c_char) -> *mut FfiGateway {
    catch_unwind(|| {
        let token = match unsafe { optional_str(token) } {
            Ok(token) => token.map(str::to_string),
            Err(_) => return std::ptr::null_mut(),
        };
        let config = GatewayConfig {
            token,
            ..GatewayConfig::default()
        };
        let gateway = gateway_core::Gateway::new(config);
        Box::into_raw(Box::new(FfiGateway { inner: gateway }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Create a gateway configured from `GATEWAY_*` environment variables.
///
/// Returns null if the environment holds an invalid value.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_new_from_env() -> *mut FfiGateway {
    catch_unwind(|| match GatewayConfig::from_env() {
        Ok(config) => {
            let gateway = gateway_core::Gateway::new(config);
            Box::into_raw(Box::new(FfiGateway { inner: gateway }))
        }
        Err(err) => {
            tracing::warn!(error = %err, "rejecting gateway configuration");
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a gateway created by `gateway_new*`. Safe to call with null.
///
/// Pending requests are cancelled first, so no callback runs after this
/// returns unless its response was already being delivered.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_free(gateway: *mut FfiGateway) {
    if !gateway.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let gateway = unsafe { Box::from_raw(gateway) };
            gateway.inner.cancel_all();
            drop(gateway);
        }));
    }
}

/// Install a `tracing` subscriber that logs to stderr, filtered by
/// `RUST_LOG`. Returns false if a subscriber was already installed.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_init_logging() -> bool {
    catch_unwind(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Send a request whose response body is delivered as text.
///
/// `options` may be null. Returns `Ok` once the request is enqueued; the
/// outcome arrives through `callback`.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_request_text(
    gateway: *const FfiGateway,
    method: FfiHttpMethod,
    url: *const c_char,
    options: *const FfiRequestOptions,
    callback: Option<FfiCallback>,
    user_data: *mut c_void,
) -> FfiStatus {
    guard(|| {
        let gateway = unsafe { gateway_ref(gateway) }?;
        let url = unsafe { required_str(url) }?;
        let options = unsafe { read_options(options) }?;
        let target = callback_target(callback, user_data)?;
        gateway
            .inner
            .request_text(url, method.into(), options, move |outcome| target.deliver(outcome));
        Ok(())
    })
}

/// Send a request with an optional JSON object body; the response must be
/// a JSON object and is delivered re-serialized.
///
/// `body_json` may be null for no body. Returns `InvalidJson` if it is not
/// a JSON object.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_request_object(
    gateway: *const FfiGateway,
    method: FfiHttpMethod,
    url: *const c_char,
    body_json: *const c_char,
    options: *const FfiRequestOptions,
    callback: Option<FfiCallback>,
    user_data: *mut c_void,
) -> FfiStatus {
    guard(|| {
        let gateway = unsafe { gateway_ref(gateway) }?;
        let url = unsafe { required_str(url) }?;
        let body = match unsafe { optional_str(body_json) }? {
            Some(raw) => Some(
                serde_json::from_str::<Map<String, Value>>(raw).map_err(|_| FfiStatus::InvalidJson)?,
            ),
            None => None,
        };
        let options = unsafe { read_options(options) }?;
        let target = callback_target(callback, user_data)?;
        gateway
            .inner
            .request_object(url, method.into(), body, options, move |outcome| {
                target.deliver(outcome.map(|object| Value::Object(object).to_string()))
            });
        Ok(())
    })
}

/// Send a request with an optional JSON array body; the response must be
/// a JSON array and is delivered re-serialized.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_request_array(
    gateway: *const FfiGateway,
    method: FfiHttpMethod,
    url: *const c_char,
    body_json: *const c_char,
    options: *const FfiRequestOptions,
    callback: Option<FfiCallback>,
    user_data: *mut c_void,
) -> FfiStatus {
    guard(|| {
        let gateway = unsafe { gateway_ref(gateway) }?;
        let url = unsafe { required_str(url) }?;
        let body = match unsafe { optional_str(body_json) }? {
            Some(raw) => Some(serde_json::from_str::<Vec<Value>>(raw).map_err(|_| FfiStatus::InvalidJson)?),
            None => None,
        };
        let options = unsafe { read_options(options) }?;
        let target = callback_target(callback, user_data)?;
        gateway
            .inner
            .request_array(url, method.into(), body, options, move |outcome| {
                target.deliver(outcome.map(|items| Value::Array(items).to_string()))
            });
        Ok(())
    })
}

/// POST a multipart form: `fields_len` text fields plus one file part named
/// `file`. The response body is delivered as text.
///
/// `fields` may be null when `fields_len` is 0, and `data` may be null when
/// `data_len` is 0.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn gateway_upload(
    gateway: *const FfiGateway,
    url: *const c_char,
    fields: *const FfiHeader,
    fields_len: usize,
    file_name: *const c_char,
    data: *const u8,
    data_len: usize,
    mime_type: *const c_char,
    options: *const FfiRequestOptions,
    callback: Option<FfiCallback>,
    user_data: *mut c_void,
) -> FfiStatus {
    guard(|| {
        let gateway = unsafe { gateway_ref(gateway) }?;
        let url = unsafe { required_str(url) }?;
        let fields = unsafe { read_pairs(fields, fields_len) }?;
        let file_name = unsafe { required_str(file_name) }?;
        let mime_type = unsafe { required_str(mime_type) }?;
        let data = match (data.is_null(), data_len) {
            (_, 0) => Vec::new(),
            (true, _) => return Err(FfiStatus::NullArg),
            (false, len) => unsafe { std::slice::from_raw_parts(data, len) }.to_vec(),
        };
        let options = unsafe { read_options(options) }?;
        let target = callback_target(callback, user_data)?;
        let form = MultipartForm::upload(fields, file_name, data, mime_type);
        gateway
            .inner
            .upload(url, form, options, move |outcome| target.deliver(outcome));
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cancel every pending request tagged `tag`. Returns how many were
/// cancelled; 0 for null or non-UTF-8 arguments.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_cancel(gateway: *const FfiGateway, tag: *const c_char) -> usize {
    catch_unwind(AssertUnwindSafe(|| {
        let (Ok(gateway), Ok(tag)) = (unsafe { gateway_ref(gateway) }, unsafe { required_str(tag) }) else {
            return 0;
        };
        gateway.inner.cancel(tag)
    }))
    .unwrap_or(0)
}

/// Cancel every pending request. Returns how many were cancelled.
#[unsafe(no_mangle)]
pub extern "C" fn gateway_cancel_all(gateway: *const FfiGateway) -> usize {
    catch_unwind(AssertUnwindSafe(|| match unsafe { gateway_ref(gateway) } {
        Ok(gateway) => gateway.inner.cancel_all(),
        Err(_) => 0,
    }))
    .unwrap_or(0)
}
