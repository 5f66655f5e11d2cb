//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Inputs from C (`FfiHeader`, `FfiHttpMethod`) are borrowed for the
//! duration of the call. Outcomes travel the other way through
//! `CallbackTarget`, which owns the C callback and its `user_data` and
//! delivers a borrowed `FfiOutcome` exactly once. The outcome's strings are
//! freed as soon as the callback returns, so C must copy anything it keeps.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use gateway_core::{Gateway, HttpMethod, Outcome};

/// Opaque handle to a `Gateway`. C callers receive a pointer to this and
/// pass it back into every FFI function.
pub struct FfiGateway {
    pub(crate) inner: Gateway,
}

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Delete = 3,
    Patch = 4,
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Delete => HttpMethod::Delete,
            FfiHttpMethod::Patch => HttpMethod::Patch,
        }
    }
}

/// A key-value pair of borrowed C strings (headers or form fields).
#[repr(C)]
pub struct FfiHeader {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// Per-request options. Pass null for "no tag, default headers".
///
/// When `headers` is non-null, its `headers_len` entries replace the
/// gateway's default headers for this request.
#[repr(C)]
pub struct FfiRequestOptions {
    pub tag: *const c_char,
    pub headers: *const FfiHeader,
    pub headers_len: usize,
}

/// Synchronous status of an FFI call. Network outcomes never show up here;
/// they always arrive through the callback.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStatus {
    Ok = 0,
    NullArg = 1,
    InvalidUtf8 = 2,
    InvalidJson = 3,
    Panic = 4,
}

/// Outcome handed to the completion callback.
///
/// `ok` selects the branch. On success `status` is 0 and `body` is the
/// payload: raw text, or the JSON-serialized object or array. On failure
/// `status` is the HTTP status (or -1 when no response arrived) and `body`
/// is the failure message.
#[repr(C)]
pub struct FfiOutcome {
    pub ok: bool,
    pub status: i32,
    pub body: *const c_char,
}

/// Completion callback. `outcome` is valid only until the callback returns.
pub type FfiCallback = extern "C" fn(outcome: *const FfiOutcome, user_data: *mut c_void);

/// A C callback plus its opaque context, movable onto a dispatch worker.
pub(crate) struct CallbackTarget {
    callback: FfiCallback,
    user_data: *mut c_void,
}

// The C caller guarantees `user_data` may be used from the worker thread
// that runs the completion.
unsafe impl Send for CallbackTarget {}

impl CallbackTarget {
    pub(crate) fn new(callback: FfiCallback, user_data: *mut c_void) -> Self {
        Self { callback, user_data }
    }

    /// Deliver an outcome whose payload is already text.
    pub(crate) fn deliver(self, outcome: Outcome<String>) {
        let (ok, status, text) = match outcome {
            Ok(text) => (true, 0, text),
            Err(failure) => (false, failure.status, failure.message),
        };
        let body = c_string(text);
        let ffi = FfiOutcome {
            ok,
            status,
            body: body.as_ptr(),
        };
        (self.callback)(&ffi, self.user_data);
    }
}

/// Build a C string, dropping interior NUL bytes rather than failing.
pub(crate) fn c_string(text: String) -> CString {
    CString::new(text).unwrap_or_else(|err| {
        let mut bytes = err.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).unwrap_or_default()
    })
}
