//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! JSON text for payloads whose shape the host decides. Conversion functions
//! live here to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use rewards_core::error::StorageError;
use rewards_core::http::HttpMethod;
use rewards_core::{ApiClient, ApiResponse, ErrorItem, HttpRequest, TokenStore};
use serde_json::Value;

/// Opaque handle to an `ApiClient`. C callers receive a pointer to this
/// and pass it back into every FFI function.
pub struct FfiApiClient {
    pub(crate) inner: ApiClient,
}

/// Copy `s` into a C string owned by this library. Interior NUL bytes are
/// dropped rather than failing.
pub(crate) fn to_c_string(s: impl Into<String>) -> *mut c_char {
    let mut bytes = s.into().into_bytes();
    bytes.retain(|&b| b != 0);
    CString::new(bytes).unwrap_or_default().into_raw()
}

fn opt_c_string(s: Option<String>) -> *mut c_char {
    s.map_or(ptr::null_mut(), to_c_string)
}

/// Borrow a caller-owned C string. Null and invalid UTF-8 read as `None`.
///
/// # Safety
/// `s` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn borrow_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// Release a string produced by `to_c_string`. Null is ignored.
pub(crate) fn drop_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Leak `items` as a pointer/length pair. Empty slices become null.
fn leak_slice<T>(items: Vec<T>) -> (*mut T, u32) {
    if items.is_empty() {
        return (ptr::null_mut(), 0);
    }
    let len = items.len() as u32;
    let ptr = Box::into_raw(items.into_boxed_slice()) as *mut T;
    (ptr, len)
}

/// Reclaim a pair produced by `leak_slice`.
fn reclaim_slice<T>(ptr: *mut T, len: u32) -> Vec<T> {
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    let slice = ptr::slice_from_raw_parts_mut(ptr, len as usize);
    unsafe { Box::from_raw(slice) }.into_vec()
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Patch = 3,
    Delete = 4,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Patch => FfiHttpMethod::Patch,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Patch => HttpMethod::Patch,
            FfiHttpMethod::Delete => HttpMethod::Delete,
        }
    }
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// An HTTP request described as C-compatible plain data.
///
/// Built by `rewards_build_request`. The host executes the request and
/// passes the response back through `rewards_parse_response`.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut c_char,
}

impl FfiHttpRequest {
    /// Convert a core `HttpRequest` into a heap-allocated `FfiHttpRequest`.
    pub(crate) fn from_core(req: HttpRequest) -> *mut Self {
        let headers = req
            .headers
            .into_iter()
            .map(|(k, v)| FfiHeader {
                key: to_c_string(k),
                value: to_c_string(v),
            })
            .collect();
        let (headers, headers_len) = leak_slice(headers);

        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            url: to_c_string(req.url),
            headers,
            headers_len,
            body: opt_c_string(req.body),
        }))
    }

    /// Free every field. The struct itself is owned by the caller.
    pub(crate) fn release_fields(&mut self) {
        drop_c_string(self.url);
        drop_c_string(self.body);
        for header in reclaim_slice(self.headers, self.headers_len) {
            drop_c_string(header.key);
            drop_c_string(header.value);
        }
        self.url = ptr::null_mut();
        self.body = ptr::null_mut();
        self.headers = ptr::null_mut();
        self.headers_len = 0;
    }
}

// ---------------------------------------------------------------------------
// Response input (caller-provided, not heap-allocated by us)
// ---------------------------------------------------------------------------

/// An HTTP response described as C-compatible plain data.
///
/// The host constructs this on the stack after executing a request, then
/// passes a pointer to `rewards_parse_response`. The FFI layer reads but
/// does not free these fields.
#[repr(C)]
pub struct FfiHttpResponse {
    pub status: u16,
    pub body: *const c_char,
}

// ---------------------------------------------------------------------------
// Normalized response
// ---------------------------------------------------------------------------

/// One entry of the `errors` array. Absent fields are null.
#[repr(C)]
pub struct FfiErrorItem {
    pub title: *mut c_char,
    pub detail: *mut c_char,
    pub code: *mut c_char,
    /// `source` re-serialized as JSON.
    pub source_json: *mut c_char,
}

impl FfiErrorItem {
    fn from_core(item: ErrorItem) -> Self {
        FfiErrorItem {
            title: opt_c_string(item.title),
            detail: opt_c_string(item.detail),
            code: opt_c_string(item.code),
            source_json: opt_c_string(item.source.map(|s| s.to_string())),
        }
    }

    fn release_fields(&self) {
        drop_c_string(self.title);
        drop_c_string(self.detail);
        drop_c_string(self.code);
        drop_c_string(self.source_json);
    }
}

/// The normalized response envelope exposed to C.
///
/// `ok` is true only for 2xx replies. `status` is 0 when no response was
/// received. Payloads are JSON text; each pointer is null when the part is
/// absent.
#[repr(C)]
pub struct FfiApiResponse {
    pub ok: bool,
    pub status: u16,
    pub data_json: *mut c_char,
    pub errors: *mut FfiErrorItem,
    pub errors_len: u32,
    pub meta_json: *mut c_char,
    pub raw_json: *mut c_char,
}

impl FfiApiResponse {
    pub(crate) fn from_core(response: ApiResponse<Value>) -> *mut Self {
        let errors = response
            .errors
            .unwrap_or_default()
            .into_iter()
            .map(FfiErrorItem::from_core)
            .collect();
        let (errors, errors_len) = leak_slice(errors);

        Box::into_raw(Box::new(FfiApiResponse {
            ok: response.ok,
            status: response.status,
            data_json: opt_c_string(response.data.map(|d| d.to_string())),
            errors,
            errors_len,
            meta_json: opt_c_string(response.meta.map(|m| Value::Object(m).to_string())),
            raw_json: opt_c_string(response.raw.map(|r| r.to_string())),
        }))
    }

    /// Client-side failure, e.g. a null argument or a caught panic.
    pub(crate) fn failure(detail: &str) -> *mut Self {
        Self::from_core(ApiResponse::unknown_error(detail))
    }

    pub(crate) fn release_fields(&mut self) {
        drop_c_string(self.data_json);
        drop_c_string(self.meta_json);
        drop_c_string(self.raw_json);
        for item in reclaim_slice(self.errors, self.errors_len) {
            item.release_fields();
        }
        self.data_json = ptr::null_mut();
        self.meta_json = ptr::null_mut();
        self.raw_json = ptr::null_mut();
        self.errors = ptr::null_mut();
        self.errors_len = 0;
    }
}

// ---------------------------------------------------------------------------
// Host-provided token storage
// ---------------------------------------------------------------------------

/// Secure storage implemented by the host (keychain, keystore).
///
/// All callbacks receive `context` unchanged. `load` returns a string the
/// host allocated, or null; it is handed back through `free_string` once
/// copied. `release` runs when the owning client is freed. Callbacks may be
/// invoked from any thread.
#[repr(C)]
pub struct FfiTokenStore {
    pub context: *mut c_void,
    pub save: Option<extern "C" fn(context: *mut c_void, token: *const c_char) -> bool>,
    pub load: Option<extern "C" fn(context: *mut c_void) -> *mut c_char>,
    pub delete: Option<extern "C" fn(context: *mut c_void) -> bool>,
    pub free_string: Option<extern "C" fn(context: *mut c_void, s: *mut c_char)>,
    pub release: Option<extern "C" fn(context: *mut c_void)>,
}

/// `TokenStore` adapter over `FfiTokenStore` callbacks.
pub(crate) struct CallbackTokenStore {
    callbacks: FfiTokenStore,
}

// The host guarantees its callbacks and context are thread-safe.
unsafe impl Send for CallbackTokenStore {}
unsafe impl Sync for CallbackTokenStore {}

impl CallbackTokenStore {
    pub(crate) fn new(callbacks: FfiTokenStore) -> Self {
        Self { callbacks }
    }
}

impl TokenStore for CallbackTokenStore {
    fn save(&self, token: &str) -> Result<(), StorageError> {
        let save = self
            .callbacks
            .save
            .ok_or_else(|| StorageError::Unavailable("host store has no save callback".into()))?;
        let token = CString::new(token)
            .map_err(|_| StorageError::Unavailable("token contains a NUL byte".into()))?;
        if save(self.callbacks.context, token.as_ptr()) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("host store rejected save".into()))
        }
    }

    fn load(&self) -> Option<String> {
        let load = self.callbacks.load?;
        let raw = load(self.callbacks.context);
        if raw.is_null() {
            return None;
        }
        let token = unsafe { borrow_str(raw) }.map(str::to_string);
        if let Some(free_string) = self.callbacks.free_string {
            free_string(self.callbacks.context, raw);
        }
        token.filter(|t| !t.is_empty())
    }

    fn delete(&self) -> Result<(), StorageError> {
        let delete = self
            .callbacks
            .delete
            .ok_or_else(|| StorageError::Unavailable("host store has no delete callback".into()))?;
        if delete(self.callbacks.context) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("host store rejected delete".into()))
        }
    }
}

impl Drop for CallbackTokenStore {
    fn drop(&mut self) {
        if let Some(release) = self.callbacks.release {
            release(self.callbacks.context);
        }
    }
}
