//! C-ABI wrapper around `rewards-core`.
//!
//! # Overview
//! Exposes the rewards API client through `extern "C"` functions so a mobile
//! host (Swift, Kotlin/JNI, Dart) can build and parse HTTP requests and
//! responses while performing the network I/O itself.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - One generic `rewards_build_request` / `rewards_parse_response` pair
//!   covers every endpoint. Bodies and payloads cross as JSON text.
//! - `FfiApiResponse` is the normalized envelope for every outcome: HTTP
//!   replies, host-reported network failures (`rewards_network_error`) and
//!   client-side failures such as null arguments.
//! - The C caller owns all returned pointers and must call the matching
//!   `rewards_free_*` function to release them.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use rewards_core::{
    ApiClient, ApiResponse, ClientConfig, HttpResponse, IdempotencyKey, RequestOptions, TokenHolder,
};
use serde_json::Value;

use types::*;

fn new_client(base_url: *const c_char, tokens: TokenHolder) -> Option<*mut FfiApiClient> {
    let config = if base_url.is_null() {
        ClientConfig::resolve(None)
    } else {
        ClientConfig::new(unsafe { borrow_str(base_url) }?)
    };
    let inner = ApiClient::new(config, Arc::new(tokens));
    Some(Box::into_raw(Box::new(FfiApiClient { inner })))
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client bound to `base_url`, keeping the token in memory only.
///
/// A null `base_url` resolves the default (`API_BASE_URL` or the local
/// development server). Returns null if `base_url` is not valid UTF-8 or if
/// an internal panic occurs. Free with `rewards_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_client_new(base_url: *const c_char) -> *mut FfiApiClient {
    catch_unwind(|| new_client(base_url, TokenHolder::in_memory()).unwrap_or(ptr::null_mut()))
        .unwrap_or(ptr::null_mut())
}

/// Create a client whose token is persisted through host callbacks.
///
/// `store.release` is invoked when the client is freed, or immediately if
/// creation fails.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_client_new_with_store(
    base_url: *const c_char,
    store: FfiTokenStore,
) -> *mut FfiApiClient {
    catch_unwind(AssertUnwindSafe(|| {
        let tokens = TokenHolder::new(CallbackTokenStore::new(store));
        new_client(base_url, tokens).unwrap_or(ptr::null_mut())
    }))
    .unwrap_or(ptr::null_mut())
}

/// Free a client created by `rewards_client_new*`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_client_free(client: *mut FfiApiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Set the resident token and persist it. A null `token` logs out locally.
///
/// Returns false when persistence failed; the in-memory token is updated
/// regardless. A token that is not valid UTF-8 is rejected with false and
/// leaves the resident token untouched.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_client_set_token(client: *const FfiApiClient, token: *const c_char) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return false;
        }
        let client = unsafe { &*client };
        if token.is_null() {
            return client.inner.set_token(None).is_ok();
        }
        match unsafe { borrow_str(token) } {
            Some(token) => client.inner.set_token(Some(token)).is_ok(),
            None => false,
        }
    }))
    .unwrap_or(false)
}

/// The resident token, or null. Free with `rewards_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_client_get_token(client: *const FfiApiClient) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return ptr::null_mut();
        }
        let client = unsafe { &*client };
        client.inner.get_token().map_or(ptr::null_mut(), to_c_string)
    }))
    .unwrap_or(ptr::null_mut())
}

/// Read the persisted token into memory (cold start). Returns it, or null.
/// Free with `rewards_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_client_load_token(client: *const FfiApiClient) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return ptr::null_mut();
        }
        let client = unsafe { &*client };
        client.inner.load_token().map_or(ptr::null_mut(), to_c_string)
    }))
    .unwrap_or(ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// Build the request for `method` on `path` (relative to the base URL).
///
/// `body_json` may be null. `skip_auth` omits the bearer token (login,
/// register). `idempotency_key` may be null; mutations then get a fresh key,
/// so pass the same key again when retrying a transfer.
///
/// Returns null if `client` or `path` is null, or if `body_json` or
/// `idempotency_key` is not valid. Free with `rewards_free_request`.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_build_request(
    client: *const FfiApiClient,
    method: FfiHttpMethod,
    path: *const c_char,
    body_json: *const c_char,
    skip_auth: bool,
    idempotency_key: *const c_char,
) -> *mut FfiHttpRequest {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return ptr::null_mut();
        }
        let client = unsafe { &*client };
        let Some(path) = (unsafe { borrow_str(path) }) else {
            return ptr::null_mut();
        };

        let body = if body_json.is_null() {
            None
        } else {
            let parsed = unsafe { borrow_str(body_json) }
                .and_then(|text| serde_json::from_str::<Value>(text).ok());
            match parsed {
                Some(value) => Some(value),
                None => return ptr::null_mut(),
            }
        };

        let mut options = RequestOptions::new();
        if skip_auth {
            options = options.skip_auth();
        }
        if !idempotency_key.is_null() {
            let key = unsafe { borrow_str(idempotency_key) }.and_then(IdempotencyKey::parse);
            match key {
                Some(key) => options = options.idempotency_key(&key),
                None => return ptr::null_mut(),
            }
        }

        match client.inner.build_request(method.into(), path, body.as_ref(), &options) {
            Ok(req) => FfiHttpRequest::from_core(req),
            Err(err) => {
                tracing::debug!(%err, "request not built");
                ptr::null_mut()
            }
        }
    }))
    .unwrap_or(ptr::null_mut())
}

/// Normalize the host's HTTP reply. A 401 evicts the resident token.
///
/// Never returns null: null arguments and internal panics produce a failure
/// envelope. Free with `rewards_free_response`.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_parse_response(
    client: *const FfiApiClient,
    response: *const FfiHttpResponse,
) -> *mut FfiApiResponse {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return FfiApiResponse::failure("null argument: client");
        }
        if response.is_null() {
            return FfiApiResponse::failure("null argument: response");
        }
        let client = unsafe { &*client };
        let resp = unsafe { &*response };
        let (body, lossy) = if resp.body.is_null() {
            (String::new(), false)
        } else {
            let bytes = unsafe { CStr::from_ptr(resp.body) }.to_bytes();
            match std::str::from_utf8(bytes) {
                Ok(text) => (text.to_string(), false),
                Err(_) => (String::from_utf8_lossy(bytes).into_owned(), true),
            }
        };
        let parsed: ApiResponse<Value> = client.inner.parse_response(HttpResponse::new(resp.status, body));
        if lossy && parsed.ok {
            // A corrupted body must not pass for a success.
            let mut failure = ApiResponse::unknown_error("response body is not valid UTF-8");
            failure.raw = parsed.raw;
            return FfiApiResponse::from_core(failure);
        }
        FfiApiResponse::from_core(parsed)
    }))
    .unwrap_or_else(|_| {
        tracing::error!("panic in rewards_parse_response");
        FfiApiResponse::failure("panic in rewards_parse_response")
    })
}

/// Envelope for a request that got no response (timeout, no connectivity).
/// Status is 0. Free with `rewards_free_response`.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_network_error(detail: *const c_char) -> *mut FfiApiResponse {
    catch_unwind(|| {
        let detail = unsafe { borrow_str(detail) }.unwrap_or("no response received");
        FfiApiResponse::from_core(ApiResponse::network_error(detail))
    })
    .unwrap_or_else(|_| FfiApiResponse::failure("panic in rewards_network_error"))
}

/// A fresh idempotency key, for hosts that retry a mutation themselves.
/// Free with `rewards_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_idempotency_key_new() -> *mut c_char {
    catch_unwind(|| to_c_string(IdempotencyKey::generate().to_string())).unwrap_or(ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a request returned by `rewards_build_request`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_free_request(req: *mut FfiHttpRequest) {
    if req.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let mut req = unsafe { Box::from_raw(req) };
        req.release_fields();
    }));
}

/// Free a response returned by `rewards_parse_response` or
/// `rewards_network_error`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_free_response(resp: *mut FfiApiResponse) {
    if resp.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let mut resp = unsafe { Box::from_raw(resp) };
        resp.release_fields();
    }));
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn rewards_free_string(s: *mut c_char) {
    let _ = catch_unwind(AssertUnwindSafe(|| drop_c_string(s)));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
