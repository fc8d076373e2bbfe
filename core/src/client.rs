//! Request builder, response normalizer and the `request` chokepoint.
//!
//! # Design
//! `ApiClient` keeps the host-does-IO split: `build_request`
//! produces an `HttpRequest` and `parse_response` consumes an `HttpResponse`,
//! neither touching the network. When the client owns a `Transport`,
//! `request` and the `get`/`post`/... wrappers run the round-trip in between
//! and fold every failure into an `ApiResponse`.
//!
//! The resident token lives in a shared `TokenHolder`. It is attached to
//! every request unless the caller opts out, and it is evicted process-wide
//! whenever any response comes back 401.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::{ApiError, StorageError, TransportError};
use crate::http::{find_header, HttpMethod, HttpRequest, HttpResponse};
use crate::idempotency::{IdempotencyKey, IDEMPOTENCY_HEADER};
use crate::response::ApiResponse;
use crate::token::TokenHolder;
use crate::transport::Transport;

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Omit the `Authorization` header (login, register).
    pub skip_auth: bool,
    /// Extra headers. An `Authorization` or `Idempotency-Key` set here wins
    /// over the generated one.
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Reuse `key` so a retried mutation is collapsed by the backend.
    pub fn idempotency_key(self, key: &IdempotencyKey) -> Self {
        self.header(IDEMPOTENCY_HEADER, key.as_str())
    }
}

/// Client for the rewards backend.
///
/// `X` is the transport. `ApiClient<()>` only builds and parses, for hosts
/// that perform the I/O themselves.
#[derive(Debug, Clone)]
pub struct ApiClient<X = ()> {
    config: ClientConfig,
    tokens: Arc<TokenHolder>,
    transport: X,
}

impl ApiClient<()> {
    pub fn new(config: ClientConfig, tokens: Arc<TokenHolder>) -> Self {
        Self {
            config,
            tokens,
            transport: (),
        }
    }

    pub fn with_transport<X: Transport>(self, transport: X) -> ApiClient<X> {
        ApiClient {
            config: self.config,
            tokens: self.tokens,
            transport,
        }
    }
}

#[cfg(feature = "ureq")]
impl ApiClient<crate::transport::UreqTransport> {
    /// Client that performs blocking HTTP with the configured timeout.
    pub fn connect(config: ClientConfig, tokens: Arc<TokenHolder>) -> Self {
        let transport = crate::transport::UreqTransport::new(config.timeout);
        ApiClient::new(config, tokens).with_transport(transport)
    }
}

impl<X> ApiClient<X> {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenHolder> {
        &self.tokens
    }

    /// Set (or with `None`, clear) the resident token and persist it.
    pub fn set_token(&self, token: Option<&str>) -> Result<(), StorageError> {
        self.tokens.set(token)
    }

    /// Read the persisted token into memory. Failures yield `None`.
    pub fn load_token(&self) -> Option<String> {
        self.tokens.load()
    }

    pub fn get_token(&self) -> Option<String> {
        self.tokens.get()
    }

    /// Build the outgoing request for `path` relative to the base URL.
    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> Result<HttpRequest, ApiError> {
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::Unexpected {
                detail: format!("failed to serialize request body: {e}"),
            })?;

        let mut headers = options.headers.clone();
        push_default(&mut headers, "accept", || "application/json".to_string());
        if body.is_some() {
            push_default(&mut headers, "content-type", || "application/json".to_string());
        }
        if !options.skip_auth {
            if let Some(token) = self.tokens.get() {
                push_default(&mut headers, "authorization", || format!("Bearer {token}"));
            }
        }
        if method.is_mutating() {
            push_default(&mut headers, IDEMPOTENCY_HEADER, || {
                IdempotencyKey::generate().to_string()
            });
        }

        Ok(HttpRequest {
            method,
            url: format!("{}{}", self.config.base_url, normalize_path(path)),
            headers,
            body,
        })
    }

    /// Normalize a response. A 401 evicts the resident token.
    pub fn parse_response<T: DeserializeOwned>(&self, response: HttpResponse) -> ApiResponse<T> {
        if response.status == 401 {
            self.tokens.evict();
        }
        ApiResponse::from_http(response.status, &response.body)
    }
}

impl<X: Transport> ApiClient<X> {
    /// Execute one call. Always resolves to an `ApiResponse`; no retries.
    pub fn request<T, B>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = match self.build_request(method, path, body, options) {
            Ok(request) => request,
            Err(err) => return ApiResponse::unknown_error(err.message()),
        };
        tracing::debug!(%method, url = %request.url, "api request");

        match self.transport.execute(&request, self.config.timeout) {
            Ok(response) => {
                tracing::debug!(%method, url = %request.url, status = response.status, "api response");
                self.parse_response(response)
            }
            Err(TransportError::NoResponse(detail)) => {
                tracing::debug!(%method, url = %request.url, %detail, "no response");
                ApiResponse::network_error(detail)
            }
            Err(TransportError::Other(detail)) => {
                tracing::debug!(%method, url = %request.url, %detail, "transport failure");
                ApiResponse::unknown_error(detail)
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.get_with(path, &RequestOptions::default())
    }

    pub fn get_with<T: DeserializeOwned>(&self, path: &str, options: &RequestOptions) -> ApiResponse<T> {
        self.request::<T, ()>(HttpMethod::Get, path, None, options)
    }

    pub fn post<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_with(path, body, &RequestOptions::default())
    }

    pub fn post_with<T, B>(&self, path: &str, body: &B, options: &RequestOptions) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Post, path, Some(body), options)
    }

    pub fn put<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Put, path, Some(body), &RequestOptions::default())
    }

    pub fn patch<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(HttpMethod::Patch, path, Some(body), &RequestOptions::default())
    }

    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.request::<T, ()>(HttpMethod::Delete, path, None, &RequestOptions::default())
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn push_default(headers: &mut Vec<(String, String)>, name: &str, value: impl FnOnce() -> String) {
    if find_header(headers, name).is_none() {
        headers.push((name.to_string(), value()));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use rstest::rstest;
    use serde_json::{json, Value};

    use super::*;
    use crate::token::MemoryTokenStore;

    /// Transport that replays canned results and records what it was sent.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        pub(crate) sent: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn replying(status: u16, body: &str) -> Self {
            let transport = Self::default();
            transport.push(Ok(HttpResponse::new(status, body)));
            transport
        }

        pub(crate) fn push(&self, reply: Result<HttpResponse, TransportError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub(crate) fn last_sent(&self) -> HttpRequest {
            self.sent.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: &HttpRequest, _timeout: Duration) -> Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("no scripted reply".to_string())))
        }
    }

    pub(crate) fn client_with(transport: ScriptedTransport) -> ApiClient<Arc<ScriptedTransport>> {
        client_sharing(Arc::new(transport))
    }

    pub(crate) fn client_sharing(transport: Arc<ScriptedTransport>) -> ApiClient<Arc<ScriptedTransport>> {
        let tokens = Arc::new(TokenHolder::in_memory());
        ApiClient::new(ClientConfig::new("http://localhost:8000/api"), tokens).with_transport(transport)
    }

    fn host_client() -> ApiClient {
        ApiClient::new(ClientConfig::new("http://localhost:8000/api/"), Arc::new(TokenHolder::in_memory()))
    }

    #[test]
    fn path_gets_leading_slash_and_base_is_trimmed() {
        let client = host_client();
        let a = client.build_request::<()>(HttpMethod::Get, "v1/me", None, &RequestOptions::default()).unwrap();
        let b = client.build_request::<()>(HttpMethod::Get, "/v1/me", None, &RequestOptions::default()).unwrap();
        assert_eq!(a.url, "http://localhost:8000/api/v1/me");
        assert_eq!(a.url, b.url);
    }

    #[test]
    fn get_without_token_has_no_auth_or_key() {
        let req = host_client()
            .build_request::<()>(HttpMethod::Get, "/v1/feed", None, &RequestOptions::default())
            .unwrap();
        assert_eq!(req.headers, vec![("accept".to_string(), "application/json".to_string())]);
        assert!(req.body.is_none());
    }

    #[test]
    fn resident_token_is_attached() {
        let client = host_client();
        client.set_token(Some("abc")).unwrap();
        let req = client
            .build_request::<()>(HttpMethod::Get, "/v1/me", None, &RequestOptions::default())
            .unwrap();
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
    }

    #[test]
    fn skip_auth_omits_token() {
        let client = host_client();
        client.set_token(Some("abc")).unwrap();
        let req = client
            .build_request(
                HttpMethod::Post,
                "/v1/auth/login",
                Some(&json!({"email": "a@b.c"})),
                &RequestOptions::new().skip_auth(),
            )
            .unwrap();
        assert_eq!(req.header("authorization"), None);
        assert_eq!(req.header("content-type"), Some("application/json"));
    }

    #[test]
    fn caller_authorization_is_not_overridden() {
        let client = host_client();
        client.set_token(Some("abc")).unwrap();
        let options = RequestOptions::new().header("Authorization", "Bearer other");
        let req = client.build_request::<()>(HttpMethod::Get, "/v1/me", None, &options).unwrap();
        let auth: Vec<_> = req.headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case("authorization")).collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(req.header("authorization"), Some("Bearer other"));
    }

    #[rstest]
    #[case(HttpMethod::Post)]
    #[case(HttpMethod::Put)]
    #[case(HttpMethod::Patch)]
    #[case(HttpMethod::Delete)]
    fn mutating_requests_carry_exactly_one_key(#[case] method: HttpMethod) {
        let req = host_client()
            .build_request::<()>(method, "/v1/posts/1/like", None, &RequestOptions::default())
            .unwrap();
        let keys: Vec<_> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(IDEMPOTENCY_HEADER))
            .collect();
        assert_eq!(keys.len(), 1);
        assert!(!keys[0].1.is_empty());
    }

    #[test]
    fn caller_supplied_key_is_reused() {
        let key = IdempotencyKey::parse("retry-key-1").unwrap();
        let options = RequestOptions::new().header("idempotency-key", key.as_str());
        let client = host_client();
        for _ in 0..2 {
            let req = client
                .build_request(HttpMethod::Post, "/v1/wallets/transfer", Some(&json!({"amount": 1})), &options)
                .unwrap();
            let keys: Vec<_> = req
                .headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(IDEMPOTENCY_HEADER))
                .collect();
            assert_eq!(keys.len(), 1);
            assert_eq!(keys[0].1, "retry-key-1");
        }
    }

    #[test]
    fn generated_keys_differ_between_calls() {
        let client = host_client();
        let a = client.build_request::<()>(HttpMethod::Post, "/x", None, &RequestOptions::default()).unwrap();
        let b = client.build_request::<()>(HttpMethod::Post, "/x", None, &RequestOptions::default()).unwrap();
        assert_ne!(a.header(IDEMPOTENCY_HEADER), b.header(IDEMPOTENCY_HEADER));
    }

    #[test]
    fn parse_401_evicts_token_in_memory_and_storage() {
        let tokens = Arc::new(TokenHolder::new(MemoryTokenStore::with_token("stale")));
        let client = ApiClient::new(ClientConfig::default(), tokens);
        assert_eq!(client.load_token().as_deref(), Some("stale"));

        let response: ApiResponse<Value> =
            client.parse_response(HttpResponse::new(401, r#"{"errors":[{"title":"Unauthorized"}]}"#));
        assert!(!response.ok);
        assert_eq!(client.get_token(), None);
        assert_eq!(client.load_token(), None);
    }

    #[test]
    fn request_returns_wallet_data() {
        let transport = ScriptedTransport::replying(200, r#"{"data":{"balance":10,"primary_coin":"FCN"}}"#);
        let client = client_with(transport);
        client.set_token(Some("t1")).unwrap();

        let response: ApiResponse<Value> = client.get("/v1/wallets/me");
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["balance"], 10);
        assert_eq!(data["primary_coin"], "FCN");
    }

    #[test]
    fn no_response_becomes_network_error() {
        let transport = ScriptedTransport::default();
        transport.push(Err(TransportError::NoResponse("connection refused".to_string())));
        let client = client_with(transport);

        let response: ApiResponse<Value> = client.get("/v1/me");
        assert!(!response.ok);
        assert_eq!(response.status, 0);
        assert_eq!(
            response.errors.as_ref().unwrap()[0].title.as_deref(),
            Some("Network Error")
        );
    }

    #[test]
    fn other_transport_failure_becomes_unknown_error() {
        let transport = ScriptedTransport::default();
        transport.push(Err(TransportError::Other("too many redirects".to_string())));
        let client = client_with(transport);

        let response: ApiResponse<Value> = client.delete("/v1/posts/1/like");
        assert_eq!(response.status, 500);
        assert_eq!(
            response.errors.as_ref().unwrap()[0].title.as_deref(),
            Some("Unknown error")
        );
    }

    #[test]
    fn unserializable_body_becomes_unknown_error() {
        use std::collections::BTreeMap;

        // JSON object keys must be strings.
        let mut body = BTreeMap::new();
        body.insert(vec![1u8], 1);
        let transport = Arc::new(ScriptedTransport::default());
        let client = ApiClient::new(ClientConfig::default(), Arc::new(TokenHolder::in_memory()))
            .with_transport(transport.clone());

        let response: ApiResponse<Value> = client.post("/v1/x", &body);
        assert_eq!(response.status, 500);
        assert!(!response.ok);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn any_401_evicts_regardless_of_call() {
        let transport = ScriptedTransport::replying(401, "");
        let store = MemoryTokenStore::with_token("t1");
        let tokens = Arc::new(TokenHolder::new(store));
        tokens.load();
        let client = ApiClient::new(ClientConfig::default(), tokens.clone()).with_transport(transport);

        let response: ApiResponse<Value> = client.patch("/v1/profile", &json!({"bio": "hi"}));
        assert_eq!(response.status, 401);
        assert_eq!(tokens.get(), None);
    }

    #[test]
    fn sent_request_carries_token_and_key() {
        let transport = Arc::new(ScriptedTransport::replying(201, r#"{"data":{"liked":true}}"#));
        let client = ApiClient::new(ClientConfig::default(), Arc::new(TokenHolder::in_memory()))
            .with_transport(transport.clone());
        client.set_token(Some("abc")).unwrap();

        let response: ApiResponse<Value> = client.post("/v1/posts/7/like", &json!({}));
        assert!(response.ok);
        let sent = transport.last_sent();
        assert_eq!(sent.header("authorization"), Some("Bearer abc"));
        assert!(sent.header(IDEMPOTENCY_HEADER).is_some());
        assert_eq!(sent.url, "http://localhost:8000/api/v1/posts/7/like");
    }
}
