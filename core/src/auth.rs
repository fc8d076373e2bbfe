//! Login, registration, logout and username lookup.
//!
//! Login and register go out without an `Authorization` header. On success
//! the returned token becomes the resident token; the client never does this
//! on its own.

use serde_json::{json, Value};

use crate::client::{ApiClient, RequestOptions};
use crate::latest::LatestWins;
use crate::response::ApiResponse;
use crate::transport::Transport;
use crate::types::{AuthSession, Credentials, Registration, User, UsernameAvailability};

pub fn login<X: Transport>(client: &ApiClient<X>, credentials: &Credentials) -> ApiResponse<AuthSession> {
    let response = client.post_with("/v1/auth/login", credentials, &RequestOptions::new().skip_auth());
    adopt_session(client, &response);
    response
}

pub fn register<X: Transport>(
    client: &ApiClient<X>,
    registration: &Registration,
) -> ApiResponse<AuthSession> {
    let response = client.post_with(
        "/v1/auth/register",
        registration,
        &RequestOptions::new().skip_auth(),
    );
    adopt_session(client, &response);
    response
}

/// Revoke the session server-side and drop the resident token. The token is
/// dropped even when the server call fails.
pub fn logout<X: Transport>(client: &ApiClient<X>) -> ApiResponse<Value> {
    let response = client.post("/v1/auth/logout", &json!({}));
    if let Err(err) = client.set_token(None) {
        tracing::warn!(%err, "failed to delete persisted token on logout");
    }
    response
}

pub fn current_user<X: Transport>(client: &ApiClient<X>) -> ApiResponse<User> {
    client.get("/v1/me")
}

pub fn check_username<X: Transport>(client: &ApiClient<X>, username: &str) -> ApiResponse<UsernameAvailability> {
    let query: String = url::form_urlencoded::byte_serialize(username.trim().as_bytes()).collect();
    client.get_with(
        &format!("/v1/users/username-available?username={query}"),
        &RequestOptions::new().skip_auth(),
    )
}

/// Username availability lookups where only the newest answer counts.
///
/// Each keystroke (after the host's debounce) calls `check`. A lookup that
/// resolves after a newer one was started yields `None`.
#[derive(Debug, Default)]
pub struct UsernameChecker {
    guard: LatestWins,
}

impl UsernameChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check<X: Transport>(
        &self,
        client: &ApiClient<X>,
        username: &str,
    ) -> Option<ApiResponse<UsernameAvailability>> {
        if username.trim().is_empty() {
            self.guard.invalidate();
            return None;
        }
        self.guard.run(|| check_username(client, username))
    }

    /// Drop any lookup still in flight.
    pub fn cancel(&self) {
        self.guard.invalidate();
    }
}

fn adopt_session<X>(client: &ApiClient<X>, response: &ApiResponse<AuthSession>) {
    if let (true, Some(session)) = (response.ok, response.data.as_ref()) {
        if let Err(err) = client.set_token(Some(&session.token)) {
            tracing::warn!(%err, "session token kept in memory only");
        }
    }
}
