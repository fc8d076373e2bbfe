//! Client flows against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port (fresh seeded
//! state), then drives the client over real HTTP with `UreqTransport`.
//! Covers the envelope scenarios end-to-end plus the transport failure modes
//! that only a real socket can produce.

use std::sync::Arc;
use std::time::Duration;

use rewards_core::auth::{self, UsernameChecker};
use rewards_core::engagement::{self, LikeState};
use rewards_core::wallet;
use rewards_core::{
    ApiClient, ApiError, ClientConfig, Credentials, FileTokenStore, IdempotencyKey, Registration,
    TokenHolder, TokenStore, TransferRequest, UreqTransport, Wallet,
};
use serde_json::Value;

/// Start the mock server on a random port and return the API base URL.
fn spawn_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}/api")
}

fn client(base_url: &str) -> ApiClient<UreqTransport> {
    ApiClient::connect(ClientConfig::new(base_url), Arc::new(TokenHolder::in_memory()))
}

fn alice() -> Credentials {
    Credentials {
        email: "alice@example.com".to_string(),
        password: "secret".to_string(),
    }
}

#[test]
fn login_sets_resident_token() {
    let client = client(&spawn_server());
    assert_eq!(client.get_token(), None);

    let response = auth::login(&client, &alice());
    assert!(response.ok);
    assert_eq!(response.status, 200);
    assert_eq!(client.get_token().as_deref(), Some("t1"));
    assert_eq!(response.data.unwrap().user.username, "alice");
}

#[test]
fn wallet_with_valid_token() {
    let client = client(&spawn_server());
    auth::login(&client, &alice());

    let response = client.get::<Value>("/v1/wallets/me");
    assert!(response.ok);
    let data = response.data.unwrap();
    assert_eq!(data["balance"], 10);
    assert_eq!(data["primary_coin"], "FCN");

    let typed: Wallet = wallet::my_wallet(&client).into_result().unwrap();
    assert_eq!(typed.balance, 10);
}

#[test]
fn invalid_amount_is_surfaced_verbatim() {
    let client = client(&spawn_server());
    auth::login(&client, &alice());

    let request = TransferRequest {
        to: "bob".to_string(),
        amount: 0,
    };
    let response = wallet::transfer(&client, &request, &IdempotencyKey::generate());
    assert!(!response.ok);
    assert_eq!(response.status, 422);
    let errors = response.errors.clone().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].detail.as_deref(), Some("Invalid amount"));
    assert!(matches!(
        response.into_result(),
        Err(ApiError::Client { status: 422, .. })
    ));
}

#[test]
fn unauthorized_evicts_memory_and_storage() {
    let base_url = spawn_server();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token");
    let tokens = Arc::new(TokenHolder::new(FileTokenStore::new(&path)));
    let client = ApiClient::connect(ClientConfig::new(&base_url), tokens);

    client.set_token(Some("forged")).unwrap();
    assert_eq!(FileTokenStore::new(&path).load().as_deref(), Some("forged"));

    let response = client.get::<Value>("/v1/me");
    assert_eq!(response.status, 401);
    assert!(!response.ok);
    assert_eq!(client.get_token(), None);
    assert_eq!(FileTokenStore::new(&path).load(), None);
}

#[test]
fn transfer_retry_with_same_key_debits_once() {
    let client = client(&spawn_server());
    auth::login(&client, &alice());

    let key = IdempotencyKey::generate();
    let request = TransferRequest {
        to: "bob".to_string(),
        amount: 4,
    };
    let first = wallet::transfer(&client, &request, &key).into_result().unwrap();
    let second = wallet::transfer(&client, &request, &key).into_result().unwrap();
    assert_eq!(first, second);

    let balance = wallet::my_wallet(&client).into_result().unwrap().balance;
    assert_eq!(balance, 6);

    let history = wallet::transfers(&client, 1, 20);
    assert_eq!(history.meta_u64("total"), Some(1));
}

#[test]
fn register_like_and_logout() {
    let client = client(&spawn_server());

    let checker = UsernameChecker::new();
    let lookup = checker.check(&client, "carol").unwrap();
    assert!(lookup.data.unwrap().available);

    let registration = Registration {
        email: "carol@example.com".to_string(),
        username: "carol".to_string(),
        password: "secret1".to_string(),
    };
    let session = auth::register(&client, &registration).into_result().unwrap();
    assert_eq!(client.get_token(), Some(session.token));

    let me = auth::current_user(&client).into_result().unwrap();
    assert_eq!(me.username, "carol");

    let mut state = LikeState::new(false, 3);
    let response = engagement::toggle_like(&client, "p1", &mut state);
    assert!(response.ok);
    assert_eq!(state, LikeState::new(true, 4));

    let mut missing = LikeState::new(false, 0);
    engagement::toggle_like(&client, "nope", &mut missing);
    assert_eq!(missing, LikeState::new(false, 0));

    let response = auth::logout(&client);
    assert!(response.ok);
    assert_eq!(client.get_token(), None);
}

#[test]
fn connection_refused_is_network_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = client(&format!("http://{addr}/api"));

    let response = client.get::<Value>("/v1/me");
    assert!(!response.ok);
    assert_eq!(response.status, 0);
    assert_eq!(
        response.errors.as_ref().unwrap()[0].title.as_deref(),
        Some("Network Error")
    );
}

#[test]
fn silent_server_times_out_as_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        // Accept and hold connections without ever answering.
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });

    let config = ClientConfig::new(&format!("http://{addr}/api")).with_timeout(Duration::from_millis(300));
    let client = ApiClient::connect(config, Arc::new(TokenHolder::in_memory()));

    let response = client.get::<Value>("/v1/me");
    assert!(!response.ok);
    assert_eq!(response.status, 0);
    assert!(matches!(response.into_result(), Err(ApiError::Network { .. })));
}
