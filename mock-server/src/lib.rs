//! Stub of the rewards backend used by the client's integration tests.
//!
//! Every body is a JSON envelope: `{ "data": ... }` on success and
//! `{ "errors": [{ title, detail, code, source }] }` on failure. Only the
//! endpoints the client exercises are implemented, with just enough state to
//! make them behave: seeded accounts, bearer sessions, wallet balances,
//! idempotent transfers and post likes.
//!
//! Routes are mounted under `/api`, matching the client's default base URL.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const PRIMARY_COIN: &str = "FCN";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TransferInput {
    pub to: String,
    pub amount: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount: u64,
}

#[derive(Deserialize)]
pub struct UsernameQuery {
    #[serde(default)]
    pub username: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

struct Account {
    user: User,
    password: String,
    balance: u64,
}

#[derive(Default)]
struct Post {
    liked_by: HashSet<String>,
    base_likes: u64,
}

/// Backend state. Tokens are `t1`, `t2`, ... in issue order.
#[derive(Default)]
pub struct Store {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, String>,
    posts: HashMap<String, Post>,
    transfers: Vec<TransferRecord>,
    replays: HashMap<(String, String), (StatusCode, Value)>,
    issued_tokens: u64,
}

impl Store {
    /// Two accounts and one post:
    /// - `alice@example.com` / `secret`, balance 10
    /// - `bob@example.com` / `hunter22`, balance 0
    /// - post `p1` with 3 likes
    pub fn seeded() -> Self {
        let mut store = Store::default();
        store.add_account("u1", "alice", "alice@example.com", "secret", 10);
        store.add_account("u2", "bob", "bob@example.com", "hunter22", 0);
        store.posts.insert(
            "p1".to_string(),
            Post {
                base_likes: 3,
                ..Post::default()
            },
        );
        store
    }

    fn add_account(&mut self, id: &str, username: &str, email: &str, password: &str, balance: u64) {
        self.accounts.insert(
            id.to_string(),
            Account {
                user: User {
                    id: id.to_string(),
                    username: username.to_string(),
                    email: email.to_string(),
                    display_name: None,
                },
                password: password.to_string(),
                balance,
            },
        );
    }

    fn issue_token(&mut self, user_id: &str) -> String {
        self.issued_tokens += 1;
        let token = format!("t{}", self.issued_tokens);
        self.sessions.insert(token.clone(), user_id.to_string());
        token
    }

    fn find_by_email(&self, email: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.user.email.eq_ignore_ascii_case(email))
    }

    fn find_by_username(&self, username: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.user.username.eq_ignore_ascii_case(username))
    }
}

pub type Db = Arc<RwLock<Store>>;

type Reply = (StatusCode, Json<Value>);

pub fn app() -> Router {
    app_with(Store::seeded())
}

pub fn app_with(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    let routes = Router::new()
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/logout", post(logout))
        .route("/v1/me", get(me))
        .route("/v1/users/username-available", get(username_available))
        .route("/v1/wallets/me", get(wallet))
        .route("/v1/wallets/me/transfers", get(list_transfers))
        .route("/v1/wallets/transfer", post(transfer))
        .route("/v1/posts/{id}/like", post(like).delete(unlike));
    Router::new().nest("/api", routes).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn data(status: StatusCode, data: Value) -> Reply {
    (status, Json(json!({ "data": data })))
}

fn error(status: StatusCode, title: &str, detail: &str) -> Reply {
    (
        status,
        Json(json!({ "errors": [{ "title": title, "detail": detail, "code": status.as_u16() }] })),
    )
}

fn invalid(pointer: &str, code: &str, detail: &str) -> Reply {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "errors": [{
            "title": "Validation failed",
            "detail": detail,
            "code": code,
            "source": { "pointer": pointer },
        }] })),
    )
}

/// Resolve the bearer token to a user id.
fn authenticate(store: &Store, headers: &HeaderMap) -> Result<String, Reply> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| store.sessions.get(token))
        .cloned()
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized", "Invalid or expired token"))
}

fn session_body(token: &str, user: &User) -> Value {
    json!({ "token": token, "user": user })
}

async fn login(State(db): State<Db>, Json(input): Json<LoginInput>) -> Reply {
    let mut store = db.write().await;
    let Some(account) = store
        .find_by_email(&input.email)
        .filter(|a| a.password == input.password)
    else {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Login failed",
            "Invalid email or password",
        );
    };
    let user = account.user.clone();
    let token = store.issue_token(&user.id);
    tracing::info!(user = %user.id, "login");
    data(StatusCode::OK, session_body(&token, &user))
}

async fn register(State(db): State<Db>, Json(input): Json<RegisterInput>) -> Reply {
    let mut store = db.write().await;
    if !input.email.contains('@') {
        return invalid("/email", "invalid_email", "Email is invalid");
    }
    if input.username.trim().is_empty() {
        return invalid("/username", "blank", "Username can't be blank");
    }
    if input.password.len() < 6 {
        return invalid("/password", "too_short", "Password is too short");
    }
    if store.find_by_email(&input.email).is_some() {
        return invalid("/email", "taken", "Email is already registered");
    }
    if store.find_by_username(&input.username).is_some() {
        return invalid("/username", "taken", "Username is already taken");
    }

    let id = Uuid::new_v4().to_string();
    store.add_account(&id, input.username.trim(), &input.email, &input.password, 0);
    let token = store.issue_token(&id);
    let user = store.accounts[&id].user.clone();
    tracing::info!(user = %id, "registered");
    data(StatusCode::CREATED, session_body(&token, &user))
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let mut store = db.write().await;
    if let Err(reply) = authenticate(&store, &headers) {
        return reply;
    }
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    store.sessions.remove(&token);
    (StatusCode::OK, Json(json!({ "meta": { "revoked": true } })))
}

async fn me(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let store = db.read().await;
    match authenticate(&store, &headers) {
        Ok(user_id) => data(StatusCode::OK, json!(store.accounts[&user_id].user)),
        Err(reply) => reply,
    }
}

async fn username_available(State(db): State<Db>, Query(query): Query<UsernameQuery>) -> Reply {
    let username = query.username.trim();
    if username.is_empty() {
        return invalid("/username", "blank", "Username can't be blank");
    }
    let store = db.read().await;
    let available = store.find_by_username(username).is_none();
    data(StatusCode::OK, json!({ "username": username, "available": available }))
}

async fn wallet(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let store = db.read().await;
    match authenticate(&store, &headers) {
        Ok(user_id) => data(
            StatusCode::OK,
            json!({ "balance": store.accounts[&user_id].balance, "primary_coin": PRIMARY_COIN }),
        ),
        Err(reply) => reply,
    }
}

async fn list_transfers(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Reply {
    let store = db.read().await;
    let user_id = match authenticate(&store, &headers) {
        Ok(user_id) => user_id,
        Err(reply) => return reply,
    };
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let mine: Vec<&TransferRecord> = store
        .transfers
        .iter()
        .rev()
        .filter(|t| t.from == user_id)
        .collect();
    let items: Vec<Value> = mine
        .iter()
        .skip(page.saturating_sub(1).saturating_mul(per_page))
        .take(per_page)
        .map(|t| {
            json!({
                "id": t.id,
                "to": store.accounts.get(&t.to).map(|a| a.user.username.clone()).unwrap_or_default(),
                "amount": t.amount,
                "balance": store.accounts[&user_id].balance,
            })
        })
        .collect();
    (
        StatusCode::OK,
        Json(json!({
            "data": items,
            "meta": { "page": page, "per_page": per_page, "total": mine.len() },
        })),
    )
}

async fn transfer(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<TransferInput>,
) -> Reply {
    let mut store = db.write().await;
    let user_id = match authenticate(&store, &headers) {
        Ok(user_id) => user_id,
        Err(reply) => return reply,
    };
    let Some(key) = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
    else {
        return error(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "Idempotency-Key header is required",
        );
    };

    let replay_key = (user_id.clone(), key);
    if let Some((status, body)) = store.replays.get(&replay_key) {
        tracing::info!(user = %user_id, "replayed transfer");
        return (*status, Json(body.clone()));
    }

    let reply = apply_transfer(&mut store, &user_id, &input);
    let (status, Json(body)) = reply;
    store.replays.insert(replay_key, (status, body.clone()));
    (status, Json(body))
}

fn apply_transfer(store: &mut Store, from: &str, input: &TransferInput) -> Reply {
    let amount = match u64::try_from(input.amount) {
        Ok(amount) if amount > 0 => amount,
        _ => return invalid("/amount", "invalid_amount", "Invalid amount"),
    };
    let Some(to) = store
        .find_by_username(&input.to)
        .map(|a| a.user.id.clone())
        .filter(|to| to != from)
    else {
        return invalid("/to", "unknown_recipient", "Unknown recipient");
    };
    let balance = store.accounts[from].balance;
    if balance < amount {
        return invalid("/amount", "insufficient_balance", "Insufficient balance");
    }

    if let Some(sender) = store.accounts.get_mut(from) {
        sender.balance -= amount;
    }
    if let Some(recipient) = store.accounts.get_mut(&to) {
        recipient.balance += amount;
    }
    let record = TransferRecord {
        id: Uuid::new_v4().to_string(),
        from: from.to_string(),
        to,
        amount,
    };
    store.transfers.push(record.clone());
    data(
        StatusCode::CREATED,
        json!({
            "id": record.id,
            "to": input.to,
            "amount": amount,
            "balance": store.accounts[from].balance,
        }),
    )
}

async fn like(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    set_like(db, headers, id, true).await
}

async fn unlike(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> Reply {
    set_like(db, headers, id, false).await
}

async fn set_like(db: Db, headers: HeaderMap, id: String, liked: bool) -> Reply {
    let mut store = db.write().await;
    let user_id = match authenticate(&store, &headers) {
        Ok(user_id) => user_id,
        Err(reply) => return reply,
    };
    let Some(post) = store.posts.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Not Found", "Post not found");
    };
    if liked {
        post.liked_by.insert(user_id);
    } else {
        post.liked_by.remove(&user_id);
    }
    let like_count = post.base_likes + post.liked_by.len() as u64;
    data(StatusCode::OK, json!({ "liked": liked, "like_count": like_count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_store_has_accounts_and_post() {
        let store = Store::seeded();
        assert_eq!(store.find_by_email("ALICE@example.com").unwrap().balance, 10);
        assert!(store.find_by_username("bob").is_some());
        assert!(store.posts.contains_key("p1"));
    }

    #[test]
    fn tokens_are_issued_in_order() {
        let mut store = Store::seeded();
        assert_eq!(store.issue_token("u1"), "t1");
        assert_eq!(store.issue_token("u2"), "t2");
        assert_eq!(store.sessions.get("t2").map(String::as_str), Some("u2"));
    }

    #[test]
    fn transfer_rejects_non_positive_amounts() {
        let mut store = Store::seeded();
        for amount in [0, -5] {
            let (status, Json(body)) = apply_transfer(
                &mut store,
                "u1",
                &TransferInput {
                    to: "bob".to_string(),
                    amount,
                },
            );
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(body["errors"][0]["detail"], "Invalid amount");
        }
        assert_eq!(store.accounts["u1"].balance, 10);
    }

    #[test]
    fn transfer_moves_balance() {
        let mut store = Store::seeded();
        let (status, Json(body)) = apply_transfer(
            &mut store,
            "u1",
            &TransferInput {
                to: "bob".to_string(),
                amount: 4,
            },
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["balance"], 6);
        assert_eq!(store.accounts["u2"].balance, 4);
    }

    #[test]
    fn transfer_to_self_is_rejected() {
        let mut store = Store::seeded();
        let (status, Json(body)) = apply_transfer(
            &mut store,
            "u1",
            &TransferInput {
                to: "alice".to_string(),
                amount: 1,
            },
        );
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["code"], "unknown_recipient");
    }

    #[test]
    fn login_input_requires_password() {
        let result: Result<LoginInput, _> = serde_json::from_str(r#"{"email":"a@b.c"}"#);
        assert!(result.is_err());
    }
}
