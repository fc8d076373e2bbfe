//! Wallet balance, transfers and transfer history.

use crate::client::{ApiClient, RequestOptions};
use crate::http::HttpMethod;
use crate::idempotency::IdempotencyKey;
use crate::response::ApiResponse;
use crate::transport::Transport;
use crate::types::{Transfer, TransferRequest, Wallet};

pub fn my_wallet<X: Transport>(client: &ApiClient<X>) -> ApiResponse<Wallet> {
    client.get("/v1/wallets/me")
}

/// Send coins to another user.
///
/// The caller owns `key`: generate it once per logical transfer and pass the
/// same key again if the user retries after a network error, so the backend
/// debits at most once.
pub fn transfer<X: Transport>(
    client: &ApiClient<X>,
    request: &TransferRequest,
    key: &IdempotencyKey,
) -> ApiResponse<Transfer> {
    client.request(
        HttpMethod::Post,
        "/v1/wallets/transfer",
        Some(request),
        &RequestOptions::new().idempotency_key(key),
    )
}

/// One page of past transfers, newest first. `meta` carries `page`,
/// `per_page` and `total`.
pub fn transfers<X: Transport>(client: &ApiClient<X>, page: u32, per_page: u32) -> ApiResponse<Vec<Transfer>> {
    client.get(&format!(
        "/v1/wallets/me/transfers?page={}&per_page={}",
        page.max(1),
        per_page.clamp(1, 100)
    ))
}
