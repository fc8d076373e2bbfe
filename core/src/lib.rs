//! API client core for the creator rewards app.
//!
//! # Overview
//! Every backend call goes through `ApiClient`, which attaches the resident
//! bearer token and an `Idempotency-Key` for mutations, and normalizes every
//! outcome (success, HTTP error, network failure, client failure) into one
//! `ApiResponse` shape. A 401 from any call evicts the resident token.
//!
//! # Design
//! - Host-does-IO split: `build_request` produces an `HttpRequest`,
//!   `parse_response` consumes an `HttpResponse`. `request` composes them
//!   over a `Transport` (`UreqTransport` with the default `ureq` feature).
//! - The resident token lives in a shared `TokenHolder` backed by a
//!   `TokenStore`, so tests swap in memory storage and mobile hosts plug in
//!   their keychain.
//! - Feature helpers (`auth`, `wallet`, `engagement`) hold the per-screen
//!   patterns: login adopting the token, idempotent transfers, optimistic
//!   likes with rollback.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod client;
pub mod config;
pub mod deeplink;
pub mod engagement;
pub mod error;
pub mod http;
pub mod idempotency;
pub mod latest;
pub mod response;
pub mod token;
pub mod transport;
pub mod types;
pub mod wallet;

pub use client::{ApiClient, RequestOptions};
pub use config::ClientConfig;
pub use deeplink::DeepLink;
pub use error::{ApiError, StorageError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use idempotency::IdempotencyKey;
pub use latest::LatestWins;
pub use response::{ApiResponse, ErrorItem};
pub use token::{FileTokenStore, MemoryTokenStore, TokenHolder, TokenStore, UnavailableTokenStore};
pub use transport::Transport;
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use types::{
    AuthSession, Credentials, LikeSummary, Registration, Transfer, TransferRequest, User,
    UsernameAvailability, Wallet,
};
