//! Client-generated idempotency keys for mutating requests.
//!
//! The backend collapses requests that share an `Idempotency-Key`, so a
//! caller that retries a mutation must send the key from the first attempt.
//! Hold on to the `IdempotencyKey` and pass it through `RequestOptions` on the
//! retry.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Non-empty key for the `Idempotency-Key` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Random UUID v4 from the OS RNG, or a timestamp-plus-random string when
    /// the RNG is unavailable.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        match getrandom::getrandom(&mut bytes) {
            Ok(()) => Self(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()),
            Err(err) => {
                tracing::warn!(%err, "OS RNG unavailable, using fallback idempotency key");
                Self(fallback_key())
            }
        }
    }

    /// Wrap a caller-provided key. Blank keys are rejected.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        (!key.is_empty()).then(|| Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn fallback_key() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(millis);
    hasher.write_u64(FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed));
    format!("{millis:x}-{:016x}", hasher.finish())
}
