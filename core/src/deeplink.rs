//! Deep-link parsing.
//!
//! Links arrive either on the app scheme (`rewards://posts/42`, where the
//! first segment is the URL host) or as universal links
//! (`https://app.example.com/posts/42`). Both normalize to the same segment
//! list before routing.

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Succeeded,
    Cancelled,
    Failed,
    Unknown(String),
}

impl PaymentStatus {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "complete" | "completed" => PaymentStatus::Succeeded,
            "cancel" | "cancelled" | "canceled" => PaymentStatus::Cancelled,
            "fail" | "failed" | "error" => PaymentStatus::Failed,
            other => PaymentStatus::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLink {
    /// Return from the browser OAuth flow. Carries a token, an exchange
    /// code, or an error reported by the provider.
    AuthCallback {
        token: Option<String>,
        code: Option<String>,
        error: Option<String>,
    },
    /// Return from the hosted payment page.
    PaymentReturn {
        status: PaymentStatus,
        session_id: Option<String>,
    },
    Post { id: String },
    Profile { username: String },
    Wallet,
    Notifications,
    /// Well-formed link with no route; the host falls back to the feed.
    Unknown { path: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeepLinkError {
    #[error("malformed deep link: {0}")]
    Malformed(#[from] url::ParseError),
}

impl DeepLink {
    pub fn parse(link: &str) -> Result<Self, DeepLinkError> {
        let url = Url::parse(link.trim())?;
        let mut segments: Vec<String> = Vec::new();
        if !matches!(url.scheme(), "http" | "https") {
            if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
                segments.push(host.to_string());
            }
        }
        segments.extend(
            url.path_segments()
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );

        let query = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())
        };

        let route: Vec<&str> = segments.iter().map(String::as_str).collect();
        let link = match route.as_slice() {
            ["auth", "callback"] | ["oauth", "callback"] => DeepLink::AuthCallback {
                token: query("token"),
                code: query("code"),
                error: query("error"),
            },
            ["payments" | "payment", rest @ ..] if rest.len() <= 1 => DeepLink::PaymentReturn {
                status: rest
                    .first()
                    .map(|s| s.to_string())
                    .or_else(|| query("status"))
                    .map_or(PaymentStatus::Unknown(String::new()), |s| PaymentStatus::parse(&s)),
                session_id: query("session_id"),
            },
            ["posts" | "p", id] => DeepLink::Post { id: id.to_string() },
            ["users" | "u" | "profile", username] => DeepLink::Profile {
                username: username.trim_start_matches('@').to_string(),
            },
            [handle] if handle.starts_with('@') && handle.len() > 1 => DeepLink::Profile {
                username: handle[1..].to_string(),
            },
            ["wallet"] => DeepLink::Wallet,
            ["notifications"] => DeepLink::Notifications,
            _ => DeepLink::Unknown {
                path: format!("/{}", segments.join("/")),
            },
        };
        tracing::debug!(?link, "parsed deep link");
        Ok(link)
    }

    /// Screens that cannot be shown without a session.
    pub fn requires_session(&self) -> bool {
        matches!(
            self,
            DeepLink::Wallet | DeepLink::Notifications | DeepLink::PaymentReturn { .. }
        )
    }
}
