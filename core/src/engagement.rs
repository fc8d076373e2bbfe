//! Optimistic like/unlike.
//!
//! The UI flips the heart immediately with `LikeState::begin_toggle`, fires
//! the request, then calls `settle`: a failure restores the previous state,
//! a success adopts the server's counts.

use serde_json::json;

use crate::client::ApiClient;
use crate::response::ApiResponse;
use crate::transport::Transport;
use crate::types::LikeSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: u64,
}

impl LikeState {
    pub fn new(liked: bool, like_count: u64) -> Self {
        Self { liked, like_count }
    }

    /// Apply the optimistic flip and return the state to roll back to.
    pub fn begin_toggle(&mut self) -> LikeState {
        let previous = *self;
        *self = if previous.liked {
            LikeState::new(false, previous.like_count.saturating_sub(1))
        } else {
            LikeState::new(true, previous.like_count + 1)
        };
        previous
    }

    /// Reconcile after the request resolved.
    pub fn settle(&mut self, previous: LikeState, response: &ApiResponse<LikeSummary>) {
        if !response.ok {
            *self = previous;
            return;
        }
        if let Some(summary) = response.data {
            *self = LikeState::new(summary.liked, summary.like_count);
        }
    }
}

/// Like or unlike `post_id` depending on the current state, with rollback.
pub fn toggle_like<X: Transport>(
    client: &ApiClient<X>,
    post_id: &str,
    state: &mut LikeState,
) -> ApiResponse<LikeSummary> {
    let previous = state.begin_toggle();
    let id: String = url::form_urlencoded::byte_serialize(post_id.as_bytes()).collect();
    let path = format!("/v1/posts/{id}/like");
    let response = if state.liked {
        client.post(&path, &json!({}))
    } else {
        client.delete(&path)
    };
    state.settle(previous, &response);
    if !response.ok {
        tracing::debug!(post_id, status = response.status, "like toggle rolled back");
    }
    response
}
