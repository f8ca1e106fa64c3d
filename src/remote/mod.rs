/// Remote collaborators: the slide planner, the image generator and the
/// deck generator, each behind an async trait with an HTTP adapter.
///
/// Auth material is injected as plain strings by the caller; the adapters
/// hold a `reqwest::Client` and translate transport and status failures
/// into `RemoteError`.
use reqwest::StatusCode;
use serde_json::Value;

use crate::ooxml::OoxmlError;

pub mod deck;
pub mod image;
pub mod planner;
pub mod retry;

pub use deck::{
    DeckGenerator, DeckJob, DeckStatus, HttpDeckGenerator, cards_markdown, extract_slide_images,
    wait_for_export,
};
pub use image::{HttpImageGenerator, ImageGenerator, ImageRequest};
pub use planner::{HttpPlanner, PlanRequest, PlanResponse, Planner, extract_json, parse_json_strict};
pub use retry::{Backoff, with_backoff};

pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("generation failed: {0}")]
    JobFailed(String),
    #[error("timed out waiting for the collaborator")]
    Timeout,
    #[error(transparent)]
    Ooxml(#[from] OoxmlError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) fn network(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

pub(crate) fn status_error(status: StatusCode, body: String) -> RemoteError {
    match status.as_u16() {
        401 | 403 => RemoteError::AuthenticationFailed(body),
        429 => RemoteError::RateLimitExceeded,
        _ => RemoteError::InvalidRequest(body),
    }
}

/// Map a non-success status to an error, otherwise parse the JSON body.
pub(crate) async fn check_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, body));
    }
    response
        .json()
        .await
        .map_err(|err| RemoteError::MalformedResponse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_classes() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            RemoteError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, String::new()),
            RemoteError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            RemoteError::RateLimitExceeded
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad".to_string()),
            RemoteError::InvalidRequest(body) if body == "bad"
        ));
    }
}
