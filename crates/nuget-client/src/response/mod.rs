//! Response classification
//!
//! Success statuses pass through. Anything else becomes an [`ApiError`]
//! carrying the status code and either the message from the server's error
//! envelope or, failing that, the status line verbatim (`"404 Not Found"`).

use reqwest::{Response, StatusCode};
use tokio_util::sync::CancellationToken;

use nuget_core::error::{ApiError, NuGetError};
use crate::api::ErrorEnvelope;
use crate::ClientResult;

/// Pass a successful response through, or turn it into a structured error.
///
/// The body of a failed response is consumed to look for an error envelope;
/// a missing or unreadable body falls back to the status line.
pub async fn check_response(response: Response) -> ClientResult<Response> {
    check_response_with(response, &CancellationToken::new()).await
}

/// [`check_response`], giving up on a stalled error body once `token` fires
pub async fn check_response_with(response: Response, token: &CancellationToken) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(NuGetError::Cancelled),
        bytes = response.bytes() => bytes.ok(),
    };
    let error = classify(status, body.as_deref())
        .unwrap_or_else(|| ApiError::new(status.as_u16(), None, status_line(status)));
    Err(NuGetError::Api(error))
}

/// Classify a status and optional body. `None` means success.
pub fn classify(status: StatusCode, body: Option<&[u8]>) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }

    let (code, message) = body
        .filter(|body| !body.is_empty())
        .and_then(|body| serde_json::from_slice::<serde_json::Value>(body).ok())
        .filter(serde_json::Value::is_object)
        .and_then(|value| serde_json::from_value::<ErrorEnvelope>(value).ok())
        .map(ErrorEnvelope::into_parts)
        .unwrap_or_default();

    Some(ApiError::new(
        status.as_u16(),
        code,
        message.unwrap_or_else(|| status_line(status)),
    ))
}

/// `"<code> <reason>"`, or just the code when the reason is unknown
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
