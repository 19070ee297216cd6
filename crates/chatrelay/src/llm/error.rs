//! LLM error types.

use thiserror::Error;

/// Errors that can occur when making LLM API calls.
#[derive(Debug, Error)]
pub enum LLMError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned an error response
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// API answered 2xx but the payload lacked an expected field
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Operation not offered by this provider
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),
}

/// Turn a non-2xx response into `LLMError::Api`, passing successes through.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LLMError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(LLMError::Api { status, message })
}
