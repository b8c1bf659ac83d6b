use async_trait::async_trait;
use thiserror::Error;

/// Failures a completion call can end in.
///
/// None of these are fatal. The turn controller turns every one of them
/// into an assistant message.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Connection, DNS or timeout failure, or the body could not be read.
    #[error("request to inference endpoint failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered 2xx but the body was not the expected JSON.
    #[error("malformed inference response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A text-completion service.
///
/// `Ok(None)` means the call succeeded but the response carried no usable
/// text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Option<String>, InferenceError>;
}
