use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes for the LLM and embedding clients. `Http`/`Timeout` are
/// transient and retried internally by `retry::with_backoff` before ever
/// reaching the caller; `Api` means the provider answered with an error
/// body.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

/// Every client failure surfaces at the component boundary as `llm_error`
/// (§4.A, §4.E) — a `Config` error is the sole exception, since it means
/// the process was misconfigured rather than that a particular call failed.
impl From<Error> for ctxmem_types::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(msg) => ctxmem_types::Error::internal(msg),
            other => ctxmem_types::Error::llm_error(other.to_string()),
        }
    }
}
