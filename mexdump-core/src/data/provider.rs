//! Transport seam and structured error types.
//!
//! The Transport trait abstracts over the HTTP layer (blocking reqwest in
//! production, scripted responses in tests) so both fetchers can be driven
//! without a network.

use std::fmt;
use std::io::Read;
use thiserror::Error;

/// Structured error types for acquisition and storage.
///
/// These are designed to be displayable as a one-line channel status.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("provider still failing after {attempts} attempts ({last}) for {url}")]
    ProviderExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("not valid symbol(s): {}", .0.join(", "))]
    UnknownSymbols(Vec<String>),

    #[error("config error: {0}")]
    Config(String),
}

impl DataError {
    pub(crate) fn storage(context: &str, err: impl fmt::Display) -> Self {
        DataError::StorageFailure(format!("{context}: {err}"))
    }
}

/// A response from the remote provider: status code plus a streaming body.
pub struct HttpResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into memory.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, DataError> {
        let mut buf = Vec::new();
        self.body
            .read_to_end(&mut buf)
            .map_err(|e| DataError::NetworkUnreachable(format!("reading body: {e}")))?;
        Ok(buf)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Blocking GET against the provider.
///
/// Implementations return `Ok` for every HTTP response, whatever its status;
/// `Err` is reserved for failures that produced no response at all.
pub trait Transport {
    fn get(&self, url: &str) -> Result<HttpResponse, DataError>;
}
