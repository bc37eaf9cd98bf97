//! Boundary to the network layer.

use serde::Serialize;

use crate::error::{Result, UploadFailure};

/// A formatted, possibly compressed, request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub body: Vec<u8>,
    /// Value for the `Content-Encoding` header, if any.
    pub content_encoding: Option<&'static str>,
    pub record_count: usize,
}

/// Outcome of a request the transport managed to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadStatus {
    /// The batch should be kept and sent again later.
    pub needs_retry: bool,
    pub response_code: Option<u16>,
    #[serde(skip)]
    pub error: Option<UploadFailure>,
}

/// Status codes that mean "try again later".
const RETRYABLE_CODES: [u16; 7] = [408, 429, 500, 502, 503, 504, 507];

impl UploadStatus {
    /// Classify an intake response.
    ///
    /// Unknown codes are treated as final so a misbehaving intake cannot pin
    /// batches on disk.
    pub fn from_response_code(code: u16) -> Self {
        let error = match code {
            401 | 403 => Some(UploadFailure::Unauthorized),
            400 | 408 | 413 | 429 => Some(UploadFailure::HttpError { status_code: code }),
            500..=599 => Some(UploadFailure::HttpError { status_code: code }),
            _ => None,
        };
        UploadStatus {
            needs_retry: RETRYABLE_CODES.contains(&code),
            response_code: Some(code),
            error,
        }
    }

    /// The request was sent but no response arrived.
    pub fn from_network_error(description: impl Into<String>) -> Self {
        UploadStatus {
            needs_retry: true,
            response_code: None,
            error: Some(UploadFailure::NetworkError(description.into())),
        }
    }

    pub fn is_accepted(&self) -> bool {
        !self.needs_retry && self.error.is_none()
    }
}

/// Sends upload requests. Implemented by the host's HTTP client.
pub trait Transport: Send + Sync {
    /// Perform the request.
    ///
    /// `Err` means the request could not be initiated at all; the batch is
    /// then dropped rather than retried.
    fn upload(&self, request: &UploadRequest) -> Result<UploadStatus>;
}

impl<F> Transport for F
where
    F: Fn(&UploadRequest) -> Result<UploadStatus> + Send + Sync,
{
    fn upload(&self, request: &UploadRequest) -> Result<UploadStatus> {
        self(request)
    }
}
