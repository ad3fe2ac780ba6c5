//! Analysis Provider plumbing: the transport trait, credentials, and handles.

pub mod http;

use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use zeroize::Zeroize;

pub use self::http::HttpProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to provider timed out")]
    Timeout,

    #[error("provider unreachable: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

/// Opaque bearer token issued by the provider's identity service.
///
/// Never printed; zeroed when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Identifies one submitted job at the provider.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub execution_id: String,
    pub provider_file_ref: String,
    pub credential: Credential,
}

/// Raw payload sent to the provider. Validation happens in the gateway.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Bytes,
}

/// Identifiers returned by the provider after an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitAck {
    pub execution_id: Option<String>,
    pub file_ref: Option<String>,
}

/// The two provider round-trips the reconciler needs.
#[async_trait::async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Upload a document. Returns whatever identifiers the provider sent back.
    async fn send_file(
        &self,
        upload: &Upload,
        credential: &Credential,
    ) -> Result<SubmitAck, ProviderError>;

    /// Query one execution. Returns the response body with any
    /// `{success, data}` envelope already removed.
    async fn query_execution(
        &self,
        execution_id: &str,
        file_ref: &str,
        credential: &Credential,
    ) -> Result<serde_json::Value, ProviderError>;
}
