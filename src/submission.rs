//! Submission gateway: local validation, then upload to the provider.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::provider::{AnalysisProvider, Credential, ExecutionHandle, ProviderError, Upload};

/// Largest document the provider accepts.
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid document: {reason}")]
    InvalidDocument { reason: String },

    #[error("an IDP token is required")]
    MissingCredential,

    #[error("submission failed: {reason}")]
    SubmissionFailed { reason: String },
}

impl From<ProviderError> for SubmissionError {
    fn from(e: ProviderError) -> Self {
        let reason = match e {
            ProviderError::Http { message, .. } => message,
            ProviderError::Rejected(message) => message,
            other => other.to_string(),
        };
        SubmissionError::SubmissionFailed { reason }
    }
}

/// Document formats the provider can analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Png,
    Jpeg,
    Tiff,
    Pdf,
}

impl MediaType {
    /// Parse a declared MIME type. Parameters (`; charset=...`) are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" => Some(MediaType::Png),
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            "image/tiff" => Some(MediaType::Tiff),
            "application/pdf" => Some(MediaType::Pdf),
            _ => None,
        }
    }

    /// Best-effort guess from a file name, for the CLI.
    pub fn guess_mime(file_name: &str) -> Option<&'static str> {
        let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "tif" | "tiff" => Some("image/tiff"),
            "pdf" => Some("application/pdf"),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Tiff => "image/tiff",
            MediaType::Pdf => "application/pdf",
        }
    }
}

/// A document as picked by the operator, before validation.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub declared_type: String,
    pub bytes: Bytes,
}

impl Document {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Check type and size. Runs before any network traffic.
    pub fn validate(&self) -> Result<MediaType, SubmissionError> {
        let media = MediaType::from_mime(&self.declared_type).ok_or_else(|| {
            SubmissionError::InvalidDocument {
                reason: format!(
                    "unsupported type '{}'; accepted formats: PNG, JPG, TIFF, PDF",
                    self.declared_type
                ),
            }
        })?;
        if self.size() > MAX_DOCUMENT_BYTES {
            return Err(SubmissionError::InvalidDocument {
                reason: format!(
                    "file is {} bytes; maximum size is 10 MB",
                    self.size()
                ),
            });
        }
        Ok(media)
    }
}

/// Validates documents and forwards accepted ones to the provider.
#[derive(Clone)]
pub struct SubmissionGateway {
    provider: Arc<dyn AnalysisProvider>,
}

impl SubmissionGateway {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { provider }
    }

    pub async fn submit(
        &self,
        document: &Document,
        credential: Credential,
    ) -> Result<ExecutionHandle, SubmissionError> {
        let media = document.validate()?;
        if credential.is_empty() {
            return Err(SubmissionError::MissingCredential);
        }

        let upload = Upload {
            file_name: document.name.clone(),
            mime: media.mime(),
            bytes: document.bytes.clone(),
        };
        let ack = self.provider.send_file(&upload, &credential).await.map_err(|e| {
            warn!(document = %document.name, error = %e, "upload failed");
            SubmissionError::from(e)
        })?;

        let execution_id = ack.execution_id.ok_or_else(|| SubmissionError::SubmissionFailed {
            reason: "provider response carried no execution identifier".to_string(),
        })?;
        let provider_file_ref = ack.file_ref.ok_or_else(|| SubmissionError::SubmissionFailed {
            reason: "provider response carried no file reference".to_string(),
        })?;

        info!(document = %document.name, %execution_id, file_ref = %provider_file_ref, "document submitted");
        Ok(ExecutionHandle {
            execution_id,
            provider_file_ref,
            credential,
        })
    }
}
