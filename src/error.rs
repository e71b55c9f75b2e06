//! Error types for the SOAP relay.

use thiserror::Error;

/// Failures while turning a PKCS#12 bundle into PEM credential files.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Invalid base64 certificate bundle: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to open PKCS#12 bundle (malformed or wrong passphrase): {0}")]
    Pkcs12(String),

    #[error("PKCS#12 bundle does not contain a private key")]
    MissingKey,

    #[error("PKCS#12 bundle does not contain a certificate")]
    MissingCertificate,

    #[error("PEM encoding error: {0}")]
    Pem(String),

    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to an upstream SOAP service.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Upstream request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("XML parsing error: {0}")]
    Parse(String),
}

/// Top-level relay error, mapped onto HTTP status codes at the API boundary.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    /// Whether the caller is at fault (HTTP 400) rather than the relay (HTTP 500).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
