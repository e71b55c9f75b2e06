//! Identity SOAP relay
//!
//! Exposes a single JSON endpoint that looks a person up in three upstream
//! SOAP identity services and returns the combined answer.
//!
//! # Features
//!
//! - Client certificate authentication from a PKCS#12 bundle
//! - Per-call temporary PEM credentials, always removed after use
//! - XML-escaped envelope rendering for caller-supplied values
//! - Generic XML → JSON conversion of upstream replies
//! - Server certificate verification on by default (explicit insecure mode)
//!
//! # Example
//!
//! ```ignore
//! use renaper_soap_relay::{CredentialBundle, RelayConfig, SoapRelay};
//!
//! let bundle = CredentialBundle::from_base64(&pfx_base64, passphrase)?;
//! let relay = SoapRelay::new(RelayConfig::default(), bundle);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! renaper_soap_relay::server::run(listener, relay).await?;
//! ```

pub mod config;
pub mod credential;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod relay;
pub mod server;

pub use config::RelayConfig;
pub use credential::{CredentialBundle, MaterializedCredential};
pub use envelope::{IdentityQuery, Service};
pub use error::{CredentialError, RelayError, UpstreamError};
pub use relay::{AggregateResult, HttpsTransport, SoapRelay, SoapTransport};
