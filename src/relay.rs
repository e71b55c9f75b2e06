//! Upstream SOAP relay.
//!
//! Queries the three identity services in order, each over its own mutually
//! authenticated connection, and aggregates the parsed replies.

use crate::config::RelayConfig;
use crate::credential::{CredentialBundle, MaterializedCredential};
use crate::envelope::{IdentityQuery, Service, SOAP_CONTENT_TYPE};
use crate::error::{RelayError, UpstreamError};
use crate::parser::parse_soap_response;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One SOAP call ready to be sent.
#[derive(Debug, Clone)]
pub struct SoapRequest {
    pub service: Service,
    pub url: String,
    pub soap_action: String,
    pub body: String,
}

/// Raw upstream reply. The status is informational only.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a SOAP request authenticated with a materialized client certificate.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn post(
        &self,
        request: &SoapRequest,
        credential: &MaterializedCredential,
    ) -> Result<UpstreamReply, UpstreamError>;
}

/// HTTPS transport backed by reqwest.
///
/// A fresh client is built for every call because the client identity is
/// loaded from that call's credential files.
#[derive(Debug, Clone, Default)]
pub struct HttpsTransport {
    insecure_skip_verify: bool,
    timeout: Option<Duration>,
}

impl HttpsTransport {
    pub fn new(insecure_skip_verify: bool, timeout: Option<Duration>) -> Self {
        Self {
            insecure_skip_verify,
            timeout,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.settings.insecure_skip_verify,
            config.settings.request_timeout(),
        )
    }

    async fn client(&self, credential: &MaterializedCredential) -> Result<reqwest::Client, UpstreamError> {
        let cert_pem = tokio::fs::read(credential.cert_path())
            .await
            .map_err(|e| UpstreamError::Client(format!("Failed to read certificate: {}", e)))?;
        let key_pem = tokio::fs::read(credential.key_path())
            .await
            .map_err(|e| UpstreamError::Client(format!("Failed to read private key: {}", e)))?;

        let identity = reqwest::Identity::from_pkcs8_pem(&cert_pem, &key_pem)
            .map_err(|e| UpstreamError::Client(format!("Invalid client identity: {}", e)))?;

        let mut builder = reqwest::Client::builder()
            .identity(identity)
            .danger_accept_invalid_certs(self.insecure_skip_verify);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))
    }
}

#[async_trait]
impl SoapTransport for HttpsTransport {
    async fn post(
        &self,
        request: &SoapRequest,
        credential: &MaterializedCredential,
    ) -> Result<UpstreamReply, UpstreamError> {
        let client = self.client(credential).await?;

        let transport_error = |e: reqwest::Error| UpstreamError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let response = client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", &request.soap_action)
            .body(request.body.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(UpstreamReply {
            status,
            body: body.to_vec(),
        })
    }
}

/// Parsed replies keyed by service name, in query order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult(Map<String, Value>);

impl AggregateResult {
    /// Parsed reply for `service`.
    pub fn get(&self, service: Service) -> Option<&Value> {
        self.0.get(service.as_str())
    }

    fn insert(&mut self, service: Service, value: Value) {
        self.0.insert(service.as_str().to_string(), value);
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Upstream call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub upstream_calls: u64,
    pub upstream_failures: u64,
}

/// Relays identity queries to the upstream SOAP services.
#[derive(Clone)]
pub struct SoapRelay {
    config: Arc<RelayConfig>,
    bundle: Arc<CredentialBundle>,
    transport: Arc<dyn SoapTransport>,
    temp_dir: PathBuf,
    upstream_calls: Arc<AtomicU64>,
    upstream_failures: Arc<AtomicU64>,
}

impl SoapRelay {
    /// Create a relay using the HTTPS transport described by `config`.
    pub fn new(config: RelayConfig, bundle: CredentialBundle) -> Self {
        let transport = HttpsTransport::from_config(&config);
        Self::with_transport(config, bundle, Arc::new(transport))
    }

    /// Create a relay with a custom transport.
    pub fn with_transport(
        config: RelayConfig,
        bundle: CredentialBundle,
        transport: Arc<dyn SoapTransport>,
    ) -> Self {
        let temp_dir = config
            .settings
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        Self {
            config: Arc::new(config),
            bundle: Arc::new(bundle),
            transport,
            temp_dir,
            upstream_calls: Arc::new(AtomicU64::new(0)),
            upstream_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }

    /// Build the SOAP request for one service.
    pub fn build_request(&self, service: Service, query: &IdentityQuery) -> SoapRequest {
        SoapRequest {
            service,
            url: self.config.services.url_for(service).to_string(),
            soap_action: service.soap_action(),
            body: service.render(query),
        }
    }

    /// Query every service in turn. The first failure aborts the whole lookup.
    pub async fn fetch(&self, query: &IdentityQuery) -> Result<AggregateResult, RelayError> {
        let mut result = AggregateResult::default();
        for service in Service::ALL {
            let value = self.fetch_service(service, query).await?;
            result.insert(service, value);
        }
        Ok(result)
    }

    /// Query one service and parse its reply.
    pub async fn fetch_service(
        &self,
        service: Service,
        query: &IdentityQuery,
    ) -> Result<Value, RelayError> {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);

        let result = self.call_upstream(service, query).await;
        if let Err(ref e) = result {
            self.upstream_failures.fetch_add(1, Ordering::Relaxed);
            warn!(service = %service, error = %e, "Upstream call failed");
        }
        result
    }

    async fn call_upstream(&self, service: Service, query: &IdentityQuery) -> Result<Value, RelayError> {
        let request = self.build_request(service, query);

        debug!(service = %service, url = %request.url, "Calling upstream service");

        let credential = self.bundle.materialize_in(&self.temp_dir)?;
        let outcome = self.transport.post(&request, &credential).await;
        // Dropping the credential also removes the files (cancellation, panic);
        // closing here surfaces removal errors in the log.
        if let Err(e) = credential.close() {
            warn!(service = %service, error = %e, "Failed to remove credential files");
        }
        let reply = outcome?;

        if reply.is_success() {
            info!(service = %service, status = reply.status, "Upstream service replied");
        } else {
            warn!(
                service = %service,
                status = reply.status,
                "Upstream service returned non-success status, parsing body anyway"
            );
        }

        Ok(parse_soap_response(&reply.body)?)
    }
}
