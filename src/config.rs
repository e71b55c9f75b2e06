//! Configuration types for the SOAP relay.
//!
//! Certificate material is not part of the YAML file; it comes from the
//! command line or environment and is loaded into a
//! [`CredentialBundle`](crate::credential::CredentialBundle) at startup.

use crate::envelope::Service;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// General settings
    pub settings: SettingsConfig,

    /// Upstream endpoint URLs
    pub services: ServicesConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Address the HTTP API listens on
    pub listen: String,

    /// Skip upstream server certificate verification (insecure)
    pub insecure_skip_verify: bool,

    /// Per-call upstream timeout in seconds (none = wait indefinitely)
    pub request_timeout_secs: Option<u64>,

    /// Directory for temporary credential files (none = system temp dir)
    pub temp_dir: Option<PathBuf>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            insecure_skip_verify: false,
            request_timeout_secs: None,
            temp_dir: None,
        }
    }
}

impl SettingsConfig {
    /// Upstream timeout as a [`Duration`], if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Endpoint URL for each upstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub padres: String,
    pub hijos: String,
    pub fiscal: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            padres: Service::Padres.default_url().to_string(),
            hijos: Service::Hijos.default_url().to_string(),
            fiscal: Service::Fiscal.default_url().to_string(),
        }
    }
}

impl ServicesConfig {
    /// Endpoint URL configured for `service`.
    pub fn url_for(&self, service: Service) -> &str {
        match service {
            Service::Padres => &self.padres,
            Service::Hijos => &self.hijos,
            Service::Fiscal => &self.fiscal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.settings.listen, "0.0.0.0:8080");
        assert!(!config.settings.insecure_skip_verify);
        assert!(config.settings.request_timeout().is_none());
        assert!(config.settings.temp_dir.is_none());
        assert_eq!(
            config.services.url_for(Service::Padres),
            "https://renaperdatosc.idear.gov.ar:8446/WSpadres.php"
        );
        assert_eq!(
            config.services.url_for(Service::Fiscal),
            "https://renaperdatosc.idear.gov.ar:8446/DATOSCMPFISCAL.php"
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = RelayConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: RelayConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.settings.listen, config.settings.listen);
        assert_eq!(parsed.services.hijos, config.services.hijos);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
settings:
  listen: "127.0.0.1:9000"
  insecure_skip_verify: true
  request_timeout_secs: 30
  temp_dir: /run/relay
services:
  fiscal: "https://staging.example.test/fiscal"
"#;
        let config: RelayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.settings.listen, "127.0.0.1:9000");
        assert!(config.settings.insecure_skip_verify);
        assert_eq!(config.settings.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.settings.temp_dir, Some(PathBuf::from("/run/relay")));
        assert_eq!(
            config.services.url_for(Service::Fiscal),
            "https://staging.example.test/fiscal"
        );
        // Unspecified services keep their defaults
        assert_eq!(
            config.services.url_for(Service::Hijos),
            Service::Hijos.default_url()
        );
    }
}
