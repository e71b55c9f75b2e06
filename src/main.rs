//! Identity SOAP relay binary.
//!
//! Run with: `renaper-soap-relay --config config.yaml`
//!
//! The client certificate is taken from `CERT_PFX_BASE64` (or the older
//! `CERT_PFX_PATH`) together with `CERT_PASSWORD`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use renaper_soap_relay::{server, CredentialBundle, RelayConfig, SoapRelay};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// mTLS SOAP relay for the identity-data services.
///
/// Serves `GET /api/fetch_data?dni=<id>&sexo=<code>` and answers with the
/// `padres`, `hijos` and `fiscal` replies converted to JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address, overrides `settings.listen`
    #[arg(long)]
    listen: Option<String>,

    /// Base64-encoded PKCS#12 client certificate bundle
    #[arg(long, env = "CERT_PFX_BASE64", hide_env_values = true)]
    cert_pfx_base64: Option<String>,

    /// Path to a PKCS#12 client certificate bundle
    #[arg(long, env = "CERT_PFX_PATH")]
    cert_pfx_path: Option<PathBuf>,

    /// Passphrase of the PKCS#12 bundle
    #[arg(long, env = "CERT_PASSWORD", hide_env_values = true)]
    cert_password: String,

    /// Skip upstream server certificate verification (insecure)
    #[arg(long)]
    insecure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn load_bundle(args: &Args) -> Result<CredentialBundle> {
    if let Some(ref encoded) = args.cert_pfx_base64 {
        return CredentialBundle::from_base64(encoded, args.cert_password.clone())
            .context("Failed to decode CERT_PFX_BASE64");
    }
    if let Some(ref path) = args.cert_pfx_path {
        return CredentialBundle::from_file(path, args.cert_password.clone())
            .with_context(|| format!("Failed to read certificate bundle {}", path.display()));
    }
    bail!("No client certificate configured: set CERT_PFX_BASE64 or CERT_PFX_PATH")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting identity SOAP relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let mut config: RelayConfig = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        RelayConfig::default()
    };
    if let Some(ref listen) = args.listen {
        config.settings.listen = listen.clone();
    }
    if args.insecure {
        config.settings.insecure_skip_verify = true;
    }

    if config.settings.insecure_skip_verify {
        warn!("Upstream server certificate verification is DISABLED");
    }

    info!(
        listen = %config.settings.listen,
        padres = %config.services.padres,
        hijos = %config.services.hijos,
        fiscal = %config.services.fiscal,
        request_timeout_secs = ?config.settings.request_timeout_secs,
        "Configuration loaded"
    );

    let bundle = load_bundle(&args)?;

    // Fail fast on a bad bundle or passphrase instead of on the first request
    let temp_dir = config
        .settings
        .temp_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    bundle
        .materialize_in(&temp_dir)
        .and_then(|credential| credential.close())
        .context("Client certificate bundle could not be opened")?;
    info!("Client certificate loaded");

    let listener = tokio::net::TcpListener::bind(&config.settings.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.settings.listen))?;

    let relay = SoapRelay::new(config, bundle);
    server::run(listener, relay).await.context("HTTP server error")?;

    info!("Relay stopped");
    Ok(())
}
