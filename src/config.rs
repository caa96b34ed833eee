//! Command line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::adapters::sidecar_builder::DEFAULT_HOST_PATH_ROOT;
use crate::webhook::InjectionSettings;
use crate::{Error, Result};

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Tailing Sidecar Operator configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "tailing-sidecar-operator")]
#[command(about = "Mutating webhook injecting log tailing sidecars into Pods")]
#[command(version)]
pub struct Config {
    /// Image of the injected tailing sidecar container
    #[arg(
        long,
        env = "TAILING_SIDECAR_IMAGE",
        default_value = "sumologic/tailing-sidecar:latest"
    )]
    pub tailing_sidecar_image: String,

    /// Root directory on the node for sidecar staging directories
    #[arg(long, env = "TAILING_SIDECAR_HOST_PATH_ROOT", default_value = DEFAULT_HOST_PATH_ROOT)]
    pub host_path_root: String,

    /// Port of the admission webhook endpoint
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 9443)]
    pub webhook_port: u16,

    /// Port of the metrics and health endpoint
    #[arg(long, env = "METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    /// Seconds allowed for listing TailingSidecars per admission request
    #[arg(long, env = "TAILING_SIDECAR_LOOKUP_TIMEOUT_SECS", default_value_t = 5)]
    pub lookup_timeout_secs: u64,

    /// PEM certificate chain served by the webhook (plain HTTP when unset)
    #[arg(long, env = "WEBHOOK_TLS_CERT_FILE", requires = "tls_key_file")]
    pub tls_cert_file: Option<PathBuf>,

    /// PEM private key matching `--tls-cert-file`
    #[arg(long, env = "WEBHOOK_TLS_KEY_FILE", requires = "tls_cert_file")]
    pub tls_key_file: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Config {
    /// Check values clap cannot validate on its own
    pub fn validate(&self) -> Result<()> {
        if self.tailing_sidecar_image.trim().is_empty() {
            return Err(Error::ConfigError(
                "tailing sidecar image cannot be empty".to_string(),
            ));
        }
        if !self.host_path_root.starts_with('/') {
            return Err(Error::ConfigError(format!(
                "host path root must be absolute, got '{}'",
                self.host_path_root
            )));
        }
        if self.lookup_timeout_secs == 0 {
            return Err(Error::ConfigError(
                "lookup timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings applied to injected sidecars
    pub fn injection_settings(&self) -> InjectionSettings {
        InjectionSettings {
            image: self.tailing_sidecar_image.clone(),
            host_path_root: self.host_path_root.trim_end_matches('/').to_string(),
            lookup_timeout: Duration::from_secs(self.lookup_timeout_secs),
        }
    }
}
