//! TLS configuration for the webhook server

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::{Error, Result};

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::ConfigError(format!("Failed to open {}: {}", path.display(), e)))
}

/// Build a server config from PEM encoded certificate chain and key files
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| {
            Error::ConfigError(format!(
                "Invalid certificate in {}: {}",
                cert_path.display(),
                e
            ))
        })?;
    if certs.is_empty() {
        return Err(Error::ConfigError(format!(
            "No certificate found in {}",
            cert_path.display()
        )));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut open(key_path)?)
        .map_err(|e| {
            Error::ConfigError(format!("Invalid key in {}: {}", key_path.display(), e))
        })?
        .ok_or_else(|| {
            Error::ConfigError(format!("No private key found in {}", key_path.display()))
        })?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::ConfigError(format!("Unsupported TLS protocol versions: {}", e)))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| Error::ConfigError(format!("Invalid TLS certificate or key: {}", e)))?;

    Ok(Arc::new(config))
}
