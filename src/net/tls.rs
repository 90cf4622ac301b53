//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Walk the CA directory and load every PEM bundle in it
//! - Load the server certificate chain and private key
//! - Build the mutual-TLS (client certificate required) and plain server
//!   configurations used by the two listeners

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::config::TlsConfig;

/// Error type for TLS material loading.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to load certificate {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),
    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("invalid client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

impl TlsError {
    fn io(path: &Path, source: io::Error) -> Self {
        TlsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Certificate material loaded once at startup and shared by both
/// listeners and the upstream client.
#[derive(Debug)]
pub struct TlsMaterial {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
    /// Trusted CAs: client-certificate roots and extra upstream roots.
    pub ca_certs: Vec<CertificateDer<'static>>,
}

impl TlsMaterial {
    pub fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let ca_dir = Path::new(&config.ca_certs_dir);
        let ca_files = collect_ca_files(ca_dir).map_err(|e| TlsError::io(ca_dir, e))?;

        let mut ca_certs = Vec::new();
        for file in &ca_files {
            ca_certs.extend(load_certificates(file)?);
        }
        tracing::debug!(
            files = ca_files.len(),
            certificates = ca_certs.len(),
            "Loaded trusted CA certificates"
        );

        Ok(Self {
            cert_chain: load_certificates(Path::new(&config.server_cert_path))?,
            key: load_private_key(Path::new(&config.server_key_path))?,
            ca_certs,
        })
    }

    /// Configuration for the task listener: client certificates are
    /// required and must chain to one of `ca_certs`.
    pub fn mutual_tls_config(&self) -> Result<ServerConfig, TlsError> {
        let provider = crypto_provider();
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(self.ca_certs.iter().cloned());
        if ignored > 0 {
            tracing::warn!(added, ignored, "Some CA certificates could not be parsed");
        }

        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()?;

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = alpn_protocols();
        Ok(config)
    }

    /// Configuration for the monitoring listener: server authentication
    /// only.
    pub fn server_tls_config(&self) -> Result<ServerConfig, TlsError> {
        let mut config = ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = alpn_protocols();
        Ok(config)
    }
}

/// Wrap a rustls configuration for `axum-server`.
pub fn rustls_config(config: ServerConfig) -> RustlsConfig {
    RustlsConfig::from_config(Arc::new(config))
}

/// The process-wide crypto provider if one is installed, ring otherwise.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()))
}

fn alpn_protocols() -> Vec<Vec<u8>> {
    vec![b"h2".to_vec(), b"http/1.1".to_vec()]
}

/// Every regular file below `dir`, recursively, in a stable order.
pub fn collect_ca_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Load every certificate in a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::io(path, e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::io(path, e))?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::io(path, e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsError::io(path, e))?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
