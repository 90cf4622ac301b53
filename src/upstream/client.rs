//! Outbound HTTP(S) client.
//!
//! One client is built at startup and shared by every call. It owns the
//! connection pool and the per-host limiter; both are safe for concurrent
//! use.

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::CertificateDer;
use tokio::sync::AcquireError;
use tokio::time::error::Elapsed;
use url::Url;

use crate::config::UpstreamConfig;
use crate::upstream::limiter::{HostLimiter, HostPermit};

/// Why no connection slot could be reserved.
#[derive(Debug, thiserror::Error)]
pub enum ReserveError {
    #[error("no free connection slot to {host} before the timeout")]
    TimedOut {
        host: String,
        #[source]
        source: Elapsed,
    },
    #[error("connection limiter closed")]
    Closed(#[source] AcquireError),
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    limiter: Arc<HostLimiter>,
    timeout: Duration,
}

impl UpstreamClient {
    /// Build the shared client, trusting `extra_roots` on top of the
    /// built-in web PKI roots.
    pub fn new(
        config: &UpstreamConfig,
        extra_roots: &[CertificateDer<'static>],
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .no_proxy()
            .timeout(config.timeout())
            .pool_idle_timeout(config.idle_timeout())
            // Idle connections to one host can never outnumber its slots.
            .pool_max_idle_per_host(
                config
                    .max_idle_connections
                    .min(config.max_connections_per_host),
            )
            .danger_accept_invalid_certs(config.insecure_skip_verify);

        for root in extra_roots {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(root.as_ref())?);
        }

        if config.insecure_skip_verify {
            tracing::warn!("Upstream certificate verification is disabled");
        }
        tracing::debug!(
            timeout_secs = config.timeout_secs,
            max_connections_per_host = config.max_connections_per_host,
            extra_roots = extra_roots.len(),
            "Upstream client configured"
        );

        Ok(Self {
            http: builder.build()?,
            limiter: Arc::new(HostLimiter::new(config.max_connections_per_host)),
            timeout: config.timeout(),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Reserve a connection slot for the host `url` points at, waiting at
    /// most the upstream timeout.
    pub async fn reserve(&self, url: &Url) -> Result<HostPermit, ReserveError> {
        let host = host_key(url);
        match tokio::time::timeout(self.timeout, self.limiter.acquire(&host)).await {
            Ok(permit) => permit.map_err(ReserveError::Closed),
            Err(source) => Err(ReserveError::TimedOut { host, source }),
        }
    }

    pub fn limiter(&self) -> &HostLimiter {
        &self.limiter
    }
}

/// `host:port` of `url`, with the scheme's default port filled in.
pub fn host_key(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}
