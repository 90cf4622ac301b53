//! Per-host connection limiting.
//!
//! Each upstream `host:port` gets its own semaphore, created on first use.
//! A permit is held for the whole exchange (request and body read), which
//! bounds the connections the pool can open to one host. The entry for a
//! host is dropped again once its last permit is released and nobody is
//! waiting, so the table only holds hosts with calls in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{AcquireError, Semaphore};

#[derive(Debug)]
pub struct HostLimiter {
    per_host: usize,
    hosts: DashMap<String, Arc<Semaphore>>,
}

/// A connection slot to one host, returned on drop.
#[derive(Debug)]
pub struct HostPermit {
    semaphore: Option<Arc<Semaphore>>,
    host: String,
    limiter: Arc<HostLimiter>,
}

impl Drop for HostPermit {
    fn drop(&mut self) {
        if let Some(semaphore) = self.semaphore.take() {
            semaphore.add_permits(1);
        }
        self.limiter.release(&self.host);
    }
}

impl HostLimiter {
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host,
            hosts: DashMap::new(),
        }
    }

    /// Wait for a free connection slot to `host`.
    pub async fn acquire(self: &Arc<Self>, host: &str) -> Result<HostPermit, AcquireError> {
        let semaphore = Arc::clone(
            self.hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host)))
                .value(),
        );
        let pending = Pending {
            semaphore: Some(semaphore),
            host,
            limiter: self,
        };
        Ok(HostPermit {
            semaphore: pending.wait().await?,
            host: host.to_string(),
            limiter: Arc::clone(self),
        })
    }

    /// Free slots for `host`, or `None` if no call to it is in flight.
    pub fn available(&self, host: &str) -> Option<usize> {
        self.hosts
            .get(host)
            .map(|semaphore| semaphore.available_permits())
    }

    /// Number of hosts with a permit held or awaited.
    pub fn tracked_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn per_host(&self) -> usize {
        self.per_host
    }

    // The table holds one reference; any other is a holder or a waiter.
    fn release(&self, host: &str) {
        self.hosts
            .remove_if(host, |_, semaphore| Arc::strong_count(semaphore) == 1);
    }
}

/// A waiter's hold on a host entry. Cleans the entry up when the wait is
/// abandoned, e.g. by a timeout around `acquire`.
struct Pending<'a> {
    semaphore: Option<Arc<Semaphore>>,
    host: &'a str,
    limiter: &'a HostLimiter,
}

impl Pending<'_> {
    /// Wait for a slot, then hand the semaphore over to the permit.
    async fn wait(mut self) -> Result<Option<Arc<Semaphore>>, AcquireError> {
        // Borrowed, so an abandoned wait holds no extra reference.
        if let Some(semaphore) = &self.semaphore {
            semaphore.acquire().await?.forget();
        }
        Ok(self.semaphore.take())
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if let Some(semaphore) = self.semaphore.take() {
            drop(semaphore);
            self.limiter.release(self.host);
        }
    }
}
