//! Shared HTTP clients.
//!
//! Lazily built once and reused so TLS sessions and pooled connections survive
//! across classification calls.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Client for AI provider calls. Completions can take a while.
pub static PROVIDER_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
});

/// Client for page metadata lookups, which should fail fast.
pub static METADATA_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
});

#[inline]
pub fn provider_client() -> &'static Client {
    &PROVIDER_CLIENT
}

#[inline]
pub fn metadata_client() -> &'static Client {
    &METADATA_CLIENT
}
