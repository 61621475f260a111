//! Shared upstream HTTP client.
//!
//! One `reqwest::Client` for the process lifetime so every proxied request reuses
//! the same connection pool instead of paying a fresh TLS handshake each time.

use std::time::Duration;

use reqwest::Client;

pub fn build() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_idle_timeout(Some(Duration::from_secs(30)))
        .tcp_nodelay(true)
        .build()
        .expect("default reqwest client configuration is always valid")
}
