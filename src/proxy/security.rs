//! C7 (SSRF guard): reject upstream targets that would let a client reach the
//! proxy's own network.
//!
//! Checked in two passes: the hostname against a short literal denylist, then (when
//! it resolves) the hostname's IP addresses against the private/loopback ranges. DNS
//! failures are not a rejection reason — the upstream fetch will fail on its own if
//! the host doesn't exist.

use std::net::IpAddr;

use url::Url;

const DENIED_HOSTNAMES: [&str; 4] = ["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Validate `url` as a permitted upstream target. `allow_local_net` disables every
/// check here, for local development against a proxy running on the same host.
pub async fn validate_upstream(url: &Url, allow_local_net: bool) -> Result<(), String> {
    if allow_local_net {
        return Ok(());
    }

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{other}'")),
    }

    let Some(host) = url.host_str() else {
        return Err("missing host".to_string());
    };

    if DENIED_HOSTNAMES.contains(&host) {
        return Err("Localhost access denied".to_string());
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_disallowed(ip) {
            return Err(format!("'{ip}' is not a permitted upstream address"));
        }
        return Ok(());
    }

    let lookup_target = format!("{host}:{}", url.port_or_known_default().unwrap_or(443));
    let Ok(mut addrs) = tokio::net::lookup_host(&lookup_target).await else {
        // DNS failure: let the upstream fetch fail naturally rather than guessing.
        return Ok(());
    };

    if addrs.any(|addr| is_disallowed(addr.ip())) {
        return Err(format!("'{host}' resolves to a non-permitted address"));
    }

    Ok(())
}

fn is_disallowed(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_denied_hostnames() {
        for host in DENIED_HOSTNAMES {
            let url = Url::parse(&format!("http://{host}/v1/chat/completions")).unwrap();
            let err = validate_upstream(&url, false).await.expect_err(&format!("{host} should be denied"));
            assert_eq!(err, "Localhost access denied");
        }
    }

    #[tokio::test]
    async fn rejects_private_ipv4_literal() {
        let url = Url::parse("http://10.0.0.5/v1/chat/completions").unwrap();
        assert!(validate_upstream(&url, false).await.is_err());
    }

    #[tokio::test]
    async fn rejects_link_local_ipv4_literal() {
        let url = Url::parse("http://169.254.169.254/latest/meta-data").unwrap();
        assert!(validate_upstream(&url, false).await.is_err());
    }

    #[tokio::test]
    async fn allows_public_ipv4_literal() {
        let url = Url::parse("http://93.184.216.34/v1/chat/completions").unwrap();
        assert!(validate_upstream(&url, false).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let url = Url::parse("ftp://example.com/file").unwrap();
        assert!(validate_upstream(&url, false).await.is_err());
    }

    #[tokio::test]
    async fn allow_local_net_bypasses_every_check() {
        let url = Url::parse("http://127.0.0.1/v1/chat/completions").unwrap();
        assert!(validate_upstream(&url, true).await.is_ok());
    }
}
