//! C8: process configuration.
//!
//! Loaded once at startup from environment variables, with two CLI overrides for
//! operator ergonomics. Validation failures are fatal — there is no partial-config
//! mode, since nothing downstream can safely guess a listen address.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "toolcall-proxy", about = "Reverse proxy that synthesizes tool calling over plain-text models")]
pub struct Args {
    /// Port to listen on. Overridden by `--bind` if both are given.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Explicit bind address, overriding the address built from `--port`/`PORT`.
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Enable the per-request audit log under `--log-dir`/`LOG_DIR`.
    #[arg(long, env = "LOG_ENABLED", default_value_t = false)]
    pub log_enabled: bool,

    /// Directory audit log files are written to, when enabled.
    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Disable the SSRF guard against loopback/private/link-local upstream targets.
    #[arg(long, env = "ALLOW_LOCAL_NET", default_value_t = false)]
    pub allow_local_net: bool,

    /// `EnvFilter`-style level filter, e.g. `info` or `toolcall_proxy=debug`.
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}

/// Immutable process-lifetime configuration, resolved from [`Args`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_enabled: bool,
    pub log_dir: PathBuf,
    pub allow_local_net: bool,
    pub log_filter: String,
}

impl AppConfig {
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let bind_addr = match args.bind {
            Some(addr) => addr,
            None => format!("0.0.0.0:{}", args.port)
                .parse()
                .map_err(|err| anyhow::anyhow!("invalid port {}: {err}", args.port))?,
        };

        Ok(Self {
            bind_addr,
            log_enabled: args.log_enabled,
            log_dir: args.log_dir,
            allow_local_net: args.allow_local_net,
            log_filter: args.log_filter,
        })
    }
}
