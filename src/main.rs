use std::sync::Arc;

use clap::Parser;

use toolcall_proxy::clock;
use toolcall_proxy::config::{AppConfig, Args};
use toolcall_proxy::http_client;
use toolcall_proxy::logger;
use toolcall_proxy::markers::MarkerSet;
use toolcall_proxy::proxy::{self, ProxyState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::from_args(args)?;

    logger::init(&config.log_filter);

    let bind_addr = config.bind_addr;

    log::info!(
        "starting toolcall-proxy on {bind_addr} (log_enabled={}, allow_local_net={})",
        config.log_enabled,
        config.allow_local_net
    );

    let state = Arc::new(ProxyState {
        client: http_client::build(),
        markers: MarkerSet::generate(),
        config,
        clock: clock::system(),
    });

    let router = proxy::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
