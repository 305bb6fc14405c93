use anyhow::Context;
use clap::Parser;
use overlay_server::config::Config;
use overlay_server::state::AppState;
use overlay_server::{http, udp};
use overlay_core::registry::CLEANUP_PERIOD;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    let public_ip = config.public_ip.clone().unwrap_or_else(|| "0.0.0.0".to_string());
    let state = AppState::new(public_ip);

    let udp_socket = Arc::new(
        UdpSocket::bind(("0.0.0.0", config.udp_port))
            .await
            .with_context(|| format!("binding UDP port {}", config.udp_port))?,
    );
    let http_listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("binding HTTP port {}", config.http_port))?;

    info!(udp_port = config.udp_port, http_port = config.http_port, "overlay-server starting");

    let udp_task = tokio::spawn(udp::run(udp_socket, state.clone()));
    let cleanup_task = tokio::spawn(udp::run_cleanup(state.clone(), CLEANUP_PERIOD));
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, http::router(state)).await
    });

    tokio::select! {
        res = udp_task => {
            res.context("udp task panicked")?.context("udp loop failed")?;
        }
        _ = cleanup_task => {
            info!("cleanup task exited unexpectedly");
        }
        res = http_task => {
            res.context("http task panicked")?.context("http server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
