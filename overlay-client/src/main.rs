use anyhow::Context;
use clap::Parser;
use overlay_client::config::Config;
use overlay_client::startup::check_server_connectivity;
use overlay_core::model::PeerId;
use overlay_core::protocol::ControlMessage;
use overlay_core::pump::{self, ClientPump};
use overlay_core::session::Session;
use overlay_tun::{AsyncTunDevice, TunDevice};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();

    if let Err(e) = check_server_connectivity(
        &config.server_host,
        config.server_http_port,
        config.server_udp_port,
        config.probe_timeout(),
    )
    .await
    {
        error!(error = %e, "server connectivity check failed");
        return ExitCode::from(1);
    }
    info!("server connectivity check passed");

    let nic: Option<Arc<dyn TunDevice>> = match AsyncTunDevice::open(&config.nic_name) {
        Ok(device) => Some(device.into_shared()),
        Err(e) if config.require_nic => {
            error!(error = %e, "virtual NIC unavailable and --require-nic was set");
            return ExitCode::from(2);
        }
        Err(e) => {
            warn!(error = %e, "virtual NIC unavailable, continuing in control-only mode");
            None
        }
    };

    match run(config, nic).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "client exited with error");
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config, nic: Option<Arc<dyn TunDevice>>) -> anyhow::Result<()> {
    let peer_id: PeerId = config
        .peer_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string())
        .into();

    let server_addr = tokio::net::lookup_host((config.server_host.as_str(), config.server_udp_port))
        .await
        .context("resolving server address")?
        .next()
        .context("server address resolved to no candidates")?;

    let socket = Arc::new(
        UdpSocket::bind(("0.0.0.0", 0))
            .await
            .context("binding client UDP socket")?,
    );

    let session = Arc::new(Mutex::new(Session::new(peer_id.clone(), config.username.clone())));
    let observer = overlay_core::observer::Observer::default();
    let client_pump = ClientPump::new(socket.clone(), nic, session.clone(), server_addr, observer);

    let pump_task = tokio::spawn({
        let client_pump = client_pump;
        async move { client_pump.run().await }
    });
    let maintenance_task = tokio::spawn(pump::run_maintenance(
        socket.clone(),
        session.clone(),
        server_addr,
        config.punch_retry_schedule(),
    ));

    let join_msg = match &config.room_id {
        Some(room_id) => {
            session.lock().await.begin_join(room_id.clone());
            ControlMessage::JoinRoom {
                room_id: room_id.clone(),
                peer_id: peer_id.to_string(),
                username: config.username.clone(),
                port: 0,
            }
        }
        None => {
            let room_id = format!("room-{}", Uuid::new_v4());
            info!(%room_id, "no --room-id given, creating a new room");
            session.lock().await.begin_join(room_id.clone());
            ControlMessage::CreateRoom {
                room_id,
                peer_id: peer_id.to_string(),
                username: config.username.clone(),
                port: 0,
            }
        }
    };
    socket
        .send_to(&join_msg.to_bytes(), server_addr)
        .await
        .context("sending initial room request")?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        res = pump_task => {
            res.context("pump task panicked")?;
        }
        res = maintenance_task => {
            res.context("maintenance task panicked")?;
        }
    }

    Ok(())
}
