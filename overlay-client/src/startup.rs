//! Pre-flight connectivity check — spec §6, mirroring the original
//! `check_server_connectivity`: an HTTP liveness probe against the
//! health side-channel, then a best-effort UDP `sendto` (no response
//! expected; only a local send failure counts as unreachable).

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

#[derive(Debug, thiserror::Error)]
pub enum ConnectivityError {
    #[error("http health check failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http health check returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("udp server unreachable: {0}")]
    Udp(#[source] std::io::Error),
}

pub async fn check_server_connectivity(
    server_host: &str,
    http_port: u16,
    udp_port: u16,
    timeout: Duration,
) -> Result<(), ConnectivityError> {
    let url = format!("http://{server_host}:{http_port}/");
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(ConnectivityError::HttpStatus(response.status()));
    }

    let socket = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(ConnectivityError::Udp)?;
    let target: SocketAddr = tokio::net::lookup_host((server_host, udp_port))
        .await
        .map_err(ConnectivityError::Udp)?
        .next()
        .ok_or_else(|| {
            ConnectivityError::Udp(std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"))
        })?;
    socket.send_to(b"ping", target).await.map_err(ConnectivityError::Udp)?;

    Ok(())
}
