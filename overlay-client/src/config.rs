use clap::Parser;
use std::time::Duration;

/// CLI/env surface for the overlay client. Defaults match the
/// rendezvous server's own defaults so a bare `overlay-client` against
/// a locally running `overlay-server` works with no flags.
#[derive(Parser, Debug, Clone)]
#[command(name = "overlay-client", about = "LAN-over-Internet overlay client")]
pub struct Config {
    /// Rendezvous server hostname or IP.
    #[arg(long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub server_host: String,

    #[arg(long, env = "UDP_PORT", default_value_t = 5000)]
    pub server_udp_port: u16,

    #[arg(long, env = "FLASK_PORT", default_value_t = 5001)]
    pub server_http_port: u16,

    /// Locally unique identifier for this peer. Generated at startup if
    /// omitted (spec §3: opaque, client-generated).
    #[arg(long, env = "PEER_ID")]
    pub peer_id: Option<String>,

    #[arg(long, env = "USERNAME", default_value = "player")]
    pub username: String,

    #[arg(long, env = "ROOM_ID")]
    pub room_id: Option<String>,

    /// Virtual NIC interface name to create/open.
    #[arg(long, env = "NIC_NAME", default_value = "overlay0")]
    pub nic_name: String,

    /// Fail startup instead of continuing NIC-less if the adapter can't
    /// be opened (spec §4.2, §7).
    #[arg(long, env = "REQUIRE_NIC", default_value_t = false)]
    pub require_nic: bool,

    /// Punch retry schedule in milliseconds, comma-separated. Falls back
    /// to the built-in 1s/2s/4s schedule if unset.
    #[arg(long, env = "PUNCH_RETRY_MS", value_delimiter = ',')]
    pub punch_retry_ms: Vec<u64>,

    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value_t = 2)]
    pub probe_timeout_secs: u64,
}

impl Config {
    pub fn punch_retry_schedule(&self) -> Vec<Duration> {
        if self.punch_retry_ms.is_empty() {
            overlay_core::session::DEFAULT_PUNCH_RETRY_SCHEDULE.to_vec()
        } else {
            self.punch_retry_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
