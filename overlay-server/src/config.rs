use clap::Parser;

/// Rendezvous server: UDP room registry plus an HTTP health side-channel
/// (spec §6). Environment variable names match the original deployment
/// (`UDP_PORT`, `FLASK_PORT`, `PUBLIC_IP`) so existing container/compose
/// configs keep working unchanged.
#[derive(Parser, Debug, Clone)]
#[command(name = "overlay-server", about = "LAN-over-Internet rendezvous server")]
pub struct Config {
    /// UDP port the rendezvous protocol listens on.
    #[arg(long, env = "UDP_PORT", default_value_t = 5000)]
    pub udp_port: u16,

    /// HTTP port serving `/` and `/health` liveness probes.
    #[arg(long, env = "FLASK_PORT", default_value_t = 5001)]
    pub http_port: u16,

    /// Advertised identity string for the `/health` payload and startup
    /// log line. The wire protocol itself never needs this: every
    /// control reply already targets the datagram's own source address.
    #[arg(long, env = "PUBLIC_IP")]
    pub public_ip: Option<String>,
}
