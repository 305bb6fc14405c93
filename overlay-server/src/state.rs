use overlay_core::registry::RoomRegistry;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Process-wide shared state. The registry is the only thing mutated per
/// datagram, so it gets its own mutex (spec §5); `public_ip` and
/// `started_at` are set once at startup and read-only afterward.
pub struct AppState {
    pub registry: Mutex<RoomRegistry>,
    pub public_ip: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(public_ip: String) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(RoomRegistry::new()),
            public_ip,
            started_at: Instant::now(),
        })
    }
}
