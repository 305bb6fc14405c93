//! Virtual NIC adapter abstraction.
//!
//! Exposes the host-local layer-3 interface the packet pump reads
//! outbound packets from and injects inbound packets into. Real systems
//! use [`AsyncTunDevice`], backed by the `tun` crate; tests substitute
//! [`fake::FakeTunDevice`] so the pump can be exercised without a kernel
//! device or elevated privileges.

pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;

use async_trait::async_trait;
use error::AdapterError;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tun::AsyncDevice;

/// Default ring capacity requested when starting a session, mirroring the
/// WinTun default of 4 MiB used by the reference client.
pub const DEFAULT_RING_CAPACITY: usize = 0x40_0000;

/// Capability set a packet pump needs from a virtual NIC.
///
/// `recv_outbound` doubles as the "readable event" spec.md's adapter
/// exposes: the returned future only resolves once a packet is queued,
/// so a pump `select!`-ing on it gets event-driven wakeup for free
/// instead of the bounded polling fallback spec.md allows for adapters
/// that can't expose a native event.
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Block (asynchronously) until the kernel has an outbound packet
    /// queued, then copy it into `buf`. Returns the packet length.
    async fn recv_outbound(&self, buf: &mut [u8]) -> Result<usize, AdapterError>;

    /// Inject `packet` as an inbound IP packet, verbatim.
    async fn inject_inbound(&self, packet: &[u8]) -> Result<(), AdapterError>;
}

/// `tun`-crate-backed adapter. Opens (or creates) the named interface at
/// construction time; [`AdapterError::AdapterUnavailable`] propagates
/// when the platform driver is missing, letting the caller keep running
/// with the NIC half of the pump disabled.
pub struct AsyncTunDevice {
    device: Mutex<AsyncDevice>,
}

impl AsyncTunDevice {
    pub fn open(name: &str) -> Result<Self, AdapterError> {
        let mut config = tun::Configuration::default();
        config.name(name).up();

        let device = tun::create_as_async(&config)
            .map_err(|e| AdapterError::AdapterUnavailable(format!("{name}: {e}")))?;
        Ok(Self {
            device: Mutex::new(device),
        })
    }

    pub fn into_shared(self) -> Arc<dyn TunDevice> {
        Arc::new(self)
    }
}

#[async_trait]
impl TunDevice for AsyncTunDevice {
    async fn recv_outbound(&self, buf: &mut [u8]) -> Result<usize, AdapterError> {
        let mut device = self.device.lock().await;
        let n = device.read(buf).await?;
        Ok(n)
    }

    async fn inject_inbound(&self, packet: &[u8]) -> Result<(), AdapterError> {
        let mut device = self.device.lock().await;
        device.write_all(packet).await?;
        Ok(())
    }
}
