//! In-memory [`TunDevice`] used by tests that exercise the packet pump
//! without a kernel interface.

use crate::TunDevice;
use crate::error::AdapterError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// A fake adapter with one inbound queue (packets injected *into* it,
/// i.e. what the pump would hand to the kernel) and one outbound queue
/// (packets the test enqueues to simulate the kernel handing work to
/// the pump).
pub struct FakeTunDevice {
    outbound_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
}

/// Test-side handle: push packets the adapter should "read" from the
/// kernel, and drain packets the pump injected back into it.
pub struct FakeTunHandle {
    pub outbound_tx: mpsc::Sender<Vec<u8>>,
    pub inbound_rx: mpsc::Receiver<Vec<u8>>,
}

pub fn pair() -> (FakeTunDevice, FakeTunHandle) {
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    (
        FakeTunDevice {
            outbound_rx: Mutex::new(outbound_rx),
            inbound_tx,
        },
        FakeTunHandle {
            outbound_tx,
            inbound_rx,
        },
    )
}

#[async_trait]
impl TunDevice for FakeTunDevice {
    async fn recv_outbound(&self, buf: &mut [u8]) -> Result<usize, AdapterError> {
        let mut rx = self.outbound_rx.lock().await;
        match rx.recv().await {
            Some(packet) => {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                Ok(n)
            }
            None => Err(AdapterError::SessionNotStarted),
        }
    }

    async fn inject_inbound(&self, packet: &[u8]) -> Result<(), AdapterError> {
        self.inbound_tx
            .send(packet.to_vec())
            .await
            .map_err(|_| AdapterError::SessionNotStarted)
    }
}
