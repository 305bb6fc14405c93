//! Packet pump observer hook — spec §4.5, §9.
//!
//! A bounded, drop-on-overflow channel the pump publishes every
//! forwarded packet to. Built on [`tokio::sync::broadcast`], whose
//! native lagged-receiver behavior already implements "bounded queue,
//! drop oldest on overflow" without the pump ever blocking on a slow
//! subscriber (e.g. a future GUI log pane).

use crate::model::Endpoint;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Virtual NIC -> network (outbound, read from the kernel).
    NicToNet,
    /// Network -> virtual NIC (inbound, injected into the kernel).
    NetToNic,
}

#[derive(Debug, Clone)]
pub struct PumpEvent {
    pub direction: Direction,
    pub len: usize,
    pub endpoint: Option<Endpoint>,
}

/// Default capacity for the observer channel. Sized generously relative
/// to expected GUI polling cadence (spec §5: the GUI polls at >= 1s);
/// a slow subscriber drops old events rather than stalling the pump.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct Observer {
    tx: broadcast::Sender<PumpEvent>,
}

impl Observer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PumpEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Never blocks: `broadcast::Sender::send` is
    /// synchronous and only fails when there are no subscribers, which
    /// is an expected, silently ignored case (no GUI attached).
    pub fn publish(&self, event: PumpEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}
