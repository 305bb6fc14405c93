use thiserror::Error;

/// Failure modes of the virtual NIC adapter.
///
/// `AdapterUnavailable` is not fatal to the client: callers disable the
/// NIC half of the packet pump and keep the control plane running.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("virtual NIC adapter '{0}' unavailable: driver missing or adapter could not be opened")]
    AdapterUnavailable(String),

    #[error("virtual NIC session not started")]
    SessionNotStarted,

    #[error("virtual NIC I/O error: {0}")]
    Io(#[from] std::io::Error),
}
