//! Rendezvous server library surface, split out from `main.rs` so
//! integration tests can drive the dispatch loop directly.

pub mod config;
pub mod http;
pub mod state;
pub mod udp;
