//! Shared data model, wire codec, room registry, peer session and
//! packet pump for the LAN-over-Internet overlay.
//!
//! `overlay-server` links this for [`registry`] and [`protocol`];
//! `overlay-client` links it for [`session`], [`pump`] and
//! [`observer`] in addition.

pub mod error;
pub mod model;
pub mod observer;
pub mod protocol;
pub mod pump;
pub mod registry;
pub mod session;
