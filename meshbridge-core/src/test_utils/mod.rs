//! Test utilities and helpers for the bridge
//!
//! Notification helpers with timeouts, polling for asynchronous state, and
//! fixtures that wire a mediator to loopback collaborators.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
