pub mod bridge;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod test_utils;

pub use bridge::{BridgeError, BridgeNotification, BridgeResult, BridgeState, MediatorHandle};
pub use config::Config;
pub use logging::{init_logging, LogLevel};
