//! Small shared helpers: logging setup, signals, time and panic payloads

pub mod logging;
pub mod panic;
pub mod signal;
pub mod time;

pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use panic::panic_message;
pub use signal::wait_for_shutdown_signal;
pub use time::current_timestamp;
