//! Wall-clock helpers

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Current Unix timestamp in seconds
///
/// Returns 0 if the system clock is before the epoch instead of panicking.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| {
            warn!("System time is before UNIX epoch, using 0 as timestamp");
            Duration::from_secs(0)
        })
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_recent() {
        // 2020-01-01
        assert!(current_timestamp() > 1_577_836_800);
    }
}
