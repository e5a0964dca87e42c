//! Host clock
//!
//! Wall-clock time in floating-point seconds, shared by both exported
//! clock symbols.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch with sub-second precision.
///
/// A system clock set before the epoch reads as `0.0`.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}
