//! Wall-clock helpers for log timestamps.
use std::time::Instant;
use lazy_static::*;

lazy_static!{
    static ref BOOT_INSTANT: Instant = Instant::now();
}

/// Seconds elapsed since the first call into the simulator.
pub fn get_time_second() -> f64 {
    BOOT_INSTANT.elapsed().as_secs_f64()
}
