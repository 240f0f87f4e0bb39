// lib.rs - Main telemetry API
mod time;

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "human-log")]
mod log;

pub use time::{init, now_ns, since_ms};

/// Record a measurement in milliseconds and return it.
///
/// Emits the measurement to the configured backend (log or json); with no
/// backend feature enabled it only computes the value for the caller.
pub fn record_ms(name: &str, start_ns: u64) -> f64 {
    let ms = since_ms(start_ns);

    #[cfg(feature = "json")]
    json::emit(name, ms);

    #[cfg(all(not(feature = "json"), feature = "human-log"))]
    log::emit(name, ms);

    #[cfg(all(not(feature = "json"), not(feature = "human-log")))]
    let _ = name;

    ms
}

/// Time a single operation.
///
/// This is the main helper for measuring per-stage latency around a
/// processing call.
pub fn time_op<T>(name: &str, op: impl FnOnce() -> T) -> T {
    let t0 = now_ns();
    let out = op();
    record_ms(name, t0);
    out
}
