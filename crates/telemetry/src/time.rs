// time.rs - Core time measurement utilities
use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Pin the process-wide epoch. Idempotent; the first caller wins.
pub fn init() {
    let _ = EPOCH.set(Instant::now());
}

/// Returns nanoseconds since the epoch (monotonic)
#[inline]
pub fn now_ns() -> u64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Returns milliseconds elapsed since start_ns
#[inline]
pub fn since_ms(start_ns: u64) -> f64 {
    (now_ns().saturating_sub(start_ns)) as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_and_nonnegative() {
        init();
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
        assert!(since_ms(a) >= 0.0);
    }
}
