// log.rs - Human-readable log backend
/// Emit one latency sample in human-readable form to stderr
#[inline]
pub fn emit(name: &str, ms: f64) {
    eprintln!("[stage] {name} took {ms:.2}ms");
}
