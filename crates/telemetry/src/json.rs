// json.rs - JSON structured log backend
/// Emit one latency sample as a JSON line on stderr for machine parsing
#[inline]
pub fn emit(name: &str, ms: f64) {
    eprintln!(
        "{{\"t_ns\":{},\"stage\":\"{}\",\"latency_ms\":{:.3}}}",
        super::now_ns(),
        name,
        ms
    );
}
