use std::collections::HashMap;

/// Per-stage throughput and latency counters, updated by the stage worker.
#[derive(Debug, Clone, Default)]
pub struct StageMetrics {
    pub items_in: u64,
    pub items_out: u64,
    pub failures: u64,
    pub total_latency_ns: u64,
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    pub last_latency_ns: u64,
}

impl StageMetrics {
    pub fn record(&mut self, latency_ns: u64, produced: u64) {
        self.items_in += 1;
        self.items_out += produced;
        self.total_latency_ns += latency_ns;
        self.last_latency_ns = latency_ns;
        if self.items_in == 1 {
            self.min_latency_ns = latency_ns;
            self.max_latency_ns = latency_ns;
        } else {
            self.min_latency_ns = self.min_latency_ns.min(latency_ns);
            self.max_latency_ns = self.max_latency_ns.max(latency_ns);
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.items_in > 0 {
            (self.total_latency_ns as f64 / self.items_in as f64) / 1_000_000.0
        } else {
            0.0
        }
    }

    pub fn min_latency_ms(&self) -> f64 {
        self.min_latency_ns as f64 / 1_000_000.0
    }

    pub fn max_latency_ms(&self) -> f64 {
        self.max_latency_ns as f64 / 1_000_000.0
    }

    pub fn last_latency_ms(&self) -> f64 {
        self.last_latency_ns as f64 / 1_000_000.0
    }
}

/// Aggregate counters for a whole run, shared behind `Arc<Mutex<_>>`.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub stages: HashMap<String, StageMetrics>,
    /// Buffers that reached the sink stage.
    pub buffers_delivered: u64,
}

impl PipelineStats {
    pub fn stage(&mut self, name: &str) -> &mut StageMetrics {
        self.stages.entry(name.to_string()).or_default()
    }

    /// Sum of the per-stage average latencies, an upper bound on the
    /// steady-state end-to-end latency of one buffer.
    pub fn total_latency_ms(&self) -> f64 {
        self.stages.values().map(|m| m.average_latency_ms()).sum()
    }
}
