// src/metrics.rs

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref COMMANDS_PROCESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("commands_processed_total", "Requests dispatched, by opcode"),
        &["opcode"]
    )
    .expect("metric can be created");

    pub static ref SLOW_OPS_TOTAL: IntCounter =
        IntCounter::new("slow_ops_total", "Operations logged for exceeding the slow-op threshold")
            .expect("metric can be created");

    pub static ref CURRENT_OP_COUNT: IntGauge =
        IntGauge::new("current_op_count", "Operations currently registered as in-flight")
            .expect("metric can be created");

    pub static ref GETMORE_WAITS_TOTAL: IntCounter =
        IntCounter::new("getmore_waits_total", "get_more calls that entered a long-poll wait")
            .expect("metric can be created");
}

/// Registers every metric with the process-global registry. Idempotent
/// only in the sense that it should be called exactly once at startup;
/// mirrors `core/metrics.rs`'s registration block.
pub fn register() {
    let _ = REGISTRY.register(Box::new(COMMANDS_PROCESSED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SLOW_OPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CURRENT_OP_COUNT.clone()));
    let _ = REGISTRY.register(Box::new(GETMORE_WAITS_TOTAL.clone()));
}

pub fn gather_metrics() -> Result<String, anyhow::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
