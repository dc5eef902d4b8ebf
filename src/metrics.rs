//! Decoder metrics.
//!
//! The search code records through the `metrics` facade only; without an
//! installed recorder every call is a no-op. [`DecoderMetrics`] installs a
//! Prometheus recorder whose snapshot can be rendered at any time.

use metrics::{describe_counter, describe_gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{DecoderError, Result};

/// Installed Prometheus recorder.
pub struct DecoderMetrics {
    handle: PrometheusHandle,
}

impl DecoderMetrics {
    /// Install the recorder and describe every decoder metric.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| DecoderError::Configuration(format!("cannot install metrics recorder: {}", e)))?;
        register_metrics();
        info!("Metrics collection initialized");
        Ok(Self { handle })
    }

    /// Current values in the Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Describe the decoder metrics on the installed recorder.
pub fn register_metrics() {
    describe_counter!("decoder_frames_total", "Frames consumed by the beam search");
    describe_gauge!(
        "decoder_active_hypotheses",
        "Hypotheses surviving the most recent frame"
    );
    describe_counter!(
        "decoder_pruned_hypotheses_total",
        "Hypotheses removed by beam, word-end or count pruning"
    );
    describe_gauge!(
        "decoder_trace_arena_bytes",
        Unit::Bytes,
        "Memory held by the trace arena"
    );
    describe_counter!(
        "decoder_traces_reclaimed_total",
        "Trace slots returned to the free list by garbage collection"
    );
    describe_counter!(
        "decoder_network_rebuilds_total",
        "Rebuilds of the composed search network"
    );
    describe_counter!("decoder_segments_total", "Segments decoded");
    describe_counter!(
        "decoder_empty_segments_total",
        "Segments that ended without reaching a final state"
    );
}
