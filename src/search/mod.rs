//! Beam search over the composed network.
//!
//! - [`TraceArena`]: pooled backpointers with mark-and-sweep collection
//! - [`WordEndDetector`]: word-boundary classification of search steps
//! - [`SearchEngine`]: frame-synchronous expansion, recombination and pruning
//! - [`PathExtractor`]: best-path and lattice reconstruction from the arena

mod engine;
mod lattice;
mod path;
mod scorer;
mod trace;
mod word_end;

pub use engine::{EngineState, Hypothesis, SearchEngine, SearchStatistics};
pub use lattice::{Lattice, LatticeArc, WordBoundary};
pub use path::{BestPath, PathExtractor, PathItem};
pub use scorer::{EmissionScorer, ScoreMatrix};
pub use trace::{Trace, TraceArena, TraceMode};
pub use word_end::{HmmInventory, ModelInventory, WordEndDetector, WordEndType};

use crate::constants::{pruning, trace as trace_defaults};

/// Search parameters, usually derived from [`crate::config::Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Additive beam over the best score of a frame.
    pub beam_width: f32,
    /// Hypothesis-count cap applied after score pruning.
    pub max_hypotheses: Option<usize>,
    /// Separate beam for word-end hypotheses.
    pub word_end_pruning: Option<f32>,
    pub lattice_pruning: Option<f32>,
    /// Frames between arena collections; 0 never collects.
    pub purge_interval: u32,
    pub trace_mode: TraceMode,
    /// Follow epsilon-input arcs within a frame.
    pub allow_skips: bool,
    pub trace_increment: usize,
    pub ignore_last_output: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            beam_width: pruning::DEFAULT_BEAM_WIDTH,
            max_hypotheses: None,
            word_end_pruning: None,
            lattice_pruning: None,
            purge_interval: trace_defaults::DEFAULT_PURGE_INTERVAL,
            trace_mode: TraceMode::FirstBest,
            allow_skips: true,
            trace_increment: trace_defaults::DEFAULT_INCREMENT,
            ignore_last_output: false,
        }
    }
}
