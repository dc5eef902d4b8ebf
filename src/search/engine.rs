//! Frame-synchronous beam search over a search network.
//!
//! One [`SearchEngine`] decodes one segment at a time. Each call to
//! [`SearchEngine::feed`] consumes a frame of emission scores: every active
//! hypothesis is expanded along its emitting arcs, arrivals at the same state
//! are recombined, and the new frontier is pruned by beam, word-end beam and
//! hypothesis count. Backpointers go into a [`TraceArena`] that is collected
//! every `purge_interval` frames with the live hypotheses as roots.
//!
//! Ties are broken towards the lower `StateId` throughout. The active set is
//! kept sorted by state, and recombination only replaces a candidate on a
//! strictly lower score, so the earliest arrival wins a tie.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{DecoderError, Result};
use crate::search::lattice::Lattice;
use crate::search::path::{BestPath, PathExtractor};
use crate::search::scorer::EmissionScorer;
use crate::search::trace::{TraceArena, TraceMode};
use crate::search::word_end::WordEndDetector;
use crate::search::SearchConfig;
use crate::types::{is_finite_score, Frame, Label, Score, StateId, TraceRef, INFINITE_SCORE};
use crate::wfst::{FstArc, SearchNetwork};

/// A live partial path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hypothesis {
    pub state: StateId,
    pub score: Score,
    pub trace: TraceRef,
}

/// Lifecycle of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Segment started, no frame consumed yet.
    Idle,
    /// At least one frame consumed and hypotheses remain.
    Active,
    /// End of input signalled or search space exhausted.
    Finished,
}

/// Counters for one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStatistics {
    pub frames: u64,
    pub expanded_arcs: u64,
    pub pruned_hypotheses: u64,
    pub purges: u64,
    pub reclaimed_traces: u64,
    pub peak_active: usize,
}

/// Best hypothesis seen so far at a final state, final weight included.
#[derive(Debug, Clone, Copy)]
struct FinalCandidate {
    trace: TraceRef,
    score: Score,
}

/// Arrival at a destination state during one frame.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    state: StateId,
    score: Score,
    trace: TraceRef,
    word_end: bool,
}

/// Beam-search decoder for one segment at a time.
pub struct SearchEngine {
    config: SearchConfig,
    network: Arc<dyn SearchNetwork>,
    detector: WordEndDetector,
    arena: TraceArena,
    active: Vec<Hypothesis>,
    best_final: Option<FinalCandidate>,
    // best final hypothesis of the last frontier, set by `finish`
    segment_end: Option<FinalCandidate>,
    frame: Frame,
    state: EngineState,
    stats: SearchStatistics,
    // per-frame scratch, reused across frames
    candidates: Vec<Candidate>,
    slot_of: FxHashMap<StateId, usize>,
    closure: VecDeque<usize>,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("state", &self.state)
            .field("frame", &self.frame)
            .field("active", &self.active.len())
            .field("traces", &self.arena.len())
            .finish()
    }
}

impl SearchEngine {
    /// Create an engine and start its first segment on `network`.
    pub fn new(
        config: SearchConfig,
        network: Arc<dyn SearchNetwork>,
        detector: WordEndDetector,
    ) -> Self {
        let arena = TraceArena::new(config.trace_increment, config.trace_mode);
        let mut engine = Self {
            config,
            network,
            detector,
            arena,
            active: Vec::new(),
            best_final: None,
            segment_end: None,
            frame: 0,
            state: EngineState::Idle,
            stats: SearchStatistics::default(),
            candidates: Vec::new(),
            slot_of: FxHashMap::default(),
            closure: VecDeque::new(),
        };
        engine.begin_segment();
        engine
    }

    /// Start a new segment on `network`, dropping all hypotheses and traces.
    ///
    /// Must be called after the network manager rebuilt its composition, since
    /// state ids of the old composition are meaningless on the new one.
    pub fn restart(&mut self, network: Arc<dyn SearchNetwork>) {
        self.network = network;
        self.begin_segment();
    }

    fn begin_segment(&mut self) {
        self.arena.clear();
        self.active.clear();
        self.best_final = None;
        self.segment_end = None;
        self.frame = 0;
        self.stats = SearchStatistics::default();
        self.state = EngineState::Idle;

        let Some(start) = self.network.start() else {
            warn!("search network has no start state, segment will be empty");
            self.state = EngineState::Finished;
            return;
        };

        let root = self.arena.add_trace(
            TraceRef::INVALID,
            TraceRef::INVALID,
            Label::EPSILON,
            Label::EPSILON,
            0,
            0.0,
            0.0,
            false,
        );
        self.begin_frame();
        self.candidates.push(Candidate {
            state: start,
            score: 0.0,
            trace: root,
            word_end: false,
        });
        self.slot_of.insert(start, 0);
        if self.config.allow_skips {
            self.close_over_skips(0);
        }
        let survivors = self.prune_frontier();
        self.active = survivors;
        self.stats.peak_active = self.active.len();
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of frames consumed in this segment.
    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Current active set, sorted by state.
    pub fn active(&self) -> &[Hypothesis] {
        &self.active
    }

    pub fn arena(&self) -> &TraceArena {
        &self.arena
    }

    pub fn statistics(&self) -> &SearchStatistics {
        &self.stats
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Consume one frame of emission scores.
    pub fn feed(&mut self, scorer: &dyn EmissionScorer) -> Result<EngineState> {
        if self.state == EngineState::Finished {
            return Err(DecoderError::InvalidState(
                "frame fed to a finished segment; restart the engine first".to_string(),
            ));
        }
        self.state = EngineState::Active;
        let t = self.frame;

        self.update_best_final();
        self.expand(scorer, t);
        let before = self.candidates.len();
        let survivors = self.prune_frontier();
        let pruned = (before - survivors.len()) as u64;
        self.active = survivors;
        self.frame += 1;

        self.stats.frames += 1;
        self.stats.pruned_hypotheses += pruned;
        self.stats.peak_active = self.stats.peak_active.max(self.active.len());
        metrics::counter!("decoder_frames_total").increment(1);
        metrics::counter!("decoder_pruned_hypotheses_total").increment(pruned);
        metrics::gauge!("decoder_active_hypotheses").set(self.active.len() as f64);
        trace!(
            frame = t,
            active = self.active.len(),
            pruned,
            "frame expanded"
        );

        let interval = self.config.purge_interval;
        if interval > 0 && self.frame % interval == 0 {
            self.purge();
        }

        if self.active.is_empty() {
            warn!(frame = t, "search space exhausted, no hypotheses survived");
            self.state = EngineState::Finished;
        }
        Ok(self.state)
    }

    /// Signal end of input; final weights are evaluated on the last frontier.
    ///
    /// The segment result ends on that frontier when it holds a final state.
    /// Otherwise it falls back to the best final candidate seen during search.
    pub fn finish(&mut self) {
        if self.state != EngineState::Finished {
            self.segment_end = self.frontier_best_final();
            self.offer_final(self.segment_end);
            self.state = EngineState::Finished;
        }
        debug!(
            frames = self.stats.frames,
            expanded_arcs = self.stats.expanded_arcs,
            peak_active = self.stats.peak_active,
            traces = self.arena.len(),
            "segment finished"
        );
    }

    /// Best final candidate seen so far, final weight included.
    ///
    /// Only replaced by a strictly lower score; ties keep the earliest.
    pub fn best_final_score(&self) -> Option<Score> {
        self.best_final.map(|b| b.score)
    }

    fn result_candidate(&self) -> Option<FinalCandidate> {
        self.segment_end.or(self.best_final)
    }

    /// Best word sequence of the segment, or `None` when no hypothesis ever
    /// reached a final state.
    ///
    /// The path score includes the final weight of the terminal state.
    pub fn best_path(&self) -> Result<Option<BestPath>> {
        let Some(best) = self.result_candidate() else {
            warn!(
                frames = self.stats.frames,
                "no final state reached, returning empty result"
            );
            return Ok(None);
        };
        let mut path = PathExtractor::new(&self.arena).create_best_path(
            &self.detector,
            self.config.ignore_last_output,
            best.trace,
        )?;
        path.score = best.score;
        Ok(Some(path))
    }

    /// Word lattice of the segment, or `None` when no final state was reached.
    pub fn lattice(&self) -> Result<Option<Lattice>> {
        if self.config.trace_mode != TraceMode::Lattice {
            return Err(DecoderError::Configuration(
                "lattice requested but lattice generation is disabled".to_string(),
            ));
        }
        let Some(best) = self.result_candidate() else {
            warn!(
                frames = self.stats.frames,
                "no final state reached, returning empty lattice"
            );
            return Ok(None);
        };
        PathExtractor::new(&self.arena)
            .create_lattice(best.trace, self.config.lattice_pruning)
            .map(Some)
    }

    /// Decode `frames` frames of `scorer` as one segment on the current network.
    pub fn decode(
        &mut self,
        scorer: &dyn EmissionScorer,
        frames: usize,
    ) -> Result<Option<BestPath>> {
        self.begin_segment();
        for _ in 0..frames {
            if self.feed(scorer)? == EngineState::Finished {
                break;
            }
        }
        self.finish();
        let path = self.best_path()?;
        metrics::counter!("decoder_segments_total").increment(1);
        if path.is_none() {
            metrics::counter!("decoder_empty_segments_total").increment(1);
        }
        Ok(path)
    }

    fn begin_frame(&mut self) {
        self.candidates.clear();
        self.slot_of.clear();
        self.closure.clear();
    }

    /// Step 1: offer the best final hypothesis of the frontier as best-final
    /// candidate.
    fn update_best_final(&mut self) {
        let frame_best = self.frontier_best_final();
        self.offer_final(frame_best);
    }

    /// Replace the best-final candidate only on a strictly lower score.
    fn offer_final(&mut self, candidate: Option<FinalCandidate>) {
        let Some(c) = candidate else { return };
        if self.best_final.map_or(true, |b| c.score < b.score) {
            self.best_final = Some(c);
        }
    }

    /// Best hypothesis of the active set sitting in a final state. The active
    /// set is sorted by state, so a tie keeps the lower state.
    fn frontier_best_final(&self) -> Option<FinalCandidate> {
        let mut frame_best: Option<FinalCandidate> = None;
        for h in &self.active {
            let weight = self.network.final_weight(h.state);
            if !is_finite_score(weight) {
                continue;
            }
            let score = h.score + weight;
            if frame_best.map_or(true, |b| score < b.score) {
                frame_best = Some(FinalCandidate {
                    trace: h.trace,
                    score,
                });
            }
        }
        frame_best
    }

    /// Steps 2 and 3: expand emitting arcs, recombine, then follow skips.
    fn expand(&mut self, scorer: &dyn EmissionScorer, t: Frame) {
        self.begin_frame();
        let time = t + 1;
        let active = std::mem::take(&mut self.active);
        for h in &active {
            let arcs = self.network.arcs(h.state);
            for arc in arcs.iter().filter(|a| !a.input.is_epsilon()) {
                let emission = scorer.score(arc.input, t);
                if !is_finite_score(emission) {
                    continue;
                }
                self.stats.expanded_arcs += 1;
                let score = h.score + arc.weight + emission;
                self.relax(arc, score, h.trace, time);
            }
        }
        self.active = active;

        if self.config.allow_skips {
            self.close_over_skips(time);
        }
    }

    /// Follow epsilon-input arcs from every candidate without consuming a frame.
    ///
    /// Only strict improvements are propagated, so the closure terminates as
    /// long as the network has no negative-weight epsilon cycle.
    fn close_over_skips(&mut self, time: Frame) {
        self.closure.extend(0..self.candidates.len());
        while let Some(i) = self.closure.pop_front() {
            let from = self.candidates[i];
            let arcs = self.network.arcs(from.state);
            for arc in arcs.iter().filter(|a| a.input.is_epsilon()) {
                let score = from.score + arc.weight;
                if let Some(j) = self.relax(arc, score, from.trace, time) {
                    self.closure.push_back(j);
                }
            }
        }
    }

    /// Offer an arrival at `arc.next`; returns the candidate slot if it won.
    fn relax(
        &mut self,
        arc: &FstArc,
        score: Score,
        predecessor: TraceRef,
        time: Frame,
    ) -> Option<usize> {
        if !is_finite_score(score) {
            return None;
        }
        let from_input = self
            .arena
            .get(predecessor)
            .map_or(Label::EPSILON, |t| t.input);
        let word_end = self.detector.is_word_end(arc, from_input);

        let Some(&i) = self.slot_of.get(&arc.next) else {
            let trace = self.arena.add_trace(
                TraceRef::INVALID,
                predecessor,
                arc.output,
                arc.input,
                time,
                score,
                arc.weight,
                word_end,
            );
            let i = self.candidates.len();
            self.candidates.push(Candidate {
                state: arc.next,
                score,
                trace,
                word_end,
            });
            self.slot_of.insert(arc.next, i);
            return Some(i);
        };

        let current = self.candidates[i];
        if score < current.score {
            let trace = match self.config.trace_mode {
                TraceMode::FirstBest if self.same_step(current.trace, arc, word_end) => {
                    self.arena
                        .update_trace(current.trace, TraceRef::INVALID, predecessor, score);
                    current.trace
                }
                // the old winner heads the sibling chain of the new one
                _ => self.arena.add_trace(
                    current.trace,
                    predecessor,
                    arc.output,
                    arc.input,
                    time,
                    score,
                    arc.weight,
                    word_end,
                ),
            };
            self.candidates[i] = Candidate {
                state: arc.next,
                score,
                trace,
                word_end,
            };
            Some(i)
        } else {
            if self.config.trace_mode == TraceMode::Lattice {
                self.record_loser(current.trace, arc, score, predecessor, time, word_end);
            }
            None
        }
    }

    /// Whether the trace at `at` records the same arc step, so that it can be
    /// re-pointed in place.
    fn same_step(&self, at: TraceRef, arc: &FstArc, word_end: bool) -> bool {
        self.arena.get(at).map_or(false, |t| {
            t.output == arc.output
                && t.input == arc.input
                && t.word_end == word_end
                && t.arc_score == arc.weight
        })
    }

    /// Chain a losing arrival right behind the winner of its destination.
    fn record_loser(
        &mut self,
        winner: TraceRef,
        arc: &FstArc,
        score: Score,
        predecessor: TraceRef,
        time: Frame,
        word_end: bool,
    ) {
        let Some(head) = self.arena.get(winner).copied() else {
            return;
        };
        let loser = self.arena.add_trace(
            head.sibling,
            predecessor,
            arc.output,
            arc.input,
            time,
            score,
            arc.weight,
            word_end,
        );
        self.arena
            .update_trace(winner, loser, head.predecessor, head.score);
    }

    /// Steps 4 and 5: beam, word-end beam, then the hypothesis-count cap.
    fn prune_frontier(&mut self) -> Vec<Hypothesis> {
        let best = self
            .candidates
            .iter()
            .map(|c| c.score)
            .fold(INFINITE_SCORE, f32::min);
        let threshold = best + self.config.beam_width;
        let mut survivors: Vec<Candidate> = self
            .candidates
            .iter()
            .filter(|c| c.score <= threshold)
            .copied()
            .collect();

        if let Some(word_end_beam) = self.config.word_end_pruning {
            let best_word_end = survivors
                .iter()
                .filter(|c| c.word_end)
                .map(|c| c.score)
                .fold(INFINITE_SCORE, f32::min);
            let limit = best_word_end + word_end_beam;
            survivors.retain(|c| !c.word_end || c.score <= limit);
        }

        if let Some(max) = self.config.max_hypotheses {
            if survivors.len() > max {
                survivors.sort_by(|a, b| {
                    a.score
                        .total_cmp(&b.score)
                        .then_with(|| a.state.cmp(&b.state))
                });
                survivors.truncate(max);
            }
        }

        survivors.sort_by_key(|c| c.state);
        survivors
            .into_iter()
            .map(|c| Hypothesis {
                state: c.state,
                score: c.score,
                trace: c.trace,
            })
            .collect()
    }

    /// Step 7: collect traces unreachable from the active set and the best final.
    fn purge(&mut self) {
        let roots = self
            .active
            .iter()
            .map(|h| h.trace)
            .chain(self.best_final.map(|b| b.trace));
        let reclaimed = self.arena.purge(roots.collect::<Vec<_>>());
        self.stats.purges += 1;
        self.stats.reclaimed_traces += reclaimed as u64;
        metrics::counter!("decoder_traces_reclaimed_total").increment(reclaimed as u64);
        metrics::gauge!("decoder_trace_arena_bytes").set(self.arena.memory_usage() as f64);
        debug!(
            frame = self.frame,
            reclaimed,
            live = self.arena.len(),
            capacity = self.arena.capacity(),
            "trace arena purged"
        );
    }
}
