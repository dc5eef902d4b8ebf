//! Word lattices reconstructed from sibling-chained traces.
//!
//! In lattice mode every recombination loser stays in the arena as a sibling of
//! the winning trace, so a destination state at a given time owns a chain of
//! alternative arrivals. Lattice states are the chains that sit on a word
//! boundary (the search root, word-end steps and the final trace); each lattice
//! arc summarises one word-internal span between two such boundaries.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{DecoderError, Result};
use crate::search::trace::TraceArena;
use crate::types::{Frame, Label, Score, TraceRef, INFINITE_SCORE};

/// Transition of the word lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeArc {
    /// Word emitted on the span, or epsilon.
    pub label: Label,
    /// Score accumulated over the span.
    pub weight: Score,
    /// Target lattice state.
    pub next: usize,
}

/// Timing of one lattice state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WordBoundary {
    pub time: Frame,
    /// Best cumulative search score at the boundary.
    pub score: Score,
}

/// Acyclic word automaton with a boundary table parallel to its states.
///
/// States are numbered in topological order: every arc goes from a lower to a
/// higher state index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    arcs: Vec<Vec<LatticeArc>>,
    boundaries: Vec<WordBoundary>,
    start: usize,
    final_state: usize,
}

impl Lattice {
    pub fn num_states(&self) -> usize {
        self.arcs.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.iter().map(Vec::len).sum()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn final_state(&self) -> usize {
        self.final_state
    }

    pub fn arcs(&self, state: usize) -> &[LatticeArc] {
        self.arcs.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn boundary(&self, state: usize) -> Option<&WordBoundary> {
        self.boundaries.get(state)
    }

    pub fn boundaries(&self) -> &[WordBoundary] {
        &self.boundaries
    }

    /// Forward scores from the start state.
    fn forward(&self) -> Vec<Score> {
        let mut alpha = vec![INFINITE_SCORE; self.num_states()];
        if let Some(a) = alpha.get_mut(self.start) {
            *a = 0.0;
        }
        for s in 0..self.num_states() {
            if !alpha[s].is_finite() {
                continue;
            }
            for arc in &self.arcs[s] {
                let score = alpha[s] + arc.weight;
                if score < alpha[arc.next] {
                    alpha[arc.next] = score;
                }
            }
        }
        alpha
    }

    /// Backward scores to the final state.
    fn backward(&self) -> Vec<Score> {
        let mut beta = vec![INFINITE_SCORE; self.num_states()];
        if let Some(b) = beta.get_mut(self.final_state) {
            *b = 0.0;
        }
        for s in (0..self.num_states()).rev() {
            for arc in &self.arcs[s] {
                let score = arc.weight + beta[arc.next];
                if score < beta[s] {
                    beta[s] = score;
                }
            }
        }
        beta
    }

    /// Score of the best start-to-final path.
    pub fn best_score(&self) -> Score {
        self.forward()
            .get(self.final_state)
            .copied()
            .unwrap_or(INFINITE_SCORE)
    }

    /// Non-epsilon labels of the best start-to-final path.
    pub fn best_words(&self) -> Vec<Label> {
        let beta = self.backward();
        let mut words = Vec::new();
        let mut s = self.start;
        while s != self.final_state {
            let Some(arc) = self.arcs(s).iter().min_by(|a, b| {
                (a.weight + beta[a.next]).total_cmp(&(b.weight + beta[b.next]))
            }) else {
                break;
            };
            if !arc.label.is_epsilon() {
                words.push(arc.label);
            }
            s = arc.next;
        }
        words
    }

    /// Forward-backward pruning: keep only arcs on some path within
    /// `threshold` of the best path, then drop unreachable states.
    pub fn prune(&self, threshold: f32) -> Lattice {
        let alpha = self.forward();
        let beta = self.backward();
        let Some(&best) = alpha.get(self.final_state) else {
            return self.clone();
        };
        if !best.is_finite() {
            return self.clone();
        }
        let limit = best + threshold;

        let mut remap = vec![usize::MAX; self.num_states()];
        let mut kept = 0;
        for s in 0..self.num_states() {
            if alpha[s] + beta[s] <= limit {
                remap[s] = kept;
                kept += 1;
            }
        }

        let mut arcs = vec![Vec::new(); kept];
        let mut boundaries = Vec::with_capacity(kept);
        for s in 0..self.num_states() {
            if remap[s] == usize::MAX {
                continue;
            }
            boundaries.push(self.boundaries[s]);
            for arc in &self.arcs[s] {
                if remap[arc.next] != usize::MAX && alpha[s] + arc.weight + beta[arc.next] <= limit
                {
                    arcs[remap[s]].push(LatticeArc {
                        next: remap[arc.next],
                        ..*arc
                    });
                }
            }
        }

        tracing::debug!(
            states_before = self.num_states(),
            states_after = kept,
            "lattice pruned"
        );
        Lattice {
            arcs,
            boundaries,
            start: remap[self.start],
            final_state: remap[self.final_state],
        }
    }
}

fn is_boundary(arena: &TraceArena, at: TraceRef, end: TraceRef) -> bool {
    at == end
        || arena
            .get(at)
            .map_or(false, |t| t.word_end || !t.predecessor.is_valid())
}

/// Head of the sibling chain holding `at`.
///
/// A skip taken within a frame can leave a trace pointing at an arrival that
/// a later, better arrival at the same state pushed down its chain.
fn chain_head(parents: &FxHashMap<TraceRef, TraceRef>, mut at: TraceRef) -> TraceRef {
    while let Some(&parent) = parents.get(&at) {
        at = parent;
    }
    at
}

/// Lattice states discovered so far, keyed by their boundary trace.
#[derive(Default)]
struct StateTable {
    index: FxHashMap<TraceRef, usize>,
    heads: Vec<TraceRef>,
    pending: Vec<usize>,
}

impl StateTable {
    fn intern(&mut self, head: TraceRef) -> usize {
        if let Some(&s) = self.index.get(&head) {
            return s;
        }
        let s = self.heads.len();
        self.index.insert(head, s);
        self.heads.push(head);
        self.pending.push(s);
        s
    }
}

/// Build the word lattice of everything reachable from `end`.
pub(crate) fn build_lattice(arena: &TraceArena, end: TraceRef) -> Result<Lattice> {
    let mut states = StateTable::default();
    // (src, dst, label) -> best span weight
    let mut spans: FxHashMap<(usize, usize, Label), Score> = FxHashMap::default();
    let mut walk: Vec<(TraceRef, Score, Label)> = Vec::new();
    let mut seen: FxHashMap<(TraceRef, Label), Score> = FxHashMap::default();
    // sibling -> the trace whose chain link points at it
    let parents: FxHashMap<TraceRef, TraceRef> = arena
        .iter()
        .filter(|(_, t)| t.sibling.is_valid())
        .map(|(at, t)| (t.sibling, at))
        .collect();

    let final_state = states.intern(chain_head(&parents, end));
    while let Some(dst) = states.pending.pop() {
        seen.clear();
        // every arrival at the boundary state ends its own span
        let mut member = states.heads[dst];
        while let Some(trace) = arena.get(member) {
            if trace.predecessor.is_valid() {
                walk.push((member, 0.0, Label::EPSILON));
            }
            member = trace.sibling;
        }

        while let Some((at, weight, label)) = walk.pop() {
            let Some(trace) = arena.get(at) else { continue };
            let Some(pred) = arena.get(trace.predecessor) else {
                continue;
            };
            let weight = weight + (trace.score - pred.score);
            let label = if label.is_epsilon() { trace.output } else { label };

            if seen.get(&(at, label)).map_or(false, |&w| w <= weight) {
                continue;
            }
            seen.insert((at, label), weight);

            if is_boundary(arena, trace.predecessor, end) {
                let src = states.intern(chain_head(&parents, trace.predecessor));
                let best = spans.entry((src, dst, label)).or_insert(INFINITE_SCORE);
                if weight < *best {
                    *best = weight;
                }
            } else {
                let mut alt = trace.predecessor;
                while let Some(t) = arena.get(alt) {
                    walk.push((alt, weight, label));
                    alt = t.sibling;
                }
            }
        }
    }

    order_states(arena, &states.heads, spans, final_state)
}

/// Renumber the collected states topologically and assemble the lattice.
fn order_states(
    arena: &TraceArena,
    heads: &[TraceRef],
    spans: FxHashMap<(usize, usize, Label), Score>,
    final_state: usize,
) -> Result<Lattice> {
    let n = heads.len();
    let mut out: Vec<Vec<LatticeArc>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for (&(src, dst, label), &weight) in &spans {
        out[src].push(LatticeArc {
            label,
            weight,
            next: dst,
        });
        indegree[dst] += 1;
    }

    // roots first, ties by time so the numbering is stable
    let mut ready: Vec<usize> = (0..n).filter(|&s| indegree[s] == 0).collect();
    ready.sort_by_key(|&s| (time_of(arena, heads[s]), heads[s]));
    let mut queue: VecDeque<usize> = ready.into();
    let mut order = Vec::with_capacity(n);
    while let Some(s) = queue.pop_front() {
        order.push(s);
        let mut next: Vec<usize> = Vec::new();
        for arc in &out[s] {
            indegree[arc.next] -= 1;
            if indegree[arc.next] == 0 {
                next.push(arc.next);
            }
        }
        next.sort_by_key(|&s| (time_of(arena, heads[s]), heads[s]));
        queue.extend(next);
    }
    if order.len() != n {
        return Err(DecoderError::Consistency(
            "trace graph below the lattice end contains a cycle".to_string(),
        ));
    }

    let mut position = vec![0usize; n];
    for (new, &old) in order.iter().enumerate() {
        position[old] = new;
    }

    let mut arcs = vec![Vec::new(); n];
    let mut boundaries = Vec::with_capacity(n);
    for &old in &order {
        let trace = arena.get(heads[old]);
        boundaries.push(WordBoundary {
            time: trace.map_or(0, |t| t.time),
            score: trace.map_or(INFINITE_SCORE, |t| t.score),
        });
        let mut state_arcs: Vec<LatticeArc> = out[old]
            .iter()
            .map(|a| LatticeArc {
                next: position[a.next],
                ..*a
            })
            .collect();
        state_arcs.sort_by(|a, b| a.next.cmp(&b.next).then(a.label.cmp(&b.label)));
        arcs[position[old]] = state_arcs;
    }

    let start = order
        .iter()
        .position(|&s| {
            arena
                .get(heads[s])
                .map_or(false, |t| !t.predecessor.is_valid())
        })
        .unwrap_or(0);
    Ok(Lattice {
        arcs,
        boundaries,
        start,
        final_state: position[final_state],
    })
}

fn time_of(arena: &TraceArena, r: TraceRef) -> Frame {
    arena.get(r).map_or(0, |t| t.time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::trace::TraceMode;

    const CAT: Label = Label(10);
    const BAT: Label = Label(11);
    const SAT: Label = Label(12);

    fn step(
        arena: &mut TraceArena,
        sibling: TraceRef,
        pred: TraceRef,
        output: Label,
        time: Frame,
        score: Score,
        word_end: bool,
    ) -> TraceRef {
        arena.add_trace(sibling, pred, output, Label(1), time, score, 0.0, word_end)
    }

    /// root -> {CAT 1.0 | BAT 1.5} -> SAT, recombined at the first word end.
    fn two_word_arena() -> (TraceArena, TraceRef) {
        let mut arena = TraceArena::new(16, TraceMode::Lattice);
        let root = step(&mut arena, TraceRef::INVALID, TraceRef::INVALID, Label::EPSILON, 0, 0.0, false);
        let bat = step(&mut arena, TraceRef::INVALID, root, BAT, 1, 1.5, true);
        let cat = step(&mut arena, bat, root, CAT, 1, 1.0, true);
        let mid = step(&mut arena, TraceRef::INVALID, cat, Label::EPSILON, 2, 1.5, false);
        let sat = step(&mut arena, TraceRef::INVALID, mid, SAT, 3, 2.25, true);
        (arena, sat)
    }

    #[test]
    fn test_siblings_become_parallel_arcs() {
        let (arena, end) = two_word_arena();
        let lattice = build_lattice(&arena, end).unwrap();

        assert_eq!(lattice.num_states(), 3);
        assert_eq!(lattice.start(), 0);
        assert_eq!(lattice.final_state(), 2);
        let first: Vec<Label> = lattice.arcs(0).iter().map(|a| a.label).collect();
        assert_eq!(first, vec![CAT, BAT]);
        assert_eq!(lattice.arcs(1).len(), 1);
        assert_eq!(lattice.arcs(1)[0].label, SAT);
        assert!((lattice.arcs(1)[0].weight - 1.25).abs() < 1e-6);

        assert_eq!(lattice.best_words(), vec![CAT, SAT]);
        assert!((lattice.best_score() - 2.25).abs() < 1e-6);
        assert_eq!(lattice.boundary(1).unwrap().time, 1);
        assert_eq!(lattice.boundary(2).unwrap().time, 3);
    }

    #[test]
    fn test_pruning_drops_distant_alternatives() {
        let (arena, end) = two_word_arena();
        let lattice = build_lattice(&arena, end).unwrap();

        let wide = lattice.prune(1.0);
        assert_eq!(wide.num_arcs(), 3);
        let narrow = lattice.prune(0.25);
        assert_eq!(narrow.num_arcs(), 2);
        assert_eq!(narrow.best_words(), vec![CAT, SAT]);
        assert_eq!(narrow.best_score(), lattice.best_score());
    }

    #[test]
    fn test_first_best_arena_gives_linear_lattice() {
        let mut arena = TraceArena::new(16, TraceMode::FirstBest);
        let root = step(&mut arena, TraceRef::INVALID, TraceRef::INVALID, Label::EPSILON, 0, 0.0, false);
        let other = step(&mut arena, TraceRef::INVALID, root, BAT, 1, 1.5, true);
        let cat = step(&mut arena, other, root, CAT, 1, 1.0, true);
        let lattice = build_lattice(&arena, cat).unwrap();
        assert_eq!(lattice.num_states(), 2);
        assert_eq!(lattice.num_arcs(), 1);
        assert_eq!(lattice.best_words(), vec![CAT]);
    }

    #[test]
    fn test_superseded_boundary_joins_its_chain_head() {
        let mut arena = TraceArena::new(16, TraceMode::Lattice);
        let root = step(&mut arena, TraceRef::INVALID, TraceRef::INVALID, Label::EPSILON, 0, 0.0, false);
        // two arrivals at one state in frame 1; the later one wins
        let stale = step(&mut arena, TraceRef::INVALID, root, CAT, 1, 2.0, true);
        let head = step(&mut arena, stale, root, CAT, 1, 1.0, true);
        // a skip taken from the first arrival before it was beaten, then
        // re-propagated from the winner
        let early = step(&mut arena, TraceRef::INVALID, stale, SAT, 1, 2.5, true);
        let end = step(&mut arena, early, head, SAT, 1, 1.5, true);

        let lattice = build_lattice(&arena, end).unwrap();
        assert_eq!(lattice.num_states(), 3);
        assert_eq!(lattice.num_arcs(), 2);
        assert_eq!(lattice.best_words(), vec![CAT, SAT]);
        assert!((lattice.best_score() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_lattice_serializes() {
        let (arena, end) = two_word_arena();
        let lattice = build_lattice(&arena, end).unwrap();
        let json = serde_json::to_string(&lattice).unwrap();
        assert!(json.contains("boundaries"));
    }
}
