//! On-demand composition of a lexicon transducer with a grammar transducer.
//!
//! Composed states are `(lexicon, grammar)` pairs interned into dense `StateId`s
//! the first time they are reached. Arcs of a composed state are computed on the
//! first request and cached, so only the part of L∘G the search actually visits
//! is ever built.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::types::{Label, StateId, Weight, INFINITE_SCORE};
use crate::wfst::fst::{ArcOrder, FstArc, SearchNetwork, VectorFst};

#[derive(Default)]
struct CompositionCache {
    /// `(lexicon, grammar)` pair -> composed id.
    table: FxHashMap<(StateId, StateId), StateId>,
    /// composed id -> `(lexicon, grammar)` pair.
    pairs: Vec<(StateId, StateId)>,
    /// composed id -> expanded arcs, once computed.
    arcs: Vec<Option<Arc<[FstArc]>>>,
}

impl CompositionCache {
    fn intern(&mut self, pair: (StateId, StateId)) -> StateId {
        if let Some(&id) = self.table.get(&pair) {
            return id;
        }
        let id = StateId(self.pairs.len() as u32);
        self.pairs.push(pair);
        self.arcs.push(None);
        self.table.insert(pair, id);
        id
    }
}

/// Lazily expanded L∘G.
pub struct LazyComposition {
    lexicon: Arc<VectorFst>,
    grammar: Arc<VectorFst>,
    weight_scale: f32,
    start: Option<StateId>,
    cache: RwLock<CompositionCache>,
}

impl LazyComposition {
    /// Compose `lexicon` (model labels : words) with `grammar` (words : words).
    ///
    /// Grammar arcs must be sorted by input label for matching; an unsorted
    /// grammar is sorted into a private copy.
    pub fn new(lexicon: Arc<VectorFst>, grammar: Arc<VectorFst>, weight_scale: f32) -> Self {
        let grammar = if is_input_sorted(&grammar) {
            grammar
        } else {
            let mut sorted = (*grammar).clone();
            sorted.sort_arcs(ArcOrder::Input);
            Arc::new(sorted)
        };

        let mut cache = CompositionCache::default();
        let start = match (lexicon.start(), grammar.start()) {
            (Some(l), Some(g)) => Some(cache.intern((l, g))),
            _ => None,
        };

        Self {
            lexicon,
            grammar,
            weight_scale,
            start,
            cache: RwLock::new(cache),
        }
    }

    /// Lexicon component of a composed state.
    pub fn lexicon_state(&self, state: StateId) -> Option<StateId> {
        self.cache.read().pairs.get(state.index()).map(|p| p.0)
    }

    /// Grammar component of a composed state.
    pub fn grammar_state(&self, state: StateId) -> Option<StateId> {
        self.cache.read().pairs.get(state.index()).map(|p| p.1)
    }

    /// Number of composed states with expanded arcs.
    pub fn expanded_states(&self) -> usize {
        self.cache.read().arcs.iter().filter(|a| a.is_some()).count()
    }

    pub fn weight_scale(&self) -> f32 {
        self.weight_scale
    }

    fn expand(&self, cache: &mut CompositionCache, state: StateId) -> Arc<[FstArc]> {
        let (l, g) = cache.pairs[state.index()];
        let grammar_arcs = self.grammar.arcs(g);
        let mut result = Vec::new();

        for la in self.lexicon.arcs(l) {
            if la.output.is_epsilon() {
                let next = cache.intern((la.next, g));
                result.push(FstArc::new(
                    la.input,
                    Label::EPSILON,
                    self.weight_scale * la.weight,
                    next,
                ));
                continue;
            }
            for ga in matching(grammar_arcs, la.output) {
                let next = cache.intern((la.next, ga.next));
                result.push(FstArc::new(
                    la.input,
                    ga.output,
                    self.weight_scale * (la.weight + ga.weight),
                    next,
                ));
            }
        }

        // Grammar epsilons (e.g. backoff arcs) move G alone.
        for ga in matching(grammar_arcs, Label::EPSILON) {
            let next = cache.intern((l, ga.next));
            result.push(FstArc::new(
                Label::EPSILON,
                ga.output,
                self.weight_scale * ga.weight,
                next,
            ));
        }

        let arcs: Arc<[FstArc]> = Arc::from(result);
        cache.arcs[state.index()] = Some(arcs.clone());
        arcs
    }
}

impl SearchNetwork for LazyComposition {
    fn start(&self) -> Option<StateId> {
        self.start
    }

    fn arcs(&self, state: StateId) -> Arc<[FstArc]> {
        {
            let cache = self.cache.read();
            match cache.arcs.get(state.index()) {
                Some(Some(arcs)) => return arcs.clone(),
                Some(None) => {}
                None => return Arc::from(Vec::new()),
            }
        }
        let mut cache = self.cache.write();
        // another reader may have expanded it in between
        if let Some(arcs) = &cache.arcs[state.index()] {
            return arcs.clone();
        }
        self.expand(&mut cache, state)
    }

    fn final_weight(&self, state: StateId) -> Weight {
        let Some((l, g)) = self.cache.read().pairs.get(state.index()).copied() else {
            return INFINITE_SCORE;
        };
        let fl = self.lexicon.final_weight(l);
        let fg = self.grammar.final_weight(g);
        if fl.is_finite() && fg.is_finite() {
            self.weight_scale * (fl + fg)
        } else {
            INFINITE_SCORE
        }
    }

    fn num_states(&self) -> usize {
        self.cache.read().pairs.len()
    }
}

fn is_input_sorted(fst: &VectorFst) -> bool {
    (0..fst.num_states() as u32).all(|s| {
        fst.arcs(StateId(s))
            .windows(2)
            .all(|w| w[0].input <= w[1].input)
    })
}

/// Arcs of an input-sorted slice whose input equals `label`.
fn matching(arcs: &[FstArc], label: Label) -> &[FstArc] {
    let lo = arcs.partition_point(|a| a.input < label);
    let hi = arcs.partition_point(|a| a.input <= label);
    &arcs[lo..hi]
}
