//! Mutable vector-backed transducer and the network interface the search runs on.

use std::sync::{Arc, OnceLock};

use crate::types::{Label, StateId, Weight, INFINITE_SCORE};

/// A weighted transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FstArc {
    pub input: Label,
    pub output: Label,
    pub weight: Weight,
    pub next: StateId,
}

impl FstArc {
    pub fn new(input: Label, output: Label, weight: Weight, next: StateId) -> Self {
        Self {
            input,
            output,
            weight,
            next,
        }
    }
}

/// Read-only view of a search network.
///
/// Implementations may compute arcs lazily, so lookups take `&self` and hand out
/// shared arc slices rather than borrows tied to internal caches.
pub trait SearchNetwork: Send + Sync {
    /// Initial state, or `None` for an empty network.
    fn start(&self) -> Option<StateId>;

    /// Outgoing arcs of `state`, in a fixed order.
    fn arcs(&self, state: StateId) -> Arc<[FstArc]>;

    /// Final weight of `state`; infinite when the state is not final.
    fn final_weight(&self, state: StateId) -> Weight;

    /// Number of states materialized so far.
    fn num_states(&self) -> usize;
}

/// Arc sort criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcOrder {
    Input,
    Output,
}

#[derive(Debug, Clone, Default)]
struct VectorState {
    arcs: Vec<FstArc>,
    // shared copy of `arcs` handed to the search; dropped on mutation
    shared: OnceLock<Arc<[FstArc]>>,
    final_weight: Option<Weight>,
}

/// Transducer stored as a vector of states with per-state arc lists.
#[derive(Debug, Clone, Default)]
pub struct VectorFst {
    start: Option<StateId>,
    states: Vec<VectorState>,
}

impl VectorFst {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a state and return its id.
    pub fn add_state(&mut self) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(VectorState::default());
        id
    }

    /// Grow the state vector so that `state` exists.
    pub fn ensure_state(&mut self, state: StateId) {
        if state.index() >= self.states.len() {
            self.states.resize_with(state.index() + 1, VectorState::default);
        }
    }

    pub fn set_start(&mut self, state: StateId) {
        self.ensure_state(state);
        self.start = Some(state);
    }

    pub fn set_final(&mut self, state: StateId, weight: Weight) {
        self.ensure_state(state);
        self.states[state.index()].final_weight = Some(weight);
    }

    pub fn add_arc(&mut self, from: StateId, arc: FstArc) {
        self.ensure_state(from);
        self.ensure_state(arc.next);
        let state = &mut self.states[from.index()];
        state.arcs.push(arc);
        state.shared.take();
    }

    pub fn start(&self) -> Option<StateId> {
        self.start
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.states.iter().map(|s| s.arcs.len()).sum()
    }

    /// Arcs leaving `state`; empty for unknown states.
    #[inline]
    pub fn arcs(&self, state: StateId) -> &[FstArc] {
        self.states
            .get(state.index())
            .map(|s| s.arcs.as_slice())
            .unwrap_or(&[])
    }

    /// Final weight, infinite for non-final or unknown states.
    pub fn final_weight(&self, state: StateId) -> Weight {
        self.states
            .get(state.index())
            .and_then(|s| s.final_weight)
            .unwrap_or(INFINITE_SCORE)
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.final_weight(state).is_finite()
    }

    /// Stable-sort every state's arcs by input or output label.
    pub fn sort_arcs(&mut self, order: ArcOrder) {
        for state in &mut self.states {
            state.shared.take();
            match order {
                ArcOrder::Input => state.arcs.sort_by_key(|a| a.input),
                ArcOrder::Output => state.arcs.sort_by_key(|a| a.output),
            }
        }
    }
}

impl SearchNetwork for VectorFst {
    fn start(&self) -> Option<StateId> {
        self.start
    }

    fn arcs(&self, state: StateId) -> Arc<[FstArc]> {
        match self.states.get(state.index()) {
            Some(s) => s.shared.get_or_init(|| Arc::from(s.arcs.as_slice())).clone(),
            None => Arc::from(Vec::new()),
        }
    }

    fn final_weight(&self, state: StateId) -> Weight {
        VectorFst::final_weight(self, state)
    }

    fn num_states(&self) -> usize {
        self.states.len()
    }
}
