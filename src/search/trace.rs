//! Pooled backpointer storage with mark-and-sweep collection.
//!
//! Traces live in a single growable vector of slots. A slot is either in use or
//! a link in the free list; allocation pops the free list and only grows the
//! vector (by a fixed increment) once the list is empty, so the arena never
//! shrinks and freed slots are always reused first.
//!
//! Collection is driven by the owner of the live hypotheses:
//!
//! ```text
//! arena.purge_begin();
//! for root in live_roots { arena.purge_notify(root); }
//! let reclaimed = arena.purge_end();
//! ```
//!
//! Every trace that is not reachable from a notified root is reclaimed. Forgetting
//! a root therefore frees traces that are still needed, and never purging lets the
//! arena grow without bound on long segments.

use serde::{Deserialize, Serialize};

use crate::types::{Frame, Label, Score, TraceRef};

/// Trace recording strategy, chosen once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceMode {
    /// Keep only the winning backpointer of each recombination.
    FirstBest,
    /// Keep recombination losers as sibling chains for lattice generation.
    Lattice,
}

/// One backpointer record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    pub predecessor: TraceRef,
    /// Next alternative into the same state and time (lattice mode only).
    pub sibling: TraceRef,
    pub output: Label,
    pub input: Label,
    pub time: Frame,
    /// Cumulative score up to and including this step.
    pub score: Score,
    /// Network weight of the step's arc alone.
    pub arc_score: Score,
    pub word_end: bool,
    active: bool,
}

#[derive(Debug, Clone)]
enum Slot {
    Used(Trace),
    Free { next: TraceRef },
}

/// Arena of traces owned by one decoding session.
#[derive(Debug)]
pub struct TraceArena {
    slots: Vec<Slot>,
    free_head: TraceRef,
    increment: usize,
    used: usize,
    mode: TraceMode,
}

impl TraceArena {
    /// Create an empty arena growing by `increment` slots at a time.
    pub fn new(increment: usize, mode: TraceMode) -> Self {
        Self {
            slots: Vec::new(),
            free_head: TraceRef::INVALID,
            increment: increment.max(1),
            used: 0,
            mode,
        }
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    /// Allocate and fill a new trace.
    ///
    /// In first-best mode the sibling is not recorded.
    #[allow(clippy::too_many_arguments)]
    pub fn add_trace(
        &mut self,
        sibling: TraceRef,
        predecessor: TraceRef,
        output: Label,
        input: Label,
        time: Frame,
        score: Score,
        arc_score: Score,
        word_end: bool,
    ) -> TraceRef {
        if !self.free_head.is_valid() {
            self.grow();
        }
        let at = self.free_head;
        self.free_head = match self.slots[at.index()] {
            Slot::Free { next } => next,
            Slot::Used(_) => unreachable!("free list points at a used slot"),
        };

        let sibling = self.record_sibling(sibling);
        self.slots[at.index()] = Slot::Used(Trace {
            predecessor,
            sibling,
            output,
            input,
            time,
            score,
            arc_score,
            word_end,
            active: false,
        });
        self.used += 1;
        at
    }

    /// Re-point an existing trace during same-frame recombination.
    pub fn update_trace(
        &mut self,
        at: TraceRef,
        sibling: TraceRef,
        predecessor: TraceRef,
        score: Score,
    ) {
        let sibling = self.record_sibling(sibling);
        if let Some(Slot::Used(trace)) = self.slots.get_mut(at.index()) {
            trace.sibling = sibling;
            trace.predecessor = predecessor;
            trace.score = score;
        } else {
            debug_assert!(false, "update_trace on free slot {}", at);
        }
    }

    fn record_sibling(&self, sibling: TraceRef) -> TraceRef {
        match self.mode {
            TraceMode::FirstBest => TraceRef::INVALID,
            TraceMode::Lattice => sibling,
        }
    }

    fn grow(&mut self) {
        let start = self.slots.len();
        let end = start + self.increment;
        assert!(
            end <= TraceRef::INVALID.index(),
            "trace arena exhausted the index space"
        );
        self.slots.reserve(self.increment);
        for i in start..end {
            let next = if i + 1 < end {
                TraceRef((i + 1) as u32)
            } else {
                self.free_head
            };
            self.slots.push(Slot::Free { next });
        }
        self.free_head = TraceRef(start as u32);
        tracing::trace!(capacity = end, "trace arena grown");
    }

    /// Look up a live trace.
    #[inline]
    pub fn get(&self, at: TraceRef) -> Option<&Trace> {
        match self.slots.get(at.index()) {
            Some(Slot::Used(trace)) => Some(trace),
            _ => None,
        }
    }

    /// Phase one of collection: clear all marks.
    pub fn purge_begin(&mut self) {
        for slot in &mut self.slots {
            if let Slot::Used(trace) = slot {
                trace.active = false;
            }
        }
    }

    /// Phase two: mark everything reachable from `root`.
    ///
    /// Walks predecessor links (and sibling links in lattice mode) with an
    /// explicit stack, stopping at traces that are already marked.
    pub fn purge_notify(&mut self, root: TraceRef) {
        let follow_siblings = self.mode == TraceMode::Lattice;
        let mut stack = vec![root];

        while let Some(at) = stack.pop() {
            let Some(Slot::Used(trace)) = self.slots.get_mut(at.index()) else {
                continue;
            };
            if trace.active {
                continue;
            }
            trace.active = true;
            stack.push(trace.predecessor);
            if follow_siblings {
                stack.push(trace.sibling);
            }
        }
    }

    /// Phase three: reclaim every unmarked trace. Returns the number freed.
    pub fn purge_end(&mut self) -> usize {
        let mut reclaimed = 0;
        // descending, so the lowest freed index ends up at the head
        for i in (0..self.slots.len()).rev() {
            if let Slot::Used(trace) = &self.slots[i] {
                if !trace.active {
                    self.slots[i] = Slot::Free {
                        next: self.free_head,
                    };
                    self.free_head = TraceRef(i as u32);
                    reclaimed += 1;
                }
            }
        }
        self.used -= reclaimed;
        reclaimed
    }

    /// Run a full collection with the given roots.
    pub fn purge<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = TraceRef>,
    {
        self.purge_begin();
        for root in roots {
            self.purge_notify(root);
        }
        self.purge_end()
    }

    /// Drop every trace while keeping the allocated capacity.
    pub fn clear(&mut self) {
        let capacity = self.slots.len();
        self.slots.clear();
        self.free_head = TraceRef::INVALID;
        self.used = 0;
        if capacity > 0 {
            let increment = self.increment;
            self.increment = capacity;
            self.grow();
            self.increment = increment;
        }
    }

    /// Used traces with their references, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (TraceRef, &Trace)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Used(trace) => Some((TraceRef(i as u32), trace)),
            Slot::Free { .. } => None,
        })
    }

    /// Number of slots, used or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of used slots.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Bytes held by the slot vector.
    pub fn memory_usage(&self) -> usize {
        self.slots.len() * std::mem::size_of::<Slot>()
    }
}
