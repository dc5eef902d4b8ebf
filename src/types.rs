//! Strong typing with newtypes for search-network concepts.
//!
//! Indices into the network, the trace arena and the model inventory are all
//! plain integers underneath; wrapping them keeps a `StateId` from ever being
//! used where a `TraceRef` is expected.

use serde::{Deserialize, Serialize};

/// Score in the tropical semiring (negative log-likelihood, smaller is better).
pub type Score = f32;

/// Arc or final weight in the tropical semiring.
pub type Weight = f32;

/// Frame index. Frame `t` is consumed by the expansion step `t`, and traces
/// written during that step carry time `t + 1`.
pub type Frame = u32;

/// Weight of an unreachable path or a non-final state.
pub const INFINITE_SCORE: Score = f32::INFINITY;

/// Returns true if `score` denotes a usable (finite) cost.
#[inline]
pub fn is_finite_score(score: Score) -> bool {
    score.is_finite()
}

/// State handle into a search network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub u32);

impl StateId {
    /// Sentinel for "no state".
    pub const INVALID: Self = Self(u32::MAX);

    /// Index form for vector lookups.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Check whether this is a real state.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Input or output symbol on an arc.
///
/// Label `0` is epsilon, following the usual AT&T/OpenFst convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label(pub u32);

impl Label {
    /// The empty symbol.
    pub const EPSILON: Self = Self(0);

    /// Get the label value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Check if this is epsilon.
    #[inline]
    pub fn is_epsilon(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_epsilon() {
            write!(f, "<eps>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Index of a slot in the trace arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceRef(pub u32);

impl TraceRef {
    /// Sentinel: no predecessor, no sibling, end of the free list.
    pub const INVALID: Self = Self(u32::MAX);

    /// Index form for arena lookups.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Check whether this points at a slot.
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl std::fmt::Display for TraceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "trace_{}", self.0)
        } else {
            write!(f, "trace_invalid")
        }
    }
}

/// Handle of a sub-word acoustic model (e.g. an HMM for one allophone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelHandle(pub u32);

impl ModelHandle {
    /// Get the handle value.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model_{}", self.0)
    }
}
