//! Weighted finite-state transducers for the search network.
//!
//! This module holds the in-memory transducer representation, the text loader,
//! the lazily expanded lexicon/grammar composition and the manager that owns
//! and periodically rebuilds it.

mod compose;
mod fst;
mod manager;
mod symbols;
mod text;

pub use compose::LazyComposition;
pub use fst::{ArcOrder, FstArc, SearchNetwork, VectorFst};
pub use manager::{FstSource, NetworkManager, StaticFstSource, TextFstSource};
pub use symbols::SymbolTable;
pub use text::{parse_text_fst, read_text_fst};
