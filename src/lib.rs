//! The `wfst_decoder` core library.
//!
//! A frame-synchronous beam-search decoder over the lazy composition of a
//! pronunciation lexicon (L) with a grammar (G), both weighted finite-state
//! transducers in the tropical semiring. Emission scores come from an external
//! acoustic model through [`search::EmissionScorer`].

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod search;
pub mod types;
pub mod wfst;
