//! Domain constants for the decoder.
//!
//! Compile-time defaults, kept separate from the runtime `Config` so the two
//! cannot drift apart silently: `Config` defaults are built from these.

/// Search-space pruning defaults.
pub mod pruning {
    /// Default additive beam width (`acoustic-pruning-threshold`).
    pub const DEFAULT_BEAM_WIDTH: f32 = 12.0;

    /// Upper bound accepted for the beam width.
    pub const MAX_BEAM_WIDTH: f32 = 1.0e6;
}

/// Trace arena defaults.
pub mod trace {
    /// Number of slots the arena grows by when the free list is empty.
    pub const DEFAULT_INCREMENT: usize = 512;

    /// Frames between two garbage-collection passes.
    pub const DEFAULT_PURGE_INTERVAL: u32 = 20;
}

/// Search network defaults.
pub mod network {
    /// Segments between two rebuilds of the composed network (0 = every segment).
    pub const DEFAULT_RESET_INTERVAL: u32 = 0;

    /// Global scale applied to composed arc and final weights.
    pub const DEFAULT_WEIGHT_SCALE: f32 = 1.0;

    /// Default grammar transducer file (AT&T text format).
    pub const DEFAULT_GRAMMAR_PATH: &str = "model/G.txt";

    /// Default lexicon transducer file (AT&T text format).
    pub const DEFAULT_LEXICON_PATH: &str = "model/L.txt";
}

/// Configuration file names and environment prefix.
pub mod config_sources {
    /// TOML configuration file, merged after built-in defaults.
    pub const TOML_FILE: &str = "decoder.toml";

    /// YAML configuration file, merged after the TOML file.
    pub const YAML_FILE: &str = "decoder.yaml";

    /// Environment variable prefix (highest precedence).
    pub const ENV_PREFIX: &str = "WFST_";
}
