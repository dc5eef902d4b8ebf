//! Decoder configuration.
//!
//! Options are loaded from several sources with figment and validated once at
//! startup. Keys use the kebab-case option names of the decoder
//! (`acoustic-pruning-threshold`, `purge-interval`, ...). Environment variables
//! use the `WFST_` prefix with `_` standing in for `-`, so
//! `WFST_ACOUSTIC_PRUNING_THRESHOLD=8` sets `acoustic-pruning-threshold`.

use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{config_sources, network, pruning, trace};
use crate::error::{DecoderError, Result};
use crate::search::{SearchConfig, TraceMode, WordEndType};

/// Decoder configuration loaded from multiple sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Beam width: additive score budget above the best hypothesis.
    pub acoustic_pruning_threshold: f32,

    /// Maximum number of hypotheses surviving a frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acoustic_pruning_limit: Option<usize>,

    /// Separate beam for hypotheses that just completed a word.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_end_pruning: Option<f32>,

    /// Forward-backward pruning threshold for generated lattices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lattice_pruning: Option<f32>,

    /// Frames between trace-arena garbage collections (0 disables purging).
    pub purge_interval: u32,

    /// Segments between rebuilds of the composed network (0 = every segment).
    pub reset_interval: u32,

    /// Record sibling traces so lattices can be generated.
    pub create_lattice: bool,

    /// Follow epsilon-input arcs without consuming a frame.
    pub allow_skips: bool,

    /// Global rescaling of network weights.
    pub weight_scale: f32,

    /// Number of slots the trace arena grows by.
    pub trace_increment: usize,

    /// How word boundaries are detected.
    pub word_end_type: WordEndType,

    /// Names of garbage/silence models excluded from word-end checks.
    #[serde(default)]
    pub non_word_models: Vec<String>,

    /// Leave the last output label of the best path out of the result.
    pub ignore_last_output: bool,

    /// Grammar transducer file.
    pub grammar_path: PathBuf,

    /// Lexicon transducer file.
    pub lexicon_path: PathBuf,

    /// Output symbol table, used to print words instead of label ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols_path: Option<PathBuf>,

    /// Model inventory, required for HMM word-end detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            acoustic_pruning_threshold: pruning::DEFAULT_BEAM_WIDTH,
            acoustic_pruning_limit: None,
            word_end_pruning: None,
            lattice_pruning: None,
            purge_interval: trace::DEFAULT_PURGE_INTERVAL,
            reset_interval: network::DEFAULT_RESET_INTERVAL,
            create_lattice: false,
            allow_skips: true,
            weight_scale: network::DEFAULT_WEIGHT_SCALE,
            trace_increment: trace::DEFAULT_INCREMENT,
            word_end_type: WordEndType::Output,
            non_word_models: Vec::new(),
            ignore_last_output: false,
            grammar_path: PathBuf::from(network::DEFAULT_GRAMMAR_PATH),
            lexicon_path: PathBuf::from(network::DEFAULT_LEXICON_PATH),
            symbols_path: None,
            inventory_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. decoder.yaml (if exists)
    /// 3. decoder.toml (if exists)
    /// 4. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        let figment = Self::default_figment()
            .merge(Toml::file(config_sources::TOML_FILE))
            .merge(Yaml::file(config_sources::YAML_FILE))
            .merge(
                Env::prefixed(config_sources::ENV_PREFIX)
                    .map(|key| key.as_str().replace('_', "-").into()),
            );
        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(|e| {
            DecoderError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.validate()?;
        debug!(?config, "decoder configuration loaded");
        Ok(config)
    }

    /// Built-in defaults as the lowest-precedence provider.
    pub fn default_figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let beam = self.acoustic_pruning_threshold;
        if !beam.is_finite() || beam <= 0.0 || beam > pruning::MAX_BEAM_WIDTH {
            return Err(DecoderError::Configuration(format!(
                "acoustic-pruning-threshold must be in (0, {}], got {}",
                pruning::MAX_BEAM_WIDTH,
                beam
            )));
        }

        if self.acoustic_pruning_limit == Some(0) {
            return Err(DecoderError::Configuration(
                "acoustic-pruning-limit must be at least 1".to_string(),
            ));
        }

        Self::validate_threshold(self.word_end_pruning, "word-end-pruning")?;
        Self::validate_threshold(self.lattice_pruning, "lattice-pruning")?;

        if !self.weight_scale.is_finite() || self.weight_scale <= 0.0 {
            return Err(DecoderError::Configuration(format!(
                "weight-scale must be a positive finite number, got {}",
                self.weight_scale
            )));
        }

        if self.trace_increment == 0 {
            return Err(DecoderError::Configuration(
                "trace-increment must be at least 1".to_string(),
            ));
        }

        if self.non_word_models.iter().any(|name| name.trim().is_empty()) {
            return Err(DecoderError::Configuration(
                "non-word-models cannot contain empty names".to_string(),
            ));
        }

        self.validate_path(&self.grammar_path, "grammar-path")?;
        self.validate_path(&self.lexicon_path, "lexicon-path")?;
        if let Some(path) = &self.symbols_path {
            self.validate_path(path, "symbols-path")?;
        }
        if let Some(path) = &self.inventory_path {
            self.validate_path(path, "inventory-path")?;
        }

        Ok(())
    }

    fn validate_threshold(value: Option<f32>, field_name: &str) -> Result<()> {
        match value {
            Some(v) if !v.is_finite() || v < 0.0 => Err(DecoderError::Configuration(format!(
                "{} must be a non-negative finite number, got {}",
                field_name, v
            ))),
            _ => Ok(()),
        }
    }

    /// Basic sanity checks on a model file path.
    fn validate_path(&self, path: &Path, field_name: &str) -> Result<()> {
        let path_str = path.to_string_lossy();

        if path_str.is_empty() {
            return Err(DecoderError::Configuration(format!(
                "{} cannot be empty",
                field_name
            )));
        }

        // Check for null bytes (can be used to bypass filters)
        if path_str.contains('\0') {
            return Err(DecoderError::Configuration(format!(
                "{} contains null bytes",
                field_name
            )));
        }

        if path_str.chars().any(|c| c.is_control() && c != '\t') {
            return Err(DecoderError::Configuration(format!(
                "{} contains invalid control characters",
                field_name
            )));
        }

        if path_str.len() > 4096 {
            return Err(DecoderError::Configuration(format!(
                "{} is too long (max 4096 characters)",
                field_name
            )));
        }

        Ok(())
    }

    /// Trace recording strategy implied by `create-lattice`.
    pub fn trace_mode(&self) -> TraceMode {
        if self.create_lattice {
            TraceMode::Lattice
        } else {
            TraceMode::FirstBest
        }
    }

    /// Export configuration to TOML format
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            DecoderError::Configuration(format!("Failed to serialize to TOML: {}", e))
        })
    }

    /// Export configuration to YAML format
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            DecoderError::Configuration(format!("Failed to serialize to YAML: {}", e))
        })
    }
}

impl From<&Config> for SearchConfig {
    fn from(config: &Config) -> Self {
        SearchConfig {
            beam_width: config.acoustic_pruning_threshold,
            max_hypotheses: config.acoustic_pruning_limit,
            word_end_pruning: config.word_end_pruning,
            lattice_pruning: config.lattice_pruning,
            purge_interval: config.purge_interval,
            trace_mode: config.trace_mode(),
            allow_skips: config.allow_skips,
            trace_increment: config.trace_increment,
            ignore_last_output: config.ignore_last_output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trace_mode(), TraceMode::FirstBest);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Config::default_figment().merge(Toml::string(
            r#"
            acoustic-pruning-threshold = 5.5
            acoustic-pruning-limit = 1000
            create-lattice = true
            word-end-type = "hmm"
            non-word-models = ["silence", "noise"]
            "#,
        ));
        let config = Config::from_figment(figment).unwrap();
        assert_eq!(config.acoustic_pruning_threshold, 5.5);
        assert_eq!(config.acoustic_pruning_limit, Some(1000));
        assert_eq!(config.trace_mode(), TraceMode::Lattice);
        assert_eq!(config.word_end_type, WordEndType::Hmm);
        assert_eq!(config.non_word_models, vec!["silence", "noise"]);
        // untouched keys keep their defaults
        assert_eq!(config.purge_interval, trace::DEFAULT_PURGE_INTERVAL);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = Config::default();
        config.acoustic_pruning_threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(DecoderError::Configuration(_))
        ));

        let mut config = Config::default();
        config.acoustic_pruning_limit = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.weight_scale = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.word_end_pruning = Some(-1.0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.grammar_path = PathBuf::from("bad\0path");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_word_end_type_is_rejected() {
        let figment = Config::default_figment().merge(Toml::string("word-end-type = \"phone\""));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_export_round_trips_through_toml() {
        let mut config = Config::default();
        config.word_end_pruning = Some(4.0);
        let text = config.to_toml().unwrap();
        assert!(text.contains("word-end-pruning = 4.0"));
        let parsed = Config::from_figment(Config::default_figment().merge(Toml::string(&text)))
            .unwrap();
        assert_eq!(parsed, config);
        assert!(config.to_yaml().unwrap().contains("purge-interval"));
    }

    #[test]
    fn test_search_config_conversion() {
        let mut config = Config::default();
        config.acoustic_pruning_limit = Some(50);
        config.create_lattice = true;
        let search = SearchConfig::from(&config);
        assert_eq!(search.beam_width, config.acoustic_pruning_threshold);
        assert_eq!(search.max_hypotheses, Some(50));
        assert_eq!(search.trace_mode, TraceMode::Lattice);
    }
}
