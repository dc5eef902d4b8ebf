//! Word-boundary detection.
//!
//! A search step is a word end either when the sub-word model behind its input
//! label reaches its last internal sub-state (`WordEndType::Hmm`) or when its arc
//! emits a word (`WordEndType::Output`). Garbage and silence models can be
//! declared as non-words; their steps take no part in the word-end/output
//! bookkeeping.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{DecoderError, Result};
use crate::search::trace::TraceArena;
use crate::types::{Label, ModelHandle, TraceRef};
use crate::wfst::FstArc;

/// How word boundaries are recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordEndType {
    /// The input label is the final sub-state of its model.
    Hmm,
    /// The arc carries a non-epsilon output label.
    Output,
}

/// Maps input labels to the acoustic models they belong to.
pub trait ModelInventory: Send + Sync {
    /// Model owning the sub-state `input`.
    fn model_of(&self, input: Label) -> Option<ModelHandle>;

    /// Whether `input` is the last sub-state of its model.
    fn is_final_substate(&self, input: Label) -> bool;

    /// Resolve a model by name.
    fn lookup(&self, name: &str) -> Option<ModelHandle>;
}

/// In-memory inventory of left-to-right sub-word models.
#[derive(Debug, Clone, Default)]
pub struct HmmInventory {
    names: Vec<String>,
    by_name: HashMap<String, ModelHandle>,
    /// sub-state label -> (model, is last sub-state)
    by_label: FxHashMap<Label, (ModelHandle, bool)>,
}

impl HmmInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model whose sub-states are `substates`, in topological order.
    pub fn add_model(&mut self, name: impl Into<String>, substates: &[Label]) -> Result<ModelHandle> {
        let name = name.into();
        if substates.is_empty() {
            return Err(DecoderError::Configuration(format!(
                "model {:?} has no sub-states",
                name
            )));
        }
        if self.by_name.contains_key(&name) {
            return Err(DecoderError::Configuration(format!(
                "model {:?} is defined twice",
                name
            )));
        }
        if let Some(label) = substates
            .iter()
            .find(|l| l.is_epsilon() || self.by_label.contains_key(l))
        {
            return Err(DecoderError::Configuration(format!(
                "sub-state label {} of model {:?} is epsilon or already assigned",
                label, name
            )));
        }

        let handle = ModelHandle(self.names.len() as u32);
        let last = substates.len() - 1;
        for (i, &label) in substates.iter().enumerate() {
            self.by_label.insert(label, (handle, i == last));
        }
        self.by_name.insert(name.clone(), handle);
        self.names.push(name);
        Ok(handle)
    }

    /// Load an inventory from lines of the form `name label1 label2 ...`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DecoderError::Configuration(format!("cannot read model inventory {:?}: {}", path, e))
        })?;

        let mut inventory = Self::new();
        for (line_no, line) in content.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            let substates = parts[1..]
                .iter()
                .map(|s| s.parse::<u32>().map(Label))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| DecoderError::Parse {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    message: format!("invalid sub-state label: {}", e),
                })?;
            inventory.add_model(parts[0], &substates)?;
        }

        debug!("Loaded model inventory with {} models", inventory.len());
        Ok(inventory)
    }

    pub fn name(&self, model: ModelHandle) -> Option<&str> {
        self.names.get(model.value() as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ModelInventory for HmmInventory {
    fn model_of(&self, input: Label) -> Option<ModelHandle> {
        self.by_label.get(&input).map(|&(m, _)| m)
    }

    fn is_final_substate(&self, input: Label) -> bool {
        self.by_label.get(&input).map_or(false, |&(_, last)| last)
    }

    fn lookup(&self, name: &str) -> Option<ModelHandle> {
        self.by_name.get(name).copied()
    }
}

/// Classifies search steps as word boundaries.
#[derive(Clone)]
pub struct WordEndDetector {
    kind: WordEndType,
    inventory: Option<Arc<dyn ModelInventory>>,
    non_words: FxHashSet<ModelHandle>,
}

impl std::fmt::Debug for WordEndDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordEndDetector")
            .field("kind", &self.kind)
            .field("has_inventory", &self.inventory.is_some())
            .field("non_words", &self.non_words)
            .finish()
    }
}

impl WordEndDetector {
    /// Create a detector; unknown non-word model names are a configuration error.
    pub fn new(
        kind: WordEndType,
        inventory: Option<Arc<dyn ModelInventory>>,
        non_word_models: &[String],
    ) -> Result<Self> {
        if kind == WordEndType::Hmm && inventory.is_none() {
            return Err(DecoderError::Configuration(
                "HMM word-end detection needs a model inventory".to_string(),
            ));
        }

        let mut non_words = FxHashSet::default();
        for name in non_word_models {
            let model = inventory
                .as_ref()
                .and_then(|inv| inv.lookup(name))
                .ok_or_else(|| {
                    let err =
                        DecoderError::Configuration(format!("unknown non-word model {:?}", name));
                    error!("{}", err);
                    err
                })?;
            non_words.insert(model);
        }

        Ok(Self {
            kind,
            inventory,
            non_words,
        })
    }

    /// Detector on output labels with no non-word models.
    pub fn output_based() -> Self {
        Self {
            kind: WordEndType::Output,
            inventory: None,
            non_words: FxHashSet::default(),
        }
    }

    pub fn kind(&self) -> WordEndType {
        self.kind
    }

    /// Whether taking `arc` completes a word.
    ///
    /// `from_input` is the input label of the step that reached the source of
    /// `arc`. In HMM mode only entering the last sub-state ends a word; staying
    /// there through a self-loop does not.
    #[inline]
    pub fn is_word_end(&self, arc: &FstArc, from_input: Label) -> bool {
        match self.kind {
            WordEndType::Output => !arc.output.is_epsilon(),
            WordEndType::Hmm => {
                !arc.input.is_epsilon()
                    && arc.input != from_input
                    && self
                        .inventory
                        .as_ref()
                        .map_or(false, |inv| inv.is_final_substate(arc.input))
            }
        }
    }

    pub fn is_non_word(&self, model: ModelHandle) -> bool {
        self.non_words.contains(&model)
    }

    /// Whether the step with input `input` belongs to a non-word model.
    pub fn is_non_word_input(&self, input: Label) -> bool {
        if self.non_words.is_empty() || input.is_epsilon() {
            return false;
        }
        self.inventory
            .as_ref()
            .and_then(|inv| inv.model_of(input))
            .map_or(false, |m| self.is_non_word(m))
    }

    /// Check that the traceback ending in `end` has one word end per output.
    ///
    /// Steps on non-word models are left out of both counts.
    pub fn has_word_end_time(&self, arena: &TraceArena, end: TraceRef) -> bool {
        let mut word_ends = 0usize;
        let mut outputs = 0usize;
        let mut at = end;
        while let Some(trace) = arena.get(at) {
            if !self.is_non_word_input(trace.input) {
                if trace.word_end {
                    word_ends += 1;
                }
                if !trace.output.is_epsilon() {
                    outputs += 1;
                }
            }
            at = trace.predecessor;
        }
        if word_ends != outputs {
            debug!(word_ends, outputs, "word-end/output count mismatch");
        }
        word_ends == outputs
    }
}
