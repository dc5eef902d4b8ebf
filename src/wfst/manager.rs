//! Ownership of the lexicon, the grammar and their cached composition.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{DecoderError, Result};
use crate::types::StateId;
use crate::wfst::compose::LazyComposition;
use crate::wfst::fst::{ArcOrder, SearchNetwork, VectorFst};
use crate::wfst::text::read_text_fst;

/// Supplies the component transducers.
pub trait FstSource {
    fn load_grammar(&self) -> Result<VectorFst>;
    fn load_lexicon(&self) -> Result<VectorFst>;
}

/// Reads G and L from AT&T text files.
#[derive(Debug, Clone)]
pub struct TextFstSource {
    pub grammar_path: PathBuf,
    pub lexicon_path: PathBuf,
}

impl TextFstSource {
    pub fn new(grammar_path: impl Into<PathBuf>, lexicon_path: impl Into<PathBuf>) -> Self {
        Self {
            grammar_path: grammar_path.into(),
            lexicon_path: lexicon_path.into(),
        }
    }
}

impl FstSource for TextFstSource {
    fn load_grammar(&self) -> Result<VectorFst> {
        read_text_fst(&self.grammar_path)
    }

    fn load_lexicon(&self) -> Result<VectorFst> {
        read_text_fst(&self.lexicon_path)
    }
}

/// Hands out transducers that were built in memory.
#[derive(Debug, Clone)]
pub struct StaticFstSource {
    pub grammar: VectorFst,
    pub lexicon: VectorFst,
}

impl StaticFstSource {
    pub fn new(grammar: VectorFst, lexicon: VectorFst) -> Self {
        Self { grammar, lexicon }
    }
}

impl FstSource for StaticFstSource {
    fn load_grammar(&self) -> Result<VectorFst> {
        Ok(self.grammar.clone())
    }

    fn load_lexicon(&self) -> Result<VectorFst> {
        Ok(self.lexicon.clone())
    }
}

/// Loads L and G once and rebuilds their composition every `reset_interval`
/// segments.
///
/// Each rebuild starts a fresh state table, so every `StateId` handed out by an
/// earlier composition is meaningless afterwards. Engines must be restarted on
/// the handle returned by [`NetworkManager::network`] after a rebuild.
pub struct NetworkManager<S: FstSource> {
    source: S,
    weight_scale: f32,
    lexicon: Option<Arc<VectorFst>>,
    grammar: Option<Arc<VectorFst>>,
    composed: Option<Arc<LazyComposition>>,
    reset_counter: u32,
    generation: u64,
}

impl<S: FstSource> NetworkManager<S> {
    pub fn new(source: S, weight_scale: f32) -> Self {
        Self {
            source,
            weight_scale,
            lexicon: None,
            grammar: None,
            composed: None,
            reset_counter: 0,
            generation: 0,
        }
    }

    /// Load G, then L, and build the first composition.
    ///
    /// Any load failure is fatal for the run.
    pub fn init(&mut self) -> Result<()> {
        let mut grammar = self.source.load_grammar().map_err(|e| {
            error!("Failed to load grammar transducer: {}", e);
            e
        })?;
        let lexicon = self.source.load_lexicon().map_err(|e| {
            error!("Failed to load lexicon transducer: {}", e);
            e
        })?;

        if grammar.start().is_none() || lexicon.start().is_none() {
            let err = DecoderError::Configuration(
                "lexicon and grammar transducers must both have a start state".to_string(),
            );
            error!("{}", err);
            return Err(err);
        }

        grammar.sort_arcs(ArcOrder::Input);
        info!(
            grammar_states = grammar.num_states(),
            lexicon_states = lexicon.num_states(),
            "search network components loaded"
        );

        self.grammar = Some(Arc::new(grammar));
        self.lexicon = Some(Arc::new(lexicon));
        self.rebuild()
    }

    /// Count one segment and rebuild the composition when the interval is reached.
    ///
    /// `reset_interval == 0` rebuilds on every call; `N > 0` rebuilds on every
    /// Nth call. Returns whether a rebuild took place.
    pub fn reset(&mut self, reset_interval: u32) -> Result<bool> {
        self.reset_counter += 1;
        if reset_interval == 0 || self.reset_counter >= reset_interval {
            self.reset_counter = 0;
            self.rebuild()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn rebuild(&mut self) -> Result<()> {
        let (Some(lexicon), Some(grammar)) = (&self.lexicon, &self.grammar) else {
            return Err(DecoderError::InvalidState(
                "network manager used before init()".to_string(),
            ));
        };

        if let Some(old) = &self.composed {
            debug!(
                generation = self.generation,
                states = old.num_states(),
                "discarding composed state table"
            );
        }
        self.composed = Some(Arc::new(LazyComposition::new(
            lexicon.clone(),
            grammar.clone(),
            self.weight_scale,
        )));
        self.generation += 1;
        metrics::counter!("decoder_network_rebuilds_total").increment(1);
        debug!(generation = self.generation, "composed network rebuilt");
        Ok(())
    }

    /// Shared handle on the current composition.
    pub fn network(&self) -> Result<Arc<LazyComposition>> {
        self.composed.clone().ok_or_else(|| {
            DecoderError::InvalidState("network manager used before init()".to_string())
        })
    }

    /// Grammar component of a composed state of the current composition.
    pub fn grammar_state(&self, state: StateId) -> Option<StateId> {
        self.composed.as_ref()?.grammar_state(state)
    }

    /// Lexicon component of a composed state of the current composition.
    pub fn lexicon_state(&self, state: StateId) -> Option<StateId> {
        self.composed.as_ref()?.lexicon_state(state)
    }

    /// Number of compositions built so far; changes on every rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;
    use crate::wfst::fst::FstArc;

    fn source() -> StaticFstSource {
        let mut lexicon = VectorFst::new();
        let l0 = lexicon.add_state();
        lexicon.set_start(l0);
        lexicon.add_arc(l0, FstArc::new(Label(1), Label(5), 0.0, l0));
        lexicon.set_final(l0, 0.0);

        let mut grammar = VectorFst::new();
        let g0 = grammar.add_state();
        grammar.set_start(g0);
        grammar.add_arc(g0, FstArc::new(Label(5), Label(5), 1.0, g0));
        grammar.set_final(g0, 0.0);

        StaticFstSource { grammar, lexicon }
    }

    struct FailingSource;

    impl FstSource for FailingSource {
        fn load_grammar(&self) -> Result<VectorFst> {
            Err(DecoderError::NetworkLoad {
                path: PathBuf::from("G.txt"),
                reason: "missing".to_string(),
            })
        }

        fn load_lexicon(&self) -> Result<VectorFst> {
            unreachable!("grammar is loaded first")
        }
    }

    #[test]
    fn test_reset_interval_two_rebuilds_every_second_segment() {
        let mut manager = NetworkManager::new(source(), 1.0);
        manager.init().unwrap();
        let rebuilt: Vec<bool> = (1..=4).map(|_| manager.reset(2).unwrap()).collect();
        assert_eq!(rebuilt, vec![false, true, false, true]);
        // init + 2 rebuilds
        assert_eq!(manager.generation(), 3);
    }

    #[test]
    fn test_reset_interval_zero_rebuilds_every_call() {
        let mut manager = NetworkManager::new(source(), 1.0);
        manager.init().unwrap();
        for _ in 0..3 {
            assert!(manager.reset(0).unwrap());
        }
        assert_eq!(manager.generation(), 4);
    }

    #[test]
    fn test_cached_network_is_reused_between_rebuilds() {
        let mut manager = NetworkManager::new(source(), 1.0);
        manager.init().unwrap();
        let before = manager.network().unwrap();
        assert!(!manager.reset(3).unwrap());
        assert!(Arc::ptr_eq(&before, &manager.network().unwrap()));
        assert!(!manager.reset(3).unwrap());
        assert!(manager.reset(3).unwrap());
        assert!(!Arc::ptr_eq(&before, &manager.network().unwrap()));
    }

    #[test]
    fn test_state_decomposition() {
        let mut manager = NetworkManager::new(source(), 1.0);
        manager.init().unwrap();
        let network = manager.network().unwrap();
        let start = network.start().unwrap();
        assert_eq!(manager.lexicon_state(start), Some(StateId(0)));
        assert_eq!(manager.grammar_state(start), Some(StateId(0)));
    }

    #[test]
    fn test_load_failure_is_fatal() {
        let mut manager = NetworkManager::new(FailingSource, 1.0);
        let err = manager.init().unwrap_err();
        assert!(err.is_fatal());
        assert!(manager.network().is_err());
    }

    #[test]
    fn test_reset_before_init_fails() {
        let mut manager = NetworkManager::new(source(), 1.0);
        assert!(matches!(
            manager.reset(0),
            Err(DecoderError::InvalidState(_))
        ));
    }
}
