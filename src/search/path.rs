//! Traceback of decoded word sequences.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::error;

use crate::error::{DecoderError, Result};
use crate::search::lattice::{build_lattice, Lattice};
use crate::search::trace::{Trace, TraceArena};
use crate::search::word_end::WordEndDetector;
use crate::types::{Frame, Label, Score, TraceRef};

/// One word of a decoded path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    /// Output label, or epsilon for boundaries without a word (e.g. silence).
    pub word: Label,
    /// Frame at which the word ends.
    pub time: Frame,
    /// Cumulative score at the word end.
    pub score: Score,
}

/// Time-ordered decoding result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BestPath {
    pub items: Vec<PathItem>,
    /// Total score of the path.
    pub score: Score,
}

impl BestPath {
    /// Non-epsilon words in time order.
    pub fn words(&self) -> Vec<Label> {
        self.items
            .iter()
            .filter(|i| !i.word.is_epsilon())
            .map(|i| i.word)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read-only traceback over a trace arena.
///
/// The traces passed in must still be reachable from the roots of the most
/// recent purge.
pub struct PathExtractor<'a> {
    arena: &'a TraceArena,
}

impl<'a> PathExtractor<'a> {
    pub fn new(arena: &'a TraceArena) -> Self {
        Self { arena }
    }

    /// Reconstruct the single best word sequence ending in `end`.
    ///
    /// Output labels and word-end events need not share a step (with HMM word
    /// ends the word is usually emitted on the first sub-state), so outputs are
    /// paired in order with pending word ends during one backward walk. With
    /// `ignore_last_output` the last word of the path is left out.
    pub fn create_best_path(
        &self,
        detector: &WordEndDetector,
        ignore_last_output: bool,
        end: TraceRef,
    ) -> Result<BestPath> {
        let Some(last) = self.arena.get(end) else {
            return Err(DecoderError::InvalidState(format!(
                "traceback from unknown trace {}",
                end
            )));
        };

        if !detector.has_word_end_time(self.arena, end) {
            let err = DecoderError::Consistency(format!(
                "word ends and output labels disagree on the path ending at {} (time {})",
                end, last.time
            ));
            error!("{}", err);
            return Err(err);
        }

        let mut items = Vec::new();
        let mut pending_ends: VecDeque<&Trace> = VecDeque::new();
        let mut skip_output = ignore_last_output;
        let mut at = end;

        while let Some(trace) = self.arena.get(at) {
            if detector.is_non_word_input(trace.input) {
                if trace.word_end {
                    items.push(PathItem {
                        word: Label::EPSILON,
                        time: trace.time,
                        score: trace.score,
                    });
                }
            } else {
                if trace.word_end {
                    pending_ends.push_back(trace);
                }
                if !trace.output.is_epsilon() {
                    // nearest word end after this output
                    let closing = pending_ends.pop_back().unwrap_or(last);
                    if skip_output {
                        skip_output = false;
                    } else {
                        items.push(PathItem {
                            word: trace.output,
                            time: closing.time,
                            score: closing.score,
                        });
                    }
                }
            }
            at = trace.predecessor;
        }

        // word ends never claimed by an output
        items.extend(pending_ends.into_iter().map(|t| PathItem {
            word: Label::EPSILON,
            time: t.time,
            score: t.score,
        }));

        items.reverse();
        items.sort_by_key(|i| i.time);

        Ok(BestPath {
            items,
            score: last.score,
        })
    }

    /// Reconstruct all surviving alternatives ending in `end` as a word lattice.
    ///
    /// Only meaningful when the arena records siblings; in first-best mode the
    /// result is a linear lattice.
    pub fn create_lattice(&self, end: TraceRef, lattice_pruning: Option<f32>) -> Result<Lattice> {
        if self.arena.get(end).is_none() {
            return Err(DecoderError::InvalidState(format!(
                "lattice from unknown trace {}",
                end
            )));
        }
        let lattice = build_lattice(self.arena, end)?;
        Ok(match lattice_pruning {
            Some(threshold) => lattice.prune(threshold),
            None => lattice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::trace::TraceMode;
    use crate::search::word_end::{HmmInventory, WordEndType};
    use std::sync::Arc;

    const CAT: Label = Label(10);
    const SAT: Label = Label(11);

    fn step(
        arena: &mut TraceArena,
        pred: TraceRef,
        output: Label,
        input: u32,
        time: Frame,
        score: Score,
        word_end: bool,
    ) -> TraceRef {
        arena.add_trace(
            TraceRef::INVALID,
            pred,
            output,
            Label(input),
            time,
            score,
            0.0,
            word_end,
        )
    }

    fn root(arena: &mut TraceArena) -> TraceRef {
        step(arena, TraceRef::INVALID, Label::EPSILON, 0, 0, 0.0, false)
    }

    fn hmm_detector(non_words: &[&str]) -> WordEndDetector {
        let mut inv = HmmInventory::new();
        inv.add_model("cat", &[Label(1), Label(2), Label(3)]).unwrap();
        inv.add_model("sat", &[Label(5), Label(6)]).unwrap();
        inv.add_model("sil", &[Label(4)]).unwrap();
        let names: Vec<String> = non_words.iter().map(|s| s.to_string()).collect();
        WordEndDetector::new(WordEndType::Hmm, Some(Arc::new(inv)), &names).unwrap()
    }

    #[test]
    fn test_outputs_pair_with_later_word_ends() {
        let detector = hmm_detector(&[]);
        let mut arena = TraceArena::new(16, TraceMode::FirstBest);
        let r = root(&mut arena);
        let a = step(&mut arena, r, CAT, 1, 1, 1.5, false);
        let b = step(&mut arena, a, Label::EPSILON, 2, 2, 2.0, false);
        let c = step(&mut arena, b, Label::EPSILON, 3, 3, 2.5, true);
        let d = step(&mut arena, c, SAT, 5, 4, 3.0, false);
        let e = step(&mut arena, d, Label::EPSILON, 6, 5, 3.75, true);

        let path = PathExtractor::new(&arena)
            .create_best_path(&detector, false, e)
            .unwrap();
        assert_eq!(
            path.items,
            vec![
                PathItem { word: CAT, time: 3, score: 2.5 },
                PathItem { word: SAT, time: 5, score: 3.75 },
            ]
        );
        assert_eq!(path.score, 3.75);
        assert_eq!(path.words(), vec![CAT, SAT]);
    }

    #[test]
    fn test_ignore_last_output_drops_final_word() {
        let detector = WordEndDetector::output_based();
        let mut arena = TraceArena::new(16, TraceMode::FirstBest);
        let r = root(&mut arena);
        let a = step(&mut arena, r, CAT, 1, 1, 1.0, true);
        let b = step(&mut arena, a, SAT, 2, 2, 2.0, true);

        let path = PathExtractor::new(&arena)
            .create_best_path(&detector, true, b)
            .unwrap();
        assert_eq!(path.words(), vec![CAT]);
    }

    #[test]
    fn test_non_word_spans_become_epsilon_items() {
        let detector = hmm_detector(&["sil"]);
        let mut arena = TraceArena::new(16, TraceMode::FirstBest);
        let r = root(&mut arena);
        let s = step(&mut arena, r, Label::EPSILON, 4, 1, 0.5, true);
        let a = step(&mut arena, s, CAT, 1, 2, 1.0, false);
        let b = step(&mut arena, a, Label::EPSILON, 2, 3, 1.5, false);
        let c = step(&mut arena, b, Label::EPSILON, 3, 4, 2.0, true);

        let path = PathExtractor::new(&arena)
            .create_best_path(&detector, false, c)
            .unwrap();
        assert_eq!(path.items.len(), 2);
        assert_eq!(path.items[0].word, Label::EPSILON);
        assert_eq!(path.items[0].time, 1);
        assert_eq!(path.items[1].word, CAT);
        assert_eq!(path.items[1].time, 4);
    }

    #[test]
    fn test_inconsistent_path_is_fatal() {
        let detector = hmm_detector(&[]);
        let mut arena = TraceArena::new(16, TraceMode::FirstBest);
        let r = root(&mut arena);
        let a = step(&mut arena, r, CAT, 1, 1, 1.0, false);
        let err = PathExtractor::new(&arena)
            .create_best_path(&detector, false, a)
            .unwrap_err();
        assert!(matches!(err, DecoderError::Consistency(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_end_trace() {
        let arena = TraceArena::new(4, TraceMode::FirstBest);
        let detector = WordEndDetector::output_based();
        assert!(PathExtractor::new(&arena)
            .create_best_path(&detector, false, TraceRef(3))
            .is_err());
    }
}
