//! Emission scores supplied by the acoustic model.

use std::fs;
use std::path::Path;

use crate::error::{DecoderError, Result};
use crate::types::{Frame, Label, Score, INFINITE_SCORE};

/// Source of per-frame emission costs.
///
/// The engine calls this once per expanded arc and frame; implementations that
/// batch or parallelise their own computation must still answer synchronously.
pub trait EmissionScorer {
    /// Negative log-likelihood of sub-state `input` at `frame`.
    fn score(&self, input: Label, frame: Frame) -> Score;

    /// Number of frames available, if known.
    fn num_frames(&self) -> Option<usize> {
        None
    }
}

impl<F> EmissionScorer for F
where
    F: Fn(Label, Frame) -> Score,
{
    fn score(&self, input: Label, frame: Frame) -> Score {
        self(input, frame)
    }
}

/// Dense frames × labels cost matrix. Column `i` holds the cost of label `i`.
#[derive(Debug, Clone, Default)]
pub struct ScoreMatrix {
    rows: Vec<Vec<Score>>,
}

impl ScoreMatrix {
    pub fn new(rows: Vec<Vec<Score>>) -> Self {
        Self { rows }
    }

    /// Read a matrix with one whitespace-separated row per frame.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut rows = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|s| s.parse::<Score>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| DecoderError::Parse {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    message: format!("invalid score: {}", e),
                })?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl EmissionScorer for ScoreMatrix {
    /// Out-of-range lookups cost infinity, which prunes the arc.
    fn score(&self, input: Label, frame: Frame) -> Score {
        self.rows
            .get(frame as usize)
            .and_then(|row| row.get(input.value() as usize))
            .copied()
            .unwrap_or(INFINITE_SCORE)
    }

    fn num_frames(&self) -> Option<usize> {
        Some(self.rows.len())
    }
}
