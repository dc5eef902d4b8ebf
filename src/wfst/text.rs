//! AT&T text format reader.
//!
//! Each non-empty line is one of
//!
//! ```text
//! src dst ilabel olabel [weight]   # arc
//! src dst label [weight]           # acceptor arc (only with 3 fields)
//! state [weight]                   # final state
//! ```
//!
//! The source of the first line is the start state. Labels are numeric; symbol
//! tables are read separately.

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{DecoderError, Result};
use crate::types::{Label, StateId, Weight};
use crate::wfst::fst::{FstArc, VectorFst};

/// Read a transducer from an AT&T text file.
pub fn read_text_fst<P: AsRef<Path>>(path: P) -> Result<VectorFst> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| DecoderError::NetworkLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let fst = parse_text_fst(&content, path)?;
    debug!(
        "Loaded {:?}: {} states, {} arcs",
        path,
        fst.num_states(),
        fst.num_arcs()
    );
    Ok(fst)
}

/// Parse AT&T text; `origin` is only used in error messages.
pub fn parse_text_fst(content: &str, origin: &Path) -> Result<VectorFst> {
    let mut fst = VectorFst::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let err = |message: String| DecoderError::Parse {
            path: origin.to_path_buf(),
            line: line_no + 1,
            message,
        };
        let fields: Vec<&str> = line.split_whitespace().collect();

        let state = |s: &str| -> Result<StateId> {
            s.parse::<u32>()
                .map(StateId)
                .map_err(|e| err(format!("invalid state {:?}: {}", s, e)))
        };
        let label = |s: &str| -> Result<Label> {
            s.parse::<u32>()
                .map(Label)
                .map_err(|e| err(format!("invalid label {:?}: {}", s, e)))
        };
        let weight = |s: &str| -> Result<Weight> {
            match s {
                "Infinity" | "inf" => Ok(Weight::INFINITY),
                _ => s
                    .parse::<Weight>()
                    .map_err(|e| err(format!("invalid weight {:?}: {}", s, e))),
            }
        };

        let src = state(fields[0])?;
        if fst.start().is_none() {
            fst.set_start(src);
        }

        match fields.len() {
            1 => fst.set_final(src, 0.0),
            2 => fst.set_final(src, weight(fields[1])?),
            3 => {
                let l = label(fields[2])?;
                fst.add_arc(src, FstArc::new(l, l, 0.0, state(fields[1])?));
            }
            4 | 5 => {
                let w = if fields.len() == 5 {
                    weight(fields[4])?
                } else {
                    0.0
                };
                fst.add_arc(
                    src,
                    FstArc::new(label(fields[2])?, label(fields[3])?, w, state(fields[1])?),
                );
            }
            n => return Err(err(format!("expected 1 to 5 fields, got {}", n))),
        }
    }

    Ok(fst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_arcs_and_finals() {
        let text = "0 1 3 7 0.5\n1 2 4 0\n2 1.25\n# comment\n\n1\n";
        let fst = parse_text_fst(text, Path::new("mem")).unwrap();
        assert_eq!(fst.start(), Some(StateId(0)));
        assert_eq!(fst.num_states(), 3);
        let arc = fst.arcs(StateId(0))[0];
        assert_eq!((arc.input, arc.output, arc.next), (Label(3), Label(7), StateId(1)));
        assert_eq!(arc.weight, 0.5);
        assert_eq!(fst.arcs(StateId(1))[0].weight, 0.0);
        assert_eq!(fst.final_weight(StateId(2)), 1.25);
        assert_eq!(fst.final_weight(StateId(1)), 0.0);
    }

    #[test]
    fn test_parse_reports_line_numbers() {
        let err = parse_text_fst("0 1 2 3\n0 x 2 3\n", Path::new("L.txt")).unwrap_err();
        match err {
            DecoderError::Parse { path, line, .. } => {
                assert_eq!(path, PathBuf::from("L.txt"));
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_network_load_error() {
        let err = read_text_fst("/nonexistent/G.txt").unwrap_err();
        assert!(matches!(err, DecoderError::NetworkLoad { .. }));
    }
}
