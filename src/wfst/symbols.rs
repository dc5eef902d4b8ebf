//! Symbol tables mapping labels to printable words.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{DecoderError, Result};
use crate::types::Label;

/// Bidirectional mapping between symbols and labels.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    id_to_symbol: HashMap<Label, String>,
    symbol_to_id: HashMap<String, Label>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a symbol table from a file.
    ///
    /// The file format is `<symbol> <id>` on each line, e.g. `<eps> 0` or `CAT 17`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| DecoderError::NetworkLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut table = Self::new();
        for (line_no, line) in content.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if parts.len() != 2 {
                return Err(DecoderError::Parse {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    message: format!("expected `<symbol> <id>`, got {:?}", line),
                });
            }
            let id = parts[1].parse::<u32>().map_err(|e| DecoderError::Parse {
                path: path.to_path_buf(),
                line: line_no + 1,
                message: format!("invalid id {:?}: {}", parts[1], e),
            })?;
            table.insert(parts[0], Label(id));
        }

        debug!("Loaded symbol table with {} symbols", table.len());
        Ok(table)
    }

    pub fn insert(&mut self, symbol: impl Into<String>, label: Label) {
        let symbol = symbol.into();
        self.symbol_to_id.insert(symbol.clone(), label);
        self.id_to_symbol.insert(label, symbol);
    }

    pub fn symbol(&self, label: Label) -> Option<&str> {
        self.id_to_symbol.get(&label).map(|s| s.as_str())
    }

    pub fn label(&self, symbol: &str) -> Option<Label> {
        self.symbol_to_id.get(symbol).copied()
    }

    /// Render labels as a space separated transcript, skipping epsilon.
    pub fn render(&self, labels: impl IntoIterator<Item = Label>) -> String {
        labels
            .into_iter()
            .filter(|l| !l.is_epsilon())
            .map(|l| match self.symbol(l) {
                Some(s) => s.to_string(),
                None => l.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn len(&self) -> usize {
        self.id_to_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_symbol.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_skips_epsilon_and_unknown_ids() {
        let mut table = SymbolTable::new();
        table.insert("<eps>", Label(0));
        table.insert("CAT", Label(1));
        table.insert("SAT", Label(2));
        assert_eq!(table.label("SAT"), Some(Label(2)));
        assert_eq!(
            table.render([Label(1), Label(0), Label(2), Label(9)]),
            "CAT SAT 9"
        );
    }
}
