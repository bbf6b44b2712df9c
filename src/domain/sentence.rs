// ============================================================
// Layer 3 — Sentence, Arc and Graph Types
// ============================================================
// A sentence is an ordered list of words preceded by a
// synthetic ROOT at index 0. Every word may have several
// incoming arcs (semantic dependency graph), each arc being
// a (head index, relation label) pair.
//
// In the corpus an arc set is written in the DEPS column:
//   "2:Agt|0:Root"   → head 2 with label Agt, head 0 with label Root
//   "_"              → no annotation (inference input)

use serde::{Deserialize, Serialize};

use super::error::{ParserError, Result};

/// One incoming arc of a word, with its label kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Arc {
    pub head:  usize,
    pub label: String,
}

impl Arc {
    pub fn new(head: usize, label: impl Into<String>) -> Self {
        Self { head, label: label.into() }
    }
}

/// A word as the parser sees it: surface form, optional POS tag,
/// and its incoming arcs (`None` when the corpus row is blank).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub form: String,
    pub pos:  Option<String>,
    pub arcs: Option<Vec<Arc>>,
}

/// A sentence without the synthetic ROOT; index `k` in `words`
/// corresponds to graph position `k + 1`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sentence {
    pub words: Vec<Word>,
}

impl Sentence {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    /// Number of graph positions including ROOT.
    pub fn len_with_root(&self) -> usize {
        self.words.len() + 1
    }

    /// True when at least one word carries arc annotation.
    pub fn is_annotated(&self) -> bool {
        self.words.iter().any(|w| w.arcs.is_some())
    }
}

/// An arc in id space, as produced by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabeledArc {
    pub head:     usize,
    pub label_id: usize,
}

/// Decoded graph for one sentence.
///
/// `incoming[d]` holds the arcs whose dependent is position `d`;
/// `incoming[0]` (ROOT) is always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemGraph {
    pub incoming: Vec<Vec<LabeledArc>>,
}

impl SemGraph {
    pub fn empty(len_with_root: usize) -> Self {
        Self { incoming: vec![Vec::new(); len_with_root] }
    }

    pub fn len_with_root(&self) -> usize {
        self.incoming.len()
    }

    pub fn arc_count(&self) -> usize {
        self.incoming.iter().map(Vec::len).sum()
    }
}

/// Corpus-ready result for one sentence: one DEPS string per real word.
pub type Prediction = Vec<String>;

/// Parse a DEPS cell. `"_"` yields `None`.
pub fn parse_deps(cell: &str) -> Result<Option<Vec<Arc>>> {
    let cell = cell.trim();
    if cell == "_" || cell.is_empty() {
        return Ok(None);
    }
    let mut arcs = Vec::new();
    for part in cell.split('|') {
        let (head, label) = part
            .split_once(':')
            .ok_or_else(|| ParserError::data(format!("malformed arc '{part}' in DEPS '{cell}'")))?;
        let head = head
            .parse::<usize>()
            .map_err(|_| ParserError::data(format!("non-numeric head '{head}' in DEPS '{cell}'")))?;
        arcs.push(Arc::new(head, label));
    }
    Ok(Some(arcs))
}

/// Render arcs back into a DEPS cell, ordered by head index.
pub fn format_deps(arcs: &[Arc]) -> String {
    if arcs.is_empty() {
        return "_".to_string();
    }
    let mut sorted: Vec<&Arc> = arcs.iter().collect();
    sorted.sort_by(|a, b| a.head.cmp(&b.head).then_with(|| a.label.cmp(&b.label)));
    sorted
        .iter()
        .map(|a| format!("{}:{}", a.head, a.label))
        .collect::<Vec<_>>()
        .join("|")
}
