// ============================================================
// Layer 3 — Label Vocabulary
// ============================================================
// Maps label strings to dense integer ids and back.
//
// Two vocabularies are used by the parser:
//   - relation labels: id 0 = "<NONE>" (no arc)
//   - POS tags:        id 0 = "<PAD>"  (ignored by the POS loss)
//
// Ids are assigned in sorted label order after the reserved
// unit, so rebuilding from the same corpus is deterministic.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::error::{ParserError, Result};
use super::sentence::{Arc, SemGraph, Prediction, format_deps};

pub const NO_ARC: &str = "<NONE>";
pub const POS_PAD: &str = "<PAD>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelVocab {
    units: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LabelVocab {
    /// Build a vocabulary with `reserved` at id 0 followed by `labels`.
    pub fn new<I, S>(reserved: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = labels
            .into_iter()
            .map(Into::into)
            .filter(|l| l != reserved)
            .collect();
        let mut units = Vec::with_capacity(set.len() + 1);
        units.push(reserved.to_string());
        units.extend(set);
        Self::from_units(units)
    }

    /// Relation-label vocabulary: id 0 means "no arc".
    pub fn relations<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(NO_ARC, labels)
    }

    /// POS vocabulary: id 0 is the pad index.
    pub fn pos_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(POS_PAD, tags)
    }

    fn from_units(units: Vec<String>) -> Self {
        let index = units.iter().enumerate().map(|(i, u)| (u.clone(), i)).collect();
        Self { units, index }
    }

    /// Rebuild the lookup table after deserialisation.
    pub fn reindex(self) -> Self {
        Self::from_units(self.units)
    }

    pub fn id_of(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| ParserError::data(format!("label '{label}' is not in the vocabulary")))
    }

    pub fn label_of(&self, id: usize) -> Result<&str> {
        self.units
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| ParserError::data(format!("label id {id} is out of range ({})", self.units.len())))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.len() <= 1
    }

    pub fn labels(&self) -> &[String] {
        &self.units
    }

    /// Map decoded graphs to one DEPS string per real word.
    pub fn parse_to_sent_batch(&self, graphs: &[SemGraph]) -> Result<Vec<Prediction>> {
        graphs
            .iter()
            .map(|g| {
                g.incoming
                    .iter()
                    .skip(1)
                    .map(|arcs| {
                        let arcs = arcs
                            .iter()
                            .map(|a| Ok(Arc::new(a.head, self.label_of(a.label_id)?)))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(format_deps(&arcs))
                    })
                    .collect::<Result<Prediction>>()
            })
            .collect()
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let vocab: Self = serde_json::from_str(&json)?;
        Ok(vocab.reindex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sentence::LabeledArc;

    #[test]
    fn test_reserved_id_zero() {
        let v = LabelVocab::relations(["Pat", "Agt", "Root", "Agt"]);
        assert_eq!(v.id_of(NO_ARC).unwrap(), 0);
        assert_eq!(v.len(), 4);
        assert_eq!(v.id_of("Agt").unwrap(), 1);
        assert_eq!(v.label_of(3).unwrap(), "Root");
        assert!(v.id_of("Missing").is_err());
        assert!(v.label_of(9).is_err());
    }

    #[test]
    fn test_parse_to_sent_batch_skips_root() {
        let v = LabelVocab::relations(["Agt", "Root"]);
        let mut g = SemGraph::empty(3);
        g.incoming[1].push(LabeledArc { head: 2, label_id: 1 });
        g.incoming[2].push(LabeledArc { head: 0, label_id: 2 });
        let sents = v.parse_to_sent_batch(&[g]).unwrap();
        assert_eq!(sents, vec![vec!["2:Agt".to_string(), "0:Root".to_string()]]);
    }

    #[test]
    fn test_json_round_trip_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        let v = LabelVocab::pos_tags(["NN", "VV"]);
        v.save(&path).unwrap();
        let loaded = LabelVocab::load(&path).unwrap();
        assert_eq!(loaded.id_of("VV").unwrap(), 2);
        assert_eq!(loaded, v);
    }
}
