// ============================================================
// Layer 4 — CoNLL-U Reader / Writer
// ============================================================
// Reads and writes 10-column CoNLL-U files.
//
//   ID  FORM  LEMMA  UPOS  XPOS  FEATS  HEAD  DEPREL  DEPS  MISC
//
// The parser uses FORM (word), UPOS (POS tag) and DEPS (the
// "head:label|head:label" arc set). All other columns are kept
// verbatim so a written file differs from its input only in
// the fields the parser sets.
//
// Multi-word token lines (ID "3-4") and empty nodes (ID "5.1")
// are preserved but are not words.

use std::{fs, path::Path};

use crate::domain::error::{ParserError, Result};
use crate::domain::sentence::{parse_deps, Sentence, Word};

const FORM: usize = 1;
const UPOS: usize = 3;
const DEPS: usize = 8;
const COLUMNS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
struct ConllRow {
    cols: Vec<String>,
}

impl ConllRow {
    fn is_word(&self) -> bool {
        self.cols[0].parse::<usize>().is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ConllSentence {
    comments: Vec<String>,
    rows:     Vec<ConllRow>,
}

impl ConllSentence {
    fn words(&self) -> impl Iterator<Item = &ConllRow> {
        self.rows.iter().filter(|r| r.is_word())
    }

    fn words_mut(&mut self) -> impl Iterator<Item = &mut ConllRow> {
        self.rows.iter_mut().filter(|r| r.is_word())
    }
}

/// An in-memory CoNLL-U corpus.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConllFile {
    sentences: Vec<ConllSentence>,
}

impl ConllFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| match e {
            ParserError::Data(msg) => ParserError::data(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut sentences = Vec::new();
        let mut current = ConllSentence::default();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                if !current.rows.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
                continue;
            }
            if line.starts_with('#') {
                current.comments.push(line.to_string());
                continue;
            }
            let cols: Vec<String> = line.split('\t').map(str::to_string).collect();
            if cols.len() != COLUMNS {
                return Err(ParserError::data(format!(
                    "line {}: expected {COLUMNS} tab-separated columns, found {}",
                    line_no + 1,
                    cols.len()
                )));
            }
            current.rows.push(ConllRow { cols });
        }
        if !current.rows.is_empty() {
            sentences.push(current);
        }
        Ok(Self { sentences })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.sentences.iter().map(|s| s.words().count()).sum()
    }

    /// Parser view of every sentence.
    pub fn sentences(&self) -> Result<Vec<Sentence>> {
        self.sentences
            .iter()
            .map(|s| {
                let words = s
                    .words()
                    .map(|row| {
                        let pos = match row.cols[UPOS].as_str() {
                            "_" => None,
                            tag => Some(tag.to_string()),
                        };
                        Ok(Word { form: row.cols[FORM].clone(), pos, arcs: parse_deps(&row.cols[DEPS])? })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Sentence::new(words))
            })
            .collect()
    }

    /// Overwrite the DEPS column, one value per word in corpus order.
    pub fn set_deps(&mut self, values: &[String]) -> Result<()> {
        self.set_column(DEPS, values)
    }

    /// Overwrite the UPOS column, one value per word in corpus order.
    pub fn set_pos(&mut self, values: &[String]) -> Result<()> {
        self.set_column(UPOS, values)
    }

    fn set_column(&mut self, col: usize, values: &[String]) -> Result<()> {
        let words = self.word_count();
        if values.len() != words {
            return Err(ParserError::data(format!(
                "{} values supplied for a corpus of {words} words",
                values.len()
            )));
        }
        let mut it = values.iter();
        for sent in &mut self.sentences {
            for row in sent.words_mut() {
                if let Some(v) = it.next() {
                    row.cols[col] = v.clone();
                }
            }
        }
        Ok(())
    }

    pub fn to_conllu_string(&self) -> String {
        let mut out = String::new();
        for sent in &self.sentences {
            for c in &sent.comments {
                out.push_str(c);
                out.push('\n');
            }
            for row in &sent.rows {
                out.push_str(&row.cols.join("\t"));
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_conllu_string())?;
        Ok(())
    }
}
