// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the encoder's tokenizer.
//
// The tokenizer JSON is written by hand in HuggingFace format
// and loaded back through tokenizers, which sidesteps the
// trainer/ModelWrapper type mismatch of tokenizers 0.15.
//
// Vocabulary: the most frequent corpus words plus their
// characters (BertNormalizer splits CJK text into single
// characters, so a Chinese word is tokenised char by char).

use std::{collections::HashMap, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use tokenizers::Tokenizer;

use crate::data::features::{CLS, MASK, PAD, SEP, UNK, UNUSED_ROOT};

/// Special tokens and their fixed ids (BERT convention).
const SPECIAL_TOKENS: [(&str, usize); 6] = [
    (PAD, 0),
    (UNK, 1),
    (UNUSED_ROOT, 2),
    (CLS, 101),
    (SEP, 102),
    (MASK, 103),
];
const FIRST_WORD_ID: usize = 104;

/// Build a word-level tokenizer from corpus words.
pub fn build_word_level<I>(words: I, vocab_size: usize) -> Result<Tokenizer>
where
    I: IntoIterator<Item = String>,
{
    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in words {
        let w = word.to_lowercase();
        if w.is_empty() {
            continue;
        }
        *freq.entry(w.clone()).or_insert(0) += 1;
        if w.chars().count() > 1 {
            for c in w.chars() {
                *freq.entry(c.to_string()).or_insert(0) += 1;
            }
        }
    }

    // Frequency descending, ties alphabetical so rebuilds are stable
    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(vocab_size.saturating_sub(FIRST_WORD_ID));

    let mut vocab = serde_json::Map::new();
    for (tok, id) in SPECIAL_TOKENS {
        vocab.insert(tok.to_string(), serde_json::json!(id));
    }
    let mut next_id = FIRST_WORD_ID;
    for (word, _) in ranked {
        if !vocab.contains_key(&word) {
            vocab.insert(word, serde_json::json!(next_id));
            next_id += 1;
        }
    }

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .map(|(tok, id)| {
            serde_json::json!({
                "id": id, "content": tok, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        })
        .collect();

    let tokenizer_json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNK
        }
    });

    tracing::debug!("Word-level tokenizer built with {} entries", next_id);
    Tokenizer::from_str(&tokenizer_json.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot build tokenizer: {e}"))
}

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load the saved tokenizer, or build one from `words` and save it.
    pub fn load_or_build<I>(&self, words: I, vocab_size: usize) -> Result<Tokenizer>
    where
        I: IntoIterator<Item = String>,
    {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            return self.load();
        }
        tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
        let tokenizer = build_word_level(words, vocab_size)?;
        self.save(&tokenizer)?;
        Ok(tokenizer)
    }

    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        tokenizer
            .save(self.path(), true)
            .map_err(|e| anyhow::anyhow!("Cannot save tokenizer to '{}': {e}", self.path().display()))
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }
}
