//! Weighted term lexicon scored over raw text (the raw-text ensemble member)
//!
//! The model is delivered as an archive that extracts into a directory holding
//! `lexicon.yaml`:
//!
//! ```yaml
//! bias: -2.0
//! terms:
//!   jihad: 1.5
//!   bom bunuh diri: 3.0
//! ```

use crate::classifier::{Classifier, ScoringInput};
use crate::estimators::sigmoid;
use aho_corasick::{AhoCorasick, MatchKind};
use radwatch_core::{Error, ModelId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// File inside the lexicon directory holding the model
pub const LEXICON_FILE: &str = "lexicon.yaml";

/// Serialized form of the lexicon model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexiconSpec {
    #[serde(default)]
    pub bias: f32,
    #[serde(default)]
    pub terms: BTreeMap<String, f32>,
}

/// Lexicon model with a logistic link over the weights of matched terms
pub struct LexiconClassifier {
    matcher: AhoCorasick,
    weights: Vec<f32>,
    bias: f32,
}

impl LexiconClassifier {
    pub fn new(spec: LexiconSpec) -> Result<Self> {
        let (terms, weights): (Vec<String>, Vec<f32>) = spec
            .terms
            .into_iter()
            .map(|(term, weight)| (term.trim().to_lowercase(), weight))
            .filter(|(term, _)| !term.is_empty())
            .unzip();
        if terms.is_empty() {
            return Err(Error::classifier("lexicon has no terms"));
        }

        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&terms)
            .map_err(|e| Error::classifier(format!("Failed to build lexicon matcher: {}", e)))?;

        Ok(Self {
            matcher,
            weights,
            bias: spec.bias,
        })
    }

    /// Load `lexicon.yaml` from an extracted model directory
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(LEXICON_FILE);
        let content = std::fs::read_to_string(&path)?;
        let spec: LexiconSpec = serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse {:?}: {}", path, e)))?;
        Self::new(spec)
    }

    /// Raw score: bias plus the weight of every distinct term found on word boundaries
    pub fn score(&self, text: &str) -> f32 {
        let bytes = text.as_bytes();
        let mut seen = HashSet::new();
        let mut total = self.bias;
        for m in self.matcher.find_iter(text) {
            let before = m.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(m.end()).copied();
            let bounded = before.map_or(true, |b| !b.is_ascii_alphanumeric())
                && after.map_or(true, |b| !b.is_ascii_alphanumeric());
            if bounded && seen.insert(m.pattern().as_usize()) {
                total += self.weights[m.pattern().as_usize()];
            }
        }
        total
    }
}

impl Classifier for LexiconClassifier {
    fn id(&self) -> ModelId {
        ModelId::Lexicon
    }

    fn positive_probability(&self, input: &ScoringInput<'_>) -> Result<f32> {
        Ok(sigmoid(f64::from(self.score(input.text))) as f32)
    }
}
