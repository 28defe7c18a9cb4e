//! Averaged word-embedding vectorizer

use crate::preprocess::TextCleaner;
use radwatch_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Word-embedding table in word2vec text format
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTable {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl EmbeddingTable {
    /// Build a table from in-memory vectors; every vector must share one dimension
    pub fn from_vectors<I>(dimension: usize, vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut table = Self {
            dimension,
            vectors: HashMap::new(),
        };
        for (word, vector) in vectors {
            if vector.len() != dimension {
                return Err(Error::config(format!(
                    "embedding for '{}' has {} components, expected {}",
                    word,
                    vector.len(),
                    dimension
                )));
            }
            table.vectors.insert(word, vector);
        }
        Ok(table)
    }

    /// Parse word2vec text: optional `count dim` header, then `word v1 .. vd` per line
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty()).peekable();
        let mut dimension = None;

        if let Some(first) = lines.peek() {
            let fields: Vec<&str> = first.split_whitespace().collect();
            if fields.len() == 2 && fields.iter().all(|f| f.parse::<usize>().is_ok()) {
                dimension = fields[1].parse::<usize>().ok();
                lines.next();
            }
        }

        let mut vectors = HashMap::new();
        for (line_no, line) in lines.enumerate() {
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let vector = fields
                .map(|f| f.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| {
                    Error::config(format!("invalid embedding value on line {}: {}", line_no + 1, e))
                })?;

            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected {
                return Err(Error::config(format!(
                    "embedding for '{}' has {} components, expected {}",
                    word,
                    vector.len(),
                    expected
                )));
            }
            vectors.insert(word.to_string(), vector);
        }

        Ok(Self {
            dimension: dimension.unwrap_or(0),
            vectors,
        })
    }

    /// Load a word2vec text file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }
}

/// Turns raw text into the averaged embedding of its cleaned tokens
pub struct Vectorizer {
    cleaner: TextCleaner,
    table: EmbeddingTable,
}

impl Vectorizer {
    pub fn new(cleaner: TextCleaner, table: EmbeddingTable) -> Self {
        Self { cleaner, table }
    }

    pub fn dimension(&self) -> usize {
        self.table.dimension()
    }

    pub fn cleaner(&self) -> &TextCleaner {
        &self.cleaner
    }

    /// Averaged embedding of `text`.
    ///
    /// Returns the all-zero vector when no token is found in the table.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0_f32; self.table.dimension()];
        let mut found = 0usize;

        for token in self.cleaner.tokens(text) {
            if let Some(vector) = self.table.get(&token) {
                for (acc, v) in sum.iter_mut().zip(vector) {
                    *acc += v;
                }
                found += 1;
            }
        }

        if found > 0 {
            let n = found as f32;
            sum.iter_mut().for_each(|v| *v /= n);
        }
        sum
    }
}

/// True when `vector` is the no-signal sentinel
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}
