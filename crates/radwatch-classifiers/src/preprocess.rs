//! Text cleaning pipeline shared by the vectorizer and the training pipeline

use crate::stemmer::Stemmer;
use radwatch_core::Result;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const DEFAULT_STOPWORDS: &[&str] = &[
    "yang", "dan", "di", "ke", "dari", "ini", "itu", "dengan", "untuk", "pada", "adalah", "ada",
    "akan", "atau", "juga", "karena", "oleh", "saya", "kamu", "kami", "kita", "mereka", "dia",
    "sudah", "telah", "belum", "bisa", "dalam", "tidak", "tak", "bukan", "sangat", "lebih",
    "jadi", "agar", "supaya", "seperti", "sebagai", "tersebut", "hanya", "saja", "lagi", "pun",
    "kalau", "jika", "maka", "namun", "tetapi", "tapi", "the", "a", "an", "and", "or", "of",
    "to", "in", "is", "are",
];

const DEFAULT_SLANG: &[(&str, &str)] = &[
    ("gak", "tidak"),
    ("ga", "tidak"),
    ("nggak", "tidak"),
    ("tdk", "tidak"),
    ("yg", "yang"),
    ("dgn", "dengan"),
    ("utk", "untuk"),
    ("krn", "karena"),
    ("gue", "saya"),
    ("gw", "saya"),
    ("lu", "kamu"),
    ("lo", "kamu"),
    ("aja", "saja"),
    ("udah", "sudah"),
    ("udh", "sudah"),
    ("blm", "belum"),
    ("bgt", "banget"),
    ("kafirr", "kafir"),
    ("thogut", "thagut"),
];

/// Lower-casing, noise stripping, stopword removal, stemming and slang normalization
pub struct TextCleaner {
    url_regex: Regex,
    mention_regex: Regex,
    hashtag_regex: Regex,
    non_alpha_regex: Regex,
    stopwords: HashSet<String>,
    slang: HashMap<String, String>,
    stemmer: Stemmer,
}

impl TextCleaner {
    /// Create a cleaner with the built-in resources
    pub fn new() -> Result<Self> {
        Ok(Self {
            url_regex: compile(r"(https?://\S+|www\.\S+)")?,
            mention_regex: compile(r"@\w+")?,
            hashtag_regex: compile(r"#\w+")?,
            non_alpha_regex: compile(r"[^a-z\s]")?,
            stopwords: DEFAULT_STOPWORDS.iter().map(|w| w.to_string()).collect(),
            slang: DEFAULT_SLANG
                .iter()
                .map(|(slang, formal)| (slang.to_string(), formal.to_string()))
                .collect(),
            stemmer: Stemmer::new(),
        })
    }

    /// Replace the stopword list
    pub fn with_stopwords<I, S>(mut self, stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stopwords = stopwords.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the slang dictionary
    pub fn with_slang(mut self, slang: HashMap<String, String>) -> Self {
        self.slang = slang;
        self
    }

    /// Replace the stemmer
    pub fn with_stemmer(mut self, stemmer: Stemmer) -> Self {
        self.stemmer = stemmer;
        self
    }

    /// Cleaned tokens of `text`, in order
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let stripped = self.url_regex.replace_all(&lowered, " ");
        let stripped = self.mention_regex.replace_all(&stripped, " ");
        let stripped = self.hashtag_regex.replace_all(&stripped, " ");
        let alpha_only = self.non_alpha_regex.replace_all(&stripped, " ");
        let no_punct: String = alpha_only
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect();

        no_punct
            .split_whitespace()
            .filter(|token| !self.stopwords.contains(*token))
            .map(|token| self.stemmer.stem(token))
            .map(|token| self.slang.get(&token).cloned().unwrap_or(token))
            .filter(|token| token.len() > 1)
            .collect()
    }

    /// Cleaned text: tokens joined by single spaces
    pub fn clean(&self, text: &str) -> String {
        self.tokens(text).join(" ")
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        radwatch_core::Error::config(format!("Failed to compile cleaning regex: {}", e))
    })
}

/// Load a stopword list, one word per line; blank lines and `#` comments are ignored
pub fn load_word_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_lowercase())
        .collect())
}

/// Load a slang dictionary stored as a YAML map of `slang: formal`
pub fn load_slang_map(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| {
        radwatch_core::Error::config(format!("Failed to parse slang dictionary {:?}: {}", path, e))
    })
}
