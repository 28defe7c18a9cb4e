//! Rule-based Indonesian stemmer
//!
//! Affix stripping in the Nazief-Adriani order (inflectional suffixes,
//! derivational prefixes, derivational suffixes) with a minimum stem length
//! guard. When a root dictionary is supplied, any word found in it is returned
//! unchanged at every step.

use std::collections::HashSet;

const MIN_STEM_LEN: usize = 4;

const PARTICLES: [&str; 4] = ["lah", "kah", "tah", "pun"];
const POSSESSIVES: [&str; 3] = ["nya", "ku", "mu"];
const DERIVATIONAL_SUFFIXES: [&str; 3] = ["kan", "an", "i"];

/// Roots that the affix rules would otherwise mangle
const DEFAULT_ROOTS: &[&str] = &[
    "teroris", "radikal", "serang", "jihad", "kafir", "bela", "perang", "pemerintah", "bom",
    "makan", "minum", "senjata", "teror", "ideologi", "khilafah", "murtad", "tentara",
];

/// Indonesian affix-stripping stemmer
#[derive(Debug, Clone)]
pub struct Stemmer {
    roots: HashSet<String>,
}

impl Stemmer {
    /// Create a stemmer with the built-in protected roots
    pub fn new() -> Self {
        Self {
            roots: DEFAULT_ROOTS.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Add dictionary roots that must never be stripped further
    pub fn with_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    fn is_root(&self, word: &str) -> bool {
        self.roots.contains(word)
    }

    /// Stem a single lower-case token
    pub fn stem(&self, word: &str) -> String {
        if !word.is_ascii() || word.len() <= MIN_STEM_LEN || self.is_root(word) {
            return word.to_string();
        }

        let mut current = strip_suffix(word, &PARTICLES).unwrap_or(word).to_string();
        if let Some(stripped) = strip_suffix(&current, &POSSESSIVES) {
            current = stripped.to_string();
        }
        if self.is_root(&current) {
            return current;
        }

        if let Some((prefix, rest)) = strip_prefix(&current) {
            current = rest;
            if matches!(prefix, "di" | "ke" | "se") && !self.is_root(&current) {
                if let Some((_, rest)) = strip_prefix(&current) {
                    current = rest;
                }
            }
        }
        if self.is_root(&current) {
            return current;
        }

        match strip_suffix(&current, &DERIVATIONAL_SUFFIXES) {
            Some(stripped) => stripped.to_string(),
            None => current,
        }
    }
}

impl Default for Stemmer {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_suffix<'a>(word: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|suffix| {
        word.strip_suffix(*suffix)
            .filter(|rest| rest.len() >= MIN_STEM_LEN)
    })
}

fn starts_with_vowel(s: &str) -> bool {
    s.starts_with(['a', 'e', 'i', 'o', 'u'])
}

/// Remove one derivational prefix, applying the nasal recoding rules.
///
/// Returns the matched prefix and the remaining stem.
fn strip_prefix(word: &str) -> Option<(&'static str, String)> {
    const RULES: [(&str, Option<&str>); 15] = [
        ("meny", Some("s")),
        ("peny", Some("s")),
        ("meng", None),
        ("peng", None),
        ("mem", Some("p")),
        ("pem", Some("p")),
        ("men", Some("t")),
        ("pen", Some("t")),
        ("ber", None),
        ("ter", None),
        ("per", None),
        ("me", None),
        ("di", None),
        ("ke", None),
        ("se", None),
    ];

    for (prefix, vowel_recode) in RULES {
        let Some(rest) = word.strip_prefix(prefix) else {
            continue;
        };
        let stem = match vowel_recode {
            Some(initial) if starts_with_vowel(rest) => format!("{}{}", initial, rest),
            _ => rest.to_string(),
        };
        let min_len = if matches!(prefix, "ke" | "se") {
            MIN_STEM_LEN + 1
        } else {
            MIN_STEM_LEN
        };
        if stem.len() >= min_len {
            return Some((prefix, stem));
        }
        return None;
    }
    None
}
