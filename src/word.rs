//! Word, level and outcome data shapes shared by the catalog, store and quiz

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 1-based level identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(u32);

impl Level {
    pub const FIRST: Level = Level(1);

    pub fn new(number: u32) -> Self {
        Level(number)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Zero-based position in the catalog's level list
    pub(crate) fn index(self) -> usize {
        self.0.saturating_sub(1) as usize
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a word was resolved in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Correct on the first attempt
    Mastered,
    /// Correct on the second attempt
    Faulted,
    /// Wrong on both attempts
    Failed,
}

/// Lifetime outcome counters for one word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCounts {
    pub correct: u32,
    pub faulted: u32,
    pub incorrect: u32,
    pub attempts: u32,
}

impl WordCounts {
    pub(crate) fn record(&mut self, outcome: Outcome) {
        self.attempts += 1;
        match outcome {
            Outcome::Mastered => self.correct += 1,
            Outcome::Faulted => self.faulted += 1,
            Outcome::Failed => self.incorrect += 1,
        }
    }
}

/// Normalize word text into its identity key
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A spelling word and its lifetime counters.
///
/// Equality, hashing and ordering use the normalized key only, so a word can
/// be found in the retry and tested sets after its counters change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    key: String,
    level: Level,
    #[serde(flatten)]
    counts: WordCounts,
}

impl Word {
    pub fn new(text: &str, level: Level) -> Self {
        Word {
            key: normalize(text),
            level,
            counts: WordCounts::default(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn counts(&self) -> WordCounts {
        self.counts
    }

    /// Case-insensitive comparison of a typed answer against the key
    pub fn is_spelled_by(&self, answer: &str) -> bool {
        normalize(answer) == self.key
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        self.counts.record(outcome);
    }
}

impl PartialEq for Word {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Word {}

impl Hash for Word {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Word {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Word {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
