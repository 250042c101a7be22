//! Progress tracking - per-level outcome totals, tested words and the review pool
//!
//! Everything lives in memory for one run of the program. The store owns the
//! canonical counters of every tested word; other components refer to words
//! by key.

use crate::catalog::{check_level_bounds, WordCatalog};
use crate::error::ValidationError;
use crate::word::{Level, Outcome, Word};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Default number of words pulled into a review round
pub const DEFAULT_REVIEW_LIMIT: usize = 10;

/// Lifetime outcome totals for a level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelTotals {
    pub mastered: u32,
    pub faulted: u32,
    pub failed: u32,
}

impl LevelTotals {
    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Mastered => self.mastered += 1,
            Outcome::Faulted => self.faulted += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.mastered + self.faulted + self.failed
    }

    /// Mastered share in percent, two decimals. Zero until something is mastered.
    pub fn accuracy(&self) -> f64 {
        if self.mastered == 0 {
            return 0.0;
        }
        let ratio = self.mastered as f64 / self.attempts() as f64;
        round2(ratio * 100.0)
    }
}

/// Tallies for the round in progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundTally {
    pub correct: u32,
    pub faulted: u32,
    pub incorrect: u32,
}

impl RoundTally {
    pub(crate) fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Mastered => self.correct += 1,
            Outcome::Faulted => self.faulted += 1,
            Outcome::Failed => self.incorrect += 1,
        }
    }
}

/// Statistics for one level, words sorted alphabetically
#[derive(Debug, Clone, Serialize)]
pub struct LevelReport {
    pub level: Level,
    pub totals: LevelTotals,
    pub accuracy: f64,
    pub total_attempts: u32,
    pub words: Vec<Word>,
    pub awaiting_review: usize,
}

/// Serializable view of the whole store
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub current_level: Level,
    pub round: RoundTally,
    pub levels: Vec<LevelReport>,
}

/// Per-run statistics store, shared by every quiz round of a session
#[derive(Debug, Clone)]
pub struct StatisticsStore {
    level_count: u32,
    current_level: Level,
    totals: HashMap<Level, LevelTotals>,
    tested: HashMap<Level, BTreeMap<String, Word>>,
    retry: HashMap<Level, BTreeSet<Word>>,
    round: RoundTally,
    previous_accuracy: HashMap<Level, f64>,
}

impl StatisticsStore {
    /// Create an empty store for a catalog with `level_count` levels
    pub fn new(level_count: u32) -> Self {
        StatisticsStore {
            level_count,
            current_level: Level::FIRST,
            totals: HashMap::new(),
            tested: HashMap::new(),
            retry: HashMap::new(),
            round: RoundTally::default(),
            previous_accuracy: HashMap::new(),
        }
    }

    pub fn for_catalog(catalog: &WordCatalog) -> Self {
        Self::new(catalog.level_count())
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn set_level(&mut self, level: Level) -> Result<(), ValidationError> {
        check_level_bounds(level, self.level_count)?;
        if level != self.current_level {
            info!("Level changed from {} to {}", self.current_level, level);
        }
        self.current_level = level;
        Ok(())
    }

    pub fn current_level(&self) -> Level {
        self.current_level
    }

    /// Move to the next level. Returns false when already at the last level.
    pub fn advance_level(&mut self) -> bool {
        if self.current_level.get() >= self.level_count {
            return false;
        }
        let next = Level::new(self.current_level.get() + 1);
        info!("Advancing from level {} to {}", self.current_level, next);
        self.current_level = next;
        true
    }

    pub fn is_at_max_level(&self) -> bool {
        self.current_level.get() >= self.level_count
    }

    /// Record one scored appearance of `word` and return its updated counters
    pub fn record_outcome(&mut self, level: Level, word: &Word, outcome: Outcome) -> &Word {
        self.totals.entry(level).or_default().add(outcome);
        self.round.add(outcome);

        let entry = self
            .tested
            .entry(level)
            .or_default()
            .entry(word.key().to_string())
            .or_insert_with(|| Word::new(word.key(), level));
        entry.record(outcome);

        debug!(
            "Recorded {:?} for '{}' on level {} ({} attempts)",
            outcome,
            entry.key(),
            level,
            entry.counts().attempts
        );
        entry
    }

    /// Put a word into a level's review pool. A word sits in at most one pool.
    pub fn add_to_retry(&mut self, level: Level, word: &Word) {
        for (other, pool) in self.retry.iter_mut() {
            if *other != level {
                pool.remove(word);
            }
        }
        if self.retry.entry(level).or_default().insert(word.clone()) {
            debug!("'{}' added to level {} review pool", word.key(), level);
        }
    }

    pub fn remove_from_retry(&mut self, level: Level, word: &Word) {
        let removed = self
            .retry
            .get_mut(&level)
            .map(|pool| pool.remove(word))
            .unwrap_or(false);
        if removed {
            debug!("'{}' removed from level {} review pool", word.key(), level);
        }
    }

    pub fn is_in_retry(&self, level: Level, word: &Word) -> bool {
        self.retry.get(&level).map(|pool| pool.contains(word)).unwrap_or(false)
    }

    pub fn retry_count(&self, level: Level) -> usize {
        self.retry.get(&level).map(|pool| pool.len()).unwrap_or(0)
    }

    /// Random, shuffled sample of up to `limit` words from the review pool
    pub fn retry_words(&self, level: Level, limit: usize) -> Vec<Word> {
        self.retry_words_with(level, limit, &mut rand::thread_rng())
    }

    pub fn retry_words_with<R: Rng + ?Sized>(&self, level: Level, limit: usize, rng: &mut R) -> Vec<Word> {
        let pool: Vec<&Word> = match self.retry.get(&level) {
            Some(pool) => pool.iter().collect(),
            None => return Vec::new(),
        };

        let mut picked: Vec<Word> = pool
            .choose_multiple(rng, limit)
            .map(|w| self.word_stats(level, w.key()).unwrap_or(*w).clone())
            .collect();
        picked.shuffle(rng);
        picked
    }

    /// Mastered over all scored appearances on a level, percent with two decimals
    pub fn accuracy(&self, level: Level) -> f64 {
        self.totals(level).accuracy()
    }

    pub fn totals(&self, level: Level) -> LevelTotals {
        self.totals.get(&level).copied().unwrap_or_default()
    }

    /// Remember a level's accuracy before a round so the change can be reported
    pub fn store_previous_accuracy(&mut self, level: Level) {
        let accuracy = self.accuracy(level);
        self.previous_accuracy.insert(level, accuracy);
    }

    pub fn accuracy_change(&self, level: Level) -> f64 {
        let previous = self.previous_accuracy.get(&level).copied().unwrap_or(0.0);
        round2(self.accuracy(level) - previous)
    }

    pub fn round_tally(&self) -> RoundTally {
        self.round
    }

    pub fn reset_round_tally(&mut self) {
        self.round = RoundTally::default();
    }

    pub fn has_been_tested(&self, level: Level) -> bool {
        self.tested.get(&level).map(|words| !words.is_empty()).unwrap_or(false)
    }

    /// Words scored on a level, sorted by key
    pub fn tested_words(&self, level: Level) -> Vec<&Word> {
        self.tested
            .get(&level)
            .map(|words| words.values().collect())
            .unwrap_or_default()
    }

    pub fn word_stats(&self, level: Level, key: &str) -> Option<&Word> {
        self.tested.get(&level).and_then(|words| words.get(key))
    }

    pub fn level_report(&self, level: Level) -> LevelReport {
        let words: Vec<Word> = self.tested_words(level).into_iter().cloned().collect();
        let totals = self.totals(level);
        LevelReport {
            level,
            totals,
            accuracy: totals.accuracy(),
            total_attempts: words.iter().map(|w| w.counts().attempts).sum(),
            words,
            awaiting_review: self.retry_count(level),
        }
    }

    /// Reports for every level with recorded activity
    pub fn snapshot(&self) -> StatsSnapshot {
        let levels = (1..=self.level_count)
            .map(Level::new)
            .filter(|level| self.has_been_tested(*level) || self.retry_count(*level) > 0)
            .map(|level| self.level_report(level))
            .collect();

        StatsSnapshot {
            current_level: self.current_level,
            round: self.round,
            levels,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// Drop every statistic and return to the just-loaded state
    pub fn clear_all(&mut self) {
        info!("Clearing all statistics");
        *self = Self::new(self.level_count);
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
