//! Quiz session state machine
//!
//! One session drives one round: words are announced in queue order, each
//! word gets two attempts, and every scored attempt is written to the
//! [`StatisticsStore`] straight away. The caller polls the session after each
//! call; the session never calls back.

use crate::catalog::WordCatalog;
use crate::config::QuizConfig;
use crate::error::ValidationError;
use crate::fuzzy::{check_answer, MatchResult};
use crate::progress::{RoundTally, StatisticsStore};
use crate::speech::{Announcement, AnnouncementGate, Lead, Voice};
use crate::word::{Level, Outcome, Word};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Where a session is in its round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    AwaitingFirstAttempt,
    AwaitingSecondAttempt,
    Complete,
    Aborted,
    /// Built from an empty queue; there was nothing to test
    NoWords,
}

impl SessionState {
    /// A word is on screen and answers are accepted
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::AwaitingFirstAttempt | SessionState::AwaitingSecondAttempt
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Aborted | SessionState::NoWords
        )
    }
}

/// Result of one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Mastered,
    /// First attempt missed; the same word is asked again
    TryAgain,
    Faulted,
    Failed,
}

impl Verdict {
    /// The outcome written to the store, if this answer resolved the word
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Verdict::Mastered => Some(Outcome::Mastered),
            Verdict::Faulted => Some(Outcome::Faulted),
            Verdict::Failed => Some(Outcome::Failed),
            Verdict::TryAgain => None,
        }
    }
}

/// Written hints for words that are ambiguous when only heard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordHint {
    ContainsApostrophe,
    ContainsHyphen,
    MultipleWords,
}

impl WordHint {
    pub fn for_word(word: &Word) -> Vec<WordHint> {
        let key = word.key();
        let mut hints = Vec::new();
        if key.contains('\'') {
            hints.push(WordHint::ContainsApostrophe);
        }
        if key.contains('-') {
            hints.push(WordHint::ContainsHyphen);
        }
        if key.contains(char::is_whitespace) {
            hints.push(WordHint::MultipleWords);
        }
        hints
    }

    pub fn describe(self) -> &'static str {
        match self {
            WordHint::ContainsApostrophe => "Contains an apostrophe.",
            WordHint::ContainsHyphen => "Contains a hyphen.",
            WordHint::MultipleWords => "More than one word.",
        }
    }
}

/// What happened on a completed round
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub level: Level,
    pub review: bool,
    pub round_size: usize,
    pub first_attempt_correct: u32,
    pub tally: RoundTally,
    /// First-attempt score reached the advance threshold
    pub jump_eligible: bool,
    /// Eligible, not a review round, and a higher level exists
    pub offer_level_up: bool,
    pub at_max_level: bool,
    /// Eligible and not a review round; still earned on the top level
    pub reward_unlocked: bool,
    pub accuracy: f64,
    pub accuracy_change: f64,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// Everything the caller needs after a scored answer
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub verdict: Verdict,
    /// The word that was answered, with counters as of this attempt
    pub word: Word,
    pub check: MatchResult,
    /// What to say next
    pub announcement: Announcement,
    /// Set when this answer finished the round
    pub summary: Option<RoundSummary>,
}

/// Answer handling result
#[derive(Debug, Clone)]
pub enum Submission {
    /// An announcement is still playing; the answer was ignored
    Deferred,
    Scored(AttemptReport),
}

/// Result of starting a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResult {
    Started(Announcement),
    NothingToTest,
}

/// A single spelling round bound to the run's statistics store
pub struct QuizSession<'a> {
    stats: &'a mut StatisticsStore,
    level: Level,
    queue: Vec<Word>,
    position: usize,
    first_attempt_correct: u32,
    tally: RoundTally,
    review: bool,
    state: SessionState,
    repeat_suppressed: bool,
    voice: Voice,
    advance_threshold: u32,
    gate: AnnouncementGate,
    started_at: Option<DateTime<Local>>,
    summary: Option<RoundSummary>,
}

impl<'a> QuizSession<'a> {
    /// Session over an already drawn queue for the store's current level
    pub fn new(stats: &'a mut StatisticsStore, queue: Vec<Word>, review: bool, config: &QuizConfig) -> Self {
        let state = if queue.is_empty() {
            SessionState::NoWords
        } else {
            SessionState::NotStarted
        };

        QuizSession {
            level: stats.current_level(),
            stats,
            queue,
            position: 0,
            first_attempt_correct: 0,
            tally: RoundTally::default(),
            review,
            state,
            repeat_suppressed: false,
            voice: config.voice,
            advance_threshold: config.advance_threshold,
            gate: AnnouncementGate::new(config.announcement_timeout()),
            started_at: None,
            summary: None,
        }
    }

    /// Fresh random draw from the current level
    pub fn new_quiz(
        catalog: &WordCatalog,
        stats: &'a mut StatisticsStore,
        config: &QuizConfig,
    ) -> Result<Self, ValidationError> {
        let queue = catalog.draw_words(stats.current_level(), config.round_size)?;
        Ok(Self::new(stats, queue, false, config))
    }

    /// Review round over the current level's failed words
    pub fn review(stats: &'a mut StatisticsStore, config: &QuizConfig) -> Self {
        let queue = stats.retry_words(stats.current_level(), config.review_limit);
        Self::new(stats, queue, true, config)
    }

    /// Begin the round and return the first prompt
    pub fn start(&mut self) -> Result<StartResult, ValidationError> {
        match self.state {
            SessionState::NoWords => {
                info!("Nothing to test on level {}", self.level);
                Ok(StartResult::NothingToTest)
            }
            SessionState::NotStarted => {
                self.stats.reset_round_tally();
                self.stats.store_previous_accuracy(self.level);
                self.state = SessionState::AwaitingFirstAttempt;
                self.started_at = Some(Local::now());
                info!(
                    "Started {} round of {} words on level {}",
                    if self.review { "review" } else { "new" },
                    self.queue.len(),
                    self.level
                );
                let first = &self.queue[0];
                Ok(StartResult::Started(Announcement::spell(first, None, self.voice)))
            }
            state => Err(ValidationError::InactiveSession(state)),
        }
    }

    pub fn submit(&mut self, answer: &str) -> Result<Submission, ValidationError> {
        self.submit_at(answer, Instant::now())
    }

    /// Score an answer for the active word
    pub fn submit_at(&mut self, answer: &str, now: Instant) -> Result<Submission, ValidationError> {
        if !self.state.is_active() {
            return Err(ValidationError::InactiveSession(self.state));
        }
        if self.gate.is_blocking_at(now) {
            debug!("Answer deferred while an announcement is playing");
            return Ok(Submission::Deferred);
        }

        let word = self.queue[self.position].clone();
        let check = check_answer(answer, word.key());

        let verdict = match (self.state, check.is_correct) {
            (SessionState::AwaitingFirstAttempt, true) => Verdict::Mastered,
            (SessionState::AwaitingFirstAttempt, false) => Verdict::TryAgain,
            (_, true) => Verdict::Faulted,
            (_, false) => Verdict::Failed,
        };

        let report = match verdict.outcome() {
            None => {
                self.state = SessionState::AwaitingSecondAttempt;
                AttemptReport {
                    verdict,
                    announcement: Announcement::retry(&word, self.voice),
                    word,
                    check,
                    summary: None,
                }
            }
            Some(outcome) => {
                let scored = self.score(&word, outcome);
                let lead = if outcome == Outcome::Failed {
                    Lead::Incorrect
                } else {
                    Lead::Correct
                };
                let announcement = self.advance(lead);
                AttemptReport {
                    verdict,
                    word: scored,
                    check,
                    announcement,
                    summary: self.summary.clone(),
                }
            }
        };

        Ok(Submission::Scored(report))
    }

    /// Write an outcome to the store and keep the review pool in step with it
    fn score(&mut self, word: &Word, outcome: Outcome) -> Word {
        let scored = self.stats.record_outcome(self.level, word, outcome).clone();
        self.tally.add(outcome);
        if outcome == Outcome::Mastered {
            self.first_attempt_correct += 1;
        }

        // any correct answer, even on the second try, clears an outstanding failure
        match outcome {
            Outcome::Failed => self.stats.add_to_retry(self.level, word),
            Outcome::Mastered | Outcome::Faulted => self.stats.remove_from_retry(self.level, word),
        }

        self.queue[self.position] = scored.clone();
        scored
    }

    fn advance(&mut self, lead: Lead) -> Announcement {
        self.position += 1;
        self.repeat_suppressed = false;

        if self.position < self.queue.len() {
            self.state = SessionState::AwaitingFirstAttempt;
            return Announcement::spell(&self.queue[self.position], Some(lead), self.voice);
        }

        self.state = SessionState::Complete;
        let summary = self.build_summary();
        info!(
            "Round complete on level {}: {}/{} first try (jump eligible: {})",
            self.level, summary.first_attempt_correct, summary.round_size, summary.jump_eligible
        );
        self.summary = Some(summary);
        Announcement::closing(lead, self.voice)
    }

    fn build_summary(&self) -> RoundSummary {
        let jump_eligible = self.first_attempt_correct >= self.advance_threshold;
        let at_max_level = self.level.get() >= self.stats.level_count();
        let finished_at = Local::now();

        RoundSummary {
            level: self.level,
            review: self.review,
            round_size: self.queue.len(),
            first_attempt_correct: self.first_attempt_correct,
            tally: self.tally,
            jump_eligible,
            offer_level_up: jump_eligible && !self.review && !at_max_level,
            at_max_level,
            reward_unlocked: jump_eligible && !self.review,
            accuracy: self.stats.accuracy(self.level),
            accuracy_change: self.stats.accuracy_change(self.level),
            started_at: self.started_at.unwrap_or(finished_at),
            finished_at,
        }
    }

    /// Take the offered level-up. Returns false if none was offered.
    pub fn accept_level_up(&mut self) -> bool {
        match self.summary.as_mut() {
            Some(summary) if summary.offer_level_up => {
                summary.offer_level_up = false;
                self.stats.advance_level()
            }
            _ => false,
        }
    }

    /// Leave the round early. Round tallies are cleared so the next round starts clean.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            info!("Round aborted on level {} at word {}", self.level, self.position + 1);
            self.state = SessionState::Aborted;
        }
        self.gate.end();
        self.stats.reset_round_tally();
    }

    /// Re-announce the active word. Allowed once until the word changes or
    /// the consumer calls [`allow_repeat`](Self::allow_repeat).
    pub fn repeat_current(&mut self) -> Result<Announcement, ValidationError> {
        let word = self
            .current_word()
            .ok_or(ValidationError::InactiveSession(self.state))?;
        if self.repeat_suppressed {
            return Err(ValidationError::RepeatUnavailable);
        }
        let announcement = Announcement::repeat(word, self.voice);
        self.repeat_suppressed = true;
        Ok(announcement)
    }

    pub fn can_repeat(&self) -> bool {
        self.state.is_active() && !self.repeat_suppressed
    }

    pub fn suppress_repeat(&mut self) {
        self.repeat_suppressed = true;
    }

    pub fn allow_repeat(&mut self) {
        self.repeat_suppressed = false;
    }

    /// Speech has started; answers are deferred until it ends or times out
    pub fn begin_announcement(&mut self) {
        self.gate.begin();
    }

    pub fn begin_announcement_at(&mut self, now: Instant) {
        self.gate.begin_at(now);
    }

    pub fn end_announcement(&mut self) {
        self.gate.end();
    }

    pub fn announcement_timeout(&self) -> Duration {
        self.gate.timeout()
    }

    pub fn accepts_input(&mut self) -> bool {
        self.state.is_active() && !self.gate.is_blocking()
    }

    pub fn set_voice(&mut self, voice: Voice) {
        self.voice = voice;
    }

    pub fn voice(&self) -> Voice {
        self.voice
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn is_review(&self) -> bool {
        self.review
    }

    pub fn current_word(&self) -> Option<&Word> {
        if self.state.is_active() {
            self.queue.get(self.position)
        } else {
            None
        }
    }

    /// 1-based number of the active word
    pub fn word_number(&self) -> usize {
        (self.position + 1).min(self.queue.len())
    }

    pub fn round_size(&self) -> usize {
        self.queue.len()
    }

    pub fn first_attempt_correct(&self) -> u32 {
        self.first_attempt_correct
    }

    pub fn tally(&self) -> RoundTally {
        self.tally
    }

    pub fn hints(&self) -> Vec<WordHint> {
        self.current_word().map(WordHint::for_word).unwrap_or_default()
    }

    pub fn summary(&self) -> Option<&RoundSummary> {
        self.summary.as_ref()
    }

    pub fn stats(&self) -> &StatisticsStore {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(keys: &[&str]) -> Vec<Word> {
        keys.iter().map(|k| Word::new(k, Level::FIRST)).collect()
    }

    fn scored(submission: Submission) -> AttemptReport {
        match submission {
            Submission::Scored(report) => report,
            Submission::Deferred => panic!("answer was deferred"),
        }
    }

    #[test]
    fn test_cat_dog_round() {
        let mut stats = StatisticsStore::new(3);
        let config = QuizConfig::default();
        let mut session = QuizSession::new(&mut stats, words(&["cat", "dog"]), false, &config);

        let first = session.start().unwrap();
        assert_eq!(first, StartResult::Started(Announcement::spell(&Word::new("cat", Level::FIRST), None, Voice::Default)));

        let report = scored(session.submit("cat").unwrap());
        assert_eq!(report.verdict, Verdict::Mastered);
        assert_eq!(report.announcement.text, "Correct . Spell dog.");
        assert_eq!(session.current_word().unwrap().key(), "dog");

        let report = scored(session.submit("xyz").unwrap());
        assert_eq!(report.verdict, Verdict::TryAgain);
        assert_eq!(session.state(), SessionState::AwaitingSecondAttempt);
        assert!(session.stats().word_stats(Level::FIRST, "dog").is_none());

        let report = scored(session.submit("Dog").unwrap());
        assert_eq!(report.verdict, Verdict::Faulted);
        assert_eq!(report.word.counts().faulted, 1);
        assert_eq!(session.state(), SessionState::Complete);

        let summary = report.summary.unwrap();
        assert_eq!(summary.first_attempt_correct, 1);
        assert!(!summary.jump_eligible);
        assert!(!summary.offer_level_up);
        assert_eq!(summary.tally, RoundTally { correct: 1, faulted: 1, incorrect: 0 });
        assert_eq!(stats.round_tally(), RoundTally { correct: 1, faulted: 1, incorrect: 0 });
        assert_eq!(stats.accuracy(Level::FIRST), 50.0);
    }

    #[test]
    fn test_perfect_round_is_jump_eligible() {
        let mut stats = StatisticsStore::new(3);
        let config = QuizConfig::default();
        let keys = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let mut session = QuizSession::new(&mut stats, words(&keys), false, &config);
        session.start().unwrap();

        for key in keys {
            let report = scored(session.submit(key).unwrap());
            assert_eq!(report.verdict, Verdict::Mastered);
        }

        let summary = session.summary().unwrap().clone();
        assert_eq!(summary.tally.correct, 10);
        assert!(summary.jump_eligible);
        assert!(summary.offer_level_up);
        assert!(summary.reward_unlocked);
        assert!(session.accept_level_up());
        assert!(!session.accept_level_up());
        assert_eq!(stats.current_level(), Level::new(2));
        assert_eq!(stats.retry_count(Level::FIRST), 0);
    }

    #[test]
    fn test_top_level_still_unlocks_reward() {
        let mut stats = StatisticsStore::new(2);
        stats.set_level(Level::new(2)).unwrap();
        let config = QuizConfig { round_size: 2, advance_threshold: 2, ..QuizConfig::default() };
        let mut session = QuizSession::new(&mut stats, words(&["cat", "dog"]), false, &config);
        session.start().unwrap();
        scored(session.submit("cat").unwrap());
        scored(session.submit("dog").unwrap());

        let summary = session.summary().unwrap().clone();
        assert!(summary.jump_eligible);
        assert!(summary.at_max_level);
        assert!(!summary.offer_level_up);
        assert!(summary.reward_unlocked);
        assert!(!session.accept_level_up());
        assert_eq!(stats.current_level(), Level::new(2));
    }

    #[test]
    fn test_missed_threshold_unlocks_nothing() {
        let mut stats = StatisticsStore::new(2);
        let config = QuizConfig { round_size: 2, advance_threshold: 2, ..QuizConfig::default() };
        let mut session = QuizSession::new(&mut stats, words(&["cat", "dog"]), false, &config);
        session.start().unwrap();
        scored(session.submit("cat").unwrap());
        scored(session.submit("dgo").unwrap());
        let report = scored(session.submit("dog").unwrap());

        let summary = report.summary.unwrap();
        assert!(!summary.jump_eligible);
        assert!(!summary.reward_unlocked);
    }

    #[test]
    fn test_failed_word_joins_review_pool() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig::default();
        let mut session = QuizSession::new(&mut stats, words(&["cat", "dog"]), false, &config);
        session.start().unwrap();

        scored(session.submit("kat").unwrap());
        let report = scored(session.submit("catt").unwrap());
        assert_eq!(report.verdict, Verdict::Failed);
        assert_eq!(report.announcement.text, "Incorrect . Spell dog.");
        assert!(session.stats().is_in_retry(Level::FIRST, &report.word));
        assert_eq!(session.stats().round_tally().incorrect, 1);
    }

    #[test]
    fn test_review_round_clears_pool_and_never_levels_up() {
        let mut stats = StatisticsStore::new(3);
        for word in words(&["cat", "dog"]) {
            stats.record_outcome(Level::FIRST, &word, Outcome::Failed);
            stats.add_to_retry(Level::FIRST, &word);
        }
        let config = QuizConfig { advance_threshold: 1, ..QuizConfig::default() };

        let mut session = QuizSession::review(&mut stats, &config);
        assert!(session.is_review());
        session.start().unwrap();

        while let Some(word) = session.current_word().cloned() {
            if word.key() == "cat" {
                scored(session.submit("cat").unwrap());
            } else {
                scored(session.submit("dgo").unwrap());
                scored(session.submit("dog").unwrap());
            }
        }

        let summary = session.summary().unwrap().clone();
        assert!(summary.jump_eligible);
        assert!(!summary.offer_level_up);
        assert!(!summary.reward_unlocked);
        assert!(!session.accept_level_up());
        assert_eq!(stats.retry_count(Level::FIRST), 0);
        assert_eq!(stats.current_level(), Level::FIRST);
    }

    #[test]
    fn test_empty_queue_has_nothing_to_test() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig::default();
        let mut session = QuizSession::review(&mut stats, &config);

        assert_eq!(session.state(), SessionState::NoWords);
        assert_eq!(session.start().unwrap(), StartResult::NothingToTest);
        assert_eq!(
            session.submit("cat").unwrap_err(),
            ValidationError::InactiveSession(SessionState::NoWords)
        );
    }

    #[test]
    fn test_input_rejected_when_inactive() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig::default();
        let mut session = QuizSession::new(&mut stats, words(&["cat"]), false, &config);

        assert!(matches!(
            session.submit("cat"),
            Err(ValidationError::InactiveSession(SessionState::NotStarted))
        ));
        session.start().unwrap();
        scored(session.submit("cat").unwrap());
        assert!(matches!(
            session.submit("cat"),
            Err(ValidationError::InactiveSession(SessionState::Complete))
        ));
        assert!(session.start().is_err());
    }

    #[test]
    fn test_repeat_once_per_word() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig::default();
        let mut session = QuizSession::new(&mut stats, words(&["cat", "dog"]), false, &config);
        assert!(session.repeat_current().is_err());
        session.start().unwrap();

        assert!(session.can_repeat());
        assert_eq!(session.repeat_current().unwrap().text, "Spell cat .");
        assert_eq!(session.repeat_current(), Err(ValidationError::RepeatUnavailable));

        // second attempt on the same word stays suppressed until allowed
        scored(session.submit("kat").unwrap());
        assert!(!session.can_repeat());
        session.allow_repeat();
        assert!(session.repeat_current().is_ok());

        // a new word re-arms repeat
        scored(session.submit("cat").unwrap());
        assert!(session.can_repeat());
        session.suppress_repeat();
        assert!(!session.can_repeat());
    }

    #[test]
    fn test_answers_deferred_during_announcement() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig { announcement_timeout_ms: 1_000, ..QuizConfig::default() };
        let mut session = QuizSession::new(&mut stats, words(&["cat"]), false, &config);
        session.start().unwrap();

        let now = Instant::now();
        session.begin_announcement_at(now);
        assert!(matches!(session.submit_at("cat", now).unwrap(), Submission::Deferred));
        assert_eq!(session.state(), SessionState::AwaitingFirstAttempt);

        session.end_announcement();
        let report = scored(session.submit_at("cat", now).unwrap());
        assert_eq!(report.verdict, Verdict::Mastered);
    }

    #[test]
    fn test_stuck_announcement_times_out() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig { announcement_timeout_ms: 1_000, ..QuizConfig::default() };
        let mut session = QuizSession::new(&mut stats, words(&["cat"]), false, &config);
        session.start().unwrap();

        let now = Instant::now();
        session.begin_announcement_at(now);
        let later = now + Duration::from_secs(2);
        let report = scored(session.submit_at("cat", later).unwrap());
        assert_eq!(report.verdict, Verdict::Mastered);
    }

    #[test]
    fn test_abort_resets_round_tally() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig::default();
        let mut session = QuizSession::new(&mut stats, words(&["cat", "dog"]), false, &config);
        session.start().unwrap();
        scored(session.submit("cat").unwrap());
        assert_eq!(session.stats().round_tally().correct, 1);

        session.abort();
        assert_eq!(session.state(), SessionState::Aborted);
        assert!(session.submit("dog").is_err());
        assert_eq!(stats.round_tally(), RoundTally::default());
        assert_eq!(stats.totals(Level::FIRST).mastered, 1);
    }

    #[test]
    fn test_hints_for_active_word() {
        let mut stats = StatisticsStore::new(1);
        let config = QuizConfig::default();
        let mut session = QuizSession::new(&mut stats, words(&["they're", "cat"]), false, &config);
        assert!(session.hints().is_empty());
        session.start().unwrap();
        assert_eq!(session.hints(), vec![WordHint::ContainsApostrophe]);
        scored(session.submit("they're").unwrap());
        assert!(session.hints().is_empty());
    }
}
