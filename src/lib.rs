//! Voxspell Core - spelling quiz engine
//!
//! Provides word list loading, the two-attempt quiz state machine, per-level
//! statistics with a review pool, and the speech boundary used to read words aloud.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod progress;
pub mod quiz;
pub mod speech;
pub mod word;

pub use catalog::{LevelList, WordCatalog};
pub use config::QuizConfig;
pub use error::{CatalogError, ConfigError, SpeechError, ValidationError};
pub use fuzzy::{check_answer, MatchResult};
pub use progress::{LevelReport, LevelTotals, RoundTally, StatisticsStore, StatsSnapshot, DEFAULT_REVIEW_LIMIT};
pub use quiz::{AttemptReport, QuizSession, RoundSummary, SessionState, StartResult, Submission, Verdict, WordHint};
pub use speech::{
    Announcement, AnnouncementGate, AnnouncementStatus, FestivalSpeaker, Lead, PendingAnnouncement, SilentSpeaker,
    Speaker, SpeechWorker, Voice,
};
pub use word::{Level, Outcome, Word, WordCounts};
