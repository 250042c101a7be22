//! Error types for the spelling engine and its collaborators

use crate::quiz::SessionState;
use thiserror::Error;

/// Caller mistakes: bad level ids, input offered to a session that cannot take it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Level {level} is out of range (levels are 1-{max})")]
    LevelOutOfRange { level: u32, max: u32 },

    #[error("Session is not accepting input (state: {0:?})")]
    InactiveSession(SessionState),

    #[error("Repeat is not available until the current word changes")]
    RepeatUnavailable,
}

/// Word list loading failures
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read word list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read CSV row: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read Excel file: {0}")]
    Excel(String),

    #[error("Missing required '{0}' column in file header")]
    MissingColumn(&'static str),

    #[error("Unsupported file format: .{0}")]
    UnsupportedFormat(String),

    #[error("Word list has no level marker before line {0}")]
    WordBeforeLevel(usize),

    #[error("Word list contains no levels")]
    Empty,
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Speech process failures. These never reach the quiz engine; the driver logs
/// them and resumes input.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Failed to write speech script: {0}")]
    Script(std::io::Error),

    #[error("Failed to start speech process: {0}")]
    Spawn(std::io::Error),

    #[error("Failed to poll speech process: {0}")]
    Wait(std::io::Error),

    #[error("Speech process exited with status {0}")]
    ExitStatus(i32),

    #[error("Speech was cancelled")]
    Cancelled,

    #[error("Speech worker is gone")]
    WorkerGone,
}
