//! Engine configuration loaded from JSON

use crate::error::ConfigError;
use crate::speech::Voice;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Tunable quiz constants. Missing fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    /// Words drawn for a new quiz
    pub round_size: usize,
    /// First-attempt correct answers needed to be offered the next level
    pub advance_threshold: u32,
    /// Maximum words in a review quiz
    pub review_limit: usize,
    /// How long input stays blocked waiting for speech to finish
    pub announcement_timeout_ms: u64,
    pub voice: Voice,
    /// Festival duration stretch; above 1.0 speaks slower
    pub speech_stretch: f32,
    /// Program and arguments launched when a round unlocks the reward,
    /// e.g. `["mpv", "reward.mp4"]`. Empty disables the reward.
    pub reward_command: Vec<String>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        QuizConfig {
            round_size: 10,
            advance_threshold: 9,
            review_limit: 10,
            announcement_timeout_ms: 10_000,
            voice: Voice::Default,
            speech_stretch: 1.1,
            reward_command: Vec::new(),
        }
    }
}

impl QuizConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: QuizConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.round_size == 0 {
            return Err(ConfigError::Invalid("round_size must be at least 1".to_string()));
        }
        if self.review_limit == 0 {
            return Err(ConfigError::Invalid("review_limit must be at least 1".to_string()));
        }
        if self.advance_threshold as usize > self.round_size {
            return Err(ConfigError::Invalid(format!(
                "advance_threshold {} exceeds round_size {}",
                self.advance_threshold, self.round_size
            )));
        }
        if !(self.speech_stretch > 0.0) {
            return Err(ConfigError::Invalid("speech_stretch must be positive".to_string()));
        }
        if self.reward_command.first().is_some_and(|program| program.trim().is_empty()) {
            return Err(ConfigError::Invalid("reward_command needs a program name".to_string()));
        }
        Ok(())
    }

    /// Command for the reward, if one is configured
    pub fn reward_command(&self) -> Option<Command> {
        let (program, args) = self.reward_command.split_first()?;
        let mut command = Command::new(program);
        command.args(args);
        Some(command)
    }

    pub fn announcement_timeout(&self) -> Duration {
        Duration::from_millis(self.announcement_timeout_ms)
    }
}
