//! Voxspell - terminal spelling quiz
//!
//! Reads words aloud through festival, takes typed answers and keeps per-level
//! statistics for the lifetime of the process.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use voxspell_core::{
    Announcement, AnnouncementStatus, FestivalSpeaker, Level, QuizConfig, QuizSession, RoundSummary,
    SilentSpeaker, Speaker, SpeechWorker, StartResult, StatisticsStore, Submission, Verdict, Voice, WordCatalog,
};

#[derive(Parser, Debug)]
#[command(name = "voxspell")]
#[command(about = "Spelling practice with spoken words")]
struct Args {
    /// Word list (.txt level blocks, .csv or .xlsx)
    #[arg(short, long, default_value = "NZCER-spelling-lists.txt")]
    words: PathBuf,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Starting level
    #[arg(short, long, default_value = "1")]
    level: u32,

    /// Print announcements instead of speaking them
    #[arg(long)]
    mute: bool,

    /// Use the alternate (NZ) voice
    #[arg(long)]
    alt_voice: bool,
}

struct App {
    catalog: WordCatalog,
    stats: StatisticsStore,
    config: QuizConfig,
    worker: SpeechWorker,
    mute: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => QuizConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => QuizConfig::default(),
    };
    if args.alt_voice {
        config.voice = Voice::Alt;
    }

    let catalog = WordCatalog::load(&args.words).with_context(|| format!("loading {}", args.words.display()))?;
    let mut stats = StatisticsStore::for_catalog(&catalog);
    stats.set_level(Level::new(args.level))?;

    let speaker: Arc<dyn Speaker> = if args.mute {
        Arc::new(SilentSpeaker)
    } else {
        Arc::new(FestivalSpeaker::new(config.speech_stretch))
    };

    let mut app = App {
        catalog,
        stats,
        config,
        worker: SpeechWorker::new(speaker),
        mute: args.mute,
    };

    println!("Voxspell v{}", env!("CARGO_PKG_VERSION"));
    app.menu_loop()
}

impl App {
    fn menu_loop(&mut self) -> Result<()> {
        loop {
            let level = self.stats.current_level();
            println!();
            println!(
                "Level {} ({}) | accuracy {:.2}% | {} word(s) to review",
                level,
                self.catalog.level_name(level).unwrap_or("?"),
                self.stats.accuracy(level),
                self.stats.retry_count(level)
            );
            println!("Commands: new, review, stats [level], level <n>, levels, voice <default|alt>, clear, json, quit");

            let Some(line) = read_line("> ")? else { return Ok(()) };
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("new"), _) => {
                    let mut session = QuizSession::new_quiz(&self.catalog, &mut self.stats, &self.config)?;
                    run_round(&mut session, &self.worker, &self.config, self.mute)?;
                }
                (Some("review"), _) => {
                    let mut session = QuizSession::review(&mut self.stats, &self.config);
                    run_round(&mut session, &self.worker, &self.config, self.mute)?;
                }
                (Some("stats"), arg) => {
                    let level = arg.and_then(|n| n.parse().ok()).map(Level::new).unwrap_or(level);
                    self.show_stats(level);
                }
                (Some("level"), Some(n)) => match n.parse::<u32>() {
                    Ok(n) => {
                        if let Err(e) = self.stats.set_level(Level::new(n)) {
                            println!("{}", e);
                        }
                    }
                    Err(_) => println!("'{}' is not a level number", n),
                },
                (Some("levels"), _) => {
                    for (i, name) in self.catalog.level_names().iter().enumerate() {
                        println!("  {:>2}. {}", i + 1, name);
                    }
                }
                (Some("voice"), Some("alt")) => self.config.voice = Voice::Alt,
                (Some("voice"), Some("default")) => self.config.voice = Voice::Default,
                (Some("clear"), _) => {
                    if confirm("Clear all statistics?")? {
                        self.stats.clear_all();
                        println!("Statistics cleared.");
                    }
                }
                (Some("json"), _) => println!("{}", self.stats.to_json()?),
                (Some("quit"), _) | (Some("exit"), _) => return Ok(()),
                (None, _) => {}
                _ => println!("Unknown command: {}", line.trim()),
            }
        }
    }

    fn show_stats(&self, level: Level) {
        if self.catalog.check_level(level).is_err() {
            println!("No level {}", level);
            return;
        }
        let report = self.stats.level_report(level);
        if report.words.is_empty() {
            println!("No words have been tested yet for level {}! Try a quiz first.", level);
        } else {
            println!("Words tested in level {}:", level);
            for word in &report.words {
                let c = word.counts();
                println!(
                    "  {:<20} Correct: {} | Faulted: {} | Incorrect: {} | Attempts: {}",
                    word.key(),
                    c.correct,
                    c.faulted,
                    c.incorrect,
                    c.attempts
                );
            }
        }
        println!("Accuracy: {:.2}% | Attempts: {}", report.accuracy, report.total_attempts);
    }
}

fn run_round(session: &mut QuizSession<'_>, worker: &SpeechWorker, config: &QuizConfig, mute: bool) -> Result<()> {
    match session.start()? {
        StartResult::NothingToTest => {
            println!("No words to test on level {}! Go attempt a new quiz.", session.level());
            return Ok(());
        }
        StartResult::Started(announcement) => speak(session, worker, announcement, mute),
    }

    println!("Type your answer. ':r' repeats the word, ':q' returns to the menu.");
    loop {
        if let Some(word_no) = session.current_word().map(|_| session.word_number()) {
            let hints: Vec<&str> = session.hints().into_iter().map(|h| h.describe()).collect();
            println!("Spell word {} of {} {}", word_no, session.round_size(), hints.join(" "));
        }

        let Some(input) = read_line("spell> ")? else {
            session.abort();
            return Ok(());
        };

        match input.trim() {
            ":q" => {
                session.abort();
                return Ok(());
            }
            ":r" => match session.repeat_current() {
                Ok(announcement) => speak(session, worker, announcement, mute),
                Err(e) => println!("{}", e),
            },
            answer => match session.submit(answer)? {
                Submission::Deferred => println!("Please wait..."),
                Submission::Scored(report) => {
                    match report.verdict {
                        Verdict::Mastered | Verdict::Faulted => println!("Correct!"),
                        Verdict::TryAgain => {
                            println!("{} - try spelling it again...", report.check.feedback);
                            session.allow_repeat();
                        }
                        Verdict::Failed => println!("Incorrect. The word was '{}'", report.word.key()),
                    }
                    speak(session, worker, report.announcement, mute);

                    if let Some(summary) = report.summary {
                        print_summary(&summary);
                        if summary.offer_level_up && confirm("Would you like to progress to the next level?")? {
                            session.accept_level_up();
                        } else if summary.jump_eligible && summary.at_max_level && !summary.review {
                            println!("You have reached the max level!");
                        }
                        if summary.reward_unlocked {
                            offer_reward(config)?;
                        }
                        return Ok(());
                    }
                }
            },
        }
    }
}

/// Speak and hold input until the speaker finishes or the timeout passes
fn speak(session: &mut QuizSession<'_>, worker: &SpeechWorker, announcement: Announcement, mute: bool) {
    if mute {
        println!("  [{}]", announcement.text);
    }
    session.begin_announcement();
    let timeout = session.announcement_timeout();
    match worker.announce(announcement).wait(timeout) {
        AnnouncementStatus::Finished => {}
        AnnouncementStatus::Failed(e) => warn!("Speech failed: {}", e),
        AnnouncementStatus::TimedOut => warn!("Speech did not finish within {:?}", timeout),
    }
    session.end_announcement();
}

fn offer_reward(config: &QuizConfig) -> Result<()> {
    let Some(mut command) = config.reward_command() else {
        println!("Reward unlocked! Well done.");
        return Ok(());
    };
    if !confirm("Video reward unlocked! Would you like to watch a video?")? {
        return Ok(());
    }
    match command.status() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("Reward player exited with {}", status),
        Err(e) => warn!("Could not start reward player {:?}: {}", command.get_program(), e),
    }
    Ok(())
}

fn print_summary(summary: &RoundSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!();
    println!(
        "Quiz finished, you spelt {} of {} word(s) correct on the first try!",
        summary.first_attempt_correct, summary.round_size
    );
    println!(
        "Correct: {} | Faulted: {} | Incorrect: {} | {}s",
        summary.tally.correct,
        summary.tally.faulted,
        summary.tally.incorrect,
        elapsed.num_seconds()
    );
    println!(
        "Level {} accuracy: {:.2}% ({:+.2})",
        summary.level, summary.accuracy, summary.accuracy_change
    );
}

fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    stdout().flush()?;
    let mut input = String::new();
    if stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim_end_matches(['\r', '\n']).to_string()))
}

fn confirm(question: &str) -> Result<bool> {
    let answer = read_line(&format!("{} [y/N] ", question))?;
    Ok(matches!(answer.as_deref().map(str::trim), Some("y") | Some("Y") | Some("yes")))
}
