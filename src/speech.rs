//! Speech boundary: what to say, who says it, and how long input waits for it
//!
//! The quiz engine only decides the announcement text. Speaking happens on a
//! worker thread through a [`Speaker`]; while it runs the session's
//! [`AnnouncementGate`] defers input, and a bounded timeout reopens input if
//! the speech process never reports back.

use crate::error::SpeechError;
use crate::word::Word;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Voice used for announcements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    #[default]
    Default,
    /// New Zealand English voice
    Alt,
}

impl Voice {
    pub fn festival_voice(self) -> &'static str {
        match self {
            Voice::Default => "voice_kal_diphone",
            Voice::Alt => "voice_akl_nz_jdt_diphone",
        }
    }
}

/// Spoken verdict that precedes the next prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lead {
    Correct,
    Incorrect,
}

impl Lead {
    fn as_str(self) -> &'static str {
        match self {
            Lead::Correct => "Correct . ",
            Lead::Incorrect => "Incorrect . ",
        }
    }
}

/// Text to be spoken and the voice to speak it in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub text: String,
    pub voice: Voice,
}

impl Announcement {
    /// "Spell cat." optionally preceded by the previous verdict
    pub fn spell(word: &Word, lead: Option<Lead>, voice: Voice) -> Self {
        let lead = lead.map(Lead::as_str).unwrap_or("");
        Announcement {
            text: format!("{}Spell {}.", lead, word.key()),
            voice,
        }
    }

    /// Second chance at the same word
    pub fn retry(word: &Word, voice: Voice) -> Self {
        Announcement {
            text: format!("{}Spell {} .", Lead::Incorrect.as_str(), word.key()),
            voice,
        }
    }

    /// Re-announcement requested by the user
    pub fn repeat(word: &Word, voice: Voice) -> Self {
        Announcement {
            text: format!("Spell {} .", word.key()),
            voice,
        }
    }

    /// Verdict on the last word of a round
    pub fn closing(lead: Lead, voice: Voice) -> Self {
        Announcement {
            text: lead.as_str().trim_end().to_string(),
            voice,
        }
    }
}

/// Something that can say an announcement. Blocks until speech finishes.
pub trait Speaker: Send + Sync {
    fn speak(&self, announcement: &Announcement) -> Result<(), SpeechError>;

    /// Stop whatever is being spoken. The interrupted `speak` call returns
    /// [`SpeechError::Cancelled`].
    fn cancel(&self) {}
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct RunningSpeech {
    id: u64,
    child: Child,
}

/// Speaks through the `festival` text-to-speech program in batch mode
#[derive(Debug)]
pub struct FestivalSpeaker {
    program: String,
    stretch: f32,
    next_id: AtomicU64,
    running: Mutex<Option<RunningSpeech>>,
}

impl FestivalSpeaker {
    pub fn new(stretch: f32) -> Self {
        FestivalSpeaker {
            program: "festival".to_string(),
            stretch,
            next_id: AtomicU64::new(0),
            running: Mutex::new(None),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Scheme script selecting the voice, slowing speech and saying the text
    pub fn script(&self, announcement: &Announcement) -> String {
        let escaped = announcement.text.replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "({})\n(Parameter.set 'Duration_Stretch {:.2})\n(SayText \"{}\")\n",
            announcement.voice.festival_voice(),
            self.stretch,
            escaped
        )
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningSpeech>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll the child started under `id` until it exits or is cancelled
    fn wait_for(&self, id: u64) -> Result<(), SpeechError> {
        loop {
            let mut running = self.running();
            let status = match running.as_mut() {
                Some(speech) if speech.id == id => speech.child.try_wait().map_err(SpeechError::Wait)?,
                _ => return Err(SpeechError::Cancelled),
            };
            match status {
                Some(status) => {
                    running.take();
                    if !status.success() {
                        return Err(SpeechError::ExitStatus(status.code().unwrap_or(-1)));
                    }
                    return Ok(());
                }
                None => {
                    drop(running);
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

impl Speaker for FestivalSpeaker {
    fn speak(&self, announcement: &Announcement) -> Result<(), SpeechError> {
        let mut script = tempfile::Builder::new()
            .prefix("voxspell")
            .suffix(".scm")
            .tempfile()
            .map_err(SpeechError::Script)?;
        script
            .write_all(self.script(announcement).as_bytes())
            .map_err(SpeechError::Script)?;
        script.flush().map_err(SpeechError::Script)?;

        let child = Command::new(&self.program)
            .arg("-b")
            .arg(script.path())
            .spawn()
            .map_err(SpeechError::Spawn)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(mut stale) = self.running().replace(RunningSpeech { id, child }) {
            // never leave two voices talking over each other
            let _ = stale.child.kill();
            let _ = stale.child.wait();
        }
        self.wait_for(id)
    }

    fn cancel(&self) {
        if let Some(mut speech) = self.running().take() {
            debug!("Stopping speech process {}", speech.child.id());
            if let Err(e) = speech.child.kill() {
                warn!("Could not stop speech process: {}", e);
            }
            let _ = speech.child.wait();
        }
    }
}

/// Speaker for muted runs and tests; finishes immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSpeaker;

impl Speaker for SilentSpeaker {
    fn speak(&self, announcement: &Announcement) -> Result<(), SpeechError> {
        debug!("(muted) {}", announcement.text);
        Ok(())
    }
}

/// How a background announcement ended from the caller's point of view
#[derive(Debug)]
pub enum AnnouncementStatus {
    Finished,
    Failed(SpeechError),
    TimedOut,
}

/// Runs a [`Speaker`] off the input thread
#[derive(Clone)]
pub struct SpeechWorker {
    speaker: Arc<dyn Speaker>,
}

impl SpeechWorker {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        SpeechWorker { speaker }
    }

    /// Start speaking; the returned handle reports completion
    pub fn announce(&self, announcement: Announcement) -> PendingAnnouncement {
        let (tx, rx) = mpsc::channel();
        let speaker = Arc::clone(&self.speaker);
        thread::spawn(move || {
            let result = speaker.speak(&announcement);
            // The receiver may have given up after a timeout
            let _ = tx.send(result);
        });
        PendingAnnouncement {
            rx,
            speaker: Arc::clone(&self.speaker),
        }
    }
}

/// Completion handle for one announcement
pub struct PendingAnnouncement {
    rx: Receiver<Result<(), SpeechError>>,
    speaker: Arc<dyn Speaker>,
}

impl PendingAnnouncement {
    /// Wait at most `timeout` for the speaker to finish. A timed out
    /// announcement is cancelled so it cannot overlap the next one.
    pub fn wait(self, timeout: Duration) -> AnnouncementStatus {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(())) => AnnouncementStatus::Finished,
            Ok(Err(e)) => AnnouncementStatus::Failed(e),
            Err(RecvTimeoutError::Timeout) => {
                self.speaker.cancel();
                AnnouncementStatus::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => AnnouncementStatus::Failed(SpeechError::WorkerGone),
        }
    }
}

/// Blocks input while an announcement plays, never longer than the timeout
#[derive(Debug, Clone)]
pub struct AnnouncementGate {
    started: Option<Instant>,
    timeout: Duration,
}

impl AnnouncementGate {
    pub fn new(timeout: Duration) -> Self {
        AnnouncementGate { started: None, timeout }
    }

    pub fn begin(&mut self) {
        self.begin_at(Instant::now());
    }

    pub fn begin_at(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn end(&mut self) {
        self.started = None;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_blocking(&mut self) -> bool {
        self.is_blocking_at(Instant::now())
    }

    /// True while an announcement is running. An announcement older than the
    /// timeout is abandoned and input reopens.
    pub fn is_blocking_at(&mut self, now: Instant) -> bool {
        match self.started {
            Some(start) if now.saturating_duration_since(start) < self.timeout => true,
            Some(_) => {
                warn!(
                    "Announcement not finished after {:?}; resuming input",
                    self.timeout
                );
                self.started = None;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::Level;

    struct SlowSpeaker(Duration);

    impl Speaker for SlowSpeaker {
        fn speak(&self, _announcement: &Announcement) -> Result<(), SpeechError> {
            thread::sleep(self.0);
            Ok(())
        }
    }

    /// Talks until cancelled
    #[derive(Default)]
    struct EndlessSpeaker {
        stopped: Mutex<bool>,
        cancels: AtomicU64,
    }

    impl Speaker for EndlessSpeaker {
        fn speak(&self, _announcement: &Announcement) -> Result<(), SpeechError> {
            while !*self.stopped.lock().unwrap() {
                thread::sleep(Duration::from_millis(5));
            }
            Err(SpeechError::Cancelled)
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            *self.stopped.lock().unwrap() = true;
        }
    }

    struct BrokenSpeaker;

    impl Speaker for BrokenSpeaker {
        fn speak(&self, _announcement: &Announcement) -> Result<(), SpeechError> {
            Err(SpeechError::ExitStatus(1))
        }
    }

    #[test]
    fn test_announcement_phrasing() {
        let word = Word::new("cat", Level::FIRST);
        assert_eq!(Announcement::spell(&word, None, Voice::Default).text, "Spell cat.");
        assert_eq!(
            Announcement::spell(&word, Some(Lead::Correct), Voice::Default).text,
            "Correct . Spell cat."
        );
        assert_eq!(Announcement::retry(&word, Voice::Alt).text, "Incorrect . Spell cat .");
        assert_eq!(Announcement::repeat(&word, Voice::Alt).text, "Spell cat .");
        assert_eq!(Announcement::closing(Lead::Incorrect, Voice::Alt).text, "Incorrect .");
    }

    #[test]
    fn test_festival_script() {
        let speaker = FestivalSpeaker::new(1.1);
        let word = Word::new("they're", Level::FIRST);
        let script = speaker.script(&Announcement::spell(&word, None, Voice::Alt));
        assert!(script.starts_with("(voice_akl_nz_jdt_diphone)\n"));
        assert!(script.contains("Duration_Stretch 1.10"));
        assert!(script.contains("(SayText \"Spell they're.\")"));
    }

    #[test]
    fn test_worker_reports_completion() {
        let worker = SpeechWorker::new(Arc::new(SilentSpeaker));
        let word = Word::new("cat", Level::FIRST);
        let pending = worker.announce(Announcement::repeat(&word, Voice::Default));
        assert!(matches!(pending.wait(Duration::from_secs(5)), AnnouncementStatus::Finished));
    }

    #[test]
    fn test_worker_reports_failure_and_timeout() {
        let word = Word::new("cat", Level::FIRST);

        let broken = SpeechWorker::new(Arc::new(BrokenSpeaker));
        let status = broken.announce(Announcement::repeat(&word, Voice::Default)).wait(Duration::from_secs(5));
        assert!(matches!(status, AnnouncementStatus::Failed(SpeechError::ExitStatus(1))));

        let slow = SpeechWorker::new(Arc::new(SlowSpeaker(Duration::from_millis(500))));
        let status = slow.announce(Announcement::repeat(&word, Voice::Default)).wait(Duration::from_millis(10));
        assert!(matches!(status, AnnouncementStatus::TimedOut));
    }

    #[test]
    fn test_timed_out_announcement_is_cancelled() {
        let word = Word::new("cat", Level::FIRST);
        let speaker = Arc::new(EndlessSpeaker::default());
        let worker = SpeechWorker::new(speaker.clone());

        let status = worker.announce(Announcement::repeat(&word, Voice::Default)).wait(Duration::from_millis(20));
        assert!(matches!(status, AnnouncementStatus::TimedOut));
        assert_eq!(speaker.cancels.load(Ordering::SeqCst), 1);
        assert!(*speaker.stopped.lock().unwrap());
    }

    #[test]
    fn test_finished_announcement_is_not_cancelled() {
        let word = Word::new("cat", Level::FIRST);
        let speaker = Arc::new(EndlessSpeaker::default());
        *speaker.stopped.lock().unwrap() = true;
        let worker = SpeechWorker::new(speaker.clone());

        let status = worker.announce(Announcement::repeat(&word, Voice::Default)).wait(Duration::from_secs(5));
        assert!(matches!(status, AnnouncementStatus::Failed(SpeechError::Cancelled)));
        assert_eq!(speaker.cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_festival_wait_after_cancel() {
        let speaker = FestivalSpeaker::new(1.0);
        speaker.cancel();
        assert!(speaker.running().is_none());
        assert!(matches!(speaker.wait_for(3), Err(SpeechError::Cancelled)));
    }

    #[test]
    fn test_gate_times_out() {
        let mut gate = AnnouncementGate::new(Duration::from_secs(3));
        let start = Instant::now();
        assert!(!gate.is_blocking_at(start));

        gate.begin_at(start);
        assert!(gate.is_blocking_at(start + Duration::from_secs(1)));
        assert!(!gate.is_blocking_at(start + Duration::from_secs(3)));
        // stays open once abandoned
        assert!(!gate.is_blocking_at(start + Duration::from_secs(1)));

        gate.begin_at(start);
        gate.end();
        assert!(!gate.is_blocking_at(start));
    }
}
