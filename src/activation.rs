//! Activation state machine
//!
//! Consumes recognition responses and decides when the device wakes up,
//! which utterance is the question, and what gets spoken back. Only final
//! transcripts move the state; interim ones are echoed to the console and
//! nothing else.
//!
//! ```text
//!            final ≈ activation phrase
//!   ┌──────┐ ─────────────────────────▶ ┌───────────┐
//!   │ Idle │                            │ Activated │
//!   └──────┘ ◀───────────────────────── └───────────┘
//!            final: lookup → speak
//! ```
//!
//! A final transcript containing the word "exit" or "quit" ends the session
//! from either state. Transcripts that arrive while a reply is being spoken
//! are the device hearing itself and are discarded.

use std::io::Write;
use std::sync::{Arc, LazyLock};

use futures::StreamExt;
use regex::Regex;

use crate::answer::AnswerService;
use crate::indicator::StatusIndicator;
use crate::voice::{RecognitionResponse, SpeechOutput, TranscriptEvent, TranscriptStream};
use crate::{Error, Result};

/// Minimum similarity score (0-100) for a final transcript to wake the device
pub const ACTIVATION_THRESHOLD: u32 = 67;

/// Minimum answer accuracy (0-100) for the answer to be spoken as-is
pub const ANSWER_CONFIDENCE_THRESHOLD: u32 = 70;

static EXIT_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(exit|quit)\b").expect("valid regex"));

/// Whether the device is waiting for its activation phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// Waiting for the activation phrase
    #[default]
    Idle,
    /// The next final transcript is a question
    Activated,
}

/// What the caller should do after a response is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// An exit phrase was heard
    Exit,
}

/// Why a recognition session ended without a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The recognizer's duration cap was reached
    LimitReached,
    /// An exit phrase was heard
    ExitRequested,
    /// The recognizer closed the stream
    StreamClosed,
}

/// How the transcript stream ended while a reply was playing
enum Interrupted {
    Closed,
    Failed(Error),
}

/// Similarity of two strings on a 0-100 scale
///
/// Based on the insertion/deletion edit distance:
/// `100 * (len(a) + len(b) - distance) / (len(a) + len(b))`, rounded.
/// Either string being empty scores 0.
#[must_use]
pub fn similarity_ratio(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // Longest common subsequence, one row at a time
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    let common = prev[b.len()];

    // distance = total - 2 * common, so the ratio is 200 * common / total
    let score = (200 * common + total / 2) / total;
    u32::try_from(score).unwrap_or(100)
}

/// Whether a transcript asks to end the session
///
/// Matches "exit" or "quit" as whole words, ignoring case.
#[must_use]
pub fn is_exit_phrase(transcript: &str) -> bool {
    EXIT_PHRASE.is_match(transcript)
}

/// Spoken when the best match is not confident enough
#[must_use]
pub fn fallback_utterance(recommended_question: &str) -> String {
    format!("Sorry, I did not get that. Did you mean to ask {recommended_question}")
        .trim_end()
        .to_string()
}

/// Live console echo of the transcript
///
/// Interim text is written with a carriage return so the next update
/// overwrites it in place; a final transcript ends the line.
pub struct TranscriptDisplay {
    out: Box<dyn Write + Send>,
    chars_printed: usize,
}

impl TranscriptDisplay {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            chars_printed: 0,
        }
    }

    /// Echo to standard output
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Produce the console text for an event and advance the overwrite state
    pub fn render(&mut self, event: &TranscriptEvent) -> String {
        let len = event.text.chars().count();
        // Blank out whatever is left of a longer previous interim line
        let padding = " ".repeat(self.chars_printed.saturating_sub(len));

        if event.is_final {
            self.chars_printed = 0;
            format!("{}{padding}\n", event.text)
        } else {
            self.chars_printed = len;
            format!("{}{padding}\r", event.text)
        }
    }

    /// Render and write an event
    pub fn show(&mut self, event: &TranscriptEvent) {
        let line = self.render(event);
        if let Err(e) = self
            .out
            .write_all(line.as_bytes())
            .and_then(|()| self.out.flush())
        {
            tracing::debug!(error = %e, "failed to echo transcript");
        }
    }
}

/// Drives wake-up, question dispatch, and the spoken reply
pub struct ActivationMachine {
    activation_phrase: String,
    state: ActivationState,
    indicator: Arc<dyn StatusIndicator>,
    answers: Arc<dyn AnswerService>,
    speech: Arc<dyn SpeechOutput>,
    display: TranscriptDisplay,
    interrupted: Option<Interrupted>,
}

impl ActivationMachine {
    pub fn new(
        activation_phrase: &str,
        indicator: Arc<dyn StatusIndicator>,
        answers: Arc<dyn AnswerService>,
        speech: Arc<dyn SpeechOutput>,
    ) -> Self {
        Self {
            activation_phrase: activation_phrase.trim().to_lowercase(),
            state: ActivationState::Idle,
            indicator,
            answers,
            speech,
            display: TranscriptDisplay::stdout(),
            interrupted: None,
        }
    }

    /// Replace the console echo target
    #[must_use]
    pub fn with_display(mut self, display: TranscriptDisplay) -> Self {
        self.display = display;
        self
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ActivationState {
        self.state
    }

    /// Consume a session's transcripts until it ends
    ///
    /// The duration-limit signal ends the session normally; any other
    /// stream error is returned. Responses delivered while a reply is
    /// playing are dropped.
    ///
    /// # Errors
    ///
    /// Returns error on a transport fault or a synthesis/playback failure
    pub async fn run(&mut self, mut transcripts: TranscriptStream) -> Result<SessionEnd> {
        while let Some(item) = transcripts.next().await {
            let response = match item {
                Ok(response) => response,
                Err(e) => return session_end(e),
            };

            if self.step(&response, Some(&mut transcripts)).await? == Flow::Exit {
                return Ok(SessionEnd::ExitRequested);
            }

            match self.interrupted.take() {
                Some(Interrupted::Closed) => return Ok(SessionEnd::StreamClosed),
                Some(Interrupted::Failed(e)) => return session_end(e),
                None => {}
            }
        }
        Ok(SessionEnd::StreamClosed)
    }

    /// Handle one recognition response
    ///
    /// Responses without a result or alternative are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if speaking the reply fails
    pub async fn handle(&mut self, response: &RecognitionResponse) -> Result<Flow> {
        self.step(response, None).await
    }

    async fn step(
        &mut self,
        response: &RecognitionResponse,
        transcripts: Option<&mut TranscriptStream>,
    ) -> Result<Flow> {
        let Some(event) = response.top_event() else {
            return Ok(Flow::Continue);
        };

        self.display.show(&event);
        if !event.is_final {
            return Ok(Flow::Continue);
        }

        if is_exit_phrase(&event.text) {
            tracing::info!(transcript = %event.text, "exit phrase heard");
            return Ok(Flow::Exit);
        }

        match self.state {
            ActivationState::Idle => {
                let heard = event.text.trim().to_lowercase();
                let score = similarity_ratio(&heard, &self.activation_phrase);
                if score >= ACTIVATION_THRESHOLD {
                    self.state = ActivationState::Activated;
                    self.indicator.activated();
                    tracing::info!(transcript = %event.text, score, "activated");
                } else {
                    tracing::trace!(transcript = %event.text, score, "not the activation phrase");
                }
            }
            ActivationState::Activated => self.respond(&event.text, transcripts).await?,
        }

        Ok(Flow::Continue)
    }

    /// Look up `question`, speak the reply, and go back to idle
    async fn respond(
        &mut self,
        question: &str,
        transcripts: Option<&mut TranscriptStream>,
    ) -> Result<()> {
        self.indicator.processing();
        tracing::info!(question, "question received");

        let reply = match self.answers.lookup(question).await {
            Ok(record) if record.accuracy >= ANSWER_CONFIDENCE_THRESHOLD => record.answer,
            Ok(record) => {
                tracing::info!(
                    accuracy = record.accuracy,
                    recommended = %record.question,
                    "low confidence answer"
                );
                fallback_utterance(&record.question)
            }
            Err(e) => {
                tracing::warn!(error = %e, "answer lookup failed");
                fallback_utterance("")
            }
        };

        let spoken = match transcripts {
            Some(transcripts) => self.speak_over(&reply, transcripts).await,
            None => self.speech.speak(&reply).await,
        };

        self.state = ActivationState::Idle;
        self.indicator.idle_listening();
        spoken
    }

    /// Speak while discarding whatever the recognizer hears meanwhile
    ///
    /// A stream end or fault seen during playback is kept for `run`.
    async fn speak_over(&mut self, reply: &str, transcripts: &mut TranscriptStream) -> Result<()> {
        let speech = Arc::clone(&self.speech);
        let mut speaking = speech.speak(reply);
        let mut interrupted = None;
        let mut discarded = 0u32;

        let spoken = loop {
            tokio::select! {
                biased;
                spoken = &mut speaking => break spoken,
                item = transcripts.next(), if interrupted.is_none() => match item {
                    Some(Ok(_)) => discarded += 1,
                    Some(Err(e)) => interrupted = Some(Interrupted::Failed(e)),
                    None => interrupted = Some(Interrupted::Closed),
                },
            }
        };

        if discarded > 0 {
            tracing::debug!(discarded, "dropped transcripts heard while speaking");
        }
        self.interrupted = interrupted;
        spoken
    }
}

fn session_end(e: Error) -> Result<SessionEnd> {
    if e.is_stream_limit() {
        Ok(SessionEnd::LimitReached)
    } else {
        Err(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str, is_final: bool) -> TranscriptEvent {
        TranscriptEvent {
            text: text.to_string(),
            is_final,
        }
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity_ratio("hey cub", "hey cub"), 100);
        assert_eq!(similarity_ratio("hey cab", "hey cub"), 86);
        assert_eq!(similarity_ratio("", "hey cub"), 0);
        assert!(similarity_ratio("hello world", "hey cub") < ACTIVATION_THRESHOLD);
        assert!(similarity_ratio("what time is it", "hey cub") < ACTIVATION_THRESHOLD);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        assert_eq!(
            similarity_ratio("hey club", "hey cub"),
            similarity_ratio("hey cub", "hey club")
        );
    }

    #[test]
    fn test_exit_phrase_whole_word() {
        assert!(is_exit_phrase("please exit now"));
        assert!(is_exit_phrase("QUIT"));
        assert!(is_exit_phrase("ok, Exit."));
        assert!(!is_exit_phrase("exiting"));
        assert!(!is_exit_phrase("quite right"));
        assert!(!is_exit_phrase("the exits are there"));
    }

    #[test]
    fn test_fallback_utterance() {
        assert_eq!(
            fallback_utterance("what is your name"),
            "Sorry, I did not get that. Did you mean to ask what is your name"
        );
        assert_eq!(
            fallback_utterance(""),
            "Sorry, I did not get that. Did you mean to ask"
        );
    }

    #[test]
    fn test_display_overwrites_interim_text() {
        let mut display = TranscriptDisplay::new(Box::new(std::io::sink()));

        assert_eq!(display.render(&event("what time", false)), "what time\r");
        assert_eq!(display.render(&event("what", false)), "what     \r");
        assert_eq!(display.render(&event("what time is it", true)), "what time is it\n");
        // Counter resets after a final line
        assert_eq!(display.render(&event("hi", false)), "hi\r");
    }

    #[test]
    fn test_display_pads_shorter_final() {
        let mut display = TranscriptDisplay::new(Box::new(std::io::sink()));
        display.render(&event("hey cubby", false));
        assert_eq!(display.render(&event("hey cub", true)), "hey cub  \n");
    }
}
