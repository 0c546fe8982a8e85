//! Shared test utilities
//!
//! Recording fakes for every collaborator of the device loop, so sessions
//! run without audio hardware, GPIO, or network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use cub_device::voice::{
    AudioInput, AudioStream, CaptureReceiver, CaptureSender, RecognitionResponse, SpeechOutput,
    TranscriptStream, Transcriber, capture_buffer,
};
use cub_device::{AnswerRecord, AnswerService, ConnectivityProbe, Error, Result, StatusIndicator};

/// A status light change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Ready,
    Pulse,
    Idle,
    Activated,
    Processing,
    Reset,
}

/// Indicator that records every call
#[derive(Default)]
pub struct RecordingIndicator {
    signals: Mutex<Vec<Signal>>,
}

impl RecordingIndicator {
    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    fn record(&self, signal: Signal) {
        self.signals.lock().unwrap().push(signal);
    }
}

impl StatusIndicator for RecordingIndicator {
    fn ready(&self) {
        self.record(Signal::Ready);
    }
    fn connectivity_lost_pulse(&self) {
        self.record(Signal::Pulse);
    }
    fn idle_listening(&self) {
        self.record(Signal::Idle);
    }
    fn activated(&self) {
        self.record(Signal::Activated);
    }
    fn processing(&self) {
        self.record(Signal::Processing);
    }
    fn reset(&self) {
        self.record(Signal::Reset);
    }
}

/// Speech output that records what would have been said
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    fail: bool,
    duration: Duration,
}

impl RecordingSpeech {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Each reply takes `duration` to play
    pub fn lasting(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechOutput for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        if self.fail {
            return Err(Error::Playback("speaker unplugged".to_string()));
        }
        Ok(())
    }
}

/// Answer service replaying canned results in order
#[derive(Default)]
pub struct ScriptedAnswers {
    replies: Mutex<VecDeque<Result<AnswerRecord>>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedAnswers {
    pub fn new(replies: Vec<Result<AnswerRecord>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerService for ScriptedAnswers {
    async fn lookup(&self, question: &str) -> Result<AnswerRecord> {
        self.questions.lock().unwrap().push(question.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Service("no scripted reply".to_string())))
    }
}

/// Build an answer record
pub fn record(question: &str, answer: &str, accuracy: u32, times_asked: u32) -> AnswerRecord {
    AnswerRecord {
        question: question.to_string(),
        answer: answer.to_string(),
        accuracy,
        times_asked,
    }
}

/// Final transcript response
pub fn final_text(text: &str) -> Result<RecognitionResponse> {
    Ok(RecognitionResponse::single(text, true))
}

/// Interim transcript response
pub fn interim_text(text: &str) -> Result<RecognitionResponse> {
    Ok(RecognitionResponse::single(text, false))
}

/// One scripted recognition session
pub enum SessionScript {
    /// Opening the session fails
    OpenFails,
    /// The session yields these items, then the stream ends
    Responses(Vec<Result<RecognitionResponse>>),
}

/// Transcriber replaying one script per opened session
#[derive(Default)]
pub struct ScriptedTranscriber {
    sessions: Mutex<VecDeque<SessionScript>>,
    opened: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(sessions: Vec<SessionScript>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn open(&self, _audio: AudioStream) -> Result<TranscriptStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .sessions
            .lock()
            .unwrap()
            .pop_front();

        match script {
            Some(SessionScript::OpenFails) => {
                Err(Error::Transcription("handshake rejected".to_string()))
            }
            Some(SessionScript::Responses(items)) => Ok(futures::stream::iter(items).boxed()),
            // Out of script: a session that stays open until dropped
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

/// Microphone stand-in that closes its buffer when dropped
pub struct FakeMicrophone {
    sender: CaptureSender,
    released: Arc<AtomicUsize>,
}

impl Drop for FakeMicrophone {
    fn drop(&mut self) {
        self.sender.close();
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Audio input handing out fake microphones
///
/// Clones share their counters, so a test can keep one handle while the
/// supervisor owns another.
#[derive(Clone, Default)]
pub struct FakeInput {
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl FakeInput {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl AudioInput for FakeInput {
    type Guard = FakeMicrophone;

    fn open(&self) -> Result<(FakeMicrophone, CaptureReceiver)> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = capture_buffer();
        sender.push(vec![0; 320]);
        Ok((
            FakeMicrophone {
                sender,
                released: Arc::clone(&self.released),
            },
            receiver,
        ))
    }
}

/// Probe that fails a fixed number of times before succeeding
///
/// Clones share their counters.
#[derive(Clone)]
pub struct FlakyProbe {
    failures_left: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

impl FlakyProbe {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: Arc::new(AtomicU32::new(times)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for FlakyProbe {
    async fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::Connectivity("connection refused".to_string()));
        }
        Ok(())
    }
}
