//! Supervisor - the device's outer loop
//!
//! Each iteration resets the lights, waits for the network, opens a fresh
//! microphone and recognition session, and runs the activation state
//! machine until the session ends. Whatever ends a session, the next one
//! starts right away; faults reset the lights before retrying.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::activation::{ActivationMachine, SessionEnd, TranscriptDisplay};
use crate::answer::AnswerService;
use crate::connectivity::{ConnectivityProbe, Watchdog};
use crate::indicator::StatusIndicator;
use crate::voice::{AudioInput, SpeechOutput, Transcriber};
use crate::{Error, Result};

/// Pause before the first restart after a fault
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Longest pause between restarts while faults keep repeating
pub const MAX_RESTART_DELAY: Duration = Duration::from_secs(30);

/// How a single session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Ended normally (duration cap, exit phrase, or stream close)
    Completed(SessionEnd),
    /// Ended by an unhandled fault
    Faulted(Error),
}

/// Owns the device's collaborators and runs sessions forever
pub struct Supervisor<I, P> {
    input: I,
    watchdog: Watchdog<P>,
    transcriber: Arc<dyn Transcriber>,
    answers: Arc<dyn AnswerService>,
    speech: Arc<dyn SpeechOutput>,
    indicator: Arc<dyn StatusIndicator>,
    activation_phrase: String,
    echo_transcripts: bool,
    restart_delay: Duration,
}

impl<I: AudioInput, P: ConnectivityProbe> Supervisor<I, P> {
    pub fn new(
        input: I,
        watchdog: Watchdog<P>,
        transcriber: Arc<dyn Transcriber>,
        answers: Arc<dyn AnswerService>,
        speech: Arc<dyn SpeechOutput>,
        indicator: Arc<dyn StatusIndicator>,
        activation_phrase: impl Into<String>,
    ) -> Self {
        Self {
            input,
            watchdog,
            transcriber,
            answers,
            speech,
            indicator,
            activation_phrase: activation_phrase.into(),
            echo_transcripts: true,
            restart_delay: RESTART_DELAY,
        }
    }

    /// Override the pause before restarting a faulted session
    ///
    /// The pause doubles with each consecutive fault, up to
    /// [`MAX_RESTART_DELAY`].
    #[must_use]
    pub const fn with_restart_delay(mut self, restart_delay: Duration) -> Self {
        self.restart_delay = restart_delay;
        self
    }

    /// Disable the live console transcript
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.echo_transcripts = false;
        self
    }

    /// Run sessions until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the signal handler cannot be installed
    #[allow(clippy::future_not_send)]
    pub async fn run(&self) -> Result<()> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(shutdown).await;
        Ok(())
    }

    /// Run sessions until `shutdown` completes
    ///
    /// The in-flight session is dropped on shutdown, which releases the
    /// microphone; the lights are reset on the way out. Restarts after a
    /// fault are delayed, and the delay grows while faults repeat.
    #[allow(clippy::future_not_send)]
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut sessions = 0u64;
        let mut backoff = self.restart_delay;

        loop {
            let outcome = tokio::select! {
                () = &mut shutdown => break,
                outcome = self.run_once() => outcome,
            };
            sessions += 1;

            match outcome {
                SessionOutcome::Completed(end) => {
                    backoff = self.restart_delay;
                    tracing::debug!(sessions, ?end, "restarting session");
                    // Sessions that end without suspending must not starve shutdown
                    tokio::task::yield_now().await;
                }
                SessionOutcome::Faulted(_) => {
                    tracing::debug!(sessions, ?backoff, "waiting before restart");
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_RESTART_DELAY.max(self.restart_delay));
                }
            }
        }

        tracing::info!(sessions, "shutdown requested");
        self.indicator.reset();
    }

    /// Run one supervised session from a clean slate
    #[allow(clippy::future_not_send)]
    pub async fn run_once(&self) -> SessionOutcome {
        self.indicator.reset();

        match self.session().await {
            Ok(end) => {
                match end {
                    SessionEnd::LimitReached => {
                        tracing::debug!("session reached its duration limit");
                    }
                    SessionEnd::ExitRequested => tracing::info!("session ended by exit phrase"),
                    SessionEnd::StreamClosed => tracing::info!("recognizer closed the session"),
                }
                SessionOutcome::Completed(end)
            }
            Err(e) => {
                tracing::error!(error = %e, "session faulted, restarting");
                self.indicator.reset();
                SessionOutcome::Faulted(e)
            }
        }
    }

    #[allow(clippy::future_not_send)]
    async fn session(&self) -> Result<SessionEnd> {
        self.watchdog.wait_for_connectivity().await;

        // Held until this function returns; dropping it closes the buffer
        let (_microphone, audio) = self.input.open()?;
        let transcripts = self.transcriber.open(audio.into_stream().boxed()).await?;

        self.indicator.idle_listening();
        tracing::info!(phrase = %self.activation_phrase, "listening for activation phrase");

        let mut machine = ActivationMachine::new(
            &self.activation_phrase,
            Arc::clone(&self.indicator),
            Arc::clone(&self.answers),
            Arc::clone(&self.speech),
        );
        if !self.echo_transcripts {
            machine = machine.with_display(TranscriptDisplay::new(Box::new(std::io::sink())));
        }

        machine.run(transcripts).await
    }
}
