//! Spoken responses: synthesize, play, then hold off
//!
//! Audio keeps streaming to the recognizer while a response plays, so the
//! device hears itself; the activation machine discards transcripts that
//! arrive before `speak` returns. The cooldown after playback stretches
//! that window over the tail of the reply and the recognizer's latency.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;

use super::playback::Player;
use super::tts::Synthesizer;
use crate::Result;

/// Say something out loud
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, returning after playback and cooldown
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Synthesizer + player with a post-playback cooldown
pub struct Speaker<S, P> {
    synthesizer: S,
    player: P,
    cooldown: Duration,
}

impl<S: Synthesizer, P: Player> Speaker<S, P> {
    pub const fn new(synthesizer: S, player: P, cooldown: Duration) -> Self {
        Self {
            synthesizer,
            player,
            cooldown,
        }
    }
}

#[async_trait]
impl<S: Synthesizer, P: Player> SpeechOutput for Speaker<S, P> {
    async fn speak(&self, text: &str) -> Result<()> {
        tracing::debug!(text, "speaking");
        let audio = self.synthesizer.synthesize(text).await?;

        let mut file = tempfile::Builder::new()
            .prefix("cub-response-")
            .suffix(".wav")
            .tempfile()?;
        file.write_all(&audio)?;
        file.flush()?;
        tracing::trace!(path = %file.path().display(), bytes = audio.len(), "response audio written");

        self.player.play(file.path()).await?;
        drop(file);

        tokio::time::sleep(self.cooldown).await;
        Ok(())
    }
}
