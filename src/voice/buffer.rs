//! Capture buffer bridging the audio callback to the transcription stream
//!
//! The producer side is called from the audio driver's callback thread and
//! never blocks. The consumer waits for at least one chunk, then drains
//! everything queued so far into a single batch so each network write
//! carries as much audio as is available.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Raw little-endian 16-bit mono PCM
pub type AudioChunk = Vec<u8>;

enum Frame {
    Audio(AudioChunk),
    Closed,
}

/// Create a connected producer/consumer pair
#[must_use]
pub fn capture_buffer() -> (CaptureSender, CaptureReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        CaptureSender {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        },
        CaptureReceiver {
            rx,
            finished: false,
        },
    )
}

/// Producer half, safe to move into a hardware callback
#[derive(Clone)]
pub struct CaptureSender {
    tx: mpsc::UnboundedSender<Frame>,
    closed: Arc<AtomicBool>,
}

impl CaptureSender {
    /// Enqueue a chunk; dropped silently once the buffer is closed
    pub fn push(&self, chunk: AudioChunk) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.tx.send(Frame::Audio(chunk));
    }

    /// Push the end-of-data sentinel; only the first call has any effect
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Frame::Closed);
        }
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Consumer half
pub struct CaptureReceiver {
    rx: mpsc::UnboundedReceiver<Frame>,
    finished: bool,
}

impl CaptureReceiver {
    /// Wait for audio and return every chunk queued so far, concatenated
    ///
    /// Returns `None` once the sentinel has been observed (or every sender
    /// is gone); all later calls return `None` as well. Chunks queued ahead
    /// of the sentinel are still delivered in the final batch.
    pub async fn next_batch(&mut self) -> Option<AudioChunk> {
        if self.finished {
            return None;
        }

        let mut batch = match self.rx.recv().await {
            Some(Frame::Audio(chunk)) => chunk,
            Some(Frame::Closed) | None => {
                self.finished = true;
                return None;
            }
        };

        loop {
            match self.rx.try_recv() {
                Ok(Frame::Audio(chunk)) => batch.extend_from_slice(&chunk),
                Ok(Frame::Closed) | Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        Some(batch)
    }

    /// Whether the terminal signal has been observed
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Turn the receiver into a stream of coalesced batches
    pub fn into_stream(self) -> impl Stream<Item = AudioChunk> + Send + 'static {
        futures::stream::unfold(self, |mut rx| async move {
            rx.next_batch().await.map(|batch| (batch, rx))
        })
    }
}
