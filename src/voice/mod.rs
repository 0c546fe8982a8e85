//! Voice processing module
//!
//! Handles audio capture, streaming transcription, synthesis, and playback.

mod buffer;
mod capture;
mod playback;
mod speaker;
mod stt;
mod tts;

pub use buffer::{AudioChunk, CaptureReceiver, CaptureSender, capture_buffer};
pub use capture::{AudioInput, CpalInput, Microphone, samples_to_pcm16};
pub use playback::{AudioPlayback, Player, read_wav};
pub use speaker::{Speaker, SpeechOutput};
pub use stt::{
    Alternative, AudioStream, DeepgramStreaming, RecognitionResponse, RecognitionResult,
    TranscriptEvent, TranscriptStream, Transcriber,
};
pub use tts::{GoogleTts, Synthesizer, decode_audio_content};
