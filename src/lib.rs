//! Cub - always-on voice question answering device
//!
//! Captures microphone audio, streams it to a speech recognizer, wakes up on
//! an activation phrase, looks spoken questions up in an answer service,
//! and speaks the reply. Status lights mirror what the device is doing.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────────┐   ┌──────────────────┐
//! │ Microphone │──▶│ Capture buffer │──▶│ Streaming STT    │
//! └────────────┘   └────────────────┘   └────────┬─────────┘
//!                                                │ transcripts
//!                                       ┌────────▼─────────┐
//!                         lights ◀──────│ Activation state │
//!                                       │ machine          │
//!                                       └───┬──────────┬───┘
//!                                  question │          │ reply
//!                                  ┌────────▼───┐  ┌───▼─────────┐
//!                                  │ Answer API │  │ TTS + play  │
//!                                  └────────────┘  └─────────────┘
//! ```
//!
//! The [`Supervisor`] restarts this pipeline whenever a session ends and
//! waits for network connectivity before each start.

pub mod activation;
pub mod answer;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod indicator;
pub mod supervisor;
pub mod voice;

pub use activation::{ActivationMachine, ActivationState, SessionEnd};
pub use answer::{AnswerClient, AnswerRecord, AnswerService};
pub use config::Config;
pub use connectivity::{ConnectivityProbe, HttpProbe, Watchdog};
pub use error::{Error, Result};
pub use indicator::{IndicatorPins, NoopIndicator, StatusIndicator, SysfsIndicator};
pub use supervisor::{SessionOutcome, Supervisor};
