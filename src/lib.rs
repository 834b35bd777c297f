#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Realtime speech-to-speech voice sessions over the `OpenAI` Realtime API.
//!
//! A [`VoiceEngine`] holds credentials, session configuration, and a
//! [`ToolRegistry`]; [`VoiceEngine::start`] opens a WebSocket, drives the
//! configuration handshake, and returns a [`RunningSession`] handle. Audio
//! moves through two callbacks: a producer the engine polls for microphone
//! data on a fixed cadence, and a consumer that receives the model's decoded
//! speech. Model-initiated tool calls are either answered automatically by
//! registered handlers or surfaced to the caller and answered later through
//! [`RunningSession::submit_tool_result`].
//!
//! ```no_run
//! use voicewire::{SessionCallbacks, VoiceEngine};
//!
//! # async fn run() -> voicewire::Result<()> {
//! let engine = VoiceEngine::builder()
//!     .api_key(std::env::var("OPENAI_API_KEY").unwrap_or_default())
//!     .instructions("You are a concise voice assistant.")
//!     .build()?;
//!
//! let callbacks = SessionCallbacks::new()
//!     .audio_consumer(|pcm, is_final| {
//!         if !is_final {
//!             // hand `pcm` to the playback device
//!             let _ = pcm;
//!         }
//!     });
//!
//! let session = engine.start(callbacks).await?;
//! // ... later
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod transport;

pub use engine::{
    RunningSession, SessionCallbacks, ToolInvocation, ToolRegistry, VoiceEngine,
    VoiceEngineBuilder,
};
pub use error::{Error, RemoteError, Result};
pub use protocol::{
    AudioFormat, ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig, ToolSpec,
    TurnDetection,
};
pub use transport::rest::AudioRestClient;
