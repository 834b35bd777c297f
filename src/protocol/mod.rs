//! Wire-level types for the realtime protocol: outbound client frames,
//! inbound server events, and the session configuration payload.

pub mod client_events;
pub mod config;
pub mod server_events;

pub use client_events::{ClientEvent, Item};
pub use config::{
    AudioFormat, InputAudioTranscription, SessionConfig, ToolSpec, TurnDetection, DEFAULT_MODEL,
    DEFAULT_VOICE,
};
pub use server_events::ServerEvent;
