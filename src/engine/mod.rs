//! The session engine: state machine, audio pump, tool-call bridge, and the
//! public facade that ties them to a transport.

mod bridge;
mod handlers;
mod pump;
mod session;
mod state;
mod tools;

pub use bridge::{ToolBridge, ToolInvocation};
pub use handlers::{
    AudioConsumer, AudioProducer, ConnectedHandler, DisconnectedHandler, ErrorHandler,
    SessionCallbacks, SpeechMarkerHandler, ToolCallHandler, TranscriptHandler,
};
pub use session::{RunningSession, VoiceEngine, VoiceEngineBuilder};
pub use state::{SessionPhase, SessionStateMachine};
pub use tools::{BoxFuture, ToolDefinition, ToolRegistry};
