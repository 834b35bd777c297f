//! The callback surface the embedding application hands to `start`.
//!
//! Every callback runs on the pump task and must return quickly: slow work
//! belongs in the caller's own async machinery, with the answer fed back
//! through `submit_tool_result`.

use crate::engine::bridge::ToolInvocation;
use crate::Error;

/// Pulls up to `max_bytes` of ready PCM from the capture side. Must not
/// block; returning an empty buffer means "no data yet", not starvation.
pub type AudioProducer = Box<dyn FnMut(usize) -> Vec<u8> + Send>;

/// Receives decoded PCM chunks. `is_final` marks the end-of-response signal
/// (with an empty chunk), fired exactly once per turn.
pub type AudioConsumer = Box<dyn FnMut(&[u8], bool) + Send>;

pub type ConnectedHandler = Box<dyn FnMut() + Send>;
pub type DisconnectedHandler = Box<dyn FnMut(&str) + Send>;
pub type ToolCallHandler = Box<dyn FnMut(ToolInvocation) + Send>;
pub type ErrorHandler = Box<dyn FnMut(Error) + Send>;
pub type SpeechMarkerHandler = Box<dyn FnMut(Option<u32>) + Send>;
pub type TranscriptHandler = Box<dyn FnMut(&str) + Send>;

#[derive(Default)]
pub struct SessionCallbacks {
    pub audio_producer: Option<AudioProducer>,
    pub audio_consumer: Option<AudioConsumer>,
    pub on_connected: Option<ConnectedHandler>,
    pub on_disconnected: Option<DisconnectedHandler>,
    pub on_tool_call: Option<ToolCallHandler>,
    pub on_error: Option<ErrorHandler>,
    pub on_speech_started: Option<SpeechMarkerHandler>,
    pub on_speech_stopped: Option<SpeechMarkerHandler>,
    pub on_transcript: Option<TranscriptHandler>,
}

impl SessionCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn audio_producer<F>(mut self, f: F) -> Self
    where
        F: FnMut(usize) -> Vec<u8> + Send + 'static,
    {
        self.audio_producer = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn audio_consumer<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8], bool) + Send + 'static,
    {
        self.audio_consumer = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_connected = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_disconnected<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_disconnected = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_tool_call<F>(mut self, f: F) -> Self
    where
        F: FnMut(ToolInvocation) + Send + 'static,
    {
        self.on_tool_call = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_speech_started<F>(mut self, f: F) -> Self
    where
        F: FnMut(Option<u32>) + Send + 'static,
    {
        self.on_speech_started = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_speech_stopped<F>(mut self, f: F) -> Self
    where
        F: FnMut(Option<u32>) + Send + 'static,
    {
        self.on_speech_stopped = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_transcript<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_transcript = Some(Box::new(f));
        self
    }
}
