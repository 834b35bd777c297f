use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::RemoteError;

/// An inbound wire event, translated to the fields the engine needs.
///
/// The tag space is open-ended: anything the repr enum does not recognize
/// (new tags, or a known tag missing a required field) deserializes to
/// `Unknown` instead of failing, so a protocol revision never kills a
/// running session.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    SessionCreated,
    SessionUpdated,
    ResponseCreated,
    ResponseDone,
    /// Base64-encoded audio chunk. Both the beta `response.audio.delta` and
    /// the GA `response.output_audio.delta` tags map here.
    ResponseAudioDelta {
        delta: String,
    },
    ResponseAudioDone,
    ResponseAudioTranscriptDelta {
        delta: String,
    },
    ResponseFunctionCallArgumentsDone {
        call_id: String,
        name: String,
        arguments: String,
    },
    InputAudioBufferSpeechStarted {
        audio_start_ms: Option<u32>,
    },
    InputAudioBufferSpeechStopped {
        audio_end_ms: Option<u32>,
    },
    Error {
        error: RemoteError,
    },
    Unknown(Value),
}

impl ServerEvent {
    /// The wire `type` tag, if present.
    #[must_use]
    pub fn type_tag(&self) -> Option<&str> {
        match self {
            Self::SessionCreated => Some("session.created"),
            Self::SessionUpdated => Some("session.updated"),
            Self::ResponseCreated => Some("response.created"),
            Self::ResponseDone => Some("response.done"),
            Self::ResponseAudioDelta { .. } => Some("response.audio.delta"),
            Self::ResponseAudioDone => Some("response.audio.done"),
            Self::ResponseAudioTranscriptDelta { .. } => Some("response.audio_transcript.delta"),
            Self::ResponseFunctionCallArgumentsDone { .. } => {
                Some("response.function_call_arguments.done")
            }
            Self::InputAudioBufferSpeechStarted { .. } => {
                Some("input_audio_buffer.speech_started")
            }
            Self::InputAudioBufferSpeechStopped { .. } => {
                Some("input_audio_buffer.speech_stopped")
            }
            Self::Error { .. } => Some("error"),
            Self::Unknown(value) => value.get("type").and_then(Value::as_str),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "response.created")]
    ResponseCreated,
    #[serde(rename = "response.done")]
    ResponseDone,
    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    ResponseAudioDelta { delta: String },
    #[serde(rename = "response.audio.done", alias = "response.output_audio.done")]
    ResponseAudioDone,
    #[serde(
        rename = "response.audio_transcript.delta",
        alias = "response.output_audio_transcript.delta"
    )]
    ResponseAudioTranscriptDelta { delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted { audio_start_ms: Option<u32> },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped { audio_end_ms: Option<u32> },
    #[serde(rename = "error")]
    Error { error: RemoteError },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::SessionCreated => Self::SessionCreated,
            ServerEventRepr::SessionUpdated => Self::SessionUpdated,
            ServerEventRepr::ResponseCreated => Self::ResponseCreated,
            ServerEventRepr::ResponseDone => Self::ResponseDone,
            ServerEventRepr::ResponseAudioDelta { delta } => Self::ResponseAudioDelta { delta },
            ServerEventRepr::ResponseAudioDone => Self::ResponseAudioDone,
            ServerEventRepr::ResponseAudioTranscriptDelta { delta } => {
                Self::ResponseAudioTranscriptDelta { delta }
            }
            ServerEventRepr::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => Self::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            },
            ServerEventRepr::InputAudioBufferSpeechStarted { audio_start_ms } => {
                Self::InputAudioBufferSpeechStarted { audio_start_ms }
            }
            ServerEventRepr::InputAudioBufferSpeechStopped { audio_end_ms } => {
                Self::InputAudioBufferSpeechStopped { audio_end_ms }
            }
            ServerEventRepr::Error { error } => Self::Error { error },
        }
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("unrecognized server event: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl Serialize for ServerEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown(value) => value.serialize(serializer),
            Self::SessionCreated => ServerEventRepr::SessionCreated.serialize(serializer),
            Self::SessionUpdated => ServerEventRepr::SessionUpdated.serialize(serializer),
            Self::ResponseCreated => ServerEventRepr::ResponseCreated.serialize(serializer),
            Self::ResponseDone => ServerEventRepr::ResponseDone.serialize(serializer),
            Self::ResponseAudioDelta { delta } => ServerEventRepr::ResponseAudioDelta {
                delta: delta.clone(),
            }
            .serialize(serializer),
            Self::ResponseAudioDone => ServerEventRepr::ResponseAudioDone.serialize(serializer),
            Self::ResponseAudioTranscriptDelta { delta } => {
                ServerEventRepr::ResponseAudioTranscriptDelta {
                    delta: delta.clone(),
                }
                .serialize(serializer)
            }
            Self::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => ServerEventRepr::ResponseFunctionCallArgumentsDone {
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            }
            .serialize(serializer),
            Self::InputAudioBufferSpeechStarted { audio_start_ms } => {
                ServerEventRepr::InputAudioBufferSpeechStarted {
                    audio_start_ms: *audio_start_ms,
                }
                .serialize(serializer)
            }
            Self::InputAudioBufferSpeechStopped { audio_end_ms } => {
                ServerEventRepr::InputAudioBufferSpeechStopped {
                    audio_end_ms: *audio_end_ms,
                }
                .serialize(serializer)
            }
            Self::Error { error } => ServerEventRepr::Error {
                error: error.clone(),
            }
            .serialize(serializer),
        }
    }
}
