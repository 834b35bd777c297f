//! The public facade: a configured [`VoiceEngine`] opens sessions, and each
//! [`RunningSession`] is a thin handle over the pump task's command channel.
//! The socket and the state machine live inside the pump; the handle never
//! touches either directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::engine::handlers::SessionCallbacks;
use crate::engine::pump::{Command, Pump};
use crate::engine::tools::ToolRegistry;
use crate::protocol::{
    AudioFormat, InputAudioTranscription, SessionConfig, TurnDetection, DEFAULT_MODEL,
};
use crate::transport::ws::{self, WsTransport, DEFAULT_REALTIME_ENDPOINT};
use crate::transport::Transport;
use crate::{Error, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// An immutable session recipe: credentials, model selection, the session
/// configuration sent after `session.created`, and the tool registry.
/// One engine can open any number of sessions over its lifetime.
pub struct VoiceEngine {
    api_key: String,
    model: String,
    endpoint: String,
    connect_timeout: Duration,
    session: SessionConfig,
    tools: Arc<ToolRegistry>,
    engaged: Arc<AtomicBool>,
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl VoiceEngine {
    #[must_use]
    pub fn builder() -> VoiceEngineBuilder {
        VoiceEngineBuilder::new()
    }

    /// Open the WebSocket, spawn the pump task, and return a handle to the
    /// running session. The `on_connected` callback fires later, once the
    /// server acknowledges the session configuration.
    ///
    /// At most one session per engine at a time: a second `start` fails
    /// until the previous session has fully shut down.
    ///
    /// # Errors
    /// Returns an error if a session is already running, or if the
    /// connection attempt fails or times out.
    pub async fn start(&self, callbacks: SessionCallbacks) -> Result<RunningSession> {
        if self.engaged.swap(true, Ordering::Acquire) {
            return Err(Error::Configuration(
                "a session is already active".to_string(),
            ));
        }
        let stream = match ws::connect(
            &self.endpoint,
            &self.api_key,
            &self.model,
            self.connect_timeout,
        )
        .await
        {
            Ok(stream) => stream,
            Err(err) => {
                self.engaged.store(false, Ordering::Release);
                return Err(err);
            }
        };
        let transport = Box::new(WsTransport::new(stream));
        Ok(self.spawn_pump(transport, callbacks))
    }

    fn spawn_pump(
        &self,
        transport: Box<dyn Transport>,
        callbacks: SessionCallbacks,
    ) -> RunningSession {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let active = Arc::new(AtomicBool::new(false));
        let pump = Pump::new(
            transport,
            self.session.clone(),
            callbacks,
            Arc::clone(&self.tools),
            cmd_rx,
            cmd_tx.downgrade(),
            Arc::clone(&active),
            Arc::clone(&self.engaged),
        );
        tokio::spawn(pump.run());
        RunningSession { cmd_tx, active }
    }
}

/// Handle to a live session. Cloning is deliberately not offered; the owner
/// decides when the session ends.
pub struct RunningSession {
    cmd_tx: mpsc::Sender<Command>,
    active: Arc<AtomicBool>,
}

impl RunningSession {
    /// True from the server's configuration acknowledgment until teardown.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Answer a tool call previously surfaced through the tool-call
    /// callback. Each call id is accepted exactly once.
    ///
    /// # Errors
    /// Returns an error if the call id is unknown or already answered, if
    /// the send fails, or if the session has ended.
    pub async fn submit_tool_result(
        &self,
        call_id: impl Into<String>,
        output: impl Into<String>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SubmitToolResult {
                call_id: call_id.into(),
                output: output.into(),
                respond: tx,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Tear the session down and wait for the pump to finish. Safe to call
    /// more than once; only the first call does any work, and the
    /// disconnected callback has already fired by the time this returns.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Stop { respond: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

pub struct VoiceEngineBuilder {
    api_key: Option<String>,
    model: String,
    endpoint: String,
    connect_timeout: Duration,
    session: SessionConfig,
    tools: ToolRegistry,
}

impl VoiceEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_REALTIME_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session: SessionConfig::default(),
            tools: ToolRegistry::new(),
        }
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.session.instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.session.voice = voice.into();
        self
    }

    #[must_use]
    pub fn input_audio_format(mut self, format: AudioFormat) -> Self {
        self.session.input_audio_format = format;
        self
    }

    #[must_use]
    pub fn output_audio_format(mut self, format: AudioFormat) -> Self {
        self.session.output_audio_format = format;
        self
    }

    #[must_use]
    pub fn transcription_model(mut self, model: impl Into<String>) -> Self {
        self.session.input_audio_transcription = Some(InputAudioTranscription {
            model: model.into(),
        });
        self
    }

    #[must_use]
    pub fn no_transcription(mut self) -> Self {
        self.session.input_audio_transcription = None;
        self
    }

    #[must_use]
    pub fn turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        self.session.turn_detection = Some(turn_detection);
        self
    }

    /// Disable server-side voice-activity detection. The resulting session
    /// never sees speech markers and the model only responds when a
    /// response is requested explicitly.
    #[must_use]
    pub fn no_turn_detection(mut self) -> Self {
        self.session.turn_detection = None;
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.session.temperature = temperature;
        self
    }

    #[must_use]
    pub fn max_response_output_tokens(mut self, max: u32) -> Self {
        self.session.max_response_output_tokens = max;
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// # Errors
    /// Returns an error if no API key was provided or a tool's parameter
    /// schema fails to serialize.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<VoiceEngine> {
        let api_key = self
            .api_key
            .ok_or_else(|| Error::Configuration("api_key is required".to_string()))?;

        let mut session = self.session;
        session.tools = self.tools.try_as_specs()?;

        Ok(VoiceEngine {
            api_key,
            model: self.model,
            endpoint: self.endpoint,
            connect_timeout: self.connect_timeout,
            session,
            tools: Arc::new(self.tools),
            engaged: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Default for VoiceEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde::Deserialize;
    use schemars::JsonSchema;

    use super::*;
    use crate::engine::bridge::ToolInvocation;
    use crate::framing;
    use crate::protocol::{ClientEvent, Item, ServerEvent};
    use crate::transport::Transport;

    struct MockTransport {
        incoming: mpsc::UnboundedReceiver<ServerEvent>,
        sent: mpsc::UnboundedSender<ClientEvent>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, event: ClientEvent) -> Result<()> {
            self.sent.send(event).map_err(|_| Error::ConnectionClosed)
        }

        async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
            Ok(self.incoming.recv().await)
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    struct Harness {
        server_tx: mpsc::UnboundedSender<ServerEvent>,
        sent_rx: mpsc::UnboundedReceiver<ClientEvent>,
        closed: Arc<AtomicBool>,
    }

    fn spawn_session(
        builder: VoiceEngineBuilder,
        callbacks: SessionCallbacks,
    ) -> (RunningSession, Harness) {
        let engine = builder.api_key("test-key").build().unwrap();
        let (server_tx, incoming) = mpsc::unbounded_channel();
        let (sent, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Box::new(MockTransport {
            incoming,
            sent,
            closed: Arc::clone(&closed),
        });
        let session = engine.spawn_pump(transport, callbacks);
        (
            session,
            Harness {
                server_tx,
                sent_rx,
                closed,
            },
        )
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached in time");
    }

    /// Drives the handshake and waits for activation.
    async fn activate(session: &RunningSession, harness: &mut Harness) -> ClientEvent {
        harness.server_tx.send(ServerEvent::SessionCreated).unwrap();
        let config_frame = harness.sent_rx.recv().await.unwrap();
        harness.server_tx.send(ServerEvent::SessionUpdated).unwrap();
        wait_until(|| session.is_active()).await;
        config_frame
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_sends_config_then_fires_connected_once() {
        let connected = Arc::new(AtomicUsize::new(0));
        let connected_cb = Arc::clone(&connected);
        let callbacks = SessionCallbacks::new().on_connected(move || {
            connected_cb.fetch_add(1, Ordering::SeqCst);
        });

        let builder = VoiceEngine::builder().voice("shimmer").instructions("Be brief.");
        let (session, mut harness) = spawn_session(builder, callbacks);
        assert!(!session.is_active());

        let config_frame = activate(&session, &mut harness).await;
        let ClientEvent::SessionUpdate { session: config, .. } = config_frame else {
            panic!("expected session.update first, got {config_frame:?}");
        };
        assert_eq!(config.voice, "shimmer");
        assert_eq!(config.instructions, "Be brief.");
        assert_eq!(connected.load(Ordering::SeqCst), 1);

        // A repeated acknowledgment must not re-fire the callback.
        harness.server_tx.send(ServerEvent::SessionUpdated).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn audio_flows_only_while_model_is_quiet() {
        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel();
        let callbacks = SessionCallbacks::new()
            .audio_producer(|max| vec![0u8; max])
            .audio_consumer(move |chunk, is_final| {
                audio_tx.send((chunk.to_vec(), is_final)).unwrap();
            });

        let (session, mut harness) = spawn_session(VoiceEngine::builder(), callbacks);
        activate(&session, &mut harness).await;

        let frame = harness.sent_rx.recv().await.unwrap();
        let ClientEvent::InputAudioBufferAppend { audio, .. } = frame else {
            panic!("expected an audio append, got {frame:?}");
        };
        assert_eq!(framing::decode(&audio).len(), 1536);

        // Model starts a turn; uplink must stop.
        harness.server_tx.send(ServerEvent::ResponseCreated).unwrap();
        harness
            .server_tx
            .send(ServerEvent::ResponseAudioDelta {
                delta: framing::encode(&[1, 2, 3, 4]),
            })
            .unwrap();
        let (chunk, is_final) = audio_rx.recv().await.unwrap();
        assert_eq!(chunk, vec![1, 2, 3, 4]);
        assert!(!is_final);

        // Appends queued before the turn started may still be buffered.
        while harness.sent_rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.sent_rx.try_recv().is_err(), "uplink leaked while model speaking");

        // Turn ends: final marker fires and the uplink resumes.
        harness.server_tx.send(ServerEvent::ResponseDone).unwrap();
        let (chunk, is_final) = audio_rx.recv().await.unwrap();
        assert!(chunk.is_empty());
        assert!(is_final);
        let frame = harness.sent_rx.recv().await.unwrap();
        assert!(matches!(frame, ClientEvent::InputAudioBufferAppend { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_result_is_accepted_exactly_once() {
        let (call_tx, mut call_rx) = mpsc::unbounded_channel();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        let mut tools = ToolRegistry::new();
        tools.declare("lookup", "Look something up", serde_json::json!({"type": "object"}));
        let callbacks = SessionCallbacks::new()
            .on_tool_call(move |call: ToolInvocation| {
                call_tx.send(call).unwrap();
            })
            .on_error(move |err| {
                err_tx.send(err).unwrap();
            });

        let builder = VoiceEngine::builder().tools(tools);
        let (session, mut harness) = spawn_session(builder, callbacks);
        activate(&session, &mut harness).await;

        harness
            .server_tx
            .send(ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id: "call_1".to_string(),
                name: "lookup".to_string(),
                arguments: r#"{"q":"rust"}"#.to_string(),
            })
            .unwrap();
        let call = call_rx.recv().await.unwrap();
        assert_eq!(call.call_id, "call_1");
        assert_eq!(call.name, "lookup");

        // A replayed call id is rejected while the original is pending.
        harness
            .server_tx
            .send(ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id: "call_1".to_string(),
                name: "lookup".to_string(),
                arguments: "{}".to_string(),
            })
            .unwrap();
        assert!(matches!(err_rx.recv().await.unwrap(), Error::ToolBridge(_)));

        session.submit_tool_result("call_1", r#"{"answer":42}"#).await.unwrap();
        let frame = harness.sent_rx.recv().await.unwrap();
        let ClientEvent::ConversationItemCreate { item, .. } = frame else {
            panic!("expected function_call_output, got {frame:?}");
        };
        let Item::FunctionCallOutput { call_id, output } = *item;
        assert_eq!(call_id, "call_1");
        assert_eq!(output, r#"{"answer":42}"#);
        let frame = harness.sent_rx.recv().await.unwrap();
        assert!(matches!(frame, ClientEvent::ResponseCreate { .. }));

        // Second submission for the same id and an unknown id both fail.
        assert!(matches!(
            session.submit_tool_result("call_1", "{}").await,
            Err(Error::ToolBridge(_))
        ));
        assert!(matches!(
            session.submit_tool_result("call_9", "{}").await,
            Err(Error::ToolBridge(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn registered_handler_answers_tool_call_automatically() {
        #[derive(Deserialize, JsonSchema)]
        struct AddArgs {
            a: i64,
            b: i64,
        }

        let mut tools = ToolRegistry::new();
        tools.tool("add", |args: AddArgs| async move { Ok(args.a + args.b) });

        let builder = VoiceEngine::builder().tools(tools);
        let (session, mut harness) = spawn_session(builder, SessionCallbacks::new());
        activate(&session, &mut harness).await;

        harness
            .server_tx
            .send(ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id: "call_add".to_string(),
                name: "add".to_string(),
                arguments: r#"{"a":19,"b":23}"#.to_string(),
            })
            .unwrap();

        let frame = harness.sent_rx.recv().await.unwrap();
        let ClientEvent::ConversationItemCreate { item, .. } = frame else {
            panic!("expected function_call_output, got {frame:?}");
        };
        let Item::FunctionCallOutput { call_id, output } = *item;
        assert_eq!(call_id, "call_add");
        assert_eq!(output, "42");
        let frame = harness.sent_rx.recv().await.unwrap();
        assert!(matches!(frame, ClientEvent::ResponseCreate { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_reports_disconnect_once() {
        let disconnects = Arc::new(Mutex::new(Vec::new()));
        let disconnects_cb = Arc::clone(&disconnects);
        let callbacks = SessionCallbacks::new().on_disconnected(move |reason| {
            disconnects_cb.lock().unwrap().push(reason.to_string());
        });

        let (session, mut harness) = spawn_session(VoiceEngine::builder(), callbacks);
        activate(&session, &mut harness).await;

        session.stop().await;
        assert!(!session.is_active());
        assert!(harness.closed.load(Ordering::Acquire));
        session.stop().await;

        let reasons = disconnects.lock().unwrap();
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0], "stop requested");
    }

    #[tokio::test(start_paused = true)]
    async fn server_close_reports_disconnect() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let disconnects_cb = Arc::clone(&disconnects);
        let callbacks = SessionCallbacks::new().on_disconnected(move |_| {
            disconnects_cb.fetch_add(1, Ordering::SeqCst);
        });

        let (session, mut harness) = spawn_session(VoiceEngine::builder(), callbacks);
        activate(&session, &mut harness).await;

        // Dropping the server side ends the event stream.
        let Harness { server_tx, .. } = harness;
        drop(server_tx);
        wait_until(|| !session.is_active()).await;
        wait_until(|| disconnects.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn speech_markers_reach_callbacks() {
        let (marker_tx, mut marker_rx) = mpsc::unbounded_channel();
        let started_tx = marker_tx.clone();
        let callbacks = SessionCallbacks::new()
            .on_speech_started(move |at| {
                started_tx.send(("started", at)).unwrap();
            })
            .on_speech_stopped(move |at| {
                marker_tx.send(("stopped", at)).unwrap();
            });

        let (session, mut harness) = spawn_session(VoiceEngine::builder(), callbacks);
        activate(&session, &mut harness).await;

        harness
            .server_tx
            .send(ServerEvent::InputAudioBufferSpeechStarted {
                audio_start_ms: Some(120),
            })
            .unwrap();
        harness
            .server_tx
            .send(ServerEvent::InputAudioBufferSpeechStopped {
                audio_end_ms: Some(940),
            })
            .unwrap();

        assert_eq!(marker_rx.recv().await.unwrap(), ("started", Some(120)));
        assert_eq!(marker_rx.recv().await.unwrap(), ("stopped", Some(940)));
    }

    #[test]
    fn builder_requires_api_key() {
        let result = VoiceEngine::builder().build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn builder_embeds_tool_specs_in_session_config() {
        let mut tools = ToolRegistry::new();
        tools.declare(
            "get_weather",
            "Current weather",
            serde_json::json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        );
        let engine = VoiceEngine::builder()
            .api_key("k")
            .tools(tools)
            .build()
            .unwrap();
        assert_eq!(engine.session.tools.len(), 1);
        assert_eq!(engine.session.tools[0].name, "get_weather");
    }
}
