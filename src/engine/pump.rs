//! The duplex audio pump: one long-lived task per session that owns the
//! transport and the state machine, drains inbound events, and feeds
//! outbound audio at a fixed cadence.
//!
//! Nothing in the loop blocks indefinitely: the inbound drain, the command
//! channel, and the audio tick race in a `select!`, and the tick keeps the
//! real-time deadline regardless of network traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::bridge::{ToolBridge, ToolInvocation};
use crate::engine::handlers::SessionCallbacks;
use crate::engine::state::{SessionPhase, SessionStateMachine};
use crate::engine::tools::ToolRegistry;
use crate::framing;
use crate::protocol::{ClientEvent, Item, ServerEvent, SessionConfig};
use crate::transport::Transport;
use crate::{Error, Result};

/// One producer pull per tick; 1536 bytes is 32 ms of PCM16 mono at 24 kHz,
/// comfortably inside the real-time budget.
pub(crate) const AUDIO_CHUNK_BYTES: usize = 1536;

const TICK_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) enum Command {
    SubmitToolResult {
        call_id: String,
        output: String,
        respond: oneshot::Sender<Result<()>>,
    },
    Stop {
        respond: oneshot::Sender<()>,
    },
}

pub(crate) struct Pump {
    transport: Box<dyn Transport>,
    session: SessionConfig,
    callbacks: SessionCallbacks,
    tools: Arc<ToolRegistry>,
    cmd_rx: mpsc::Receiver<Command>,
    /// Weak so an engine drop still closes the command channel while
    /// spawned tool dispatches are in flight.
    feedback: mpsc::WeakSender<Command>,
    active: Arc<AtomicBool>,
    /// Engine-level slot; released only when this task retires so a new
    /// `start` cannot race a session that is still winding down.
    engaged: Arc<AtomicBool>,
    state: SessionStateMachine,
    bridge: ToolBridge,
    audio_bytes_in: u64,
    audio_bytes_out: u64,
}

impl Pump {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        session: SessionConfig,
        callbacks: SessionCallbacks,
        tools: Arc<ToolRegistry>,
        cmd_rx: mpsc::Receiver<Command>,
        feedback: mpsc::WeakSender<Command>,
        active: Arc<AtomicBool>,
        engaged: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            session,
            callbacks,
            tools,
            cmd_rx,
            feedback,
            active,
            engaged,
            state: SessionStateMachine::new(),
            bridge: ToolBridge::new(),
            audio_bytes_in: 0,
            audio_bytes_out: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        // The facade already opened the socket before spawning us.
        self.state.on_start();
        self.state.on_connected();

        let mut tick = interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stop_ack: Option<oneshot::Sender<()>> = None;
        let reason = loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::SubmitToolResult { call_id, output, respond }) => {
                        let result = self.deliver_tool_result(&call_id, output).await;
                        let fatal = matches!(
                            &result,
                            Err(Error::WebSocket(_) | Error::Io(_) | Error::ConnectionClosed)
                        );
                        let _ = respond.send(result);
                        if fatal {
                            break "transport error".to_string();
                        }
                    }
                    Some(Command::Stop { respond }) => {
                        stop_ack = Some(respond);
                        break "stop requested".to_string();
                    }
                    None => break "engine dropped".to_string(),
                },
                event = self.transport.next_event() => match event {
                    Ok(Some(event)) => {
                        if let Err(reason) = self.handle_event(event).await {
                            break reason;
                        }
                    }
                    Ok(None) => break "connection closed by server".to_string(),
                    Err(err) => break format!("transport error: {err}"),
                },
                _ = tick.tick() => {
                    if let Err(reason) = self.pump_audio().await {
                        break reason;
                    }
                }
            }
        };

        self.shutdown(&reason, stop_ack).await;
    }

    async fn handle_event(&mut self, event: ServerEvent) -> std::result::Result<(), String> {
        match event {
            ServerEvent::SessionCreated => {
                if self.state.on_session_created() && self.state.can_send_session_config() {
                    let frame = ClientEvent::SessionUpdate {
                        event_id: None,
                        session: Box::new(self.session.clone()),
                    };
                    self.send(frame).await?;
                }
            }
            ServerEvent::SessionUpdated => {
                if self.state.on_session_updated() {
                    self.active.store(true, Ordering::Release);
                    if let Some(cb) = self.callbacks.on_connected.as_mut() {
                        cb();
                    }
                }
            }
            ServerEvent::ResponseCreated => {
                self.state.on_response_created();
            }
            ServerEvent::ResponseDone => {
                if self.state.on_response_done() {
                    if let Some(cb) = self.callbacks.audio_consumer.as_mut() {
                        cb(&[], true);
                    }
                }
            }
            ServerEvent::ResponseAudioDelta { delta } => {
                if self.state.phase() == SessionPhase::Active {
                    let pcm = framing::decode(&delta);
                    self.audio_bytes_in += pcm.len() as u64;
                    if let Some(cb) = self.callbacks.audio_consumer.as_mut() {
                        cb(&pcm, false);
                    }
                } else {
                    warn!("ignoring audio delta outside active session");
                }
            }
            ServerEvent::ResponseAudioDone => debug!("response audio done"),
            ServerEvent::ResponseAudioTranscriptDelta { delta } => {
                if let Some(cb) = self.callbacks.on_transcript.as_mut() {
                    cb(&delta);
                }
            }
            ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => self.handle_tool_call(call_id, name, arguments),
            ServerEvent::InputAudioBufferSpeechStarted { audio_start_ms } => {
                if let Some(cb) = self.callbacks.on_speech_started.as_mut() {
                    cb(audio_start_ms);
                }
            }
            ServerEvent::InputAudioBufferSpeechStopped { audio_end_ms } => {
                if let Some(cb) = self.callbacks.on_speech_stopped.as_mut() {
                    cb(audio_end_ms);
                }
            }
            ServerEvent::Error { error } => {
                warn!(message = %error.message, "server reported an error");
                if let Some(cb) = self.callbacks.on_error.as_mut() {
                    cb(Error::Remote(error));
                }
            }
            ServerEvent::Unknown(value) => {
                debug!(
                    tag = value
                        .get("type")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("<none>"),
                    "ignoring unrecognized event"
                );
            }
        }
        Ok(())
    }

    fn handle_tool_call(&mut self, call_id: String, name: String, arguments: String) {
        if self.state.phase() != SessionPhase::Active {
            warn!(call_id = %call_id, "ignoring tool call outside active session");
            return;
        }
        let call = ToolInvocation {
            call_id,
            name,
            arguments,
        };
        if let Err(err) = self.bridge.begin(call.clone()) {
            warn!(call_id = %call.call_id, "rejected tool call: {err}");
            if let Some(cb) = self.callbacks.on_error.as_mut() {
                cb(err);
            }
            return;
        }

        if self.tools.has_handler(&call.name) {
            // Run the registered handler off the pump; its result comes back
            // through the command channel like a caller submission would.
            let tools = Arc::clone(&self.tools);
            let feedback = self.feedback.clone();
            tokio::spawn(async move {
                let output = match tools.dispatch(&call.name, &call.arguments).await {
                    Ok(output) => output,
                    Err(err) => serde_json::json!({ "error": err.to_string() }).to_string(),
                };
                let Some(sender) = feedback.upgrade() else {
                    return;
                };
                let (tx, rx) = oneshot::channel();
                if sender
                    .send(Command::SubmitToolResult {
                        call_id: call.call_id,
                        output,
                        respond: tx,
                    })
                    .await
                    .is_ok()
                {
                    let _ = rx.await;
                }
            });
        } else if let Some(cb) = self.callbacks.on_tool_call.as_mut() {
            cb(call);
        } else {
            warn!(name = %call.name, "tool call has no handler and no callback registered");
        }
    }

    async fn deliver_tool_result(&mut self, call_id: &str, output: String) -> Result<()> {
        let call = self.bridge.complete(call_id)?;
        let item = Item::FunctionCallOutput {
            call_id: call.call_id,
            output,
        };
        self.transport
            .send(ClientEvent::ConversationItemCreate {
                event_id: None,
                item: Box::new(item),
            })
            .await?;
        self.transport
            .send(ClientEvent::ResponseCreate { event_id: None })
            .await?;
        Ok(())
    }

    async fn pump_audio(&mut self) -> std::result::Result<(), String> {
        if !self.state.can_send_audio() {
            return Ok(());
        }
        let Some(producer) = self.callbacks.audio_producer.as_mut() else {
            return Ok(());
        };
        let chunk = producer(AUDIO_CHUNK_BYTES);
        if chunk.is_empty() {
            // No data yet; normal idle behavior.
            return Ok(());
        }
        self.audio_bytes_out += chunk.len() as u64;
        let audio = framing::encode(&chunk);
        self.send(ClientEvent::InputAudioBufferAppend {
            event_id: None,
            audio,
        })
        .await
    }

    async fn send(&mut self, event: ClientEvent) -> std::result::Result<(), String> {
        self.transport
            .send(event)
            .await
            .map_err(|err| format!("transport error: {err}"))
    }

    async fn shutdown(mut self, reason: &str, stop_ack: Option<oneshot::Sender<()>>) {
        let dropped = self.bridge.discard_all();
        if dropped > 0 {
            warn!(dropped, "discarding pending tool calls");
        }
        self.transport.close().await;
        self.state.on_disconnected(reason);
        self.active.store(false, Ordering::Release);
        if let Some(cb) = self.callbacks.on_disconnected.as_mut() {
            cb(reason);
        }
        info!(
            audio_bytes_in = self.audio_bytes_in,
            audio_bytes_out = self.audio_bytes_out,
            responses = self.state.responses_completed(),
            "session ended"
        );
        self.engaged.store(false, Ordering::Release);
        // The ack is the last thing out: the caller of `stop` may rely on
        // every callback having already fired.
        if let Some(respond) = stop_ack {
            let _ = respond.send(());
        }
    }
}
