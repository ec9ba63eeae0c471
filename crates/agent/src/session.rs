//! Session orchestrator
//!
//! One `SessionActor` task per participant. It owns every piece of mutable
//! conversation state (interruption controller, sequencer, language context,
//! transcript) and serializes all mutation through a single `select!` loop
//! over the transport, pipeline, tool-result and control channels plus the
//! sequencer hold deadline and the inactivity deadline.
//!
//! State machine:
//!
//! ```text
//! Idle -> Listening        participant connected
//! Listening -> Thinking    final user utterance committed
//! Thinking -> Speaking     first synthesized audio of the active item
//! Speaking -> Listening    playout complete
//! Speaking -> Interrupted -> Listening   barge-in
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use skyvoice_config::Settings;
use skyvoice_core::{AudioFrame, CommittedTurn, Role, SampleRate, SessionId, TurnId};
use skyvoice_pipeline::{
    GenerateRequest, Interruption, InterruptionController, LanguageContext,
    LanguageContextManager, PipelineEvent, PlaybackState, Sequencer, SequencerDiagnostic,
    SequencerOutput, SpeechPipeline,
};
use skyvoice_tools::{FlightSearchTool, SearchArguments, SearchOutcome, SearchParams, Tool, ToolError};
use skyvoice_transport::{
    DataMessage, DataPayload, FlightSummary, FrameAdapter, Transport, TransportEvent,
};

use crate::metrics;
use crate::prompts::ResponseTemplates;
use crate::AgentError;

/// Conversation state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Interrupted,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Listening => "listening",
            ConversationState::Thinking => "thinking",
            ConversationState::Speaking => "speaking",
            ConversationState::Interrupted => "interrupted",
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: ConversationState,
    pub language: LanguageContext,
    pub playback: PlaybackState,
    /// Assistant turns waiting for their user turn
    pub held_turns: usize,
    pub transcript_len: usize,
    /// Sequence number the next data message will carry
    pub next_data_sequence: u64,
    pub tool_call_pending: bool,
}

/// Control messages for a running actor
#[derive(Debug)]
pub enum SessionCommand {
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Transcript(oneshot::Sender<Vec<CommittedTurn>>),
    Shutdown,
}

/// Why an actor stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Disconnected(String),
    InactivityTimeout,
    Shutdown,
}

/// Cloneable handle used to feed and query a session actor
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    transport_tx: mpsc::Sender<TransportEvent>,
    pipeline_tx: mpsc::Sender<PipelineEvent>,
    command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Deliver a transport/VAD event
    pub async fn transport_event(&self, event: TransportEvent) -> Result<(), AgentError> {
        self.transport_tx
            .send(event)
            .await
            .map_err(|_| AgentError::Closed)
    }

    /// Deliver a STT/LLM/TTS event
    pub async fn pipeline_event(&self, event: PipelineEvent) -> Result<(), AgentError> {
        self.pipeline_tx
            .send(event)
            .await
            .map_err(|_| AgentError::Closed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, AgentError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| AgentError::Closed)
    }

    /// Committed conversation log, in display order
    pub async fn transcript(&self) -> Result<Vec<CommittedTurn>, AgentError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Transcript(tx)).await?;
        rx.await.map_err(|_| AgentError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), AgentError> {
        self.command(SessionCommand::Shutdown).await
    }

    /// The actor has stopped
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    async fn command(&self, command: SessionCommand) -> Result<(), AgentError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AgentError::Closed)
    }
}

/// Outcome of a spawned tool call
#[derive(Debug)]
struct ToolResult {
    call_id: String,
    params: SearchParams,
    elapsed: Duration,
    result: Result<SearchOutcome, ToolError>,
}

/// Single-writer owner of one session's state
pub struct SessionActor {
    id: SessionId,
    settings: Settings,
    transport: Arc<dyn Transport>,
    pipeline: Arc<dyn SpeechPipeline>,
    tool: Arc<FlightSearchTool>,

    state: ConversationState,
    interruption: InterruptionController,
    sequencer: Sequencer,
    language: LanguageContextManager,
    /// Rate synthesized audio is expected at
    tts_rate: SampleRate,
    /// TTS audio to the transport rate
    outbound: FrameAdapter,
    /// Participant audio to the STT rate
    inbound: FrameAdapter,
    transcript: Vec<CommittedTurn>,
    data_sequence: u64,
    last_activity: Instant,
    pending_tool_call: Option<String>,

    transport_rx: mpsc::Receiver<TransportEvent>,
    pipeline_rx: mpsc::Receiver<PipelineEvent>,
    command_rx: mpsc::Receiver<SessionCommand>,
    tool_tx: mpsc::Sender<ToolResult>,
    tool_rx: mpsc::Receiver<ToolResult>,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl SessionActor {
    /// Build an actor and the handle that feeds it
    pub fn new(
        id: SessionId,
        settings: &Settings,
        transport: Arc<dyn Transport>,
        pipeline: Arc<dyn SpeechPipeline>,
        tool: Arc<FlightSearchTool>,
    ) -> Result<(Self, SessionHandle), AgentError> {
        let stt_rate = SampleRate::try_from(settings.audio.stt_sample_rate)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        let tts_rate = SampleRate::try_from(settings.audio.tts_sample_rate)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        let transport_rate = transport.sample_rate();
        if transport_rate.as_hz() != settings.audio.transport_sample_rate {
            return Err(AgentError::Config(format!(
                "transport runs at {} Hz, audio.transport_sample_rate is {}",
                transport_rate.as_hz(),
                settings.audio.transport_sample_rate
            )));
        }

        let language = LanguageContextManager::new(settings.language.clone());
        let sequencer = Sequencer::new(settings.sequencer.clone(), language.current().clone());

        let capacity = settings.session.channel_capacity.max(1);
        let (transport_tx, transport_rx) = mpsc::channel(capacity);
        let (pipeline_tx, pipeline_rx) = mpsc::channel(capacity);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (tool_tx, tool_rx) = mpsc::channel(4);

        let handle = SessionHandle {
            id: id.clone(),
            transport_tx,
            pipeline_tx,
            command_tx,
        };

        let actor = Self {
            id,
            settings: settings.clone(),
            transport,
            pipeline,
            tool,
            state: ConversationState::Idle,
            interruption: InterruptionController::new(settings.interruption.clone(), transport_rate),
            sequencer,
            language,
            tts_rate,
            outbound: FrameAdapter::new(transport_rate),
            inbound: FrameAdapter::new(stt_rate),
            transcript: Vec::new(),
            data_sequence: 0,
            last_activity: now(),
            pending_tool_call: None,
            transport_rx,
            pipeline_rx,
            command_rx,
            tool_tx,
            tool_rx,
        };

        Ok((actor, handle))
    }

    /// Run until disconnect, inactivity timeout or shutdown
    #[tracing::instrument(name = "session", skip(self), fields(session_id = %self.id))]
    pub async fn run(mut self) -> SessionEnd {
        tracing::info!("Session started");
        let inactivity_timeout = self.settings.session.inactivity_timeout();

        let end = loop {
            let hold_deadline = self
                .sequencer
                .next_deadline()
                .map(tokio::time::Instant::from_std);
            let inactive_at = tokio::time::Instant::from_std(self.last_activity + inactivity_timeout);

            tokio::select! {
                biased;

                Some(event) = self.transport_rx.recv() => {
                    if let Some(end) = self.handle_transport(event).await {
                        break end;
                    }
                }
                Some(event) = self.pipeline_rx.recv() => {
                    self.handle_pipeline(event).await;
                }
                Some(result) = self.tool_rx.recv() => {
                    self.handle_tool_result(result).await;
                }
                _ = sleep_until_opt(hold_deadline), if hold_deadline.is_some() => {
                    let out = self.sequencer.poll_expired(now());
                    self.apply_sequencer_output(out).await;
                }
                _ = tokio::time::sleep_until(inactive_at) => {
                    tracing::info!(timeout_secs = inactivity_timeout.as_secs(), "Session inactive");
                    break SessionEnd::InactivityTimeout;
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Snapshot(reply)) => {
                            let _ = reply.send(self.snapshot());
                        }
                        Some(SessionCommand::Transcript(reply)) => {
                            let _ = reply.send(self.transcript.clone());
                        }
                        Some(SessionCommand::Shutdown) | None => break SessionEnd::Shutdown,
                    }
                }
            }
        };

        if self.interruption.is_cancellable() {
            if let Err(e) = self.pipeline.cancel().await {
                tracing::debug!(error = %e, "Cancel on session end failed");
            }
        }
        tracing::info!(reason = ?end, turns = self.transcript.len(), "Session ended");
        end
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            state: self.state,
            language: self.language.context().clone(),
            playback: self.interruption.playback().clone(),
            held_turns: self.sequencer.held_count(),
            transcript_len: self.transcript.len(),
            next_data_sequence: self.data_sequence,
            tool_call_pending: self.pending_tool_call.is_some(),
        }
    }

    // ---- transport ----

    async fn handle_transport(&mut self, event: TransportEvent) -> Option<SessionEnd> {
        self.last_activity = now();

        match event {
            TransportEvent::Connected { participant } => {
                tracing::info!(participant = %participant, "Participant connected");
                if self.state == ConversationState::Idle {
                    self.set_state(ConversationState::Listening).await;
                }
            }
            TransportEvent::SpeechStarted => {
                if let Some(interruption) = self.interruption.speech_started(now()) {
                    self.handle_interruption(interruption).await;
                }
            }
            TransportEvent::SpeechEnded => {
                self.interruption.speech_ended(now());
            }
            TransportEvent::FramePlayed { samples } => {
                let progress = self.interruption.frame_played(samples);
                self.publish(progress.released).await;
                if let Some(item_id) = progress.completed {
                    self.playout_complete(&item_id).await;
                }
            }
            TransportEvent::ParticipantAudio(frame) => {
                self.forward_participant_audio(frame).await;
            }
            TransportEvent::Disconnected { reason } => {
                tracing::info!(reason = %reason, "Participant disconnected");
                return Some(SessionEnd::Disconnected(reason));
            }
        }

        None
    }

    async fn forward_participant_audio(&mut self, frame: AudioFrame) {
        match self.inbound.adapt(frame) {
            Ok(frame) => {
                if let Err(e) = self.pipeline.push_audio(frame).await {
                    tracing::warn!(error = %e, "Failed to forward participant audio");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Dropping participant frame"),
        }
    }

    async fn handle_interruption(&mut self, interruption: Interruption) {
        metrics::record_interruption();
        self.set_state(ConversationState::Interrupted).await;

        if let Err(e) = self.pipeline.cancel().await {
            tracing::warn!(error = %e, "Pipeline cancel failed");
        }
        self.cancel_generation(&interruption.item_id).await;

        if let Err(e) = self
            .transport
            .truncate_item(&interruption.item_id, interruption.audio_end_ms)
            .await
        {
            tracing::warn!(item_id = %interruption.item_id, error = %e, "Truncate failed");
        }

        match self
            .sequencer
            .mark_truncated(&interruption.item_id, interruption.audio_end_ms, now())
        {
            Some(out) => self.apply_sequencer_output(out).await,
            None => {
                if let Some(turn) = self
                    .transcript
                    .iter_mut()
                    .rev()
                    .find(|t| t.turn_id == interruption.item_id)
                {
                    turn.truncated_at_ms = Some(interruption.audio_end_ms);
                }
            }
        }

        self.set_state(ConversationState::Listening).await;
    }

    /// Cancel with retries; local state is already reset either way
    async fn cancel_generation(&self, item_id: &TurnId) {
        let attempts = self.settings.interruption.cancel_retries + 1;
        for attempt in 1..=attempts {
            match self.transport.cancel_generation(item_id).await {
                Ok(()) => return,
                Err(e) if attempt < attempts => {
                    tracing::warn!(item_id = %item_id, attempt, error = %e, "Cancel failed, retrying");
                }
                Err(e) => {
                    tracing::error!(item_id = %item_id, attempts, error = %e, "Cancel failed, giving up");
                }
            }
        }
    }

    async fn publish(&self, frames: Vec<AudioFrame>) {
        for frame in frames {
            if let Err(e) = self.transport.publish_audio(frame).await {
                tracing::warn!(error = %e, "Publish failed");
            }
        }
    }

    async fn playout_complete(&mut self, item_id: &TurnId) {
        tracing::debug!(item_id = %item_id, "Playout complete");
        if self.state == ConversationState::Speaking {
            self.set_state(ConversationState::Listening).await;
        }
    }

    // ---- pipeline ----

    async fn handle_pipeline(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Fragment(fragment) => {
                let out = self.sequencer.receive(fragment, now());
                self.apply_sequencer_output(out).await;
            }
            PipelineEvent::UtteranceLanguage {
                turn_id,
                language,
                confidence,
            } => {
                let decision = self.language.observe(&language, confidence);
                if decision.switched {
                    metrics::record_language_switch(decision.language.code());
                    self.sequencer.set_language(decision.language.clone());
                    self.speak(ResponseTemplates::acknowledge_switch(&decision.language))
                        .await;
                } else if decision.low_confidence {
                    tracing::debug!(turn_id = %turn_id, "Asking user to confirm language");
                    self.speak(ResponseTemplates::clarify_language(&decision.language))
                        .await;
                }
                self.send_state_update(decision.switched, decision.low_confidence)
                    .await;
            }
            PipelineEvent::SynthesisStarted { item_id } => {
                tracing::debug!(item_id = %item_id, "Synthesis started");
                self.interruption.synthesis_started(item_id);
            }
            PipelineEvent::SynthesisChunk { item_id, frame } => {
                self.handle_synthesis_chunk(item_id, frame).await;
            }
            PipelineEvent::SynthesisComplete { item_id } => {
                if let Some(done) = self.interruption.synthesis_complete(&item_id) {
                    self.playout_complete(&done).await;
                }
            }
            PipelineEvent::ToolCallRequested { call_id, arguments } => {
                self.handle_tool_call(call_id, arguments).await;
            }
            PipelineEvent::Error(e) => {
                tracing::warn!(error = %e, "Pipeline error");
                let apology = ResponseTemplates::apology(self.language.current());
                self.speak(apology).await;
                self.set_state(ConversationState::Listening).await;
            }
        }
    }

    async fn handle_synthesis_chunk(&mut self, item_id: TurnId, frame: AudioFrame) {
        if frame.sample_rate != self.tts_rate {
            tracing::trace!(
                item_id = %item_id,
                rate = frame.sample_rate.as_hz(),
                expected = self.tts_rate.as_hz(),
                "Synthesized frame at unexpected rate"
            );
        }
        let frame = match self.outbound.adapt(frame) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(item_id = %item_id, error = %e, "Dropping synthesized frame");
                return;
            }
        };

        let active = self.interruption.playback().current_item_id.as_ref() == Some(&item_id);
        let released = self.interruption.enqueue(&item_id, frame);
        if active
            && matches!(
                self.state,
                ConversationState::Thinking | ConversationState::Listening
            )
        {
            self.set_state(ConversationState::Speaking).await;
        }
        self.publish(released).await;
    }

    async fn apply_sequencer_output(&mut self, out: SequencerOutput) {
        for diagnostic in &out.diagnostics {
            match diagnostic {
                SequencerDiagnostic::Duplicate { role, sequence } => {
                    tracing::debug!(role = role.as_str(), sequence, "Duplicate fragment dropped");
                }
                SequencerDiagnostic::Buffered { .. } => {}
                SequencerDiagnostic::BufferOverflow { role, sequence } => {
                    tracing::warn!(role = role.as_str(), sequence, "Fragment dropped on overflow");
                }
                SequencerDiagnostic::AfterTruncation { turn_id, sequence } => {
                    tracing::debug!(turn_id = %turn_id, sequence, "Unplayed fragment dropped");
                }
            }
        }

        let mut user_committed = false;
        for turn in out.flushed {
            if turn.hold_escaped {
                metrics::record_hold_escape();
            }
            if turn.role == Role::User {
                self.language.record_fragment(&turn.text);
                user_committed = true;
            }
            self.send_data(DataPayload::from_turn(&turn)).await;
            self.transcript.push(turn);
        }

        if user_committed && self.state == ConversationState::Listening {
            self.set_state(ConversationState::Thinking).await;
        }
    }

    // ---- tool ----

    async fn handle_tool_call(&mut self, call_id: String, arguments: Value) {
        let (valid, rejected) = match self.tool.partition_arguments(&arguments) {
            Ok(split) => split,
            Err(e) => {
                tracing::warn!(call_id = %call_id, error = %e, "Rejected tool arguments");
                (Map::new(), Vec::new())
            }
        };
        for (field, e) in &rejected {
            tracing::warn!(call_id = %call_id, field = %field, error = %e, "Dropped tool argument");
        }

        let mut args = SearchArguments::from_value(&Value::Object(valid)).unwrap_or_else(|e| {
            tracing::warn!(call_id = %call_id, error = %e, "Unreadable tool arguments");
            SearchArguments::default()
        });
        args.fill_from(self.language.preserved_entities());

        // A route field the user gave but we could not use is asked for again
        for (field, _) in &rejected {
            match field.as_str() {
                "origin" => args.origin = None,
                "destination" => args.destination = None,
                _ => {}
            }
        }

        let missing = args.missing();
        if !missing.is_empty() {
            tracing::debug!(call_id = %call_id, ?missing, "Route incomplete, asking user");
            let question = ResponseTemplates::ask_route(self.language.current(), &missing);
            self.speak(question).await;
            return;
        }

        let params = match args.into_params() {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(call_id = %call_id, error = %e, "Invalid search parameters");
                return;
            }
        };

        tracing::info!(
            call_id = %call_id,
            origin = %params.origin,
            destination = %params.destination,
            "Starting flight search"
        );
        if self.pending_tool_call.replace(call_id.clone()).is_some() {
            tracing::debug!("Superseding pending tool call");
        }
        if self.state == ConversationState::Listening {
            self.set_state(ConversationState::Thinking).await;
        }

        let tool = Arc::clone(&self.tool);
        let tx = self.tool_tx.clone();
        let timeout = self.settings.tool.timeout();
        let timeout_ms = self.settings.tool.timeout_ms;
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let result = match tokio::time::timeout(timeout, tool.search(&params)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::timeout(tool.name(), timeout_ms)),
            };
            let _ = tx
                .send(ToolResult {
                    call_id,
                    params,
                    elapsed: started.elapsed(),
                    result,
                })
                .await;
        });
    }

    async fn handle_tool_result(&mut self, result: ToolResult) {
        if self.pending_tool_call.as_deref() != Some(result.call_id.as_str()) {
            tracing::debug!(call_id = %result.call_id, "Ignoring stale tool result");
            return;
        }
        self.pending_tool_call = None;

        match result.result {
            Ok(outcome) => {
                metrics::record_tool_call("ok", result.elapsed);
                tracing::info!(
                    call_id = %result.call_id,
                    options = outcome.options.len(),
                    cached = outcome.cached,
                    approximate = outcome.approximate,
                    "Flight search complete"
                );

                let summary = FlightSummary {
                    summary: ResponseTemplates::results_summary(&result.params, &outcome),
                    approximate: outcome.approximate,
                    results: outcome
                        .options
                        .iter()
                        .filter_map(|o| serde_json::to_value(o).ok())
                        .collect(),
                };
                self.send_data(DataPayload::FlightResults { summary }).await;

                let instructions =
                    ResponseTemplates::present_results(self.language.current(), &outcome);
                let request = GenerateRequest::instructions(instructions, self.language.current().clone());
                if let Err(e) = self.pipeline.generate(request).await {
                    tracing::warn!(error = %e, "Failed to request results presentation");
                    self.set_state(ConversationState::Listening).await;
                }
            }
            Err(e) => {
                let outcome = if matches!(e, ToolError::Timeout { .. }) {
                    "timeout"
                } else {
                    "error"
                };
                metrics::record_tool_call(outcome, result.elapsed);
                tracing::warn!(call_id = %result.call_id, error = %e, "Flight search failed, using fallback");

                let summary = FlightSummary {
                    summary: ResponseTemplates::fallback_summary(self.language.preserved_entities()),
                    approximate: true,
                    results: Vec::new(),
                };
                self.send_data(DataPayload::FlightResults { summary }).await;

                let notice = ResponseTemplates::results_unavailable(self.language.current());
                self.speak(notice).await;
                self.set_state(ConversationState::Listening).await;
            }
        }
    }

    // ---- outbound ----

    /// Speak fixed text in the current language
    async fn speak(&self, text: String) {
        let request = GenerateRequest::text(text, self.language.current().clone());
        if let Err(e) = self.pipeline.generate(request).await {
            tracing::warn!(error = %e, "Failed to request speech");
        }
    }

    async fn set_state(&mut self, state: ConversationState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = self.state.as_str(), to = state.as_str(), "State change");
        self.state = state;
        self.send_state_update(false, false).await;
    }

    async fn send_state_update(&mut self, language_switched: bool, low_confidence: bool) {
        let payload = DataPayload::StateUpdate {
            state: self.state.as_str().to_string(),
            language: self.language.current().clone(),
            language_switched,
            low_confidence,
            preserved_entities: self.language.preserved_entities().clone(),
        };
        self.send_data(payload).await;
    }

    async fn send_data(&mut self, payload: DataPayload) {
        let message = DataMessage {
            sequence: self.data_sequence,
            payload,
        };
        self.data_sequence += 1;

        if let Err(e) = self.transport.send_data(&message).await {
            tracing::warn!(
                sequence = message.sequence,
                kind = message.payload.type_name(),
                error = %e,
                "Data message not delivered"
            );
        }
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
