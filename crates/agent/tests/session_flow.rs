//! End-to-end session tests
//!
//! Drive a real `SessionActor` with channel-backed transport and pipeline
//! collaborators and assert on what it sends back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use skyvoice_agent::{ConversationState, SessionActor, SessionEnd, SessionHandle};
use skyvoice_config::Settings;
use skyvoice_core::{
    AudioFrame, Channels, EntityKind, Language, SampleRate, SessionId, TurnFragment, TurnId,
};
use skyvoice_pipeline::{
    ms_to_samples, samples_to_ms, ChannelPipeline, GenerateRequest, PipelineCommand,
    PipelineError, PipelineEvent,
};
use skyvoice_tools::{FlightSearchTool, StubFlightSearch};
use skyvoice_transport::{
    ChannelTransport, DataMessage, DataPayload, TransportCommand, TransportEvent,
};

struct Harness {
    handle: SessionHandle,
    task: JoinHandle<SessionEnd>,
    transport: ChannelTransport,
    transport_rx: mpsc::Receiver<TransportCommand>,
    pipeline_rx: mpsc::Receiver<PipelineCommand>,
}

impl Harness {
    fn start(settings: Settings, search: StubFlightSearch) -> Self {
        let (transport, transport_rx) = ChannelTransport::new(SampleRate::Hz48000, 512);
        let (pipeline, pipeline_rx) = ChannelPipeline::new(64);
        let tool = Arc::new(FlightSearchTool::new(Arc::new(search)));

        let (actor, handle) = SessionActor::new(
            SessionId::from("test-session"),
            &settings,
            Arc::new(transport.clone()),
            Arc::new(pipeline),
            tool,
        )
        .unwrap();
        let task = tokio::spawn(actor.run());

        Self {
            handle,
            task,
            transport,
            transport_rx,
            pipeline_rx,
        }
    }

    fn with_defaults() -> Self {
        Self::start(Settings::default(), StubFlightSearch::sample())
    }

    async fn connect(&mut self) {
        self.transport(TransportEvent::Connected {
            participant: "alice".to_string(),
        })
        .await;
        let message = self.next_data().await;
        assert_eq!(state_of(&message), Some("listening"));
    }

    async fn transport(&self, event: TransportEvent) {
        self.handle.transport_event(event).await.unwrap();
    }

    async fn pipeline(&self, event: PipelineEvent) {
        self.handle.pipeline_event(event).await.unwrap();
    }

    async fn next_command(&mut self) -> TransportCommand {
        timeout(Duration::from_secs(10), self.transport_rx.recv())
            .await
            .expect("timed out waiting for transport command")
            .expect("transport channel closed")
    }

    async fn next_data(&mut self) -> DataMessage {
        loop {
            if let TransportCommand::SendData(message) = self.next_command().await {
                return message;
            }
        }
    }

    async fn next_generate(&mut self) -> GenerateRequest {
        loop {
            let command = timeout(Duration::from_secs(10), self.pipeline_rx.recv())
                .await
                .expect("timed out waiting for pipeline command")
                .expect("pipeline channel closed");
            if let PipelineCommand::Generate(request) = command {
                return request;
            }
        }
    }

    /// Everything the actor has sent so far (call after a snapshot)
    fn drain_transport(&mut self) -> Vec<TransportCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.transport_rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn drain_pipeline(&mut self) -> Vec<PipelineCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.pipeline_rx.try_recv() {
            commands.push(command);
        }
        commands
    }
}

fn state_of(message: &DataMessage) -> Option<&str> {
    match &message.payload {
        DataPayload::StateUpdate { state, .. } => Some(state.as_str()),
        _ => None,
    }
}

fn data_messages(commands: &[TransportCommand]) -> Vec<&DataMessage> {
    commands
        .iter()
        .filter_map(|c| match c {
            TransportCommand::SendData(message) => Some(message),
            _ => None,
        })
        .collect()
}

fn tts_frame(sequence: u64) -> AudioFrame {
    AudioFrame::new(vec![0.1; 240], SampleRate::Hz24000, Channels::Mono, sequence)
}

/// Start synthesis of `item` and deliver `chunks` 10 ms frames at 24 kHz
async fn speak_item(h: &Harness, item: &str, chunks: u64) {
    h.pipeline(PipelineEvent::SynthesisStarted {
        item_id: TurnId::from(item),
    })
    .await;
    for i in 0..chunks {
        h.pipeline(PipelineEvent::SynthesisChunk {
            item_id: TurnId::from(item),
            frame: tts_frame(i),
        })
        .await;
    }
}

#[tokio::test]
async fn test_connect_moves_to_listening() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Listening);
    assert_eq!(snapshot.next_data_sequence, 1);
}

#[tokio::test]
async fn test_language_switch_preserves_route() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u1", 0, "flights from JFK to LAX").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::UtteranceLanguage {
        turn_id: TurnId::from("u1"),
        language: Language::english(),
        confidence: 0.95,
    })
    .await;
    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u2", 1, "¿y el martes?").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::UtteranceLanguage {
        turn_id: TurnId::from("u2"),
        language: Language::new("es"),
        confidence: 0.9,
    })
    .await;

    let snapshot = h.handle.snapshot().await.unwrap();
    let context = &snapshot.language;
    assert_eq!(context.current, Language::new("es"));
    assert_eq!(context.previous, Some(Language::english()));
    assert_eq!(context.switch_count, 1);
    assert_eq!(context.preserved_entities.get(EntityKind::Origin), Some("JFK"));
    assert_eq!(context.preserved_entities.get(EntityKind::Destination), Some("LAX"));

    // Acknowledged in the new language
    match h.next_generate().await {
        GenerateRequest::Text { language, .. } => assert_eq!(language.code(), "es"),
        other => panic!("unexpected request: {:?}", other),
    }

    let commands = h.drain_transport();
    let switched = data_messages(&commands)
        .into_iter()
        .find_map(|m| match &m.payload {
            DataPayload::StateUpdate {
                language_switched: true,
                language,
                preserved_entities,
                ..
            } => Some((language.clone(), preserved_entities.clone())),
            _ => None,
        })
        .expect("state update announcing the switch");
    assert_eq!(switched.0.code(), "es");
    assert_eq!(switched.1.get(EntityKind::Origin), Some("JFK"));
}

#[tokio::test]
async fn test_low_confidence_asks_for_clarification() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::UtteranceLanguage {
        turn_id: TurnId::from("u1"),
        language: Language::new("fr"),
        confidence: 0.6,
    })
    .await;

    match h.next_generate().await {
        GenerateRequest::Text { text, language } => {
            assert_eq!(language, Language::english());
            assert!(text.contains("Which language"));
        }
        other => panic!("unexpected request: {:?}", other),
    }

    let message = h.next_data().await;
    match message.payload {
        DataPayload::StateUpdate {
            low_confidence,
            language_switched,
            ..
        } => {
            assert!(low_confidence);
            assert!(!language_switched);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_data_sequence_is_gapless() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u1", 0, "from JFK to LAX").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::assistant("a1", 0, "Looking now.")
            .replying_to(0)
            .finalized(),
    ))
    .await;
    h.handle.snapshot().await.unwrap();

    let commands = h.drain_transport();
    let sequences: Vec<u64> = data_messages(&commands).iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, (1..=sequences.len() as u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_assistant_waits_for_its_user_turn() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    // Response arrives before the transcript it answers
    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::assistant("a1", 0, "Here are flights to LAX.")
            .replying_to(0)
            .finalized(),
    ))
    .await;
    assert_eq!(h.handle.snapshot().await.unwrap().held_turns, 1);

    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u1", 0, "flights to LAX").finalized(),
    ))
    .await;

    let first = h.next_data().await;
    let second = h.next_data().await;
    assert!(matches!(first.payload, DataPayload::Transcript { .. }));
    match second.payload {
        DataPayload::PreSpeechText { hold_escaped, .. } => assert!(!hold_escaped),
        other => panic!("unexpected payload: {:?}", other),
    }
    assert_eq!(state_of(&h.next_data().await), Some("thinking"));

    let transcript = h.handle.transcript().await.unwrap();
    assert_eq!(transcript.len(), 2);
    assert!(transcript[0].display_timestamp < transcript[1].display_timestamp);
}

#[tokio::test(start_paused = true)]
async fn test_hold_timeout_escape_is_flagged() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::assistant("a1", 0, "Anything else?")
            .replying_to(3)
            .finalized(),
    ))
    .await;

    let started = tokio::time::Instant::now();
    let message = h.next_data().await;
    match message.payload {
        DataPayload::PreSpeechText { hold_escaped, .. } => assert!(hold_escaped),
        other => panic!("unexpected payload: {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(h.handle.snapshot().await.unwrap().held_turns, 0);
}

#[tokio::test]
async fn test_playout_completes_to_listening() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    speak_item(&h, "a1", 3).await;
    h.pipeline(PipelineEvent::SynthesisComplete {
        item_id: TurnId::from("a1"),
    })
    .await;
    assert_eq!(state_of(&h.next_data().await), Some("speaking"));

    h.transport(TransportEvent::FramePlayed { samples: 3 * 480 }).await;
    assert_eq!(state_of(&h.next_data().await), Some("listening"));

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.playback.samples_played, snapshot.playback.samples_total);
}

#[tokio::test]
async fn test_interruption_truncates_at_played_offset() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    // 300 ms synthesized; only 200 ms may be outstanding at the transport
    speak_item(&h, "a1", 30).await;
    h.transport(TransportEvent::FramePlayed { samples: 4321 }).await;
    h.transport(TransportEvent::SpeechStarted).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Listening);
    assert_eq!(snapshot.playback.current_item_id, None);

    let commands = h.drain_transport();
    let published = commands
        .iter()
        .filter(|c| matches!(c, TransportCommand::PublishAudio(_)))
        .count();
    assert_eq!(published, 29);
    assert!(commands.iter().all(|c| match c {
        TransportCommand::PublishAudio(frame) => frame.sample_rate == SampleRate::Hz48000,
        _ => true,
    }));

    let cancels: Vec<&TurnId> = commands
        .iter()
        .filter_map(|c| match c {
            TransportCommand::CancelGeneration { item_id } => Some(item_id),
            _ => None,
        })
        .collect();
    assert_eq!(cancels, vec![&TurnId::from("a1")]);

    let truncates: Vec<f64> = commands
        .iter()
        .filter_map(|c| match c {
            TransportCommand::TruncateItem { audio_end_ms, .. } => Some(*audio_end_ms),
            _ => None,
        })
        .collect();
    assert_eq!(truncates.len(), 1);
    assert_eq!(truncates[0], samples_to_ms(4321, SampleRate::Hz48000));
    assert_eq!(ms_to_samples(truncates[0], SampleRate::Hz48000), 4321);

    let states: Vec<&str> = data_messages(&commands).into_iter().filter_map(state_of).collect();
    assert_eq!(states, vec!["speaking", "interrupted", "listening"]);

    assert!(h.drain_pipeline().contains(&PipelineCommand::Cancel));
}

#[tokio::test]
async fn test_interrupted_reply_is_logged_at_once() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::Fragment(TurnFragment::assistant(
        "a1",
        0,
        "Here are three options ",
    )))
    .await;
    speak_item(&h, "a1", 5).await;
    h.transport(TransportEvent::FramePlayed { samples: 960 }).await;
    h.transport(TransportEvent::SpeechStarted).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.transcript_len, 1);

    let commands = h.drain_transport();
    let logged: Vec<(String, Option<f64>)> = data_messages(&commands)
        .into_iter()
        .filter_map(|m| match &m.payload {
            DataPayload::PreSpeechText {
                text,
                truncated_at_ms,
                ..
            } => Some((text.clone(), *truncated_at_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(
        logged,
        vec![(
            "Here are three options".to_string(),
            Some(samples_to_ms(960, SampleRate::Hz48000))
        )]
    );

    // Late remainder of the cancelled reply stays out of the log
    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::assistant("a1", 1, "for Tuesday.").finalized(),
    ))
    .await;
    assert_eq!(h.handle.snapshot().await.unwrap().transcript_len, 1);
}

#[tokio::test]
async fn test_no_interruption_without_active_item() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.transport(TransportEvent::SpeechStarted).await;
    h.handle.snapshot().await.unwrap();

    let commands = h.drain_transport();
    assert!(commands.iter().all(|c| !matches!(
        c,
        TransportCommand::CancelGeneration { .. } | TransportCommand::TruncateItem { .. }
    )));
}

#[tokio::test]
async fn test_cancel_is_retried() {
    let mut h = Harness::with_defaults();
    h.connect().await;
    h.transport.fail_next_cancels(1);

    speak_item(&h, "a1", 5).await;
    h.transport(TransportEvent::SpeechStarted).await;
    h.handle.snapshot().await.unwrap();

    let commands = h.drain_transport();
    let cancels = commands
        .iter()
        .filter(|c| matches!(c, TransportCommand::CancelGeneration { .. }))
        .count();
    assert_eq!(cancels, 1);
}

#[tokio::test]
async fn test_failed_cancel_still_truncates_and_recovers() {
    let mut h = Harness::with_defaults();
    h.connect().await;
    h.transport.fail_next_cancels(10);

    speak_item(&h, "a1", 5).await;
    h.transport(TransportEvent::SpeechStarted).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Listening);

    let commands = h.drain_transport();
    assert!(!commands
        .iter()
        .any(|c| matches!(c, TransportCommand::CancelGeneration { .. })));
    assert!(commands
        .iter()
        .any(|c| matches!(c, TransportCommand::TruncateItem { .. })));
}

#[tokio::test]
async fn test_pipeline_error_apologizes() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u1", 0, "flights please").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::Error(PipelineError::Llm("overloaded".to_string())))
        .await;

    match h.next_generate().await {
        GenerateRequest::Text { text, .. } => assert!(text.starts_with("Sorry")),
        other => panic!("unexpected request: {:?}", other),
    }
    assert_eq!(
        h.handle.snapshot().await.unwrap().state,
        ConversationState::Listening
    );
}

#[tokio::test]
async fn test_missing_route_asks_user() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::ToolCallRequested {
        call_id: "call-1".to_string(),
        arguments: json!({"date": "2025-03-18"}),
    })
    .await;

    match h.next_generate().await {
        GenerateRequest::Text { text, .. } => {
            assert_eq!(text, "Where are you flying from, and where to?")
        }
        other => panic!("unexpected request: {:?}", other),
    }

    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(!snapshot.tool_call_pending);
    let commands = h.drain_transport();
    assert!(!data_messages(&commands)
        .iter()
        .any(|m| matches!(m.payload, DataPayload::FlightResults { .. })));
}

#[tokio::test]
async fn test_tool_call_uses_preserved_entities() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u1", 0, "flights from JFK to LAX").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u2", 1, "¿y el martes?").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::UtteranceLanguage {
        turn_id: TurnId::from("u2"),
        language: Language::new("es"),
        confidence: 0.92,
    })
    .await;
    h.pipeline(PipelineEvent::ToolCallRequested {
        call_id: "call-1".to_string(),
        arguments: json!({"date": "2025-03-18"}),
    })
    .await;

    let summary = loop {
        let message = h.next_data().await;
        if let DataPayload::FlightResults { summary } = message.payload {
            break summary;
        }
    };
    assert!(!summary.approximate);
    assert_eq!(summary.results.len(), 2);
    assert!(summary.summary.contains("JFK → LAX"));

    // Switch acknowledgment first, then the presentation instructions
    assert!(matches!(h.next_generate().await, GenerateRequest::Text { .. }));
    match h.next_generate().await {
        GenerateRequest::Instructions { language, .. } => assert_eq!(language.code(), "es"),
        other => panic!("unexpected request: {:?}", other),
    }
}

/// Commit "flights from JFK to LAX" then switch to Spanish so the route is preserved
async fn preserve_jfk_lax(h: &Harness) {
    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u1", 0, "flights from JFK to LAX").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u2", 1, "¿y el martes?").finalized(),
    ))
    .await;
    h.pipeline(PipelineEvent::UtteranceLanguage {
        turn_id: TurnId::from("u2"),
        language: Language::new("es"),
        confidence: 0.92,
    })
    .await;
}

#[tokio::test]
async fn test_invalid_field_keeps_explicit_route() {
    let mut h = Harness::with_defaults();
    h.connect().await;
    preserve_jfk_lax(&h).await;

    h.pipeline(PipelineEvent::ToolCallRequested {
        call_id: "call-1".to_string(),
        arguments: json!({"origin": "SFO", "destination": "ORD", "cabin_class": "lounge"}),
    })
    .await;

    let summary = loop {
        let message = h.next_data().await;
        if let DataPayload::FlightResults { summary } = message.payload {
            break summary;
        }
    };
    assert!(summary.summary.contains("SFO → ORD"), "{}", summary.summary);
    assert_eq!(summary.results.len(), 2);
}

#[tokio::test]
async fn test_unreadable_origin_is_asked_again() {
    let mut h = Harness::with_defaults();
    h.connect().await;
    preserve_jfk_lax(&h).await;

    h.pipeline(PipelineEvent::ToolCallRequested {
        call_id: "call-1".to_string(),
        arguments: json!({"origin": "Los Angeles", "destination": "ORD"}),
    })
    .await;

    // Switch acknowledgment, then the origin question in Spanish
    assert!(matches!(h.next_generate().await, GenerateRequest::Text { .. }));
    match h.next_generate().await {
        GenerateRequest::Text { text, .. } => assert_eq!(text, "¿Desde qué aeropuerto sale?"),
        other => panic!("unexpected request: {:?}", other),
    }
    assert!(!h.handle.snapshot().await.unwrap().tool_call_pending);
}

#[tokio::test(start_paused = true)]
async fn test_tool_timeout_falls_back() {
    let search = StubFlightSearch::sample().with_latency(Duration::from_secs(10));
    let mut h = Harness::start(Settings::default(), search);
    h.connect().await;

    h.pipeline(PipelineEvent::Fragment(
        TurnFragment::user("u1", 0, "flights from JFK to LAX").finalized(),
    ))
    .await;
    let started = tokio::time::Instant::now();
    h.pipeline(PipelineEvent::ToolCallRequested {
        call_id: "call-1".to_string(),
        arguments: json!({"origin": "JFK", "destination": "LAX"}),
    })
    .await;

    let summary = loop {
        let message = h.next_data().await;
        if let DataPayload::FlightResults { summary } = message.payload {
            break summary;
        }
    };
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed <= Duration::from_millis(5100), "fallback after {:?}", elapsed);
    assert!(summary.approximate);
    assert!(summary.results.is_empty());

    assert_eq!(state_of(&h.next_data().await), Some("listening"));
    match h.next_generate().await {
        GenerateRequest::Text { text, .. } => assert!(text.contains("approximate")),
        other => panic!("unexpected request: {:?}", other),
    }

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Listening);
    assert!(!snapshot.tool_call_pending);
}

#[tokio::test]
async fn test_participant_audio_is_normalized() {
    let mut h = Harness::with_defaults();
    h.connect().await;

    let frame = AudioFrame::new(vec![0.0; 480], SampleRate::Hz48000, Channels::Mono, 0);
    h.transport(TransportEvent::ParticipantAudio(frame)).await;
    let stereo = AudioFrame::new(vec![0.0; 960], SampleRate::Hz48000, Channels::Stereo, 1);
    h.transport(TransportEvent::ParticipantAudio(stereo)).await;
    h.handle.snapshot().await.unwrap();

    let forwarded: Vec<AudioFrame> = h
        .drain_pipeline()
        .into_iter()
        .filter_map(|c| match c {
            PipelineCommand::Audio(frame) => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].sample_rate, SampleRate::Hz16000);
    assert_eq!(forwarded[0].samples.len(), 160);
}

#[tokio::test]
async fn test_disconnect_ends_session() {
    let h = Harness::with_defaults();
    h.transport(TransportEvent::Disconnected {
        reason: "left".to_string(),
    })
    .await;

    let end = timeout(Duration::from_secs(1), h.task).await.unwrap().unwrap();
    assert_eq!(end, SessionEnd::Disconnected("left".to_string()));
    assert!(h.handle.snapshot().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_ends_session() {
    let h = Harness::with_defaults();
    let end = h.task.await.unwrap();
    assert_eq!(end, SessionEnd::InactivityTimeout);
}
