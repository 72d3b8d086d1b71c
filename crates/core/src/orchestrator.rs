use crate::Command;
use crate::advisory::{AdvisoryChannel, AdvisoryLink, HintSlot, ServerMessage};
use crate::conversation::{ConversationState, SessionExport, Speaker, TurnRecord};
use crate::error::SessionError;
use crate::generic_types::ProviderEvent;
use crate::handoff::{HandoffDetector, HandoffTarget, strip_directives};
use crate::instructions::InstructionBuilder;
use crate::phase::{Phase, PhaseConfig, PhaseTimer};
use crate::playback::{AudioClock, AudioSink, MonotonicClock, Pcm16Decoder, PlaybackQueue, run_playback};
use crate::realtime_api::{MediaCapture, SpeechProvider};
use crate::reviewer::{QuestionReviewer, SelfCorrectionReviewer, review_and_log};
use crate::session::{MediaSender, StreamingSession};
use crate::transcript::TranscriptAggregator;
use crate::turn_selector::TurnSelector;
use chrono::Utc;
use rehearse_native_utils::audio::OUTPUT_PCM16_SAMPLE_RATE;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Tunables for one interview call.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub target_duration: Duration,
    /// Pause between closing one persona session and opening the next.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub closing_threshold: Duration,
    pub opening_window: Duration,
    pub completion_grace: Duration,
    pub rotation_cooldown: Duration,
    pub min_questions_before_rotation: u32,
    pub hint_ttl: Duration,
    pub hint_interval: Duration,
    pub hint_confidence_floor: f64,
    pub output_sample_rate: u32,
    /// Seed for persona draws; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            target_duration: Duration::from_secs(30 * 60),
            settle_delay: Duration::from_millis(250),
            poll_interval: Duration::from_secs(10),
            closing_threshold: Duration::from_secs(180),
            opening_window: Duration::from_secs(60),
            completion_grace: Duration::from_secs(5),
            rotation_cooldown: Duration::from_secs(5),
            min_questions_before_rotation: 2,
            hint_ttl: Duration::from_secs(30),
            hint_interval: Duration::from_secs(8),
            hint_confidence_floor: 0.6,
            output_sample_rate: OUTPUT_PCM16_SAMPLE_RATE,
            seed: None,
        }
    }
}

impl OrchestratorConfig {
    fn phase_config(&self) -> PhaseConfig {
        PhaseConfig {
            target: self.target_duration,
            closing_threshold: self.closing_threshold,
            opening_window: self.opening_window,
            poll_interval: self.poll_interval,
            completion_grace: self.completion_grace,
        }
    }
}

struct ControlInner {
    ended: watch::Sender<bool>,
    capture: Mutex<Option<Box<dyn MediaCapture>>>,
    session: Arc<StreamingSession>,
    playback: PlaybackQueue,
    media: MediaSender,
}

/// Handle the presentation layer keeps for mute and end-call.
#[derive(Clone)]
pub struct CallControl {
    inner: Arc<ControlInner>,
}

impl CallControl {
    /// Ends the call at once: capture stops, the live session is detached and
    /// closed in the background, and playback is released. Later calls do nothing.
    pub fn end_call(&self) {
        if self.inner.ended.send_replace(true) {
            return;
        }
        self.inner.media.set_muted(true);
        let capture = self
            .inner
            .capture
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut capture) = capture {
            capture.stop();
        }
        if let Some(session) = self.inner.session.detach() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = session.close().await {
                            tracing::warn!(error = %err, "closing live session on end call failed");
                        }
                    });
                }
                Err(_) => tracing::warn!("no runtime to close the live session on"),
            }
        }
        self.inner.playback.close();
        tracing::info!("call ended");
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.media.set_muted(muted);
    }

    pub fn is_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Drives one interview: routes provider events, keeps the transcript,
/// decides questions, executes handoffs once speech has drained, and runs
/// the phase clock.
///
/// Every decision is made on the single task running [`Orchestrator::run`],
/// so conversation state is never touched concurrently.
pub struct Orchestrator<Q: QuestionReviewer = SelfCorrectionReviewer> {
    config: OrchestratorConfig,
    state: ConversationState,
    selector: TurnSelector,
    reviewer: Q,
    aggregator: TranscriptAggregator,
    handoff: HandoffDetector,
    phase: PhaseTimer,
    hints: HintSlot,
    advisory: AdvisoryChannel,
    advisory_inbound: Option<mpsc::Receiver<ServerMessage>>,
    session: Arc<StreamingSession>,
    events: Option<mpsc::Receiver<ProviderEvent>>,
    playback: PlaybackQueue,
    playback_changes: watch::Receiver<u64>,
    sink: Arc<dyn AudioSink>,
    clock: Arc<dyn AudioClock>,
    control: CallControl,
    ended: watch::Receiver<bool>,
    commands: mpsc::Sender<Command>,
    /// Persona and instruction the selector wants next, applied at turn end
    /// unless the live persona hands off by itself.
    planned: Option<(usize, String)>,
    turn_complete: bool,
    speaking: bool,
    started: tokio::time::Instant,
    teardown_at: Option<tokio::time::Instant>,
}

impl Orchestrator<SelfCorrectionReviewer> {
    pub fn new(
        config: OrchestratorConfig,
        state: ConversationState,
        provider: Arc<dyn SpeechProvider>,
        sink: Arc<dyn AudioSink>,
        commands: mpsc::Sender<Command>,
    ) -> (Self, CallControl) {
        Self::with_reviewer(config, state, provider, sink, commands, SelfCorrectionReviewer)
    }
}

impl<Q: QuestionReviewer> Orchestrator<Q> {
    pub fn with_reviewer(
        config: OrchestratorConfig,
        state: ConversationState,
        provider: Arc<dyn SpeechProvider>,
        sink: Arc<dyn AudioSink>,
        commands: mpsc::Sender<Command>,
        reviewer: Q,
    ) -> (Self, CallControl) {
        let session = Arc::new(StreamingSession::new(provider, config.settle_delay));
        let playback = PlaybackQueue::new(Arc::new(Pcm16Decoder::new(config.output_sample_rate)));
        let (ended_tx, ended) = watch::channel(false);
        let control = CallControl {
            inner: Arc::new(ControlInner {
                ended: ended_tx,
                capture: Mutex::new(None),
                session: session.clone(),
                playback: playback.clone(),
                media: session.media_sender(),
            }),
        };
        let selector = TurnSelector::for_role(&state.candidate.target_role, config.seed)
            .with_hint_floor(config.hint_confidence_floor);

        let orchestrator = Self {
            selector,
            reviewer,
            aggregator: TranscriptAggregator::new(),
            handoff: HandoffDetector::new(config.rotation_cooldown, config.min_questions_before_rotation),
            phase: PhaseTimer::new(config.phase_config()),
            hints: HintSlot::new(config.hint_ttl, config.hint_interval),
            advisory: AdvisoryChannel::disconnected(),
            advisory_inbound: None,
            session,
            events: None,
            playback_changes: playback.subscribe(),
            playback,
            sink,
            clock: Arc::new(MonotonicClock::new()),
            control: control.clone(),
            ended,
            commands,
            planned: None,
            turn_complete: false,
            speaking: false,
            started: tokio::time::Instant::now(),
            teardown_at: None,
            state,
            config,
        };
        (orchestrator, control)
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase.phase()
    }

    fn emit(&self, command: Command) {
        if let Err(err) = self.commands.try_send(command) {
            tracing::warn!(error = %err, "presentation command dropped");
        }
    }

    /// Starts capture, connects the advisor, and brings the opening persona live.
    ///
    /// Capture failure is the one unrecoverable start error. If the opening
    /// persona's handshake fails the call stays up without a live persona and
    /// the conversation state is left as it was.
    pub async fn start(
        &mut self,
        mut capture: Box<dyn MediaCapture>,
        advisory: Option<AdvisoryLink>,
    ) -> Result<(), SessionError> {
        if self.control.is_ended() {
            return Err(SessionError::Ended);
        }
        capture.start(self.session.media_sender())?;
        *self
            .control
            .inner
            .capture
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(capture);

        tokio::spawn(run_playback(self.playback.clone(), self.clock.clone(), self.sink.clone()));

        if let Some(link) = advisory {
            self.advisory = AdvisoryChannel::new(link.outbound);
            self.advisory_inbound = Some(link.inbound);
            self.advisory.init(&self.state.candidate, self.state.personas());
        }

        // The opening question is committed only once its persona is live.
        let mut opened = self.state.clone();
        let first = self.selector.determine_next_question(&mut opened, None, false);
        let instruction = InstructionBuilder::new(&opened.candidate, opened.personas(), first.persona_index)
            .topic(&first.topic, first.depth, false)
            .opening(true)
            .build();
        let persona = opened.personas()[first.persona_index].clone();
        tracing::info!(
            session = %self.state.session_id,
            persona = %persona.id,
            topic = %first.topic,
            "starting interview"
        );

        self.started = tokio::time::Instant::now();
        match self.session.activate(&persona, instruction).await {
            Ok(events) => {
                self.state = opened;
                self.events = Some(events);
                self.set_active(first.persona_index);
            }
            Err(err) => {
                tracing::error!(error = %err, persona = %persona.id, "opening persona did not come live, call stays up");
            }
        }
        Ok(())
    }

    fn set_active(&mut self, index: usize) {
        self.state.active_persona_index = index;
        let name = self.state.active_persona().name.clone();
        self.emit(Command::ActiveSpeaker { index, name });
    }

    /// Runs until the call ends, then returns the final export.
    pub async fn run(mut self) -> SessionExport {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.ended.borrow() {
                break;
            }
            let awaiting_drain = self.turn_complete && self.handoff.pending().is_some();
            let teardown_at = self.teardown_at;

            tokio::select! {
                _ = self.ended.changed() => {}
                event = recv_or_pending(&mut self.events) => match event {
                    Some(event) => self.on_provider_event(event),
                    None => {
                        tracing::warn!("live session event stream ended");
                        self.events = None;
                    }
                },
                message = recv_or_pending(&mut self.advisory_inbound) => match message {
                    Some(message) => self.on_advisory_message(message),
                    None => {
                        tracing::warn!("advisory channel disconnected, continuing without hints");
                        self.advisory_inbound = None;
                        self.advisory.disconnect();
                    }
                },
                _ = self.playback.wait_drained(self.clock.as_ref()), if awaiting_drain => {
                    self.execute_handoff().await;
                }
                _ = self.playback_changes.changed() => {}
                _ = ticker.tick() => self.poll_phase(),
                _ = tokio::time::sleep_until(teardown_at.unwrap_or_else(tokio::time::Instant::now)), if teardown_at.is_some() => {
                    tracing::info!("interview complete, tearing down");
                    break;
                }
            }

            self.refresh_speaking();
        }

        self.finish().await
    }

    fn refresh_speaking(&mut self) {
        let speaking = self.playback.is_speaking(self.clock.now());
        if speaking != self.speaking {
            self.speaking = speaking;
            self.emit(Command::Speaking(speaking));
        }
    }

    fn on_provider_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::TextDelta(delta) => {
                self.turn_complete = false;
                let speaker = Speaker::Persona(self.state.active_persona().id.clone());
                if let Some(done) = self.aggregator.push(speaker.clone(), &delta, Utc::now()) {
                    self.finalize(done);
                }
                if let Some(raw) = self.aggregator.pending_text(&speaker).map(str::to_string) {
                    self.handoff
                        .scan(&raw, self.state.personas(), self.state.active_persona_index);
                    self.show_interim(speaker, strip_directives(&raw));
                }
            }
            ProviderEvent::InputTranscript(delta) => {
                if let Some(done) = self.aggregator.push(Speaker::Participant, &delta, Utc::now()) {
                    self.finalize(done);
                }
                if let Some(raw) = self.aggregator.pending_text(&Speaker::Participant) {
                    let text = raw.trim().to_string();
                    self.show_interim(Speaker::Participant, text);
                }
            }
            ProviderEvent::Audio(chunk) => {
                self.turn_complete = false;
                self.playback.enqueue(chunk);
            }
            ProviderEvent::Interrupted => {
                self.playback.interrupt(self.clock.now());
            }
            ProviderEvent::TurnComplete => {
                self.turn_complete = true;
                if self.handoff.pending().is_none() {
                    if let Some((index, _)) = &self.planned {
                        if *index != self.state.active_persona_index {
                            self.handoff.latch(HandoffTarget::Persona(*index));
                        }
                    }
                }
            }
            ProviderEvent::Error(message) => {
                tracing::warn!(%message, "live session reported an error");
            }
            ProviderEvent::Closed => {
                tracing::info!("live session closed by provider");
            }
        }
    }

    fn on_advisory_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Initialized => tracing::info!("advisor initialized"),
            ServerMessage::OrchestrationHint(hint) => {
                tracing::debug!(topic = %hint.suggested_topic, confidence = hint.confidence, "hint received");
                self.hints.store(hint, Instant::now());
            }
            ServerMessage::InterviewPhaseChange {
                phase,
                should_start_closing,
                ..
            } => {
                tracing::debug!(%phase, should_start_closing, "advisor phase change");
                if should_start_closing {
                    self.phase.force_closing();
                    self.poll_phase();
                }
            }
            ServerMessage::InterviewComplete {
                question_count,
                total_duration,
                ..
            } => tracing::info!(question_count, total_duration, "advisor reports interview complete"),
            ServerMessage::TimeUpdate { remaining_seconds, .. } => {
                tracing::trace!(remaining_seconds, "advisor time update");
            }
            ServerMessage::Error { message } => tracing::warn!(%message, "advisor error"),
        }
    }

    fn display_name(&self, speaker: &Speaker) -> String {
        match speaker {
            Speaker::Persona(id) => self
                .state
                .persona_by_id(id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| id.clone()),
            Speaker::Participant if self.state.candidate.name.is_empty() => "Candidate".to_string(),
            Speaker::Participant => self.state.candidate.name.clone(),
        }
    }

    fn show_interim(&self, speaker: Speaker, text: String) {
        if text.is_empty() {
            return;
        }
        let display_name = self.display_name(&speaker);
        self.emit(Command::InterimLine {
            speaker,
            display_name,
            text,
        });
    }

    fn finalize(&mut self, mut record: TurnRecord) {
        if !record.speaker.is_participant() {
            record.text = strip_directives(&record.text);
        }
        if record.text.is_empty() {
            return;
        }
        let display_name = self.display_name(&record.speaker);

        self.emit(Command::TranscriptLine {
            speaker: record.speaker.clone(),
            display_name: display_name.clone(),
            text: record.text.clone(),
        });
        let persona_name = (!record.speaker.is_participant()).then_some(display_name.as_str());
        self.advisory.mirror(&record, persona_name);

        let is_participant = record.speaker.is_participant();
        let text = record.text.clone();
        self.state.append_turn(record);

        if is_participant {
            self.on_participant_answer();
        } else {
            review_and_log(&self.reviewer, &mut self.state, &text);
        }
    }

    fn on_participant_answer(&mut self) {
        self.phase.mark_engaged();
        let hint = self.hints.take_fresh(Instant::now());
        let closing = matches!(self.phase.phase(), Phase::Closing | Phase::Completed);
        let next = self
            .selector
            .determine_next_question(&mut self.state, hint.as_ref(), closing);

        if next.persona_index == self.state.active_persona_index {
            self.planned = None;
            self.session.steer(&next.guidance);
        } else {
            self.planned = Some((next.persona_index, next.instruction));
        }
    }

    async fn execute_handoff(&mut self) {
        let current = self.state.active_persona_index;
        let Some(next) = self.handoff.take_decision(
            current,
            self.state.personas().len(),
            self.state.questions_asked_by(current),
            Instant::now(),
        ) else {
            return;
        };

        if let Some(done) = self.aggregator.flush() {
            self.finalize(done);
        }

        let closing = matches!(self.phase.phase(), Phase::Closing | Phase::Completed);
        let instruction = match self.planned.take() {
            Some((index, instruction)) if index == next && !closing => instruction,
            _ => {
                let topic = self.state.current_topic.clone().unwrap_or_default();
                InstructionBuilder::new(&self.state.candidate, self.state.personas(), next)
                    .topic(&topic, self.state.depth_level(), false)
                    .closing(closing)
                    .build()
            }
        };
        let persona = self.state.personas()[next].clone();
        tracing::info!(from = current, to = next, persona = %persona.id, "handing off");

        match self.session.activate(&persona, instruction).await {
            Ok(events) => {
                if *self.ended.borrow() {
                    if let Some(session) = self.session.detach() {
                        if let Err(err) = session.close().await {
                            tracing::warn!(error = %err, "closing session opened after call end failed");
                        }
                    }
                    return;
                }
                self.playback.interrupt(self.clock.now());
                self.events = Some(events);
                self.turn_complete = false;
                self.set_active(next);
            }
            Err(SessionError::ActivationInFlight) => {
                tracing::debug!(persona = %persona.id, "handoff skipped, another activation is running");
            }
            Err(err) => {
                tracing::error!(error = %err, persona = %persona.id, "handoff aborted");
                self.events = None;
            }
        }
    }

    fn poll_phase(&mut self) {
        let tick = self.phase.poll(self.started.elapsed());
        let remaining_secs = tick.remaining.as_secs();
        self.emit(Command::TimeUpdate {
            phase: tick.phase,
            remaining_secs,
        });

        let Some(phase) = tick.transition else {
            return;
        };
        self.emit(Command::PhaseChanged { phase, remaining_secs });
        match phase {
            Phase::Closing => {
                let guidance = InstructionBuilder::new(
                    &self.state.candidate,
                    self.state.personas(),
                    self.state.active_persona_index,
                )
                .closing(true)
                .guidance();
                self.session.steer(&guidance);
            }
            Phase::Completed => {
                self.teardown_at = Some(tokio::time::Instant::now() + self.config.completion_grace);
            }
            Phase::Opening | Phase::Active => {}
        }
    }

    async fn finish(mut self) -> SessionExport {
        self.control.end_call();
        if let Some(done) = self.aggregator.flush() {
            self.finalize(done);
        }
        self.handoff.clear();
        self.advisory.disconnect();

        let export = self.state.export();
        tracing::info!(
            session = %export.session_id,
            questions = export.question_count,
            topics = export.topics_covered.len(),
            self_corrections = export.self_corrections.len(),
            "session exported"
        );
        if self
            .commands
            .send(Command::SessionEnded(Box::new(export.clone())))
            .await
            .is_err()
        {
            tracing::debug!("presentation layer gone before session end");
        }
        export
    }
}
