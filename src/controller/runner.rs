//! Turn controller: drives the capture → reply → speech loop.
//!
//! [`TurnController`] owns the session manager, the history buffer, the
//! capture slot and the timers, and is the only code that mutates them.  It
//! runs as a single tokio task consuming two channels:
//!
//! * [`UserCommand`]s from any number of [`ControllerHandle`]s;
//! * internal [`Event`]s from capability subscribers, timers, and the tasks
//!   it spawns for long operations.
//!
//! # Turn flow
//!
//! ```text
//! PushToTalkDown ─▶ open capture ─▶ CaptureStarted ─▶ ListeningPushToTalk
//! PushToTalkUp   ─▶ stop + grace ─▶ CaptureFinished(text) ─┐
//! continuous final segment ─▶ release capture ─────────────┤
//! SubmitText ──────────────────────────────────────────────┤
//!                                                          ▼
//!                    record user turn, generate ─▶ ReplyReady (Thinking)
//!                      └─▶ record assistant turn, captures released ─▶ speak (Speaking)
//!                            └─▶ SpeechFinished ─▶ resume continuous after 500 ms, or Idle
//! ```
//!
//! Every spawned operation reports back tagged with the capture, session,
//! turn or timer epoch it belongs to; completions for anything no longer
//! current are dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::capability::{
    CancellationReason, DeviceError, MediaKind, RecognitionEvent, RecognitionReason,
    RecognizerFactory, TransportEvent,
};
use crate::capture::{CaptureId, CaptureKind, CaptureSession};
use crate::config::TimingConfig;
use crate::conversation::{HistoryBuffer, Role};
use crate::llm::{GenerationError, ReplyGenerator};
use crate::presentation::{
    AvatarStatus, Controls, IndicatorState, MicStatus, NoticeLevel, PresentationSink, SinkEvent,
};
use crate::session::{
    ConnectError, ConnectRequest, LiveSession, LiveSessionManager, SessionId, SessionPhase,
    SpeakError, TransportNotice,
};

use super::event::{Event, UserCommand};
use super::state::{ConversationState, Mode, SharedState};
use super::timers::{TimerPurpose, Timers};

const HINT_START_FIRST: &str = "Start the avatar first, then use voice controls";
const HINT_READY: &str = "Push to talk, type a message, or turn on continuous listening";
const WAIT_FOR_AVATAR: &str = "Please wait for the avatar to finish speaking";

// ---------------------------------------------------------------------------
// ControllerTiming
// ---------------------------------------------------------------------------

/// Delays applied by the controller itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTiming {
    pub capture_grace: Duration,
    pub resume_delay: Duration,
    pub restart_delay: Duration,
    pub hint_reset: Duration,
}

impl From<&TimingConfig> for ControllerTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            capture_grace: Duration::from_millis(config.capture_grace_ms),
            resume_delay: Duration::from_millis(config.resume_delay_ms),
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            hint_reset: Duration::from_millis(config.hint_reset_ms),
        }
    }
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

// ---------------------------------------------------------------------------
// ControllerHandle
// ---------------------------------------------------------------------------

/// Sends [`UserCommand`]s to a running controller.  Cheap to clone; the
/// controller shuts down once every handle is dropped.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<UserCommand>,
}

impl ControllerHandle {
    /// Returns `false` when the controller has stopped.
    pub fn send(&self, command: UserCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

// ---------------------------------------------------------------------------
// TurnController
// ---------------------------------------------------------------------------

/// External collaborators the controller drives.
pub struct Collaborators {
    pub sessions: LiveSessionManager,
    pub recognizers: Arc<dyn RecognizerFactory>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub sink: Arc<dyn PresentationSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterStart {
    Listen,
    /// Push-to-talk was released before the recognizer acknowledged.
    Submit,
}

enum CaptureSlot {
    Empty,
    Starting {
        id: CaptureId,
        kind: CaptureKind,
        then: AfterStart,
    },
    Active(CaptureSession),
    /// Push-to-talk stop and grace in progress.
    Stopping { id: CaptureId },
}

impl CaptureSlot {
    fn id(&self) -> Option<CaptureId> {
        match self {
            CaptureSlot::Empty => None,
            CaptureSlot::Starting { id, .. } | CaptureSlot::Stopping { id } => Some(*id),
            CaptureSlot::Active(session) => Some(session.id()),
        }
    }

    fn kind(&self) -> Option<CaptureKind> {
        match self {
            CaptureSlot::Empty => None,
            CaptureSlot::Starting { kind, .. } => Some(*kind),
            CaptureSlot::Active(session) => Some(session.kind()),
            CaptureSlot::Stopping { .. } => Some(CaptureKind::PushToTalk),
        }
    }
}

pub struct TurnController {
    events_tx: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    commands: mpsc::UnboundedReceiver<UserCommand>,

    state: SharedState,
    sessions: LiveSessionManager,
    recognizers: Arc<dyn RecognizerFactory>,
    generator: Arc<dyn ReplyGenerator>,
    sink: Arc<dyn PresentationSink>,
    connect: ConnectRequest,
    history: HistoryBuffer,
    timers: Timers,
    timing: ControllerTiming,

    mode: Mode,
    continuous: bool,
    /// Start requested while the previous session was settling.
    pending_start: bool,
    capture: CaptureSlot,
    /// Captures whose release has not completed; speech waits for them.
    releasing: HashSet<CaptureId>,
    /// Reply of the current turn, held until `releasing` drains.
    pending_speech: Option<String>,
    next_capture: u64,
    /// Ticket of the current turn; bumping it orphans in-flight work.
    turn: u64,
}

impl TurnController {
    /// Create a controller and the handle that drives it.
    pub fn new(
        collaborators: Collaborators,
        connect: ConnectRequest,
        history: HistoryBuffer,
        timing: ControllerTiming,
        state: SharedState,
    ) -> (Self, ControllerHandle) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let controller = Self {
            timers: Timers::new(events_tx.clone()),
            events_tx,
            events,
            commands,
            state,
            sessions: collaborators.sessions,
            recognizers: collaborators.recognizers,
            generator: collaborators.generator,
            sink: collaborators.sink,
            connect,
            history,
            timing,
            mode: Mode::Idle,
            continuous: false,
            pending_start: false,
            capture: CaptureSlot::Empty,
            releasing: HashSet::new(),
            pending_speech: None,
            next_capture: 0,
            turn: 0,
        };
        (
            controller,
            ControllerHandle {
                commands: commands_tx,
            },
        )
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until every [`ControllerHandle`] is dropped, then tear down.
    pub async fn run(mut self) {
        log::info!("controller: running");
        self.publish();
        self.refresh_controls();
        self.hint(HINT_START_FIRST);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(event) = self.events.recv() => self.on_event(event).await,
            }
        }

        log::info!("controller: command channel closed, shutting down");
        self.pending_start = false;
        self.teardown().await;

        // An abandoned connect job still owns its transport and synthesizer.
        while self.sessions.is_draining() {
            match self.events.recv().await {
                Some(event) => self.on_event(event).await,
                None => break,
            }
        }
    }

    async fn on_command(&mut self, command: UserCommand) {
        log::debug!("controller: command {command:?} in {:?}", self.mode);
        match command {
            UserCommand::Start => self.start().await,
            UserCommand::Stop => {
                self.pending_start = false;
                self.teardown().await;
            }
            UserCommand::PushToTalkDown => self.push_to_talk_down(),
            UserCommand::PushToTalkUp => {
                if self.mode == Mode::ListeningPushToTalk {
                    self.finish_push_to_talk();
                }
            }
            UserCommand::ToggleContinuous => self.toggle_continuous(),
            UserCommand::SubmitText(text) => self.submit_text(&text),
            UserCommand::ClearHistory => {
                self.history.clear();
                log::info!("controller: history cleared");
                self.sink.notify(SinkEvent::HistoryCleared);
                self.publish();
            }
        }
    }

    async fn on_event(&mut self, event: Event) {
        match event {
            Event::ConnectFinished { session, result } => {
                self.on_connect_finished(session, result).await
            }
            Event::Transport { session, event } => self.on_transport(session, event).await,
            Event::Recognition { capture, event } => self.on_recognition(capture, event),
            Event::CaptureStarted { capture, result } => self.on_capture_started(capture, result),
            Event::CaptureFinished { capture, result } => {
                self.on_capture_finished(capture, result)
            }
            Event::CaptureReleased { capture } => self.on_capture_released(capture),
            Event::ReplyReady { turn, result } => self.on_reply_ready(turn, result),
            Event::SpeechFinished { turn, result } => self.on_speech_finished(turn, result),
            Event::Timer { purpose, epoch } => self.on_timer(purpose, epoch).await,
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    async fn start(&mut self) {
        match self.sessions.phase() {
            SessionPhase::Disconnected => {}
            SessionPhase::Settling => {
                log::info!("controller: start deferred until the previous session settles");
                self.pending_start = true;
                self.notice(NoticeLevel::Info, "Waiting for the previous session to close");
                return;
            }
            _ => {
                self.notice(NoticeLevel::Warning, "The avatar is already running");
                return;
            }
        }

        let job = match self
            .sessions
            .prepare_connect(self.connect.clone(), self.events_tx.clone())
        {
            Ok(job) => job,
            Err(e) => return self.connect_failed(e).await,
        };

        let session = job.session();
        self.sink.notify(SinkEvent::Avatar(AvatarStatus::Connecting));
        self.refresh_controls();

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = job.run().await;
            let _ = tx.send(Event::ConnectFinished { session, result });
        });
    }

    async fn on_connect_finished(
        &mut self,
        session: SessionId,
        result: Result<LiveSession, ConnectError>,
    ) {
        match result {
            Ok(live) => match self.sessions.install(live) {
                Ok(phase) => {
                    if let Some(grace) = self.sessions.timing().media_grace {
                        self.timers.schedule(TimerPurpose::MediaGrace, grace);
                    }
                    if phase == SessionPhase::Ready {
                        self.on_ready();
                    } else {
                        self.refresh_controls();
                    }
                }
                Err(stale) => {
                    log::info!("controller: session {session} started after stop, releasing");
                    stale.teardown().await;
                    if self.sessions.drained(session) {
                        self.arm_settle();
                        self.refresh_controls();
                    }
                }
            },
            Err(e) if self.sessions.is_current(session) => {
                self.sessions.job_failed(session);
                self.connect_failed(e).await
            }
            Err(e) => {
                log::debug!("controller: abandoned connect {session} ended: {e}");
                if self.sessions.job_failed(session) {
                    self.arm_settle();
                    self.refresh_controls();
                }
            }
        }
    }

    async fn on_transport(&mut self, session: SessionId, event: TransportEvent) {
        match self.sessions.on_transport_event(session, event) {
            TransportNotice::Stale => {
                log::debug!("controller: dropping stale transport event {event:?} for {session}")
            }
            TransportNotice::Progress => log::debug!("controller: transport {session} connecting"),
            TransportNotice::Track(kind) => {
                if kind == MediaKind::Video {
                    self.timers.cancel(TimerPurpose::MediaGrace);
                }
                self.sink.notify(SinkEvent::TrackReceived(kind));
            }
            TransportNotice::Connected { ready: true } => self.on_ready(),
            TransportNotice::Connected { ready: false } => {
                log::debug!("controller: transport {session} connected before avatar start")
            }
            TransportNotice::Lost { failure: true } => {
                log::error!("controller: session {session} connection lost");
                self.teardown().await;
                self.sink.notify(SinkEvent::Avatar(AvatarStatus::Error));
                self.notice(NoticeLevel::Error, "Avatar connection lost");
            }
            TransportNotice::Lost { failure: false } => {
                log::info!("controller: session {session} closed");
                self.teardown().await;
            }
        }
    }

    fn on_ready(&mut self) {
        log::info!("controller: avatar ready");
        self.sink.notify(SinkEvent::Avatar(AvatarStatus::Connected));
        self.refresh_controls();
        self.indicate(IndicatorState::Ready, "Ready to chat");
        self.hint(HINT_READY);
    }

    async fn connect_failed(&mut self, error: ConnectError) {
        log::error!("controller: failed to start avatar: {error}");
        self.teardown().await;
        self.sink.notify(SinkEvent::Avatar(AvatarStatus::Error));
        self.notice(NoticeLevel::Error, format!("Failed to start avatar: {error}"));
        self.sink.notify(SinkEvent::ConfigurationRequired {
            reason: error.to_string(),
        });
    }

    /// Release every resource and return to `Idle`.  Safe to call in any
    /// state, any number of times.
    async fn teardown(&mut self) {
        for purpose in [
            TimerPurpose::ResumeContinuous,
            TimerPurpose::RestartContinuous,
            TimerPurpose::MediaGrace,
            TimerPurpose::HintReset,
        ] {
            self.timers.cancel(purpose);
        }

        self.release_capture();
        self.turn += 1;
        self.pending_speech = None;
        self.continuous = false;

        self.sessions.disconnect().await;
        self.arm_settle();

        self.set_mode(Mode::Idle);
        self.sink.notify(SinkEvent::Mic(MicStatus::Off));
        self.sink.notify(SinkEvent::Avatar(AvatarStatus::Disconnected));
        self.indicate(IndicatorState::Ready, "Ready");
        self.hint(HINT_START_FIRST);
        self.refresh_controls();
    }

    /// Start the settle delay once nothing of the old session remains.
    fn arm_settle(&mut self) {
        if self.sessions.awaiting_settle()
            && !self.timers.is_pending(TimerPurpose::SettleAfterDisconnect)
        {
            self.timers.schedule(
                TimerPurpose::SettleAfterDisconnect,
                self.sessions.timing().settle_delay,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    async fn on_timer(&mut self, purpose: TimerPurpose, epoch: u64) {
        if !self.timers.accept(purpose, epoch) {
            log::debug!("controller: dropping stale timer {purpose:?}");
            return;
        }

        match purpose {
            TimerPurpose::ResumeContinuous | TimerPurpose::RestartContinuous => {
                self.resume_continuous()
            }
            TimerPurpose::SettleAfterDisconnect => {
                self.sessions.settled();
                self.refresh_controls();
                if std::mem::take(&mut self.pending_start) {
                    self.start().await;
                }
            }
            TimerPurpose::MediaGrace => {
                let unavailable = self
                    .sessions
                    .current()
                    .and_then(|id| self.sessions.media_grace_elapsed(id));
                if let Some(error) = unavailable {
                    self.connect_failed(error).await;
                }
            }
            TimerPurpose::HintReset => {
                if self.mode == Mode::Idle {
                    self.indicate(IndicatorState::Ready, "Ready");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Voice input
    // -----------------------------------------------------------------------

    fn push_to_talk_down(&mut self) {
        if !self.sessions.is_ready() {
            self.notice(NoticeLevel::Warning, HINT_START_FIRST);
            return;
        }
        if self.continuous {
            self.notice(
                NoticeLevel::Info,
                "Push-to-talk is unavailable while continuous listening is on",
            );
            return;
        }
        match self.mode {
            Mode::ListeningPushToTalk => self.finish_push_to_talk(),
            Mode::Idle => self.begin_capture(CaptureKind::PushToTalk),
            _ => self.notice(NoticeLevel::Info, WAIT_FOR_AVATAR),
        }
    }

    fn toggle_continuous(&mut self) {
        if !self.sessions.is_ready() {
            self.notice(NoticeLevel::Warning, HINT_START_FIRST);
            return;
        }
        if self.mode == Mode::Speaking {
            self.notice(NoticeLevel::Warning, WAIT_FOR_AVATAR);
            return;
        }
        if !self.continuous && self.capture.kind() == Some(CaptureKind::PushToTalk) {
            self.notice(
                NoticeLevel::Warning,
                "Finish push-to-talk before turning on continuous listening",
            );
            return;
        }

        self.continuous = !self.continuous;
        log::info!("controller: continuous listening {}", on_off(self.continuous));

        if self.continuous {
            self.notice(NoticeLevel::Info, "Continuous listening on");
            self.resume_continuous();
        } else {
            self.notice(NoticeLevel::Info, "Continuous listening off");
            self.timers.cancel(TimerPurpose::ResumeContinuous);
            self.timers.cancel(TimerPurpose::RestartContinuous);
            if self.capture.kind() == Some(CaptureKind::Continuous) {
                self.release_capture();
            }
            if self.mode == Mode::ListeningContinuous {
                self.set_mode(Mode::Idle);
                self.sink.notify(SinkEvent::Mic(MicStatus::Off));
                self.indicate(IndicatorState::Ready, "Ready");
            }
        }
        self.publish();
    }

    fn resume_continuous(&mut self) {
        if !self.continuous || !self.sessions.is_ready() {
            return;
        }
        if self.mode != Mode::Idle || !matches!(self.capture, CaptureSlot::Empty) {
            log::debug!("controller: not resuming continuous listening in {:?}", self.mode);
            return;
        }
        self.begin_capture(CaptureKind::Continuous);
    }

    fn begin_capture(&mut self, kind: CaptureKind) {
        self.next_capture += 1;
        let id = CaptureId::new(self.next_capture);

        let session = match CaptureSession::open(
            id,
            kind,
            self.recognizers.as_ref(),
            self.events_tx.clone(),
            self.timing.capture_grace,
        ) {
            Ok(session) => session,
            Err(e) => return self.capture_failed(kind, e),
        };

        self.capture = CaptureSlot::Starting {
            id,
            kind,
            then: AfterStart::Listen,
        };
        let (mode, text) = match kind {
            CaptureKind::PushToTalk => {
                (Mode::ListeningPushToTalk, "Listening... (release when done)")
            }
            CaptureKind::Continuous => (Mode::ListeningContinuous, "Listening..."),
        };
        self.set_mode(mode);
        self.sink.notify(SinkEvent::Mic(MicStatus::Listening));
        self.indicate(IndicatorState::Listening, text);

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut session = session;
            let result = session.start().await.map(|()| session);
            let _ = tx.send(Event::CaptureStarted {
                capture: id,
                result,
            });
        });
    }

    fn on_capture_started(&mut self, capture: CaptureId, result: Result<CaptureSession, DeviceError>) {
        let (kind, then) = match self.capture {
            CaptureSlot::Starting { id, kind, then } if id == capture => (kind, then),
            _ => {
                log::debug!("capture {capture}: started after being released");
                match result {
                    Ok(session) => self.spawn_release(session),
                    Err(_) => self.on_capture_released(capture),
                }
                return;
            }
        };

        match result {
            Ok(session) => match then {
                AfterStart::Listen => self.capture = CaptureSlot::Active(session),
                AfterStart::Submit => self.stop_for_submit(session),
            },
            Err(e) => self.capture_failed(kind, e),
        }
    }

    fn capture_failed(&mut self, kind: CaptureKind, error: DeviceError) {
        log::error!("controller: microphone failed: {error}");
        self.capture = CaptureSlot::Empty;
        if kind == CaptureKind::Continuous {
            self.continuous = false;
            self.timers.cancel(TimerPurpose::ResumeContinuous);
            self.timers.cancel(TimerPurpose::RestartContinuous);
        }
        self.set_mode(Mode::Idle);
        self.sink.notify(SinkEvent::Mic(MicStatus::Off));
        self.notice(
            NoticeLevel::Error,
            format!("Could not start microphone. Please check permissions. ({error})"),
        );
        self.indicate(IndicatorState::Ready, "Ready");
    }

    fn finish_push_to_talk(&mut self) {
        match std::mem::replace(&mut self.capture, CaptureSlot::Empty) {
            CaptureSlot::Active(session) if session.kind() == CaptureKind::PushToTalk => {
                self.stop_for_submit(session)
            }
            CaptureSlot::Starting {
                id,
                kind: CaptureKind::PushToTalk,
                ..
            } => {
                self.capture = CaptureSlot::Starting {
                    id,
                    kind: CaptureKind::PushToTalk,
                    then: AfterStart::Submit,
                };
                self.enter_processing();
            }
            other => self.capture = other,
        }
    }

    fn stop_for_submit(&mut self, session: CaptureSession) {
        let id = session.id();
        self.capture = CaptureSlot::Stopping { id };
        self.enter_processing();

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = session.stop().await;
            let _ = tx.send(Event::CaptureFinished {
                capture: id,
                result,
            });
        });
    }

    fn enter_processing(&mut self) {
        self.set_mode(Mode::Thinking);
        self.sink.notify(SinkEvent::Mic(MicStatus::Off));
        self.indicate(IndicatorState::Thinking, "Processing...");
    }

    fn on_capture_finished(&mut self, capture: CaptureId, result: Result<String, DeviceError>) {
        if !matches!(self.capture, CaptureSlot::Stopping { id } if id == capture) {
            log::debug!("capture {capture}: dropping stale result");
            return;
        }
        self.capture = CaptureSlot::Empty;

        match result {
            Ok(text) if !text.is_empty() => self.dispatch_turn(text),
            Ok(_) => {
                log::info!("controller: no speech detected");
                self.set_mode(Mode::Idle);
                self.indicate(IndicatorState::Ready, "No speech detected. Try again.");
                self.timers
                    .schedule(TimerPurpose::HintReset, self.timing.hint_reset);
            }
            Err(e) => {
                log::warn!("controller: push-to-talk stop failed: {e}");
                self.set_mode(Mode::Idle);
                self.notice(NoticeLevel::Warning, format!("Microphone did not stop cleanly: {e}"));
                self.indicate(IndicatorState::Ready, "Ready");
            }
        }
    }

    fn on_recognition(&mut self, capture: CaptureId, event: RecognitionEvent) {
        if self.capture.id() != Some(capture) {
            log::debug!("capture {capture}: dropping stale recognition event");
            return;
        }

        match event {
            RecognitionEvent::Recognizing(text) => {
                if self.mode.is_listening() && !text.is_empty() {
                    self.indicate(IndicatorState::Listening, text);
                }
            }
            RecognitionEvent::Recognized {
                reason: RecognitionReason::RecognizedSpeech,
                text,
            } if !text.trim().is_empty() => {
                // A final may arrive before the start acknowledgement; the
                // capture is released once that lands.
                let continuous = self.mode == Mode::ListeningContinuous
                    && self.capture.kind() == Some(CaptureKind::Continuous);
                if continuous {
                    self.release_capture();
                    self.sink.notify(SinkEvent::Mic(MicStatus::Off));
                    self.dispatch_turn(text.trim().to_string());
                }
            }
            RecognitionEvent::Recognized { reason, .. } => {
                log::debug!("capture {capture}: final segment without text ({reason:?})")
            }
            RecognitionEvent::Canceled { reason, detail } => {
                self.on_capture_canceled(reason, detail.as_deref())
            }
        }
    }

    fn on_capture_canceled(&mut self, reason: CancellationReason, detail: Option<&str>) {
        let CaptureSlot::Active(session) = &mut self.capture else {
            log::debug!("controller: cancellation for a capture that is not listening");
            return;
        };
        let kind = session.kind();
        let message = session.on_cancel(reason, detail);

        match kind {
            CaptureKind::PushToTalk => {
                if let Some(message) = message {
                    self.capture = CaptureSlot::Empty;
                    self.set_mode(Mode::Idle);
                    self.sink.notify(SinkEvent::Mic(MicStatus::Off));
                    self.notice(NoticeLevel::Error, message);
                    self.indicate(IndicatorState::Ready, "Ready");
                }
            }
            CaptureKind::Continuous => {
                self.release_capture();
                if let Some(message) = message {
                    self.notice(NoticeLevel::Error, message);
                }
                self.set_mode(Mode::Idle);
                self.sink.notify(SinkEvent::Mic(MicStatus::Off));
                if self.continuous {
                    log::info!("controller: recognizer canceled, restarting continuous listening");
                    self.timers
                        .schedule(TimerPurpose::RestartContinuous, self.timing.restart_delay);
                }
            }
        }
    }

    /// Give up the current capture without producing an utterance.
    fn release_capture(&mut self) {
        match std::mem::replace(&mut self.capture, CaptureSlot::Empty) {
            CaptureSlot::Empty => {}
            CaptureSlot::Starting { id, .. } => {
                self.releasing.insert(id);
            }
            CaptureSlot::Active(session) => self.spawn_release(session),
            CaptureSlot::Stopping { id } => {
                log::debug!("capture {id}: abandoned while stopping")
            }
        }
    }

    fn spawn_release(&mut self, session: CaptureSession) {
        let id = session.id();
        self.releasing.insert(id);

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            session.release().await;
            let _ = tx.send(Event::CaptureReleased { capture: id });
        });
    }

    fn on_capture_released(&mut self, capture: CaptureId) {
        self.releasing.remove(&capture);
        if !self.releasing.is_empty() {
            return;
        }
        if let Some(text) = self.pending_speech.take() {
            if self.mode == Mode::Thinking {
                self.begin_speaking(text);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Typed input
    // -----------------------------------------------------------------------

    fn submit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.sessions.is_ready() {
            self.notice(NoticeLevel::Warning, HINT_START_FIRST);
            return;
        }
        if self.mode.is_busy() {
            self.notice(NoticeLevel::Warning, WAIT_FOR_AVATAR);
            return;
        }
        match self.capture.kind() {
            Some(CaptureKind::PushToTalk) => {
                self.notice(NoticeLevel::Warning, "Finish push-to-talk before sending text");
                return;
            }
            Some(CaptureKind::Continuous) => {
                self.release_capture();
                self.sink.notify(SinkEvent::Mic(MicStatus::Off));
            }
            None => {}
        }
        self.dispatch_turn(text.to_string());
    }

    // -----------------------------------------------------------------------
    // Reply and speech
    // -----------------------------------------------------------------------

    fn dispatch_turn(&mut self, text: String) {
        for purpose in [
            TimerPurpose::ResumeContinuous,
            TimerPurpose::RestartContinuous,
            TimerPurpose::HintReset,
        ] {
            self.timers.cancel(purpose);
        }

        self.turn += 1;
        self.pending_speech = None;
        let turn = self.turn;

        let user = self.history.record(Role::User, text);
        log::info!("controller: turn {turn}: user said {:?}", user.content());
        self.sink.notify(SinkEvent::TurnAdded(user));

        self.set_mode(Mode::Thinking);
        self.lock_state().error_message = None;
        self.indicate(IndicatorState::Thinking, "Thinking...");

        let window = self.history.window();
        let generator = Arc::clone(&self.generator);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = generator.generate(&window).await;
            let _ = tx.send(Event::ReplyReady { turn, result });
        });
    }

    fn on_reply_ready(&mut self, turn: u64, result: Result<String, GenerationError>) {
        if turn != self.turn || self.mode != Mode::Thinking {
            log::debug!("controller: dropping stale reply for turn {turn}");
            return;
        }

        match result {
            Ok(reply) => {
                let assistant = self.history.record(Role::Assistant, reply.clone());
                self.sink.notify(SinkEvent::TurnAdded(assistant));
                self.publish();
                self.begin_speaking(reply);
            }
            Err(e) => {
                log::error!("controller: reply generation failed: {e}");
                self.indicate(IndicatorState::Error, "Error occurred");
                self.notice(NoticeLevel::Error, format!("Error: {e}"));
                self.after_turn();
            }
        }
    }

    fn begin_speaking(&mut self, text: String) {
        if !matches!(self.capture, CaptureSlot::Empty) {
            self.release_capture();
        }
        if !self.releasing.is_empty() {
            log::debug!(
                "controller: speech waits for {} capture(s) to release",
                self.releasing.len()
            );
            self.pending_speech = Some(text);
            return;
        }

        let Some(speaker) = self.sessions.speaker() else {
            self.notice(NoticeLevel::Error, "Error: no live session");
            self.after_turn();
            return;
        };

        self.set_mode(Mode::Speaking);
        self.indicate(IndicatorState::Speaking, "Speaking...");

        let turn = self.turn;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = speaker.speak(&text).await;
            let _ = tx.send(Event::SpeechFinished { turn, result });
        });
    }

    fn on_speech_finished(&mut self, turn: u64, result: Result<(), SpeakError>) {
        if turn != self.turn || self.mode != Mode::Speaking {
            log::debug!("controller: dropping stale speech completion for turn {turn}");
            return;
        }
        if let Err(e) = result {
            log::error!("controller: speech failed: {e}");
            self.notice(NoticeLevel::Error, format!("Error: {e}"));
        }
        self.after_turn();
    }

    fn after_turn(&mut self) {
        self.set_mode(Mode::Idle);
        if self.continuous && self.sessions.is_ready() {
            self.timers
                .schedule(TimerPurpose::ResumeContinuous, self.timing.resume_delay);
        } else {
            self.indicate(IndicatorState::Ready, "Ready");
        }
    }

    // -----------------------------------------------------------------------
    // Presentation helpers
    // -----------------------------------------------------------------------

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            log::debug!("controller: {:?} → {:?}", self.mode, mode);
            self.mode = mode;
            self.sink.notify(SinkEvent::Mode(mode));
        }
        self.publish();
    }

    fn indicate(&self, state: IndicatorState, text: impl Into<String>) {
        let text = text.into();
        self.lock_state().indicator = text.clone();
        self.sink.notify(SinkEvent::Indicator { state, text });
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        if level == NoticeLevel::Error {
            self.lock_state().error_message = Some(message.clone());
        }
        self.sink.notify(SinkEvent::Notice { level, message });
    }

    fn hint(&self, text: &str) {
        self.sink.notify(SinkEvent::VoiceHint(text.to_string()));
    }

    fn refresh_controls(&self) {
        let phase = self.sessions.phase();
        self.sink.notify(SinkEvent::Controls(Controls {
            start: matches!(phase, SessionPhase::Disconnected | SessionPhase::Settling),
            stop: matches!(
                phase,
                SessionPhase::Connecting | SessionPhase::Live | SessionPhase::Ready
            ),
            voice: phase == SessionPhase::Ready,
        }));
        self.publish();
    }

    fn publish(&self) {
        let mut st = self.lock_state();
        st.mode = self.mode;
        st.session = self.sessions.phase();
        st.continuous = self.continuous;
        st.turns = self.history.len();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConversationState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
