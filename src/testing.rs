//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::capability::{
    AvatarSynthesizer, ConnectionState, DeviceError, EngineError, MediaKind, MediaTrack,
    RecognitionEvent, RecognitionEvents, RecognitionReason, Recognizer, RecognizerFactory,
    RelayCredentials, SpeakOutcome, SynthesisRequest, SynthesizerFactory, TransceiverDirection,
    TransportError, TransportEvent, TransportEvents, TransportFactory, TransportSession,
};
use crate::conversation::Turn;
use crate::llm::{GenerationError, ReplyGenerator};
use crate::presentation::{NoticeLevel, PresentationSink, SinkEvent};
use crate::session::{AvatarSelection, ConnectError, RelayTokenProvider, SpeechCredentials};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Recognizers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecognizerScript {
    created: Vec<Arc<FakeRecognizer>>,
    fail_create: Option<DeviceError>,
    fail_start: Option<DeviceError>,
    fail_stop: Option<DeviceError>,
    trailing: Option<(String, Duration)>,
    start_delay: Duration,
}

/// Recognizer factory whose recognizers are driven by the test.
#[derive(Clone, Default)]
pub struct FakeRecognizers {
    script: Arc<Mutex<RecognizerScript>>,
}

impl FakeRecognizers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` through the most recently created recognizer.
    pub fn emit(&self, event: RecognitionEvent) {
        match self.last() {
            Some(recognizer) => recognizer.events.emit(event),
            None => panic!("no recognizer has been created"),
        }
    }

    /// Emit a `RecognizedSpeech` final segment through the latest recognizer.
    pub fn emit_final(&self, text: &str) {
        self.emit(RecognitionEvent::Recognized {
            reason: RecognitionReason::RecognizedSpeech,
            text: text.to_string(),
        });
    }

    /// Every later stop delivers `text` as a final segment `delay` after the
    /// stop acknowledgement.
    pub fn set_trailing_final(&self, text: &str, delay: Duration) {
        lock(&self.script).trailing = Some((text.to_string(), delay));
    }

    /// Recognizers created from now on take `delay` to acknowledge a start.
    pub fn set_start_delay(&self, delay: Duration) {
        lock(&self.script).start_delay = delay;
    }

    /// The next `create` fails.
    pub fn fail_create(&self, error: DeviceError) {
        lock(&self.script).fail_create = Some(error);
    }

    /// The next recognizer created rejects `start_continuous`.
    pub fn fail_start(&self, error: DeviceError) {
        lock(&self.script).fail_start = Some(error);
    }

    /// The next recognizer created rejects `stop_continuous`.
    pub fn fail_stop(&self, error: DeviceError) {
        lock(&self.script).fail_stop = Some(error);
    }

    /// Recognizers that were started and not closed.
    pub fn live(&self) -> usize {
        lock(&self.script)
            .created
            .iter()
            .filter(|r| r.started() && !r.closed())
            .count()
    }

    pub fn created(&self) -> usize {
        lock(&self.script).created.len()
    }

    pub fn last(&self) -> Option<Arc<FakeRecognizer>> {
        lock(&self.script).created.last().cloned()
    }
}

impl RecognizerFactory for FakeRecognizers {
    fn create(&self, events: RecognitionEvents) -> Result<Arc<dyn Recognizer>, DeviceError> {
        let mut script = lock(&self.script);
        if let Some(error) = script.fail_create.take() {
            return Err(error);
        }
        let recognizer = Arc::new(FakeRecognizer {
            events,
            fail_start: Mutex::new(script.fail_start.take()),
            fail_stop: Mutex::new(script.fail_stop.take()),
            trailing: script.trailing.clone(),
            start_delay: script.start_delay,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        script.created.push(Arc::clone(&recognizer));
        Ok(recognizer)
    }
}

pub struct FakeRecognizer {
    events: RecognitionEvents,
    fail_start: Mutex<Option<DeviceError>>,
    fail_stop: Mutex<Option<DeviceError>>,
    trailing: Option<(String, Duration)>,
    start_delay: Duration,
    started: AtomicBool,
    closed: AtomicBool,
}

impl FakeRecognizer {
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn start_continuous(&self) -> Result<(), DeviceError> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if let Some(error) = lock(&self.fail_start).take() {
            return Err(error);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_continuous(&self) -> Result<(), DeviceError> {
        if let Some(error) = lock(&self.fail_stop).take() {
            return Err(error);
        }
        if let Some((text, delay)) = self.trailing.clone() {
            let events = self.events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                events.emit(RecognitionEvent::Recognized {
                    reason: RecognitionReason::RecognizedSpeech,
                    text,
                });
            });
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

struct TransportScript {
    opened: Vec<Arc<FakeTransport>>,
    auto_connect: bool,
    send_video: bool,
    fail_open: Option<TransportError>,
    fail_track_stop: bool,
}

/// Transport factory; by default every session reports `connected` and a
/// video track as soon as it is opened.
#[derive(Clone)]
pub struct FakeTransports {
    script: Arc<Mutex<TransportScript>>,
}

impl FakeTransports {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(TransportScript {
                opened: Vec::new(),
                auto_connect: true,
                send_video: true,
                fail_open: None,
                fail_track_stop: false,
            })),
        }
    }

    /// Sessions stay silent; the test emits state changes itself.
    pub fn manual(&self) {
        lock(&self.script).auto_connect = false;
    }

    /// Sessions connect but never deliver video.
    pub fn without_video(&self) {
        lock(&self.script).send_video = false;
    }

    pub fn fail_open(&self, error: TransportError) {
        lock(&self.script).fail_open = Some(error);
    }

    pub fn fail_track_stop(&self) {
        lock(&self.script).fail_track_stop = true;
    }

    pub fn opened(&self) -> usize {
        lock(&self.script).opened.len()
    }

    pub fn last(&self) -> Option<Arc<FakeTransport>> {
        lock(&self.script).opened.last().cloned()
    }
}

impl TransportFactory for FakeTransports {
    fn open(
        &self,
        _relay: &RelayCredentials,
        events: TransportEvents,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        let mut script = lock(&self.script);
        if let Some(error) = script.fail_open.take() {
            return Err(error);
        }
        let transport = Arc::new(FakeTransport {
            events,
            fail_track_stop: script.fail_track_stop,
            transceivers: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        });
        if script.auto_connect {
            transport.emit(TransportEvent::StateChanged(ConnectionState::Connected));
            if script.send_video {
                transport.emit(TransportEvent::TrackReceived(MediaKind::Video));
            }
        }
        script.opened.push(Arc::clone(&transport));
        Ok(transport)
    }
}

pub struct FakeTransport {
    events: TransportEvents,
    fail_track_stop: bool,
    transceivers: Mutex<Vec<MediaKind>>,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
    close_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn emit(&self, event: TransportEvent) {
        self.events.emit(event);
    }

    pub fn transceivers(&self) -> Vec<MediaKind> {
        lock(&self.transceivers).clone()
    }

    pub fn closed(&self) -> bool {
        self.close_calls.load(Ordering::SeqCst) > 0
    }

    pub fn all_tracks_stopped(&self) -> bool {
        lock(&self.tracks).iter().all(|t| t.stopped.load(Ordering::SeqCst))
    }
}

impl TransportSession for FakeTransport {
    fn add_transceiver(
        &self,
        kind: MediaKind,
        _direction: TransceiverDirection,
    ) -> Result<(), TransportError> {
        lock(&self.transceivers).push(kind);
        lock(&self.tracks).push(Arc::new(FakeTrack {
            kind,
            fail: self.fail_track_stop,
            stopped: AtomicBool::new(false),
        }));
        Ok(())
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        lock(&self.tracks)
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn MediaTrack>)
            .collect()
    }

    fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeTrack {
    kind: MediaKind,
    fail: bool,
    stopped: AtomicBool,
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stop(&self) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::Track {
                kind: self.kind,
                detail: "track already ended".into(),
            });
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Synthesizers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartBehavior {
    Ready,
    /// `start_avatar` never resolves.
    Hang,
    Fail(String),
}

struct SynthScript {
    created: Vec<Arc<FakeSynthesizer>>,
    start: StartBehavior,
    fail_close: bool,
    speech_duration: Duration,
    cancel_next: Option<String>,
    microphones: Option<FakeRecognizers>,
    overlaps: usize,
}

/// Synthesizer factory.  Each utterance takes `speech_duration` (1 s by
/// default) unless interrupted by `stop_speaking`.
#[derive(Clone)]
pub struct FakeSynthesizers {
    script: Arc<Mutex<SynthScript>>,
}

impl FakeSynthesizers {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(SynthScript {
                created: Vec::new(),
                start: StartBehavior::Ready,
                fail_close: false,
                speech_duration: Duration::from_secs(1),
                cancel_next: None,
                microphones: None,
                overlaps: 0,
            })),
        }
    }

    pub fn set_start(&self, behavior: StartBehavior) {
        lock(&self.script).start = behavior;
    }

    pub fn fail_close(&self) {
        lock(&self.script).fail_close = true;
    }

    pub fn set_speech_duration(&self, duration: Duration) {
        lock(&self.script).speech_duration = duration;
    }

    /// The next utterance is canceled by the engine with `detail`.
    pub fn cancel_next_speech(&self, detail: &str) {
        lock(&self.script).cancel_next = Some(detail.to_string());
    }

    /// Count utterances that start or end while any of `recognizers` is
    /// live.
    pub fn watch_for_overlap(&self, recognizers: &FakeRecognizers) {
        lock(&self.script).microphones = Some(recognizers.clone());
    }

    pub fn overlaps(&self) -> usize {
        lock(&self.script).overlaps
    }

    pub fn last(&self) -> Option<Arc<FakeSynthesizer>> {
        lock(&self.script).created.last().cloned()
    }

    fn check_overlap(&self) {
        let mut script = lock(&self.script);
        let live = script.microphones.as_ref().map_or(0, FakeRecognizers::live);
        if live > 0 {
            script.overlaps += 1;
        }
    }
}

impl SynthesizerFactory for FakeSynthesizers {
    fn create(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> Result<Arc<dyn AvatarSynthesizer>, EngineError> {
        let synthesizer = Arc::new(FakeSynthesizer {
            factory: self.clone(),
            avatar: request.avatar.clone(),
            spoken: Mutex::new(Vec::new()),
            interrupt: Notify::new(),
            close_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        });
        lock(&self.script).created.push(Arc::clone(&synthesizer));
        Ok(synthesizer)
    }
}

pub struct FakeSynthesizer {
    factory: FakeSynthesizers,
    avatar: AvatarSelection,
    spoken: Mutex<Vec<String>>,
    interrupt: Notify,
    close_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl FakeSynthesizer {
    pub fn avatar(&self) -> AvatarSelection {
        self.avatar.clone()
    }

    pub fn spoken(&self) -> Vec<String> {
        lock(&self.spoken).clone()
    }

    pub fn closed(&self) -> bool {
        self.close_calls() > 0
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvatarSynthesizer for FakeSynthesizer {
    async fn start_avatar(&self, _transport: Arc<dyn TransportSession>) -> Result<(), EngineError> {
        let behavior = lock(&self.factory.script).start.clone();
        match behavior {
            StartBehavior::Ready => Ok(()),
            StartBehavior::Hang => std::future::pending().await,
            StartBehavior::Fail(detail) => Err(EngineError(detail)),
        }
    }

    async fn speak_text(&self, text: &str) -> Result<SpeakOutcome, EngineError> {
        lock(&self.spoken).push(text.to_string());
        let (cancel, duration) = {
            let mut script = lock(&self.factory.script);
            (script.cancel_next.take(), script.speech_duration)
        };
        if let Some(detail) = cancel {
            return Ok(SpeakOutcome::Canceled { detail });
        }

        self.factory.check_overlap();
        let outcome = tokio::select! {
            _ = tokio::time::sleep(duration) => SpeakOutcome::Completed,
            _ = self.interrupt.notified() => SpeakOutcome::Canceled {
                detail: "interrupted".into(),
            },
        };
        self.factory.check_overlap();
        Ok(outcome)
    }

    async fn stop_speaking(&self) -> Result<(), EngineError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.interrupt.notify_waiters();
        Ok(())
    }

    fn close(&self) -> Result<(), EngineError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.factory.script).fail_close {
            return Err(EngineError("already closed".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeRelay {
    fail_status: Arc<Mutex<Option<u16>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with_status(&self, status: u16) {
        *lock(&self.fail_status) = Some(status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayTokenProvider for FakeRelay {
    async fn fetch(&self, _speech: &SpeechCredentials) -> Result<RelayCredentials, ConnectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *lock(&self.fail_status) {
            return Err(ConnectError::CredentialFetchFailed {
                status: Some(status),
                detail: format!("HTTP {status}"),
            });
        }
        Ok(RelayCredentials {
            urls: vec!["turn:relay.test:3478".into()],
            username: "test-user".into(),
            credential: "test-password".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Reply generator
// ---------------------------------------------------------------------------

struct GeneratorScript {
    replies: VecDeque<Result<String, GenerationError>>,
    requests: Vec<Vec<Turn>>,
    delay: Duration,
}

/// Replies from a queue (`"Sure."` once it is empty), after `delay`
/// (200 ms by default).
#[derive(Clone)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<GeneratorScript>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(GeneratorScript {
                replies: VecDeque::new(),
                requests: Vec::new(),
                delay: Duration::from_millis(200),
            })),
        }
    }

    pub fn push_reply(&self, reply: &str) {
        lock(&self.script).replies.push_back(Ok(reply.to_string()));
    }

    pub fn push_error(&self, error: GenerationError) {
        lock(&self.script).replies.push_back(Err(error));
    }

    pub fn set_delay(&self, delay: Duration) {
        lock(&self.script).delay = delay;
    }

    /// History windows received, in call order.
    pub fn requests(&self) -> Vec<Vec<Turn>> {
        lock(&self.script).requests.clone()
    }
}

#[async_trait]
impl ReplyGenerator for ScriptedGenerator {
    async fn generate(&self, history: &[Turn]) -> Result<String, GenerationError> {
        let (reply, delay) = {
            let mut script = lock(&self.script);
            script.requests.push(history.to_vec());
            let reply = script
                .replies
                .pop_front()
                .unwrap_or_else(|| Ok("Sure.".to_string()));
            (reply, script.delay)
        };
        tokio::time::sleep(delay).await;
        reply
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        lock(&self.events).clone()
    }

    pub fn notices(&self, level: NoticeLevel) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Notice { level: l, message } if *l == level => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Text of the most recent indicator update.
    pub fn indicator(&self) -> Option<String> {
        lock(&self.events).iter().rev().find_map(|e| match e {
            SinkEvent::Indicator { text, .. } => Some(text.clone()),
            _ => None,
        })
    }

    pub fn configuration_required(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| matches!(e, SinkEvent::ConfigurationRequired { .. }))
            .count()
    }

    /// Contents of every `TurnAdded` event, in order.
    pub fn turns(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                SinkEvent::TurnAdded(turn) => Some(turn.content().to_string()),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for RecordingSink {
    fn notify(&self, event: SinkEvent) {
        lock(&self.events).push(event);
    }
}
