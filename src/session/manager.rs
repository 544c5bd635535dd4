//! Live session lifecycle: connect, readiness tracking, speech, teardown.
//!
//! # Phases
//!
//! ```text
//! Disconnected ──prepare_connect──▶ Connecting ──install──▶ Live ──transport connected──▶ Ready
//!       ▲                               │                    │                              │
//!       └──settled◀── Settling ◀────────┴──── disconnect ────┴──────────────────────────────┘
//! ```
//!
//! Connecting is split in two so the turn controller never blocks on the
//! network: [`LiveSessionManager::prepare_connect`] validates and reserves a
//! [`SessionId`], and the returned [`ConnectJob`] runs on its own task.  The
//! finished [`LiveSession`] is handed back through
//! [`install`](LiveSessionManager::install), which refuses it when the
//! reservation has since been abandoned.
//!
//! Abandoning a reservation signals its job to give up.  Until the job has
//! reported back the manager stays in [`SessionPhase::Settling`] without
//! starting the settle delay, so an abandoned transport and synthesizer are
//! always released before the next session is created.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capability::{
    AvatarSynthesizer, ConnectionState, MediaKind, SpeakOutcome, SynthesisRequest,
    SynthesizerFactory, TransceiverDirection, TransportEvent, TransportEvents, TransportFactory,
    TransportSession,
};
use crate::controller::Event;
use crate::session::{AvatarSelection, ConnectError, RelayTokenProvider, SpeakError};

// ---------------------------------------------------------------------------
// Identifiers and requests
// ---------------------------------------------------------------------------

/// Identifies one session; events tagged with an older id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Speech service subscription.
#[derive(Clone, PartialEq, Eq)]
pub struct SpeechCredentials {
    pub key: String,
    pub region: String,
}

impl SpeechCredentials {
    pub fn new(key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            region: region.into(),
        }
    }

    /// Fail with [`ConnectError::MissingCredentials`] naming the first
    /// empty field.
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.key.trim().is_empty() {
            return Err(ConnectError::MissingCredentials("speech key".into()));
        }
        if self.region.trim().is_empty() {
            return Err(ConnectError::MissingCredentials("speech region".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for SpeechCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechCredentials")
            .field("key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Chat-completion endpoint the replies come from.
///
/// Not used by the session itself, but a session that cannot produce
/// replies is not worth connecting, so it is checked at the same time.
#[derive(Clone, PartialEq, Eq)]
pub struct ReplyCredentials {
    pub endpoint: String,
    pub api_key: String,
}

impl ReplyCredentials {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConnectError::MissingCredentials("reply endpoint".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConnectError::MissingCredentials("reply API key".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for ReplyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyCredentials")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Everything needed to bring up one session.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub speech: SpeechCredentials,
    pub reply: ReplyCredentials,
    pub voice: String,
    pub avatar: AvatarSelection,
}

/// Timing knobs for the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Bound on the avatar's startup handshake.
    pub startup_timeout: Duration,
    /// How long to wait for inbound video after connecting; `None` disables
    /// the unavailable-avatar check.
    pub media_grace: Option<Duration>,
    /// Pause after teardown before another connect is allowed.
    pub settle_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            media_grace: Some(Duration::from_secs(15)),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    /// Avatar started; waiting for the transport to report `connected`.
    Live,
    /// Transport connected; voice controls may be used.
    Ready,
    /// Torn down; waiting out the settle delay.
    Settling,
}

/// What a transport event means for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportNotice {
    /// The event belongs to a session that no longer exists.
    Stale,
    /// Informational only.
    Progress,
    /// The transport is connected.  `ready` is `false` while the connect
    /// job is still running; readiness is reported again on install.
    Connected { ready: bool },
    /// An inbound track arrived.
    Track(MediaKind),
    /// The connection ended.  `failure` distinguishes
    /// `disconnected`/`failed` from a normal `closed`.
    Lost { failure: bool },
}

// ---------------------------------------------------------------------------
// LiveSession / Speaker
// ---------------------------------------------------------------------------

/// The live pairing of a transport session and a speech-output engine.
pub struct LiveSession {
    id: SessionId,
    avatar: AvatarSelection,
    transport: Arc<dyn TransportSession>,
    synthesizer: Arc<dyn AvatarSynthesizer>,
}

impl LiveSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn avatar(&self) -> &AvatarSelection {
        &self.avatar
    }

    pub fn speaker(&self) -> Speaker {
        Speaker {
            session: self.id,
            synthesizer: Arc::clone(&self.synthesizer),
        }
    }

    /// Release everything the session holds.  Individual failures are
    /// logged and do not stop the remaining steps.
    pub async fn teardown(self) {
        release_parts(self.id, Some(&self.synthesizer), Some(&self.transport)).await;
    }
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("id", &self.id)
            .field("avatar", &self.avatar)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle used to speak through a session from another task.
#[derive(Clone)]
pub struct Speaker {
    session: SessionId,
    synthesizer: Arc<dyn AvatarSynthesizer>,
}

impl Speaker {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Speak `text` and wait for the utterance to finish.
    pub async fn speak(&self, text: &str) -> Result<(), SpeakError> {
        match self.synthesizer.speak_text(text).await? {
            SpeakOutcome::Completed => {
                log::debug!("session {}: utterance completed", self.session);
                Ok(())
            }
            SpeakOutcome::Canceled { detail } => {
                log::error!("session {}: speech canceled: {detail}", self.session);
                Err(SpeakError::Canceled { detail })
            }
        }
    }
}

async fn release_parts(
    id: SessionId,
    synthesizer: Option<&Arc<dyn AvatarSynthesizer>>,
    transport: Option<&Arc<dyn TransportSession>>,
) {
    if let Some(synthesizer) = synthesizer {
        if let Err(e) = synthesizer.stop_speaking().await {
            log::warn!("session {id}: stop speaking failed during teardown: {e}");
        }
        if let Err(e) = synthesizer.close() {
            log::warn!("session {id}: closing synthesizer failed: {e}");
        }
    }

    if let Some(transport) = transport {
        for track in transport.tracks() {
            if let Err(e) = track.stop() {
                log::warn!("session {id}: stopping {} track failed: {e}", track.kind());
            }
        }
        if let Err(e) = transport.close() {
            log::warn!("session {id}: closing transport failed: {e}");
        }
    }

    log::info!("session {id}: released");
}

// ---------------------------------------------------------------------------
// ConnectJob
// ---------------------------------------------------------------------------

/// The network-bound half of a connect, runnable on its own task.
pub struct ConnectJob {
    id: SessionId,
    request: ConnectRequest,
    relay: Arc<dyn RelayTokenProvider>,
    transports: Arc<dyn TransportFactory>,
    synthesizers: Arc<dyn SynthesizerFactory>,
    events: TransportEvents,
    startup_timeout: Duration,
    abandoned: CancellationToken,
}

impl ConnectJob {
    pub fn session(&self) -> SessionId {
        self.id
    }

    pub fn avatar(&self) -> &AvatarSelection {
        &self.request.avatar
    }

    /// Fetch relay credentials, open the transport, and start the avatar.
    ///
    /// Anything created before a failure is released before returning.
    /// When the reservation is abandoned while waiting on the network the
    /// job releases what it holds and fails with [`ConnectError::Abandoned`].
    pub async fn run(self) -> Result<LiveSession, ConnectError> {
        let id = self.id;
        let abandoned = self.abandoned;

        log::info!("session {id}: fetching relay credentials");
        let relay = tokio::select! {
            fetched = self.relay.fetch(&self.request.speech) => fetched?,
            _ = abandoned.cancelled() => {
                log::info!("session {id}: abandoned before the relay answered");
                return Err(ConnectError::Abandoned);
            }
        };

        let transport = self.transports.open(&relay, self.events.clone())?;
        for kind in [MediaKind::Video, MediaKind::Audio] {
            if let Err(e) = transport.add_transceiver(kind, TransceiverDirection::SendRecv) {
                release_parts(id, None, Some(&transport)).await;
                return Err(e.into());
            }
        }

        let request = SynthesisRequest {
            speech: &self.request.speech,
            voice: &self.request.voice,
            avatar: &self.request.avatar,
        };
        let synthesizer = match self.synthesizers.create(&request) {
            Ok(s) => s,
            Err(e) => {
                release_parts(id, None, Some(&transport)).await;
                return Err(e.into());
            }
        };

        log::info!("session {id}: starting avatar {}", self.request.avatar);
        let started = tokio::select! {
            started = tokio::time::timeout(
                self.startup_timeout,
                synthesizer.start_avatar(Arc::clone(&transport)),
            ) => started,
            _ = abandoned.cancelled() => {
                log::info!("session {id}: abandoned while the avatar was starting");
                release_parts(id, Some(&synthesizer), Some(&transport)).await;
                return Err(ConnectError::Abandoned);
            }
        };

        match started {
            Ok(Ok(())) => Ok(LiveSession {
                id,
                avatar: self.request.avatar,
                transport,
                synthesizer,
            }),
            Ok(Err(e)) => {
                log::error!("session {id}: avatar failed to start: {e}");
                release_parts(id, Some(&synthesizer), Some(&transport)).await;
                Err(e.into())
            }
            Err(_) => {
                log::error!(
                    "session {id}: avatar {} did not start within {:?}",
                    self.request.avatar,
                    self.startup_timeout
                );
                release_parts(id, Some(&synthesizer), Some(&transport)).await;
                Err(ConnectError::StartupTimeout {
                    avatar: self.request.avatar,
                    timeout: self.startup_timeout,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LiveSessionManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct LinkFlags {
    connected: bool,
    video: bool,
}

enum Slot {
    Empty,
    Connecting {
        id: SessionId,
        flags: LinkFlags,
        abandon: CancellationToken,
    },
    Live {
        session: LiveSession,
        flags: LinkFlags,
    },
    /// Abandoned while connecting; the job still owns whatever it created.
    Draining { id: SessionId },
    Settling,
}

/// Owns the single session handle.
pub struct LiveSessionManager {
    relay: Arc<dyn RelayTokenProvider>,
    transports: Arc<dyn TransportFactory>,
    synthesizers: Arc<dyn SynthesizerFactory>,
    timing: SessionTiming,
    slot: Slot,
    next_id: u64,
}

impl LiveSessionManager {
    pub fn new(
        relay: Arc<dyn RelayTokenProvider>,
        transports: Arc<dyn TransportFactory>,
        synthesizers: Arc<dyn SynthesizerFactory>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            relay,
            transports,
            synthesizers,
            timing,
            slot: Slot::Empty,
            next_id: 0,
        }
    }

    pub fn timing(&self) -> SessionTiming {
        self.timing
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.slot {
            Slot::Empty => SessionPhase::Disconnected,
            Slot::Connecting { .. } => SessionPhase::Connecting,
            Slot::Live { flags, .. } if flags.connected => SessionPhase::Ready,
            Slot::Live { .. } => SessionPhase::Live,
            Slot::Draining { .. } | Slot::Settling => SessionPhase::Settling,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    /// Id of the connecting or live session, if any.
    pub fn current(&self) -> Option<SessionId> {
        match &self.slot {
            Slot::Connecting { id, .. } => Some(*id),
            Slot::Live { session, .. } => Some(session.id),
            Slot::Empty | Slot::Draining { .. } | Slot::Settling => None,
        }
    }

    pub fn is_current(&self, id: SessionId) -> bool {
        self.current() == Some(id)
    }

    /// `true` while an abandoned connect job has not yet reported back.
    pub fn is_draining(&self) -> bool {
        matches!(self.slot, Slot::Draining { .. })
    }

    /// `true` once everything is released and only the settle delay
    /// remains.
    pub fn awaiting_settle(&self) -> bool {
        matches!(self.slot, Slot::Settling)
    }

    /// Validate `request` and reserve a session id.
    ///
    /// The returned job must be run and its result passed to
    /// [`install`](Self::install).
    pub fn prepare_connect(
        &mut self,
        request: ConnectRequest,
        tx: mpsc::UnboundedSender<Event>,
    ) -> Result<ConnectJob, ConnectError> {
        if !matches!(self.slot, Slot::Empty) {
            return Err(ConnectError::SessionActive);
        }
        request.speech.validate()?;
        request.reply.validate()?;

        self.next_id += 1;
        let id = SessionId(self.next_id);
        let request = ConnectRequest {
            avatar: request.avatar.validated(),
            ..request
        };

        let abandon = CancellationToken::new();
        let abandoned = abandon.clone();
        self.slot = Slot::Connecting {
            id,
            flags: LinkFlags::default(),
            abandon,
        };
        log::info!("session {id}: connecting as {}", request.avatar);

        Ok(ConnectJob {
            id,
            request,
            relay: Arc::clone(&self.relay),
            transports: Arc::clone(&self.transports),
            synthesizers: Arc::clone(&self.synthesizers),
            events: TransportEvents::new(id, tx),
            startup_timeout: self.timing.startup_timeout,
            abandoned,
        })
    }

    /// Adopt the result of a finished [`ConnectJob`].
    ///
    /// Returns the session back when its reservation is gone (the user
    /// stopped while connecting); the caller must tear it down.
    pub fn install(&mut self, session: LiveSession) -> Result<SessionPhase, LiveSession> {
        match &self.slot {
            Slot::Connecting { id, flags, .. } if *id == session.id => {
                let flags = *flags;
                log::info!("session {id}: avatar started");
                self.slot = Slot::Live { session, flags };
                Ok(self.phase())
            }
            _ => Err(session),
        }
    }

    /// The job for session `id` failed and released what it created.
    ///
    /// Moves a current or abandoned reservation to
    /// [`SessionPhase::Settling`]; returns `false` for anything else.
    pub fn job_failed(&mut self, id: SessionId) -> bool {
        let reserved = match &self.slot {
            Slot::Connecting { id: current, .. } | Slot::Draining { id: current } => {
                *current == id
            }
            _ => false,
        };
        if reserved {
            self.slot = Slot::Settling;
        }
        reserved
    }

    /// The abandoned job for session `id` has finished and anything it
    /// produced has been torn down.
    pub fn drained(&mut self, id: SessionId) -> bool {
        match self.slot {
            Slot::Draining { id: current } if current == id => {
                log::info!("session {id}: abandoned connect released");
                self.slot = Slot::Settling;
                true
            }
            _ => false,
        }
    }

    /// Connect and install in one call.
    ///
    /// On failure the reservation is released and the manager enters
    /// [`SessionPhase::Settling`].
    pub async fn connect(
        &mut self,
        request: ConnectRequest,
        tx: mpsc::UnboundedSender<Event>,
    ) -> Result<SessionId, ConnectError> {
        let job = self.prepare_connect(request, tx)?;
        let id = job.session();

        match job.run().await {
            Ok(session) => match self.install(session) {
                Ok(_) => Ok(id),
                Err(stale) => {
                    stale.teardown().await;
                    self.drained(id);
                    Err(ConnectError::SessionActive)
                }
            },
            Err(e) => {
                self.job_failed(id);
                Err(e)
            }
        }
    }

    /// Interpret a transport event for session `id`.
    pub fn on_transport_event(&mut self, id: SessionId, event: TransportEvent) -> TransportNotice {
        let (flags, live) = match &mut self.slot {
            Slot::Connecting {
                id: current,
                flags,
                ..
            } if *current == id => (flags, false),
            Slot::Live { session, flags } if session.id == id => (flags, true),
            _ => return TransportNotice::Stale,
        };

        match event {
            TransportEvent::TrackReceived(kind) => {
                if kind == MediaKind::Video {
                    flags.video = true;
                }
                TransportNotice::Track(kind)
            }
            TransportEvent::StateChanged(ConnectionState::Connecting) => TransportNotice::Progress,
            TransportEvent::StateChanged(ConnectionState::Connected) => {
                flags.connected = true;
                TransportNotice::Connected { ready: live }
            }
            TransportEvent::StateChanged(ConnectionState::Disconnected)
            | TransportEvent::StateChanged(ConnectionState::Failed) => {
                TransportNotice::Lost { failure: true }
            }
            TransportEvent::StateChanged(ConnectionState::Closed) => {
                TransportNotice::Lost { failure: false }
            }
        }
    }

    /// Unavailable-avatar check, run when the media grace period of
    /// session `id` elapses.
    ///
    /// The transport never reports an unprovisioned avatar explicitly; a
    /// session that produced no video by now is treated as one.
    pub fn media_grace_elapsed(&self, id: SessionId) -> Option<ConnectError> {
        match &self.slot {
            Slot::Live { session, flags } if session.id == id && !flags.video => {
                Some(ConnectError::AvatarUnavailable {
                    avatar: session.avatar.clone(),
                })
            }
            _ => None,
        }
    }

    /// Handle for speaking through the live session.
    pub fn speaker(&self) -> Option<Speaker> {
        match &self.slot {
            Slot::Live { session, .. } => Some(session.speaker()),
            _ => None,
        }
    }

    /// Speak `text` through the live session.
    pub async fn speak(&self, text: &str) -> Result<(), SpeakError> {
        self.speaker().ok_or(SpeakError::NoSession)?.speak(text).await
    }

    /// Tear down whatever session exists.
    ///
    /// Idempotent; returns `true` only when something was released or
    /// abandoned, in which case the manager is now
    /// [`SessionPhase::Settling`].  An abandoned connect keeps the manager
    /// draining until its job reports back through
    /// [`job_failed`](Self::job_failed) or
    /// [`drained`](Self::drained); only then does the settle delay start.
    pub async fn disconnect(&mut self) -> bool {
        match std::mem::replace(&mut self.slot, Slot::Settling) {
            Slot::Empty => {
                self.slot = Slot::Empty;
                false
            }
            Slot::Settling => false,
            Slot::Draining { id } => {
                self.slot = Slot::Draining { id };
                false
            }
            Slot::Connecting { id, abandon, .. } => {
                log::info!("session {id}: abandoned while connecting");
                abandon.cancel();
                self.slot = Slot::Draining { id };
                true
            }
            Slot::Live { session, .. } => {
                log::info!("session {}: disconnecting", session.id);
                session.teardown().await;
                true
            }
        }
    }

    /// The settle delay has elapsed; connecting is allowed again.
    pub fn settled(&mut self) {
        if matches!(self.slot, Slot::Settling) {
            self.slot = Slot::Empty;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
