//! Loopback relay, transport and avatar synthesizer.
//!
//! The transport connects instantly and "receives" one audio and one video
//! track; the synthesizer takes as long as a person reading the text aloud
//! and can be interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::capability::{
    AvatarSynthesizer, ConnectionState, EngineError, MediaKind, MediaTrack, RelayCredentials,
    SpeakOutcome, SynthesisRequest, SynthesizerFactory, TransceiverDirection, TransportError,
    TransportEvent, TransportEvents, TransportFactory, TransportSession,
};
use crate::session::{AvatarSelection, ConnectError, RelayTokenProvider, SpeechCredentials};

/// Time the loopback avatar spends on each spoken word (~150 wpm).
pub const DEFAULT_WORD_DURATION: Duration = Duration::from_millis(400);

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Issues fixed relay credentials without any network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackRelay;

#[async_trait]
impl RelayTokenProvider for LoopbackRelay {
    async fn fetch(&self, speech: &SpeechCredentials) -> Result<RelayCredentials, ConnectError> {
        log::debug!("session: loopback relay credentials for {}", speech.region);
        Ok(RelayCredentials {
            urls: vec!["turn:127.0.0.1:3478".into()],
            username: "loopback".into(),
            credential: "loopback".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Opens [`LoopbackTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackTransports;

impl TransportFactory for LoopbackTransports {
    fn open(
        &self,
        relay: &RelayCredentials,
        events: TransportEvents,
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        if relay.urls.is_empty() {
            return Err(TransportError::Open("no relay servers".into()));
        }
        Ok(Arc::new(LoopbackTransport {
            events,
            tracks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Transport whose remote side answers every transceiver immediately.
pub struct LoopbackTransport {
    events: TransportEvents,
    tracks: Mutex<Vec<Arc<LoopbackTrack>>>,
    closed: AtomicBool,
}

impl LoopbackTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TransportSession for LoopbackTransport {
    fn add_transceiver(
        &self,
        kind: MediaKind,
        _direction: TransceiverDirection,
    ) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Transceiver {
                kind,
                detail: "transport closed".into(),
            });
        }

        let first = {
            let mut tracks = self
                .tracks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            tracks.push(Arc::new(LoopbackTrack { kind }));
            tracks.len() == 1
        };

        if first {
            self.events
                .emit(TransportEvent::StateChanged(ConnectionState::Connected));
        }
        self.events.emit(TransportEvent::TrackReceived(kind));
        Ok(())
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn MediaTrack>)
            .collect()
    }

    fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("session {}: loopback transport closed", self.events.session());
        }
        Ok(())
    }
}

struct LoopbackTrack {
    kind: MediaKind,
}

impl MediaTrack for LoopbackTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn stop(&self) -> Result<(), TransportError> {
        log::debug!("loopback: {} track stopped", self.kind);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// Creates [`LoopbackSynthesizer`]s.
#[derive(Debug, Clone, Copy)]
pub struct LoopbackSynthesizers {
    pub word_duration: Duration,
}

impl Default for LoopbackSynthesizers {
    fn default() -> Self {
        Self {
            word_duration: DEFAULT_WORD_DURATION,
        }
    }
}

impl SynthesizerFactory for LoopbackSynthesizers {
    fn create(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> Result<Arc<dyn AvatarSynthesizer>, EngineError> {
        Ok(Arc::new(LoopbackSynthesizer {
            avatar: request.avatar.clone(),
            voice: request.voice.to_string(),
            word_duration: self.word_duration,
            interrupt: Notify::new(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// "Speaks" by sleeping for the time the text would take to say.
pub struct LoopbackSynthesizer {
    avatar: AvatarSelection,
    voice: String,
    word_duration: Duration,
    interrupt: Notify,
    closed: AtomicBool,
}

impl LoopbackSynthesizer {
    fn speaking_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1);
        self.word_duration * words as u32
    }
}

#[async_trait]
impl AvatarSynthesizer for LoopbackSynthesizer {
    async fn start_avatar(&self, transport: Arc<dyn TransportSession>) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError("synthesizer closed".into()));
        }
        log::info!(
            "loopback: avatar {} ready with voice {} ({} track(s))",
            self.avatar,
            self.voice,
            transport.tracks().len()
        );
        Ok(())
    }

    async fn speak_text(&self, text: &str) -> Result<SpeakOutcome, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError("synthesizer closed".into()));
        }

        let duration = self.speaking_time(text);
        log::debug!("loopback: speaking {} chars for {duration:?}", text.len());

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(SpeakOutcome::Completed),
            _ = self.interrupt.notified() => Ok(SpeakOutcome::Canceled {
                detail: "speaking stopped".into(),
            }),
        }
    }

    async fn stop_speaking(&self) -> Result<(), EngineError> {
        self.interrupt.notify_waiters();
        Ok(())
    }

    fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        self.interrupt.notify_waiters();
        Ok(())
    }
}
