//! Typed-in "microphone" for the console driver.
//!
//! [`LoopbackRecognizers`] hands out recognizers that listen to a shared
//! [`MicrophoneFeed`].  Whatever the user types after `hear` is delivered
//! to the recognizer that is currently started, word by word as partial
//! hypotheses and then as one final segment.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::capability::{
    DeviceError, RecognitionEvent, RecognitionEvents, RecognitionReason, Recognizer,
    RecognizerFactory,
};

/// The recognizer currently listening, if any.
#[derive(Clone, Default)]
pub struct MicrophoneFeed {
    listener: Arc<Mutex<Option<(u64, RecognitionEvents)>>>,
}

impl MicrophoneFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `text` as one utterance.  Returns `false` when no recognizer
    /// is listening.
    pub fn hear(&self, text: &str) -> bool {
        let Some(events) = self.current() else {
            return false;
        };

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return true;
        }
        for n in 1..=words.len() {
            events.emit(RecognitionEvent::Recognizing(words[..n].join(" ")));
        }
        events.emit(RecognitionEvent::Recognized {
            reason: RecognitionReason::RecognizedSpeech,
            text: words.join(" "),
        });
        true
    }

    pub fn is_listening(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<RecognitionEvents> {
        self.lock().as_ref().map(|(_, events)| events.clone())
    }

    fn attach(&self, token: u64, events: RecognitionEvents) {
        *self.lock() = Some((token, events));
    }

    fn detach(&self, token: u64) {
        let mut listener = self.lock();
        if matches!(listener.as_ref(), Some((t, _)) if *t == token) {
            *listener = None;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(u64, RecognitionEvents)>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Recognizer factory backed by a [`MicrophoneFeed`].
#[derive(Clone, Default)]
pub struct LoopbackRecognizers {
    feed: MicrophoneFeed,
    next_token: Arc<AtomicU64>,
}

impl LoopbackRecognizers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The feed that `hear` lines are written to.
    pub fn feed(&self) -> MicrophoneFeed {
        self.feed.clone()
    }
}

impl RecognizerFactory for LoopbackRecognizers {
    fn create(&self, events: RecognitionEvents) -> Result<Arc<dyn Recognizer>, DeviceError> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LoopbackRecognizer {
            token,
            feed: self.feed.clone(),
            events,
            closed: AtomicBool::new(false),
        }))
    }
}

struct LoopbackRecognizer {
    token: u64,
    feed: MicrophoneFeed,
    events: RecognitionEvents,
    closed: AtomicBool,
}

#[async_trait]
impl Recognizer for LoopbackRecognizer {
    async fn start_continuous(&self) -> Result<(), DeviceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable("recognizer closed".into()));
        }
        self.feed.attach(self.token, self.events.clone());
        log::debug!("capture {}: loopback microphone open", self.events.capture());
        Ok(())
    }

    async fn stop_continuous(&self) -> Result<(), DeviceError> {
        self.feed.detach(self.token);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.feed.detach(self.token);
    }
}
