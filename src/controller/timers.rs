//! Named, cancellable controller timers.
//!
//! Each [`TimerPurpose`] has at most one pending timer.  Firing delivers
//! [`Event::Timer`] tagged with the epoch it was scheduled under;
//! rescheduling or cancelling bumps the epoch, so a timer whose task was
//! already past its sleep is still recognised as stale by
//! [`Timers::accept`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::controller::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Resume continuous listening after the avatar finished speaking.
    ResumeContinuous,
    /// Restart a continuous recognizer that was canceled by the engine.
    RestartContinuous,
    /// Settle delay after a session teardown.
    SettleAfterDisconnect,
    /// Inbound-video deadline for a new session.
    MediaGrace,
    /// Revert a transient hint to "Ready".
    HintReset,
}

struct Pending {
    epoch: u64,
    handle: JoinHandle<()>,
}

pub struct Timers {
    tx: mpsc::UnboundedSender<Event>,
    pending: HashMap<TimerPurpose, Pending>,
    next_epoch: u64,
}

impl Timers {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            next_epoch: 0,
        }
    }

    /// Arm `purpose` to fire after `delay`, replacing any pending timer for
    /// the same purpose.
    pub fn schedule(&mut self, purpose: TimerPurpose, delay: Duration) {
        self.cancel(purpose);

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Timer { purpose, epoch });
        });

        log::debug!("controller: timer {purpose:?} armed for {delay:?}");
        self.pending.insert(purpose, Pending { epoch, handle });
    }

    pub fn cancel(&mut self, purpose: TimerPurpose) {
        if let Some(pending) = self.pending.remove(&purpose) {
            pending.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }

    pub fn is_pending(&self, purpose: TimerPurpose) -> bool {
        self.pending.contains_key(&purpose)
    }

    /// Consume a fired timer.  Returns `false` when it was cancelled or
    /// superseded after firing.
    pub fn accept(&mut self, purpose: TimerPurpose, epoch: u64) -> bool {
        match self.pending.get(&purpose) {
            Some(pending) if pending.epoch == epoch => {
                self.pending.remove(&purpose);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
