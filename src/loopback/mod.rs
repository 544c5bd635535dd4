//! In-process collaborators for running the turn loop without external
//! engines.
//!
//! * [`LoopbackRelay`] / [`LoopbackTransports`]: a transport that connects
//!   instantly and receives audio and video at once.
//! * [`LoopbackSynthesizers`]: an avatar that "speaks" for as long as the
//!   text would take to read aloud and can be interrupted.
//! * [`LoopbackRecognizers`]: a microphone fed with typed text through a
//!   shared [`MicrophoneFeed`].
//! * [`EchoGenerator`]: a reply generator that needs no endpoint.

pub mod media;
pub mod microphone;
pub mod reply;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use media::{
    LoopbackRelay, LoopbackSynthesizer, LoopbackSynthesizers, LoopbackTransport,
    LoopbackTransports, DEFAULT_WORD_DURATION,
};
pub use microphone::{LoopbackRecognizers, MicrophoneFeed};
pub use reply::EchoGenerator;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::controller::{
        new_shared_state, Collaborators, ControllerTiming, Mode, TurnController, UserCommand,
    };
    use crate::conversation::HistoryBuffer;
    use crate::session::{
        AvatarSelection, ConnectRequest, LiveSessionManager, ReplyCredentials, SessionPhase,
        SessionTiming, SpeechCredentials,
    };
    use crate::testing::RecordingSink;

    #[tokio::test(start_paused = true)]
    async fn push_to_talk_round_trip_through_loopback_engines() {
        let recognizers = LoopbackRecognizers::new();
        let microphone = recognizers.feed();
        let sink = RecordingSink::new();
        let state = new_shared_state();

        let sessions = LiveSessionManager::new(
            Arc::new(LoopbackRelay),
            Arc::new(LoopbackTransports),
            Arc::new(LoopbackSynthesizers::default()),
            SessionTiming::default(),
        );
        let (controller, handle) = TurnController::new(
            Collaborators {
                sessions,
                recognizers: Arc::new(recognizers),
                generator: Arc::new(EchoGenerator),
                sink: Arc::new(sink.clone()),
            },
            ConnectRequest {
                speech: SpeechCredentials::new("loopback", "westus2"),
                reply: ReplyCredentials::new("loopback", "loopback"),
                voice: "en-US-AvaMultilingualNeural".into(),
                avatar: AvatarSelection::default(),
            },
            HistoryBuffer::new(),
            ControllerTiming::default(),
            Arc::clone(&state),
        );
        tokio::spawn(controller.run());

        handle.send(UserCommand::Start);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.lock().unwrap().session, SessionPhase::Ready);

        handle.send(UserCommand::PushToTalkDown);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(microphone.hear("hello there"));
        handle.send(UserCommand::PushToTalkUp);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(state.lock().unwrap().mode, Mode::Speaking);
        assert!(!microphone.is_listening());

        tokio::time::sleep(DEFAULT_WORD_DURATION * 4).await;
        assert_eq!(state.lock().unwrap().mode, Mode::Idle);
        assert_eq!(sink.turns(), vec!["hello there", "You said: hello there"]);
    }
}
