//! Turn controller module: the conversation state machine.
//!
//! This module wires user commands, microphone captures, reply generation
//! and avatar speech into one sequential event loop and exposes the shared
//! state that a UI reads.
//!
//! # Architecture
//!
//! ```text
//! ControllerHandle ──UserCommand (mpsc)──┐
//!                                        ▼
//!                              TurnController::run()  ← async tokio task
//!                                        ▲
//! Recognizer / Transport ──Event (mpsc)──┤
//! spawned connect / capture / reply / speech ──Event──┤
//! Timers ──Event::Timer───────────────────────────────┘
//!
//! SharedState (Arc<Mutex<ConversationState>>) ←── read by the UI
//! PresentationSink                           ←── notified on every change
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_avatar::config::AppConfig;
//! use voice_avatar::controller::{
//!     new_shared_state, Collaborators, ControllerTiming, TurnController, UserCommand,
//! };
//! use voice_avatar::conversation::HistoryBuffer;
//! use voice_avatar::llm::ChatCompletionGenerator;
//! use voice_avatar::loopback::{LoopbackRecognizers, LoopbackRelay, LoopbackSynthesizers, LoopbackTransports};
//! use voice_avatar::presentation::ConsoleSink;
//! use voice_avatar::session::LiveSessionManager;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let sessions = LiveSessionManager::new(
//!         Arc::new(LoopbackRelay),
//!         Arc::new(LoopbackTransports),
//!         Arc::new(LoopbackSynthesizers::default()),
//!         config.timing.session_timing(),
//!     );
//!     let collaborators = Collaborators {
//!         sessions,
//!         recognizers: Arc::new(LoopbackRecognizers::new()),
//!         generator: Arc::new(ChatCompletionGenerator::from_config(&config.reply)),
//!         sink: Arc::new(ConsoleSink::new()),
//!     };
//!     let (controller, handle) = TurnController::new(
//!         collaborators,
//!         config.connect_request(),
//!         HistoryBuffer::with_capacity(config.history.max_turns),
//!         ControllerTiming::from(&config.timing),
//!         new_shared_state(),
//!     );
//!     tokio::spawn(controller.run());
//!     handle.send(UserCommand::Start);
//! }
//! ```

pub mod event;
pub mod runner;
pub mod state;
pub mod timers;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use event::{Event, UserCommand};
pub use runner::{Collaborators, ControllerHandle, ControllerTiming, TurnController};
pub use state::{new_shared_state, ConversationState, Mode, SharedState};
pub use timers::{TimerPurpose, Timers};
