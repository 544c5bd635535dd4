//! Voice-driven conversation with a talking avatar.
//!
//! The [`controller::TurnController`] runs the turn loop: it captures an
//! utterance (push-to-talk, continuous listening or typed text), asks a
//! [`llm::ReplyGenerator`] for an answer, and has the avatar of the
//! [`session::LiveSessionManager`] speak it, never listening and speaking at
//! the same time.  Recognition, transport and synthesis engines plug in
//! through the traits in [`capability`]; [`loopback`] provides in-process
//! stand-ins.

pub mod capability;
pub mod capture;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod llm;
pub mod loopback;
pub mod presentation;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
