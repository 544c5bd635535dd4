//! Presentation sink: the one-way channel from the turn loop to whatever
//! renders it.
//!
//! The controller reports status changes as [`SinkEvent`]s; a sink never
//! feeds anything back into control flow.
//!
//! * [`PresentationSink`]: trait implemented by every renderer.
//! * [`ConsoleSink`]: prints events to stdout for the console driver.

pub mod console;
pub mod sink;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use console::ConsoleSink;
pub use sink::{
    AvatarStatus, Controls, IndicatorState, MicStatus, NoticeLevel, PresentationSink, SinkEvent,
};
