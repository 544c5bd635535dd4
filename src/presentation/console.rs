//! Stdout renderer used by the console driver.

use std::io::Write;

use crate::conversation::Role;
use crate::presentation::{NoticeLevel, PresentationSink, SinkEvent};

/// Prints one line per [`SinkEvent`].
///
/// Mode changes and control updates are logged at debug level only; the
/// indicator already carries the same information in readable form.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }

    /// Text line for `event`, or `None` when it is not printed.
    pub fn render(event: &SinkEvent) -> Option<String> {
        let line = match event {
            SinkEvent::Mode(_) | SinkEvent::Controls(_) => return None,
            SinkEvent::Avatar(status) => format!("[avatar] {}", status.label()),
            SinkEvent::Mic(status) => format!("[mic] {}", status.label()),
            SinkEvent::Indicator { text, .. } => format!("  ... {text}"),
            SinkEvent::VoiceHint(hint) => format!("[hint] {hint}"),
            SinkEvent::TurnAdded(turn) => {
                let label = match turn.role() {
                    Role::User => "You",
                    Role::Assistant => "Avatar",
                };
                format!("{label}: {}", turn.content())
            }
            SinkEvent::HistoryCleared => "[history cleared]".to_string(),
            SinkEvent::Notice { level, message } => {
                let tag = match level {
                    NoticeLevel::Info => "info",
                    NoticeLevel::Warning => "warning",
                    NoticeLevel::Error => "error",
                };
                format!("[{tag}] {message}")
            }
            SinkEvent::ConfigurationRequired { reason } => {
                format!("[config] {reason} (check settings.toml or the environment)")
            }
            SinkEvent::TrackReceived(kind) => format!("[avatar] {kind} track received"),
        };
        Some(line)
    }
}

impl PresentationSink for ConsoleSink {
    fn notify(&self, event: SinkEvent) {
        log::debug!("presentation: {event:?}");
        if let Some(line) = Self::render(&event) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Mode;
    use crate::conversation::Turn;
    use crate::presentation::AvatarStatus;

    #[test]
    fn turns_are_labelled_by_role() {
        let user = Turn::new(Role::User, "hi", 0);
        let assistant = Turn::new(Role::Assistant, "hello", 1);
        assert_eq!(
            ConsoleSink::render(&SinkEvent::TurnAdded(user)).as_deref(),
            Some("You: hi")
        );
        assert_eq!(
            ConsoleSink::render(&SinkEvent::TurnAdded(assistant)).as_deref(),
            Some("Avatar: hello")
        );
    }

    #[test]
    fn mode_changes_are_not_printed() {
        assert!(ConsoleSink::render(&SinkEvent::Mode(Mode::Thinking)).is_none());
    }

    #[test]
    fn avatar_status_uses_label() {
        assert_eq!(
            ConsoleSink::render(&SinkEvent::Avatar(AvatarStatus::Connecting)).as_deref(),
            Some("[avatar] Connecting...")
        );
    }
}
