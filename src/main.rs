//! Application entry point: console driver for the avatar turn loop.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run) and overlay the
//!    `AZURE_*` environment variables.
//! 3. Build the collaborators: relay-token provider, loopback media engines,
//!    reply generator, console sink.
//! 4. Spawn the [`TurnController`] on the tokio runtime.
//! 5. Read commands from stdin until `quit` or end of input.
//!
//! Pass `--offline` to use the loopback relay and the echoing reply generator
//! instead of the configured services; no network access or credentials are
//! needed then.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use voice_avatar::{
    config::AppConfig,
    controller::{new_shared_state, Collaborators, ControllerTiming, TurnController, UserCommand},
    conversation::HistoryBuffer,
    llm::{ChatCompletionGenerator, ReplyGenerator},
    loopback::{
        EchoGenerator, LoopbackRecognizers, LoopbackRelay, LoopbackSynthesizers,
        LoopbackTransports, MicrophoneFeed,
    },
    presentation::ConsoleSink,
    session::{HttpRelayTokenProvider, LiveSessionManager, RelayTokenProvider},
};

const HELP: &str = "\
commands:
  start          connect the avatar
  stop           disconnect
  ptt            push-to-talk (press again to send)
  ptt-up         release push-to-talk
  listen         toggle continuous listening
  say <text>     send a typed message
  hear <text>    speak <text> into the microphone
  clear          clear the conversation history
  quit           exit";

// ---------------------------------------------------------------------------
// Console input
// ---------------------------------------------------------------------------

/// One parsed stdin line.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleLine {
    Command(UserCommand),
    Hear(String),
    Help,
    Quit,
    Unknown(String),
}

fn parse_line(line: &str) -> Option<ConsoleLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let parsed = match word.to_ascii_lowercase().as_str() {
        "start" => ConsoleLine::Command(UserCommand::Start),
        "stop" => ConsoleLine::Command(UserCommand::Stop),
        "ptt" => ConsoleLine::Command(UserCommand::PushToTalkDown),
        "ptt-up" => ConsoleLine::Command(UserCommand::PushToTalkUp),
        "listen" => ConsoleLine::Command(UserCommand::ToggleContinuous),
        "say" => ConsoleLine::Command(UserCommand::SubmitText(rest.to_string())),
        "clear" => ConsoleLine::Command(UserCommand::ClearHistory),
        "hear" => ConsoleLine::Hear(rest.to_string()),
        "help" | "?" => ConsoleLine::Help,
        "quit" | "exit" => ConsoleLine::Quit,
        _ => ConsoleLine::Unknown(line.to_string()),
    };
    Some(parsed)
}

/// Placeholder values for the credentials offline mode never sends anywhere.
fn fill_offline_credentials(config: &mut AppConfig) {
    for field in [
        &mut config.speech.key,
        &mut config.reply.endpoint,
        &mut config.reply.api_key,
    ] {
        if field.trim().is_empty() {
            *field = "loopback".into();
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice avatar starting up");

    // 2. Configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    config.apply_env();

    let offline = std::env::args().skip(1).any(|arg| arg == "--offline");
    if offline {
        fill_offline_credentials(&mut config);
    }
    let missing = config.missing_fields();
    if !missing.is_empty() {
        log::warn!("settings not configured: {}", missing.join(", "));
    }

    // 3. Collaborators
    let relay: Arc<dyn RelayTokenProvider> = if offline {
        log::info!("offline mode: using loopback relay credentials");
        Arc::new(LoopbackRelay)
    } else {
        Arc::new(HttpRelayTokenProvider::new(Duration::from_secs(
            config.timing.startup_timeout_secs,
        )))
    };

    let generator: Arc<dyn ReplyGenerator> = if offline {
        log::info!("offline mode: replies will echo the user");
        Arc::new(EchoGenerator)
    } else {
        Arc::new(ChatCompletionGenerator::from_config(&config.reply))
    };

    let recognizers = LoopbackRecognizers::new();
    let microphone: MicrophoneFeed = recognizers.feed();

    let sessions = LiveSessionManager::new(
        relay,
        Arc::new(LoopbackTransports),
        Arc::new(LoopbackSynthesizers::default()),
        config.timing.session_timing(),
    );
    let collaborators = Collaborators {
        sessions,
        recognizers: Arc::new(recognizers),
        generator,
        sink: Arc::new(ConsoleSink::new()),
    };

    // 4. Controller
    let (controller, handle) = TurnController::new(
        collaborators,
        config.connect_request(),
        HistoryBuffer::with_capacity(config.history.max_turns),
        ControllerTiming::from(&config.timing),
        new_shared_state(),
    );
    let controller = tokio::spawn(controller.run());

    // 5. Console loop
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            None => {}
            Some(ConsoleLine::Command(command)) => {
                if !handle.send(command) {
                    log::error!("controller stopped unexpectedly");
                    break;
                }
            }
            Some(ConsoleLine::Hear(text)) => {
                if !microphone.hear(&text) {
                    println!("[mic] nobody is listening (use ptt or listen first)");
                }
            }
            Some(ConsoleLine::Help) => println!("{HELP}"),
            Some(ConsoleLine::Quit) => break,
            Some(ConsoleLine::Unknown(line)) => println!("unknown command: {line} (try help)"),
        }
    }

    drop(handle);
    controller.await?;
    log::info!("voice avatar stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_line("start"),
            Some(ConsoleLine::Command(UserCommand::Start))
        );
        assert_eq!(
            parse_line("  PTT-UP "),
            Some(ConsoleLine::Command(UserCommand::PushToTalkUp))
        );
        assert_eq!(
            parse_line("listen"),
            Some(ConsoleLine::Command(UserCommand::ToggleContinuous))
        );
        assert_eq!(parse_line("quit"), Some(ConsoleLine::Quit));
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn keeps_message_text() {
        assert_eq!(
            parse_line("say  what is the weather like?"),
            Some(ConsoleLine::Command(UserCommand::SubmitText(
                "what is the weather like?".into()
            )))
        );
        assert_eq!(
            parse_line("hear hello there"),
            Some(ConsoleLine::Hear("hello there".into()))
        );
    }

    #[test]
    fn offline_mode_fills_only_empty_credentials() {
        let mut config = AppConfig::default();
        config.reply.api_key = "real-key".into();
        fill_offline_credentials(&mut config);

        assert_eq!(config.speech.key, "loopback");
        assert_eq!(config.reply.endpoint, "loopback");
        assert_eq!(config.reply.api_key, "real-key");
        assert!(config.connect_request().reply.validate().is_ok());
    }

    #[test]
    fn unknown_words_are_reported() {
        assert_eq!(
            parse_line("dance"),
            Some(ConsoleLine::Unknown("dance".into()))
        );
    }
}
