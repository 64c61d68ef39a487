//! Line-oriented kiosk driver for terminals without a touch screen

use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use crate::panel::Panel;
use crate::store::DocumentStore;

pub const HELP: &str = "commands: tap N | hold N | press N | release N | name TEXT | ok | clear | cancel | listen | refresh | help | quit";

/// One console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tap(usize),
    Hold(usize),
    Press(usize),
    Release(usize),
    /// Type into the edit dialog
    Name(String),
    /// Accept the edit dialog
    Ok,
    Clear,
    Cancel,
    Listen,
    Refresh,
    /// Redraw only
    Show,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{command} needs a position number")]
    MissingPosition { command: String },
    #[error("not a position number: {0}")]
    BadPosition(String),
}

/// Whether the driver keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parses one input line; a blank line redraws
///
/// # Errors
/// Returns error for unknown commands or a missing/invalid position number
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));

    let position = |command: &str| -> Result<usize, ParseError> {
        if rest.is_empty() {
            return Err(ParseError::MissingPosition {
                command: command.to_owned(),
            });
        }
        rest.parse()
            .map_err(|_| ParseError::BadPosition(rest.to_owned()))
    };

    match word.to_lowercase().as_str() {
        "" => Ok(Command::Show),
        "tap" | "t" => position("tap").map(Command::Tap),
        "hold" | "h" => position("hold").map(Command::Hold),
        "press" => position("press").map(Command::Press),
        "release" => position("release").map(Command::Release),
        "name" | "n" => Ok(Command::Name(rest.to_owned())),
        "ok" => Ok(Command::Ok),
        "clear" => Ok(Command::Clear),
        "cancel" => Ok(Command::Cancel),
        "listen" | "l" => Ok(Command::Listen),
        "refresh" => Ok(Command::Refresh),
        "show" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_owned())),
    }
}

/// Applies a command to the panel
///
/// `Show` and `Help` leave the panel untouched; the caller redraws.
pub fn apply<S: DocumentStore>(panel: &mut Panel<S>, command: Command, now: Instant) -> Flow {
    debug!(command = ?command, "console command");
    match command {
        Command::Tap(index) => panel.tap(index, now),
        Command::Hold(index) => panel.hold(index, now),
        Command::Press(index) => panel.press(index, now),
        Command::Release(index) => panel.release(index, now),
        Command::Name(text) => {
            panel.edit_input(&text);
        }
        Command::Ok => panel.accept_edit(),
        Command::Clear => panel.clear_edit(),
        Command::Cancel => panel.cancel_edit(),
        Command::Listen => {
            panel.start_listening();
        }
        Command::Refresh => {
            let _ = panel.refresh();
        }
        Command::Show | Command::Help => {}
        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanelConfig;
    use crate::positions::PositionStore;
    use crate::store::MemoryStore;

    #[test]
    fn test_parse_position_commands() {
        assert_eq!(parse("tap 3"), Ok(Command::Tap(3)));
        assert_eq!(parse("  HOLD   12 "), Ok(Command::Hold(12)));
        assert_eq!(parse("press 1"), Ok(Command::Press(1)));
        assert_eq!(parse("release 1"), Ok(Command::Release(1)));
    }

    #[test]
    fn test_parse_position_errors() {
        assert_eq!(
            parse("tap"),
            Err(ParseError::MissingPosition {
                command: "tap".to_owned()
            })
        );
        assert_eq!(parse("tap x"), Err(ParseError::BadPosition("x".to_owned())));
        assert_eq!(parse("tap -1"), Err(ParseError::BadPosition("-1".to_owned())));
    }

    #[test]
    fn test_parse_name_keeps_inner_spaces() {
        assert_eq!(
            parse("name  Smoked Paprika "),
            Ok(Command::Name("Smoked Paprika".to_owned()))
        );
        assert_eq!(parse("name"), Ok(Command::Name(String::new())));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse(""), Ok(Command::Show));
        assert_eq!(parse("listen"), Ok(Command::Listen));
        assert_eq!(parse("q"), Ok(Command::Quit));
        assert_eq!(parse("dance"), Err(ParseError::Unknown("dance".to_owned())));
    }

    #[test]
    fn test_apply_hold_name_ok() {
        let config = PanelConfig {
            first_position: 1,
            position_count: 12,
            columns: 3,
            long_press_ms: 1000,
        };
        let rack = PositionStore::new(MemoryStore::new(), config.indices());
        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut panel = Panel::new(rack, &config, rx);
        let now = Instant::now();

        for line in ["hold 2", "name Oregano", "ok", "tap 2"] {
            assert_eq!(apply(&mut panel, parse(line).unwrap(), now), Flow::Continue);
        }
        assert_eq!(panel.rack().name(2).as_deref(), Some("Oregano"));
        assert_eq!(panel.rack().current(), Some(2));
        assert_eq!(apply(&mut panel, Command::Quit, now), Flow::Quit);
    }
}
