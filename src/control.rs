//! Text commands that steer a running session.
//!
//! One command per line on stdin. An empty line toggles pause.

use crate::render::{Backdrop, CompositeOp};
use crate::segmentation::{DownsampleRatio, SegmentationMode};
use clap::ValueEnum;
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::str::FromStr;
use std::thread;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum ControlCommand {
    Toggle,
    Pause,
    Play,
    Mode(SegmentationMode),
    Ratio(DownsampleRatio),
    StateIndex(usize),
    Composite(CompositeOp),
    Background(Backdrop),
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("invalid argument for '{command}': {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: String,
    },
}

fn value_enum<T: ValueEnum>(command: &'static str, arg: &str) -> Result<T, ParseCommandError> {
    <T as ValueEnum>::from_str(arg, true)
        .map_err(|reason| ParseCommandError::InvalidArgument { command, reason })
}

impl FromStr for ControlCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(ControlCommand::Toggle);
        };
        let verb = verb.to_ascii_lowercase();
        let arg = words.next();

        let require = |command: &'static str| arg.ok_or(ParseCommandError::MissingArgument(command));
        let invalid = |command: &'static str, reason: String| ParseCommandError::InvalidArgument {
            command,
            reason,
        };

        match verb.as_str() {
            "t" | "toggle" => Ok(ControlCommand::Toggle),
            "pause" => Ok(ControlCommand::Pause),
            "play" => Ok(ControlCommand::Play),
            "q" | "quit" => Ok(ControlCommand::Quit),
            "mode" => value_enum("mode", require("mode")?).map(ControlCommand::Mode),
            "composite" => {
                value_enum("composite", require("composite")?).map(ControlCommand::Composite)
            }
            "ratio" => require("ratio")?
                .parse()
                .map(ControlCommand::Ratio)
                .map_err(|reason| invalid("ratio", reason)),
            "background" => require("background")?
                .parse()
                .map(ControlCommand::Background)
                .map_err(|err| invalid("background", format!("{err}"))),
            "state" => match require("state")?.parse::<usize>() {
                Ok(index @ 1..=4) => Ok(ControlCommand::StateIndex(index)),
                _ => Err(invalid("state", "expected 1, 2, 3 or 4".to_string())),
            },
            _ => Err(ParseCommandError::Unknown(line.trim().to_string())),
        }
    }
}

/// Forward commands typed on stdin until it closes or `quit` is read
pub fn spawn_stdin_reader(commands: Sender<ControlCommand>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!("Failed to read control input: {}", err);
                    break;
                }
            };
            match line.parse::<ControlCommand>() {
                Ok(command) => {
                    let quit = command == ControlCommand::Quit;
                    if commands.send(command).is_err() || quit {
                        break;
                    }
                }
                Err(err) => tracing::warn!("{}", err),
            }
        }
        tracing::debug!("Control input closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn parse(line: &str) -> Result<ControlCommand, ParseCommandError> {
        line.parse()
    }

    #[test]
    fn empty_line_toggles() {
        assert_eq!(parse(""), Ok(ControlCommand::Toggle));
        assert_eq!(parse("   "), Ok(ControlCommand::Toggle));
        assert_eq!(parse("t"), Ok(ControlCommand::Toggle));
    }

    #[test]
    fn settings_commands() {
        assert_eq!(parse("mode alpha"), Ok(ControlCommand::Mode(SegmentationMode::Alpha)));
        assert_eq!(parse("MODE State"), Ok(ControlCommand::Mode(SegmentationMode::State)));
        assert_eq!(
            parse("ratio 0.25"),
            Ok(ControlCommand::Ratio(DownsampleRatio::Fixed(0.25)))
        );
        assert_eq!(parse("ratio auto"), Ok(ControlCommand::Ratio(DownsampleRatio::Auto)));
        assert_eq!(parse("state 3"), Ok(ControlCommand::StateIndex(3)));
        assert_eq!(
            parse("composite destination-in"),
            Ok(ControlCommand::Composite(CompositeOp::DestinationIn))
        );
        assert_eq!(
            parse("background white"),
            Ok(ControlCommand::Background(Backdrop::Color(Rgb([255, 255, 255]))))
        );
        assert_eq!(parse("quit"), Ok(ControlCommand::Quit));
    }

    #[test]
    fn bad_input_is_reported() {
        assert_eq!(parse("jump"), Err(ParseCommandError::Unknown("jump".to_string())));
        assert_eq!(parse("mode"), Err(ParseCommandError::MissingArgument("mode")));
        assert!(matches!(
            parse("mode sepia"),
            Err(ParseCommandError::InvalidArgument { command: "mode", .. })
        ));
        assert!(matches!(
            parse("state 9"),
            Err(ParseCommandError::InvalidArgument { command: "state", .. })
        ));
        assert!(matches!(
            parse("ratio 3"),
            Err(ParseCommandError::InvalidArgument { command: "ratio", .. })
        ));
    }
}
