//! REPL command parsing.

use std::path::PathBuf;

use thiserror::Error;

use crate::attachments::parse_dropped_paths;

pub const HELP: &str = "\
Commands:
  /attach <paths>   attach image files (quote paths with spaces)
  /drop <paths>     attach files dragged onto the terminal
  /paste            attach an image, data URL or paths from the clipboard
  /remove <n>       remove pending attachment n
  /clear            remove all pending attachments and cancel conversions
  /cancel           cancel conversions still in progress
  /list             show the conversation and pending attachments
  /speak [n]        speak message n (default: latest reply); again to stop
  /stop             stop speech
  /rate <x>         playback rate, 0.5 to 2.0
  /voice <name>     Kore, Puck, Charon, Fenrir or Aoede
  /dictate          speak a message instead of typing it
  /new              start a new conversation
  /help             show this help
  /quit             exit
Anything else is sent as a chat message.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Attach(Vec<PathBuf>),
    Drop(Vec<PathBuf>),
    Paste,
    Remove(usize),
    Clear,
    Cancel,
    List,
    Speak(Option<usize>),
    Stop,
    Rate(f32),
    Voice(String),
    Dictate,
    New,
    Help,
    Quit,
    /// Plain chat text.
    Say(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),

    #[error("not a valid number: {0}")]
    InvalidNumber(String),

    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),
}

impl Command {
    /// Parse one input line.  Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Say(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "attach" => Command::Attach(paths(arg, "attach")?),
            "drop" => Command::Drop(paths(arg, "drop")?),
            "paste" => Command::Paste,
            "remove" => Command::Remove(index(arg, "remove")?),
            "clear" => Command::Clear,
            "cancel" => Command::Cancel,
            "list" => Command::List,
            "speak" => Command::Speak(if arg.is_empty() {
                None
            } else {
                Some(index(arg, "speak")?)
            }),
            "stop" => Command::Stop,
            "rate" => Command::Rate(
                required(arg, "rate")?
                    .parse()
                    .map_err(|_| CommandError::InvalidNumber(arg.to_string()))?,
            ),
            "voice" => Command::Voice(required(arg, "voice")?.to_string()),
            "dictate" => Command::Dictate,
            "new" => Command::New,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(CommandError::UnknownCommand(name.to_string())),
        };
        Ok(Some(command))
    }
}

fn required<'a>(arg: &'a str, command: &'static str) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument(command))
    } else {
        Ok(arg)
    }
}

fn paths(arg: &str, command: &'static str) -> Result<Vec<PathBuf>, CommandError> {
    let paths = parse_dropped_paths(required(arg, command)?);
    if paths.is_empty() {
        return Err(CommandError::MissingArgument(command));
    }
    Ok(paths)
}

/// 1-based index.
fn index(arg: &str, command: &'static str) -> Result<usize, CommandError> {
    match required(arg, command)?.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::InvalidNumber(arg.to_string())),
    }
}
