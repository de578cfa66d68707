// src/control/command.rs

use std::str::FromStr;
use thiserror::Error;

/// A runtime control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    Pause,
    Resume,
    SkipApi,
    SkipFile,
    Stats,
    AddKey(String),
    ListKeys,
    RemoveKey(usize),
    Blacklist(usize),
    /// Blacklist the active key and rotate.
    Exhausted,
    ClearBlacklist,
    /// `None` disables the limit.
    SetRpm(Option<u32>),
    SetModel(String),
    /// `None` disables the limit.
    SetMaxEntries(Option<usize>),
    ShowRpm,
    ShowFileProgress,
    Context,
    Prompt,
    SaveCache,
    ReloadCache,
    ClearCache,
    Log(String),
    Help,
    /// Closes the local console; the run continues.
    Exit,
}

impl Command {
    /// Commands that change run state and are written to the audit log.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::Stats
                | Self::ListKeys
                | Self::ShowRpm
                | Self::ShowFileProgress
                | Self::Context
                | Self::Prompt
                | Self::Help
                | Self::Exit
                | Self::Log(_)
        )
    }

    /// Short name for logs. Never contains arguments such as API keys.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::SkipApi => "skip api",
            Self::SkipFile => "skip file",
            Self::Stats => "stats",
            Self::AddKey(_) => "add api",
            Self::ListKeys => "list keys",
            Self::RemoveKey(_) => "remove key",
            Self::Blacklist(_) => "blacklist",
            Self::Exhausted => "exhausted",
            Self::ClearBlacklist => "clear blacklist",
            Self::SetRpm(_) => "set rpm",
            Self::SetModel(_) => "set model",
            Self::SetMaxEntries(_) => "set max_entries",
            Self::ShowRpm => "show rpm",
            Self::ShowFileProgress => "show file_progress",
            Self::Context => "context",
            Self::Prompt => "prompt",
            Self::SaveCache => "save cache",
            Self::ReloadCache => "reload cache",
            Self::ClearCache => "clear cache",
            Self::Log(_) => "log",
            Self::Help => "help",
            Self::Exit => "exit",
        }
    }
}

/// Loggable name of a raw command line. Arguments are dropped, so `add api
/// <key>` logs as `add api`.
pub fn verb_of(line: &str) -> &'static str {
    line.parse::<Command>().map_or("unrecognised", |command| command.verb())
}

/// Why a command line was rejected. The message doubles as a usage hint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty command. Type 'help' for the list of commands.")]
    Empty,
    #[error("Unknown command '{0}'. Type 'help' for the list of commands.")]
    Unknown(String),
    #[error("Invalid command. Use '{0}'.")]
    Usage(&'static str),
    #[error("{0} must be an integer.")]
    NotAnInteger(&'static str),
    #[error("{0} cannot be negative.")]
    Negative(&'static str),
}

fn parse_index(value: &str) -> Result<usize, ParseError> {
    let value: i64 = value.parse().map_err(|_| ParseError::NotAnInteger("The index"))?;
    usize::try_from(value).map_err(|_| ParseError::Negative("The index"))
}

fn parse_limit(value: &str, what: &'static str) -> Result<Option<u64>, ParseError> {
    let value: i64 = value.parse().map_err(|_| ParseError::NotAnInteger(what))?;
    match value {
        v if v < 0 => Err(ParseError::Negative(what)),
        0 => Ok(None),
        v => Ok(Some(v.unsigned_abs())),
    }
}

impl FromStr for Command {
    type Err = ParseError;

    /// Verbs and sub-verbs are case-insensitive; arguments keep their case.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let (sub, arg) = match rest.split_once(char::is_whitespace) {
            Some((sub, arg)) => (sub.to_lowercase(), arg.trim()),
            None => (rest.to_lowercase(), ""),
        };

        match verb.to_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "stop" => Ok(Self::Stop),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stats" => Ok(Self::Stats),
            "context" => Ok(Self::Context),
            "prompt" => Ok(Self::Prompt),
            "help" => Ok(Self::Help),
            "exhausted" => Ok(Self::Exhausted),
            "exit" | "quit" => Ok(Self::Exit),
            "log" if !rest.is_empty() => Ok(Self::Log(rest.to_string())),
            "log" => Err(ParseError::Usage("log <message>")),
            "skip" => match sub.as_str() {
                "api" => Ok(Self::SkipApi),
                "file" => Ok(Self::SkipFile),
                _ => Err(ParseError::Usage("skip api' or 'skip file")),
            },
            "add" if sub == "api" && !arg.is_empty() => Ok(Self::AddKey(arg.to_string())),
            "add" => Err(ParseError::Usage("add api <key>")),
            "list" if sub == "keys" => Ok(Self::ListKeys),
            "list" => Err(ParseError::Usage("list keys")),
            "remove" if sub == "key" && !arg.is_empty() => Ok(Self::RemoveKey(parse_index(arg)?)),
            "remove" => Err(ParseError::Usage("remove key <index>")),
            "blacklist" if !rest.is_empty() => Ok(Self::Blacklist(parse_index(rest)?)),
            "blacklist" => Err(ParseError::Usage("blacklist <index>")),
            "clear" => match sub.as_str() {
                "blacklist" => Ok(Self::ClearBlacklist),
                "cache" => Ok(Self::ClearCache),
                _ => Err(ParseError::Usage("clear <blacklist|cache>")),
            },
            "set" if arg.is_empty() => Err(ParseError::Usage("set <rpm|model|max_entries> <value>")),
            "set" => match sub.as_str() {
                "rpm" => {
                    let limit = parse_limit(arg, "The RPM limit")?;
                    Ok(Self::SetRpm(limit.map(|l| u32::try_from(l).unwrap_or(u32::MAX))))
                }
                "model" => Ok(Self::SetModel(arg.to_string())),
                "max_entries" => {
                    let limit = parse_limit(arg, "The entry limit")?;
                    Ok(Self::SetMaxEntries(limit.map(|l| usize::try_from(l).unwrap_or(usize::MAX))))
                }
                _ => Err(ParseError::Usage("set <rpm|model|max_entries> <value>")),
            },
            "show" => match sub.as_str() {
                "rpm" => Ok(Self::ShowRpm),
                "file_progress" => Ok(Self::ShowFileProgress),
                _ => Err(ParseError::Usage("show <rpm|file_progress>")),
            },
            "save" if sub.is_empty() || sub == "cache" => Ok(Self::SaveCache),
            "reload" if sub == "cache" => Ok(Self::ReloadCache),
            "save" | "reload" => Err(ParseError::Usage("save cache' or 'reload cache")),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}
