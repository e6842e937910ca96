//! Parser for the flat `key=value,key2="quoted,value"` strings handed to every
//! backend and failure handler constructor.


use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use hyper::StatusCode;

#[derive(Debug, PartialEq)]
pub enum Error {
    Malformed(String),
    MissingOption(String),
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Malformed(err) => write!(f, "Unable to parse options string, {err}"),
            Error::MissingOption(key) => write!(f, "{key} is a required parameter"),
            Error::InvalidValue { key, value, reason } => {
                write!(f, "unable to parse {key} '{value}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Key,
    ValueStart,
    Value,
    Quoted,
    Escape,
    QuotedEnd,
}

/// Parsed options. Keys are unique, the last occurrence of a key wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options(HashMap<String, String>);

fn missing_pair(segment: &str) -> Error {
    Error::Malformed(format!("missing pair '{segment}'"))
}

fn finish_pair(
    options: &mut HashMap<String, String>,
    key: &mut String,
    value: &mut String,
) -> Result<(), Error> {
    if key.is_empty() {
        let msg = format!("empty key for value '{value}'");
        return Err(Error::Malformed(msg));
    }

    options.insert(std::mem::take(key), std::mem::take(value));
    Ok(())
}

fn unescape(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\\' => Some('\\'),
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        _ => None,
    }
}

pub fn parse(config: &str) -> Result<Options, Error> {
    let mut options = HashMap::new();
    if config.trim().is_empty() {
        return Ok(Options(options));
    }

    let mut state = State::Key;
    let mut key = String::new();
    let mut value = String::new();

    for c in config.chars() {
        state = match (state, c) {
            (State::Key, ',') => return Err(missing_pair(&key)),
            (State::Key, '=') => State::ValueStart,
            (State::Key, c) => {
                key.push(c);
                State::Key
            }
            (State::ValueStart, '"') => State::Quoted,
            (State::ValueStart | State::Value | State::QuotedEnd, ',') => {
                finish_pair(&mut options, &mut key, &mut value)?;
                State::Key
            }
            (State::ValueStart | State::Value, c) => {
                value.push(c);
                State::Value
            }
            (State::Quoted, '\\') => State::Escape,
            (State::Quoted, '"') => State::QuotedEnd,
            (State::Quoted, c) => {
                value.push(c);
                State::Quoted
            }
            (State::Escape, c) => {
                let Some(unescaped) = unescape(c) else {
                    let msg = format!("invalid escape '\\{c}' in value of '{key}'");
                    return Err(Error::Malformed(msg));
                };
                value.push(unescaped);
                State::Quoted
            }
            (State::QuotedEnd, c) => {
                let msg = format!("unexpected '{c}' after quoted value of '{key}'");
                return Err(Error::Malformed(msg));
            }
        };
    }

    match state {
        State::Key => Err(missing_pair(&key)),
        State::Quoted | State::Escape => {
            let msg = format!("unterminated quoted value for '{key}'");
            Err(Error::Malformed(msg))
        }
        State::ValueStart | State::Value | State::QuotedEnd => {
            finish_pair(&mut options, &mut key, &mut value)?;
            Ok(Options(options))
        }
    }
}

fn invalid_value(key: &str, value: &str, reason: impl fmt::Display) -> Error {
    Error::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

impl Options {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.get(key)
            .ok_or_else(|| Error::MissingOption(key.to_string()))
    }

    pub fn bool(&self, key: &str, default: bool) -> Result<bool, Error> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };

        parse_bool(value).ok_or_else(|| invalid_value(key, value, "invalid boolean"))
    }

    pub fn duration(&self, key: &str, default: Duration) -> Result<Duration, Error> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };

        humantime::parse_duration(value).map_err(|err| invalid_value(key, value, err))
    }

    pub fn int(&self, key: &str, default: u64) -> Result<u64, Error> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };

        value
            .parse::<u64>()
            .map_err(|err| invalid_value(key, value, err))
    }

    pub fn status_code(&self, key: &str, default: StatusCode) -> Result<StatusCode, Error> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };

        let code = value
            .parse::<u16>()
            .map_err(|err| invalid_value(key, value, err))?;
        StatusCode::from_u16(code).map_err(|err| invalid_value(key, value, err))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<Options> for HashMap<String, String> {
    fn from(options: Options) -> Self {
        options.0
    }
}
