//! Model reply decoding
//!
//! The model is asked to answer with `{"comment": "...", "command": ...}`.
//! Its output is untrusted text, so decoding never fails: anything that does
//! not fit the contract becomes a [`ParsedReply::Unparseable`] carrying a
//! spoken explanation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single Home Assistant service call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Map<String, Value>,
}

impl ServiceCall {
    /// Decode one call object; all three keys are required
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            domain: obj.get("domain")?.as_str()?.to_string(),
            service: obj.get("service")?.as_str()?.to_string(),
            data: obj.get("data")?.as_object()?.clone(),
        })
    }
}

/// The `command` member of a model reply
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Single(ServiceCall),
    Batch(Vec<ServiceCall>),
    /// Any other shape. Never executed.
    Unrecognized(Value),
}

impl Command {
    /// Classify a raw `command` value. `null` means no command at all.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            value @ Value::Object(_) => Some(match ServiceCall::from_value(&value) {
                Some(call) => Command::Single(call),
                None => Command::Unrecognized(value),
            }),
            Value::Array(items) => {
                let calls: Option<Vec<ServiceCall>> =
                    items.iter().map(ServiceCall::from_value).collect();
                Some(match calls {
                    Some(calls) => Command::Batch(calls),
                    None => Command::Unrecognized(Value::Array(items)),
                })
            }
            other => Some(Command::Unrecognized(other)),
        }
    }
}

/// Outcome of decoding the model's raw text
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Comment(String),
    CommentWithCommand(String, Command),
    /// The text did not match the reply contract; holds the fallback speech
    Unparseable(String),
}

#[cfg(test)]
impl ParsedReply {
    /// Text to speak if no command overrides it
    pub fn comment(&self) -> &str {
        match self {
            ParsedReply::Comment(text)
            | ParsedReply::CommentWithCommand(text, _)
            | ParsedReply::Unparseable(text) => text,
        }
    }

    pub fn command(&self) -> Option<&Command> {
        match self {
            ParsedReply::CommentWithCommand(_, command) => Some(command),
            _ => None,
        }
    }
}

/// Decode a raw model reply
pub fn parse_reply(raw: &str) -> ParsedReply {
    match decode(raw) {
        Ok((comment, None)) => ParsedReply::Comment(comment),
        Ok((comment, Some(command))) => ParsedReply::CommentWithCommand(comment, command),
        Err(err) => {
            log::debug!("Model reply did not decode: {err:#}");
            ParsedReply::Unparseable(format!("Unable to parse: {raw} \n Error: {err:#}"))
        }
    }
}

/// Repair the one malformation models produce often enough to matter:
/// a trailing comma right before the closing brace.
fn repair(raw: &str) -> String {
    match raw.strip_suffix(",}") {
        Some(head) => format!("{head}}}"),
        None => raw.to_string(),
    }
}

fn decode(raw: &str) -> Result<(String, Option<Command>)> {
    let text = repair(raw);
    let value: Value = serde_json::from_str(&text).context("invalid JSON")?;

    let Value::Object(mut obj) = value else {
        return Err(anyhow!("expected a JSON object"));
    };

    let comment = match obj.remove("comment") {
        Some(Value::String(comment)) => comment,
        Some(other) => return Err(anyhow!("'comment' must be a string, got {other}")),
        None => return Err(anyhow!("missing key 'comment'")),
    };

    let command = obj.remove("command").and_then(Command::from_value);
    Ok((comment, command))
}
