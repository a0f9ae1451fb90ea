//! Wire format of the line protocol and the store's change events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest request line the server accepts, in bytes
pub const MAX_REQUEST_SIZE: usize = 4096;

/// Bytes at or below this value separate tokens
const WHITESPACE_LIMIT: u8 = b' ';

/// Change made to the document store, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    /// A document was created, or replaced when `replaced` is set
    DocumentPut { key: String, replaced: bool },
    DocumentRemoved { key: String },
    CollaboratorJoined { key: String, user_id: String },
    CollaboratorLeft { key: String, user_id: String },
}

impl StoreEvent {
    /// Key of the document the event refers to
    pub fn key(&self) -> &str {
        match self {
            StoreEvent::DocumentPut { key, .. }
            | StoreEvent::DocumentRemoved { key }
            | StoreEvent::CollaboratorJoined { key, .. }
            | StoreEvent::CollaboratorLeft { key, .. } => key,
        }
    }
}

/// A single response line, written back without its trailing newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Nil,
    Pong,
    Bool(bool),
    Count(usize),
    /// Pre-rendered JSON text
    Json(String),
    InvalidCommand(String),
    WrongArity(String),
    TooLarge,
    NotImplemented,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("ok"),
            Response::Nil => f.write_str("nil"),
            Response::Pong => f.write_str("pong"),
            Response::Bool(value) => write!(f, "{value}"),
            Response::Count(count) => write!(f, "{count}"),
            Response::Json(text) => f.write_str(text),
            Response::InvalidCommand(verb) => write!(f, "Invalid command {verb}"),
            Response::WrongArity(verb) => write!(f, "Wrong number of arguments for '{verb}'"),
            Response::TooLarge => f.write_str("Request too large"),
            Response::NotImplemented => f.write_str("not implemented"),
        }
    }
}

impl Response {
    /// Render the response as a newline-terminated line
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

/// A request line split into its verb and the unparsed remainder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub verb: &'a str,
    rest: &'a str,
}

impl<'a> Request<'a> {
    /// Split a request line; `None` when the line holds no verb
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = skip_whitespace(line);
        if line.is_empty() {
            return None;
        }
        let end = token_end(line);
        Some(Self {
            verb: &line[..end],
            rest: &line[end..],
        })
    }

    /// Split the remainder into exactly `arity` arguments
    ///
    /// Every argument but the last is one whitespace-delimited token; the
    /// last one takes the rest of the line with trailing whitespace removed,
    /// so it may contain spaces. Returns `None` when arguments are missing.
    pub fn args(&self, arity: usize) -> Option<Vec<&'a str>> {
        let mut args = Vec::with_capacity(arity);
        let mut rest = self.rest;

        for index in 0..arity {
            rest = skip_whitespace(rest);
            if rest.is_empty() {
                return None;
            }
            if index + 1 == arity {
                args.push(rest.trim_end_matches(is_whitespace));
            } else {
                let end = token_end(rest);
                args.push(&rest[..end]);
                rest = &rest[end..];
            }
        }

        Some(args)
    }
}

fn is_whitespace(c: char) -> bool {
    c <= char::from(WHITESPACE_LIMIT)
}

fn skip_whitespace(text: &str) -> &str {
    text.trim_start_matches(is_whitespace)
}

fn token_end(text: &str) -> usize {
    text.find(is_whitespace).unwrap_or(text.len())
}
