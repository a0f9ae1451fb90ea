//! # RTDoc - Real-time Document store
//!
//! A TCP server holding JSON documents keyed by name, with collaborative
//! editing sessions tracked per document.
//!
//! Clients speak a newline-delimited text protocol (`add doc {"a":1}`,
//! `get doc`, `start doc alice`, ...). Connections are accepted by a single
//! thread and served by a fixed pool of workers; documents live in a
//! [`DocumentStore`] that serializes work per key.

pub mod client;
pub mod document;
pub mod error;
pub mod json;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use document::{Collaborator, DocumentHandle, DocumentStore, MemoryBudget, OomAction};
pub use error::{RtdocError, RtdocResult};
pub use json::JsonValue;
pub use protocol::{Response, StoreEvent};
pub use server::{Server, ServerConfig, ShutdownHandle};
