use chrono::{DateTime, Utc};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::json::{self, JsonValue};

/// A participant in an open editing session on a document
///
/// Identity is the user id; the join time is informational only.
#[derive(Debug, Clone)]
pub struct Collaborator {
    user_id: String,
    joined_at: DateTime<Utc>,
}

impl Collaborator {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            joined_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub(crate) fn heap_size(&self) -> usize {
        mem::size_of::<Collaborator>() + self.user_id.len()
    }
}

impl PartialEq for Collaborator {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
    }
}

impl Eq for Collaborator {}

/// Mutable part of a document, guarded by the document's lock
#[derive(Debug)]
pub(crate) struct DocumentState {
    pub(crate) contents: JsonValue,
    pub(crate) collaborators: Vec<Collaborator>,
    /// Bytes charged against the store's memory budget for this document
    pub(crate) charged: usize,
    /// Set once the document has been taken out of the store
    pub(crate) detached: bool,
}

/// A named JSON value plus the collaborators currently editing it
///
/// Every mutation of a single document goes through its mutex, so operations
/// on the same key are serialized while other keys proceed independently.
#[derive(Debug)]
pub struct Document {
    key: String,
    state: Mutex<DocumentState>,
}

impl Document {
    pub(crate) fn new(key: String, contents: JsonValue, charged: usize) -> Self {
        Self {
            key,
            state: Mutex::new(DocumentState {
                contents,
                collaborators: Vec::new(),
                charged,
                detached: false,
            }),
        }
    }

    /// Get the document key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lock the document state, recovering from a poisoned lock
    pub(crate) fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get a copy of the document contents
    pub fn contents(&self) -> JsonValue {
        self.lock().contents.clone()
    }

    /// Serialize the contents while holding the document lock
    pub fn stringify(&self) -> String {
        json::stringify(&self.lock().contents)
    }

    /// Get the collaborators in join order
    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.lock().collaborators.clone()
    }

    pub fn collaborator_count(&self) -> usize {
        self.lock().collaborators.len()
    }
}

/// Position of the earliest collaborator with the given user id
pub(crate) fn find_collaborator(collaborators: &[Collaborator], user_id: &str) -> Option<usize> {
    collaborators
        .iter()
        .position(|collaborator| collaborator.user_id == user_id)
}

/// A thread-safe handle to a document
///
/// Handles stay valid after the document is removed from the store; they
/// then refer to the detached document.
#[derive(Clone, Debug)]
pub struct DocumentHandle {
    inner: Arc<Document>,
}

impl DocumentHandle {
    pub(crate) fn new(document: Arc<Document>) -> Self {
        Self { inner: document }
    }

    /// Get the document key
    pub fn key(&self) -> &str {
        self.inner.key()
    }

    /// Get a copy of the document contents
    pub fn contents(&self) -> JsonValue {
        self.inner.contents()
    }

    /// Serialize the contents to JSON text
    pub fn stringify(&self) -> String {
        self.inner.stringify()
    }

    /// Get the collaborators in join order
    pub fn collaborators(&self) -> Vec<Collaborator> {
        self.inner.collaborators()
    }

    /// Get the number of collaborators
    pub fn collaborator_count(&self) -> usize {
        self.inner.collaborator_count()
    }
}
