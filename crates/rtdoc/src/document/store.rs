use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::doc::find_collaborator;
use super::{Collaborator, Document, DocumentHandle, MemoryBudget};
use crate::json::JsonValue;
use crate::protocol::StoreEvent;
use crate::{RtdocError, RtdocResult};

/// Capacity of the change feed before slow subscribers start lagging
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Thread-safe store for managing documents
///
/// The key map is a sharded lock table, synchronized independently of the
/// per-document locks. Operations on the same key are serialized by that
/// document's mutex; operations on different keys do not block each other.
pub struct DocumentStore {
    documents: DashMap<String, Arc<Document>>,
    change_tx: broadcast::Sender<StoreEvent>,
    budget: MemoryBudget,
}

impl DocumentStore {
    /// Create a new document store without a memory limit
    pub fn new() -> Self {
        Self::with_budget(MemoryBudget::unlimited())
    }

    /// Create a new document store that charges stored data against `budget`
    pub fn with_budget(budget: MemoryBudget) -> Self {
        let (change_tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        Self {
            documents: DashMap::new(),
            change_tx,
            budget,
        }
    }

    /// Create or replace the document stored under `key`
    ///
    /// An existing document is replaced wholesale: its contents are swapped
    /// and its collaborator list is reset, under the document's lock.
    pub fn put(&self, key: &str, contents: JsonValue) -> RtdocResult<DocumentHandle> {
        let cost = key.len() + contents.heap_size();
        self.budget.charge(cost)?;

        let (handle, replaced) = match self.documents.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                let document = entry.get().clone();
                let released = {
                    let mut state = document.lock();
                    state.contents = contents;
                    state.collaborators.clear();
                    std::mem::replace(&mut state.charged, cost)
                };
                self.budget.release(released);
                (DocumentHandle::new(document), true)
            }
            Entry::Vacant(entry) => {
                let document = Arc::new(Document::new(key.to_string(), contents, cost));
                entry.insert(document.clone());
                (DocumentHandle::new(document), false)
            }
        };

        if replaced {
            info!("Replaced document: {}", key);
        } else {
            info!("Created new document: {}", key);
        }
        self.notify(StoreEvent::DocumentPut {
            key: key.to_string(),
            replaced,
        });

        Ok(handle)
    }

    /// Get an existing document by key
    pub fn get(&self, key: &str) -> Option<DocumentHandle> {
        self.documents
            .get(key)
            .map(|entry| DocumentHandle::new(entry.value().clone()))
    }

    /// Get a copy of a document's contents
    pub fn contents(&self, key: &str) -> Option<JsonValue> {
        self.get(key).map(|handle| handle.contents())
    }

    /// Serialize a document's contents to JSON text
    pub fn stringify(&self, key: &str) -> Option<String> {
        self.get(key).map(|handle| handle.stringify())
    }

    /// Check whether a document exists
    pub fn contains(&self, key: &str) -> bool {
        self.documents.contains_key(key)
    }

    /// List all document keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Get the number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Remove a document by key
    ///
    /// Returns true if the document was removed, false if it didn't exist.
    pub fn remove(&self, key: &str) -> bool {
        match self.documents.remove(key) {
            Some((_, document)) => {
                let released = {
                    let mut state = document.lock();
                    state.detached = true;
                    std::mem::take(&mut state.charged)
                };
                self.budget.release(released);
                info!("Removed document: {}", key);
                self.notify(StoreEvent::DocumentRemoved {
                    key: key.to_string(),
                });
                true
            }
            None => {
                debug!("Attempted to remove non-existent document: {}", key);
                false
            }
        }
    }

    /// Get the collaborators of a document in join order
    pub fn collaborators(&self, key: &str) -> Option<Vec<Collaborator>> {
        self.get(key).map(|handle| handle.collaborators())
    }

    /// Open an editing session for `user_id` on the document
    ///
    /// Repeated joins by the same user are kept as separate entries.
    pub fn add_collaborator(&self, key: &str, user_id: &str) -> RtdocResult<()> {
        let document = self.document(key)?;
        let collaborator = Collaborator::new(user_id);
        let cost = collaborator.heap_size();

        {
            // A concurrent remove may have detached the document after lookup
            let mut state = document.lock();
            if state.detached {
                return Err(not_found(key));
            }
            self.budget.charge(cost)?;
            state.collaborators.push(collaborator);
            state.charged += cost;
        }

        debug!("Collaborator {} joined document {}", user_id, key);
        self.notify(StoreEvent::CollaboratorJoined {
            key: key.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    /// End the earliest editing session of `user_id` on the document
    pub fn remove_collaborator(&self, key: &str, user_id: &str) -> RtdocResult<Collaborator> {
        let document = self.document(key)?;

        let removed = {
            let mut state = document.lock();
            if state.detached {
                return Err(not_found(key));
            }
            let removed = find_collaborator(&state.collaborators, user_id)
                .map(|index| state.collaborators.remove(index));
            if let Some(collaborator) = &removed {
                state.charged = state.charged.saturating_sub(collaborator.heap_size());
            }
            removed
        };

        match removed {
            Some(collaborator) => {
                self.budget.release(collaborator.heap_size());
                debug!("Collaborator {} left document {}", user_id, key);
                self.notify(StoreEvent::CollaboratorLeft {
                    key: key.to_string(),
                    user_id: user_id.to_string(),
                });
                Ok(collaborator)
            }
            None => Err(RtdocError::CollaboratorNotFound {
                key: key.to_string(),
                user_id: user_id.to_string(),
            }),
        }
    }

    /// Memory accounting for the stored data
    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    /// Subscribe to changes across all documents
    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.change_tx.subscribe()
    }

    fn document(&self, key: &str) -> RtdocResult<Arc<Document>> {
        self.documents
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found(key))
    }

    fn notify(&self, event: StoreEvent) {
        // Sending fails only when nobody is subscribed
        let _ = self.change_tx.send(event);
    }
}

fn not_found(key: &str) -> RtdocError {
    RtdocError::DocumentNotFound {
        key: key.to_string(),
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}
