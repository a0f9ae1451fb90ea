pub mod budget;
pub mod doc;
pub mod store;

pub use budget::{AbortOnExhaustion, MemoryBudget, OomAction, OomHandler, RejectOnExhaustion};
pub use doc::{Collaborator, Document, DocumentHandle};
pub use store::DocumentStore;
