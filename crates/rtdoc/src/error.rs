use thiserror::Error;

/// Result type for RTDoc operations
pub type RtdocResult<T> = Result<T, RtdocError>;

/// Errors that can occur in RTDoc operations
#[derive(Error, Debug)]
pub enum RtdocError {
    #[error("Parse error at offset {position}: {message}")]
    Parse { message: String, position: usize },

    #[error("Document not found: {key}")]
    DocumentNotFound { key: String },

    #[error("Collaborator {user_id} not found in document {key}")]
    CollaboratorNotFound { key: String, user_id: String },

    #[error("Invalid command {verb}")]
    InvalidCommand { verb: String },

    #[error("Wrong number of arguments for '{verb}': expected {expected}")]
    WrongArity { verb: String, expected: usize },

    #[error("Memory limit exceeded: requested {requested} bytes with {used} of {limit} in use")]
    ResourceExhausted {
        requested: usize,
        used: usize,
        limit: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown listener error: {0}")]
    Shutdown(String),
}

impl RtdocError {
    pub(crate) fn parse(message: impl Into<String>, position: usize) -> Self {
        RtdocError::Parse {
            message: message.into(),
            position,
        }
    }

    /// Whether the error is recovered inside a handler and reported as `nil`
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RtdocError::Parse { .. }
                | RtdocError::DocumentNotFound { .. }
                | RtdocError::CollaboratorNotFound { .. }
                | RtdocError::ResourceExhausted { .. }
        )
    }
}
