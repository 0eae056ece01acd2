use std::fmt;

use crate::revision::{MalformedRevision, Revision};

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MalformedRevision,
    InvalidDocumentId,
    InvalidFields,
    PayloadTooLarge,
    GenerationExhausted,
    NotFound,
    Conflict,
    ConsistencyError,
    StorageError,
    Busy,
    ConfigParseError,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MalformedRevision => "E1001",
            Self::InvalidDocumentId => "E1002",
            Self::InvalidFields => "E1003",
            Self::PayloadTooLarge => "E1004",
            Self::GenerationExhausted => "E1005",
            Self::NotFound => "E2001",
            Self::Conflict => "E2002",
            Self::ConsistencyError => "E3001",
            Self::StorageError => "E5001",
            Self::Busy => "E5002",
            Self::ConfigParseError => "E6001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MalformedRevision => "Malformed revision",
            Self::InvalidDocumentId => "Invalid document id",
            Self::InvalidFields => "Invalid document fields",
            Self::PayloadTooLarge => "Payload too large",
            Self::GenerationExhausted => "Revision generation exhausted",
            Self::NotFound => "Not found",
            Self::Conflict => "Document update conflict",
            Self::ConsistencyError => "Store consistency error",
            Self::StorageError => "Storage error",
            Self::Busy => "Store busy",
            Self::ConfigParseError => "Config file parse error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::MalformedRevision => {
                Some("Revisions look like `<generation>-<32 hex chars>`; pass an empty revision for new documents.")
            }
            Self::InvalidDocumentId => Some("Use a non-empty id of at most 40 bytes."),
            Self::InvalidFields => Some("Document fields must be a JSON object."),
            Self::PayloadTooLarge => Some("Keep ids within 40 bytes and fields within 1 MiB of canonical JSON."),
            Self::GenerationExhausted => {
                Some("The base revision is at the highest generation; branch from an older revision.")
            }
            Self::NotFound => None,
            Self::Conflict => Some("Fetch the current revision and retry, or allow a conflicting branch."),
            Self::ConsistencyError => {
                Some("The document index points at a missing revision. Do not retry; inspect the database.")
            }
            Self::StorageError => Some("Check disk space and permissions, then retry."),
            Self::Busy => Some("Retry after other readers or writers finish."),
            Self::ConfigParseError => Some("Fix the syntax of the mmdb config file and retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every failure the store can report.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Revision text could not be parsed.
    #[error(transparent)]
    MalformedRevision(#[from] MalformedRevision),

    /// The document id is empty.
    #[error("invalid document id: {reason}")]
    InvalidDocumentId { reason: &'static str },

    /// Document fields were not a JSON object.
    #[error("invalid document fields: {reason}")]
    InvalidFields { reason: String },

    /// The id or the canonical fields exceed their size limit.
    #[error("{what} is {len} bytes, limit is {limit}")]
    PayloadTooLarge {
        what: &'static str,
        len: usize,
        limit: usize,
    },

    /// The base revision's generation cannot be incremented.
    #[error("revision '{base}' of document '{id}' is at the highest generation")]
    GenerationExhausted { id: String, base: Revision },

    /// No document or revision at that key.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The optimistic-concurrency check failed, or the revision already exists.
    #[error("conflict on document '{id}': base revision '{base}' is not current revision '{current}'")]
    Conflict {
        id: String,
        base: Revision,
        current: Revision,
    },

    /// A revision record with this identifier already exists.
    #[error("revision '{revision}' already exists for document '{id}'")]
    DuplicateRevision { id: String, revision: Revision },

    /// The document index and revision records disagree.
    #[error("consistency error on document '{id}': {detail}")]
    Consistency { id: String, detail: String },

    /// The database reported a lock it did not release within the busy timeout.
    #[error("store is busy: {0}")]
    Busy(rusqlite::Error),

    /// Any other failure from SQLite.
    #[error("storage error: {0}")]
    Storage(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if is_busy(&err) {
            Self::Busy(err)
        } else {
            Self::Storage(err)
        }
    }
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedRevision(_) => ErrorCode::MalformedRevision,
            Self::InvalidDocumentId { .. } => ErrorCode::InvalidDocumentId,
            Self::InvalidFields { .. } => ErrorCode::InvalidFields,
            Self::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            Self::GenerationExhausted { .. } => ErrorCode::GenerationExhausted,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict { .. } | Self::DuplicateRevision { .. } => ErrorCode::Conflict,
            Self::Consistency { .. } => ErrorCode::ConsistencyError,
            Self::Busy(_) => ErrorCode::Busy,
            Self::Storage(_) => ErrorCode::StorageError,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// True when retrying the same call later may succeed.
    ///
    /// `Conflict` is retryable only after re-reading the current revision,
    /// so it is not included.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Storage(_))
    }

    /// Build a [`StoreError::NotFound`] for a document, or for one revision
    /// of it when `revision` is not the sentinel.
    #[must_use]
    pub fn not_found(id: &str, revision: &Revision) -> Self {
        let what = if revision.is_none() {
            format!("document '{id}'")
        } else {
            format!("revision '{revision}' of document '{id}'")
        };
        Self::NotFound { what }
    }

    pub(crate) fn consistency(id: &str, detail: impl Into<String>) -> Self {
        Self::Consistency {
            id: id.to_string(),
            detail: detail.into(),
        }
    }
}

/// True for `SQLITE_BUSY` and `SQLITE_LOCKED`.
pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// True for a uniqueness or primary-key violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
