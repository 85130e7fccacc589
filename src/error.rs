//! Error types for the event import pipeline.
//!
//! Two families live here:
//!
//! - Infrastructure errors ([`StoreError`], [`DocStoreError`], [`ServerError`])
//!   that propagate with `?` across module boundaries.
//! - Import diagnostics ([`ImportError`]) that never abort a run: they are
//!   appended to the importer's error/warning ledger and summarized into the
//!   persisted state document.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Item;

// =============================================================================
// Import diagnostics (ledger entries)
// =============================================================================

/// Kind of an import diagnostic.
///
/// The display form is the stable message code used in persisted summaries
/// (`"invalid-item-data: 3x"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ImportErrorKind {
    /// No compiled schema exists for the item type.
    #[error("no-validation-schema")]
    NoValidationSchema,
    /// Schema validation rejected the constructed document.
    #[error("invalid-item-data")]
    InvalidItemData,
    /// No staged data was found for a tracked id.
    #[error("no-item-data")]
    NoItemData,
    /// Caller-supplied extraction logic failed; the run ends without data.
    #[error("loading-data-failed")]
    LoadingDataFailed,
    /// A reference points at an entity already marked invalid.
    #[error("invalid-item-reference")]
    InvalidItemReference,
    /// A session takes place outside every day of the event.
    #[error("session-out-of-bounds")]
    SessionOutOfBounds,
    /// A venue resolved zero categories.
    #[error("missing-venue-categories")]
    MissingVenueCategories,
    /// A published document was pruned because nothing references it anymore.
    #[error("deleted-database-item")]
    DeletedDatabaseItem,
    /// The reupload hook failed for an image; the image is dropped.
    #[error("image-reupload-failed")]
    ImageReuploadFailed,
}

/// Session/day bounds attached to a `session-out-of-bounds` diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct OutOfBounds {
    pub session_bounds: (DateTime<Utc>, DateTime<Utc>),
    /// Bounds of the day matched by date stamp, when one was found.
    pub day_bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Typed payload of an import diagnostic.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ErrorDetail {
    #[default]
    None,
    /// Schema violation messages.
    Violations(Vec<String>),
    /// Session/day bounds of an out-of-bounds session.
    OutOfBounds(OutOfBounds),
    /// Underlying cause, stringified.
    Cause(String),
}

/// One entry of the import error/warning ledger.
///
/// Carries the kind, the offending item when known, and a typed detail
/// payload. Appending one never aborts sibling work.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportError {
    pub kind: ImportErrorKind,
    pub item: Option<Item>,
    pub detail: ErrorDetail,
}

impl ImportError {
    pub fn new(kind: ImportErrorKind) -> Self {
        Self {
            kind,
            item: None,
            detail: ErrorDetail::None,
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.item = Some(item);
        self
    }

    pub fn with_violations(mut self, violations: Vec<String>) -> Self {
        self.detail = ErrorDetail::Violations(violations);
        self
    }

    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.detail = ErrorDetail::Cause(cause.to_string());
        self
    }

    pub fn with_bounds(mut self, bounds: OutOfBounds) -> Self {
        self.detail = ErrorDetail::OutOfBounds(bounds);
        self
    }

    /// Stable message code, used to aggregate ledger entries.
    pub fn code(&self) -> String {
        self.kind.to_string()
    }
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(item) = &self.item {
            write!(f, " ({} {})", item.item_type, item.id)?;
        }
        Ok(())
    }
}

// =============================================================================
// Staging store errors
// =============================================================================

/// Errors from the staging store capability.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure (remote store, IO, ...).
    #[error("staging store error: {0}")]
    Backend(String),

    /// Stored value could not be (de)serialized.
    #[error("staging store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Document store errors
// =============================================================================

/// Errors from the target document store.
#[derive(Debug, Error)]
pub enum DocStoreError {
    /// HTTP transport failure.
    #[error("document store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response could not be decoded.
    #[error("document store returned invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success status or malformed response shape.
    #[error("document store rejected the request: {0}")]
    Rejected(String),
}

// =============================================================================
// Server errors
// =============================================================================

/// HTTP API errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid request payload.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Staging store failure during an import run.
    #[error("staging store error: {0}")]
    Store(#[from] StoreError),

    /// Document store failure during an import run.
    #[error("document store error: {0}")]
    DocStore(#[from] DocStoreError),

    /// Anything else.
    #[error("internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result type aliases
// =============================================================================

/// Result type for staging store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for document store operations.
pub type DocStoreResult<T> = Result<T, DocStoreError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
