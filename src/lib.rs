//! # Eventload - staged event-data import and publishing
//!
//! Eventload collects heterogeneous event-domain records (performers,
//! sessions, venues, days, groups, venue categories, languages) from
//! arbitrary upstream sources, resolves cross-entity references and
//! per-language fallbacks, validates every constructed document against a
//! JSON Schema and publishes a consistent snapshot into a document store,
//! pruning documents no longer referenced.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐     ┌───────────────┐
//! │   Upstream   │────▶│   Staging   │────▶│  Construct   │────▶│   Document    │
//! │   sources    │     │  (kv+index) │     │  + Validate  │     │  store+prune  │
//! └──────────────┘     └─────────────┘     └──────────────┘     └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eventload::{create_importer, run_items_import, MemoryDocumentStore, MemoryStore, Settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = Settings::new(vec!["en".into(), "cs".into()], "en");
//!     let importer = create_importer(
//!         settings,
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryDocumentStore::new()),
//!     )
//!     .await
//!     .unwrap();
//!     let state = run_items_import(&importer, items).await.unwrap();
//!     println!("import {} finished: {}", state.import_id, state.error_summary);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Infrastructure errors and import diagnostics
//! - [`models`] - Domain models (Item, ItemType, shared sub-structures)
//! - [`merge`] - Deep-merge of staged payloads
//! - [`sanitize`] - Markup stripping and field sanitization
//! - [`store`] - Staging store capability and key scheme
//! - [`docstore`] - Document store capability, paths and REST client
//! - [`validation`] - Schema registry and validator adapter
//! - [`import`] - The importer aggregate and pipeline stages
//! - [`api`] - HTTP API server and log streaming

// Core modules
pub mod error;
pub mod models;

// Shared helpers
pub mod merge;
pub mod sanitize;
pub mod util;

// Storage
pub mod docstore;
pub mod store;

// Validation
pub mod validation;

// Pipeline
pub mod import;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    DocStoreError,
    ErrorDetail,
    ImportError,
    ImportErrorKind,
    OutOfBounds,
    ServerError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    native_language_name,
    CustomField,
    GroupType,
    Image,
    Item,
    ItemType,
    Link,
    VenueCategoryLayout,
};

// =============================================================================
// Re-exports - Merge & sanitization
// =============================================================================

pub use merge::deep_merge;
pub use sanitize::{sanitize_custom_fields, sanitize_links, strip_html};

// =============================================================================
// Re-exports - Stores
// =============================================================================

pub use docstore::{DocumentStore, HttpDocumentStore, MemoryDocumentStore};
pub use store::{MemoryStore, StagingStore};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::Validator;

// =============================================================================
// Re-exports - Importer
// =============================================================================

pub use import::construct::{construct_items, validate_items, BuildContext};
pub use import::extract::{extract_sources, start_loading, ExtractTask, MAX_EXTRACT_CONCURRENCY};
pub use import::ingest::{add_item, add_items};
pub use import::progress::{save_importer_state, SavedState, Stage};
pub use import::prune::delete_unreferenced;
pub use import::resolver::{populate_many, populate_one};
pub use import::upload::{upload, UploadError, UPLOAD_STEPS};
pub use import::{
    begin_import,
    create_importer,
    create_importer_from_state,
    run_items_import,
    EventImporter,
    ImageReuploader,
    Settings,
    SettingsError,
};

// Server
pub mod server {
    pub use crate::api::server::{start_server, AppState};
}
