//! Manifest management subsystem.
//!
//! # Data Flow
//! ```text
//! manifest file (TOML/JSON)
//!     → loader.rs (parse & deserialize into ManifestDocument)
//!     → schema.rs (annotation defaulting)
//!     → validation.rs (identifier uniqueness, index)
//!     → Manifest (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new manifest
//!     → receiver compiles a new dispatcher and swaps it in
//! ```
//!
//! # Design Decisions
//! - Manifest is immutable once loaded; changes require a full reload
//! - Optional fields default so minimal manifests stay minimal
//! - Route patterns and destinations are checked at compile time, not here

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_manifest, LoadError};
pub use schema::{Manifest, ManifestBuilder, ManifestDocument, Route, Upstream, UpstreamDocument};
pub use watcher::{ManifestWatcher, WatchHandle};
