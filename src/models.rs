//! Core data models used throughout docsync.
//!
//! These types represent the files, documents, and sections that flow through
//! the discovery and reconciliation pipeline.

use std::path::PathBuf;

/// A leaf file found by the directory walker, before parsing.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the walk root, `/`-separated on every platform.
    pub path: String,
    /// Absolute path on disk, used to read the raw bytes.
    pub abs_path: PathBuf,
    /// Relative path of the nearest enclosing parent document, if any.
    pub parent_path: Option<String>,
}

/// A fully-formed document produced by the discovery pipeline, ready for
/// reconciliation against the store.
#[derive(Debug, Clone)]
pub struct DiscoveredDocument {
    pub path: String,
    pub checksum: String,
    pub parent_path: Option<String>,
    /// Literal metadata record extracted from the document, if declared.
    pub meta: Option<serde_json::Value>,
    pub sections: Vec<SectionInput>,
}

/// A section produced by the sectionizer, not yet embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionInput {
    /// `None` for the headerless preamble section.
    pub slug: Option<String>,
    /// Mirrors `slug` presence.
    pub heading: Option<String>,
    /// Canonical serialized text of the section span.
    pub content: String,
    pub token_count: i64,
}

/// A document row as persisted in SQLite.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub path: String,
    pub checksum: String,
    pub parent_path: Option<String>,
}

/// A section row as persisted in SQLite.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: String,
    pub document_id: String,
    pub slug: Option<String>,
    pub heading: Option<String>,
    pub content: String,
    pub token_count: i64,
    pub embedding: Vec<f32>,
}
