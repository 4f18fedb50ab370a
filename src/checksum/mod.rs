//! Checksum engine
//!
//! Checksums are opaque fingerprints compared between sessions to tell NEW,
//! MODIFIED and UNMODIFIED documents apart:
//! - `MetadataChecksummer` / `DocumentChecksummer` capability traits
//! - `FieldMatcher` to select the metadata fields taking part
//! - The generic metadata and MD5 document implementations
//! - `resolve_checksum`, the state resolution shared by both pipeline stages

mod generic;
mod matcher;
mod md5_document;
mod resolver;

pub use md5_document::Md5DocumentChecksummer;
pub use generic::GenericMetadataChecksummer;
pub use matcher::{matches_field_name, FieldMatcher};
pub use resolver::{resolve_checksum, ChecksumKind};

use crate::doc::{Document, Metadata};
use std::sync::Arc;

/// Computes a checksum from document metadata
pub trait MetadataChecksummer: Send + Sync {
    /// Returns `None` when there is nothing to checksum
    fn create_metadata_checksum(&self, metadata: &Metadata) -> Option<String>;
}

/// Computes a checksum from a whole document
pub trait DocumentChecksummer: Send + Sync {
    /// Returns `None` when there is nothing to checksum
    fn create_document_checksum(&self, document: &Document) -> Option<String>;
}

/// A configured metadata checksummer and what to do with its result
#[derive(Clone)]
pub struct MetadataChecksumSetup {
    pub checksummer: Arc<dyn MetadataChecksummer>,
    /// Copy the checksum into the document metadata
    pub keep: bool,
    pub to_field: String,
    pub deduplicate: bool,
}

/// A configured document checksummer and what to do with its result
#[derive(Clone)]
pub struct DocumentChecksumSetup {
    pub checksummer: Arc<dyn DocumentChecksummer>,
    pub keep: bool,
    pub to_field: String,
    pub deduplicate: bool,
}
