//! Document module
//!
//! # Components
//!
//! - `DocState`: Outcome of processing a reference (NEW, MODIFIED, REJECTED, ...)
//! - `DocContext`: Persisted lifecycle record of one reference
//! - `Document`: A context plus fetched content and metadata

mod context;
mod document;
mod state;

pub use context::DocContext;
pub use document::{Document, Metadata};
pub use state::DocState;
