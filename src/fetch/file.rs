use crate::doc::Metadata;
use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Fetches local files and directories
///
/// A directory's content is its sorted entry listing and every entry becomes
/// a child reference. References may carry a `file://` prefix.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    max_file_size: Option<u64>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files larger than this are reported as BAD_STATUS
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    fn to_path(reference: &str) -> Result<PathBuf, FetchError> {
        let path = reference.strip_prefix("file://").unwrap_or(reference);
        if path.is_empty() {
            return Err(FetchError::InvalidReference(reference.to_string()));
        }
        Ok(PathBuf::from(path))
    }

    fn fetch_directory(&self, path: &Path, metadata: Metadata) -> Result<FetchResponse, FetchError> {
        let mut children: Vec<String> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().to_string_lossy().into_owned())
            .collect();
        children.sort();

        let listing = children.join("\n").into_bytes();
        Ok(FetchResponse::ok(listing, metadata).with_children(children))
    }
}

impl Fetcher for FileFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let path = Self::to_path(&request.reference)?;

        let stat = match std::fs::metadata(&path) {
            Ok(stat) => stat,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FetchResponse::not_found()),
            Err(e) => return Err(e.into()),
        };

        let mut metadata = Metadata::new();
        if let Some(name) = path.file_name() {
            metadata.set("file.name", name.to_string_lossy());
        }
        if let Ok(modified) = stat.modified() {
            metadata.set("file.last-modified", DateTime::<Utc>::from(modified).to_rfc3339());
        }

        if stat.is_dir() {
            metadata.set("file.directory", "true");
            return self.fetch_directory(&path, metadata);
        }

        if let Some(max) = self.max_file_size {
            if stat.len() > max {
                return Ok(FetchResponse::bad_status(format!(
                    "file size {} exceeds {} bytes",
                    stat.len(),
                    max
                )));
            }
        }

        metadata.set("file.size", stat.len().to_string());
        metadata.set("Content-Type", content_type(&path));
        let content = std::fs::read(&path)?;
        Ok(FetchResponse::ok(content, metadata))
    }
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("txt") | Some("md") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
