//! Plain-text document source.
//!
//! Reads UTF-8 `.txt` / `.md` files. Binary formats are parsed upstream.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::types::Document;
use crate::core::errors::RagError;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Loads one file. The document id is derived from the canonical path, so
/// re-ingesting the same file replaces its earlier chunks.
pub fn load_document(path: &Path) -> Result<Document, RagError> {
    if !is_supported(path) {
        return Err(RagError::Source(format!(
            "unsupported file type: {}",
            path.display()
        )));
    }

    let text = fs::read_to_string(path)
        .map_err(|e| RagError::Source(format!("{}: {}", path.display(), e)))?;
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let source = canonical.to_string_lossy().to_string();
    let id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, source.as_bytes()).to_string();
    let title = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| source.clone());

    Ok(Document::new(id, text)
        .with_metadata("source", Value::from(source))
        .with_metadata("title", Value::from(title))
        .with_metadata("loaded_at", Value::from(chrono::Utc::now().to_rfc3339())))
}

/// Supported files directly inside `dir`, sorted by path.
pub fn list_directory(dir: &Path) -> Result<Vec<PathBuf>, RagError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_supported(path))
        .collect();
    files.sort();
    Ok(files)
}

pub fn load_directory(dir: &Path) -> Result<Vec<Document>, RagError> {
    list_directory(dir)?
        .iter()
        .map(|path| load_document(path))
        .collect()
}

/// Expands directories and keeps files, preserving argument order.
pub fn collect_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, RagError> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            out.extend(list_directory(input)?);
        } else {
            out.push(input.clone());
        }
    }
    Ok(out)
}
