use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::graph::CollaboratorError;
use crate::model::Document;

use super::{DocumentRenderer, RenderMetadata};

fn io_error(path: &Path, err: std::io::Error) -> CollaboratorError {
    CollaboratorError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

pub(crate) fn ensure_directory(path: &Path) -> Result<(), CollaboratorError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| io_error(path, e))?;
    }
    Ok(())
}

/// Writes `content` next to `path` under a unique temporary name, then
/// renames it into place. Readers never observe a partially written file,
/// and an existing file at `path` is replaced.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), CollaboratorError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_directory(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let written = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_error(&temp_path, e));
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_error(path, e));
    }
    Ok(())
}

#[derive(Serialize)]
struct RenderedDocument<'a> {
    metadata: &'a RenderMetadata,
    document: &'a Document,
}

/// Renders documents as pretty-printed JSON with the metadata alongside.
pub struct JsonRenderer;

impl DocumentRenderer for JsonRenderer {
    fn extension(&self) -> &str {
        "json"
    }

    fn render(
        &self,
        document: &Document,
        output: &Path,
        metadata: &RenderMetadata,
    ) -> Result<PathBuf, CollaboratorError> {
        let content = serde_json::to_vec_pretty(&RenderedDocument { metadata, document })
            .map_err(|e| CollaboratorError::failed(format!("Failed to serialize document: {}", e)))?;
        write_atomic(output, &content)?;
        Ok(output.to_path_buf())
    }
}
