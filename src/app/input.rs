//! Local files handed to a single analysis request.

use crate::domain::model::PipelineRequest;
use crate::utils::error::Result;
use std::path::Path;

/// Reads `path` as undecoded bytes. The content type is inferred from the
/// extension unless one is given.
pub fn read_input_file<P: AsRef<Path>>(path: P, content_type: Option<String>) -> Result<PipelineRequest> {
    let path = path.as_ref();
    let body = std::fs::read(path)?;
    tracing::debug!("Read {} bytes from {}", body.len(), path.display());

    Ok(PipelineRequest {
        content_type: content_type.or_else(|| content_type_for(path)),
        ..PipelineRequest::bytes(body)
    })
}

pub fn content_type_for(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "html" | "htm" | "xhtml" => Some("text/html".to_string()),
        "txt" | "text" => Some("text/plain".to_string()),
        _ => None,
    }
}
