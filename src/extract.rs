//! Plain-text extraction for ingested files.
//!
//! `.txt` and `.md` files are read as UTF-8. `.pdf` files go through
//! `pdf-extract`. Anything else is rejected with
//! [`RadiateError::UnsupportedFormat`]. Extraction is blocking; async
//! callers should run it on the blocking pool.

use std::path::Path;

use crate::error::{RadiateError, Result};

/// Extensions accepted by [`read_text`], lowercase and without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// Read the text content of a supported file.
pub fn read_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(RadiateError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => {
            let bytes = std::fs::read(path)?;
            String::from_utf8(bytes).map_err(|e| {
                RadiateError::Extraction(format!(
                    "{} is not valid UTF-8: {}",
                    path.display(),
                    e.utf8_error()
                ))
            })
        }
        "pdf" => {
            let bytes = std::fs::read(path)?;
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                RadiateError::Extraction(format!(
                    "PDF extraction failed for {}: {}",
                    path.display(),
                    e
                ))
            })
        }
        _ => Err(RadiateError::UnsupportedFormat {
            extension: if ext.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", ext)
            },
        }),
    }
}
