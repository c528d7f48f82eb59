//! Plan file: `<blake3 hex>\n<buffer>`
//!
//! The digest covers the buffer text only. A file whose digest doesn't match
//! is never handed to APPLY.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use thiserror::Error;
use wirekit::WireBuffer;

#[derive(Debug, Error)]
pub enum PlanFileError {
    #[error("plan file has no digest line")]
    MissingDigest,

    #[error("plan digest mismatch: header says {expected}, content hashes to {actual}")]
    DigestMismatch { expected: String, actual: String },
}

pub fn digest(buffer: &WireBuffer) -> String {
    blake3::hash(buffer.as_str().as_bytes()).to_hex().to_string()
}

pub fn encode(buffer: &WireBuffer) -> String {
    format!("{}\n{}", digest(buffer), buffer.as_str())
}

/// Split off and check the digest line.
///
/// The body is kept in the allocation it was read into and the text is
/// scrubbed whenever it is rejected.
pub fn decode(mut content: String) -> std::result::Result<WireBuffer, PlanFileError> {
    let Some(split) = content.find('\n') else {
        drop(WireBuffer::from_string(content));
        return Err(PlanFileError::MissingDigest);
    };
    let expected = content[..split].to_string();
    content.replace_range(..=split, "");
    let buffer = WireBuffer::from_string(content);
    let actual = digest(&buffer);
    if actual != expected {
        return Err(PlanFileError::DigestMismatch { expected, actual });
    }
    Ok(buffer)
}

pub fn write(path: &Path, buffer: &WireBuffer) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    fs::write(path, encode(buffer))
        .with_context(|| format!("Failed to write plan file: {}", path.display()))?;
    log::debug!("Wrote plan to {}", path.display());
    Ok(())
}

pub fn read(path: &Path) -> Result<WireBuffer> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
    decode(content).with_context(|| format!("Rejected plan file: {}", path.display()))
}
