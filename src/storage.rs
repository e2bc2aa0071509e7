//! Byte-span plumbing.
//!
//! Span acquisition is deliberately minimal: the binder consumes any
//! `&[u8]`, the builder produces a `Vec<u8>`. These helpers cover the
//! common file-backed case; memory mapping and remote fetching are the
//! caller's concern.

use crate::error::Result;
use std::path::Path;

/// Read a whole archive file into an owned byte span.
pub fn read_span<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

/// Write finished archive bytes to a file.
pub fn write_span<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    Ok(std::fs::write(path, bytes)?)
}
