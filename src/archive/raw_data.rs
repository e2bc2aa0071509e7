use crate::error::{FlatarcError, Result};

/// Read-only view of an opaque byte blob.
///
/// Consumers interpret offsets into it by convention; the only helper
/// the engine supplies is null-terminated string lookup. Strings are
/// borrowed views into the archive span, never copies.
#[derive(Debug, Clone, Copy)]
pub struct RawDataView<'a> {
    name: &'a str,
    bytes: &'a [u8],
}

impl<'a> RawDataView<'a> {
    pub(crate) fn new(name: &'a str, bytes: &'a [u8]) -> Self {
        Self { name, bytes }
    }

    /// The whole blob.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Blob length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read the null-terminated string starting at `offset`.
    ///
    /// Fails [`FlatarcError::Truncated`] if no terminator exists before
    /// the end of the blob.
    pub fn string_at(&self, offset: usize) -> Result<&'a str> {
        if offset >= self.bytes.len() {
            return Err(FlatarcError::IndexOutOfBounds {
                resource: self.name.to_string(),
                index: offset as u64,
                len: self.bytes.len() as u64,
            });
        }
        let tail = &self.bytes[offset..];
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| FlatarcError::Truncated {
                context: format!("unterminated string in {}", self.name),
                needed: self.bytes.len() + 1,
                available: self.bytes.len(),
            })?;
        std::str::from_utf8(&tail[..nul]).map_err(|e| {
            FlatarcError::InvalidFormat(format!(
                "invalid UTF-8 at {} offset {}: {}",
                self.name, offset, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_at() {
        let bytes = b"highway\0name\0";
        let view = RawDataView::new("stringtable", bytes);

        assert_eq!(view.string_at(0).unwrap(), "highway");
        assert_eq!(view.string_at(8).unwrap(), "name");
        // Mid-string offsets are legal: strings are just conventions
        assert_eq!(view.string_at(4).unwrap(), "way");
    }

    #[test]
    fn test_missing_terminator() {
        let view = RawDataView::new("stringtable", b"dangling");
        assert!(matches!(
            view.string_at(0).unwrap_err(),
            FlatarcError::Truncated { .. }
        ));
    }

    #[test]
    fn test_offset_out_of_span() {
        let view = RawDataView::new("stringtable", b"a\0");
        assert!(matches!(
            view.string_at(2).unwrap_err(),
            FlatarcError::IndexOutOfBounds { .. }
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let view = RawDataView::new("stringtable", &[0xFF, 0xFE, 0x00]);
        assert!(matches!(
            view.string_at(0).unwrap_err(),
            FlatarcError::InvalidFormat(_)
        ));
    }
}
