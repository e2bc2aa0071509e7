use std::io;
use thiserror::Error;

/// Result type for flatarc operations
pub type Result<T> = std::result::Result<T, FlatarcError>;

/// A reference field whose value falls outside its target resource.
///
/// Produced one per violation by [`crate::Archive::validate_references`],
/// and carried inside [`FlatarcError::DanglingReference`] when a checked
/// dereference fails at access time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "dangling reference: {resource}[{index}].{field} = {value} exceeds {target} (len {target_len})"
)]
pub struct DanglingReference {
    /// Resource holding the referencing record
    pub resource: String,
    /// Index of the referencing record
    pub index: u64,
    /// Field carrying the reference
    pub field: String,
    /// Decoded field value, after any absent-sentinel shift
    pub value: u64,
    /// Referenced resource
    pub target: String,
    /// Element count (or byte length) of the referenced resource
    pub target_len: u64,
}

/// Unified error type for all flatarc operations
#[derive(Debug, Error)]
pub enum FlatarcError {
    // Framing errors
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Invalid magic number in archive header")]
    InvalidMagic,

    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    #[error("CRC mismatch: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("Byte span truncated in {context}: need {needed} bytes, have {available}")]
    Truncated {
        context: String,
        needed: usize,
        available: usize,
    },

    // Schema errors
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Archive schema does not match supplied schema: {0}")]
    SchemaMismatch(String),

    #[error("Unknown field {field} in record {record}")]
    UnknownField { record: String, field: String },

    #[error("Field {field} of record {record} is not {expected}")]
    FieldKindMismatch {
        record: String,
        field: String,
        expected: &'static str,
    },

    // Codec errors
    #[error("Value {value} does not fit {width}-bit field {field}")]
    OutOfRange {
        field: String,
        width: u32,
        value: i128,
    },

    // Resource access errors
    #[error("Resource not found in archive: {0}")]
    ResourceNotFound(String),

    #[error("Resource {name} is not a {expected}")]
    ResourceKindMismatch { name: String, expected: &'static str },

    #[error("Index {index} out of bounds for {resource} (len {len})")]
    IndexOutOfBounds {
        resource: String,
        index: u64,
        len: u64,
    },

    #[error("Unknown variant tag {tag} in multivector {resource}")]
    UnknownVariant { resource: String, tag: u8 },

    #[error(transparent)]
    DanglingReference(#[from] DanglingReference),

    // Builder errors
    #[error("Resource {0} was never written before finalize")]
    IncompleteResource(String),

    #[error("Multivector {0} still has an item open")]
    UnclosedItem(String),

    #[error("Multivector {0} has no item open")]
    NoOpenItem(String),

    #[error("Resource {0} was already written")]
    DuplicateResource(String),

    #[error("Sentinel misuse on vector {0}")]
    SentinelMismatch(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(String),
}

impl From<toml::de::Error> for FlatarcError {
    fn from(err: toml::de::Error) -> Self {
        FlatarcError::TomlError(err.to_string())
    }
}

impl From<toml::ser::Error> for FlatarcError {
    fn from(err: toml::ser::Error) -> Self {
        FlatarcError::TomlError(err.to_string())
    }
}
