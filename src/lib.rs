//! Flatarc: schema-driven, bit-packed binary container with zero-copy
//! random access.
//!
//! An archive is a named collection of resources laid out in one
//! contiguous byte span: fixed-stride vectors of bit-packed records,
//! multivectors of variable-length tagged record sequences, and raw byte
//! blobs. A [`Schema`] declares the record layouts, the resource slots,
//! and a graph of reference edges between them; the engine enforces that
//! graph with bounds-checked accessors and an aggregating
//! integrity-report pass. Archives are write-once: a single-writer
//! [`ArchiveBuilder`] appends resources sequentially, and a bound
//! [`Archive`] is immutable and freely shared across readers.
//!
//! # Example
//!
//! ```
//! use flatarc::{Archive, ArchiveBuilder, FieldKind, RecordLayout, ResourceDef, Schema};
//!
//! let schema = Schema::new("tiny")
//!     .with_record(RecordLayout::packed(
//!         "Tag",
//!         &[
//!             ("key_idx", FieldKind::Unsigned, 32),
//!             ("value_idx", FieldKind::Unsigned, 32),
//!         ],
//!     ))
//!     .with_resource(ResourceDef::vector("tags", "Tag"));
//!
//! let mut builder = ArchiveBuilder::new(&schema)?;
//! let mut tags = builder.vector("tags")?;
//! let mut tag = tags.grow()?;
//! tag.set("key_idx", 3)?;
//! tag.set("value_idx", 9)?;
//! tags.close()?;
//! let bytes = builder.finalize()?;
//!
//! let archive = Archive::bind(&bytes, &schema)?;
//! let tags = archive.vector("tags")?;
//! assert_eq!(tags.len(), 1);
//! assert_eq!(tags.at(0)?.get_u64("key_idx")?, 3);
//! # Ok::<(), flatarc::FlatarcError>(())
//! ```

// Core modules
pub mod archive;
pub mod error;
pub mod packed;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use archive::{
    Archive, ArchiveBuilder, BindOptions, MultivectorView, MultivectorWriter, RawDataView,
    RawDataWriter, VectorView, VectorWriter, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR,
    HEADER_SIZE, MAGIC_NUMBER,
};
pub use error::{DanglingReference, FlatarcError, Result};
pub use packed::{FieldValue, RecordMut, RecordRef};
pub use schema::{
    BindingGroup, FieldDef, FieldKind, RecordLayout, RefEdge, RefKind, ResourceDef, ResourceKind,
    Schema, Variant,
};
