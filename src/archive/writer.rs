use crate::archive::format::{ArchiveHeader, ResourceEntry, ResourceKindTag, HEADER_SIZE};
use crate::archive::multivector::OFFSET_SIZE;
use crate::error::{FlatarcError, Result};
use crate::packed::RecordMut;
use crate::schema::{RecordLayout, ResourceKind, Schema, Variant};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Sequential, append-only archive builder.
///
/// Resources may be written in any order, but each is append-only and
/// committed exactly once; [`ArchiveBuilder::finalize`] checks that every
/// schema-declared resource was written and emits the schema blob,
/// resource table, and patched header. The builder is single-writer and
/// is consumed by `finalize`, so a failed build cannot be reused.
#[derive(Debug)]
pub struct ArchiveBuilder {
    schema: Schema,
    buf: Vec<u8>,
    entries: Vec<ResourceEntry>,
    written: HashSet<String>,
}

impl ArchiveBuilder {
    /// Create a builder for the given schema.
    pub fn new(schema: &Schema) -> Result<Self> {
        schema.validate()?;
        let mut buf = Vec::new();
        // Placeholder header, patched at finalize
        ArchiveHeader::new().write_to(&mut buf)?;
        Ok(Self {
            schema: schema.clone(),
            buf,
            entries: Vec::new(),
            written: HashSet::new(),
        })
    }

    /// Open the vector resource `name` for sequential appends.
    pub fn vector(&mut self, name: &str) -> Result<VectorWriter<'_>> {
        let (record, sentinel) = match &self.claim(name)?.kind {
            ResourceKind::Vector { record, sentinel } => (record.clone(), *sentinel),
            _ => {
                return Err(FlatarcError::ResourceKindMismatch {
                    name: name.to_string(),
                    expected: "vector",
                })
            }
        };
        let layout = self.record_layout(&record)?;
        Ok(VectorWriter {
            builder: self,
            name: name.to_string(),
            layout,
            sentinel,
            sentinel_written: false,
            buf: Vec::new(),
            count: 0,
        })
    }

    /// Open the multivector resource `name` for item-by-item appends.
    pub fn multivector(&mut self, name: &str) -> Result<MultivectorWriter<'_>> {
        let variants = match &self.claim(name)?.kind {
            ResourceKind::Multivector { variants } => variants.clone(),
            _ => {
                return Err(FlatarcError::ResourceKindMismatch {
                    name: name.to_string(),
                    expected: "multivector",
                })
            }
        };
        let mut resolved = Vec::with_capacity(variants.len());
        for Variant { tag, record } in &variants {
            resolved.push((*tag, self.record_layout(record)?));
        }
        Ok(MultivectorWriter {
            builder: self,
            name: name.to_string(),
            variants: resolved,
            data: Vec::new(),
            offsets: vec![0],
            item_open: false,
        })
    }

    /// Open the raw data resource `name` for byte appends.
    pub fn raw_data(&mut self, name: &str) -> Result<RawDataWriter<'_>> {
        match &self.claim(name)?.kind {
            ResourceKind::RawData => {}
            _ => {
                return Err(FlatarcError::ResourceKindMismatch {
                    name: name.to_string(),
                    expected: "raw data",
                })
            }
        }
        Ok(RawDataWriter {
            builder: self,
            name: name.to_string(),
            buf: Vec::new(),
        })
    }

    /// Emit the schema blob, resource table, and final header, and hand
    /// back the finished archive bytes.
    pub fn finalize(mut self) -> Result<Vec<u8>> {
        for resource in &self.schema.resources {
            if !self.written.contains(&resource.name) {
                return Err(FlatarcError::IncompleteResource(resource.name.clone()));
            }
        }

        let schema_offset = self.buf.len() as u64;
        let schema_json = serde_json::to_vec(&self.schema)?;
        self.buf.extend_from_slice(&schema_json);
        let schema_size = schema_json.len() as u64;

        let table_offset = self.buf.len() as u64;
        for entry in &self.entries {
            entry.write_to(&mut self.buf)?;
        }
        let table_size = self.buf.len() as u64 - table_offset;

        let mut header = ArchiveHeader::new();
        header.table_offset = table_offset;
        header.table_size = table_size;
        header.resource_count = self.entries.len() as u32;
        header.schema_offset = schema_offset;
        header.schema_size = schema_size;
        header.header_crc = header.compute_crc();

        let mut header_bytes = Vec::with_capacity(HEADER_SIZE);
        header.write_to(&mut header_bytes)?;
        self.buf[..HEADER_SIZE].copy_from_slice(&header_bytes);

        debug!(
            schema = %self.schema.name,
            resources = self.entries.len(),
            bytes = self.buf.len(),
            "archive finalized"
        );
        Ok(self.buf)
    }

    /// Check that `name` is a declared, not-yet-written resource.
    fn claim(&self, name: &str) -> Result<&crate::schema::ResourceDef> {
        if self.written.contains(name) {
            return Err(FlatarcError::DuplicateResource(name.to_string()));
        }
        self.schema
            .resource(name)
            .ok_or_else(|| FlatarcError::ResourceNotFound(name.to_string()))
    }

    fn record_layout(&self, record: &str) -> Result<RecordLayout> {
        self.schema
            .record(record)
            .cloned()
            .ok_or_else(|| FlatarcError::InvalidSchema(format!("unknown record {}", record)))
    }

    fn commit(
        &mut self,
        name: String,
        kind: ResourceKindTag,
        region: Vec<u8>,
        count: u64,
        index_size: u64,
    ) {
        let data_offset = self.buf.len() as u64;
        let crc32 = crc32fast::hash(&region);
        trace!(
            resource = %name,
            offset = data_offset,
            size = region.len(),
            count,
            "resource committed"
        );
        self.buf.extend_from_slice(&region);
        self.entries.push(ResourceEntry {
            name: name.clone(),
            kind,
            data_offset,
            data_size: region.len() as u64,
            count,
            index_size,
            crc32,
        });
        self.written.insert(name);
    }
}

/// Append-only writer for one vector resource.
#[derive(Debug)]
pub struct VectorWriter<'b> {
    builder: &'b mut ArchiveBuilder,
    name: String,
    layout: RecordLayout,
    sentinel: bool,
    sentinel_written: bool,
    buf: Vec<u8>,
    count: u64,
}

impl VectorWriter<'_> {
    /// Append one zeroed record and return it for field encoding.
    pub fn grow(&mut self) -> Result<RecordMut<'_>> {
        if self.sentinel_written {
            return Err(FlatarcError::SentinelMismatch(self.name.clone()));
        }
        self.count += 1;
        let start = self.buf.len();
        self.buf.resize(start + self.layout.byte_size(), 0);
        Ok(RecordMut::new(&mut self.buf[start..], &self.layout))
    }

    /// Append the sentinel record, which must come last. Only valid on
    /// sentinel-declared vectors, once; the caller fills its range
    /// fields with the referenced resource's final totals.
    pub fn sentinel(&mut self) -> Result<RecordMut<'_>> {
        if !self.sentinel || self.sentinel_written {
            return Err(FlatarcError::SentinelMismatch(self.name.clone()));
        }
        self.sentinel_written = true;
        self.count += 1;
        let start = self.buf.len();
        self.buf.resize(start + self.layout.byte_size(), 0);
        Ok(RecordMut::new(&mut self.buf[start..], &self.layout))
    }

    /// Logical records appended so far (excluding the sentinel).
    pub fn len(&self) -> u64 {
        self.count - self.sentinel_written as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commit the vector into the archive.
    pub fn close(self) -> Result<()> {
        if self.sentinel && !self.sentinel_written {
            return Err(FlatarcError::SentinelMismatch(self.name));
        }
        let Self {
            builder,
            name,
            buf,
            count,
            ..
        } = self;
        builder.commit(name, ResourceKindTag::Vector, buf, count, 0);
        Ok(())
    }
}

/// Append-only writer for one multivector resource.
///
/// Items follow a strict open/append/close protocol; closing an item
/// with zero appends is valid and records the same offset as the
/// previous close.
pub struct MultivectorWriter<'b> {
    builder: &'b mut ArchiveBuilder,
    name: String,
    variants: Vec<(u8, RecordLayout)>,
    data: Vec<u8>,
    offsets: Vec<u64>,
    item_open: bool,
}

impl MultivectorWriter<'_> {
    /// Open the next logical item.
    pub fn start_item(&mut self) -> Result<()> {
        if self.item_open {
            return Err(FlatarcError::UnclosedItem(self.name.clone()));
        }
        self.item_open = true;
        Ok(())
    }

    /// Append one tagged, zeroed sub-record to the open item.
    pub fn append(&mut self, tag: u8) -> Result<RecordMut<'_>> {
        if !self.item_open {
            return Err(FlatarcError::NoOpenItem(self.name.clone()));
        }
        let layout = match self.variants.iter().find(|(t, _)| *t == tag) {
            Some((_, layout)) => layout,
            None => {
                return Err(FlatarcError::UnknownVariant {
                    resource: self.name.clone(),
                    tag,
                })
            }
        };
        self.data.push(tag);
        let start = self.data.len();
        self.data.resize(start + layout.byte_size(), 0);
        Ok(RecordMut::new(&mut self.data[start..], layout))
    }

    /// Close the open item, recording the stream offset into the index.
    pub fn close_item(&mut self) -> Result<()> {
        if !self.item_open {
            return Err(FlatarcError::NoOpenItem(self.name.clone()));
        }
        self.item_open = false;
        self.offsets.push(self.data.len() as u64);
        Ok(())
    }

    /// Logical items closed so far.
    pub fn len(&self) -> u64 {
        self.offsets.len() as u64 - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commit the multivector into the archive.
    pub fn close(self) -> Result<()> {
        if self.item_open {
            return Err(FlatarcError::UnclosedItem(self.name));
        }
        let Self {
            builder,
            name,
            data,
            offsets,
            ..
        } = self;
        let count = offsets.len() as u64 - 1;
        let index_size = offsets.len() * OFFSET_SIZE;
        let mut region = Vec::with_capacity(index_size + data.len());
        for offset in &offsets {
            region.extend_from_slice(&offset.to_le_bytes());
        }
        region.extend_from_slice(&data);
        builder.commit(
            name,
            ResourceKindTag::Multivector,
            region,
            count,
            index_size as u64,
        );
        Ok(())
    }
}

/// Append-only writer for one raw data resource.
pub struct RawDataWriter<'b> {
    builder: &'b mut ArchiveBuilder,
    name: String,
    buf: Vec<u8>,
}

impl RawDataWriter<'_> {
    /// Append raw bytes; returns their starting offset in the blob.
    pub fn append(&mut self, bytes: &[u8]) -> u64 {
        let offset = self.buf.len() as u64;
        self.buf.extend_from_slice(bytes);
        offset
    }

    /// Append a null-terminated string; returns its starting offset.
    pub fn append_string(&mut self, text: &str) -> Result<u64> {
        if text.as_bytes().contains(&0) {
            return Err(FlatarcError::InvalidFormat(format!(
                "embedded NUL in string appended to {}",
                self.name
            )));
        }
        let offset = self.buf.len() as u64;
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(0);
        Ok(offset)
    }

    /// Bytes appended so far.
    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Commit the blob into the archive.
    pub fn close(self) -> Result<()> {
        let Self { builder, name, buf } = self;
        let count = buf.len() as u64;
        builder.commit(name, ResourceKindTag::RawData, buf, count, 0);
        Ok(())
    }
}
