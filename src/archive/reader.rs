use crate::archive::format::{ArchiveHeader, ResourceEntry, ResourceKindTag, HEADER_SIZE};
use crate::archive::multivector::{MultivectorView, OFFSET_SIZE};
use crate::archive::raw_data::RawDataView;
use crate::archive::vector::VectorView;
use crate::error::{DanglingReference, FlatarcError, Result};
use crate::schema::{BindingGroup, RecordLayout, RefEdge, RefKind, ResourceKind, Schema};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::{debug, trace};

/// Bind-time behaviour switches.
///
/// The default is lazy: bind parses and checks the framing only, and
/// every accessor bounds-checks at use. Ingestion pipelines can opt into
/// eager whole-archive checking instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindOptions {
    /// Verify the CRC32 of every resource region during bind.
    pub verify_checksums: bool,
    /// Run full reference validation during bind and fail on the first
    /// violation found.
    pub validate_references: bool,
}

/// A bound, immutable archive over a read-only byte span.
///
/// Binding validates the framing (magic, version, header CRC, resource
/// table, embedded schema) and registers one entry per schema-declared
/// resource. Resource contents are validated lazily when a view is
/// constructed. Once bound, an `Archive` and every view derived from it
/// are immutable and safe to share across threads.
#[derive(Debug)]
pub struct Archive<'a> {
    span: &'a [u8],
    schema: &'a Schema,
    header: ArchiveHeader,
    entries: HashMap<String, ResourceEntry>,
    names: Vec<String>,
}

impl<'a> Archive<'a> {
    /// Bind a byte span against a schema with default (lazy) options.
    pub fn bind(span: &'a [u8], schema: &'a Schema) -> Result<Self> {
        Self::bind_with(span, schema, BindOptions::default())
    }

    /// Bind a byte span against a schema.
    pub fn bind_with(span: &'a [u8], schema: &'a Schema, options: BindOptions) -> Result<Self> {
        schema.validate()?;

        if span.len() < HEADER_SIZE {
            return Err(FlatarcError::Truncated {
                context: "archive header".to_string(),
                needed: HEADER_SIZE,
                available: span.len(),
            });
        }
        let header = ArchiveHeader::read_from(&span[..HEADER_SIZE])?;
        header.validate_version()?;
        header.validate_crc()?;

        // The archive carries its own schema; a mismatch with the caller's
        // means the caller would misinterpret every bit that follows.
        let schema_blob = sub_span(span, header.schema_offset, header.schema_size, "schema blob")?;
        let embedded: Schema = serde_json::from_slice(schema_blob)?;
        if embedded != *schema {
            return Err(FlatarcError::SchemaMismatch(format!(
                "archive was written with schema {}, bound with {}",
                embedded.name, schema.name
            )));
        }

        let table = sub_span(span, header.table_offset, header.table_size, "resource table")?;
        let mut cursor = Cursor::new(table);
        let mut entries = HashMap::with_capacity(header.resource_count as usize);
        for _ in 0..header.resource_count {
            let entry = ResourceEntry::read_from(&mut cursor)?;
            trace!(
                resource = %entry.name,
                offset = entry.data_offset,
                size = entry.data_size,
                "located resource"
            );
            if entries.insert(entry.name.clone(), entry).is_some() {
                return Err(FlatarcError::InvalidFormat(
                    "duplicate resource table entry".to_string(),
                ));
            }
        }

        // Every declared resource must be present, and nothing undeclared
        // may hide in the table.
        let mut names = Vec::with_capacity(schema.resources.len());
        for resource in &schema.resources {
            let entry = entries
                .get(&resource.name)
                .ok_or_else(|| FlatarcError::ResourceNotFound(resource.name.clone()))?;
            let expected = kind_tag(&resource.kind);
            if entry.kind != expected {
                return Err(FlatarcError::InvalidFormat(format!(
                    "resource {} has kind tag {:?}, schema declares {:?}",
                    resource.name, entry.kind, expected
                )));
            }
            names.push(resource.name.clone());
        }
        for name in entries.keys() {
            if schema.resource(name).is_none() {
                return Err(FlatarcError::InvalidFormat(format!(
                    "resource {} is not declared by the schema",
                    name
                )));
            }
        }

        let archive = Self {
            span,
            schema,
            header,
            entries,
            names,
        };
        debug!(
            schema = %schema.name,
            resources = archive.names.len(),
            bytes = span.len(),
            "archive bound"
        );

        if options.verify_checksums {
            archive.verify_checksums()?;
        }
        if options.validate_references {
            let findings = archive.validate_references()?;
            if let Some(first) = findings.into_iter().next() {
                return Err(first.into());
            }
        }

        Ok(archive)
    }

    /// The schema this archive was bound with.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Archive format header.
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Names of all bound resources, in schema declaration order.
    pub fn resource_names(&self) -> &[String] {
        &self.names
    }

    /// Look up an implicit binding group declared by the schema.
    pub fn group(&self, name: &str) -> Option<&'a BindingGroup> {
        self.schema.group(name)
    }

    /// Typed view of a vector resource.
    pub fn vector(&self, name: &str) -> Result<VectorView<'a>> {
        let (def, entry) = self.lookup(name)?;
        let (record, sentinel) = match &def.kind {
            ResourceKind::Vector { record, sentinel } => (record, *sentinel),
            _ => {
                return Err(FlatarcError::ResourceKindMismatch {
                    name: name.to_string(),
                    expected: "vector",
                })
            }
        };
        let layout = self.layout(record)?;
        let region = sub_span(self.span, entry.data_offset, entry.data_size, name)?;
        VectorView::new(&def.name, region, layout, sentinel, entry.count as usize)
    }

    /// Typed view of a multivector resource.
    pub fn multivector(&self, name: &str) -> Result<MultivectorView<'a>> {
        let (def, entry) = self.lookup(name)?;
        let variants = match &def.kind {
            ResourceKind::Multivector { variants } => variants,
            _ => {
                return Err(FlatarcError::ResourceKindMismatch {
                    name: name.to_string(),
                    expected: "multivector",
                })
            }
        };
        let region = sub_span(self.span, entry.data_offset, entry.data_size, name)?;
        let index_size = entry.index_size as usize;
        if index_size > region.len() {
            return Err(FlatarcError::Truncated {
                context: format!("multivector {} offset index", name),
                needed: index_size,
                available: region.len(),
            });
        }
        let expected_index = (entry.count as usize)
            .checked_add(1)
            .and_then(|entries| entries.checked_mul(OFFSET_SIZE));
        if expected_index != Some(index_size) {
            return Err(FlatarcError::InvalidFormat(format!(
                "multivector {} stores {} items but an index of {} bytes",
                name, entry.count, index_size
            )));
        }
        let mut resolved = Vec::with_capacity(variants.len());
        for variant in variants {
            resolved.push((variant.tag, self.layout(&variant.record)?));
        }
        MultivectorView::new(
            &def.name,
            &region[..index_size],
            &region[index_size..],
            resolved,
            entry.count as usize,
        )
    }

    /// Typed view of a raw data resource.
    pub fn raw_data(&self, name: &str) -> Result<RawDataView<'a>> {
        let (def, entry) = self.lookup(name)?;
        if !matches!(def.kind, ResourceKind::RawData) {
            return Err(FlatarcError::ResourceKindMismatch {
                name: name.to_string(),
                expected: "raw data",
            });
        }
        let region = sub_span(self.span, entry.data_offset, entry.data_size, name)?;
        Ok(RawDataView::new(&def.name, region))
    }

    /// Dereference the reference field `resource[index].field` through
    /// its declared edge.
    ///
    /// Returns `Ok(None)` when the edge declares 0 as "absent" and the
    /// stored value is 0; otherwise bounds-checks the (un-shifted) value
    /// against the target and fails
    /// [`FlatarcError::DanglingReference`] if it is out of range.
    pub fn follow(&self, resource: &str, index: usize, field: &str) -> Result<Option<u64>> {
        let edge = self.schema.edge(resource, field).ok_or_else(|| {
            FlatarcError::InvalidSchema(format!(
                "no reference edge declared for {}.{}",
                resource, field
            ))
        })?;
        let vector = self.vector(resource)?;
        let raw = vector.at(index)?.get_u64(field)?;
        let limit = self.target_len(edge)?;
        resolve_value(edge, index as u64, raw, limit).map_err(Into::into)
    }

    /// Walk every declared reference edge over every record and collect
    /// all violations, never stopping at the first, so one ingestion-time
    /// pass yields a complete integrity report.
    pub fn validate_references(&self) -> Result<Vec<DanglingReference>> {
        let mut findings = Vec::new();
        for edge in &self.schema.edges {
            let limit = self.target_len(edge)?;
            let source = self.schema.resource(&edge.resource).ok_or_else(|| {
                FlatarcError::InvalidSchema(format!("edge source {} missing", edge.resource))
            })?;
            match &source.kind {
                ResourceKind::Vector { .. } => {
                    let vector = self.vector(&edge.resource)?;
                    for i in 0..vector.len() {
                        let raw = vector.at(i)?.get_u64(&edge.field)?;
                        if let Err(finding) = resolve_value(edge, i as u64, raw, limit) {
                            findings.push(finding);
                        }
                    }
                }
                ResourceKind::Multivector { .. } => {
                    let mv = self.multivector(&edge.resource)?;
                    for i in 0..mv.len() {
                        for sub in mv.item_at(i)? {
                            let (_, record) = sub?;
                            if record.layout().field(&edge.field).is_none() {
                                continue;
                            }
                            let raw = record.get_u64(&edge.field)?;
                            if let Err(finding) = resolve_value(edge, i as u64, raw, limit) {
                                findings.push(finding);
                            }
                        }
                    }
                }
                // Schema validation rejects raw-data edge sources
                ResourceKind::RawData => {}
            }
        }
        debug!(findings = findings.len(), "reference validation complete");
        Ok(findings)
    }

    /// Verify the CRC32 of every resource region against the table.
    pub fn verify_checksums(&self) -> Result<()> {
        for name in &self.names {
            let entry = &self.entries[name];
            let region = sub_span(self.span, entry.data_offset, entry.data_size, name)?;
            let actual = crc32fast::hash(region);
            if actual != entry.crc32 {
                return Err(FlatarcError::CrcMismatch {
                    expected: entry.crc32,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<(&'a crate::schema::ResourceDef, &ResourceEntry)> {
        let def = self
            .schema
            .resource(name)
            .ok_or_else(|| FlatarcError::ResourceNotFound(name.to_string()))?;
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| FlatarcError::ResourceNotFound(name.to_string()))?;
        Ok((def, entry))
    }

    fn layout(&self, record: &str) -> Result<&'a RecordLayout> {
        self.schema
            .record(record)
            .ok_or_else(|| FlatarcError::InvalidSchema(format!("unknown record {}", record)))
    }

    /// Upper bound a reference into `edge.target` must stay below.
    fn target_len(&self, edge: &RefEdge) -> Result<u64> {
        let entry = self
            .entries
            .get(&edge.target)
            .ok_or_else(|| FlatarcError::ResourceNotFound(edge.target.clone()))?;
        match edge.kind {
            RefKind::ByteOffset => Ok(entry.data_size),
            RefKind::Index => {
                let def = self.schema.resource(&edge.target).ok_or_else(|| {
                    FlatarcError::InvalidSchema(format!("unknown resource {}", edge.target))
                })?;
                match &def.kind {
                    ResourceKind::Vector { sentinel, .. } => {
                        Ok(entry.count.saturating_sub(*sentinel as u64))
                    }
                    ResourceKind::Multivector { .. } => Ok(entry.count),
                    ResourceKind::RawData => Err(FlatarcError::InvalidSchema(format!(
                        "index edge cannot target raw data resource {}",
                        edge.target
                    ))),
                }
            }
        }
    }
}

/// Apply an edge's absent-sentinel convention and bounds check.
fn resolve_value(
    edge: &RefEdge,
    index: u64,
    raw: u64,
    limit: u64,
) -> std::result::Result<Option<u64>, DanglingReference> {
    let value = if edge.zero_is_absent {
        if raw == 0 {
            return Ok(None);
        }
        raw - 1
    } else {
        raw
    };
    if value >= limit {
        return Err(DanglingReference {
            resource: edge.resource.clone(),
            index,
            field: edge.field.clone(),
            value,
            target: edge.target.clone(),
            target_len: limit,
        });
    }
    Ok(Some(value))
}

/// Slice `span[offset..offset + size]`, failing `Truncated` instead of
/// panicking on overrun.
fn sub_span<'a>(span: &'a [u8], offset: u64, size: u64, context: &str) -> Result<&'a [u8]> {
    let end = offset.checked_add(size).ok_or_else(|| {
        FlatarcError::InvalidFormat(format!("offset overflow locating {}", context))
    })?;
    if end > span.len() as u64 {
        return Err(FlatarcError::Truncated {
            context: context.to_string(),
            needed: end as usize,
            available: span.len(),
        });
    }
    Ok(&span[offset as usize..end as usize])
}

fn kind_tag(kind: &ResourceKind) -> ResourceKindTag {
    match kind {
        ResourceKind::Vector { .. } => ResourceKindTag::Vector,
        ResourceKind::Multivector { .. } => ResourceKindTag::Multivector,
        ResourceKind::RawData => ResourceKindTag::RawData,
    }
}
