//! Schema declarations.
//!
//! A [`Schema`] is the static description an archive is built and bound
//! against: bit-packed record layouts, named resource slots, explicit
//! reference edges between them, and implicit binding groups. It is
//! loaded once (from code, JSON, or TOML), validated, and then shared
//! immutably by builders and bound archives.

use crate::error::{FlatarcError, Result};
use crate::packed;
use serde::{Deserialize, Serialize};

/// Semantic kind of a packed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Unsigned,
    Signed,
    Bool,
}

/// One field of a record: a bit span with a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub bit_offset: u32,
    pub bit_width: u32,
}

/// Fixed-size record type composed of bit-packed fields.
///
/// The record's byte size is `ceil(total bits / 8)`; trailing padding is
/// explicit in the size, never assumed away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayout {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl RecordLayout {
    /// Build a layout with fields packed back-to-back in declaration order.
    pub fn packed(name: &str, fields: &[(&str, FieldKind, u32)]) -> Self {
        let mut defs = Vec::with_capacity(fields.len());
        let mut offset = 0u32;
        for (fname, kind, width) in fields {
            defs.push(FieldDef {
                name: (*fname).to_string(),
                kind: *kind,
                bit_offset: offset,
                bit_width: *width,
            });
            offset += width;
        }
        Self {
            name: name.to_string(),
            fields: defs,
        }
    }

    /// Total bit span of the record, including any gaps.
    pub fn bit_size(&self) -> u32 {
        self.fields
            .iter()
            .map(|f| f.bit_offset + f.bit_width)
            .max()
            .unwrap_or(0)
    }

    /// Record size in whole bytes.
    pub fn byte_size(&self) -> usize {
        packed::byte_len(self.bit_size())
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FlatarcError::InvalidSchema("unnamed record".to_string()));
        }
        if self.fields.is_empty() {
            return Err(FlatarcError::InvalidSchema(format!(
                "record {} has no fields",
                self.name
            )));
        }
        let mut end = 0u32;
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(FlatarcError::InvalidSchema(format!(
                    "record {} has an unnamed field",
                    self.name
                )));
            }
            if field.bit_width < 1 || field.bit_width > 64 {
                return Err(FlatarcError::InvalidSchema(format!(
                    "field {}.{} has width {} (must be 1..=64)",
                    self.name, field.name, field.bit_width
                )));
            }
            if field.kind == FieldKind::Bool && field.bit_width != 1 {
                return Err(FlatarcError::InvalidSchema(format!(
                    "bool field {}.{} must be 1 bit wide",
                    self.name, field.name
                )));
            }
            // Fields must be declared in ascending, non-overlapping order
            if field.bit_offset < end {
                return Err(FlatarcError::InvalidSchema(format!(
                    "field {}.{} overlaps the preceding field",
                    self.name, field.name
                )));
            }
            end = field.bit_offset + field.bit_width;
            if self.fields.iter().filter(|f| f.name == field.name).count() > 1 {
                return Err(FlatarcError::InvalidSchema(format!(
                    "duplicate field {}.{}",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// One tagged record variant of a multivector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub tag: u8,
    pub record: String,
}

/// Storage kind of a named resource slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceKind {
    /// Fixed-stride records with O(1) indexed access. With `sentinel`,
    /// one extra trailing record is stored so any field can be read as
    /// an O(1) `[value[i], value[i+1])` range into another resource.
    Vector {
        record: String,
        #[serde(default)]
        sentinel: bool,
    },
    /// Variable-length sequence of logical items, each owning zero or
    /// more tagged sub-records in one shared byte stream.
    Multivector { variants: Vec<Variant> },
    /// Opaque bytes; consumers interpret offsets by convention.
    RawData,
}

/// A named resource slot in the archive layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl ResourceDef {
    pub fn vector(name: &str, record: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ResourceKind::Vector {
                record: record.to_string(),
                sentinel: false,
            },
        }
    }

    pub fn vector_with_sentinel(name: &str, record: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ResourceKind::Vector {
                record: record.to_string(),
                sentinel: true,
            },
        }
    }

    pub fn multivector(name: &str, variants: &[(u8, &str)]) -> Self {
        Self {
            name: name.to_string(),
            kind: ResourceKind::Multivector {
                variants: variants
                    .iter()
                    .map(|(tag, record)| Variant {
                        tag: *tag,
                        record: (*record).to_string(),
                    })
                    .collect(),
            },
        }
    }

    pub fn raw_data(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ResourceKind::RawData,
        }
    }
}

/// How a reference field's value addresses its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// Value is an element index; must be `< target element count`.
    Index,
    /// Value is a byte offset into raw data; must be `< target byte length`.
    ByteOffset,
}

/// A declared "field value points into resource X" contract.
///
/// Edges carry no ownership; they are a lookup contract validated at
/// access time (or eagerly via
/// [`crate::Archive::validate_references`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefEdge {
    /// Resource whose records carry the reference field.
    pub resource: String,
    /// Name of the reference field.
    pub field: String,
    /// Referenced resource.
    pub target: String,
    pub kind: RefKind,
    /// When true, a stored 0 means "no reference" and real targets are
    /// stored shifted by one (`stored = index + 1`). When false, 0 is an
    /// ordinary first-element index. Declared per edge; the engine never
    /// guesses.
    #[serde(default)]
    pub zero_is_absent: bool,
}

/// Resources that are only meaningful together, without being fields of
/// one composite. Pure metadata: the binder exposes the grouping, higher
/// layers interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingGroup {
    pub name: String,
    pub members: Vec<String>,
}

/// Complete archive schema: record layouts, resource slots, reference
/// edges, and binding groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub records: Vec<RecordLayout>,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
    #[serde(default)]
    pub edges: Vec<RefEdge>,
    #[serde(default)]
    pub groups: Vec<BindingGroup>,
}

impl Schema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
            resources: Vec::new(),
            edges: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_record(mut self, record: RecordLayout) -> Self {
        self.records.push(record);
        self
    }

    pub fn with_resource(mut self, resource: ResourceDef) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_edge(mut self, edge: RefEdge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_group(mut self, name: &str, members: &[&str]) -> Self {
        self.groups.push(BindingGroup {
            name: name.to_string(),
            members: members.iter().map(|m| (*m).to_string()).collect(),
        });
        self
    }

    /// Look up a record layout by name.
    pub fn record(&self, name: &str) -> Option<&RecordLayout> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Look up a resource slot by name.
    pub fn resource(&self, name: &str) -> Option<&ResourceDef> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Look up the reference edge declared on `resource.field`.
    pub fn edge(&self, resource: &str, field: &str) -> Option<&RefEdge> {
        self.edges
            .iter()
            .find(|e| e.resource == resource && e.field == field)
    }

    /// Look up a binding group by name.
    pub fn group(&self, name: &str) -> Option<&BindingGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Check internal consistency: layouts are well-formed, every name
    /// referenced by a resource, edge, or group resolves, variant tags
    /// are unique, and reference fields are unsigned.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FlatarcError::InvalidSchema("unnamed schema".to_string()));
        }

        for record in &self.records {
            record.validate()?;
            if self.records.iter().filter(|r| r.name == record.name).count() > 1 {
                return Err(FlatarcError::InvalidSchema(format!(
                    "duplicate record {}",
                    record.name
                )));
            }
        }

        for resource in &self.resources {
            if self
                .resources
                .iter()
                .filter(|r| r.name == resource.name)
                .count()
                > 1
            {
                return Err(FlatarcError::InvalidSchema(format!(
                    "duplicate resource {}",
                    resource.name
                )));
            }
            match &resource.kind {
                ResourceKind::Vector { record, .. } => {
                    if self.record(record).is_none() {
                        return Err(FlatarcError::InvalidSchema(format!(
                            "vector {} uses unknown record {}",
                            resource.name, record
                        )));
                    }
                }
                ResourceKind::Multivector { variants } => {
                    if variants.is_empty() {
                        return Err(FlatarcError::InvalidSchema(format!(
                            "multivector {} declares no variants",
                            resource.name
                        )));
                    }
                    for variant in variants {
                        if self.record(&variant.record).is_none() {
                            return Err(FlatarcError::InvalidSchema(format!(
                                "multivector {} variant {} uses unknown record {}",
                                resource.name, variant.tag, variant.record
                            )));
                        }
                        if variants.iter().filter(|v| v.tag == variant.tag).count() > 1 {
                            return Err(FlatarcError::InvalidSchema(format!(
                                "multivector {} declares tag {} twice",
                                resource.name, variant.tag
                            )));
                        }
                    }
                }
                ResourceKind::RawData => {}
            }
        }

        for edge in &self.edges {
            let source = self.resource(&edge.resource).ok_or_else(|| {
                FlatarcError::InvalidSchema(format!(
                    "edge source {} is not a resource",
                    edge.resource
                ))
            })?;
            let target = self.resource(&edge.target).ok_or_else(|| {
                FlatarcError::InvalidSchema(format!(
                    "edge target {} is not a resource",
                    edge.target
                ))
            })?;

            // The field must exist (and be unsigned) in the source's
            // record, or in at least one variant for multivectors.
            let field_defs: Vec<&FieldDef> = match &source.kind {
                ResourceKind::Vector { record, .. } => self
                    .record(record)
                    .and_then(|r| r.field(&edge.field))
                    .into_iter()
                    .collect(),
                ResourceKind::Multivector { variants } => variants
                    .iter()
                    .filter_map(|v| self.record(&v.record).and_then(|r| r.field(&edge.field)))
                    .collect(),
                ResourceKind::RawData => {
                    return Err(FlatarcError::InvalidSchema(format!(
                        "edge source {} is raw data and has no fields",
                        edge.resource
                    )));
                }
            };
            if field_defs.is_empty() {
                return Err(FlatarcError::InvalidSchema(format!(
                    "edge field {}.{} does not exist",
                    edge.resource, edge.field
                )));
            }
            if field_defs.iter().any(|f| f.kind != FieldKind::Unsigned) {
                return Err(FlatarcError::InvalidSchema(format!(
                    "reference field {}.{} must be unsigned",
                    edge.resource, edge.field
                )));
            }

            match edge.kind {
                RefKind::ByteOffset => {
                    if !matches!(target.kind, ResourceKind::RawData) {
                        return Err(FlatarcError::InvalidSchema(format!(
                            "byte-offset edge {}.{} must target raw data",
                            edge.resource, edge.field
                        )));
                    }
                }
                RefKind::Index => {
                    if matches!(target.kind, ResourceKind::RawData) {
                        return Err(FlatarcError::InvalidSchema(format!(
                            "index edge {}.{} cannot target raw data",
                            edge.resource, edge.field
                        )));
                    }
                }
            }
        }

        for group in &self.groups {
            for member in &group.members {
                if self.resource(member).is_none() {
                    return Err(FlatarcError::InvalidSchema(format!(
                        "group {} member {} is not a resource",
                        group.name, member
                    )));
                }
            }
        }

        Ok(())
    }

    /// Parse a schema from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Parse a schema from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let schema: Schema = toml::from_str(text)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Canonical JSON rendering, as embedded into archives.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_record() -> RecordLayout {
        RecordLayout::packed(
            "Tag",
            &[
                ("key_idx", FieldKind::Unsigned, 32),
                ("value_idx", FieldKind::Unsigned, 32),
            ],
        )
    }

    #[test]
    fn test_packed_layout_offsets_and_size() {
        let layout = RecordLayout::packed(
            "Node",
            &[
                ("lat", FieldKind::Signed, 31),
                ("lon", FieldKind::Signed, 31),
                ("tag_first_idx", FieldKind::Unsigned, 26),
            ],
        );
        assert_eq!(layout.field("lat").unwrap().bit_offset, 0);
        assert_eq!(layout.field("lon").unwrap().bit_offset, 31);
        assert_eq!(layout.field("tag_first_idx").unwrap().bit_offset, 62);
        assert_eq!(layout.bit_size(), 88);
        assert_eq!(layout.byte_size(), 11);
    }

    #[test]
    fn test_record_validation_rejects_overlap() {
        let layout = RecordLayout {
            name: "Bad".to_string(),
            fields: vec![
                FieldDef {
                    name: "a".to_string(),
                    kind: FieldKind::Unsigned,
                    bit_offset: 0,
                    bit_width: 8,
                },
                FieldDef {
                    name: "b".to_string(),
                    kind: FieldKind::Unsigned,
                    bit_offset: 4,
                    bit_width: 8,
                },
            ],
        };
        let schema = Schema::new("s").with_record(layout);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_schema_validation() {
        let schema = Schema::new("osm")
            .with_record(tag_record())
            .with_resource(ResourceDef::vector("tags", "Tag"));
        assert!(schema.validate().is_ok());

        // Vector over an undeclared record
        let broken = Schema::new("osm").with_resource(ResourceDef::vector("tags", "Tag"));
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_edge_validation() {
        let schema = Schema::new("osm")
            .with_record(tag_record())
            .with_record(RecordLayout::packed(
                "Node",
                &[("tag_first_idx", FieldKind::Unsigned, 26)],
            ))
            .with_resource(ResourceDef::vector("tags", "Tag"))
            .with_resource(ResourceDef::vector_with_sentinel("nodes", "Node"))
            .with_edge(RefEdge {
                resource: "nodes".to_string(),
                field: "tag_first_idx".to_string(),
                target: "tags".to_string(),
                kind: RefKind::Index,
                zero_is_absent: false,
            });
        assert!(schema.validate().is_ok());

        // Edge over a missing field
        let broken = Schema::new("osm")
            .with_record(tag_record())
            .with_resource(ResourceDef::vector("tags", "Tag"))
            .with_edge(RefEdge {
                resource: "tags".to_string(),
                field: "nope".to_string(),
                target: "tags".to_string(),
                kind: RefKind::Index,
                zero_is_absent: false,
            });
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_duplicate_variant_tags_rejected() {
        let schema = Schema::new("osm")
            .with_record(tag_record())
            .with_resource(ResourceDef::multivector(
                "members",
                &[(0, "Tag"), (0, "Tag")],
            ));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let schema = Schema::new("osm")
            .with_record(tag_record())
            .with_resource(ResourceDef::vector_with_sentinel("tags", "Tag"))
            .with_group("tag_index", &["tags"]);
        let json = schema.to_json().unwrap();
        let parsed = Schema::from_json_str(&json).unwrap();
        assert_eq!(parsed, schema);
    }

    #[test]
    fn test_toml_loading() {
        let text = r#"
            name = "mini"

            [[records]]
            name = "Tag"
            fields = [
                { name = "key_idx", kind = "unsigned", bit_offset = 0, bit_width = 32 },
                { name = "value_idx", kind = "unsigned", bit_offset = 32, bit_width = 32 },
            ]

            [[resources]]
            name = "tags"
            kind = "vector"
            record = "Tag"
            sentinel = false
        "#;
        let schema = Schema::from_toml_str(text).unwrap();
        assert_eq!(schema.name, "mini");
        assert_eq!(schema.record("Tag").unwrap().byte_size(), 8);
        assert!(matches!(
            schema.resource("tags").unwrap().kind,
            ResourceKind::Vector { .. }
        ));
    }
}
