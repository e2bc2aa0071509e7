//! Reference integrity: access-time bounds checks, the aggregating
//! whole-archive report, and the per-edge zero-as-absent convention.

use flatarc::{
    Archive, ArchiveBuilder, BindOptions, FieldKind, FlatarcError, RecordLayout, RefEdge, RefKind,
    ResourceDef, Schema,
};

fn relation_schema(zero_is_absent: bool) -> Schema {
    Schema::new("relations")
        .with_record(RecordLayout::packed(
            "Relation",
            &[("tag_first_idx", FieldKind::Unsigned, 40)],
        ))
        .with_record(RecordLayout::packed(
            "Tag",
            &[
                ("key_idx", FieldKind::Unsigned, 32),
                ("value_idx", FieldKind::Unsigned, 32),
            ],
        ))
        .with_resource(ResourceDef::vector("relations", "Relation"))
        .with_resource(ResourceDef::vector("tags", "Tag"))
        .with_edge(RefEdge {
            resource: "relations".to_string(),
            field: "tag_first_idx".to_string(),
            target: "tags".to_string(),
            kind: RefKind::Index,
            zero_is_absent,
        })
}

/// Five tags, plus relations whose tag_first_idx values are supplied.
fn build_archive(schema: &Schema, first_indices: &[u64]) -> Vec<u8> {
    let mut builder = ArchiveBuilder::new(schema).unwrap();

    let mut tags = builder.vector("tags").unwrap();
    for i in 0..5 {
        let mut tag = tags.grow().unwrap();
        tag.set("key_idx", i).unwrap();
        tag.set("value_idx", i).unwrap();
    }
    tags.close().unwrap();

    let mut relations = builder.vector("relations").unwrap();
    for &idx in first_indices {
        relations.grow().unwrap().set("tag_first_idx", idx).unwrap();
    }
    relations.close().unwrap();

    builder.finalize().unwrap()
}

#[test]
fn test_index_equal_to_len_is_dangling() {
    // tags has 5 elements (valid indices 0..4); a stored 5 is out of
    // bounds unless the schema's own convention says otherwise
    let schema = relation_schema(false);
    let bytes = build_archive(&schema, &[5]);
    let archive = Archive::bind(&bytes, &schema).unwrap();

    let findings = archive.validate_references().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].resource, "relations");
    assert_eq!(findings[0].field, "tag_first_idx");
    assert_eq!(findings[0].value, 5);
    assert_eq!(findings[0].target_len, 5);

    assert!(matches!(
        archive.follow("relations", 0, "tag_first_idx").unwrap_err(),
        FlatarcError::DanglingReference(_)
    ));
}

#[test]
fn test_valid_references_have_no_findings() {
    let schema = relation_schema(false);
    let bytes = build_archive(&schema, &[0, 2, 4]);
    let archive = Archive::bind(&bytes, &schema).unwrap();

    assert!(archive.validate_references().unwrap().is_empty());
    for i in 0..3usize {
        assert!(archive.follow("relations", i, "tag_first_idx").unwrap().is_some());
    }
}

#[test]
fn test_findings_are_aggregated_not_first_only() {
    let schema = relation_schema(false);
    let bytes = build_archive(&schema, &[7, 0, 99, 5]);
    let archive = Archive::bind(&bytes, &schema).unwrap();

    let findings = archive.validate_references().unwrap();
    let bad: Vec<(u64, u64)> = findings.iter().map(|f| (f.index, f.value)).collect();
    assert_eq!(bad, vec![(0, 7), (2, 99), (3, 5)]);
}

#[test]
fn test_zero_as_absent_shifts_indices() {
    let schema = relation_schema(true);
    // Stored 0 = no tags; stored 5 = tag index 4; stored 6 would be index 5
    let bytes = build_archive(&schema, &[0, 5, 6]);
    let archive = Archive::bind(&bytes, &schema).unwrap();

    assert_eq!(archive.follow("relations", 0, "tag_first_idx").unwrap(), None);
    assert_eq!(
        archive.follow("relations", 1, "tag_first_idx").unwrap(),
        Some(4)
    );
    assert!(archive.follow("relations", 2, "tag_first_idx").is_err());

    let findings = archive.validate_references().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].index, 2);
    // Reported value is the un-shifted target index
    assert_eq!(findings[0].value, 5);
}

#[test]
fn test_eager_bind_fails_on_dangling_reference() {
    let schema = relation_schema(false);
    let bytes = build_archive(&schema, &[5]);

    let result = Archive::bind_with(
        &bytes,
        &schema,
        BindOptions {
            verify_checksums: false,
            validate_references: true,
        },
    );
    assert!(matches!(
        result.unwrap_err(),
        FlatarcError::DanglingReference(_)
    ));

    // The same archive still binds lazily; the error waits for access
    let archive = Archive::bind(&bytes, &schema).unwrap();
    assert!(archive.vector("relations").is_ok());
}

#[test]
fn test_follow_requires_a_declared_edge() {
    let schema = relation_schema(false);
    let bytes = build_archive(&schema, &[0]);
    let archive = Archive::bind(&bytes, &schema).unwrap();

    assert!(matches!(
        archive.follow("tags", 0, "key_idx").unwrap_err(),
        FlatarcError::InvalidSchema(_)
    ));
}

#[test]
fn test_byte_offset_references_check_blob_length() {
    let schema = Schema::new("strings")
        .with_record(RecordLayout::packed(
            "Label",
            &[("name_off", FieldKind::Unsigned, 32)],
        ))
        .with_resource(ResourceDef::vector("labels", "Label"))
        .with_resource(ResourceDef::raw_data("stringtable"))
        .with_edge(RefEdge {
            resource: "labels".to_string(),
            field: "name_off".to_string(),
            target: "stringtable".to_string(),
            kind: RefKind::ByteOffset,
            zero_is_absent: false,
        });

    let mut builder = ArchiveBuilder::new(&schema).unwrap();
    let mut strings = builder.raw_data("stringtable").unwrap();
    let off = strings.append_string("tram_stop").unwrap();
    let blob_len = strings.len();
    strings.close().unwrap();

    let mut labels = builder.vector("labels").unwrap();
    labels.grow().unwrap().set("name_off", off).unwrap();
    labels.grow().unwrap().set("name_off", blob_len).unwrap(); // one past the end
    labels.close().unwrap();
    let bytes = builder.finalize().unwrap();

    let archive = Archive::bind(&bytes, &schema).unwrap();
    let findings = archive.validate_references().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].index, 1);
    assert_eq!(findings[0].target_len, blob_len);
}
