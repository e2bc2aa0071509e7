#![no_main]

use flatarc::{
    Archive, FieldKind, RecordLayout, RefEdge, RefKind, ResourceDef, Schema,
};
use libfuzzer_sys::fuzz_target;

fn fuzz_schema() -> Schema {
    Schema::new("fuzz")
        .with_record(RecordLayout::packed(
            "Tag",
            &[
                ("key_idx", FieldKind::Unsigned, 32),
                ("value_idx", FieldKind::Unsigned, 32),
            ],
        ))
        .with_record(RecordLayout::packed(
            "Member",
            &[("tag_idx", FieldKind::Unsigned, 24)],
        ))
        .with_resource(ResourceDef::vector_with_sentinel("tags", "Tag"))
        .with_resource(ResourceDef::multivector("members", &[(0, "Member")]))
        .with_resource(ResourceDef::raw_data("stringtable"))
        .with_edge(RefEdge {
            resource: "members".to_string(),
            field: "tag_idx".to_string(),
            target: "tags".to_string(),
            kind: RefKind::Index,
            zero_is_absent: false,
        })
}

fuzz_target!(|data: &[u8]| {
    let schema = fuzz_schema();

    // Binding arbitrary bytes must error cleanly, never panic
    let archive = match Archive::bind(data, &schema) {
        Ok(archive) => archive,
        Err(_) => return,
    };

    // Every accessor on a successfully bound archive must stay panic-free
    let _ = archive.verify_checksums();
    let _ = archive.validate_references();

    if let Ok(tags) = archive.vector("tags") {
        for i in 0..tags.len().min(1024) {
            if let Ok(record) = tags.at(i) {
                let _ = record.get_u64("key_idx");
                let _ = record.get_u64("value_idx");
            }
            let _ = tags.range_at(i, "key_idx");
        }
    }

    if let Ok(members) = archive.multivector("members") {
        for i in 0..members.len().min(1024) {
            if let Ok(item) = members.item_at(i) {
                for sub in item {
                    if sub.is_err() {
                        break;
                    }
                }
            }
        }
    }

    if let Ok(strings) = archive.raw_data("stringtable") {
        for offset in 0..strings.len().min(64) {
            let _ = strings.string_at(offset);
        }
    }
});
