//! Multi-reader tests: a bound archive is immutable and must be safely
//! shareable by many threads without locking.

use flatarc::{Archive, ArchiveBuilder, FieldKind, RecordLayout, ResourceDef, Schema};
use std::thread;

fn counter_schema() -> Schema {
    Schema::new("counters")
        .with_record(RecordLayout::packed(
            "Counter",
            &[("value", FieldKind::Unsigned, 40)],
        ))
        .with_resource(ResourceDef::vector("counters", "Counter"))
        .with_resource(ResourceDef::raw_data("labels"))
}

fn build_counter_archive(schema: &Schema, count: u64) -> Vec<u8> {
    let mut builder = ArchiveBuilder::new(schema).unwrap();

    let mut labels = builder.raw_data("labels").unwrap();
    for i in 0..count {
        labels.append_string(&format!("counter-{}", i)).unwrap();
    }
    labels.close().unwrap();

    let mut counters = builder.vector("counters").unwrap();
    for i in 0..count {
        counters.grow().unwrap().set("value", i * 7).unwrap();
    }
    counters.close().unwrap();

    builder.finalize().unwrap()
}

#[test]
fn test_concurrent_readers_share_one_archive() {
    let schema = counter_schema();
    let bytes = build_counter_archive(&schema, 500);
    let archive = Archive::bind(&bytes, &schema).unwrap();

    thread::scope(|scope| {
        for t in 0..8usize {
            let archive = &archive;
            scope.spawn(move || {
                let counters = archive.vector("counters").unwrap();
                for i in (t..500).step_by(8) {
                    let record = counters.at(i).unwrap();
                    assert_eq!(record.get_u64("value").unwrap(), i as u64 * 7);
                }
            });
        }
    });
}

#[test]
fn test_concurrent_binds_over_one_span() {
    let schema = counter_schema();
    let bytes = build_counter_archive(&schema, 64);

    thread::scope(|scope| {
        for _ in 0..4 {
            let bytes = &bytes;
            let schema = &schema;
            scope.spawn(move || {
                let archive = Archive::bind(bytes, schema).unwrap();
                archive.verify_checksums().unwrap();
                assert_eq!(archive.vector("counters").unwrap().len(), 64);
            });
        }
    });
}

#[test]
fn test_concurrent_mixed_resource_access() {
    let schema = counter_schema();
    let bytes = build_counter_archive(&schema, 100);
    let archive = Archive::bind(&bytes, &schema).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            let labels = archive.raw_data("labels").unwrap();
            assert_eq!(labels.string_at(0).unwrap(), "counter-0");
        });
        scope.spawn(|| {
            let counters = archive.vector("counters").unwrap();
            let total: u64 = counters
                .iter()
                .map(|r| r.get_u64("value").unwrap())
                .sum();
            assert_eq!(total, (0..100u64).map(|i| i * 7).sum::<u64>());
        });
        scope.spawn(|| {
            assert!(archive.validate_references().unwrap().is_empty());
        });
    });
}
