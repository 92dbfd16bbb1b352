//! Criterion benchmarks for the drift pipeline.
//!
//! Benchmarks `parse_bundle` and `DriftEngine::diff` on a homelab-sized
//! bundle pair: several nodes, every section populated near the line cap.

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hydra_bundle::{
    parse_bundle, serialize, BundleBuilder, NodeSnapshot, Section, SectionName, SnapshotBundle,
    MAX_SECTION_LINES,
};
use hydra_core::drift::DriftEngine;

// ── Helpers ──────────────────────────────────────────────────────────

fn section_text(node: usize, section: SectionName, generation: usize) -> String {
    (0..MAX_SECTION_LINES)
        .map(|i| {
            // Every 7th line changes between generations.
            let rev = if i % 7 == 0 { generation } else { 0 };
            format!("{}-{}-entry-{:03}-rev{}", section, node, i, rev)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bundle(nodes: usize, generation: usize) -> SnapshotBundle {
    let ts = Utc
        .with_ymd_and_hms(2026, 10, 1, 3, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
        + chrono::Duration::days(generation as i64);
    let mut builder = BundleBuilder::new("hydra-bench").with_timestamp(ts);
    for n in 0..nodes {
        let mut node = NodeSnapshot::new(format!("node-{}", n), format!("ops@10.0.0.{}", n + 1));
        node.summary.insert("hostname".to_string(), format!("node-{}", n));
        for name in SectionName::ALL {
            node.insert_section(Section::from_output(
                name,
                "bench",
                &section_text(n, name, generation),
                0,
                MAX_SECTION_LINES,
            ));
        }
        builder.add_node(node).expect("bench node");
    }
    builder.build().expect("bench bundle")
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_bundle");
    for nodes in [1usize, 4, 8] {
        let text = serialize(&bundle(nodes, 0));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &text, |b, text| {
            b.iter(|| parse_bundle(black_box(text)).expect("parse"))
        });
    }
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("drift_diff");
    let engine = DriftEngine::new();
    for nodes in [1usize, 4, 8] {
        let pair = (bundle(nodes, 0), bundle(nodes, 1));
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &pair, |b, (old, new)| {
            b.iter(|| engine.diff("old", black_box(old), "new", black_box(new)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_diff);
criterion_main!(benches);
