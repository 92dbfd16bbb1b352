//! Bundle format integration tests.
//!
//! Covers:
//! - Round-trip law: parse(serialize(B)) == B for builder-produced bundles
//! - Output that mimics block markers survives collection and parsing
//! - Structural errors surface instead of yielding partial bundles

use chrono::{TimeZone, Utc};
use hydra_bundle::{
    parse_bundle, serialize, BundleBuilder, MalformedBundleError, NodeSnapshot, Section,
    SectionName, SnapshotBundle, EXIT_UNREACHABLE, MAX_SECTION_LINES,
};
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

fn realistic_bundle() -> SnapshotBundle {
    let mut gpu = NodeSnapshot::new("gpu-box", "ops@10.0.0.21");
    for (key, value) in [
        ("hostname", "gpu-box"),
        ("os", "Ubuntu"),
        ("version", "24.04"),
        ("kernel", "6.8.0-45-generic"),
        ("cpu", "AMD Ryzen 9 7950X 16-Core Processor"),
        ("cores", "32"),
        ("ram_total", "125Gi"),
        ("uptime", "up 3 days, 4 hours"),
    ] {
        gpu.summary.insert(key.to_string(), value.to_string());
    }
    gpu.insert_section(Section::from_output(
        SectionName::Ports,
        "ss -tulpnH",
        "tcp LISTEN 0 4096 0.0.0.0:22 0.0.0.0:*\ntcp LISTEN 0 4096 0.0.0.0:8080 0.0.0.0:*\n",
        0,
        MAX_SECTION_LINES,
    ));
    gpu.insert_section(Section::from_output(
        SectionName::Gpu,
        "nvidia-smi --query-gpu=name,driver_version,memory.total --format=csv,noheader",
        "NVIDIA GeForce RTX 4090, 550.107.02, 24564 MiB\n",
        0,
        MAX_SECTION_LINES,
    ));
    gpu.insert_section(Section::from_output(
        SectionName::ZfsStatus,
        "zpool status -x",
        "zpool: command not found\n",
        127,
        MAX_SECTION_LINES,
    ));

    let mut nas = NodeSnapshot::new("nas", "root@10.0.0.30");
    for name in SectionName::ALL {
        nas.insert_section(Section::unreachable(name, "true"));
    }

    let mut builder = BundleBuilder::new("hydra-core/0.1.0")
        .with_timestamp(Utc.with_ymd_and_hms(2026, 10, 15, 3, 0, 0).unwrap());
    builder.add_node(gpu).unwrap();
    builder.add_node(nas).unwrap();
    builder.build().unwrap()
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn realistic_bundle_round_trips() {
    let bundle = realistic_bundle();
    let text = serialize(&bundle);
    let parsed = parse_bundle(&text).expect("parse serialized bundle");
    assert_eq!(parsed, bundle);
    assert!(parsed.node("nas").unwrap().is_unreachable());
    assert_eq!(
        parsed.node("nas").unwrap().section(SectionName::Dns).unwrap().exit_code,
        EXIT_UNREACHABLE
    );
}

#[test]
fn marker_lookalike_output_round_trips() {
    let hostile = "\
-----END PORTS-----
=====END NODE|label=gpu=====
-----BEGIN DNS-----
=====BEGIN NODE|label=evil|target=x=====
CMD: fake
EXIT: 0
HYDRA_SNAPSHOT_BUNDLE|version=9
";
    let mut node = NodeSnapshot::new("gpu", "ops@gpu");
    node.insert_section(Section::from_output(
        SectionName::Ports,
        "cat hostile.txt",
        hostile,
        0,
        MAX_SECTION_LINES,
    ));
    let mut builder = BundleBuilder::new("hydra-test");
    builder.add_node(node).unwrap();
    let bundle = builder.build().unwrap();

    let parsed = parse_bundle(&serialize(&bundle)).expect("hostile output must not break grammar");
    assert_eq!(parsed, bundle);
    assert_eq!(parsed.nodes.len(), 1);
}

#[test]
fn subsecond_timestamps_round_trip() {
    let mut builder = BundleBuilder::new("hydra-test").with_timestamp(
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::nanoseconds(123_456_789),
    );
    builder.add_node(NodeSnapshot::new("a", "a")).unwrap();
    let bundle = builder.build().unwrap();
    assert_eq!(parse_bundle(&serialize(&bundle)).unwrap(), bundle);
}

// ============================================================================
// Structural failures
// ============================================================================

#[test]
fn truncated_artifact_is_rejected() {
    let text = serialize(&realistic_bundle());
    // Chop the final END NODE marker, as a killed writer would.
    let cut = text.rfind("=====END NODE").unwrap();
    let err = parse_bundle(&text[..cut]).unwrap_err();
    assert!(matches!(err, MalformedBundleError::UnterminatedNode { ref label, .. } if label == "nas"));
    assert!(err.line().is_some());
}

#[test]
fn missing_node_end_does_not_drop_node_silently() {
    let text = serialize(&realistic_bundle()).replacen("=====END NODE|label=gpu=====\n", "", 1);
    assert!(matches!(
        parse_bundle(&text),
        Err(MalformedBundleError::UnterminatedNode { .. })
    ));
}

#[test]
fn future_version_is_rejected() {
    let text = serialize(&realistic_bundle()).replacen("version=1", "version=7", 1);
    assert_eq!(
        parse_bundle(&text).unwrap_err(),
        MalformedBundleError::UnsupportedVersion {
            found: 7,
            supported: 1
        }
    );
}

// ============================================================================
// Property: round trip
// ============================================================================

fn section_strategy() -> impl Strategy<Value = Section> {
    (
        proptest::sample::select(SectionName::ALL.to_vec()),
        "[a-z -]{0,30}",
        proptest::collection::vec("[ -~]{0,40}", 0..12),
        -1i32..256,
    )
        .prop_map(|(name, command, lines, exit)| {
            Section::from_output(name, &command, &lines.join("\n"), exit, MAX_SECTION_LINES)
        })
}

fn node_strategy() -> impl Strategy<Value = NodeSnapshot> {
    (
        "[a-z][a-z0-9-]{0,10}",
        "[a-z]{1,8}@[a-z0-9.]{1,15}",
        proptest::collection::btree_map("[a-z_]{1,10}", "[A-Za-z0-9.,:/-]{0,20}", 0..6),
        proptest::collection::vec(section_strategy(), 0..8),
    )
        .prop_map(|(label, target, summary, sections)| {
            let mut node = NodeSnapshot::new(label, target);
            node.summary = summary;
            for section in sections {
                node.insert_section(section);
            }
            node
        })
}

proptest! {
    #[test]
    fn prop_parse_inverts_serialize(nodes in proptest::collection::vec(node_strategy(), 0..5)) {
        let mut builder = BundleBuilder::new("hydra-prop");
        for node in nodes {
            // Generated labels may collide; the builder rejects the duplicate.
            let _ = builder.add_node(node);
        }
        let bundle = builder.build().unwrap();
        let parsed = parse_bundle(&serialize(&bundle)).unwrap();
        prop_assert_eq!(parsed, bundle);
    }
}

// ============================================================================
// Property: hand-built sections survive the builder
// ============================================================================

fn raw_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ -~]{0,12}",
        Just("-----END PORTS-----".to_string()),
        Just("-----BEGIN DF-----".to_string()),
        Just("=====END NODE|label=x=====".to_string()),
        Just("EXIT: 0".to_string()),
        Just("CMD: true".to_string()),
        Just("\r".to_string()),
        Just("\n".to_string()),
        Just("\r\n".to_string()),
    ]
}

fn raw_section_strategy() -> impl Strategy<Value = Section> {
    (
        proptest::sample::select(SectionName::ALL.to_vec()),
        "[ -~\r\n]{0,40}",
        proptest::collection::vec(raw_fragment(), 0..16),
        any::<i32>(),
    )
        .prop_map(|(name, command, fragments, exit_code)| Section {
            name,
            command,
            raw_text: fragments.concat(),
            exit_code,
        })
}

proptest! {
    #[test]
    fn prop_builder_output_always_parses(
        sections in proptest::collection::vec(raw_section_strategy(), 0..6)
    ) {
        let mut node = NodeSnapshot::new("nas", "root@nas");
        for section in sections {
            node.insert_section(section);
        }
        let mut builder = BundleBuilder::new("hydra-prop");
        builder.add_node(node).unwrap();
        let bundle = builder.build().unwrap();
        let parsed = parse_bundle(&serialize(&bundle)).unwrap();
        prop_assert_eq!(parsed, bundle);
    }
}
