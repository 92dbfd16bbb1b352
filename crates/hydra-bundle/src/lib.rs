//! Snapshot bundle model, writer and parser for hydra.
//!
//! A bundle is one versioned, self-describing collection of per-node system
//! facts taken at a single point in time. This crate owns:
//! - The data model (`SnapshotBundle`, `NodeSnapshot`, `Section`, `SectionName`)
//! - Bundle assembly with invariant checks (`BundleBuilder`)
//! - The text format writer (`serialize`)
//! - The two-level block parser (`SectionExtractor`)
//! - Line normalization used before comparing sections
//!
//! # Example
//!
//! ```
//! use hydra_bundle::{parse_bundle, serialize, BundleBuilder, NodeSnapshot, Section, SectionName};
//!
//! let mut node = NodeSnapshot::new("gpu", "ops@10.0.0.5");
//! node.insert_section(Section::from_output(SectionName::Ports, "ss -tulpn", "80\n443", 0, 100));
//!
//! let mut builder = BundleBuilder::new("hydra-doc");
//! builder.add_node(node).unwrap();
//! let bundle = builder.build().unwrap();
//!
//! let text = serialize(&bundle);
//! assert_eq!(parse_bundle(&text).unwrap(), bundle);
//! ```

pub mod builder;
pub mod error;
pub mod model;
pub mod normalize;
pub mod reader;
pub mod writer;

pub use builder::BundleBuilder;
pub use error::{BundleError, MalformedBundleError, Result};
pub use model::{
    NodeSnapshot, Section, SectionName, SnapshotBundle, BUNDLE_FORMAT_VERSION, EXIT_SPAWN_FAILED,
    EXIT_TIMED_OUT, EXIT_UNREACHABLE, EXIT_UNSUPPORTED, MAX_COMMAND_CHARS, MAX_SECTION_LINES,
    SUMMARY_KEYS,
};
pub use normalize::normalize_lines;
pub use reader::{parse_bundle, parse_bundle_bytes, SectionExtractor};
pub use writer::{serialize, write_to, SUMMARY_MAGIC};
