//! Bundle assembly.
//!
//! The builder is the only place a [`SnapshotBundle`] is created during
//! collection. It enforces the invariants the text format depends on, so a
//! built bundle always serializes to text the parser accepts.

use crate::model::{NodeSnapshot, SnapshotBundle, BUNDLE_FORMAT_VERSION};
use crate::{BundleError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Builder for [`SnapshotBundle`].
#[derive(Debug)]
pub struct BundleBuilder {
    generator_id: String,
    timestamp: DateTime<Utc>,
    nodes: Vec<NodeSnapshot>,
    labels: HashSet<String>,
}

impl BundleBuilder {
    /// Start a bundle stamped with the current time.
    pub fn new(generator_id: impl Into<String>) -> Self {
        Self {
            generator_id: generator_id.into(),
            timestamp: Utc::now(),
            nodes: Vec::new(),
            labels: HashSet::new(),
        }
    }

    /// Override the bundle timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a node. Labels must be unique within the bundle.
    ///
    /// Sections are canonicalized on the way in, so hand-built sections get
    /// the same line treatment as captured output.
    pub fn add_node(&mut self, mut node: NodeSnapshot) -> Result<()> {
        validate_token("label", &node.label)?;
        validate_value("target", &node.target)?;
        if node.target.is_empty() {
            return Err(BundleError::InvalidField {
                field: "target",
                value: node.target,
                reason: "must not be empty",
            });
        }
        for (key, value) in &node.summary {
            validate_token("summary key", key)?;
            validate_value("summary value", value)?;
        }
        for (key, section) in &node.sections {
            if *key != section.name {
                return Err(BundleError::InvalidField {
                    field: "section",
                    value: format!("{} stored under {}", section.name, key),
                    reason: "section name must match its slot",
                });
            }
        }
        node.sections = std::mem::take(&mut node.sections)
            .into_iter()
            .map(|(key, section)| (key, section.canonicalize()))
            .collect();
        if !self.labels.insert(node.label.clone()) {
            return Err(BundleError::DuplicateLabel(node.label));
        }
        debug!(label = %node.label, sections = node.sections.len(), "added node to bundle");
        self.nodes.push(node);
        Ok(())
    }

    /// Finish the bundle.
    pub fn build(self) -> Result<SnapshotBundle> {
        validate_value("generator", &self.generator_id)?;
        Ok(SnapshotBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            timestamp: self.timestamp,
            generator_id: self.generator_id,
            nodes: self.nodes,
        })
    }
}

/// Labels and keys: non-empty, no delimiter, no whitespace.
fn validate_token(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(BundleError::InvalidField {
            field,
            value: value.to_string(),
            reason: "must not be empty",
        });
    }
    if value.contains(['|', '=']) || value.chars().any(char::is_whitespace) {
        return Err(BundleError::InvalidField {
            field,
            value: value.to_string(),
            reason: "must not contain '|', '=' or whitespace",
        });
    }
    Ok(())
}

/// Free-form header values: single line, no field delimiter, no edge padding.
fn validate_value(field: &'static str, value: &str) -> Result<()> {
    if value.contains(['|', '\n', '\r']) {
        return Err(BundleError::InvalidField {
            field,
            value: value.to_string(),
            reason: "must not contain '|' or line breaks",
        });
    }
    if value.trim() != value {
        return Err(BundleError::InvalidField {
            field,
            value: value.to_string(),
            reason: "must not have leading or trailing whitespace",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Section, SectionName};

    #[test]
    fn rejects_duplicate_labels() {
        let mut builder = BundleBuilder::new("hydra-test");
        builder.add_node(NodeSnapshot::new("gpu", "ops@gpu")).unwrap();
        let err = builder
            .add_node(NodeSnapshot::new("gpu", "ops@gpu2"))
            .unwrap_err();
        assert_eq!(err, BundleError::DuplicateLabel("gpu".into()));
    }

    #[test]
    fn rejects_delimiters_in_label() {
        let mut builder = BundleBuilder::new("hydra-test");
        assert!(builder.add_node(NodeSnapshot::new("a|b", "x")).is_err());
        assert!(builder.add_node(NodeSnapshot::new("a=b", "x")).is_err());
        assert!(builder.add_node(NodeSnapshot::new("a b", "x")).is_err());
        assert!(builder.add_node(NodeSnapshot::new("", "x")).is_err());
    }

    #[test]
    fn rejects_multiline_summary_value() {
        let mut node = NodeSnapshot::new("a", "root@a");
        node.summary.insert("os".into(), "Ubuntu\n24.04".into());
        let mut builder = BundleBuilder::new("hydra-test");
        assert!(builder.add_node(node).is_err());
    }

    #[test]
    fn hand_built_section_is_canonicalized() {
        let mut node = NodeSnapshot::new("nas", "root@nas");
        node.insert_section(Section {
            name: SectionName::Ports,
            command: "echo a\necho b".into(),
            raw_text: "80\r\n-----END PORTS-----\n443\r\r".into(),
            exit_code: 0,
        });
        let mut builder = BundleBuilder::new("hydra-test");
        builder.add_node(node).unwrap();
        let bundle = builder.build().unwrap();

        let ports = bundle.nodes[0].section(SectionName::Ports).unwrap();
        assert_eq!(ports.command, "echo a echo b");
        assert_eq!(ports.raw_text, "80\n -----END PORTS-----\n443");
        assert_eq!(crate::parse_bundle(&crate::serialize(&bundle)).unwrap(), bundle);
    }

    #[test]
    fn rejects_section_under_wrong_name() {
        let mut node = NodeSnapshot::new("nas", "root@nas");
        node.sections.insert(
            SectionName::Df,
            Section::from_output(SectionName::Ports, "ss -tln", "80", 0, 100),
        );
        let mut builder = BundleBuilder::new("hydra-test");
        assert!(matches!(
            builder.add_node(node),
            Err(BundleError::InvalidField { field: "section", .. })
        ));
    }

    #[test]
    fn build_stamps_current_format_version() {
        let mut builder = BundleBuilder::new("hydra-test");
        builder.add_node(NodeSnapshot::new("a", "root@a")).unwrap();
        let bundle = builder.build().unwrap();
        assert_eq!(bundle.format_version, BUNDLE_FORMAT_VERSION);
        assert_eq!(bundle.nodes.len(), 1);
    }

    #[test]
    fn generator_must_not_contain_delimiter() {
        let builder = BundleBuilder::new("hydra|bad");
        assert!(builder.build().is_err());
    }
}
