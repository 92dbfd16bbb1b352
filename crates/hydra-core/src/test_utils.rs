//! Test utilities for hydra-core.
//!
//! - `MockExecutor`: scripted remote command outputs, no processes spawned
//! - Fixture builders for nodes and bundles
//! - Result assertion macros

use crate::remote::{CommandOutput, ExecError, RemoteExecutor};
use chrono::{DateTime, TimeZone, Utc};
use hydra_bundle::{BundleBuilder, NodeSnapshot, Section, SectionName, SnapshotBundle};
use hydra_config::NodeDescriptor;
use std::sync::Mutex;

// ============================================================================
// Macros
// ============================================================================

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($expr:expr, $msg:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

// ============================================================================
// Mock executor
// ============================================================================

#[derive(Debug, Clone)]
enum MockResponse {
    Output(CommandOutput),
    SpawnFailure,
}

#[derive(Debug, Clone)]
struct Rule {
    node: Option<String>,
    needle: String,
    response: MockResponse,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub node: String,
    pub command: String,
}

/// Remote executor that answers from a rule list.
///
/// Rules are matched in insertion order by node label (if set) and command
/// substring. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct MockExecutor {
    rules: Vec<Rule>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to commands containing `needle` on any node.
    pub fn on(mut self, needle: &str, output: CommandOutput) -> Self {
        self.rules.push(Rule {
            node: None,
            needle: needle.to_string(),
            response: MockResponse::Output(output),
        });
        self
    }

    /// Respond to commands containing `needle` on node `label`.
    pub fn on_node(mut self, label: &str, needle: &str, output: CommandOutput) -> Self {
        self.rules.push(Rule {
            node: Some(label.to_string()),
            needle: needle.to_string(),
            response: MockResponse::Output(output),
        });
        self
    }

    /// Every command on `label` fails at the transport level.
    pub fn unreachable_node(mut self, label: &str) -> Self {
        self.rules.push(Rule {
            node: Some(label.to_string()),
            needle: String::new(),
            response: MockResponse::Output(CommandOutput::unreachable(format!(
                "ssh: connect to host {} port 22: Connection timed out",
                label
            ))),
        });
        self
    }

    /// Commands containing `needle` fail to spawn.
    pub fn spawn_failure(mut self, needle: &str) -> Self {
        self.rules.push(Rule {
            node: None,
            needle: needle.to_string(),
            response: MockResponse::SpawnFailure,
        });
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, label: &str) -> usize {
        self.calls().iter().filter(|c| c.node == label).count()
    }
}

impl RemoteExecutor for MockExecutor {
    fn execute(&self, node: &NodeDescriptor, command: &str) -> Result<CommandOutput, ExecError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                node: node.label.clone(),
                command: command.to_string(),
            });
        }

        let rule = self.rules.iter().find(|r| {
            r.node.as_deref().map_or(true, |l| l == node.label) && command.contains(&r.needle)
        });
        match rule.map(|r| &r.response) {
            Some(MockResponse::Output(out)) => Ok(out.clone()),
            Some(MockResponse::SpawnFailure) => Err(ExecError::ProgramNotFound {
                program: "mock".to_string(),
            }),
            None => Ok(CommandOutput::completed("", "", 0)),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Node with the given sections, each collected successfully.
pub fn node_with_sections(label: &str, sections: &[(SectionName, &str)]) -> NodeSnapshot {
    let mut node = NodeSnapshot::new(label, format!("ops@{}", label));
    node.summary.insert("hostname".to_string(), label.to_string());
    for (name, text) in sections {
        node.insert_section(Section::from_output(
            *name,
            "fixture",
            text,
            0,
            hydra_bundle::MAX_SECTION_LINES,
        ));
    }
    node
}

/// Fixed timestamp `minutes` after 2026-10-01 03:00:00 UTC.
pub fn fixture_time(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 3, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
        + chrono::Duration::minutes(minutes)
}

/// Bundle from nodes at a fixed time.
pub fn bundle_at(timestamp: DateTime<Utc>, nodes: Vec<NodeSnapshot>) -> SnapshotBundle {
    let mut builder = BundleBuilder::new("hydra-test").with_timestamp(timestamp);
    for node in nodes {
        assert_ok!(builder.add_node(node), "fixture node");
    }
    assert_ok!(builder.build(), "fixture bundle")
}
