//! Bundle text parser.
//!
//! The grammar has two levels: node blocks at the top level, section blocks
//! inside nodes. The scanner makes a single pass over the lines and keeps the
//! open blocks in an explicit [`Scope`] (depth 0, 1 or 2). Any marker that
//! does not close the innermost open block at its own level is a structural
//! error; nothing is skipped or guessed.

use crate::model::{NodeSnapshot, Section, SectionName, SnapshotBundle, BUNDLE_FORMAT_VERSION};
use crate::writer::{
    BUNDLE_MAGIC, CMD_PREFIX, EXIT_PREFIX, NODE_BEGIN, NODE_END, NODE_FENCE, SECTION_BEGIN,
    SECTION_END, SECTION_FENCE, SUMMARY_MAGIC,
};
use crate::MalformedBundleError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

type ParseResult<T> = Result<T, MalformedBundleError>;

/// Parses bundle text back into a [`SnapshotBundle`].
#[derive(Debug, Clone)]
pub struct SectionExtractor {
    supported_version: u32,
}

impl Default for SectionExtractor {
    fn default() -> Self {
        Self {
            supported_version: BUNDLE_FORMAT_VERSION,
        }
    }
}

impl SectionExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a complete bundle.
    pub fn parse(&self, text: &str) -> ParseResult<SnapshotBundle> {
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));

        let (header_line, header) = loop {
            match lines.next() {
                Some((_, line)) if line.trim().is_empty() => continue,
                Some((n, line)) => break (n, line),
                None => return Err(MalformedBundleError::MissingHeader),
            }
        };
        let header = self.parse_header(header_line, header)?;

        let mut nodes: Vec<NodeSnapshot> = Vec::new();
        let mut seen_labels: HashSet<String> = HashSet::new();
        let mut scope = Scope::TopLevel;

        for (n, line) in lines {
            scope = match scope {
                Scope::TopLevel => {
                    if line.trim().is_empty() {
                        Scope::TopLevel
                    } else if line.starts_with(NODE_BEGIN) {
                        let (label, target) = parse_node_begin(n, line)?;
                        if !seen_labels.insert(label.clone()) {
                            return Err(MalformedBundleError::DuplicateNode { label, line: n });
                        }
                        Scope::Node(OpenNode::new(label, target, n))
                    } else if line.starts_with(NODE_END) {
                        return Err(MalformedBundleError::UnexpectedEnd {
                            marker: line.to_string(),
                            line: n,
                        });
                    } else if is_section_marker(line) {
                        return Err(MalformedBundleError::SectionOutsideNode { line: n });
                    } else {
                        return Err(unexpected(n, line));
                    }
                }
                Scope::Node(mut node) => {
                    if line.trim().is_empty() {
                        Scope::Node(node)
                    } else if line.starts_with(SECTION_BEGIN) {
                        let name = parse_section_name(n, line, SECTION_BEGIN)?;
                        if node.snapshot.sections.contains_key(&name) {
                            return Err(MalformedBundleError::DuplicateSection {
                                label: node.snapshot.label,
                                section: name.to_string(),
                                line: n,
                            });
                        }
                        Scope::Section(node, OpenSection::new(name, n))
                    } else if line.starts_with(SECTION_END) {
                        return Err(MalformedBundleError::UnexpectedEnd {
                            marker: line.to_string(),
                            line: n,
                        });
                    } else if line.starts_with(NODE_END) {
                        let label = parse_node_end(n, line)?;
                        if label != node.snapshot.label {
                            return Err(MalformedBundleError::MismatchedNodeEnd {
                                expected: node.snapshot.label,
                                found: label,
                                line: n,
                            });
                        }
                        nodes.push(node.snapshot);
                        Scope::TopLevel
                    } else if line.starts_with(NODE_BEGIN) {
                        return Err(MalformedBundleError::UnterminatedNode {
                            label: node.snapshot.label,
                            line: node.line,
                        });
                    } else if is_summary_line(line) && node.accepts_summary() {
                        node.snapshot.summary = parse_summary(n, line)?;
                        node.saw_summary = true;
                        Scope::Node(node)
                    } else {
                        return Err(unexpected(n, line));
                    }
                }
                Scope::Section(mut node, mut section) => {
                    if line.starts_with(SECTION_END) {
                        let name = parse_section_name(n, line, SECTION_END)
                            .ok()
                            .filter(|name| *name == section.name);
                        if name.is_none() {
                            return Err(section.unterminated(&node));
                        }
                        let finished = section.finish(n)?;
                        node.snapshot.insert_section(finished);
                        Scope::Node(node)
                    } else if line.starts_with(SECTION_BEGIN)
                        || line.starts_with(NODE_BEGIN)
                        || line.starts_with(NODE_END)
                    {
                        return Err(section.unterminated(&node));
                    } else {
                        section.body.push(line);
                        Scope::Section(node, section)
                    }
                }
            };
        }

        match scope {
            Scope::TopLevel => {}
            Scope::Node(node) => {
                return Err(MalformedBundleError::UnterminatedNode {
                    label: node.snapshot.label,
                    line: node.line,
                })
            }
            Scope::Section(node, section) => return Err(section.unterminated(&node)),
        }

        debug!(
            nodes = nodes.len(),
            generator = %header.generator_id,
            "parsed snapshot bundle"
        );

        Ok(SnapshotBundle {
            format_version: header.version,
            timestamp: header.timestamp,
            generator_id: header.generator_id,
            nodes,
        })
    }

    fn parse_header(&self, n: usize, line: &str) -> ParseResult<Header> {
        let mut parts = line.split('|');
        if parts.next() != Some(BUNDLE_MAGIC) {
            return Err(MalformedBundleError::MissingHeader);
        }

        let mut fields = BTreeMap::new();
        for part in parts {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                MalformedBundleError::InvalidHeader {
                    line: n,
                    message: format!("field without '=': {}", part),
                }
            })?;
            fields.insert(key, value);
        }

        let invalid = |message: String| MalformedBundleError::InvalidHeader { line: n, message };

        let version = fields
            .get("version")
            .ok_or_else(|| invalid("missing version".to_string()))?;
        let version: u32 = version
            .parse()
            .map_err(|_| invalid(format!("version is not an integer: {}", version)))?;
        if version != self.supported_version {
            return Err(MalformedBundleError::UnsupportedVersion {
                found: version,
                supported: self.supported_version,
            });
        }

        let timestamp = fields
            .get("timestamp")
            .ok_or_else(|| invalid("missing timestamp".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| invalid(format!("bad timestamp '{}': {}", timestamp, e)))?
            .with_timezone(&Utc);

        let generator_id = fields
            .get("generator")
            .ok_or_else(|| invalid("missing generator".to_string()))?
            .to_string();

        Ok(Header {
            version,
            timestamp,
            generator_id,
        })
    }
}

/// Parse bundle text with the default extractor.
pub fn parse_bundle(text: &str) -> ParseResult<SnapshotBundle> {
    SectionExtractor::new().parse(text)
}

/// Parse a bundle read straight from disk.
///
/// Bytes that are not UTF-8 are a malformed bundle, reported at the line
/// holding the first invalid byte.
pub fn parse_bundle_bytes(bytes: &[u8]) -> ParseResult<SnapshotBundle> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1;
        MalformedBundleError::InvalidEncoding { line }
    })?;
    parse_bundle(text)
}

struct Header {
    version: u32,
    timestamp: DateTime<Utc>,
    generator_id: String,
}

/// Open blocks; depth never exceeds two.
enum Scope<'a> {
    TopLevel,
    Node(OpenNode),
    Section(OpenNode, OpenSection<'a>),
}

struct OpenNode {
    snapshot: NodeSnapshot,
    line: usize,
    saw_summary: bool,
}

impl OpenNode {
    fn new(label: String, target: String, line: usize) -> Self {
        Self {
            snapshot: NodeSnapshot::new(label, target),
            line,
            saw_summary: false,
        }
    }

    /// One summary line, before any section.
    fn accepts_summary(&self) -> bool {
        !self.saw_summary && self.snapshot.sections.is_empty()
    }
}

struct OpenSection<'a> {
    name: SectionName,
    line: usize,
    body: Vec<&'a str>,
}

impl<'a> OpenSection<'a> {
    fn new(name: SectionName, line: usize) -> Self {
        Self {
            name,
            line,
            body: Vec::new(),
        }
    }

    fn unterminated(&self, node: &OpenNode) -> MalformedBundleError {
        MalformedBundleError::UnterminatedSection {
            label: node.snapshot.label.clone(),
            section: self.name.to_string(),
            line: self.line,
        }
    }

    /// Split `CMD:` and `EXIT:` out of the captured body.
    fn finish(self, end_line: usize) -> ParseResult<Section> {
        let mut body = self.body.as_slice();

        let mut command = String::new();
        if let Some(first) = body.first() {
            if let Some(rest) = first.strip_prefix(CMD_PREFIX) {
                command = rest.strip_prefix(' ').unwrap_or(rest).to_string();
                body = &body[1..];
            }
        }

        let exit_line = body
            .last()
            .and_then(|last| last.strip_prefix(EXIT_PREFIX))
            .ok_or_else(|| MalformedBundleError::MissingExitCode {
                section: self.name.to_string(),
                line: end_line,
            })?;
        let exit_code: i32 =
            exit_line
                .trim()
                .parse()
                .map_err(|_| MalformedBundleError::InvalidExitCode {
                    value: exit_line.trim().to_string(),
                    line: end_line - 1,
                })?;
        body = &body[..body.len() - 1];

        Ok(Section {
            name: self.name,
            command,
            raw_text: body.join("\n"),
            exit_code,
        })
    }
}

fn unexpected(n: usize, line: &str) -> MalformedBundleError {
    let mut content: String = line.chars().take(80).collect();
    if content.len() < line.len() {
        content.push_str("...");
    }
    MalformedBundleError::UnexpectedContent { content, line: n }
}

fn is_section_marker(line: &str) -> bool {
    line.starts_with(SECTION_BEGIN) || line.starts_with(SECTION_END)
}

fn is_summary_line(line: &str) -> bool {
    line.split('|').next() == Some(SUMMARY_MAGIC)
}

/// Fields of a `|key=value|...` marker body.
fn marker_fields(n: usize, body: &str) -> ParseResult<BTreeMap<&str, &str>> {
    let body = body
        .strip_prefix('|')
        .ok_or_else(|| MalformedBundleError::InvalidNodeMarker {
            line: n,
            message: "expected '|' after marker".to_string(),
        })?;
    let mut fields = BTreeMap::new();
    for part in body.split('|') {
        let (key, value) =
            part.split_once('=')
                .ok_or_else(|| MalformedBundleError::InvalidNodeMarker {
                    line: n,
                    message: format!("field without '=': {}", part),
                })?;
        fields.insert(key, value);
    }
    Ok(fields)
}

fn node_marker_body<'l>(n: usize, line: &'l str, prefix: &str) -> ParseResult<&'l str> {
    line.strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(NODE_FENCE))
        .ok_or_else(|| MalformedBundleError::InvalidNodeMarker {
            line: n,
            message: format!("marker is not fenced: {}", line),
        })
}

fn parse_node_begin(n: usize, line: &str) -> ParseResult<(String, String)> {
    let fields = marker_fields(n, node_marker_body(n, line, NODE_BEGIN)?)?;
    let label = required_field(n, &fields, "label")?;
    let target = required_field(n, &fields, "target")?;
    Ok((label, target))
}

fn parse_node_end(n: usize, line: &str) -> ParseResult<String> {
    let fields = marker_fields(n, node_marker_body(n, line, NODE_END)?)?;
    required_field(n, &fields, "label")
}

fn required_field(n: usize, fields: &BTreeMap<&str, &str>, key: &str) -> ParseResult<String> {
    match fields.get(key) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(MalformedBundleError::InvalidNodeMarker {
            line: n,
            message: format!("missing {}", key),
        }),
    }
}

fn parse_section_name(n: usize, line: &str, prefix: &str) -> ParseResult<SectionName> {
    let rest = line.strip_prefix(prefix).unwrap_or(line);
    let raw = rest
        .strip_suffix(SECTION_FENCE)
        .ok_or_else(|| MalformedBundleError::UnknownSection {
            name: rest.to_string(),
            line: n,
        })?;
    raw.parse()
        .map_err(|_| MalformedBundleError::UnknownSection {
            name: raw.to_string(),
            line: n,
        })
}

fn parse_summary(n: usize, line: &str) -> ParseResult<BTreeMap<String, String>> {
    let mut summary = BTreeMap::new();
    for part in line.split('|').skip(1) {
        let (key, value) = part.split_once('=').ok_or_else(|| unexpected(n, line))?;
        summary.insert(key.to_string(), value.to_string());
    }
    Ok(summary)
}
