//! Error types for bundle construction and parsing.

use thiserror::Error;

/// Structural violations found while parsing bundle text.
///
/// Every variant is fatal to the comparison that needed the bundle; a
/// malformed bundle is never treated as an empty one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedBundleError {
    #[error("missing HYDRA_SNAPSHOT_BUNDLE header")]
    MissingHeader,

    #[error("line {line}: invalid bundle header: {message}")]
    InvalidHeader { line: usize, message: String },

    #[error("unsupported bundle format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("line {line}: invalid node marker: {message}")]
    InvalidNodeMarker { line: usize, message: String },

    #[error("line {line}: node '{label}' has no matching END NODE marker")]
    UnterminatedNode { label: String, line: usize },

    #[error("line {line}: section {section} in node '{label}' has no matching END marker")]
    UnterminatedSection {
        label: String,
        section: String,
        line: usize,
    },

    #[error("line {line}: END marker '{marker}' without a matching BEGIN")]
    UnexpectedEnd { marker: String, line: usize },

    #[error("line {line}: END NODE for '{found}' while node '{expected}' is open")]
    MismatchedNodeEnd {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("line {line}: section block outside of a node")]
    SectionOutsideNode { line: usize },

    #[error("line {line}: unknown section '{name}'")]
    UnknownSection { name: String, line: usize },

    #[error("line {line}: duplicate node label '{label}'")]
    DuplicateNode { label: String, line: usize },

    #[error("line {line}: duplicate section {section} in node '{label}'")]
    DuplicateSection {
        label: String,
        section: String,
        line: usize,
    },

    #[error("line {line}: section {section} has no EXIT line")]
    MissingExitCode { section: String, line: usize },

    #[error("line {line}: invalid exit code '{value}'")]
    InvalidExitCode { value: String, line: usize },

    #[error("line {line}: unexpected content: {content}")]
    UnexpectedContent { content: String, line: usize },

    #[error("line {line}: bundle is not valid UTF-8")]
    InvalidEncoding { line: usize },
}

impl MalformedBundleError {
    /// 1-based line number the error refers to, when there is one.
    pub fn line(&self) -> Option<usize> {
        match self {
            MalformedBundleError::MissingHeader
            | MalformedBundleError::UnsupportedVersion { .. } => None,
            MalformedBundleError::InvalidHeader { line, .. }
            | MalformedBundleError::InvalidNodeMarker { line, .. }
            | MalformedBundleError::UnterminatedNode { line, .. }
            | MalformedBundleError::UnterminatedSection { line, .. }
            | MalformedBundleError::UnexpectedEnd { line, .. }
            | MalformedBundleError::MismatchedNodeEnd { line, .. }
            | MalformedBundleError::SectionOutsideNode { line }
            | MalformedBundleError::UnknownSection { line, .. }
            | MalformedBundleError::DuplicateNode { line, .. }
            | MalformedBundleError::DuplicateSection { line, .. }
            | MalformedBundleError::MissingExitCode { line, .. }
            | MalformedBundleError::InvalidExitCode { line, .. }
            | MalformedBundleError::UnexpectedContent { line, .. }
            | MalformedBundleError::InvalidEncoding { line } => Some(*line),
        }
    }
}

/// Errors raised while assembling a bundle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("duplicate node label: {0}")]
    DuplicateLabel(String),

    #[error("invalid {field} '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Result type alias for bundle construction.
pub type Result<T> = std::result::Result<T, BundleError>;
