//! Line normalization applied before comparing section text.
//!
//! Trailing whitespace is trimmed and blank lines are dropped; the order of
//! the remaining lines is kept. This is lossy on purpose: whitespace-only
//! formatting differences between two snapshots must never read as drift.

use crate::model::Section;

/// Normalized lines of a block of captured text.
pub fn normalize_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect()
}

impl Section {
    /// Normalized lines of this section's captured text.
    pub fn normalized_lines(&self) -> Vec<&str> {
        normalize_lines(&self.raw_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_whitespace_and_drops_blank_lines() {
        let text = "tcp  LISTEN 0.0.0.0:22   \n\n   \n  indented\t\nlast";
        assert_eq!(normalize_lines(text), vec!["tcp  LISTEN 0.0.0.0:22", "  indented", "last"]);
    }

    #[test]
    fn empty_text_has_no_lines() {
        assert!(normalize_lines("").is_empty());
        assert!(normalize_lines("\n \n\t\n").is_empty());
    }
}
