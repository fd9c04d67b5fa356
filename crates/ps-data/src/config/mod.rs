//! Reader configuration for delimited text sources.

use serde::{Deserialize, Serialize};

use ps_core::series::DEFAULT_CATEGORY;

/// Shape of a delimited text file and the loader defaults applied to the
/// series parsed out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvFormat {
    /// Character that starts a comment. A line whose first non-space
    /// character is the marker is dropped; an in-line marker truncates the
    /// line.
    pub comment: char,

    /// Field separator, a single byte as the csv reader requires.
    pub delimiter: u8,

    /// Category assigned to every loaded series.
    pub default_category: String,

    /// How many series per category start out enabled.
    pub default_enabled: usize,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            comment: '#',
            delimiter: b',',
            default_category: DEFAULT_CATEGORY.to_string(),
            default_enabled: 2,
        }
    }
}

impl CsvFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip the comment portion of one raw line. Returns `None` when
    /// nothing parseable remains.
    pub fn strip_comment<'a>(&self, line: &'a str) -> Option<&'a str> {
        let retained = match line.find(self.comment) {
            Some(idx) => &line[..idx],
            None => line,
        };
        if retained.trim().is_empty() {
            None
        } else {
            Some(retained)
        }
    }
}
