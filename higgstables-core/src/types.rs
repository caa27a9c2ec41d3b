//! Core types shared by the cascade, the resolver and the aggregator
//!
//! Per-event data is columnar: every variable of a population is one
//! [`Column`], and every selection step produces a boolean [`Mask`] with one
//! entry per event.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for all core operations
pub type Result<T> = std::result::Result<T, TablesError>;

/// Boolean vector, one entry per event
pub type Mask = Vec<bool>;

/// Name of the reserved bucket collecting all rejected events
pub const UNSELECTED: &str = "unselected";

/// Errors that can occur while validating a configuration or evaluating a file
#[derive(Debug, thiserror::Error)]
pub enum TablesError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Variable `{variable}` not found in tree `{tree}`")]
    MissingVariable { variable: String, tree: String },

    #[error("Tree not found: {0}")]
    MissingTree(String),

    #[error("Histogram not found: {0}")]
    MissingHistogram(String),

    #[error("Variable `{variable}` in tree `{tree}` has {found} entries, expected {expected}")]
    LengthMismatch {
        variable: String,
        tree: String,
        expected: usize,
        found: usize,
    },

    #[error("Bin index {index} out of range for histogram `{tree}` with {n_bins} bins")]
    HistogramBinOutOfRange {
        tree: String,
        index: usize,
        n_bins: usize,
    },

    #[error("Cross section error: {0}")]
    CrossSection(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TablesError {
    pub(crate) fn invalid_expression(expression: &str, reason: impl Into<String>) -> Self {
        TablesError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

/// One named per-event variable
///
/// Integer columns are kept as integers so that comparisons on them stay exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    /// Signed integer values
    Int(Vec<i64>),
    /// Floating-point values
    Float(Vec<f64>),
}

impl Column {
    /// Number of events in this column
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
        }
    }

    /// True if the column holds no events
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<i64>> for Column {
    fn from(values: Vec<i64>) -> Self {
        Column::Int(values)
    }
}

impl From<Vec<f64>> for Column {
    fn from(values: Vec<f64>) -> Self {
        Column::Float(values)
    }
}

/// Number of selected events in a mask
pub fn count_selected(mask: &[bool]) -> u64 {
    mask.iter().filter(|&&selected| selected).count() as u64
}

/// Per-category counts of one source file
///
/// The counts are ordered like the output columns: `unselected` first, then
/// the categories in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeResult {
    /// Number of events in the population (N)
    pub n_events: usize,
    /// Events rejected by triggers and preselections
    pub unselected: u64,
    /// Events claimed by each category, in declaration order
    pub categories: Vec<(String, u64)>,
    /// Preselected events that no category claimed
    pub leftover: u64,
}

impl CascadeResult {
    /// Count for a column name (`unselected` or a category)
    pub fn get(&self, column: &str) -> Option<u64> {
        if column == UNSELECTED {
            return Some(self.unselected);
        }
        self.categories
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, count)| *count)
    }

    /// Column names in output order
    pub fn columns(&self) -> Vec<&str> {
        std::iter::once(UNSELECTED)
            .chain(self.categories.iter().map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Counts in output order
    pub fn row(&self) -> Vec<u64> {
        std::iter::once(self.unselected)
            .chain(self.categories.iter().map(|(_, count)| *count))
            .collect()
    }

    /// Sum of all category counts
    pub fn categorized(&self) -> u64 {
        self.categories.iter().map(|(_, count)| count).sum()
    }
}

impl fmt::Display for CascadeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", UNSELECTED, self.unselected)?;
        for (name, count) in &self.categories {
            write!(f, ", {}={}", name, count)?;
        }
        if self.leftover > 0 {
            write!(f, " (leftover {})", self.leftover)?;
        }
        Ok(())
    }
}
