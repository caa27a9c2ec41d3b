//! Event data sources
//!
//! The cascade reads per-event vectors and histogram bins through the
//! [`EventSource`] trait. [`InMemorySource`] is a simple implementation backed
//! by maps, which can also be loaded from a JSON event file.

use crate::types::{Column, Result, TablesError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Access to the columnar data of one source file
pub trait EventSource {
    /// Fetch the per-event vector `variable` from `tree`
    ///
    /// A missing tree is reported as [`TablesError::MissingVariable`] too.
    fn fetch_vector(&self, tree: &str, variable: &str) -> Result<Column>;

    /// Fetch the precomputed bin counts of the histogram stored under `tree`
    fn fetch_histogram_bins(&self, tree: &str) -> Result<Vec<u64>>;

    /// Number of entries (events) in `tree`
    fn n_entries(&self, tree: &str) -> Result<usize>;
}

/// Event source held entirely in memory
///
/// JSON layout:
/// ```json
/// {
///   "trees": { "Events": { "n_pfos": [21, 14], "b_tag1": [0.9, 0.1] } },
///   "histograms": { "preselection_cutflow": [10, 20, 30.0] }
/// }
/// ```
///
/// Histogram bins are event counts. They may be written as integers or as
/// whole-valued floats (`30.0`), the way exported histograms store them.
/// Fractional or negative bins are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InMemorySource {
    #[serde(default)]
    trees: BTreeMap<String, BTreeMap<String, Column>>,
    #[serde(default, deserialize_with = "deserialize_histograms")]
    histograms: BTreeMap<String, Vec<u64>>,
}

/// One histogram bin: an integer or a whole-valued float
#[derive(Deserialize)]
#[serde(untagged)]
enum BinContent {
    Count(u64),
    Float(f64),
}

impl BinContent {
    fn to_count(&self) -> std::result::Result<u64, String> {
        match *self {
            BinContent::Count(count) => Ok(count),
            BinContent::Float(value)
                if value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64 =>
            {
                Ok(value as u64)
            }
            BinContent::Float(value) => Err(format!(
                "histogram bin {} is not a non-negative whole number",
                value
            )),
        }
    }
}

fn deserialize_histograms<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Vec<u64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, Vec<BinContent>>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(tree, bins)| {
            let counts = bins
                .iter()
                .map(BinContent::to_count)
                .collect::<std::result::Result<Vec<u64>, String>>()
                .map_err(|reason| serde::de::Error::custom(format!("{}: {}", tree, reason)))?;
            Ok((tree, counts))
        })
        .collect()
}

impl InMemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a variable to a tree
    pub fn with_variable(
        mut self,
        tree: impl Into<String>,
        variable: impl Into<String>,
        column: impl Into<Column>,
    ) -> Self {
        self.trees
            .entry(tree.into())
            .or_default()
            .insert(variable.into(), column.into());
        self
    }

    /// Builder method: add a histogram
    pub fn with_histogram(mut self, tree: impl Into<String>, bins: Vec<u64>) -> Self {
        self.histograms.insert(tree.into(), bins);
        self
    }

    /// Parse a JSON event file's content
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Read a JSON event file
    pub fn from_path(path: &Path) -> Result<Self> {
        log::debug!("Reading event file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Names of all trees
    pub fn tree_names(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(|name| name.as_str())
    }

    fn tree(&self, tree: &str) -> Result<&BTreeMap<String, Column>> {
        self.trees
            .get(tree)
            .ok_or_else(|| TablesError::MissingTree(tree.to_string()))
    }
}

impl EventSource for InMemorySource {
    fn fetch_vector(&self, tree: &str, variable: &str) -> Result<Column> {
        self.trees
            .get(tree)
            .and_then(|variables| variables.get(variable))
            .cloned()
            .ok_or_else(|| TablesError::MissingVariable {
                variable: variable.to_string(),
                tree: tree.to_string(),
            })
    }

    fn fetch_histogram_bins(&self, tree: &str) -> Result<Vec<u64>> {
        self.histograms
            .get(tree)
            .cloned()
            .ok_or_else(|| TablesError::MissingHistogram(tree.to_string()))
    }

    fn n_entries(&self, tree: &str) -> Result<usize> {
        Ok(self
            .tree(tree)?
            .values()
            .next()
            .map(Column::len)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_fetch() {
        let source = InMemorySource::new()
            .with_variable("Events", "x", vec![1i64, 2, 3])
            .with_histogram("cutflow", vec![10, 20, 30]);

        assert_eq!(
            source.fetch_vector("Events", "x").unwrap(),
            Column::Int(vec![1, 2, 3])
        );
        assert_eq!(source.fetch_histogram_bins("cutflow").unwrap(), vec![10, 20, 30]);
        assert_eq!(source.n_entries("Events").unwrap(), 3);
    }

    #[test]
    fn test_missing_lookups() {
        let source = InMemorySource::new().with_variable("Events", "x", vec![1.0]);

        assert!(matches!(
            source.fetch_vector("Events", "y"),
            Err(TablesError::MissingVariable { .. })
        ));
        assert!(matches!(
            source.fetch_vector("Other", "x"),
            Err(TablesError::MissingVariable { ref tree, .. }) if tree == "Other"
        ));
        assert!(matches!(
            source.n_entries("Other"),
            Err(TablesError::MissingTree(_))
        ));
        assert!(matches!(
            source.fetch_histogram_bins("cutflow"),
            Err(TablesError::MissingHistogram(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let source = InMemorySource::from_json_str(
            r#"{
                "trees": {"Events": {"n_pfos": [21, 14], "b_tag1": [0.9, 0.1]}},
                "histograms": {"cutflow": [5, 7]}
            }"#,
        )
        .unwrap();

        assert_eq!(
            source.fetch_vector("Events", "n_pfos").unwrap(),
            Column::Int(vec![21, 14])
        );
        assert_eq!(
            source.fetch_vector("Events", "b_tag1").unwrap(),
            Column::Float(vec![0.9, 0.1])
        );
        assert_eq!(source.tree_names().collect::<Vec<_>>(), vec!["Events"]);
    }

    #[test]
    fn test_float_histogram_bins() {
        let source = InMemorySource::from_json_str(
            r#"{"histograms": {"cutflow": [10.0, 20, 30.0]}}"#,
        )
        .unwrap();
        assert_eq!(source.fetch_histogram_bins("cutflow").unwrap(), vec![10, 20, 30]);

        for bad in [r#"[1.5]"#, r#"[-2.0]"#, r#"[-2]"#, r#"["3"]"#] {
            let content = format!(r#"{{"histograms": {{"cutflow": {}}}}}"#, bad);
            assert!(matches!(
                InMemorySource::from_json_str(&content),
                Err(TablesError::JsonError(_))
            ));
        }
    }

    #[test]
    fn test_from_path() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(br#"{"trees": {"Events": {"x": [1, 2]}}}"#)
            .unwrap();
        temp_file.flush().unwrap();

        let source = InMemorySource::from_path(temp_file.path()).unwrap();
        assert_eq!(source.n_entries("Events").unwrap(), 2);
    }
}
