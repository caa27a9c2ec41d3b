//! Grouping of per-file results into tables
//!
//! A [`GroupingScheme`] maps every group (output table) to its source files.
//! The [`TableAggregator`] sums the cascade results of files sharing a
//! process label into one row of a [`GroupedTable`].

use crate::config::CascadeConfig;
use crate::cross_sections::CrossSectionTable;
use crate::types::{CascadeResult, Result, TablesError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Header of the optional cross-section column
pub const CROSS_SECTION_COLUMN: &str = "cross section [fb]";

/// Process label of a source file: the name of its parent directory
///
/// # Example
/// ```
/// use higgstables_core::aggregator::process_label;
/// use std::path::Path;
///
/// assert_eq!(process_label(Path::new("/data/eLpR/Pe2e2h/file_001.json")), "Pe2e2h");
/// ```
pub fn process_label(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One source file and the row it contributes to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceFile {
    pub path: PathBuf,
    pub label: String,
}

impl SourceFile {
    /// Source file labelled by its parent directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = process_label(&path);
        Self { path, label }
    }

    /// Source file with an explicit label
    pub fn with_label(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
        }
    }
}

/// Group name → source files, with ignored processes already removed
#[derive(Debug, Clone, Default)]
pub struct GroupingScheme {
    groups: BTreeMap<String, BTreeSet<SourceFile>>,
    ignored_processes: BTreeSet<String>,
}

impl GroupingScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: exclude files of these processes from every group
    pub fn with_ignored<I, S>(mut self, processes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_processes
            .extend(processes.into_iter().map(Into::into));
        self
    }

    /// Add a group; files of ignored processes are dropped
    ///
    /// Returns the number of files kept in the group.
    pub fn add_group(
        &mut self,
        name: impl Into<String>,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> usize {
        let name = name.into();
        let kept: BTreeSet<SourceFile> = files
            .into_iter()
            .filter(|file| {
                let ignored = self.ignored_processes.contains(&file.label);
                if ignored {
                    log::debug!("Ignoring {:?} (process `{}`)", file.path, file.label);
                }
                !ignored
            })
            .collect();
        let n_kept = kept.len();
        self.groups.entry(name).or_default().extend(kept);
        n_kept
    }

    /// Groups in name order
    pub fn groups(&self) -> impl Iterator<Item = (&str, &BTreeSet<SourceFile>)> {
        self.groups.iter().map(|(name, files)| (name.as_str(), files))
    }

    /// Every distinct file of any group
    pub fn files(&self) -> BTreeSet<&SourceFile> {
        self.groups.values().flatten().collect()
    }

    /// Whether no group has any file
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(BTreeSet::is_empty)
    }

    /// Warn when a file belongs to more than one group
    ///
    /// Returns `true` if any overlap was found.
    pub fn check_overlaps(&self) -> bool {
        let n_memberships: usize = self.groups.values().map(BTreeSet::len).sum();
        let overlapping = n_memberships != self.files().len();
        if overlapping {
            log::warn!("Some files contribute to more than one table.");
        }
        overlapping
    }
}

/// Counts per process for one group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedTable {
    name: String,
    columns: Vec<String>,
    rows: BTreeMap<String, Vec<u64>>,
    cross_sections: Option<BTreeMap<String, f64>>,
}

impl GroupedTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Count columns: `unselected`, then categories
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Full header, with the cross-section column first when present
    pub fn header(&self) -> Vec<&str> {
        let cross_section = self
            .cross_sections
            .as_ref()
            .map(|_| CROSS_SECTION_COLUMN);
        cross_section
            .into_iter()
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    /// Rows in label order
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[u64])> {
        self.rows
            .iter()
            .map(|(label, counts)| (label.as_str(), counts.as_slice()))
    }

    pub fn row(&self, label: &str) -> Option<&[u64]> {
        self.rows.get(label).map(Vec::as_slice)
    }

    /// Single count, by row label and column name
    pub fn count(&self, label: &str, column: &str) -> Option<u64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.row(label).map(|counts| counts[index])
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn has_cross_sections(&self) -> bool {
        self.cross_sections.is_some()
    }

    pub fn cross_section(&self, label: &str) -> Option<f64> {
        self.cross_sections.as_ref()?.get(label).copied()
    }
}

/// Sums per-file results into grouped tables
pub struct TableAggregator {
    columns: Vec<String>,
    cross_section_zero: BTreeSet<String>,
}

impl TableAggregator {
    pub fn new(config: &CascadeConfig) -> Self {
        Self {
            columns: config.columns(),
            cross_section_zero: config.cross_section_zero.clone(),
        }
    }

    /// Sum the results of one group, row by row
    ///
    /// Results sharing a label are added; the order of `results` does not
    /// matter.
    pub fn build_table<I>(&self, group: &str, results: I) -> Result<GroupedTable>
    where
        I: IntoIterator<Item = (String, CascadeResult)>,
    {
        let mut rows: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for (label, result) in results {
            if result.columns() != self.columns {
                return Err(TablesError::InvalidConfiguration(format!(
                    "result for `{}` has columns {:?}, table `{}` expects {:?}",
                    label,
                    result.columns(),
                    group,
                    self.columns
                )));
            }
            let row = rows
                .entry(label)
                .or_insert_with(|| vec![0; self.columns.len()]);
            for (total, count) in row.iter_mut().zip(result.row()) {
                *total += count;
            }
        }
        log::debug!("Table `{}`: {} processes", group, rows.len());
        Ok(GroupedTable {
            name: group.to_string(),
            columns: self.columns.clone(),
            rows,
            cross_sections: None,
        })
    }

    /// Attach the cross-section column
    ///
    /// Unknown tables and processes get `inf`, with a warning. Processes
    /// configured as zero cross section get `0.0`.
    pub fn with_cross_sections(&self, mut table: GroupedTable, cross_sections: &CrossSectionTable) -> GroupedTable {
        let known = cross_sections.get(&table.name);
        if known.is_none() {
            log::warn!(
                "No cross sections known for table `{}`. Known: {:?}",
                table.name,
                cross_sections.keys().collect::<Vec<_>>()
            );
        }

        let column = table
            .rows
            .keys()
            .map(|label| {
                let value = if self.cross_section_zero.contains(label) {
                    0.0
                } else {
                    match known.and_then(|processes| processes.get(label)) {
                        Some(cs) => *cs,
                        None => {
                            if known.is_some() {
                                log::warn!(
                                    "No cross section for process `{}` in table `{}`",
                                    label,
                                    table.name
                                );
                            }
                            f64::INFINITY
                        }
                    }
                };
                (label.clone(), value)
            })
            .collect();
        table.cross_sections = Some(column);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSpec;

    fn config() -> CascadeConfig {
        let mut spec = ConfigSpec::new("Events")
            .with_category("bb", "x > 5")
            .with_category("rest", "True")
            .with_table("eLpR", "*");
        spec.cross_section_zero = vec!["Pzero".to_string()];
        CascadeConfig::from_spec(spec).unwrap()
    }

    fn result(unselected: u64, bb: u64, rest: u64) -> CascadeResult {
        CascadeResult {
            n_events: (unselected + bb + rest) as usize,
            unselected,
            categories: vec![("bb".to_string(), bb), ("rest".to_string(), rest)],
            leftover: 0,
        }
    }

    #[test]
    fn test_process_label() {
        assert_eq!(process_label(Path::new("/a/Pqqh/f.json")), "Pqqh");
        assert_eq!(SourceFile::new("/a/Pqqh/f.json").label, "Pqqh");
    }

    #[test]
    fn test_rows_with_same_label_are_summed() {
        let aggregator = TableAggregator::new(&config());
        let table = aggregator
            .build_table(
                "eLpR",
                vec![
                    ("Pqqh".to_string(), result(1, 2, 3)),
                    ("Pe2e2h".to_string(), result(0, 5, 0)),
                    ("Pqqh".to_string(), result(10, 20, 30)),
                ],
            )
            .unwrap();

        assert_eq!(table.header(), vec!["unselected", "bb", "rest"]);
        assert_eq!(table.labels().collect::<Vec<_>>(), vec!["Pe2e2h", "Pqqh"]);
        assert_eq!(table.row("Pqqh"), Some(&[11, 22, 33][..]));
        assert_eq!(table.count("Pe2e2h", "bb"), Some(5));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let aggregator = TableAggregator::new(&config());
        let results = vec![
            ("A".to_string(), result(1, 2, 3)),
            ("B".to_string(), result(4, 5, 6)),
            ("A".to_string(), result(7, 8, 9)),
        ];
        let forward = aggregator.build_table("g", results.clone()).unwrap();
        let backward = aggregator
            .build_table("g", results.into_iter().rev())
            .unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_column_mismatch() {
        let aggregator = TableAggregator::new(&config());
        let mut other = result(1, 1, 1);
        other.categories[0].0 = "cc".to_string();
        assert!(aggregator
            .build_table("g", vec![("A".to_string(), other)])
            .is_err());
    }

    #[test]
    fn test_cross_section_column() {
        let aggregator = TableAggregator::new(&config());
        let table = aggregator
            .build_table(
                "eLpR",
                vec![
                    ("Pqqh".to_string(), result(0, 1, 1)),
                    ("Punknown".to_string(), result(0, 1, 1)),
                    ("Pzero".to_string(), result(0, 1, 1)),
                ],
            )
            .unwrap();
        let mut cross_sections = CrossSectionTable::new();
        cross_sections
            .entry("eLpR".to_string())
            .or_default()
            .insert("Pqqh".to_string(), 120.5);

        let table = aggregator.with_cross_sections(table, &cross_sections);
        assert_eq!(table.header()[0], CROSS_SECTION_COLUMN);
        assert_eq!(table.cross_section("Pqqh"), Some(120.5));
        assert_eq!(table.cross_section("Punknown"), Some(f64::INFINITY));
        assert_eq!(table.cross_section("Pzero"), Some(0.0));
    }

    #[test]
    fn test_unknown_group_gets_infinite_cross_sections() {
        let aggregator = TableAggregator::new(&config());
        let table = aggregator
            .build_table("eXpY", vec![("Pqqh".to_string(), result(0, 1, 1))])
            .unwrap();
        let table = aggregator.with_cross_sections(table, &CrossSectionTable::new());
        assert!(table.cross_section("Pqqh").unwrap().is_infinite());
    }

    #[test]
    fn test_grouping_scheme() {
        let mut scheme = GroupingScheme::new().with_ignored(["Pignored"]);
        let kept = scheme.add_group(
            "eLpR",
            vec![
                SourceFile::with_label("/d/Pqqh/1.json", "Pqqh"),
                SourceFile::with_label("/d/Pignored/1.json", "Pignored"),
            ],
        );
        assert_eq!(kept, 1);
        assert!(!scheme.check_overlaps());

        scheme.add_group("all", vec![SourceFile::with_label("/d/Pqqh/1.json", "Pqqh")]);
        assert!(scheme.check_overlaps());
        assert_eq!(scheme.files().len(), 1);
        assert_eq!(scheme.groups().count(), 2);
    }

    #[test]
    fn test_empty_grouping_scheme() {
        let mut scheme = GroupingScheme::new();
        assert_eq!(scheme.add_group("eLpR", Vec::new()), 0);
        assert!(scheme.is_empty());
    }
}
