//! Source file discovery
//!
//! A single file becomes one table named after its process. A directory is
//! searched with every table's glob pattern.

use anyhow::{bail, Context, Result};
use higgstables_core::{CascadeConfig, GroupingScheme, SourceFile};
use std::path::Path;

/// Build the grouping scheme for a data source
pub fn discover(data_source: &Path, config: &CascadeConfig) -> Result<GroupingScheme> {
    let mut scheme = GroupingScheme::new().with_ignored(config.ignored_processes.iter().cloned());

    if data_source.is_file() {
        let file = SourceFile::new(data_source);
        scheme.add_group(file.label.clone(), [file]);
    } else if data_source.is_dir() {
        for (table, pattern) in &config.tables {
            let files = glob_files(data_source, pattern)?;
            let n_kept = scheme.add_group(table.as_str(), files);
            if n_kept == 0 {
                log::warn!("No file matches the pattern {}.", pattern);
            } else {
                log::debug!("Table `{}`: {} files", table, n_kept);
            }
        }
    } else {
        bail!("Data source {:?} is neither a file nor a directory", data_source);
    }

    scheme.check_overlaps();
    Ok(scheme)
}

fn glob_files(root: &Path, pattern: &str) -> Result<Vec<SourceFile>> {
    let root_str = root
        .to_str()
        .with_context(|| format!("Data source {:?} is not valid UTF-8", root))?;
    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(root_str.trim_end_matches('/')),
        pattern
    );

    let mut files = Vec::new();
    for entry in glob::glob(&full_pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))? {
        let path = entry.with_context(|| format!("Failed to read a match of {}", pattern))?;
        if path.is_file() {
            files.push(SourceFile::new(path));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use higgstables_core::ConfigSpec;
    use std::fs;
    use tempfile::TempDir;

    fn config(ignored: &[&str]) -> CascadeConfig {
        let mut spec = ConfigSpec::new("Events")
            .with_category("all", "True")
            .with_table("eLpR", "*eLpR*/*/*.json")
            .with_table("eRpL", "*eRpL*/*/*.json")
            .with_table("missing", "nothing/*.json");
        for process in ignored {
            spec = spec.with_ignored_process(*process);
        }
        CascadeConfig::from_spec(spec).unwrap()
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "{}").unwrap();
    }

    #[test]
    fn test_directory_discovery() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Pqqh_eLpR/Pqqh/1.json");
        touch(dir.path(), "Pqqh_eLpR/Pqqh/2.json");
        touch(dir.path(), "Pe2e2h_eLpR/Pe2e2h/1.json");
        touch(dir.path(), "Pqqh_eRpL/Pqqh/1.json");
        touch(dir.path(), "Pqqh_eRpL/Pqqh/notes.txt");

        let scheme = discover(dir.path(), &config(&[])).unwrap();
        let groups: Vec<(&str, usize)> = scheme.groups().map(|(name, files)| (name, files.len())).collect();
        assert_eq!(groups, vec![("eLpR", 3), ("eRpL", 1), ("missing", 0)]);
        assert!(scheme
            .files()
            .iter()
            .all(|file| file.label == "Pqqh" || file.label == "Pe2e2h"));
    }

    #[test]
    fn test_ignored_processes() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Pqqh_eLpR/Pqqh/1.json");
        touch(dir.path(), "Pe2e2h_eLpR/Pe2e2h/1.json");

        let scheme = discover(dir.path(), &config(&["Pe2e2h"])).unwrap();
        let labels: Vec<&str> = scheme.files().into_iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Pqqh"]);
    }

    #[test]
    fn test_root_with_glob_characters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("run[1]");
        touch(&root, "Pqqh_eLpR/Pqqh/1.json");

        let scheme = discover(&root, &config(&[])).unwrap();
        let groups: Vec<(&str, usize)> = scheme.groups().map(|(name, files)| (name, files.len())).collect();
        assert_eq!(groups, vec![("eLpR", 1), ("eRpL", 0), ("missing", 0)]);
    }

    #[test]
    fn test_single_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Pqqh/1.json");

        let scheme = discover(&dir.path().join("Pqqh/1.json"), &config(&[])).unwrap();
        let groups: Vec<&str> = scheme.groups().map(|(name, _)| name).collect();
        assert_eq!(groups, vec!["Pqqh"]);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        assert!(discover(&dir.path().join("nope"), &config(&[])).is_err());
    }
}
