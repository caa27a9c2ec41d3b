//! Configuration file loading

use anyhow::{bail, Context, Result};
use higgstables_core::{CascadeConfig, ConfigSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up when the configuration argument is a directory
pub const CONFIG_FILE_NAME: &str = "higgstables-config.toml";

/// `--config` value that selects the bundled configuration
pub const DEFAULT_CONFIG_TAG: &str = "default";

/// The bundled configuration
pub const DEFAULT_CONFIG: &str = include_str!("../higgstables-config.toml");

/// Top level of the configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub higgstables: ConfigSpec,
}

/// Resolve the configuration file to use
///
/// Without an explicit path, the configuration is looked up next to the data
/// source. A directory resolves to [`CONFIG_FILE_NAME`] inside it.
pub fn select_config_path(config: Option<&Path>, data_source: &Path) -> Result<PathBuf> {
    let candidate = match config {
        Some(path) => path.to_path_buf(),
        None if data_source.is_dir() => data_source.to_path_buf(),
        None => data_source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    if !candidate.exists() {
        bail!(
            "Configuration file {:?} does not exist. \
             To use the bundled configuration, pass --config {}",
            candidate,
            DEFAULT_CONFIG_TAG
        );
    }
    if candidate.is_dir() {
        let in_dir = candidate.join(CONFIG_FILE_NAME);
        if !in_dir.is_file() {
            bail!(
                "{} not found in {:?}. To use the bundled configuration, pass --config {}",
                CONFIG_FILE_NAME,
                candidate,
                DEFAULT_CONFIG_TAG
            );
        }
        return Ok(in_dir);
    }
    Ok(candidate)
}

/// Whether the `--config` argument selects the bundled configuration
pub fn is_default_tag(config: Option<&Path>) -> bool {
    config == Some(Path::new(DEFAULT_CONFIG_TAG))
}

/// Write the bundled configuration into the output directory
///
/// Cross sections for its machine are then looked up in `data_dir` too.
pub fn write_default_config(data_dir: &Path) -> Result<PathBuf> {
    let path = data_dir.join(CONFIG_FILE_NAME);
    fs::write(&path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write the default configuration to {:?}", path))?;
    log::info!("Using the default configuration file at {:?}", path);
    Ok(path)
}

/// Load and validate a configuration from a TOML file
pub fn load_config(path: &Path) -> Result<CascadeConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let file: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    CascadeConfig::from_spec(file.higgstables)
        .with_context(|| format!("Invalid configuration in {:?}", path))
}

/// Copy the used configuration file into the output directory
pub fn copy_to_output(path: &Path, data_dir: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Config path {:?} has no file name", path))?;
    let destination = data_dir.join(file_name);
    if fs::canonicalize(path).ok() == fs::canonicalize(&destination).ok() && destination.exists() {
        return Ok(destination);
    }
    fs::copy(path, &destination)
        .with_context(|| format!("Failed to copy {:?} to {:?}", path, destination))?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use higgstables_core::{OutputFormat, Trigger};
    use tempfile::TempDir;

    const CONFIG: &str = r#"
        [higgstables]
        categories-tree = "Events"
        machine = "E250-SetA"
        ignored-processes = ["Pe1e1h"]
        cross-section-zero = ["Pqqh_fake"]
        format = "json"

        [higgstables.categories]
        zz = "n_iso_leptons == 2"
        bb = ["n_iso_leptons == 0", "b_tag1 > .8"]
        rest = "True"

        [higgstables.categories-out-of-tree-variables]
        hDecay = "Truth"

        [[higgstables.triggers]]
        type = "histogram"
        tree = "preselection_cutflow"
        condition = [0, 2]

        [[higgstables.preselections]]
        tree = "Events"
        condition = "n_pfos > 10"

        [higgstables.tables]
        eLpR = "*eLpR*/*.json"
        eRpL = "*eRpL*/*.json"
    "#;

    #[test]
    fn test_config_deserialization() {
        let file: ConfigFile = toml::from_str(CONFIG).unwrap();
        let config = CascadeConfig::from_spec(file.higgstables).unwrap();

        assert_eq!(config.category_names(), vec!["zz", "bb", "rest"]);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.machine.as_deref(), Some("E250-SetA"));
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.ignored_processes.contains("Pe1e1h"));
        assert!(matches!(config.triggers[0], Trigger::Histogram { .. }));
        assert_eq!(config.preselections.len(), 1);
        assert_eq!(config.categories[0].selector.tree_for("hDecay"), "Truth");
    }

    #[test]
    fn test_unknown_field() {
        let content = CONFIG.replace("machine = ", "colour = ");
        assert!(toml::from_str::<ConfigFile>(&content).is_err());
    }

    #[test]
    fn test_select_config_path() {
        let dir = TempDir::new().unwrap();
        assert!(select_config_path(None, dir.path()).is_err());

        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, CONFIG).unwrap();
        assert_eq!(select_config_path(None, dir.path()).unwrap(), config_path);
        assert_eq!(
            select_config_path(Some(dir.path()), Path::new("elsewhere")).unwrap(),
            config_path
        );

        let other = dir.path().join("other.toml");
        fs::write(&other, CONFIG).unwrap();
        assert_eq!(select_config_path(Some(&other), dir.path()).unwrap(), other);
        assert!(select_config_path(Some(&dir.path().join("missing.toml")), dir.path()).is_err());
    }

    #[test]
    fn test_load_and_copy() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, CONFIG).unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.columns(), vec!["unselected", "zz", "bb", "rest"]);

        let copied = copy_to_output(&config_path, out.path()).unwrap();
        assert_eq!(fs::read_to_string(copied).unwrap(), CONFIG);
    }

    #[test]
    fn test_default_config() {
        assert!(is_default_tag(Some(Path::new("default"))));
        assert!(!is_default_tag(Some(Path::new("default.toml"))));
        assert!(!is_default_tag(None));

        let out = TempDir::new().unwrap();
        let path = write_default_config(out.path()).unwrap();
        assert_eq!(path, out.path().join(CONFIG_FILE_NAME));

        let config = load_config(&path).unwrap();
        assert_eq!(config.category_names().last(), Some(&"rest"));
        assert_eq!(config.machine.as_deref(), Some("E250-SetA"));
        assert_eq!(config.tables.len(), 4);
        assert_eq!(copy_to_output(&path, out.path()).unwrap(), path);
        assert_eq!(fs::read_to_string(path).unwrap(), DEFAULT_CONFIG);
    }

    #[test]
    fn test_invalid_condition_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, CONFIG.replace("n_pfos > 10", "n_pfos >")).unwrap();
        let err = load_config(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid expression"));
    }
}
