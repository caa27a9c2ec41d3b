//! Per-file evaluation and table building
//!
//! Every distinct source file is evaluated once, in parallel. The results are
//! then reduced into one table per group on the calling thread.

use anyhow::{bail, Context, Result};
use higgstables_core::{
    CascadeConfig, CascadeResult, CrossSectionProvider, CrossSectionTable, GroupedTable,
    GroupingScheme, InMemorySource, MachineCrossSections, SelectionCascade, SourceFile,
    TableAggregator,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// What to do when a file cannot be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail the whole run
    #[default]
    Abort,
    /// Log the error and leave the file out of its tables
    Skip,
}

/// Evaluate one event file
pub fn evaluate_file(cascade: &SelectionCascade<'_>, path: &Path) -> Result<CascadeResult> {
    let source = InMemorySource::from_path(path)
        .with_context(|| format!("Failed to load event file: {:?}", path))?;
    let result = cascade
        .run(&source)
        .with_context(|| format!("Failed to evaluate {:?}", path))?;
    log::debug!("{:?}: {}", path, result);
    Ok(result)
}

/// Evaluate every file of the scheme and build one table per non-empty group
pub fn build_tables(
    scheme: &GroupingScheme,
    config: &CascadeConfig,
    policy: FailurePolicy,
) -> Result<Vec<GroupedTable>> {
    let cascade = SelectionCascade::new(config);
    let files: Vec<&SourceFile> = scheme.files().into_iter().collect();
    log::info!("Evaluating {} files", files.len());

    let outcomes: Vec<(&SourceFile, Result<CascadeResult>)> = files
        .par_iter()
        .map(|file| (*file, evaluate_file(&cascade, &file.path)))
        .collect();

    let mut results: BTreeMap<&Path, CascadeResult> = BTreeMap::new();
    let mut n_failed = 0usize;
    for (file, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                results.insert(file.path.as_path(), result);
            }
            Err(e) if policy == FailurePolicy::Skip => {
                log::error!("Skipping {:?}: {:#}", file.path, e);
                n_failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    if n_failed > 0 {
        log::warn!("{} of {} files were skipped", n_failed, files.len());
    }

    let aggregator = TableAggregator::new(config);
    let mut tables = Vec::new();
    for (group, group_files) in scheme.groups() {
        if group_files.is_empty() {
            continue;
        }
        let rows = group_files.iter().filter_map(|file| {
            results
                .get(file.path.as_path())
                .map(|result| (file.label.clone(), result.clone()))
        });
        tables.push(aggregator.build_table(group, rows)?);
    }
    Ok(tables)
}

/// Attach cross sections to every table
pub fn attach_cross_sections(
    tables: Vec<GroupedTable>,
    config: &CascadeConfig,
    cross_sections: &CrossSectionTable,
) -> Vec<GroupedTable> {
    let aggregator = TableAggregator::new(config);
    tables
        .into_iter()
        .map(|table| aggregator.with_cross_sections(table, cross_sections))
        .collect()
}

/// Generator metadata file that machine files are extracted from
pub const GENERATOR_META_FILE: &str = "genmetaByFile.json";

/// Cross sections from an explicit machine file, or the configured machine
///
/// With `polarization = Some((e, p))` the standard polarizations are scaled by
/// their beam polarization weights.
pub fn load_cross_sections(
    explicit: Option<&Path>,
    config: &CascadeConfig,
    config_path: &Path,
    polarization: Option<(f64, f64)>,
) -> Result<CrossSectionTable> {
    let machine = match explicit {
        Some(path) => read_machine_file(path)?,
        None => machine_cross_sections(config, config_path)?,
    };
    log::info!("Using cross sections of machine `{}`", machine.machine());

    match polarization {
        Some((electron, positron)) => {
            log::info!("Weighting cross sections for polarization ({}, {})", electron, positron);
            Ok(machine.polarization_weighted(electron, positron)?)
        }
        None => Ok(machine.per_group()?),
    }
}

fn read_machine_file(path: &Path) -> Result<MachineCrossSections> {
    MachineCrossSections::from_path(path)
        .with_context(|| format!("The cross sections could not be read from {:?}", path))
}

/// `<machine>.json` next to the config, extracted from the generator metadata
/// file in the same directory on first use
fn machine_cross_sections(config: &CascadeConfig, config_path: &Path) -> Result<MachineCrossSections> {
    let Some(machine) = &config.machine else {
        bail!("No `machine` configured. To run without the cross section column, pass --no-cs");
    };
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let path = dir.join(format!("{}.json", machine));
    if path.is_file() {
        return read_machine_file(&path);
    }

    let meta_path = dir.join(GENERATOR_META_FILE);
    if !meta_path.is_file() {
        bail!(
            "The cross sections for {} could not be found at {:?} and there is no {:?}. \
             To run without the cross section column, pass --no-cs",
            machine,
            path,
            meta_path
        );
    }
    log::info!("Extracting the cross sections for {} from {:?}", machine, meta_path);
    let content = fs::read_to_string(&meta_path)
        .with_context(|| format!("Failed to read generator metadata: {:?}", meta_path))?;
    let cross_sections = MachineCrossSections::from_generator_meta(machine, &content)
        .with_context(|| format!("Failed to extract cross sections from {:?}", meta_path))?;

    fs::write(&path, cross_sections.to_json_string()?)
        .with_context(|| format!("Failed to write machine file: {:?}", path))?;
    log::debug!("Machine file written to {:?}", path);
    Ok(cross_sections)
}
