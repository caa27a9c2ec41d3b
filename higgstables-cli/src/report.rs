//! Table output
//!
//! Writes one file per table into the output directory, as CSV or JSON.

use anyhow::{Context, Result};
use higgstables_core::{GroupedTable, OutputFormat, CROSS_SECTION_COLUMN};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Header of the row label column
pub const PROCESS_COLUMN: &str = "process";

/// JSON layout of a table
#[derive(Debug, Serialize)]
struct JsonTable<'t> {
    name: &'t str,
    columns: Vec<&'t str>,
    rows: Vec<JsonRow<'t>>,
}

#[derive(Debug, Serialize)]
struct JsonRow<'t> {
    process: &'t str,
    /// Infinite (unknown) cross sections serialize as `null`
    #[serde(rename = "cross section [fb]", skip_serializing_if = "Option::is_none")]
    cross_section: Option<f64>,
    counts: &'t [u64],
}

/// Write a table as `<name>.<extension>` into `dir`
pub fn write_table(table: &GroupedTable, dir: &Path, format: OutputFormat) -> Result<PathBuf> {
    let path = dir.join(format!("{}.{}", table.name(), format.extension()));
    let written = match format {
        OutputFormat::Csv => write_csv(table, &path),
        OutputFormat::Json => write_json(table, &path),
    };
    written.with_context(|| format!("Failed to write table to {:?}", path))?;
    log::info!("Wrote table `{}` ({} processes) to {:?}", table.name(), table.n_rows(), path);
    Ok(path)
}

fn write_csv(table: &GroupedTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let header = std::iter::once(PROCESS_COLUMN).chain(table.header());
    writer.write_record(header)?;

    for (label, counts) in table.rows() {
        let mut record = vec![label.to_string()];
        if let Some(cs) = table.cross_section(label) {
            record.push(cs.to_string());
        }
        record.extend(counts.iter().map(u64::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(table: &GroupedTable, path: &Path) -> Result<()> {
    let json = JsonTable {
        name: table.name(),
        columns: table.columns().iter().map(String::as_str).collect(),
        rows: table
            .rows()
            .map(|(process, counts)| JsonRow {
                process,
                cross_section: table.cross_section(process),
                counts,
            })
            .collect(),
    };
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &json)?;
    Ok(())
}

/// One line per table for the run summary
pub fn summarize(table: &GroupedTable) -> String {
    let mut totals = vec![0u64; table.columns().len()];
    for (_, counts) in table.rows() {
        for (total, count) in totals.iter_mut().zip(counts) {
            *total += count;
        }
    }
    let cells: Vec<String> = table
        .columns()
        .iter()
        .zip(&totals)
        .map(|(column, total)| format!("{}={}", column, total))
        .collect();
    let cross_section = if table.has_cross_sections() {
        format!(" [{}]", CROSS_SECTION_COLUMN)
    } else {
        String::new()
    };
    format!("{}: {}{}", table.name(), cells.join(", "), cross_section)
}
