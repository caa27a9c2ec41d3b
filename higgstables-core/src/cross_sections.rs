//! Process cross sections per beam polarization
//!
//! Cross sections are looked up per table (group) and process. The tables of
//! a machine scenario are its beam polarizations, e.g. `eLpR`. Values are in
//! femtobarn; unknown values are `inf`.

use crate::types::{Result, TablesError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Group (polarization) → process → cross section in fb
pub type CrossSectionTable = BTreeMap<String, BTreeMap<String, f64>>;

/// Polarizations kept unless exotic ones are requested
pub const STANDARD_POLARIZATIONS: [&str; 4] = ["eLpL", "eLpR", "eRpL", "eRpR"];

/// Anything that can provide cross sections per table
pub trait CrossSectionProvider {
    fn per_group(&self) -> Result<CrossSectionTable>;
}

impl CrossSectionProvider for CrossSectionTable {
    fn per_group(&self) -> Result<CrossSectionTable> {
        Ok(self.clone())
    }
}

/// Cross sections of one machine scenario
#[derive(Debug, Clone, PartialEq)]
pub struct MachineCrossSections {
    machine: String,
    all: CrossSectionTable,
    include_exotic: bool,
}

impl MachineCrossSections {
    /// Parse a machine file: `{"eLpR": {"Pe2e2h": 12.3, "Pn1n1h": ""}, ...}`
    ///
    /// Values may be numbers or numeric strings. An empty string or `null`
    /// means the cross section is unknown.
    pub fn from_json_str(machine: impl Into<String>, content: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, Value>> = serde_json::from_str(content)?;
        let mut all = CrossSectionTable::new();
        for (polarization, processes) in raw {
            let table = all.entry(polarization).or_default();
            for (process, value) in processes {
                let cross_section = parse_value(&value)
                    .map_err(|reason| TablesError::CrossSection(format!("{}: {}", process, reason)))?;
                table.insert(process, cross_section);
            }
        }
        Ok(Self {
            machine: machine.into(),
            all,
            include_exotic: false,
        })
    }

    /// Read a machine file; the machine name is the file stem
    pub fn from_path(path: &Path) -> Result<Self> {
        log::debug!("Reading cross sections from {:?}", path);
        let machine = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(machine, &content)
    }

    /// Extract one machine from the generator metadata
    ///
    /// Metadata keys look like `E250-SetA.Pe2e2h.Gwhizard-2_8_5.eL.pR.I402011.001`:
    /// the first two parts are machine and process, the two parts before the
    /// last two form the polarization. Each entry holds `cross_section_in_fb`.
    ///
    /// # Errors
    /// [`TablesError::CrossSection`] if the machine does not appear in the metadata.
    pub fn from_generator_meta(machine: &str, content: &str) -> Result<Self> {
        let meta: BTreeMap<String, Value> = serde_json::from_str(content)?;
        let mut all = CrossSectionTable::new();
        for (key, entry) in &meta {
            let parts: Vec<&str> = key.split('.').collect();
            if parts.len() < 4 || parts[0] != machine {
                continue;
            }
            let process = parts[1];
            let polarization = parts[parts.len() - 4..parts.len() - 2].concat();
            let cross_section = entry
                .get("cross_section_in_fb")
                .ok_or_else(|| {
                    TablesError::CrossSection(format!("{}: no `cross_section_in_fb` entry", key))
                })
                .and_then(|value| {
                    parse_value(value).map_err(|reason| {
                        TablesError::CrossSection(format!("{}: {}", key, reason))
                    })
                })?;
            all.entry(polarization)
                .or_default()
                .insert(process.to_string(), cross_section);
        }

        if all.is_empty() {
            return Err(TablesError::CrossSection(format!(
                "the machine specification `{}` was not found in the generator metadata",
                machine
            )));
        }
        Ok(Self {
            machine: machine.to_string(),
            all,
            include_exotic: false,
        })
    }

    /// Builder method: also report non-standard polarizations
    pub fn with_exotic(mut self, include_exotic: bool) -> Self {
        self.include_exotic = include_exotic;
        self
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Cross sections per polarization
    pub fn per_polarization(&self, include_exotic: bool) -> CrossSectionTable {
        self.all
            .iter()
            .filter(|(polarization, _)| {
                include_exotic || STANDARD_POLARIZATIONS.contains(&polarization.as_str())
            })
            .map(|(polarization, table)| (polarization.clone(), table.clone()))
            .collect()
    }

    /// Standard-polarization cross sections scaled by the beam polarization weights
    pub fn polarization_weighted(&self, electron: f64, positron: f64) -> Result<CrossSectionTable> {
        let weights = polarization_weights(electron, positron)?;
        let standard = self.per_polarization(false);
        Ok(weights
            .into_iter()
            .filter_map(|(polarization, weight)| {
                standard.get(&polarization).map(|table| {
                    let weighted = table
                        .iter()
                        .map(|(process, cs)| (process.clone(), weight * cs))
                        .collect();
                    (polarization, weighted)
                })
            })
            .collect())
    }

    /// Serialize all polarizations as a machine file
    pub fn to_json_string(&self) -> Result<String> {
        let raw: BTreeMap<&String, BTreeMap<&String, Value>> = self
            .all
            .iter()
            .map(|(polarization, table)| {
                let values = table
                    .iter()
                    .map(|(process, cs)| {
                        let value = serde_json::Number::from_f64(*cs)
                            .map(Value::Number)
                            .unwrap_or_else(|| Value::String(String::new()));
                        (process, value)
                    })
                    .collect();
                (polarization, values)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }
}

impl CrossSectionProvider for MachineCrossSections {
    fn per_group(&self) -> Result<CrossSectionTable> {
        Ok(self.per_polarization(self.include_exotic))
    }
}

/// Weights of the four helicity combinations for beam polarizations `(e, p)`
///
/// # Errors
/// [`TablesError::CrossSection`] if a polarization lies outside `[-1, 1]`.
///
/// # Example
/// ```
/// use higgstables_core::cross_sections::polarization_weights;
///
/// let weights = polarization_weights(0.0, 0.0).unwrap();
/// assert_eq!(weights["eLpR"], 0.25);
/// ```
pub fn polarization_weights(electron: f64, positron: f64) -> Result<BTreeMap<String, f64>> {
    let valid = |p: f64| (-1.0..=1.0).contains(&p);
    if !valid(electron) || !valid(positron) {
        return Err(TablesError::CrossSection(format!(
            "the polarization ({}, {}) is not understood, expected a form like (0.8, -0.3)",
            electron, positron
        )));
    }
    let x = (1.0 + electron) / 2.0;
    let y = (1.0 + positron) / 2.0;
    Ok(BTreeMap::from([
        ("eLpR".to_string(), (1.0 - x) * y),
        ("eRpL".to_string(), x * (1.0 - y)),
        ("eRpR".to_string(), x * y),
        ("eLpL".to_string(), (1.0 - x) * (1.0 - y)),
    ]))
}

fn parse_value(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Null => Ok(f64::INFINITY),
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not a cross section", n)),
        Value::String(s) if s.trim().is_empty() => Ok(f64::INFINITY),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("`{}` is not a cross section", s)),
        other => Err(format!("{} is not a cross section", other)),
    }
}
