//! Cascade configuration
//!
//! [`ConfigSpec`] is the serde shape of the `higgstables` configuration
//! section. [`CascadeConfig::from_spec`] validates it eagerly: every field is
//! checked and every condition is parsed before any event data is touched.

use crate::expression::{conjunction, Expression};
use crate::trigger::{Selector, Trigger};
use crate::types::{Result, TablesError, UNSELECTED};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Default trigger type
pub const EXPRESSION_TYPE: &str = "expression";
/// Trigger type selecting histogram bins
pub const HISTOGRAM_TYPE: &str = "histogram";

/// A condition as written in the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    /// A single condition string
    Expression(String),
    /// Sub-conditions combined by logical AND
    Conjunction(Vec<String>),
    /// Histogram bin indices to retain (histogram triggers only)
    Bins(Vec<i64>),
}

impl ConditionSpec {
    /// Condition string, with list forms combined by logical AND
    pub fn to_expression_string(&self) -> Option<String> {
        match self {
            ConditionSpec::Expression(condition) => Some(condition.clone()),
            ConditionSpec::Conjunction(parts) if !parts.is_empty() => Some(conjunction(parts)),
            _ => None,
        }
    }
}

impl From<&str> for ConditionSpec {
    fn from(condition: &str) -> Self {
        ConditionSpec::Expression(condition.to_string())
    }
}

impl From<Vec<&str>> for ConditionSpec {
    fn from(parts: Vec<&str>) -> Self {
        ConditionSpec::Conjunction(parts.into_iter().map(String::from).collect())
    }
}

/// One entry of the `triggers` or `preselections` lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TriggerSpec {
    /// `expression` (default) or `histogram`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub tree: String,
    pub condition: ConditionSpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub out_of_tree_variables: BTreeMap<String, String>,
}

impl TriggerSpec {
    /// An expression trigger (or preselection)
    pub fn expression(tree: impl Into<String>, condition: impl Into<ConditionSpec>) -> Self {
        Self {
            kind: None,
            tree: tree.into(),
            condition: condition.into(),
            out_of_tree_variables: BTreeMap::new(),
        }
    }

    /// A histogram trigger retaining the given bins
    pub fn histogram(tree: impl Into<String>, retained_bins: Vec<i64>) -> Self {
        Self {
            kind: Some(HISTOGRAM_TYPE.to_string()),
            tree: tree.into(),
            condition: ConditionSpec::Bins(retained_bins),
            out_of_tree_variables: BTreeMap::new(),
        }
    }

    /// Builder method: read a variable from another tree
    pub fn with_out_of_tree_variable(
        mut self,
        variable: impl Into<String>,
        tree: impl Into<String>,
    ) -> Self {
        self.out_of_tree_variables.insert(variable.into(), tree.into());
        self
    }

    fn kind_or_default(&self) -> &str {
        self.kind.as_deref().unwrap_or(EXPRESSION_TYPE)
    }
}

/// Categories in declaration order
///
/// Deserialized from a map, keeping the order in which the entries appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoriesSpec(pub Vec<(String, ConditionSpec)>);

impl<'de> Deserialize<'de> for CategoriesSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = CategoriesSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping from category name to condition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, ConditionSpec)> = Vec::new();
                while let Some((name, condition)) = map.next_entry::<String, ConditionSpec>()? {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate category `{}`",
                            name
                        )));
                    }
                    entries.push((name, condition));
                }
                Ok(CategoriesSpec(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl Serialize for CategoriesSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, condition) in &self.0 {
            map.serialize_entry(name, condition)?;
        }
        map.end()
    }
}

/// The `higgstables` configuration section, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigSpec {
    pub categories: CategoriesSpec,
    pub categories_tree: String,
    #[serde(default)]
    pub categories_out_of_tree_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
    #[serde(default)]
    pub preselections: Vec<TriggerSpec>,
    /// Group name → glob pattern of the files in that group
    pub tables: BTreeMap<String, String>,
    #[serde(default)]
    pub ignored_processes: Vec<String>,
    /// Collider scenario the cross sections are looked up for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    /// Processes whose cross section is forced to zero
    #[serde(default)]
    pub cross_section_zero: Vec<String>,
    /// Output table format (`csv` or `json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ConfigSpec {
    /// Create a specification with no categories and no tables
    pub fn new(categories_tree: impl Into<String>) -> Self {
        Self {
            categories: CategoriesSpec::default(),
            categories_tree: categories_tree.into(),
            categories_out_of_tree_variables: BTreeMap::new(),
            triggers: Vec::new(),
            preselections: Vec::new(),
            tables: BTreeMap::new(),
            ignored_processes: Vec::new(),
            machine: None,
            cross_section_zero: Vec::new(),
            format: None,
        }
    }

    /// Builder method: append a category
    pub fn with_category(mut self, name: impl Into<String>, condition: impl Into<ConditionSpec>) -> Self {
        self.categories.0.push((name.into(), condition.into()));
        self
    }

    /// Builder method: read a category variable from another tree
    pub fn with_category_out_of_tree_variable(
        mut self,
        variable: impl Into<String>,
        tree: impl Into<String>,
    ) -> Self {
        self.categories_out_of_tree_variables
            .insert(variable.into(), tree.into());
        self
    }

    /// Builder method: append a trigger
    pub fn with_trigger(mut self, trigger: TriggerSpec) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Builder method: append a preselection
    pub fn with_preselection(mut self, preselection: TriggerSpec) -> Self {
        self.preselections.push(preselection);
        self
    }

    /// Builder method: add a table (group) with its file pattern
    pub fn with_table(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.tables.insert(name.into(), pattern.into());
        self
    }

    /// Builder method: ignore a process
    pub fn with_ignored_process(mut self, process: impl Into<String>) -> Self {
        self.ignored_processes.push(process.into());
        self
    }
}

/// Output format of the grouped tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    /// Parse a configuration value
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(TablesError::InvalidConfiguration(format!(
                "format `{}` is not supported, use one of: csv, json",
                other
            ))),
        }
    }

    /// File extension of written tables
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// A named, ordered classification bucket
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub selector: Selector,
}

/// Validated configuration with every condition parsed
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub categories: Vec<Category>,
    pub triggers: Vec<Trigger>,
    pub preselections: Vec<Selector>,
    pub tables: BTreeMap<String, String>,
    pub ignored_processes: BTreeSet<String>,
    pub machine: Option<String>,
    pub cross_section_zero: BTreeSet<String>,
    pub format: OutputFormat,
}

impl CascadeConfig {
    /// Validate a specification
    ///
    /// # Errors
    /// * [`TablesError::InvalidConfiguration`] for structural problems
    /// * [`TablesError::InvalidExpression`] for conditions that do not parse
    pub fn from_spec(spec: ConfigSpec) -> Result<Self> {
        if spec.categories.0.is_empty() {
            return Err(TablesError::InvalidConfiguration(
                "at least one category is required".to_string(),
            ));
        }

        let mut categories = Vec::with_capacity(spec.categories.0.len());
        for (name, condition) in &spec.categories.0 {
            if name == UNSELECTED {
                return Err(TablesError::InvalidConfiguration(format!(
                    "`{}` is reserved and cannot be a category name",
                    UNSELECTED
                )));
            }
            let condition = condition.to_expression_string().ok_or_else(|| {
                TablesError::InvalidConfiguration(format!(
                    "category `{}` needs a condition string or a list of condition strings",
                    name
                ))
            })?;
            let expression = Expression::parse(&condition)?;
            categories.push(Category {
                name: name.clone(),
                selector: Selector::new(
                    spec.categories_tree.clone(),
                    spec.categories_out_of_tree_variables.clone(),
                    expression,
                ),
            });
        }

        let triggers = spec
            .triggers
            .iter()
            .enumerate()
            .map(|(i, trigger)| build_trigger(i, trigger))
            .collect::<Result<Vec<_>>>()?;

        let preselections = spec
            .preselections
            .iter()
            .enumerate()
            .map(|(i, preselection)| build_preselection(i, preselection))
            .collect::<Result<Vec<_>>>()?;

        let format = match &spec.format {
            Some(format) => OutputFormat::parse(format)?,
            None => OutputFormat::default(),
        };

        let config = Self {
            categories,
            triggers,
            preselections,
            tables: spec.tables,
            ignored_processes: spec.ignored_processes.into_iter().collect(),
            machine: spec.machine,
            cross_section_zero: spec.cross_section_zero.into_iter().collect(),
            format,
        };
        log::info!(
            "The variables used for category building are: {:?}",
            config.category_variables()
        );
        Ok(config)
    }

    /// Parse and validate a JSON document holding the configuration section
    pub fn from_json_str(content: &str) -> Result<Self> {
        let spec: ConfigSpec = serde_json::from_str(content)
            .map_err(|e| TablesError::InvalidConfiguration(e.to_string()))?;
        Self::from_spec(spec)
    }

    /// Category names in declaration order
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    /// Output columns: `unselected`, then the categories in declaration order
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(UNSELECTED.to_string())
            .chain(self.categories.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// All variables referenced by category conditions
    pub fn category_variables(&self) -> BTreeSet<String> {
        self.categories
            .iter()
            .flat_map(|c| c.selector.expression().free_variables().iter().cloned())
            .collect()
    }
}

fn build_trigger(index: usize, spec: &TriggerSpec) -> Result<Trigger> {
    match spec.kind_or_default() {
        EXPRESSION_TYPE => Ok(Trigger::Expression(build_selector(index, spec)?)),
        HISTOGRAM_TYPE => {
            let indices: &[i64] = match &spec.condition {
                ConditionSpec::Bins(indices) => indices,
                // an empty list deserializes as the string-list form
                ConditionSpec::Conjunction(parts) if parts.is_empty() => &[],
                _ => {
                    return Err(TablesError::InvalidConfiguration(format!(
                        "trigger #{}: a histogram condition must be a list of bin indices",
                        index
                    )))
                }
            };
            let mut retained_bins: Vec<usize> = Vec::with_capacity(indices.len());
            for &bin in indices {
                let bin = usize::try_from(bin).map_err(|_| {
                    TablesError::InvalidConfiguration(format!(
                        "trigger #{}: bin index {} is negative",
                        index, bin
                    ))
                })?;
                if retained_bins.contains(&bin) {
                    return Err(TablesError::InvalidConfiguration(format!(
                        "trigger #{}: bin index {} is listed twice",
                        index, bin
                    )));
                }
                retained_bins.push(bin);
            }
            Ok(Trigger::Histogram {
                tree: spec.tree.clone(),
                retained_bins,
            })
        }
        other => Err(TablesError::InvalidConfiguration(format!(
            "trigger #{}: `{}` is not a valid trigger type, choose one of: {}, {}",
            index, other, EXPRESSION_TYPE, HISTOGRAM_TYPE
        ))),
    }
}

fn build_preselection(index: usize, spec: &TriggerSpec) -> Result<Selector> {
    if spec.kind_or_default() != EXPRESSION_TYPE {
        return Err(TablesError::InvalidConfiguration(format!(
            "preselection #{}: all preselections must have type `{}`",
            index, EXPRESSION_TYPE
        )));
    }
    build_selector(index, spec)
}

fn build_selector(index: usize, spec: &TriggerSpec) -> Result<Selector> {
    let condition = spec.condition.to_expression_string().ok_or_else(|| {
        TablesError::InvalidConfiguration(format!(
            "selection step #{}: condition not understood",
            index
        ))
    })?;
    Ok(Selector::new(
        spec.tree.clone(),
        spec.out_of_tree_variables.clone(),
        Expression::parse(&condition)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> ConfigSpec {
        ConfigSpec::new("Events")
            .with_category("bb", vec!["n_iso_leptons == 0", "b_tag1 > .8"])
            .with_category("rest", "True")
            .with_table("eLpR", "*eLpR*/*.json")
    }

    #[test]
    fn test_valid_config() {
        let config = CascadeConfig::from_spec(base_spec()).unwrap();
        assert_eq!(config.category_names(), vec!["bb", "rest"]);
        assert_eq!(config.columns(), vec!["unselected", "bb", "rest"]);
        assert_eq!(
            config.categories[0].selector.expression().as_str(),
            "(n_iso_leptons == 0) & (b_tag1 > .8)"
        );
        assert_eq!(config.format, OutputFormat::Csv);
        let variables: Vec<String> = config.category_variables().into_iter().collect();
        assert_eq!(variables, vec!["b_tag1", "n_iso_leptons"]);
    }

    #[test]
    fn test_json_keeps_category_order() {
        let config = CascadeConfig::from_json_str(
            r#"{
                "categories": {"zz": "x > 2", "aa": ["x > 1", "x < 5"], "mm": "True"},
                "categories-tree": "Events",
                "tables": {"eLpR": "*"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.category_names(), vec!["zz", "aa", "mm"]);
    }

    #[test]
    fn test_unexpected_field_is_rejected() {
        let err = CascadeConfig::from_json_str(
            r#"{"categories": {"a": "True"}, "categories-tree": "E", "tables": {}, "colour": 1}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TablesError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let err = CascadeConfig::from_json_str(r#"{"categories": {"a": "True"}, "tables": {}}"#)
            .unwrap_err();
        assert!(matches!(err, TablesError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_duplicate_category_is_rejected() {
        let err = CascadeConfig::from_json_str(
            r#"{"categories": {"a": "True", "a": "False"}, "categories-tree": "E", "tables": {}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, TablesError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_invalid_category_expression() {
        let spec = base_spec().with_category("new_cat", "this is invalid!");
        let err = CascadeConfig::from_spec(spec).unwrap_err();
        assert!(matches!(err, TablesError::InvalidExpression { .. }));
    }

    #[test]
    fn test_reserved_category_name() {
        let spec = base_spec().with_category(UNSELECTED, "True");
        assert!(matches!(
            CascadeConfig::from_spec(spec),
            Err(TablesError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_category_with_bins_is_rejected() {
        let mut spec = base_spec();
        spec.categories.0.push(("bins".to_string(), ConditionSpec::Bins(vec![0, 1])));
        assert!(matches!(
            CascadeConfig::from_spec(spec),
            Err(TablesError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_no_categories_is_rejected() {
        let spec = ConfigSpec::new("Events");
        assert!(CascadeConfig::from_spec(spec).is_err());
    }

    #[test]
    fn test_triggers() {
        let spec = base_spec()
            .with_trigger(TriggerSpec::histogram("cutflow", vec![0, 2]))
            .with_trigger(
                TriggerSpec::expression("Events", "hDecay > 0").with_out_of_tree_variable("hDecay", "Truth"),
            );
        let config = CascadeConfig::from_spec(spec).unwrap();
        assert_eq!(config.triggers.len(), 2);
        assert!(matches!(
            &config.triggers[0],
            Trigger::Histogram { retained_bins, .. } if retained_bins == &vec![0, 2]
        ));
        match &config.triggers[1] {
            Trigger::Expression(selector) => assert_eq!(selector.tree_for("hDecay"), "Truth"),
            other => panic!("Expected expression trigger, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_trigger_type() {
        let mut trigger = TriggerSpec::expression("Events", "x > 1");
        trigger.kind = Some("lookup".to_string());
        let err = CascadeConfig::from_spec(base_spec().with_trigger(trigger)).unwrap_err();
        assert!(matches!(err, TablesError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_histogram_trigger_needs_bins() {
        let mut trigger = TriggerSpec::expression("cutflow", "x > 1");
        trigger.kind = Some(HISTOGRAM_TYPE.to_string());
        assert!(CascadeConfig::from_spec(base_spec().with_trigger(trigger)).is_err());

        let duplicate = TriggerSpec::histogram("cutflow", vec![1, 1]);
        assert!(CascadeConfig::from_spec(base_spec().with_trigger(duplicate)).is_err());

        let negative = TriggerSpec::histogram("cutflow", vec![-1]);
        assert!(CascadeConfig::from_spec(base_spec().with_trigger(negative)).is_err());
    }

    #[test]
    fn test_preselection_must_be_expression() {
        let spec = base_spec().with_preselection(TriggerSpec::histogram("cutflow", vec![0]));
        let err = CascadeConfig::from_spec(spec).unwrap_err();
        assert!(matches!(err, TablesError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_invalid_preselection_expression() {
        let spec = base_spec().with_preselection(TriggerSpec::expression("Events", "(x > 1"));
        assert!(matches!(
            CascadeConfig::from_spec(spec),
            Err(TablesError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_output_format() {
        let mut spec = base_spec();
        spec.format = Some("json".to_string());
        assert_eq!(CascadeConfig::from_spec(spec).unwrap().format, OutputFormat::Json);

        let mut spec = base_spec();
        spec.format = Some("pickle".to_string());
        assert!(matches!(
            CascadeConfig::from_spec(spec),
            Err(TablesError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_spec_serialization_keeps_order() {
        let spec = base_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: ConfigSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
