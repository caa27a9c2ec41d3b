//! Selection steps: expression selectors and triggers
//!
//! A [`Selector`] is a condition bound to the tree its variables are read
//! from. Preselections and categories are selectors; a [`Trigger`] is either
//! a selector or a histogram bin selection, and only reports how many events
//! it rejects.

use crate::expression::Expression;
use crate::resolver::VariableResolver;
use crate::source::EventSource;
use crate::types::{count_selected, Mask, Result, TablesError};
use std::collections::BTreeMap;

/// A condition evaluated over one tree, with per-variable tree overrides
#[derive(Debug, Clone)]
pub struct Selector {
    tree: String,
    out_of_tree_variables: BTreeMap<String, String>,
    expression: Expression,
}

impl Selector {
    pub fn new(
        tree: impl Into<String>,
        out_of_tree_variables: BTreeMap<String, String>,
        expression: Expression,
    ) -> Self {
        Self {
            tree: tree.into(),
            out_of_tree_variables,
            expression,
        }
    }

    /// Default tree of the condition's variables
    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// Variables read from a different tree than the default one
    pub fn out_of_tree_variables(&self) -> &BTreeMap<String, String> {
        &self.out_of_tree_variables
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Tree a variable is read from
    pub fn tree_for(&self, variable: &str) -> &str {
        self.out_of_tree_variables
            .get(variable)
            .map(String::as_str)
            .unwrap_or(&self.tree)
    }

    /// Evaluate the condition over the whole population
    pub fn mask<S: EventSource + ?Sized>(&self, resolver: &mut VariableResolver<'_, S>) -> Result<Mask> {
        let env = resolver.environment(self)?;
        self.expression.evaluate(&env)
    }
}

/// An early filter step whose only output is a rejection count
///
/// Triggers never narrow the population seen by later steps.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Events failing the condition are rejected
    Expression(Selector),
    /// Events outside the retained bins of a precomputed histogram are rejected
    Histogram {
        tree: String,
        retained_bins: Vec<usize>,
    },
}

impl Trigger {
    /// Tree the trigger reads from
    pub fn tree(&self) -> &str {
        match self {
            Trigger::Expression(selector) => selector.tree(),
            Trigger::Histogram { tree, .. } => tree,
        }
    }

    /// Configuration name of the trigger type
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Expression(_) => "expression",
            Trigger::Histogram { .. } => "histogram",
        }
    }

    /// Number of events this trigger rejects
    pub fn rejected<S: EventSource + ?Sized>(
        &self,
        resolver: &mut VariableResolver<'_, S>,
    ) -> Result<u64> {
        match self {
            Trigger::Expression(selector) => {
                let mask = selector.mask(resolver)?;
                Ok(mask.len() as u64 - count_selected(&mask))
            }
            Trigger::Histogram { tree, retained_bins } => {
                let bins = resolver.histogram_bins(tree)?;
                let total: u64 = bins.iter().sum();
                let mut kept = 0u64;
                for &index in retained_bins {
                    kept += bins.get(index).ok_or_else(|| TablesError::HistogramBinOutOfRange {
                        tree: tree.clone(),
                        index,
                        n_bins: bins.len(),
                    })?;
                }
                Ok(total.saturating_sub(kept))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    fn histogram(bins: Vec<u64>, retained_bins: Vec<usize>) -> (InMemorySource, Trigger) {
        let source = InMemorySource::new().with_histogram("cutflow", bins);
        let trigger = Trigger::Histogram {
            tree: "cutflow".to_string(),
            retained_bins,
        };
        (source, trigger)
    }

    #[test]
    fn test_histogram_trigger() {
        let (source, trigger) = histogram(vec![10, 20, 30], vec![0, 2]);
        let mut resolver = VariableResolver::new(&source);
        assert_eq!(trigger.rejected(&mut resolver).unwrap(), 20);
        assert_eq!(trigger.kind(), "histogram");
    }

    #[test]
    fn test_histogram_bin_out_of_range() {
        let (source, trigger) = histogram(vec![10, 20], vec![0, 5]);
        let mut resolver = VariableResolver::new(&source);
        let err = trigger.rejected(&mut resolver).unwrap_err();
        assert!(matches!(
            err,
            TablesError::HistogramBinOutOfRange { index: 5, n_bins: 2, .. }
        ));
    }

    #[test]
    fn test_expression_trigger() {
        let source = InMemorySource::new().with_variable("Events", "x", (0..10).collect::<Vec<i64>>());
        let trigger = Trigger::Expression(Selector::new(
            "Events",
            BTreeMap::new(),
            Expression::parse("x >= 4").unwrap(),
        ));
        let mut resolver = VariableResolver::new(&source);
        assert_eq!(trigger.rejected(&mut resolver).unwrap(), 4);
    }

    #[test]
    fn test_tree_for() {
        let mut out_of_tree = BTreeMap::new();
        out_of_tree.insert("hDecay".to_string(), "Truth".to_string());
        let selector = Selector::new("Events", out_of_tree, Expression::parse("hDecay > 0").unwrap());
        assert_eq!(selector.tree_for("hDecay"), "Truth");
        assert_eq!(selector.tree_for("n_pfos"), "Events");
    }
}
