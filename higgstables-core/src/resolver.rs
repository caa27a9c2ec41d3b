//! Lazy, memoized variable access for one event population
//!
//! A [`VariableResolver`] is created per source file and dropped with it; its
//! cache is never shared across files.

use crate::expression::Environment;
use crate::source::EventSource;
use crate::trigger::Selector;
use crate::types::{Column, Result, TablesError};
use std::collections::HashMap;
use std::sync::Arc;

/// Fetches per-event vectors on first use and keeps them for the population
pub struct VariableResolver<'s, S: EventSource + ?Sized> {
    source: &'s S,
    /// Key: (tree, variable)
    cache: HashMap<(String, String), Arc<Column>>,
    /// Population size, fixed by the first vector or entry count seen
    n_events: Option<usize>,
}

impl<'s, S: EventSource + ?Sized> VariableResolver<'s, S> {
    /// Create a resolver with an empty cache
    pub fn new(source: &'s S) -> Self {
        Self {
            source,
            cache: HashMap::new(),
            n_events: None,
        }
    }

    /// Resolve `variable` from `override_tree` if given, else from `default_tree`
    ///
    /// # Errors
    /// * [`TablesError::MissingVariable`] if the variable is not in the resolved tree
    /// * [`TablesError::LengthMismatch`] if its length differs from the population size
    pub fn resolve(
        &mut self,
        variable: &str,
        default_tree: &str,
        override_tree: Option<&str>,
    ) -> Result<Arc<Column>> {
        let tree = override_tree.unwrap_or(default_tree);
        let key = (tree.to_string(), variable.to_string());
        if let Some(column) = self.cache.get(&key) {
            return Ok(Arc::clone(column));
        }

        log::trace!("Loading `{}` from tree `{}`", variable, tree);
        let column = self.source.fetch_vector(tree, variable).map_err(|e| {
            log::error!("`{}` not found in `{}`: {}", variable, tree, e);
            e
        })?;
        self.check_length(variable, tree, column.len())?;

        let column = Arc::new(column);
        self.cache.insert(key, Arc::clone(&column));
        Ok(column)
    }

    /// Build the environment holding every free variable of a selector
    pub fn environment(&mut self, selector: &Selector) -> Result<Environment> {
        let mut columns = Vec::with_capacity(selector.expression().free_variables().len());
        for variable in selector.expression().free_variables() {
            let override_tree = selector.out_of_tree_variables().get(variable).map(String::as_str);
            let column = self.resolve(variable, selector.tree(), override_tree)?;
            columns.push((variable.clone(), column));
        }

        let n_events = self.population_size(selector.tree())?;
        let mut env = Environment::new(n_events);
        for (variable, column) in columns {
            env.insert(variable, column)?;
        }
        Ok(env)
    }

    /// Bin counts of a histogram; histograms are not cached
    pub fn histogram_bins(&self, tree: &str) -> Result<Vec<u64>> {
        self.source.fetch_histogram_bins(tree)
    }

    /// Population size, if any vector has been resolved yet
    pub fn n_events(&self) -> Option<usize> {
        self.n_events
    }

    /// Number of cached (tree, variable) vectors
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn population_size(&mut self, tree: &str) -> Result<usize> {
        match self.n_events {
            Some(n) => Ok(n),
            None => {
                let n = self.source.n_entries(tree)?;
                self.n_events = Some(n);
                Ok(n)
            }
        }
    }

    fn check_length(&mut self, variable: &str, tree: &str, found: usize) -> Result<()> {
        match self.n_events {
            Some(expected) if expected != found => Err(TablesError::LengthMismatch {
                variable: variable.to_string(),
                tree: tree.to_string(),
                expected,
                found,
            }),
            Some(_) => Ok(()),
            None => {
                self.n_events = Some(found);
                Ok(())
            }
        }
    }
}
