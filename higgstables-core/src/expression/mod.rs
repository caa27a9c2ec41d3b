//! Condition expressions
//!
//! A condition is a string such as `(n_iso_leptons == 0) & (b_tag1 > .8)`.
//! It is parsed once, when the configuration is validated, and then
//! evaluated against an [`Environment`] of per-event columns to produce a
//! boolean mask.
//!
//! Supported syntax:
//! - comparisons `<`, `<=`, `>`, `>=`, `==`, `!=`
//! - arithmetic `+`, `-`, `*`, `/`, unary minus and `abs(...)`
//! - boolean combination `&` (and), `|` (or), `~` (not)
//! - literals: integers, floats (`.8`, `1e-5`), `True`, `False`
//!
//! Comparisons bind weaker than `&` and `|`, so operands of `&` and `|` must be
//! parenthesized.

mod eval;
mod lexer;
mod parser;

use crate::types::{Column, Mask, Result, TablesError};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Combine sub-conditions by logical AND
///
/// Each part is wrapped in parentheses and the parts are joined with `&`:
/// `["a > 1", "b < 2"]` becomes `(a > 1) & (b < 2)`.
pub fn conjunction<S: AsRef<str>>(parts: &[S]) -> String {
    let inner: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
    format!("({})", inner.join(") & ("))
}

/// A parsed, type-checked condition
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: parser::Node,
    variables: BTreeSet<String>,
}

impl Expression {
    /// Parse a condition string
    ///
    /// Fails with [`TablesError::InvalidExpression`] on unknown tokens,
    /// unbalanced parentheses, unknown functions, or operands of the wrong type.
    ///
    /// # Example
    /// ```
    /// use higgstables_core::Expression;
    ///
    /// let expr = Expression::parse("(b_tag1 > .8) & (abs(cos_theta) < 0.9)").unwrap();
    /// let vars: Vec<&str> = expr.free_variables().iter().map(|s| s.as_str()).collect();
    /// assert_eq!(vars, vec!["b_tag1", "cos_theta"]);
    /// ```
    pub fn parse(condition: &str) -> Result<Self> {
        let tokens = lexer::tokenize(condition)?;
        let (root, variables) = parser::Parser::new(condition, &tokens).parse_condition()?;
        Ok(Self {
            source: condition.to_string(),
            root,
            variables,
        })
    }

    /// Parse a list of sub-conditions combined by logical AND
    pub fn parse_all<S: AsRef<str>>(parts: &[S]) -> Result<Self> {
        if parts.is_empty() {
            return Err(TablesError::invalid_expression("", "empty list of conditions"));
        }
        Self::parse(&conjunction(parts))
    }

    /// Variable names referenced by the condition
    pub fn free_variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    /// The condition string this expression was parsed from
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate the condition for every event of the environment
    pub fn evaluate(&self, env: &Environment) -> Result<Mask> {
        eval::eval_mask(&self.root, env, &self.source).map(|mask| mask.into_owned())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Named columns of equal length that an expression is evaluated against
#[derive(Debug, Clone, Default)]
pub struct Environment {
    n_events: usize,
    columns: HashMap<String, Arc<Column>>,
}

impl Environment {
    /// Create an empty environment for `n_events` events
    pub fn new(n_events: usize) -> Self {
        Self {
            n_events,
            columns: HashMap::new(),
        }
    }

    /// Add a column; its length must match the number of events
    pub fn insert(&mut self, name: impl Into<String>, column: Arc<Column>) -> Result<()> {
        let name = name.into();
        if column.len() != self.n_events {
            return Err(TablesError::LengthMismatch {
                variable: name,
                tree: "<environment>".to_string(),
                expected: self.n_events,
                found: column.len(),
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Builder method: add a column
    pub fn with_column(mut self, name: impl Into<String>, column: impl Into<Column>) -> Result<Self> {
        self.insert(name, Arc::new(column.into()))?;
        Ok(self)
    }

    /// Number of events every column holds
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Look up a column by variable name
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .map(|column| column.as_ref())
            .ok_or_else(|| TablesError::MissingVariable {
                variable: name.to_string(),
                tree: "<environment>".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_x() -> Environment {
        Environment::new(10)
            .with_column("x", (0..10).collect::<Vec<i64>>())
            .unwrap()
    }

    #[test]
    fn test_conjunction_rule() {
        assert_eq!(conjunction(&["a > 1", "b < 2"]), "(a > 1) & (b < 2)");
        assert_eq!(conjunction(&["a > 1"]), "(a > 1)");
    }

    #[test]
    fn test_evaluate_integer_comparison() {
        let expr = Expression::parse("x < 3").unwrap();
        let mask = expr.evaluate(&env_x()).unwrap();
        assert_eq!(mask.iter().filter(|&&m| m).count(), 3);
        assert!(mask[0] && mask[2] && !mask[3]);
    }

    #[test]
    fn test_evaluate_boolean_combination() {
        let expr = Expression::parse("((x > 1) & (x < 4)) | (x == 9)").unwrap();
        let mask = expr.evaluate(&env_x()).unwrap();
        let selected: Vec<usize> = (0..10).filter(|&i| mask[i]).collect();
        assert_eq!(selected, vec![2, 3, 9]);
    }

    #[test]
    fn test_evaluate_not() {
        let expr = Expression::parse("~(x >= 5)").unwrap();
        let mask = expr.evaluate(&env_x()).unwrap();
        assert_eq!(mask.iter().filter(|&&m| m).count(), 5);
    }

    #[test]
    fn test_evaluate_not_equal() {
        let expr = Expression::parse("x != 4").unwrap();
        let mask = expr.evaluate(&env_x()).unwrap();
        assert_eq!(mask.iter().filter(|&&m| m).count(), 9);
        assert!(!mask[4] && mask[3] && mask[5]);

        let env = Environment::new(3)
            .with_column("a", vec![1.0, 2.5, f64::NAN])
            .unwrap()
            .with_column("n", vec![1i64, 2, 3])
            .unwrap();
        let expr = Expression::parse("a != n").unwrap();
        assert_eq!(expr.evaluate(&env).unwrap(), vec![false, true, true]);
    }

    #[test]
    fn test_evaluate_arithmetic_and_abs() {
        let env = Environment::new(4)
            .with_column("a", vec![-2.5, -0.5, 0.5, 3.0])
            .unwrap()
            .with_column("b", vec![1i64, 2, 3, 4])
            .unwrap();
        let expr = Expression::parse("(abs(a) < 1) | (b / 2 == 2)").unwrap();
        assert_eq!(expr.evaluate(&env).unwrap(), vec![false, true, true, true]);

        let expr = Expression::parse("a + b > 2").unwrap();
        assert_eq!(expr.evaluate(&env).unwrap(), vec![false, false, true, true]);
    }

    #[test]
    fn test_integer_division_is_true_division() {
        let env = Environment::new(2).with_column("n", vec![3i64, 4]).unwrap();
        let expr = Expression::parse("n / 2 == 1.5").unwrap();
        assert_eq!(expr.evaluate(&env).unwrap(), vec![true, false]);
    }

    #[test]
    fn test_list_condition_equivalence() {
        let env = Environment::new(5)
            .with_column("a", vec![0i64, 1, 2, 3, 4])
            .unwrap()
            .with_column("b", vec![4i64, 3, 1, 0, 1])
            .unwrap();
        let from_list = Expression::parse_all(&["a > 1", "b < 2"]).unwrap();
        let from_string = Expression::parse("(a > 1) & (b < 2)").unwrap();
        assert_eq!(
            from_list.evaluate(&env).unwrap(),
            from_string.evaluate(&env).unwrap()
        );
        assert_eq!(from_list.as_str(), "(a > 1) & (b < 2)");
    }

    #[test]
    fn test_empty_list_is_rejected() {
        let parts: [&str; 0] = [];
        assert!(Expression::parse_all(&parts).is_err());
    }

    #[test]
    fn test_constant_condition() {
        let expr = Expression::parse("True").unwrap();
        assert_eq!(expr.evaluate(&Environment::new(3)).unwrap(), vec![true; 3]);
    }

    #[test]
    fn test_missing_column() {
        let expr = Expression::parse("y > 0").unwrap();
        let err = expr.evaluate(&env_x()).unwrap_err();
        assert!(matches!(err, TablesError::MissingVariable { .. }));
    }

    #[test]
    fn test_environment_length_check() {
        let result = Environment::new(3).with_column("x", vec![1.0, 2.0]);
        assert!(matches!(result, Err(TablesError::LengthMismatch { .. })));
    }
}
