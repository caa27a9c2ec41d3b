//! Vectorized evaluation of parsed conditions
//!
//! Every node evaluates to a whole column at once. Variable columns are
//! borrowed from the environment; only intermediate results are allocated.

use super::parser::{ArithOp, CmpOp, Kind, LogicOp, Node};
use super::Environment;
use crate::types::{Column, Result, TablesError};
use std::borrow::Cow;
use std::cmp::Ordering;

/// 2^63, the first float above every `i64`
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Numeric column produced by a node
enum Numeric<'e> {
    Int(Cow<'e, [i64]>),
    Float(Cow<'e, [f64]>),
}

impl<'e> Numeric<'e> {
    fn to_floats(&self) -> Cow<'_, [f64]> {
        match self {
            Numeric::Int(values) => Cow::Owned(values.iter().map(|&v| v as f64).collect()),
            Numeric::Float(values) => Cow::Borrowed(values.as_ref()),
        }
    }
}

impl CmpOp {
    /// Whether the comparison holds for an ordering (`None` for NaN operands)
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match self {
            CmpOp::Lt => ordering == Some(Ordering::Less),
            CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CmpOp::Gt => ordering == Some(Ordering::Greater),
            CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            CmpOp::Eq => ordering == Some(Ordering::Equal),
            CmpOp::Ne => ordering != Some(Ordering::Equal),
        }
    }
}

/// Exact ordering of an integer against a float, without rounding the integer
fn cmp_int_float(int: i64, float: f64) -> Option<Ordering> {
    if float.is_nan() {
        return None;
    }
    if float >= TWO_POW_63 {
        return Some(Ordering::Less);
    }
    if float < -TWO_POW_63 {
        return Some(Ordering::Greater);
    }
    let truncated = float.trunc();
    // exact: |truncated| < 2^63
    match int.cmp(&(truncated as i64)) {
        Ordering::Equal => 0.0f64.partial_cmp(&(float - truncated)),
        other => Some(other),
    }
}

/// Evaluate a boolean node into a mask over all events
pub(crate) fn eval_mask<'e>(
    node: &Node,
    env: &'e Environment,
    source: &str,
) -> Result<Cow<'e, [bool]>> {
    let n = env.n_events();
    let mask = match node {
        Node::Bool(value) => vec![*value; n],
        Node::Not(operand) => eval_mask(operand, env, source)?
            .iter()
            .map(|v| !v)
            .collect(),
        Node::Logic(op, lhs, rhs) => {
            let lhs = eval_mask(lhs, env, source)?;
            let rhs = eval_mask(rhs, env, source)?;
            let zipped = lhs.iter().zip(rhs.iter());
            match op {
                LogicOp::And => zipped.map(|(a, b)| *a && *b).collect(),
                LogicOp::Or => zipped.map(|(a, b)| *a || *b).collect(),
            }
        }
        Node::Compare(op, lhs, rhs) if lhs.kind() == Kind::Bool => {
            let lhs = eval_mask(lhs, env, source)?;
            let rhs = eval_mask(rhs, env, source)?;
            lhs.iter()
                .zip(rhs.iter())
                .map(|(a, b)| op.holds(Some(a.cmp(b))))
                .collect()
        }
        Node::Compare(op, lhs, rhs) => {
            let lhs = eval_numeric(lhs, env, source)?;
            let rhs = eval_numeric(rhs, env, source)?;
            compare(*op, &lhs, &rhs)
        }
        _ => {
            return Err(TablesError::invalid_expression(
                source,
                "numeric sub-expression used as a condition",
            ))
        }
    };
    Ok(Cow::Owned(mask))
}

fn eval_numeric<'e>(node: &Node, env: &'e Environment, source: &str) -> Result<Numeric<'e>> {
    let n = env.n_events();
    let value = match node {
        Node::Int(v) => Numeric::Int(Cow::Owned(vec![*v; n])),
        Node::Float(v) => Numeric::Float(Cow::Owned(vec![*v; n])),
        Node::Var(name) => match env.column(name)? {
            Column::Int(values) => Numeric::Int(Cow::Borrowed(values.as_slice())),
            Column::Float(values) => Numeric::Float(Cow::Borrowed(values.as_slice())),
        },
        Node::Neg(operand) => match eval_numeric(operand, env, source)? {
            Numeric::Int(values) => {
                Numeric::Int(Cow::Owned(values.iter().map(|v| v.wrapping_neg()).collect()))
            }
            Numeric::Float(values) => {
                Numeric::Float(Cow::Owned(values.iter().map(|v| -v).collect()))
            }
        },
        Node::Abs(operand) => match eval_numeric(operand, env, source)? {
            Numeric::Int(values) => {
                Numeric::Int(Cow::Owned(values.iter().map(|v| v.wrapping_abs()).collect()))
            }
            Numeric::Float(values) => {
                Numeric::Float(Cow::Owned(values.iter().map(|v| v.abs()).collect()))
            }
        },
        Node::Arith(op, lhs, rhs) => {
            let lhs = eval_numeric(lhs, env, source)?;
            let rhs = eval_numeric(rhs, env, source)?;
            arith(*op, &lhs, &rhs)
        }
        _ => {
            return Err(TablesError::invalid_expression(
                source,
                "boolean sub-expression used as a number",
            ))
        }
    };
    Ok(value)
}

fn arith<'e>(op: ArithOp, lhs: &Numeric<'_>, rhs: &Numeric<'_>) -> Numeric<'e> {
    if let (Numeric::Int(a), Numeric::Int(b)) = (lhs, rhs) {
        let zipped = a.iter().zip(b.iter());
        let ints: Option<Vec<i64>> = match op {
            ArithOp::Add => Some(zipped.map(|(x, y)| x.wrapping_add(*y)).collect()),
            ArithOp::Sub => Some(zipped.map(|(x, y)| x.wrapping_sub(*y)).collect()),
            ArithOp::Mul => Some(zipped.map(|(x, y)| x.wrapping_mul(*y)).collect()),
            // true division always yields floats
            ArithOp::Div => None,
        };
        if let Some(values) = ints {
            return Numeric::Int(Cow::Owned(values));
        }
    }

    let a = lhs.to_floats();
    let b = rhs.to_floats();
    let zipped = a.iter().zip(b.iter());
    let values = match op {
        ArithOp::Add => zipped.map(|(x, y)| x + y).collect(),
        ArithOp::Sub => zipped.map(|(x, y)| x - y).collect(),
        ArithOp::Mul => zipped.map(|(x, y)| x * y).collect(),
        ArithOp::Div => zipped.map(|(x, y)| x / y).collect(),
    };
    Numeric::Float(Cow::Owned(values))
}

fn compare(op: CmpOp, lhs: &Numeric<'_>, rhs: &Numeric<'_>) -> Vec<bool> {
    match (lhs, rhs) {
        (Numeric::Int(a), Numeric::Int(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| op.holds(Some(x.cmp(y))))
            .collect(),
        (Numeric::Float(a), Numeric::Float(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| op.holds(x.partial_cmp(y)))
            .collect(),
        (Numeric::Int(a), Numeric::Float(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| op.holds(cmp_int_float(*x, *y)))
            .collect(),
        (Numeric::Float(a), Numeric::Int(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| op.holds(cmp_int_float(*y, *x).map(Ordering::reverse)))
            .collect(),
    }
}
