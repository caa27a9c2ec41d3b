//! Recursive descent parser for condition strings
//!
//! Precedence, from weakest to strongest binding:
//!
//! 1. comparison: `<` `<=` `>` `>=` `==` `!=` (not chainable)
//! 2. or: `|`
//! 3. and: `&`
//! 4. additive: `+` `-`
//! 5. term: `*` `/`
//! 6. unary: `-` `~`
//!
//! Comparisons bind weaker than `&` and `|`, so `a > 1 & b < 2` groups as
//! `a > (1 & b) < 2`. Every node is typed while it is built: `&`, `|` and `~`
//! only accept boolean operands, arithmetic and ordering only numeric ones.
//! An unparenthesized mix is therefore rejected here rather than at
//! evaluation time.

use super::lexer::Token;
use crate::types::{Result, TablesError};
use std::collections::BTreeSet;

/// Static type of an expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Bool,
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicOp {
    And,
    Or,
}

/// Typed syntax tree of a condition
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Int(i64),
    Float(f64),
    Bool(bool),
    Var(String),
    Neg(Box<Node>),
    Abs(Box<Node>),
    Not(Box<Node>),
    Arith(ArithOp, Box<Node>, Box<Node>),
    Compare(CmpOp, Box<Node>, Box<Node>),
    Logic(LogicOp, Box<Node>, Box<Node>),
}

impl Node {
    /// Type of the value this node produces
    pub(crate) fn kind(&self) -> Kind {
        match self {
            Node::Int(_) | Node::Float(_) | Node::Var(_) => Kind::Numeric,
            Node::Neg(_) | Node::Abs(_) | Node::Arith(..) => Kind::Numeric,
            Node::Bool(_) | Node::Not(_) | Node::Compare(..) | Node::Logic(..) => Kind::Bool,
        }
    }
}

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    variables: BTreeSet<String>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            variables: BTreeSet::new(),
        }
    }

    /// Parse a complete boolean condition, returning its tree and free variables
    pub(crate) fn parse_condition(mut self) -> Result<(Node, BTreeSet<String>)> {
        if self.tokens.is_empty() {
            return Err(self.error("empty expression"));
        }
        let root = self.parse_comparison()?;
        if let Some(token) = self.peek() {
            return Err(self.error(format!("unexpected token {:?}", token)));
        }
        if root.kind() != Kind::Bool {
            return Err(self.error("condition does not evaluate to a boolean"));
        }
        Ok((root, self.variables))
    }

    fn error(&self, reason: impl Into<String>) -> TablesError {
        TablesError::invalid_expression(self.source, reason)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_kind(&self, node: &Node, kind: Kind, operator: &str) -> Result<()> {
        if node.kind() == kind {
            Ok(())
        } else {
            let expected = match kind {
                Kind::Bool => "boolean",
                Kind::Numeric => "numeric",
            };
            Err(self.error(format!(
                "operator `{}` expects {} operands; parenthesize comparisons, e.g. `(a > 1) & (b < 2)`",
                operator, expected
            )))
        }
    }

    fn comparison_op(&self) -> Option<(CmpOp, &'static str)> {
        match self.peek() {
            Some(Token::Lt) => Some((CmpOp::Lt, "<")),
            Some(Token::Le) => Some((CmpOp::Le, "<=")),
            Some(Token::Gt) => Some((CmpOp::Gt, ">")),
            Some(Token::Ge) => Some((CmpOp::Ge, ">=")),
            Some(Token::EqEq) => Some((CmpOp::Eq, "==")),
            Some(Token::Ne) => Some((CmpOp::Ne, "!=")),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Node> {
        let lhs = self.parse_or()?;
        let Some((op, symbol)) = self.comparison_op() else {
            return Ok(lhs);
        };
        self.advance();
        let rhs = self.parse_or()?;

        if self.comparison_op().is_some() {
            return Err(self.error("chained comparisons are not supported"));
        }

        match op {
            CmpOp::Eq | CmpOp::Ne => {
                if lhs.kind() != rhs.kind() {
                    return Err(self.error(format!(
                        "operator `{}` compares a boolean with a number",
                        symbol
                    )));
                }
            }
            _ => {
                self.expect_kind(&lhs, Kind::Numeric, symbol)?;
                self.expect_kind(&rhs, Kind::Numeric, symbol)?;
            }
        }
        Ok(Node::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.advance();
            let rhs = self.parse_and()?;
            self.expect_kind(&lhs, Kind::Bool, "|")?;
            self.expect_kind(&rhs, Kind::Bool, "|")?;
            lhs = Node::Logic(LogicOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut lhs = self.parse_additive()?;
        while matches!(self.peek(), Some(Token::Amp)) {
            self.advance();
            let rhs = self.parse_additive()?;
            self.expect_kind(&lhs, Kind::Bool, "&")?;
            self.expect_kind(&rhs, Kind::Bool, "&")?;
            lhs = Node::Logic(LogicOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Node> {
        let mut lhs = self.parse_term()?;
        loop {
            let (op, symbol) = match self.peek() {
                Some(Token::Plus) => (ArithOp::Add, "+"),
                Some(Token::Minus) => (ArithOp::Sub, "-"),
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            self.expect_kind(&lhs, Kind::Numeric, symbol)?;
            self.expect_kind(&rhs, Kind::Numeric, symbol)?;
            lhs = Node::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Node> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, symbol) = match self.peek() {
                Some(Token::Star) => (ArithOp::Mul, "*"),
                Some(Token::Slash) => (ArithOp::Div, "/"),
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            self.expect_kind(&lhs, Kind::Numeric, symbol)?;
            self.expect_kind(&rhs, Kind::Numeric, symbol)?;
            lhs = Node::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let operand = self.parse_unary()?;
                self.expect_kind(&operand, Kind::Numeric, "-")?;
                Ok(match operand {
                    Node::Int(v) => Node::Int(v.wrapping_neg()),
                    Node::Float(v) => Node::Float(-v),
                    other => Node::Neg(Box::new(other)),
                })
            }
            Some(Token::Tilde) => {
                self.advance();
                let operand = self.parse_unary()?;
                self.expect_kind(&operand, Kind::Bool, "~")?;
                Ok(Node::Not(Box::new(operand)))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Node> {
        match self.advance() {
            Some(Token::Int(v)) => Ok(Node::Int(v)),
            Some(Token::Float(v)) => Ok(Node::Float(v)),
            Some(Token::LParen) => {
                let inner = self.parse_comparison()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected closing parenthesis")),
                }
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    return self.parse_call(&name);
                }
                match name.as_str() {
                    "True" | "true" => Ok(Node::Bool(true)),
                    "False" | "false" => Ok(Node::Bool(false)),
                    _ => {
                        self.variables.insert(name.clone());
                        Ok(Node::Var(name))
                    }
                }
            }
            Some(token) => Err(self.error(format!("unexpected token {:?}", token))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Node> {
        if name != "abs" {
            return Err(self.error(format!("unknown function '{}'", name)));
        }
        self.advance(); // consume '('
        let argument = self.parse_comparison()?;
        if !matches!(self.advance(), Some(Token::RParen)) {
            return Err(self.error("expected closing parenthesis after function argument"));
        }
        self.expect_kind(&argument, Kind::Numeric, "abs")?;
        Ok(Node::Abs(Box::new(argument)))
    }
}
