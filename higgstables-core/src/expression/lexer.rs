//! Tokenizer for condition strings

use crate::types::{Result, TablesError};

/// Tokens of a condition string
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    Amp,
    Pipe,
    Tilde,
}

/// Split a condition string into tokens
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if let Some(&next) = chars.get(i + 1) {
            let two = match (c, next) {
                ('<', '=') => Some(Token::Le),
                ('>', '=') => Some(Token::Ge),
                ('=', '=') => Some(Token::EqEq),
                ('!', '=') => Some(Token::Ne),
                _ => None,
            };
            if let Some(token) = two {
                tokens.push(token);
                i += 2;
                continue;
            }
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '&' => Some(Token::Amp),
            '|' => Some(Token::Pipe),
            '~' => Some(Token::Tilde),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(token);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let (token, end) = number(input, &chars, i)?;
            tokens.push(token);
            i = end;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            return Err(TablesError::invalid_expression(
                input,
                format!("unexpected character '{}'", c),
            ));
        }
    }

    Ok(tokens)
}

/// Lex a numeric literal starting at `start`, returning the token and the end position
fn number(input: &str, chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() {
        let c = chars[i];
        let is_exponent_sign =
            (c == '+' || c == '-') && i > start && matches!(chars[i - 1], 'e' | 'E');
        if c.is_ascii_digit() {
            i += 1;
        } else if c == '.' || c == 'e' || c == 'E' || is_exponent_sign {
            is_float = true;
            i += 1;
        } else {
            break;
        }
    }

    let text: String = chars[start..i].iter().collect();
    let token = if is_float {
        text.parse::<f64>().map(Token::Float).ok()
    } else {
        text.parse::<i64>().map(Token::Int).ok()
    };
    token
        .map(|t| (t, i))
        .ok_or_else(|| TablesError::invalid_expression(input, format!("invalid number '{}'", text)))
}
