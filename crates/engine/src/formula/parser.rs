// Formula parser - converts formula strings into AST
// Supports: numbers, cell refs (RowName.ColName), the ROW keyword,
// functions (SUM, AVG, ...), basic math (+, -, *, /) and parentheses.

use thiserror::Error;

/// Expression AST. References stay symbolic (row/column names); the
/// resolver binds them against a table's structural index.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// `RowName.ColName` — a cell in this table
    CellRef { row: String, col: String },
    /// `ROW` — the ordered sibling cells of the context row
    RowRef,
    Function { name: String, args: Vec<Expr> },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parse failure, carrying the byte offset of the offending token within
/// the formula body (after the optional leading `=`).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at position {pos}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("empty formula")]
    Empty,
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("invalid reference '{0}'")]
    InvalidReference(String),
}

impl ParseError {
    fn new(kind: ParseErrorKind, pos: usize) -> Self {
        Self { kind, pos }
    }
}

/// Parse a formula into an AST. A leading `=` is accepted and skipped.
/// Pure function: no table context, no side effects.
pub fn parse(formula: &str) -> Result<Expr, ParseError> {
    let body = formula.trim();
    let body = body.strip_prefix('=').unwrap_or(body);

    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err(ParseError::new(ParseErrorKind::Empty, 0));
    }

    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos < tokens.len() {
        // Leftover input: a stray `)` means unbalanced parens, anything else
        // is a token the grammar has no place for
        let kind = match tokens[pos].kind {
            TokKind::RParen => ParseErrorKind::UnbalancedParens,
            _ => ParseErrorKind::UnexpectedToken,
        };
        return Err(ParseError::new(kind, tokens[pos].pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokKind,
    pos: usize,
}

#[derive(Debug, Clone)]
enum TokKind {
    Number(f64),
    Ident(String),
    /// `row.col` reference pair
    RefPair(String, String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                tokens.push(Token { kind: TokKind::Plus, pos });
                chars.next();
            }
            '-' => {
                tokens.push(Token { kind: TokKind::Minus, pos });
                chars.next();
            }
            '*' => {
                tokens.push(Token { kind: TokKind::Star, pos });
                chars.next();
            }
            '/' => {
                tokens.push(Token { kind: TokKind::Slash, pos });
                chars.next();
            }
            '(' => {
                tokens.push(Token { kind: TokKind::LParen, pos });
                chars.next();
            }
            ')' => {
                tokens.push(Token { kind: TokKind::RParen, pos });
                chars.next();
            }
            ',' => {
                tokens.push(Token { kind: TokKind::Comma, pos });
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str.parse().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber(num_str.clone()), pos)
                })?;
                tokens.push(Token { kind: TokKind::Number(num), pos });
            }
            c if c.is_alphabetic() || c == '_' => {
                let first = read_ident(&mut chars);
                // A dot after an identifier makes it a Row.Col reference
                if let Some(&(dot_pos, '.')) = chars.peek() {
                    chars.next(); // consume '.'
                    match chars.peek() {
                        Some(&(_, n)) if n.is_alphabetic() || n == '_' => {
                            let second = read_ident(&mut chars);
                            tokens.push(Token {
                                kind: TokKind::RefPair(first, second),
                                pos,
                            });
                        }
                        _ => {
                            return Err(ParseError::new(
                                ParseErrorKind::InvalidReference(format!("{}.", first)),
                                dot_pos,
                            ));
                        }
                    }
                } else {
                    tokens.push(Token { kind: TokKind::Ident(first), pos });
                }
            }
            other => {
                return Err(ParseError::new(ParseErrorKind::UnexpectedChar(other), pos));
            }
        }
    }

    Ok(tokens)
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::CharIndices>) -> String {
    let mut ident = String::new();
    while let Some(&(_, ch)) = chars.peek() {
        if ch.is_alphanumeric() || ch == '_' {
            ident.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match tokens[pos].kind {
            TokKind::Plus => Op::Add,
            TokKind::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_primary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match tokens[pos].kind {
            TokKind::Star => Op::Mul,
            TokKind::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_primary(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let Some(token) = tokens.get(pos) else {
        let end = tokens.last().map(|t| t.pos + 1).unwrap_or(0);
        return Err(ParseError::new(ParseErrorKind::UnexpectedEnd, end));
    };

    match &token.kind {
        TokKind::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        TokKind::RefPair(row, col) => Ok((
            Expr::CellRef {
                row: row.clone(),
                col: col.clone(),
            },
            pos + 1,
        )),
        TokKind::Ident(name) => {
            if name.eq_ignore_ascii_case("ROW") {
                return Ok((Expr::RowRef, pos + 1));
            }
            // Function call
            if let Some(Token { kind: TokKind::LParen, .. }) = tokens.get(pos + 1) {
                let (args, new_pos) = parse_function_args(tokens, pos + 2)?;
                return Ok((
                    Expr::Function {
                        name: name.to_uppercase(),
                        args,
                    },
                    new_pos,
                ));
            }
            // A bare identifier is not a valid reference — references are
            // always Row.Col pairs or the ROW keyword
            Err(ParseError::new(
                ParseErrorKind::InvalidReference(name.clone()),
                token.pos,
            ))
        }
        TokKind::LParen => {
            let (expr, new_pos) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(new_pos) {
                Some(Token { kind: TokKind::RParen, .. }) => Ok((expr, new_pos + 1)),
                _ => Err(ParseError::new(ParseErrorKind::UnbalancedParens, token.pos)),
            }
        }
        TokKind::Plus => {
            // Unary plus is a no-op
            parse_primary(tokens, pos + 1)
        }
        TokKind::Minus => {
            // Unary minus desugars to 0 - x
            let (expr, new_pos) = parse_primary(tokens, pos + 1)?;
            Ok((
                Expr::BinaryOp {
                    op: Op::Sub,
                    left: Box::new(Expr::Number(0.0)),
                    right: Box::new(expr),
                },
                new_pos,
            ))
        }
        _ => Err(ParseError::new(ParseErrorKind::UnexpectedToken, token.pos)),
    }
}

fn parse_function_args(tokens: &[Token], pos: usize) -> Result<(Vec<Expr>, usize), ParseError> {
    let mut args = Vec::new();
    let mut pos = pos;

    // Empty argument list: NAME()
    if let Some(Token { kind: TokKind::RParen, .. }) = tokens.get(pos) {
        return Ok((args, pos + 1));
    }

    loop {
        let (arg, new_pos) = parse_add_sub(tokens, pos)?;
        args.push(arg);
        pos = new_pos;

        match tokens.get(pos) {
            Some(Token { kind: TokKind::RParen, .. }) => return Ok((args, pos + 1)),
            Some(Token { kind: TokKind::Comma, .. }) => pos += 1,
            Some(other) => {
                return Err(ParseError::new(ParseErrorKind::UnexpectedToken, other.pos))
            }
            None => {
                let end = tokens.last().map(|t| t.pos + 1).unwrap_or(0);
                return Err(ParseError::new(ParseErrorKind::UnbalancedParens, end));
            }
        }
    }
}
