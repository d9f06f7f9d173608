// Formula parser - converts formula source into an expression tree.
// Supports: numbers, cell refs (A1), unary +/-, basic math (+, -, *, /),
// parentheses. The source is the text after the leading `=` marker.

use std::collections::BTreeSet;

use crate::address::Address;

/// Expression tree for one formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ref(Address),
    Neg(Box<Expr>),
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn symbol(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
        }
    }
}

impl Expr {
    /// All cell references in the tree, sorted and deduplicated.
    ///
    /// The order is stable (row-major) so graph bookkeeping and tests see
    /// the same list for the same formula every time.
    pub fn referenced_cells(&self) -> Vec<Address> {
        let mut refs = BTreeSet::new();
        self.collect_refs(&mut refs);
        refs.into_iter().collect()
    }

    fn collect_refs(&self, out: &mut BTreeSet<Address>) {
        match self {
            Expr::Number(_) => {}
            Expr::Ref(addr) => {
                out.insert(*addr);
            }
            Expr::Neg(operand) => operand.collect_refs(out),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_refs(out);
                right.collect_refs(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(_) | Expr::Ref(_) => 3,
            Expr::Neg(_) => 2,
            Expr::BinaryOp { op, .. } => op.precedence(),
        }
    }
}

/// Canonical rendering: minimal parentheses, no whitespace.
///
/// Re-parsing the rendered form reproduces the same tree, so a cell's
/// stored formula text is stable across edits.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Ref(addr) => write!(f, "{}", addr),
            Expr::Neg(operand) => {
                // Parenthesize anything that is not an atom: "-2*3" and
                // "-(2*3)" are different trees.
                if matches!(**operand, Expr::Number(_) | Expr::Ref(_)) {
                    write!(f, "-{}", operand)
                } else {
                    write!(f, "-({})", operand)
                }
            }
            Expr::BinaryOp { op, left, right } => {
                if left.precedence() < op.precedence() {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, "{}", op.symbol())?;
                let needs_parens = right.precedence() < op.precedence()
                    || (right.precedence() == op.precedence()
                        && matches!(op, Op::Sub | Op::Div));
                if needs_parens {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    CellRef(Address),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let n: f64 = literal
                    .parse()
                    .map_err(|_| format!("Invalid number literal: {}", literal))?;
                tokens.push(Token::Number(n));
            }
            'A'..='Z' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_uppercase() || chars[i].is_ascii_digit())
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let addr = Address::parse(&ident);
                if addr == Address::NONE {
                    return Err(format!("Invalid cell reference: {}", ident));
                }
                tokens.push(Token::CellRef(addr));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

/// Parse formula source (without the leading `=`) into an expression tree.
pub fn parse(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }
    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos != tokens.len() {
        return Err(format!("Unexpected token after expression at position {}", pos));
    }
    Ok(expr)
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;
    while pos < tokens.len() {
        let op = match tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, next) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = next;
    }
    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;
    while pos < tokens.len() {
        let op = match tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, next) = parse_unary(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = next;
    }
    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        // Unary plus is accepted and dropped from the tree.
        Some(Token::Plus) => parse_unary(tokens, pos + 1),
        Some(Token::Minus) => {
            let (operand, next) = parse_unary(tokens, pos + 1)?;
            Ok((Expr::Neg(Box::new(operand)), next))
        }
        _ => parse_primary(tokens, pos),
    }
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        None => Err("Unexpected end of expression".to_string()),
        Some(Token::Number(n)) => Ok((Expr::Number(*n), pos + 1)),
        Some(Token::CellRef(addr)) => Ok((Expr::Ref(*addr), pos + 1)),
        Some(Token::LParen) => {
            let (inner, next) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(next) {
                Some(Token::RParen) => Ok((inner, next + 1)),
                _ => Err("Missing closing parenthesis".to_string()),
            }
        }
        Some(tok) => Err(format!("Unexpected token: {:?}", tok)),
    }
}
