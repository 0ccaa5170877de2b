//! Selection and weight expressions over event-table columns.
//!
//! Supports arithmetic (`+ - * / %`), comparisons (`== != < <= > >=`),
//! boolean operators (`&& || !`), `true`/`false`, and the functions
//! `abs`/`fabs`, `sqrt`, `log`, `exp`, `pow`, `min`, `max` together with their
//! `TMath::` spellings (`TMath::Abs`, `TMath::Power`, ...).
//!
//! A row passes a selection when the selection evaluates to a value `> 0`.
//! Several expressions are compiled into one [`ExprSet`] sharing a single
//! column registry, so a file is scanned once for a selection and any number
//! of weights.

use crate::error::{NtupleError, Result};

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    Column(usize), // index into the owning registry
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        let f = match name {
            "abs" | "fabs" | "TMath::Abs" => Func::Abs,
            "sqrt" | "TMath::Sqrt" => Func::Sqrt,
            "log" | "TMath::Log" => Func::Log,
            "exp" | "TMath::Exp" => Func::Exp,
            "pow" | "TMath::Power" => Func::Pow,
            "min" | "TMath::Min" => Func::Min,
            "max" | "TMath::Max" => Func::Max,
            _ => return None,
        };
        Some(f)
    }

    fn arity(self) -> usize {
        match self {
            Func::Abs | Func::Sqrt | Func::Log | Func::Exp => 1,
            Func::Pow | Func::Min | Func::Max => 2,
        }
    }
}

#[inline]
fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

#[inline]
fn passes(v: f64) -> bool {
    v > 0.0
}

fn eval(node: &Node, row: &[f64]) -> f64 {
    match node {
        Node::Const(v) => *v,
        Node::Column(i) => row[*i],
        Node::Neg(a) => -eval(a, row),
        Node::Not(a) => truth(!passes(eval(a, row))),
        Node::Binary(Op::And, a, b) => truth(passes(eval(a, row)) && passes(eval(b, row))),
        Node::Binary(Op::Or, a, b) => truth(passes(eval(a, row)) || passes(eval(b, row))),
        Node::Binary(op, a, b) => {
            let (l, r) = (eval(a, row), eval(b, row));
            match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
                Op::Rem => l % r,
                Op::Eq => truth(l == r),
                Op::Ne => truth(l != r),
                Op::Lt => truth(l < r),
                Op::Le => truth(l <= r),
                Op::Gt => truth(l > r),
                Op::Ge => truth(l >= r),
                Op::And | Op::Or => unreachable!("short-circuit operators handled above"),
            }
        }
        Node::Call(f, args) => {
            let x = eval(&args[0], row);
            match f {
                Func::Abs => x.abs(),
                Func::Sqrt => x.sqrt(),
                Func::Log => x.ln(),
                Func::Exp => x.exp(),
                Func::Pow => x.powf(eval(&args[1], row)),
                Func::Min => x.min(eval(&args[1], row)),
                Func::Max => x.max(eval(&args[1], row)),
            }
        }
    }
}

// ── Single expression ─────────────────────────────────────────

/// One compiled expression with its own column list.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    node: Node,
    /// Column names referenced by the expression, in order of first use.
    pub required_columns: Vec<String>,
}

impl CompiledExpr {
    /// Parse and compile `input`.
    pub fn compile(input: &str) -> Result<Self> {
        let mut registry = Vec::new();
        let node = parse(input, &mut registry)?;
        Ok(Self { node, required_columns: registry })
    }

    /// Evaluate for one row; `row` follows `required_columns`.
    pub fn eval_row(&self, row: &[f64]) -> f64 {
        eval(&self.node, row)
    }
}

// ── Expression set ────────────────────────────────────────────

/// A selection plus named weights compiled against one column registry.
#[derive(Debug, Clone)]
pub struct ExprSet {
    columns: Vec<String>,
    selection: Option<Node>,
    weights: Vec<(String, Node)>,
}

impl ExprSet {
    /// Compile `selection` (empty ⇒ every row passes) and every weight.
    pub fn compile<'a, I>(selection: &str, weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut columns = Vec::new();
        let selection = if selection.trim().is_empty() {
            None
        } else {
            Some(parse(selection, &mut columns).map_err(|e| context("selection", e))?)
        };
        let mut compiled = Vec::new();
        for (name, expr) in weights {
            let node = parse(expr, &mut columns).map_err(|e| context(name, e))?;
            compiled.push((name.clone(), node));
        }
        Ok(Self { columns, selection, weights: compiled })
    }

    /// Columns read by any of the expressions, in registry order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Weight names, in compilation order.
    pub fn weight_names(&self) -> impl Iterator<Item = &str> {
        self.weights.iter().map(|(name, _)| name.as_str())
    }

    /// Number of weights.
    pub fn n_weights(&self) -> usize {
        self.weights.len()
    }

    /// Add the weights of every selected row to `sums`.
    ///
    /// `columns` follows [`ExprSet::columns`] and each slice holds at least
    /// `n_rows` values; `sums` has one slot per weight. Returns the number of
    /// selected rows.
    pub fn accumulate(&self, columns: &[&[f64]], n_rows: usize, sums: &mut [f64]) -> u64 {
        debug_assert_eq!(columns.len(), self.columns.len());
        debug_assert_eq!(sums.len(), self.weights.len());

        let mut row = vec![0.0f64; columns.len()];
        let mut selected = 0u64;
        for i in 0..n_rows {
            for (slot, col) in row.iter_mut().zip(columns) {
                *slot = col[i];
            }
            if let Some(sel) = &self.selection
                && !passes(eval(sel, &row))
            {
                continue;
            }
            selected += 1;
            for (sum, (_, w)) in sums.iter_mut().zip(&self.weights) {
                *sum += eval(w, &row);
            }
        }
        selected
    }
}

fn context(what: &str, err: NtupleError) -> NtupleError {
    match err {
        NtupleError::Expression(msg) => NtupleError::Expression(format!("{what}: {msg}")),
        other => other,
    }
}

/// Compile `input` on its own and return the columns it reads.
pub fn referenced_columns(input: &str) -> Result<Vec<String>> {
    Ok(CompiledExpr::compile(input)?.required_columns)
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(Op),
    Minus,
    Bang,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let pair = bytes.get(i..i + 2);
        let two = match pair {
            Some(b"&&") => Some(Token::Op(Op::And)),
            Some(b"||") => Some(Token::Op(Op::Or)),
            Some(b"==") => Some(Token::Op(Op::Eq)),
            Some(b"!=") => Some(Token::Op(Op::Ne)),
            Some(b"<=") => Some(Token::Op(Op::Le)),
            Some(b">=") => Some(Token::Op(Op::Ge)),
            _ => None,
        };
        if let Some(tok) = two {
            tokens.push(tok);
            i += 2;
            continue;
        }

        let one = match c {
            b'+' => Some(Token::Op(Op::Add)),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Op(Op::Mul)),
            b'/' => Some(Token::Op(Op::Div)),
            b'%' => Some(Token::Op(Op::Rem)),
            b'<' => Some(Token::Op(Op::Lt)),
            b'>' => Some(Token::Op(Op::Gt)),
            b'!' => Some(Token::Bang),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(tok) = one {
            tokens.push(tok);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            let start = i;
            while i < bytes.len() {
                let d = bytes[i];
                let exp_sign = (d == b'+' || d == b'-') && matches!(bytes[i - 1], b'e' | b'E');
                if d.is_ascii_digit() || d == b'.' || d == b'e' || d == b'E' || exp_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            let text = &input[start..i];
            let value = text
                .parse::<f64>()
                .map_err(|_| NtupleError::Expression(format!("invalid number '{text}'")))?;
            tokens.push(Token::Num(value));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            loop {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                // namespaced function names (TMath::Abs)
                if bytes.get(i..i + 2) == Some(&b"::"[..])
                    && bytes.get(i + 2).is_some_and(|b| b.is_ascii_alphabetic())
                {
                    i += 2;
                    continue;
                }
                break;
            }
            tokens.push(Token::Ident(input[start..i].to_string()));
            continue;
        }

        let ch = input[i..].chars().next().unwrap_or('?');
        return Err(NtupleError::Expression(format!("unexpected character '{ch}' at offset {i}")));
    }

    Ok(tokens)
}

// ── Parser (precedence climbing) ───────────────────────────────

fn parse(input: &str, registry: &mut Vec<String>) -> Result<Node> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(NtupleError::Expression("empty expression".into()));
    }
    let mut parser = Parser { tokens: &tokens, pos: 0, registry };
    let node = parser.expr(0)?;
    if let Some(tok) = parser.peek() {
        return Err(NtupleError::Expression(format!(
            "unexpected token {tok:?} in '{}'",
            input.trim()
        )));
    }
    Ok(node)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    registry: &'a mut Vec<String>,
}

/// Binding power of a binary operator token (higher binds tighter).
fn binding_power(tok: &Token) -> Option<(Op, u8)> {
    let op = match tok {
        Token::Op(op) => *op,
        Token::Minus => Op::Sub,
        _ => return None,
    };
    let bp = match op {
        Op::Or => 1,
        Op::And => 2,
        Op::Eq | Op::Ne => 3,
        Op::Lt | Op::Le | Op::Gt | Op::Ge => 4,
        Op::Add | Op::Sub => 5,
        Op::Mul | Op::Div | Op::Rem => 6,
    };
    Some((op, bp))
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            other => {
                Err(NtupleError::Expression(format!("expected {expected:?}, got {other:?}")))
            }
        }
    }

    fn column(&mut self, name: String) -> usize {
        match self.registry.iter().position(|c| *c == name) {
            Some(i) => i,
            None => {
                self.registry.push(name);
                self.registry.len() - 1
            }
        }
    }

    fn expr(&mut self, min_bp: u8) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some((op, bp)) = self.peek().and_then(binding_power) {
            if bp <= min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(bp)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Node::Not(Box::new(self.unary()?)))
            }
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<Node> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Node::Const(v)),
            Some(Token::LParen) => {
                let inner = self.expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if matches!(self.peek(), Some(Token::LParen)) => {
                self.pos += 1;
                self.call(&name)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Node::Const(1.0)),
                "false" => Ok(Node::Const(0.0)),
                _ => Ok(Node::Column(self.column(name))),
            },
            other => Err(NtupleError::Expression(format!(
                "expected number, column or '(', got {other:?}"
            ))),
        }
    }

    fn call(&mut self, name: &str) -> Result<Node> {
        let func = Func::lookup(name)
            .ok_or_else(|| NtupleError::Expression(format!("unknown function '{name}'")))?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            args.push(self.expr(0)?);
            while matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
                args.push(self.expr(0)?);
            }
        }
        self.expect(Token::RParen)?;
        if args.len() != func.arity() {
            return Err(NtupleError::Expression(format!(
                "function '{name}' takes {} argument(s), got {}",
                func.arity(),
                args.len()
            )));
        }
        Ok(Node::Call(func, args))
    }
}

// ── Tests ──────────────────────────────────────────────────────
