//! Function normalization and sampling for the whiteboard graph.
//!
//! Models write functions in loose notation (`sin(x)`, `X^2`, `2pi`). We rewrite
//! them into a small JavaScript-like syntax (`Math.sin(x)`, `x**2`, `2Math.PI`)
//! that the browser-side chart can display verbatim, and that `Expr` can parse
//! and evaluate here to produce the plotted points.
//!
//! Token rewriting works on whole identifiers only: `sin2` or `tangent` are left
//! alone, and anything already qualified as `Math.<name>` is never touched again,
//! so normalizing twice is the same as normalizing once.

use thiserror::Error;
use tracing::debug;

use crate::domain::Point;

/// Map a bare identifier (lowercased) onto its normalized spelling.
fn rewrite_identifier(lower: &str) -> Option<&'static str> {
  let out = match lower {
    "x" => "x",
    "sin" => "Math.sin",
    "cos" => "Math.cos",
    "tan" => "Math.tan",
    "asin" | "arcsin" => "Math.asin",
    "acos" | "arccos" => "Math.acos",
    "atan" | "arctan" => "Math.atan",
    "atan2" => "Math.atan2",
    "sinh" => "Math.sinh",
    "cosh" => "Math.cosh",
    "tanh" => "Math.tanh",
    "abs" => "Math.abs",
    "sqrt" => "Math.sqrt",
    "cbrt" => "Math.cbrt",
    "exp" => "Math.exp",
    "log" | "ln" => "Math.log",
    "log10" => "Math.log10",
    "log2" => "Math.log2",
    "floor" => "Math.floor",
    "ceil" => "Math.ceil",
    "round" => "Math.round",
    "sign" => "Math.sign",
    "pow" => "Math.pow",
    "min" => "Math.min",
    "max" => "Math.max",
    "pi" => "Math.PI",
    "e" => "Math.E",
    _ => return None,
  };
  Some(out)
}

fn is_ident_start(c: char) -> bool { c.is_ascii_alphabetic() || c == '_' }
fn is_ident_char(c: char) -> bool { c.is_ascii_alphanumeric() || c == '_' }

/// Length (in chars) of a numeric literal starting at `i`, including an exponent
/// suffix such as `e-3`. Returns 0 if no number starts there.
fn number_len(chars: &[char], i: usize) -> usize {
  let mut j = i;
  let mut seen_digit = false;
  while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
    seen_digit |= chars[j].is_ascii_digit();
    j += 1;
  }
  if !seen_digit {
    return 0;
  }
  if j < chars.len() && (chars[j] == 'e' || chars[j] == 'E') {
    let mut k = j + 1;
    if k < chars.len() && (chars[k] == '+' || chars[k] == '-') {
      k += 1;
    }
    if k < chars.len() && chars[k].is_ascii_digit() {
      while k < chars.len() && chars[k].is_ascii_digit() {
        k += 1;
      }
      j = k;
    }
  }
  j - i
}

/// Rewrite a model-supplied function string into evaluable notation.
pub fn normalize_function(expr: &str) -> String {
  let chars: Vec<char> = expr.chars().collect();
  let mut out = String::with_capacity(expr.len() + 16);
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];

    if c == '^' {
      out.push_str("**");
      i += 1;
      continue;
    }

    let num = number_len(&chars, i);
    if num > 0 {
      out.extend(&chars[i..i + num]);
      i += num;
      continue;
    }

    if is_ident_start(c) {
      let start = i;
      while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
      }
      let ident: String = chars[start..i].iter().collect();
      let qualified = start > 0 && chars[start - 1] == '.';
      match rewrite_identifier(&ident.to_ascii_lowercase()) {
        Some(rewritten) if !qualified => out.push_str(rewritten),
        _ => out.push_str(&ident),
      }
      continue;
    }

    out.push(c);
    i += 1;
  }

  out
}

/// Sample `expr` at `resolution + 1` evenly spaced points across `domain`
/// (both ends included). Samples that evaluate to NaN or infinity are dropped.
///
/// An empty or inverted domain, a zero resolution, or an expression that does
/// not parse all yield no points rather than an error.
pub fn sample_points(expr: &str, domain: [f64; 2], resolution: usize) -> Vec<Point> {
  let normalized = normalize_function(expr);
  match Expr::parse(&normalized) {
    Ok(compiled) => compiled.sample(domain, resolution),
    Err(e) => {
      debug!(target: "tutor", expr = %normalized, error = %e, "Function did not parse; no points sampled");
      Vec::new()
    }
  }
}

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
  #[error("unexpected character '{0}' at offset {1}")]
  UnexpectedChar(char, usize),
  #[error("unexpected end of expression")]
  UnexpectedEnd,
  #[error("unexpected token {0}")]
  UnexpectedToken(String),
  #[error("unknown identifier '{0}'")]
  UnknownIdentifier(String),
  #[error("Math.{name} expects {expected} argument(s), got {found}")]
  Arity { name: String, expected: &'static str, found: usize },
  #[error("expression is longer than {MAX_EXPR_LEN} bytes")]
  TooLong,
  #[error("expression nests deeper than {MAX_DEPTH} levels")]
  TooDeep,
}

/// Longest normalized expression `Expr::parse` accepts. Also bounds the depth
/// of left-leaning chains like `x+x+x+...`, which `eval` walks recursively.
pub const MAX_EXPR_LEN: usize = 2048;

/// Deepest nesting of parentheses, calls, signs and exponents.
pub const MAX_DEPTH: usize = 128;

#[derive(Clone, Debug, PartialEq)]
enum Token {
  Num(f64),
  Ident(String),
  Dot,
  Plus,
  Minus,
  Star,
  StarStar,
  Slash,
  Percent,
  LParen,
  RParen,
  Comma,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
  let chars: Vec<char> = src.chars().collect();
  let mut tokens = Vec::new();
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    if c.is_whitespace() {
      i += 1;
      continue;
    }

    let num = number_len(&chars, i);
    if num > 0 {
      let text: String = chars[i..i + num].iter().collect();
      let value = text.parse::<f64>().map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
      tokens.push(Token::Num(value));
      i += num;
      continue;
    }

    if is_ident_start(c) {
      let start = i;
      while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
      }
      tokens.push(Token::Ident(chars[start..i].iter().collect()));
      continue;
    }

    let tok = match c {
      '.' => Token::Dot,
      '+' => Token::Plus,
      '-' | '\u{2212}' => Token::Minus,
      '*' if chars.get(i + 1) == Some(&'*') => {
        i += 1;
        Token::StarStar
      }
      '*' | '\u{00D7}' => Token::Star,
      '/' => Token::Slash,
      '%' => Token::Percent,
      '(' => Token::LParen,
      ')' => Token::RParen,
      ',' => Token::Comma,
      other => return Err(ExprError::UnexpectedChar(other, i)),
    };
    tokens.push(tok);
    i += 1;
  }

  Ok(tokens)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Pow,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Func {
  Sin, Cos, Tan, Asin, Acos, Atan, Atan2,
  Sinh, Cosh, Tanh,
  Abs, Sqrt, Cbrt, Exp, Log, Log10, Log2,
  Floor, Ceil, Round, Sign,
  Pow, Min, Max,
}

impl Func {
  fn lookup(name: &str) -> Option<Func> {
    let f = match name {
      "sin" => Func::Sin,
      "cos" => Func::Cos,
      "tan" => Func::Tan,
      "asin" => Func::Asin,
      "acos" => Func::Acos,
      "atan" => Func::Atan,
      "atan2" => Func::Atan2,
      "sinh" => Func::Sinh,
      "cosh" => Func::Cosh,
      "tanh" => Func::Tanh,
      "abs" => Func::Abs,
      "sqrt" => Func::Sqrt,
      "cbrt" => Func::Cbrt,
      "exp" => Func::Exp,
      "log" => Func::Log,
      "log10" => Func::Log10,
      "log2" => Func::Log2,
      "floor" => Func::Floor,
      "ceil" => Func::Ceil,
      "round" => Func::Round,
      "sign" => Func::Sign,
      "pow" => Func::Pow,
      "min" => Func::Min,
      "max" => Func::Max,
      _ => return None,
    };
    Some(f)
  }

  fn arity_ok(self, n: usize) -> Result<(), &'static str> {
    match self {
      Func::Atan2 | Func::Pow => if n == 2 { Ok(()) } else { Err("2") },
      Func::Min | Func::Max => if n >= 1 { Ok(()) } else { Err("at least 1") },
      _ => if n == 1 { Ok(()) } else { Err("1") },
    }
  }

  fn apply(self, args: &[f64]) -> f64 {
    let a = args.first().copied().unwrap_or(f64::NAN);
    match self {
      Func::Sin => a.sin(),
      Func::Cos => a.cos(),
      Func::Tan => a.tan(),
      Func::Asin => a.asin(),
      Func::Acos => a.acos(),
      Func::Atan => a.atan(),
      Func::Atan2 => a.atan2(args.get(1).copied().unwrap_or(f64::NAN)),
      Func::Sinh => a.sinh(),
      Func::Cosh => a.cosh(),
      Func::Tanh => a.tanh(),
      Func::Abs => a.abs(),
      Func::Sqrt => a.sqrt(),
      Func::Cbrt => a.cbrt(),
      Func::Exp => a.exp(),
      Func::Log => a.ln(),
      Func::Log10 => a.log10(),
      Func::Log2 => a.log2(),
      Func::Floor => a.floor(),
      Func::Ceil => a.ceil(),
      // JS rounds halves towards +inf
      Func::Round => (a + 0.5).floor(),
      Func::Sign => if a == 0.0 || a.is_nan() { a } else { a.signum() },
      Func::Pow => a.powf(args.get(1).copied().unwrap_or(f64::NAN)),
      Func::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
      Func::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
  }
}

fn lookup_constant(name: &str) -> Option<f64> {
  use std::f64::consts;
  let v = match name {
    "PI" => consts::PI,
    "E" => consts::E,
    "SQRT2" => consts::SQRT_2,
    "SQRT1_2" => consts::FRAC_1_SQRT_2,
    "LN2" => consts::LN_2,
    "LN10" => consts::LN_10,
    "LOG2E" => consts::LOG2_E,
    "LOG10E" => consts::LOG10_E,
    _ => return None,
  };
  Some(v)
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
  Num(f64),
  Var,
  Neg(Box<Node>),
  Bin(BinOp, Box<Node>, Box<Node>),
  Call(Func, Vec<Node>),
}

impl Node {
  fn eval(&self, x: f64) -> f64 {
    match self {
      Node::Num(v) => *v,
      Node::Var => x,
      Node::Neg(e) => -e.eval(x),
      Node::Bin(op, l, r) => {
        let (a, b) = (l.eval(x), r.eval(x));
        match op {
          BinOp::Add => a + b,
          BinOp::Sub => a - b,
          BinOp::Mul => a * b,
          BinOp::Div => a / b,
          BinOp::Rem => a % b,
          BinOp::Pow => a.powf(b),
        }
      }
      Node::Call(f, args) => {
        let values: Vec<f64> = args.iter().map(|a| a.eval(x)).collect();
        f.apply(&values)
      }
    }
  }
}

/// A parsed single-variable expression over `x`.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr(Node);

impl Expr {
  /// Parse normalized notation (see `normalize_function`).
  pub fn parse(src: &str) -> Result<Expr, ExprError> {
    if src.len() > MAX_EXPR_LEN {
      return Err(ExprError::TooLong);
    }
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let root = parser.additive()?;
    match parser.peek() {
      None => Ok(Expr(root)),
      Some(tok) => Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
    }
  }

  pub fn eval(&self, x: f64) -> f64 { self.0.eval(x) }

  /// Evaluate at `resolution + 1` evenly spaced points across `domain`, keeping
  /// only finite results.
  pub fn sample(&self, domain: [f64; 2], resolution: usize) -> Vec<Point> {
    let [start, end] = domain;
    if resolution == 0 || !start.is_finite() || !end.is_finite() || start >= end {
      return Vec::new();
    }
    let span = end - start;
    (0..=resolution)
      .filter_map(|i| {
        let x = start + span * i as f64 / resolution as f64;
        let y = self.eval(x);
        y.is_finite().then_some(Point { x, y })
      })
      .collect()
  }
}

struct Parser {
  tokens: Vec<Token>,
  pos: usize,
  depth: usize,
}

impl Parser {
  fn peek(&self) -> Option<&Token> { self.tokens.get(self.pos) }

  fn next(&mut self) -> Option<Token> {
    let tok = self.tokens.get(self.pos).cloned();
    self.pos += 1;
    tok
  }

  fn expect(&mut self, want: Token) -> Result<(), ExprError> {
    match self.next() {
      Some(tok) if tok == want => Ok(()),
      Some(tok) => Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
      None => Err(ExprError::UnexpectedEnd),
    }
  }

  fn additive(&mut self) -> Result<Node, ExprError> {
    let mut lhs = self.multiplicative()?;
    loop {
      let op = match self.peek() {
        Some(Token::Plus) => BinOp::Add,
        Some(Token::Minus) => BinOp::Sub,
        _ => return Ok(lhs),
      };
      self.pos += 1;
      let rhs = self.multiplicative()?;
      lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
    }
  }

  fn multiplicative(&mut self) -> Result<Node, ExprError> {
    let mut lhs = self.unary()?;
    loop {
      let (op, rhs) = match self.peek() {
        Some(Token::Star) => { self.pos += 1; (BinOp::Mul, self.unary()?) }
        Some(Token::Slash) => { self.pos += 1; (BinOp::Div, self.unary()?) }
        Some(Token::Percent) => { self.pos += 1; (BinOp::Rem, self.unary()?) }
        // implicit multiplication: 2x, 3(x+1), (x)(x-1)
        Some(Token::Num(_)) | Some(Token::Ident(_)) | Some(Token::LParen) => (BinOp::Mul, self.power()?),
        _ => return Ok(lhs),
      };
      lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
    }
  }

  /// Every nested sub-expression passes through here, so this is where depth is bounded.
  fn unary(&mut self) -> Result<Node, ExprError> {
    if self.depth >= MAX_DEPTH {
      return Err(ExprError::TooDeep);
    }
    self.depth += 1;
    let node = self.signed();
    self.depth -= 1;
    node
  }

  fn signed(&mut self) -> Result<Node, ExprError> {
    match self.peek() {
      Some(Token::Minus) => {
        self.pos += 1;
        Ok(Node::Neg(Box::new(self.unary()?)))
      }
      Some(Token::Plus) => {
        self.pos += 1;
        self.unary()
      }
      _ => self.power(),
    }
  }

  fn power(&mut self) -> Result<Node, ExprError> {
    let base = self.primary()?;
    if self.peek() == Some(&Token::StarStar) {
      self.pos += 1;
      let exponent = self.unary()?;
      return Ok(Node::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
    }
    Ok(base)
  }

  fn primary(&mut self) -> Result<Node, ExprError> {
    match self.next() {
      Some(Token::Num(v)) => Ok(Node::Num(v)),
      Some(Token::LParen) => {
        let inner = self.additive()?;
        self.expect(Token::RParen)?;
        Ok(inner)
      }
      Some(Token::Ident(name)) if name == "x" => Ok(Node::Var),
      Some(Token::Ident(name)) if name == "Math" => {
        self.expect(Token::Dot)?;
        let member = match self.next() {
          Some(Token::Ident(m)) => m,
          Some(tok) => return Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
          None => return Err(ExprError::UnexpectedEnd),
        };
        if self.peek() == Some(&Token::LParen) {
          let func = Func::lookup(&member)
            .ok_or_else(|| ExprError::UnknownIdentifier(format!("Math.{member}")))?;
          let args = self.call_args()?;
          func.arity_ok(args.len()).map_err(|expected| ExprError::Arity {
            name: member.clone(),
            expected,
            found: args.len(),
          })?;
          Ok(Node::Call(func, args))
        } else {
          lookup_constant(&member)
            .map(Node::Num)
            .ok_or_else(|| ExprError::UnknownIdentifier(format!("Math.{member}")))
        }
      }
      Some(Token::Ident(name)) => Err(ExprError::UnknownIdentifier(name)),
      Some(tok) => Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
      None => Err(ExprError::UnexpectedEnd),
    }
  }

  fn call_args(&mut self) -> Result<Vec<Node>, ExprError> {
    self.expect(Token::LParen)?;
    let mut args = Vec::new();
    if self.peek() == Some(&Token::RParen) {
      self.pos += 1;
      return Ok(args);
    }
    loop {
      args.push(self.additive()?);
      match self.next() {
        Some(Token::Comma) => continue,
        Some(Token::RParen) => return Ok(args),
        Some(tok) => return Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
        None => return Err(ExprError::UnexpectedEnd),
      }
    }
  }
}
