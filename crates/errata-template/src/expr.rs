//! The expression language used inside `{{ ... }}` and `{% if ... %}`.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := not_expr ("and" not_expr)*
//! not_expr   := "not" not_expr | comparison
//! comparison := postfix [ ("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not" "in") postfix
//!                       | "is" ["not"] ("defined" | "undefined" | "none") ]
//! postfix    := primary ("|" IDENT ["(" [or_expr ("," or_expr)*] ")"])*
//! primary    := literal | path | "(" or_expr ")"
//! path       := IDENT ("." (IDENT | INT) | "[" (STRING | INT) "]")*
//! ```
//!
//! Values are `serde_json::Value`s looked up in a [`Namespace`] of named roots
//! (`ERRATUM`, `ENVIRONMENT`). Referencing a path that does not exist is an
//! error everywhere except under `is defined` and the `default` filter.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;

use crate::error::ExprErrorKind;

/// Named roots an expression can reference.
pub type Namespace = serde_json::Map<String, Value>;

type Result<T> = std::result::Result<T, ExprErrorKind>;

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Defined,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// First segment is always the root name.
    Path(Vec<Segment>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Test {
        expr: Box<Expr>,
        test: TestKind,
        negated: bool,
    },
    Filter {
        expr: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
}

/// Render a path back to its dotted source form.
pub fn path_to_string(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        match seg {
            Segment::Key(k) if i == 0 => out.push_str(k),
            Segment::Key(k) => {
                out.push('.');
                out.push_str(k);
            }
            Segment::Index(n) => {
                out.push('[');
                out.push_str(&n.to_string());
                out.push(']');
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Pipe,
    Cmp(CmpOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Dot => f.write_str("'.'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Pipe => f.write_str("'|'"),
            Token::Cmp(op) => write!(f, "'{:?}'", op),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < len {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += 2;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    ('>', true) => CmpOp::Ge,
                    _ => CmpOp::Gt,
                };
                tokens.push(Token::Cmp(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '\'' | '"' => {
                let (s, end) = lex_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = end;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let after_dot = tokens.last() == Some(&Token::Dot);
                let (tok, end) = lex_number(&chars, i, after_dot)?;
                tokens.push(tok);
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '=' => {
                return Err(ExprErrorKind::Syntax(
                    "unexpected '=' (use '==' to compare)".into(),
                ));
            }
            '!' => {
                return Err(ExprErrorKind::Syntax(
                    "unexpected '!' (use 'not' to negate)".into(),
                ));
            }
            other => {
                return Err(ExprErrorKind::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }
    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ExprErrorKind::Syntax("unterminated string literal".into()))
}

fn lex_number(chars: &[char], start: usize, after_dot: bool) -> Result<(Token, usize)> {
    let mut i = start + 1;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let is_float = !after_dot
        && i + 1 < chars.len()
        && chars[i] == '.'
        && chars[i + 1].is_ascii_digit();
    if is_float {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let text: String = chars[start..i].iter().collect();
    let tok = if is_float {
        Token::Float(
            text.parse()
                .map_err(|_| ExprErrorKind::Syntax(format!("invalid number '{}'", text)))?,
        )
    } else {
        Token::Int(
            text.parse()
                .map_err(|_| ExprErrorKind::Syntax(format!("invalid number '{}'", text)))?,
        )
    };
    Ok((tok, i))
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "is"];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn is_keyword_at(&self, offset: usize, kw: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Ident(s)) if s == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword_at(0, kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(ref tok) if *tok == expected => Ok(()),
            Some(tok) => Err(ExprErrorKind::Syntax(format!(
                "expected {}, found {}",
                expected, tok
            ))),
            None => Err(ExprErrorKind::Syntax(format!(
                "expected {}, found end of expression",
                expected
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_postfix()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.parse_postfix()?;
            return Ok(Expr::Compare(Box::new(lhs), op, Box::new(rhs)));
        }
        if self.eat_keyword("in") {
            let rhs = self.parse_postfix()?;
            return Ok(Expr::Compare(Box::new(lhs), CmpOp::In, Box::new(rhs)));
        }
        if self.is_keyword_at(0, "not") && self.is_keyword_at(1, "in") {
            self.pos += 2;
            let rhs = self.parse_postfix()?;
            return Ok(Expr::Compare(Box::new(lhs), CmpOp::NotIn, Box::new(rhs)));
        }
        if self.eat_keyword("is") {
            let mut negated = self.eat_keyword("not");
            let test = match self.advance() {
                Some(Token::Ident(ref s)) if s == "defined" => TestKind::Defined,
                Some(Token::Ident(ref s)) if s == "undefined" => {
                    negated = !negated;
                    TestKind::Defined
                }
                Some(Token::Ident(ref s)) if s.eq_ignore_ascii_case("none") => TestKind::None,
                Some(tok) => {
                    return Err(ExprErrorKind::Syntax(format!("unknown test {}", tok)));
                }
                None => {
                    return Err(ExprErrorKind::Syntax("expected a test after 'is'".into()));
                }
            };
            return Ok(Expr::Test {
                expr: Box::new(lhs),
                test,
                negated,
            });
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            let name = match self.advance() {
                Some(Token::Ident(name)) => name,
                _ => return Err(ExprErrorKind::Syntax("expected filter name after '|'".into())),
            };
            let mut args = Vec::new();
            if self.peek() == Some(&Token::LParen) {
                self.pos += 1;
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen)?;
            }
            expr = Expr::Filter {
                expr: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(e)
            }
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Float(n)) => Ok(Expr::Literal(Value::from(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "none" | "None" | "null" => Ok(Expr::Literal(Value::Null)),
                kw if KEYWORDS.contains(&kw) => Err(ExprErrorKind::Syntax(format!(
                    "unexpected keyword '{}'",
                    kw
                ))),
                _ => self.parse_path(name),
            },
            Some(tok) => Err(ExprErrorKind::Syntax(format!("unexpected {}", tok))),
            None => Err(ExprErrorKind::Syntax("unexpected end of expression".into())),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr> {
        let mut segments = vec![Segment::Key(root)];
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Token::Ident(k)) => segments.push(Segment::Key(k)),
                        Some(Token::Int(n)) if n >= 0 => segments.push(Segment::Index(n as usize)),
                        _ => {
                            return Err(ExprErrorKind::Syntax(
                                "expected attribute name after '.'".into(),
                            ));
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Token::Str(k)) => segments.push(Segment::Key(k)),
                        Some(Token::Int(n)) if n >= 0 => segments.push(Segment::Index(n as usize)),
                        _ => {
                            return Err(ExprErrorKind::Syntax(
                                "expected string or index inside '[]'".into(),
                            ));
                        }
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => break,
            }
        }
        Ok(Expr::Path(segments))
    }
}

/// Parse an expression string.
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprErrorKind::Syntax("empty expression".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(ExprErrorKind::Syntax(format!("unexpected {}", tok)));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Result of evaluating a sub-expression: a value, or a reference to a
/// path that does not exist.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Defined(Value),
    Undefined(String),
}

impl Operand {
    fn require(self) -> Result<Value> {
        match self {
            Operand::Defined(v) => Ok(v),
            Operand::Undefined(path) => Err(ExprErrorKind::UndefinedVariable(path)),
        }
    }
}

impl Expr {
    /// Evaluate to a value. Undefined paths are an error.
    pub fn eval(&self, ns: &Namespace) -> Result<Value> {
        self.operand(ns)?.require()
    }

    /// Evaluate as a condition.
    pub fn is_true(&self, ns: &Namespace) -> Result<bool> {
        Ok(truthy(&self.eval(ns)?))
    }

    /// Collect every path this expression references.
    pub fn collect_paths(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path(segments) => {
                out.insert(path_to_string(segments));
            }
            Expr::Not(e) => e.collect_paths(out),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Compare(a, _, b) => {
                a.collect_paths(out);
                b.collect_paths(out);
            }
            Expr::Test { expr, .. } => expr.collect_paths(out),
            Expr::Filter { expr, args, .. } => {
                expr.collect_paths(out);
                for a in args {
                    a.collect_paths(out);
                }
            }
        }
    }

    fn operand(&self, ns: &Namespace) -> Result<Operand> {
        match self {
            Expr::Literal(v) => Ok(Operand::Defined(v.clone())),
            Expr::Path(segments) => Ok(lookup(ns, segments)),
            Expr::Not(e) => Ok(Operand::Defined(Value::Bool(!e.is_true(ns)?))),
            Expr::And(a, b) => {
                let result = a.is_true(ns)? && b.is_true(ns)?;
                Ok(Operand::Defined(Value::Bool(result)))
            }
            Expr::Or(a, b) => {
                let result = a.is_true(ns)? || b.is_true(ns)?;
                Ok(Operand::Defined(Value::Bool(result)))
            }
            Expr::Compare(a, op, b) => {
                let lhs = a.eval(ns)?;
                let rhs = b.eval(ns)?;
                Ok(Operand::Defined(Value::Bool(compare(&lhs, *op, &rhs)?)))
            }
            Expr::Test {
                expr,
                test,
                negated,
            } => {
                let operand = expr.operand(ns)?;
                let passed = match test {
                    TestKind::Defined => matches!(operand, Operand::Defined(_)),
                    TestKind::None => operand.require()?.is_null(),
                };
                Ok(Operand::Defined(Value::Bool(passed != *negated)))
            }
            Expr::Filter { expr, name, args } => apply_filter(expr.operand(ns)?, name, args, ns),
        }
    }
}

fn lookup(ns: &Namespace, segments: &[Segment]) -> Operand {
    let undefined = || Operand::Undefined(path_to_string(segments));
    let root = match segments.first() {
        Some(Segment::Key(k)) => k,
        _ => return undefined(),
    };
    let mut current = match ns.get(root) {
        Some(v) => v,
        None => return undefined(),
    };
    for seg in &segments[1..] {
        let next = match (seg, current) {
            (Segment::Key(k), Value::Object(map)) => map.get(k),
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return undefined(),
        }
    }
    Operand::Defined(current.clone())
}

/// Truthiness: null, false, 0, "" and empty collections are false.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Text form of a value as it appears in rendered output.
pub fn to_display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Numeric view of a value. Strings holding numbers count, since environment
/// variables are always strings.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    let numeric = matches!(a, Value::Number(_)) || matches!(b, Value::Number(_));
    if numeric {
        if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
            return x == y;
        }
    }
    a == b
}

fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> Result<bool> {
    match op {
        CmpOp::Eq => Ok(loose_eq(lhs, rhs)),
        CmpOp::Ne => Ok(!loose_eq(lhs, rhs)),
        CmpOp::In => contains(rhs, lhs),
        CmpOp::NotIn => Ok(!contains(rhs, lhs)?),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => match (as_number(lhs), as_number(rhs)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| {
                        ExprErrorKind::Type("cannot order NaN".into())
                    })?,
                    _ => {
                        return Err(ExprErrorKind::Type(format!(
                            "cannot order {} and {}",
                            type_name(lhs),
                            type_name(rhs)
                        )));
                    }
                },
            };
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        Value::String(s) => Ok(s.contains(&to_display(needle))),
        Value::Object(map) => Ok(map.contains_key(&to_display(needle))),
        other => Err(ExprErrorKind::Type(format!(
            "'in' needs a list, string or mapping, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "none",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

fn apply_filter(input: Operand, name: &str, args: &[Expr], ns: &Namespace) -> Result<Operand> {
    if name == "default" {
        return match input {
            Operand::Defined(v) if !v.is_null() => Ok(Operand::Defined(v)),
            _ => match args.first() {
                Some(fallback) => fallback.operand(ns),
                None => Ok(Operand::Defined(Value::String(String::new()))),
            },
        };
    }
    let value = input.require()?;
    let out = match name {
        "lower" => Value::String(to_display(&value).to_lowercase()),
        "upper" => Value::String(to_display(&value).to_uppercase()),
        "trim" => Value::String(to_display(&value).trim().to_string()),
        "string" => Value::String(to_display(&value)),
        "length" => {
            let n = match value {
                Value::String(ref s) => s.chars().count(),
                Value::Array(ref a) => a.len(),
                Value::Object(ref o) => o.len(),
                ref other => {
                    return Err(ExprErrorKind::Type(format!(
                        "length of {} is undefined",
                        type_name(other)
                    )));
                }
            };
            Value::from(n)
        }
        "join" => {
            let sep = match args.first() {
                Some(e) => to_display(&e.eval(ns)?),
                None => String::new(),
            };
            match value {
                Value::Array(ref items) => Value::String(
                    items.iter().map(to_display).collect::<Vec<_>>().join(&sep),
                ),
                other => Value::String(to_display(&other)),
            }
        }
        other => return Err(ExprErrorKind::UnknownFilter(other.to_string())),
    };
    Ok(Operand::Defined(out))
}
