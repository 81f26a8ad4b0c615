//! Template text rendering: `{{ expr }}`, `{% if %}` blocks and `{# #}` comments.
//!
//! A `-` just inside a delimiter (`{{-`, `-%}`) trims whitespace on that side.

use std::collections::BTreeSet;

use crate::error::{ExprErrorKind, ExpressionError};
use crate::expr::{self, Expr, Namespace};

type Result<T> = std::result::Result<T, ExprErrorKind>;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn compile(src: &str) -> Result<Self> {
        let mut pieces = split(src)?.into_iter();
        let (nodes, _) = parse_block(&mut pieces, false)?;
        Ok(Self { nodes })
    }

    pub fn render(&self, ns: &Namespace) -> Result<String> {
        let mut out = String::new();
        render_nodes(&self.nodes, ns, &mut out)?;
        Ok(out)
    }

    /// Every variable path referenced anywhere in the template, including
    /// branches that a given context would not take.
    pub fn referenced_paths(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        collect_nodes(&self.nodes, &mut out);
        out
    }
}

/// Render a template string against a namespace.
pub fn render(src: &str, ns: &Namespace) -> std::result::Result<String, ExpressionError> {
    // Plain text needs no parsing.
    if !src.contains('{') {
        return Ok(src.to_string());
    }
    Template::compile(src)
        .and_then(|t| t.render(ns))
        .map_err(|kind| ExpressionError::new(src, kind))
}

/// Evaluate a bare condition expression (no delimiters), as used by `when`.
///
/// A condition written with `{{ }}` delimiters is accepted too.
pub fn evaluate_condition(src: &str, ns: &Namespace) -> std::result::Result<bool, ExpressionError> {
    let trimmed = src.trim();
    let inner = trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(trimmed);
    expr::parse(inner)
        .and_then(|e| e.is_true(ns))
        .map_err(|kind| ExpressionError::new(src, kind))
}

/// Paths referenced by a template string.
pub fn referenced_paths(src: &str) -> std::result::Result<BTreeSet<String>, ExpressionError> {
    Template::compile(src)
        .map(|t| t.referenced_paths())
        .map_err(|kind| ExpressionError::new(src, kind))
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Output(String),
    Tag(String),
}

fn split(src: &str) -> Result<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut rest = src;
    let mut trim_next = false;

    loop {
        let open = ["{{", "{%", "{#"]
            .iter()
            .filter_map(|d| rest.find(d).map(|pos| (pos, *d)))
            .min_by_key(|(pos, _)| *pos);

        let Some((pos, delim)) = open else {
            push_text(&mut pieces, rest, trim_next);
            break;
        };

        let close = match delim {
            "{{" => "}}",
            "{%" => "%}",
            _ => "#}",
        };
        let after_open = &rest[pos + 2..];
        let end = after_open.find(close).ok_or_else(|| {
            ExprErrorKind::Syntax(format!("unclosed '{}' (expected '{}')", delim, close))
        })?;
        let mut inner = &after_open[..end];

        let trim_before = inner.starts_with('-');
        if trim_before {
            inner = &inner[1..];
        }
        let trim_after = inner.ends_with('-');
        if trim_after {
            inner = &inner[..inner.len() - 1];
        }

        let mut text = &rest[..pos];
        if trim_before {
            text = text.trim_end();
        }
        push_text(&mut pieces, text, trim_next);

        match delim {
            "{{" => pieces.push(Piece::Output(inner.trim().to_string())),
            "{%" => pieces.push(Piece::Tag(inner.trim().to_string())),
            _ => {}
        }

        trim_next = trim_after;
        rest = &after_open[end + 2..];
    }
    Ok(pieces)
}

fn push_text(pieces: &mut Vec<Piece>, text: &str, trim_start: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    if !text.is_empty() {
        pieces.push(Piece::Text(text.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Block structure
// ---------------------------------------------------------------------------

enum Stop {
    Elif(Expr),
    Else,
    Endif,
}

fn parse_block(
    pieces: &mut std::vec::IntoIter<Piece>,
    nested: bool,
) -> Result<(Vec<Node>, Option<Stop>)> {
    let mut nodes = Vec::new();
    while let Some(piece) = pieces.next() {
        match piece {
            Piece::Text(t) => nodes.push(Node::Text(t)),
            Piece::Output(src) => nodes.push(Node::Output(expr::parse(&src)?)),
            Piece::Tag(src) => {
                let (word, rest) = match src.split_once(char::is_whitespace) {
                    Some((w, r)) => (w, r.trim()),
                    None => (src.as_str(), ""),
                };
                let stop = match word {
                    "if" => {
                        nodes.push(parse_if(pieces, rest)?);
                        continue;
                    }
                    "elif" => Stop::Elif(expr::parse(rest)?),
                    "else" | "endif" if !rest.is_empty() => {
                        return Err(ExprErrorKind::Syntax(format!(
                            "unexpected text after '{}'",
                            word
                        )));
                    }
                    "else" => Stop::Else,
                    "endif" => Stop::Endif,
                    other => {
                        return Err(ExprErrorKind::Syntax(format!(
                            "unsupported tag '{}'",
                            other
                        )));
                    }
                };
                if !nested {
                    return Err(ExprErrorKind::Syntax(format!(
                        "'{}' outside of an if block",
                        word
                    )));
                }
                return Ok((nodes, Some(stop)));
            }
        }
    }
    if nested {
        return Err(ExprErrorKind::Syntax("missing '{% endif %}'".into()));
    }
    Ok((nodes, None))
}

fn parse_if(pieces: &mut std::vec::IntoIter<Piece>, cond_src: &str) -> Result<Node> {
    let mut branches = Vec::new();
    let mut cond = expr::parse(cond_src)?;
    loop {
        let (body, stop) = parse_block(pieces, true)?;
        branches.push((cond, body));
        match stop {
            Some(Stop::Elif(next)) => cond = next,
            Some(Stop::Else) => {
                let (otherwise, stop) = parse_block(pieces, true)?;
                return match stop {
                    Some(Stop::Endif) => Ok(Node::If {
                        branches,
                        otherwise,
                    }),
                    _ => Err(ExprErrorKind::Syntax(
                        "expected '{% endif %}' after '{% else %}'".into(),
                    )),
                };
            }
            Some(Stop::Endif) | None => {
                return Ok(Node::If {
                    branches,
                    otherwise: Vec::new(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_nodes(nodes: &[Node], ns: &Namespace, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Output(e) => out.push_str(&expr::to_display(&e.eval(ns)?)),
            Node::If {
                branches,
                otherwise,
            } => {
                let mut taken = false;
                for (cond, body) in branches {
                    if cond.is_true(ns)? {
                        render_nodes(body, ns, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    render_nodes(otherwise, ns, out)?;
                }
            }
        }
    }
    Ok(())
}

fn collect_nodes(nodes: &[Node], out: &mut BTreeSet<String>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Output(e) => e.collect_paths(out),
            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    cond.collect_paths(out);
                    collect_nodes(body, out);
                }
                collect_nodes(otherwise, out);
            }
        }
    }
}
