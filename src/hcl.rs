//! HCL writer
//!
//! In-memory description of Terraform blocks and the serializer that turns
//! it into text. Converters never build raw HCL themselves.

use std::borrow::Cow;
use std::fmt::Write;

/// Indentation per nesting level
const INDENT: &str = "  ";

/// An attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    /// A string literal, written out verbatim; `${` and `%{` are escaped
    String(String),
    /// A string template whose `${...}` sequences are live interpolations.
    /// Literal text inside must already be passed through [`escape_template`]
    Template(String),
    /// A bare traversal such as `octopusdeploy_feed.feed_nuget.id`
    Traversal(String),
    List(Vec<Expr>),
    Object(Vec<(String, Expr)>),
}

impl Expr {
    /// Convert a JSON value into a literal expression
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Expr::Null,
            Value::Bool(b) => Expr::Bool(*b),
            Value::Number(n) => Expr::Number(n.clone()),
            Value::String(s) => Expr::String(s.clone()),
            Value::Array(items) => Expr::List(items.iter().map(Expr::from_json).collect()),
            Value::Object(map) => Expr::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Expr::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Like [`Expr::from_json`], but string leaves are templates
    pub fn from_template_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(s) => Expr::Template(s.clone()),
            Value::Array(items) => {
                Expr::List(items.iter().map(Expr::from_template_json).collect())
            }
            Value::Object(map) => Expr::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Expr::from_template_json(v)))
                    .collect(),
            ),
            other => Expr::from_json(other),
        }
    }
}

/// Escape the template openers in literal text: `${` becomes `$${` and `%{`
/// becomes `%%{`
pub fn escape_template(text: &str) -> Cow<'_, str> {
    if !text.contains("${") && !text.contains("%{") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 4);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if (c == '$' || c == '%') && chars.peek() == Some(&'{') {
            out.push(c);
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// A configuration block: `type "label" "label" { ... }`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub attributes: Vec<(String, Expr)>,
    pub blocks: Vec<Block>,
}

impl Block {
    pub fn new(block_type: &str) -> Self {
        Self {
            block_type: block_type.to_string(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }

    pub fn attribute(mut self, name: &str, value: Expr) -> Self {
        self.attributes.push((name.to_string(), value));
        self
    }

    pub fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn push_attribute(&mut self, name: &str, value: Expr) {
        self.attributes.push((name.to_string(), value));
    }
}

/// Serialize blocks, separated by blank lines
pub fn to_string(blocks: &[Block]) -> String {
    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_block(&mut out, block, 0);
    }
    out
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    let pad = INDENT.repeat(depth);
    let _ = write!(out, "{}{}", pad, block.block_type);
    for label in &block.labels {
        let _ = write!(out, " {}", quote(label));
    }
    out.push_str(" {\n");

    let width = block
        .attributes
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    for (name, value) in &block.attributes {
        let _ = write!(out, "{}{}{:width$} = ", pad, INDENT, name, width = width);
        let _ = writeln!(out, "{}", write_expr(value, depth + 1));
    }

    for (i, nested) in block.blocks.iter().enumerate() {
        if i > 0 || !block.attributes.is_empty() {
            out.push('\n');
        }
        write_block(out, nested, depth + 1);
    }

    let _ = writeln!(out, "{}}}", pad);
}

fn write_expr(expr: &Expr, depth: usize) -> String {
    match expr {
        Expr::Null => "null".to_string(),
        Expr::Bool(b) => b.to_string(),
        Expr::Number(n) => n.to_string(),
        Expr::String(s) => quote(s),
        Expr::Template(t) => quote_escaped(t),
        Expr::Traversal(t) => t.clone(),
        Expr::List(items) => {
            if items.is_empty() {
                return "[]".to_string();
            }
            let parts: Vec<String> = items.iter().map(|e| write_expr(e, depth)).collect();
            format!("[{}]", parts.join(", "))
        }
        Expr::Object(entries) => {
            if entries.is_empty() {
                return "{}".to_string();
            }
            let pad = INDENT.repeat(depth);
            let mut out = String::from("{\n");
            for (key, value) in entries {
                let _ = writeln!(
                    out,
                    "{}{}{} = {}",
                    pad,
                    INDENT,
                    quote(key),
                    write_expr(value, depth + 1)
                );
            }
            let _ = write!(out, "{}}}", pad);
            out
        }
    }
}

/// Quote a string literal so it reads back as exactly `value`
fn quote(value: &str) -> String {
    quote_escaped(&escape_template(value))
}

/// Quote text that is already a template: only string escapes are applied
fn quote_escaped(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
