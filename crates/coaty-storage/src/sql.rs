//! A backend-agnostic SQL builder AST. Adapters render it to a concrete
//! dialect string plus a parameter list instead of being handed a
//! hand-concatenated query, so identifiers and literals are always escaped
//! through the adapter's own rules rather than by string-pasting.

use serde_json::Value;

/// One node of a SQL expression tree.
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// Verbatim SQL fragment, copied into the rendered string unescaped.
    /// Reserved for keywords and punctuation the caller controls (`SELECT`,
    /// `FROM`, `=`, `AND`, ...) — never for user-supplied strings.
    Text(String),
    /// A bound parameter. Rendered as a dialect placeholder
    /// (`IdentifierEscaper::placeholder`); the value itself travels in the
    /// builder's parameter list, never inlined into the query text.
    Param(Value),
    /// An identifier (table or column name), escaped via
    /// [`IdentifierEscaper::escape_identifier`].
    Ident(String),
    /// A literal escaped and inlined via [`IdentifierEscaper::escape_literal`].
    /// Used for values a dialect cannot bind as a parameter (e.g. some
    /// DDL contexts); prefer [`SqlNode::Param`] wherever binding is possible.
    Literal(Value),
    /// A parenthesized nested expression.
    Subquery(Box<SqlNode>),
    /// A sequence of nodes concatenated with `separator` between them.
    Sequence(Vec<SqlNode>, &'static str),
}

impl SqlNode {
    pub fn text(s: impl Into<String>) -> Self {
        SqlNode::Text(s.into())
    }

    pub fn ident(s: impl Into<String>) -> Self {
        SqlNode::Ident(s.into())
    }

    pub fn param(v: impl Into<Value>) -> Self {
        SqlNode::Param(v.into())
    }

    pub fn literal(v: impl Into<Value>) -> Self {
        SqlNode::Literal(v.into())
    }

    pub fn subquery(node: SqlNode) -> Self {
        SqlNode::Subquery(Box::new(node))
    }

    pub fn join(nodes: Vec<SqlNode>, separator: &'static str) -> Self {
        SqlNode::Sequence(nodes, separator)
    }
}

/// Dialect-specific escaping rules an adapter supplies to [`render`].
pub trait IdentifierEscaper {
    /// Quote and escape a table/column identifier, e.g. `foo` -> `"foo"`.
    fn escape_identifier(&self, ident: &str) -> String;

    /// Render a literal value inline (only used for [`SqlNode::Literal`]).
    fn escape_literal(&self, value: &Value) -> String;

    /// The placeholder text for the `n`th (1-based) bound parameter, e.g.
    /// `$1` for Postgres or `?` for SQLite.
    fn placeholder(&self, n: usize) -> String;
}

/// The result of [`render`]: a dialect query string plus its ordered
/// bound-parameter list.
#[derive(Debug, Clone)]
pub struct RenderedSql {
    pub query: String,
    pub params: Vec<Value>,
}

/// Walk a [`SqlNode`] tree and produce dialect-specific SQL text with an
/// ordered parameter list, using `escaper` for all identifier/literal/
/// placeholder formatting.
pub fn render(node: &SqlNode, escaper: &dyn IdentifierEscaper) -> RenderedSql {
    let mut params = Vec::new();
    let query = render_node(node, escaper, &mut params);
    RenderedSql { query, params }
}

fn render_node(node: &SqlNode, escaper: &dyn IdentifierEscaper, params: &mut Vec<Value>) -> String {
    match node {
        SqlNode::Text(s) => s.clone(),
        SqlNode::Ident(s) => escaper.escape_identifier(s),
        SqlNode::Literal(v) => escaper.escape_literal(v),
        SqlNode::Param(v) => {
            params.push(v.clone());
            escaper.placeholder(params.len())
        }
        SqlNode::Subquery(inner) => format!("({})", render_node(inner, escaper, params)),
        SqlNode::Sequence(nodes, separator) => nodes
            .iter()
            .map(|n| render_node(n, escaper, params))
            .collect::<Vec<_>>()
            .join(separator),
    }
}

/// A minimal [`IdentifierEscaper`] used by [`crate::memory::MemoryAdapter`]
/// and as a reference dialect in tests: double-quoted identifiers, single
/// -quoted literals with doubled-quote escaping, and numbered `$n`
/// placeholders (the same convention Postgres uses).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEscaper;

impl IdentifierEscaper for DefaultEscaper {
    fn escape_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn escape_literal(&self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Null => "NULL".to_string(),
            other => other.to_string(),
        }
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }
}
