//! Abstract Syntax Tree (AST) definitions for HCL files
//!
//! The AST represents the parsed structure of one configuration file.
//! Each node carries source location information for error reporting.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::lexer::token::SourceLocation;

/// A complete parsed file
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// Top-level body
    pub body: Body,
    /// Source location spanning the entire file
    pub location: SourceLocation,
}

/// An ordered list of attributes and blocks
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    pub structures: Vec<Structure>,
}

/// Items that can appear in a body
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    /// `name = expr`
    Attribute(Attribute),
    /// `type "label" { ... }`
    Block(Block),
}

/// Attribute: `name = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Expr,
    pub location: SourceLocation,
}

/// Block: `type "label1" label2 { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub location: SourceLocation,
}

impl Body {
    /// Iterate over the attributes of this body in declaration order
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.structures.iter().filter_map(|s| match s {
            Structure::Attribute(a) => Some(a),
            Structure::Block(_) => None,
        })
    }

    /// Iterate over the blocks of this body in declaration order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.structures.iter().filter_map(|s| match s {
            Structure::Block(b) => Some(b),
            Structure::Attribute(_) => None,
        })
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes().find(|a| a.name == name)
    }

    /// Attributes keyed by name
    pub fn attribute_map(&self) -> IndexMap<String, &Expr> {
        self.attributes()
            .map(|a| (a.name.clone(), &a.value))
            .collect()
    }
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `null`
    Null(SourceLocation),
    /// `true` / `false`
    Bool(bool, SourceLocation),
    /// Integer literal
    Integer(i64, SourceLocation),
    /// Float literal
    Float(f64, SourceLocation),
    /// Quoted string or heredoc, possibly with interpolations
    Template(TemplateExpr),
    /// Root variable reference: `local`, `dependency`, `each`, ...
    Variable(String, SourceLocation),
    /// Attribute/index access chain: `local.region`, `x[0]`
    Traversal(TraversalExpr),
    /// `[a, b, c]`
    Array(ArrayExpr),
    /// `{ key = value }`
    Object(ObjectExpr),
    /// `name(args...)`
    Call(CallExpr),
    /// `a + b`
    Binary(BinaryExpr),
    /// `!a`, `-a`
    Unary(UnaryExpr),
    /// `cond ? a : b`
    Conditional(ConditionalExpr),
    /// `[for ...]` or `{for ...}`
    For(Box<ForExpr>),
    /// `(expr)`
    Paren(Box<Expr>, SourceLocation),
}

impl Expr {
    /// Get the source location of this expression
    pub fn location(&self) -> &SourceLocation {
        match self {
            Expr::Null(loc) => loc,
            Expr::Bool(_, loc) => loc,
            Expr::Integer(_, loc) => loc,
            Expr::Float(_, loc) => loc,
            Expr::Template(t) => &t.location,
            Expr::Variable(_, loc) => loc,
            Expr::Traversal(t) => &t.location,
            Expr::Array(a) => &a.location,
            Expr::Object(o) => &o.location,
            Expr::Call(c) => &c.location,
            Expr::Binary(b) => &b.location,
            Expr::Unary(u) => &u.location,
            Expr::Conditional(c) => &c.location,
            Expr::For(f) => &f.location,
            Expr::Paren(_, loc) => loc,
        }
    }

    /// Names referenced as `local.<name>` anywhere in this expression
    pub fn local_references(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |expr| {
            if let Expr::Traversal(t) = expr {
                if let (Expr::Variable(root, _), Some(TraversalStep::Attr(name))) =
                    (t.base.as_ref(), t.steps.first())
                {
                    if root == "local" {
                        names.insert(name.clone());
                    }
                }
            }
        });
        names
    }

    /// Whether the bare `local` object is used without an attribute name
    pub fn references_bare_local(&self) -> bool {
        let mut uses = 0usize;
        let mut named = 0usize;
        self.walk(&mut |expr| match expr {
            Expr::Variable(name, _) if name == "local" => uses += 1,
            Expr::Traversal(t) => {
                if let (Expr::Variable(root, _), Some(TraversalStep::Attr(_))) =
                    (t.base.as_ref(), t.steps.first())
                {
                    if root == "local" {
                        named += 1;
                    }
                }
            }
            _ => {}
        });
        uses > named
    }

    /// Root variable names referenced anywhere in this expression
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.walk(&mut |expr| {
            if let Expr::Variable(name, _) = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Visit this expression and all sub-expressions, parents first
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Null(_)
            | Expr::Bool(..)
            | Expr::Integer(..)
            | Expr::Float(..)
            | Expr::Variable(..) => {}
            Expr::Template(t) => {
                for part in &t.parts {
                    if let TemplatePart::Interpolation(e) = part {
                        e.walk(visit);
                    }
                }
            }
            Expr::Traversal(t) => {
                t.base.walk(visit);
                for step in &t.steps {
                    if let TraversalStep::Index(e) = step {
                        e.walk(visit);
                    }
                }
            }
            Expr::Array(a) => {
                for e in &a.elements {
                    e.walk(visit);
                }
            }
            Expr::Object(o) => {
                for item in &o.items {
                    if let ObjectKey::Expr(k) = &item.key {
                        k.walk(visit);
                    }
                    item.value.walk(visit);
                }
            }
            Expr::Call(c) => {
                for arg in &c.args {
                    arg.walk(visit);
                }
            }
            Expr::Binary(b) => {
                b.left.walk(visit);
                b.right.walk(visit);
            }
            Expr::Unary(u) => u.operand.walk(visit),
            Expr::Conditional(c) => {
                c.condition.walk(visit);
                c.then_expr.walk(visit);
                c.else_expr.walk(visit);
            }
            Expr::For(f) => {
                f.collection.walk(visit);
                if let Some(k) = &f.key_expr {
                    k.walk(visit);
                }
                f.value_expr.walk(visit);
                if let Some(c) = &f.condition {
                    c.walk(visit);
                }
            }
            Expr::Paren(inner, _) => inner.walk(visit),
        }
    }
}

/// Template: literal text with interpolated expressions
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateExpr {
    pub parts: Vec<TemplatePart>,
    pub location: SourceLocation,
}

impl TemplateExpr {
    /// Whether the template is exactly one interpolation (`"${x}"`), which
    /// yields the interpolated value unconverted
    pub fn single_interpolation(&self) -> Option<&Expr> {
        let mut exprs = self.parts.iter().filter(|p| match p {
            TemplatePart::Literal(s) => !s.is_empty(),
            TemplatePart::Interpolation(_) => true,
        });
        match (exprs.next(), exprs.next()) {
            (Some(TemplatePart::Interpolation(e)), None) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Expr),
}

/// Traversal: a base expression followed by attribute/index steps
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalExpr {
    pub base: Box<Expr>,
    pub steps: Vec<TraversalStep>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraversalStep {
    /// `.name`
    Attr(String),
    /// `[expr]` or legacy `.0`
    Index(Expr),
}

/// Array literal
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpr {
    pub elements: Vec<Expr>,
    pub location: SourceLocation,
}

/// Object literal
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectExpr {
    pub items: Vec<ObjectItem>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectItem {
    pub key: ObjectKey,
    pub value: Expr,
}

/// Object keys: a bare identifier is a literal name, anything else is evaluated
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    Ident(String),
    Expr(Expr),
}

/// Function call
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub name: String,
    pub args: Vec<Expr>,
    /// Final argument written as `list...`, expanded into separate arguments
    pub expand_final: bool,
    pub location: SourceLocation,
}

/// Binary expression
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub op: BinaryOp,
    pub right: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// Unary expression
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Conditional: `cond ? then : else`
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpr {
    pub condition: Box<Expr>,
    pub then_expr: Box<Expr>,
    pub else_expr: Box<Expr>,
    pub location: SourceLocation,
}

/// For expression: `[for k, v in coll : v if cond]` or `{for k, v in coll : k => v}`
#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub key_var: Option<String>,
    pub value_var: String,
    pub collection: Expr,
    /// Present for the object form
    pub key_expr: Option<Expr>,
    pub value_expr: Expr,
    /// `...` after the value in the object form groups values by key
    pub grouping: bool,
    pub condition: Option<Expr>,
    pub location: SourceLocation,
}
