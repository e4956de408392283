//! Decoding of stack files into declarations

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::context::{EvalContext, RunContext};
use crate::errors::{display_path, EngineError, EngineResult};
use crate::evaluator::Value;
use crate::locals::evaluate_locals;
use crate::options::EngineOptions;
use crate::parser::ast::Block;
use crate::parser::{blocks_of_type, parse_file, ParsedFile};

/// Kind of a declaration in a stack file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Unit,
    Stack,
}

impl DeclKind {
    /// Block type in the stack file
    pub fn block_type(self) -> &'static str {
        match self {
            DeclKind::Unit => "unit",
            DeclKind::Stack => "stack",
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.block_type())
    }
}

/// One `unit` or `stack` block
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclKind,
    pub name: String,
    /// Where the content comes from: a local path or a remote locator
    pub source: String,
    /// Destination, relative to the generated stack directory unless absolute
    pub path: String,
    /// Written to the destination's values file when present
    pub values: Option<Value>,
    /// Generate next to the stack directory instead of inside it
    pub no_stack: bool,
}

impl Declaration {
    fn empty(kind: DeclKind, name: String) -> Self {
        Self {
            kind,
            name,
            source: String::new(),
            path: String::new(),
            values: None,
            no_stack: false,
        }
    }
}

/// A parsed and evaluated stack file
#[derive(Debug, Clone, PartialEq)]
pub struct StackFile {
    pub path: PathBuf,
    pub locals: IndexMap<String, Value>,
    pub units: Vec<Declaration>,
    pub stacks: Vec<Declaration>,
}

impl StackFile {
    /// Directory containing the stack file
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Units followed by stacks
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.units.iter().chain(self.stacks.iter())
    }
}

type Setter = fn(&mut Declaration, Value) -> Result<(), String>;

/// Attributes accepted in `unit` and `stack` blocks
const FIELDS: &[(&str, Setter)] = &[
    ("source", set_source),
    ("path", set_path),
    ("values", set_values),
    ("no_dot_terragrunt_stack", set_no_stack),
];

fn set_source(decl: &mut Declaration, value: Value) -> Result<(), String> {
    decl.source = expect_string(value)?;
    Ok(())
}

fn set_path(decl: &mut Declaration, value: Value) -> Result<(), String> {
    decl.path = expect_string(value)?;
    Ok(())
}

fn set_values(decl: &mut Declaration, value: Value) -> Result<(), String> {
    match value {
        Value::Null => decl.values = None,
        Value::Map(_) => decl.values = Some(value),
        other => return Err(format!("expected a map, found {}", other.type_name())),
    }
    Ok(())
}

fn set_no_stack(decl: &mut Declaration, value: Value) -> Result<(), String> {
    decl.no_stack = match value {
        Value::Null => false,
        Value::Bool(b) => b,
        other => return Err(format!("expected a bool, found {}", other.type_name())),
    };
    Ok(())
}

fn expect_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(format!("expected a string, found {}", other.type_name())),
    }
}

/// Read and evaluate a stack file from disk
pub fn read_stack_file(
    path: &Path,
    options: &EngineOptions,
    run: Arc<RunContext>,
) -> EngineResult<StackFile> {
    let parsed = parse_file(path)?;
    let mut file_options = options.clone();
    file_options.config_path = path.to_path_buf();
    file_options.working_dir = parsed.dir().to_path_buf();
    let ctx = EvalContext::new(Arc::new(file_options), run);
    parse_stack_file(&parsed, &ctx)
}

/// Evaluate locals and declarations of a parsed stack file
pub fn parse_stack_file(file: &ParsedFile, ctx: &EvalContext) -> EngineResult<StackFile> {
    let locals = evaluate_locals(file, ctx)?;
    let ctx = ctx.clone().with_locals(locals.values.clone());

    let mut units = Vec::new();
    for block in blocks_of_type(&file.ast.body, DeclKind::Unit.block_type()) {
        units.push(decode_declaration(DeclKind::Unit, block, file, &ctx)?);
    }
    let mut stacks = Vec::new();
    for block in blocks_of_type(&file.ast.body, DeclKind::Stack.block_type()) {
        stacks.push(decode_declaration(DeclKind::Stack, block, file, &ctx)?);
    }

    Ok(StackFile {
        path: file.path.clone(),
        locals: locals.values,
        units,
        stacks,
    })
}

fn decode_declaration(
    kind: DeclKind,
    block: &Block,
    file: &ParsedFile,
    ctx: &EvalContext,
) -> EngineResult<Declaration> {
    let at = format!("{}:{}", display_path(&file.path), block.location.line);
    let [name] = block.labels.as_slice() else {
        return Err(EngineError::invalid_declaration(format!(
            "{}: a {} block needs exactly one label, found {}",
            at,
            kind,
            block.labels.len()
        )));
    };

    let mut decl = Declaration::empty(kind, name.clone());
    for attr in block.body.attributes() {
        let Some((_, set)) = FIELDS.iter().find(|(field, _)| *field == attr.name) else {
            let known: Vec<&str> = FIELDS.iter().map(|(field, _)| *field).collect();
            return Err(EngineError::invalid_declaration(format!(
                "{}: unknown attribute '{}' in {} '{}' (expected one of {})",
                at,
                attr.name,
                kind,
                name,
                known.join(", ")
            )));
        };
        let value = ctx.evaluate(&attr.value, &file.source)?;
        set(&mut decl, value).map_err(|message| {
            EngineError::invalid_declaration(format!(
                "{}: {} of {} '{}': {}",
                at, attr.name, kind, name, message
            ))
        })?;
    }

    Ok(decl)
}
