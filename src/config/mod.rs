//! Full evaluation of a unit configuration file
//!
//! Evaluation order within one file:
//! 1. `include` paths (functions only, no locals yet)
//! 2. `locals`
//! 3. `dependency` blocks, with locals in scope
//! 4. every remaining attribute and block, with locals and dependencies
//!
//! The result is projected into a single map: top-level attributes by
//! name, `locals` under `locals`, dependencies under `dependency.<label>`,
//! and other blocks keyed by type and then by label.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::context::EvalContext;
use crate::dependency;
use crate::errors::{display_path, EngineError, EngineResult};
use crate::evaluator::Value;
use crate::locals::evaluate_locals;
use crate::parser::ast::{Block, Body, Structure};
use crate::parser::{blocks_of_type, parse_file, ParsedFile};
use crate::paths;

/// Block types evaluated by dedicated passes rather than projected as-is
const SPECIAL_BLOCKS: &[&str] = &["locals", "dependency"];

/// Parse and evaluate the context's own file
pub fn render(ctx: &EvalContext) -> EngineResult<Value> {
    let parsed = parse_file(ctx.file())?;
    evaluate_file(&parsed, ctx)
}

/// Parse and evaluate another config file on behalf of `parent`
pub fn read_config(path: &Path, parent: &EvalContext) -> EngineResult<Value> {
    tracing::debug!(path = %path.display(), depth = parent.read_depth() + 1, "reading config");
    render(&parent.for_file(path))
}

/// Evaluate an already parsed file
pub fn evaluate_file(file: &ParsedFile, ctx: &EvalContext) -> EngineResult<Value> {
    let mut ctx = ctx.clone();
    if let Some(included) = include_path(file, &ctx)? {
        ctx = ctx.with_include(included);
    }

    let locals = evaluate_locals(file, &ctx)?;
    let ctx = ctx.with_locals(locals.values.clone());

    let dependencies = dependency::resolve_dependencies(file, &ctx)?;
    let ctx = if dependencies.is_empty() {
        ctx
    } else {
        ctx.with_dependencies(dependencies.clone())
    };

    let mut result = evaluate_body(&file.ast.body, file, &ctx, true)?;
    result.insert("locals".to_string(), Value::Map(locals.values));
    if !dependencies.is_empty() {
        result.insert("dependency".to_string(), Value::Map(dependencies));
    }
    Ok(Value::Map(result))
}

/// Path of the first `include` block, resolved against the file
fn include_path(file: &ParsedFile, ctx: &EvalContext) -> EngineResult<Option<PathBuf>> {
    let Some(block) = blocks_of_type(&file.ast.body, "include").into_iter().next() else {
        return Ok(None);
    };
    let Some(attr) = block.body.attribute("path") else {
        return Err(EngineError::invalid_declaration(format!(
            "{}: include block has no path",
            display_path(&file.path)
        )));
    };
    match ctx.evaluate(&attr.value, &file.source)? {
        Value::String(path) => Ok(Some(paths::resolve_against(
            &paths::absolute(file.dir()),
            path,
        ))),
        other => Err(EngineError::type_mismatch(
            file.source.as_str(),
            &attr.location,
            "string",
            other.type_name(),
            "include path must be a string",
        )),
    }
}

fn evaluate_body(
    body: &Body,
    file: &ParsedFile,
    ctx: &EvalContext,
    top_level: bool,
) -> EngineResult<IndexMap<String, Value>> {
    let mut result = IndexMap::new();

    for structure in &body.structures {
        match structure {
            Structure::Attribute(attr) => {
                let value = ctx.evaluate(&attr.value, &file.source)?;
                result.insert(attr.name.clone(), value);
            }
            Structure::Block(block) => {
                if top_level && SPECIAL_BLOCKS.contains(&block.block_type.as_str()) {
                    continue;
                }
                let value = Value::Map(evaluate_body(&block.body, file, ctx, false)?);
                insert_block(&mut result, block, value, file)?;
            }
        }
    }

    Ok(result)
}

/// Place a block's value under its type and labels
fn insert_block(
    result: &mut IndexMap<String, Value>,
    block: &Block,
    value: Value,
    file: &ParsedFile,
) -> EngineResult<()> {
    let duplicate = || {
        EngineError::invalid_declaration(format!(
            "{}:{}: block {} {} is defined more than once",
            display_path(&file.path),
            block.location.line,
            block.block_type,
            block
                .labels
                .iter()
                .map(|l| format!("\"{}\"", l))
                .collect::<Vec<_>>()
                .join(" ")
        ))
    };

    let mut slot = result;
    let mut key = block.block_type.as_str();
    for label in &block.labels {
        let entry = slot
            .entry(key.to_string())
            .or_insert_with(Value::empty_map);
        slot = match entry {
            Value::Map(map) => map,
            _ => return Err(duplicate()),
        };
        key = label.as_str();
    }

    if slot.contains_key(key) {
        return Err(duplicate());
    }
    slot.insert(key.to_string(), value);
    Ok(())
}
