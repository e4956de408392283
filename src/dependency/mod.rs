//! Resolution of `dependency` blocks to another unit's published outputs
//!
//! A dependency names the config file of another unit. Its outputs are
//! obtained by running the provisioning tool's `output -json` in that
//! unit's directory and decoding the typed JSON it prints. Outputs are
//! cached per target config for the rest of the run, so every target is
//! queried at most once.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::context::EvalContext;
use crate::errors::{display_path, recover, EngineError, EngineResult};
use crate::evaluator::Value;
use crate::options::{EngineOptions, DEFAULT_CONFIG_NAME};
use crate::parser::{blocks_of_type, ParsedFile};
use crate::paths;
use crate::shell;

/// A declared `dependency "label" { config_path = ... }` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub label: String,
    /// Target config file, resolved against the declaring file
    pub config_path: PathBuf,
}

/// One entry of the tool's `output -json` document
#[derive(Debug, Deserialize)]
struct OutputRecord {
    #[serde(default)]
    sensitive: bool,
    #[serde(rename = "type", default)]
    type_descriptor: serde_json::Value,
    #[serde(default)]
    value: serde_json::Value,
}

/// Resolve a declared target against the declaring file's directory. A
/// directory target means the conventional config file inside it.
pub fn resolve_target_path(base_dir: &Path, config_path: &str) -> PathBuf {
    let resolved = paths::resolve_against(&paths::absolute(base_dir), config_path);
    if resolved.is_dir() {
        resolved.join(DEFAULT_CONFIG_NAME)
    } else {
        resolved
    }
}

/// Read the `dependency` blocks of `file`, evaluating `config_path` in `ctx`
pub fn declared_dependencies(
    file: &ParsedFile,
    ctx: &EvalContext,
) -> EngineResult<Vec<DependencyRef>> {
    let mut dependencies: Vec<DependencyRef> = Vec::new();

    for block in blocks_of_type(&file.ast.body, "dependency") {
        let [label] = block.labels.as_slice() else {
            return Err(EngineError::invalid_declaration(format!(
                "{}:{}: a dependency block needs exactly one label, found {}",
                display_path(&file.path),
                block.location.line,
                block.labels.len()
            )));
        };
        if dependencies.iter().any(|d| &d.label == label) {
            return Err(EngineError::invalid_declaration(format!(
                "{}: dependency '{}' is declared more than once",
                display_path(&file.path),
                label
            )));
        }

        let Some(attr) = block.body.attribute("config_path") else {
            return Err(EngineError::invalid_declaration(format!(
                "{}: dependency '{}' has no config_path",
                display_path(&file.path),
                label
            )));
        };
        let config_path = match ctx.evaluate(&attr.value, &file.source)? {
            Value::String(s) if !s.trim().is_empty() => s,
            other => {
                return Err(EngineError::type_mismatch(
                    file.source.as_str(),
                    &attr.location,
                    "non-empty string",
                    other.type_name(),
                    "config_path must be a path to a unit directory or config file",
                ))
            }
        };

        dependencies.push(DependencyRef {
            label: label.clone(),
            config_path: resolve_target_path(file.dir(), &config_path),
        });
    }

    Ok(dependencies)
}

/// Resolve every dependency of `file` into `label -> { outputs = ... }`,
/// ready for [`EvalContext::with_dependencies`]
pub fn resolve_dependencies(
    file: &ParsedFile,
    ctx: &EvalContext,
) -> EngineResult<IndexMap<String, Value>> {
    let mut resolved = IndexMap::new();
    for dependency in declared_dependencies(file, ctx)? {
        let outputs = resolve_outputs(&dependency, ctx)?;
        let mut entry = IndexMap::new();
        entry.insert(
            "config_path".to_string(),
            Value::String(paths::to_slash(&dependency.config_path)),
        );
        entry.insert("outputs".to_string(), outputs);
        resolved.insert(dependency.label, Value::Map(entry));
    }
    Ok(resolved)
}

/// Outputs of one dependency, from the run cache when already known
pub fn resolve_outputs(dependency: &DependencyRef, ctx: &EvalContext) -> EngineResult<Value> {
    let target = &dependency.config_path;
    if !target.is_file() {
        return Err(EngineError::DependencyNotFound {
            label: dependency.label.clone(),
            path: display_path(target),
        });
    }

    let mut queried = false;
    let outputs = ctx
        .run()
        .outputs
        .get_or_try_insert_with(target.clone(), || {
            queried = true;
            fetch_outputs(target, ctx.options())
        })?;

    if !queried {
        tracing::debug!(
            dependency = %dependency.label,
            target = %target.display(),
            "dependency outputs cache hit"
        );
    }
    Ok(outputs)
}

/// Run the tool's output command for `target` and decode what it prints
fn fetch_outputs(target: &Path, options: &EngineOptions) -> EngineResult<Value> {
    let target_options = options.clone_for_target(target);
    tracing::info!(
        target = %target.display(),
        tool = %target_options.terraform_path,
        "reading dependency outputs"
    );

    let output = shell::run_command(
        &target_options.terraform_path,
        &target_options.terraform_cli_args,
        &target_options.working_dir,
        &target_options.env,
        &target_options.cancel,
    )?;
    decode_outputs(&output.stdout, target)
}

/// Decode `{ name: { sensitive, type, value } }` into a map of values
pub fn decode_outputs(raw: &str, target: &Path) -> EngineResult<Value> {
    recover("decoding dependency outputs", || {
        let path = display_path(target);
        let records: IndexMap<String, OutputRecord> =
            serde_json::from_str(raw).map_err(|e| EngineError::DependencyParse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let mut outputs = IndexMap::new();
        for (name, record) in records {
            let value = decode_typed(&record.value, &record.type_descriptor).map_err(
                |message| EngineError::DependencyEncoding {
                    path: path.clone(),
                    output: name.clone(),
                    message,
                },
            )?;
            tracing::trace!(output = %name, sensitive = record.sensitive, "decoded output");
            outputs.insert(name, value);
        }
        Ok(Value::Map(outputs))
    })
}

/// Decode a JSON value according to a type descriptor such as `"string"`,
/// `["list", "number"]` or `["object", { "id": "string" }]`
fn decode_typed(value: &serde_json::Value, descriptor: &serde_json::Value) -> Result<Value, String> {
    use serde_json::Value as Json;

    if value.is_null() {
        return Ok(Value::Null);
    }

    match descriptor {
        // untyped outputs are taken as they are
        Json::Null => Ok(Value::from_serde_json(value.clone())),
        Json::String(primitive) => decode_primitive(value, primitive),
        Json::Array(parts) => {
            let (Some(Json::String(kind)), Some(inner)) = (parts.first(), parts.get(1)) else {
                return Err(format!("malformed type descriptor {}", descriptor));
            };
            match kind.as_str() {
                "list" | "set" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| expected("a list", value))?;
                    items
                        .iter()
                        .map(|item| decode_typed(item, inner))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::List)
                }
                "map" => {
                    let entries = value
                        .as_object()
                        .ok_or_else(|| expected("a map", value))?;
                    entries
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), decode_typed(v, inner)?)))
                        .collect::<Result<IndexMap<_, _>, String>>()
                        .map(Value::Map)
                }
                "object" => {
                    let entries = value
                        .as_object()
                        .ok_or_else(|| expected("an object", value))?;
                    let attributes = inner
                        .as_object()
                        .ok_or_else(|| format!("malformed object type {}", inner))?;
                    let mut result = IndexMap::new();
                    for (attr, attr_type) in attributes {
                        let attr_value = entries.get(attr).unwrap_or(&Json::Null);
                        result.insert(attr.clone(), decode_typed(attr_value, attr_type)?);
                    }
                    Ok(Value::Map(result))
                }
                "tuple" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| expected("a tuple", value))?;
                    let types = inner
                        .as_array()
                        .ok_or_else(|| format!("malformed tuple type {}", inner))?;
                    if items.len() != types.len() {
                        return Err(format!(
                            "tuple has {} elements but its type lists {}",
                            items.len(),
                            types.len()
                        ));
                    }
                    items
                        .iter()
                        .zip(types)
                        .map(|(item, item_type)| decode_typed(item, item_type))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::List)
                }
                other => Err(format!("unknown type kind '{}'", other)),
            }
        }
        other => Err(format!("malformed type descriptor {}", other)),
    }
}

fn decode_primitive(value: &serde_json::Value, primitive: &str) -> Result<Value, String> {
    match primitive {
        "string" => value
            .as_str()
            .map(Value::from)
            .ok_or_else(|| expected("a string", value)),
        "number" => {
            if !value.is_number() {
                return Err(expected("a number", value));
            }
            Ok(Value::from_serde_json(value.clone()))
        }
        "bool" => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| expected("a bool", value)),
        "dynamic" => Ok(Value::from_serde_json(value.clone())),
        other => Err(format!("unknown primitive type '{}'", other)),
    }
}

fn expected(what: &str, found: &serde_json::Value) -> String {
    format!("expected {}, found {}", what, found)
}
