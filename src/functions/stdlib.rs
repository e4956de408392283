//! General-purpose functions: collections, strings, encodings and files

use base64::Engine;
use indexmap::IndexMap;
use regex::Regex;

use super::{string_arg, FunctionCall, FunctionDef, FunctionRegistry};
use crate::errors::EngineResult;
use crate::evaluator::Value;
use crate::paths;

use super::ParamType as P;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.insert("length", FunctionDef::fixed(&[P::Any], fn_length));
    registry.insert("keys", FunctionDef::fixed(&[P::Map], fn_keys));
    registry.insert("values", FunctionDef::fixed(&[P::Map], fn_values));
    registry.insert(
        "lookup",
        FunctionDef::with_optional(&[P::Map, P::String], &[P::Any], fn_lookup),
    );
    registry.insert("contains", FunctionDef::fixed(&[P::List, P::Any], fn_contains));
    registry.insert("concat", FunctionDef::variadic(&[], P::List, fn_concat));
    registry.insert("merge", FunctionDef::variadic(&[], P::Any, fn_merge));
    registry.insert("flatten", FunctionDef::fixed(&[P::List], fn_flatten));
    registry.insert(
        "range",
        FunctionDef::with_optional(&[P::Number], &[P::Number, P::Number], fn_range),
    );
    registry.insert("coalesce", FunctionDef::variadic(&[], P::Any, fn_coalesce));
    registry.insert("element", FunctionDef::fixed(&[P::List, P::Number], fn_element));
    registry.insert("tostring", FunctionDef::fixed(&[P::Any], fn_tostring));
    registry.insert("tonumber", FunctionDef::fixed(&[P::Any], fn_tonumber));
    registry.insert("tobool", FunctionDef::fixed(&[P::Any], fn_tobool));
    registry.insert("upper", FunctionDef::fixed(&[P::String], fn_upper));
    registry.insert("lower", FunctionDef::fixed(&[P::String], fn_lower));
    registry.insert("trimspace", FunctionDef::fixed(&[P::String], fn_trimspace));
    registry.insert("split", FunctionDef::fixed(&[P::String, P::String], fn_split));
    registry.insert("join", FunctionDef::fixed(&[P::String, P::List], fn_join));
    registry.insert(
        "replace",
        FunctionDef::fixed(&[P::String, P::String, P::String], fn_replace),
    );
    registry.insert("format", FunctionDef::variadic(&[P::String], P::Any, fn_format));
    registry.insert("base64encode", FunctionDef::fixed(&[P::String], fn_base64encode));
    registry.insert("base64decode", FunctionDef::fixed(&[P::String], fn_base64decode));
    registry.insert("jsonencode", FunctionDef::fixed(&[P::Any], fn_jsonencode));
    registry.insert("jsondecode", FunctionDef::fixed(&[P::String], fn_jsondecode));
    registry.insert("yamlencode", FunctionDef::fixed(&[P::Any], fn_yamlencode));
    registry.insert("yamldecode", FunctionDef::fixed(&[P::String], fn_yamldecode));
    registry.insert("abspath", FunctionDef::fixed(&[P::String], fn_abspath));
    registry.insert("basename", FunctionDef::fixed(&[P::String], fn_basename));
    registry.insert("dirname", FunctionDef::fixed(&[P::String], fn_dirname));
    registry.insert("file", FunctionDef::fixed(&[P::String], fn_file));
}

/// length(list | map | string) -> number
fn fn_length(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let n = match &args[0] {
        Value::List(l) => l.len(),
        Value::Map(m) => m.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(call.fail(format!(
                "expected a list, map or string, found {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

/// keys(map) -> [string], in lexical order
fn fn_keys(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let mut keys: Vec<_> = args[0].as_map().into_iter().flat_map(|m| m.keys()).cloned().collect();
    keys.sort();
    Ok(Value::List(keys.into_iter().map(Value::String).collect()))
}

/// values(map) -> list, ordered by key
fn fn_values(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let Some(map) = args[0].as_map() else {
        return Ok(Value::List(vec![]));
    };
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Ok(Value::List(entries.into_iter().map(|(_, v)| v.clone()).collect()))
}

/// lookup(map, key, default?) -> value
fn fn_lookup(call: &FunctionCall<'_>, mut args: Vec<Value>) -> EngineResult<Value> {
    let key = string_arg(&args, 1).to_string();
    if let Some(value) = args[0].as_map().and_then(|m| m.get(&key)) {
        return Ok(value.clone());
    }
    if args.len() == 3 {
        return Ok(args.swap_remove(2));
    }
    Err(call.fail(format!("key \"{}\" does not exist in the map", key)))
}

/// contains(list, value) -> bool
fn fn_contains(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let found = args[0]
        .as_list()
        .map(|l| l.iter().any(|v| v.equals(&args[1])))
        .unwrap_or(false);
    Ok(Value::Bool(found))
}

/// concat(list, list, ...) -> list
fn fn_concat(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let mut result = Vec::new();
    for arg in args {
        if let Value::List(items) = arg {
            result.extend(items);
        }
    }
    Ok(Value::List(result))
}

/// merge(map, map, ...) -> map (shallow, later arguments win; nulls skipped)
fn fn_merge(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let mut result = IndexMap::new();
    for arg in args {
        match arg {
            Value::Map(map) => {
                for (k, v) in map {
                    result.insert(k, v);
                }
            }
            Value::Null => {}
            other => {
                return Err(call.fail(format!(
                    "arguments must be maps, found {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Value::Map(result))
}

/// flatten(list) -> list, flattening nested lists recursively
fn fn_flatten(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
        for item in items {
            match item {
                Value::List(inner) => flatten_into(inner, out),
                other => out.push(other.clone()),
            }
        }
    }

    let mut result = Vec::new();
    if let Some(items) = args[0].as_list() {
        flatten_into(items, &mut result);
    }
    Ok(Value::List(result))
}

/// Upper bound on the number of elements `range` may produce
const MAX_RANGE_LEN: usize = 1024 * 1024;

/// range(end), range(start, end), range(start, end, step)
fn fn_range(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let mut ints = Vec::with_capacity(args.len());
    for arg in &args {
        ints.push(
            arg.as_int()
                .ok_or_else(|| call.fail("arguments must be whole numbers"))?,
        );
    }

    let (start, end, step) = match ints.as_slice() {
        [end] => (0, *end, 1),
        [start, end] => (*start, *end, if start <= end { 1 } else { -1 }),
        [start, end, step] => (*start, *end, *step),
        _ => return Err(call.fail("expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(call.fail("step must not be zero"));
    }

    let mut result = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        if result.len() >= MAX_RANGE_LEN {
            return Err(call.fail(format!("more than {} elements requested", MAX_RANGE_LEN)));
        }
        result.push(Value::Int(i));
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(result))
}

/// coalesce(values...) -> first argument that is neither null nor ""
fn fn_coalesce(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    args.into_iter()
        .find(|v| !v.is_null() && v.as_str() != Some(""))
        .ok_or_else(|| call.fail("no non-null, non-empty-string arguments"))
}

/// element(list, index) -> value; the index wraps around
fn fn_element(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let list = args[0].as_list().map(Vec::as_slice).unwrap_or_default();
    if list.is_empty() {
        return Err(call.fail("cannot use element function with an empty list"));
    }
    let index = args[1]
        .as_int()
        .filter(|i| *i >= 0)
        .ok_or_else(|| call.fail("index must be a non-negative whole number"))?;
    Ok(list[(index as usize) % list.len()].clone())
}

/// tostring(value) -> string (null stays null)
fn fn_tostring(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        v if v.is_primitive() => Ok(Value::String(v.to_string())),
        other => Err(call.fail(format!("cannot convert {} to string", other.type_name()))),
    }
}

/// tonumber(value) -> number (null stays null)
fn fn_tonumber(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        v @ (Value::Int(_) | Value::Float(_)) => Ok(v.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                Ok(Value::Int(n))
            } else {
                s.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| call.fail(format!("cannot convert \"{}\" to number", s)))
            }
        }
        other => Err(call.fail(format!("cannot convert {} to number", other.type_name()))),
    }
}

/// tobool(value) -> bool (null stays null)
fn fn_tobool(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) if s == "true" => Ok(Value::Bool(true)),
        Value::String(s) if s == "false" => Ok(Value::Bool(false)),
        other => Err(call.fail(format!("cannot convert {} to bool", other))),
    }
}

fn fn_upper(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    Ok(Value::String(string_arg(&args, 0).to_uppercase()))
}

fn fn_lower(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    Ok(Value::String(string_arg(&args, 0).to_lowercase()))
}

fn fn_trimspace(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    Ok(Value::String(string_arg(&args, 0).trim().to_string()))
}

/// split(separator, string) -> [string]
fn fn_split(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let separator = string_arg(&args, 0);
    let text = string_arg(&args, 1);
    if text.is_empty() {
        return Ok(Value::List(vec![]));
    }
    Ok(Value::List(
        text.split(separator)
            .map(|p| Value::String(p.to_string()))
            .collect(),
    ))
}

/// join(separator, list) -> string
fn fn_join(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let separator = string_arg(&args, 0);
    let mut parts = Vec::new();
    for item in args[1].as_list().into_iter().flatten() {
        match item.to_template_string() {
            Some(s) if item.is_primitive() && !item.is_null() => parts.push(s),
            _ => {
                return Err(call.fail(format!(
                    "list elements must be strings, found {}",
                    item.type_name()
                )))
            }
        }
    }
    Ok(Value::String(parts.join(separator)))
}

/// replace(string, search, replacement); a search wrapped in slashes is a
/// regular expression
fn fn_replace(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let text = string_arg(&args, 0);
    let search = string_arg(&args, 1);
    let replacement = string_arg(&args, 2);

    if search.len() > 1 && search.starts_with('/') && search.ends_with('/') {
        let pattern = &search[1..search.len() - 1];
        let re = Regex::new(pattern)
            .map_err(|e| call.fail(format!("invalid regular expression: {}", e)))?;
        return Ok(Value::String(re.replace_all(text, replacement).into_owned()));
    }
    Ok(Value::String(text.replace(search, replacement)))
}

/// format(template, values...) supporting %s, %d, %v and %%
fn fn_format(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let template = string_arg(&args, 0);
    let mut values = args[1..].iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let verb = chars
            .next()
            .ok_or_else(|| call.fail("format string ends with an unfinished verb"))?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let value = values
            .next()
            .ok_or_else(|| call.fail(format!("not enough arguments for %{}", verb)))?;
        match verb {
            's' => match value.to_template_string() {
                Some(s) if value.is_primitive() => out.push_str(&s),
                _ => return Err(call.fail(format!("%s cannot format a {}", value.type_name()))),
            },
            'd' => {
                let n = value
                    .as_int()
                    .ok_or_else(|| call.fail(format!("%d requires a whole number, found {}", value)))?;
                out.push_str(&n.to_string());
            }
            'v' => out.push_str(&value.to_string()),
            other => return Err(call.fail(format!("unsupported format verb %{}", other))),
        }
    }

    if values.next().is_some() {
        return Err(call.fail("too many arguments for the format string"));
    }
    Ok(Value::String(out))
}

fn fn_base64encode(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(string_arg(&args, 0).as_bytes());
    Ok(Value::String(encoded))
}

fn fn_base64decode(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(string_arg(&args, 0).as_bytes())
        .map_err(|e| call.fail(format!("invalid base64 data: {}", e)))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| call.fail("decoded data is not valid UTF-8"))
}

fn fn_jsonencode(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    serde_json::to_string(&args[0].to_serde_json())
        .map(Value::String)
        .map_err(|e| call.fail(e.to_string()))
}

fn fn_jsondecode(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let json: serde_json::Value = serde_json::from_str(string_arg(&args, 0))
        .map_err(|e| call.fail(format!("invalid JSON: {}", e)))?;
    Ok(Value::from_serde_json(json))
}

fn fn_yamlencode(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    serde_yaml::to_string(&args[0].to_serde_json())
        .map(Value::String)
        .map_err(|e| call.fail(e.to_string()))
}

fn fn_yamldecode(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(string_arg(&args, 0))
        .map_err(|e| call.fail(format!("invalid YAML: {}", e)))?;
    Ok(Value::from_serde_yaml(yaml))
}

/// abspath(path), relative paths resolved against the current file's directory
fn fn_abspath(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let resolved = paths::resolve_against(&paths::absolute(call.dir()), string_arg(&args, 0));
    Ok(Value::String(paths::to_slash(&resolved)))
}

fn fn_basename(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let path = std::path::Path::new(string_arg(&args, 0));
    Ok(Value::String(
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string()),
    ))
}

fn fn_dirname(_call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let path = std::path::Path::new(string_arg(&args, 0));
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(paths::to_slash)
        .unwrap_or_else(|| ".".to_string());
    Ok(Value::String(parent))
}

/// file(path) -> string, relative paths resolved against the current file
fn fn_file(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let path = paths::resolve_against(call.dir(), string_arg(&args, 0));
    std::fs::read_to_string(&path)
        .map(Value::String)
        .map_err(|e| call.fail(format!("failed to read {}: {}", path.display(), e)))
}
