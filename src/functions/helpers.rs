//! Host-tool helpers: filesystem lookups, environment, external commands
//! and reading other configuration files

use std::path::{Path, PathBuf};

use super::{string_arg, FunctionCall, FunctionDef, FunctionRegistry};
use crate::cache::CacheKey;
use crate::config;
use crate::context::MAX_READ_DEPTH;
use crate::errors::{EngineError, EngineResult};
use crate::evaluator::Value;
use crate::options::DEFAULT_CONFIG_NAME;
use crate::paths;
use crate::shell;

use super::ParamType as P;

/// Commands that accept `-var` / `-var-file`
pub const TERRAFORM_COMMANDS_NEED_VARS: &[&str] = &[
    "apply", "console", "destroy", "import", "plan", "push", "refresh",
];

/// Commands that accept `-input`
pub const TERRAFORM_COMMANDS_NEED_INPUT: &[&str] = &["apply", "import", "init", "plan", "refresh"];

/// Commands that accept `-lock-timeout`
pub const TERRAFORM_COMMANDS_NEED_LOCKING: &[&str] = &[
    "apply", "destroy", "import", "plan", "refresh", "taint", "untaint",
];

/// Commands that accept `-parallelism`
pub const TERRAFORM_COMMANDS_NEED_PARALLELISM: &[&str] = &["apply", "plan", "destroy"];

/// Leading `run_cmd` argument that keeps the command's output out of logs
const QUIET_FLAG: &str = "--terragrunt-quiet";

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.insert(
        "find_in_parent_folders",
        FunctionDef::with_optional(&[], &[P::String, P::Any], fn_find_in_parent_folders),
    );
    registry.insert(
        "path_relative_to_include",
        FunctionDef::fixed(&[], fn_path_relative_to_include),
    );
    registry.insert(
        "path_relative_from_include",
        FunctionDef::fixed(&[], fn_path_relative_from_include),
    );
    registry.insert(
        "get_env",
        FunctionDef::with_optional(&[P::String], &[P::String], fn_get_env),
    );
    registry.insert(
        "run_cmd",
        FunctionDef::variadic(&[P::String], P::String, fn_run_cmd),
    );
    registry.insert(
        "read_terragrunt_config",
        FunctionDef::with_optional(&[P::String], &[P::Any], fn_read_terragrunt_config),
    );
    registry.insert("get_terragrunt_dir", FunctionDef::fixed(&[], fn_get_terragrunt_dir));
    registry.insert(
        "get_original_terragrunt_dir",
        FunctionDef::fixed(&[], fn_get_original_terragrunt_dir),
    );
    registry.insert(
        "get_parent_terragrunt_dir",
        FunctionDef::fixed(&[], fn_get_parent_terragrunt_dir),
    );
    registry.insert("get_platform", FunctionDef::fixed(&[], fn_get_platform));
    registry.insert("get_repo_root", FunctionDef::fixed(&[], fn_get_repo_root));
    registry.insert(
        "get_path_to_repo_root",
        FunctionDef::fixed(&[], fn_get_path_to_repo_root),
    );
    registry.insert(
        "get_path_from_repo_root",
        FunctionDef::fixed(&[], fn_get_path_from_repo_root),
    );
    registry.insert(
        "get_terraform_command",
        FunctionDef::fixed(&[], fn_get_terraform_command),
    );
    registry.insert(
        "get_terraform_cli_args",
        FunctionDef::fixed(&[], fn_get_terraform_cli_args),
    );
    registry.insert("get_working_dir", FunctionDef::fixed(&[], fn_get_working_dir));
    registry.insert("get_aws_account_id", FunctionDef::fixed(&[], fn_get_aws_account_id));
    registry.insert(
        "get_aws_caller_identity_arn",
        FunctionDef::fixed(&[], fn_get_aws_caller_identity_arn),
    );
    registry.insert(
        "get_aws_caller_identity_user_id",
        FunctionDef::fixed(&[], fn_get_aws_caller_identity_user_id),
    );
    registry.insert(
        "get_terraform_commands_that_need_vars",
        FunctionDef::fixed(&[], |_, _| Ok(static_list(TERRAFORM_COMMANDS_NEED_VARS))),
    );
    registry.insert(
        "get_terraform_commands_that_need_input",
        FunctionDef::fixed(&[], |_, _| Ok(static_list(TERRAFORM_COMMANDS_NEED_INPUT))),
    );
    registry.insert(
        "get_terraform_commands_that_need_locking",
        FunctionDef::fixed(&[], |_, _| Ok(static_list(TERRAFORM_COMMANDS_NEED_LOCKING))),
    );
    registry.insert(
        "get_terraform_commands_that_need_parallelism",
        FunctionDef::fixed(&[], |_, _| {
            Ok(static_list(TERRAFORM_COMMANDS_NEED_PARALLELISM))
        }),
    );
}

fn static_list(items: &[&str]) -> Value {
    Value::List(items.iter().map(|s| Value::from(*s)).collect())
}

fn path_value(path: &Path) -> Value {
    Value::String(paths::to_slash(path))
}

/// find_in_parent_folders(name?, fallback?)
///
/// Searches the parent directories of the current file, nearest first, for
/// at most `max_folders_to_check` levels.
fn fn_find_in_parent_folders(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let name = match args.first() {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => DEFAULT_CONFIG_NAME.to_string(),
    };
    let fallback = args.get(1).cloned();
    let max_folders = call.ctx.options().max_folders_to_check;
    let start = paths::absolute(call.dir());

    match find_in_parent_folders(&start, &name, max_folders) {
        Some(found) => Ok(path_value(&found)),
        None => match fallback {
            Some(value) => Ok(value),
            None => Err(EngineError::FileNotFound {
                name,
                start: start.display().to_string(),
                max_folders,
            }),
        },
    }
}

/// Walk upward from `start` (exclusive) looking for `name`
pub fn find_in_parent_folders(start: &Path, name: &str, max_folders: usize) -> Option<PathBuf> {
    let mut previous = start.to_path_buf();
    for _ in 0..max_folders {
        let current = previous.parent()?.to_path_buf();
        let candidate = current.join(name);
        tracing::trace!(candidate = %candidate.display(), "searching parent folder");
        if candidate.exists() {
            return Some(candidate);
        }
        previous = current;
    }
    None
}

fn fn_path_relative_to_include(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    let Some(included) = call.ctx.include() else {
        return Ok(Value::from("."));
    };
    let included_dir = included.parent().unwrap_or(Path::new("/"));
    Ok(path_value(&paths::relative_path(
        &paths::absolute(included_dir),
        &paths::absolute(call.dir()),
    )))
}

fn fn_path_relative_from_include(
    call: &FunctionCall<'_>,
    _args: Vec<Value>,
) -> EngineResult<Value> {
    let Some(included) = call.ctx.include() else {
        return Ok(Value::from("."));
    };
    let included_dir = included.parent().unwrap_or(Path::new("/"));
    Ok(path_value(&paths::relative_path(
        &paths::absolute(call.dir()),
        &paths::absolute(included_dir),
    )))
}

/// get_env(name, default?) reads the options' environment snapshot
fn fn_get_env(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let name = string_arg(&args, 0);
    if name.is_empty() {
        return Err(call.fail("environment variable name must not be empty"));
    }
    if let Some(value) = call.ctx.options().env.get(name) {
        return Ok(Value::String(value.clone()));
    }
    match args.get(1) {
        Some(default) => Ok(default.clone()),
        None => Err(call.fail(format!(
            "environment variable '{}' is not set and no default was given",
            name
        ))),
    }
}

/// run_cmd([--terragrunt-quiet,] command, args...) -> stdout
fn fn_run_cmd(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let mut argv: Vec<String> = args
        .iter()
        .filter_map(|a| a.as_str().map(str::to_string))
        .collect();

    let quiet = argv.first().map(String::as_str) == Some(QUIET_FLAG);
    if quiet {
        argv.remove(0);
    }
    if argv.is_empty() {
        return Err(call.fail("no command given"));
    }

    let output = run_cached(call, &argv)?;
    if quiet {
        tracing::info!(command = %argv[0], "run_cmd output: [REDACTED]");
    } else {
        tracing::info!(command = %shell::render_command(&argv[0], &argv[1..]), output = %output, "run_cmd output");
    }
    Ok(Value::String(output))
}

/// Run a command in the current file's directory, at most once per run for
/// each directory + argument combination
fn run_cached(call: &FunctionCall<'_>, argv: &[String]) -> EngineResult<String> {
    let dir = paths::absolute(call.dir());
    let mut key_parts = vec![dir.display().to_string()];
    key_parts.extend(argv.iter().cloned());
    let key = CacheKey::compute(&key_parts);

    let options = call.ctx.options();
    call.ctx.run().commands.get_or_try_insert_with(key, || {
        let output = shell::run_command(&argv[0], &argv[1..], &dir, &options.env, &options.cancel)
            .map_err(|err| command_error(call, err))?;
        let stdout = output.stdout;
        let trimmed = stdout
            .strip_suffix("\r\n")
            .or_else(|| stdout.strip_suffix('\n'))
            .unwrap_or(&stdout);
        Ok(trimmed.to_string())
    })
}

/// Report a failed command at the call site; cancellation passes through
fn command_error(call: &FunctionCall<'_>, err: EngineError) -> EngineError {
    match &err {
        EngineError::Cancelled => err,
        EngineError::CommandFailed { stderr, .. } if !stderr.is_empty() => {
            call.fail(format!("{}: {}", err, stderr))
        }
        _ => call.fail(err.to_string()),
    }
}

/// read_terragrunt_config(path, default?)
fn fn_read_terragrunt_config(call: &FunctionCall<'_>, args: Vec<Value>) -> EngineResult<Value> {
    let path = paths::resolve_against(call.dir(), string_arg(&args, 0));
    if !path.is_file() {
        return match args.get(1) {
            Some(default) => Ok(default.clone()),
            None => Err(call.fail(format!("{} does not exist", path.display()))),
        };
    }
    if call.ctx.read_depth() >= MAX_READ_DEPTH {
        return Err(call.fail(format!(
            "configs read each other more than {} levels deep at {}",
            MAX_READ_DEPTH,
            path.display()
        )));
    }
    config::read_config(&path, call.ctx)
}

fn fn_get_terragrunt_dir(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    Ok(path_value(&paths::absolute(call.dir())))
}

fn fn_get_original_terragrunt_dir(
    call: &FunctionCall<'_>,
    _args: Vec<Value>,
) -> EngineResult<Value> {
    let original = &call.ctx.options().original_config_path;
    let dir = original.parent().unwrap_or(Path::new("."));
    Ok(path_value(&paths::absolute(dir)))
}

fn fn_get_parent_terragrunt_dir(
    call: &FunctionCall<'_>,
    _args: Vec<Value>,
) -> EngineResult<Value> {
    let dir = match call.ctx.include() {
        Some(included) => included.parent().unwrap_or(Path::new(".")).to_path_buf(),
        None => call.dir().to_path_buf(),
    };
    Ok(path_value(&paths::absolute(&dir)))
}

fn fn_get_platform(_call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    Ok(Value::from(os))
}

fn repo_root(call: &FunctionCall<'_>) -> EngineResult<PathBuf> {
    let argv = ["git", "rev-parse", "--show-toplevel"].map(String::from);
    let root = run_cached(call, &argv)?;
    Ok(PathBuf::from(root.trim()))
}

fn fn_get_repo_root(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    Ok(path_value(&repo_root(call)?))
}

fn fn_get_path_to_repo_root(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    let root = repo_root(call)?;
    Ok(path_value(&paths::relative_path(
        &paths::absolute(call.dir()),
        &root,
    )))
}

fn fn_get_path_from_repo_root(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    let root = repo_root(call)?;
    Ok(path_value(&paths::relative_path(
        &root,
        &paths::absolute(call.dir()),
    )))
}

fn fn_get_terraform_command(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    Ok(Value::String(call.ctx.options().terraform_command.clone()))
}

fn fn_get_terraform_cli_args(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    Ok(Value::List(
        call.ctx
            .options()
            .terraform_cli_args
            .iter()
            .map(|a| Value::String(a.clone()))
            .collect(),
    ))
}

fn fn_get_working_dir(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    Ok(path_value(&paths::absolute(&call.ctx.options().working_dir)))
}

/// One field of the ambient AWS caller identity
fn caller_identity_field(call: &FunctionCall<'_>, field: &str) -> EngineResult<Value> {
    let argv = ["aws", "sts", "get-caller-identity", "--output", "json"].map(String::from);
    let raw = run_cached(call, &argv)?;
    let identity: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| call.fail(format!("unexpected caller identity output: {}", e)))?;
    identity
        .get(field)
        .and_then(|v| v.as_str())
        .map(Value::from)
        .ok_or_else(|| call.fail(format!("caller identity has no {} field", field)))
}

fn fn_get_aws_account_id(call: &FunctionCall<'_>, _args: Vec<Value>) -> EngineResult<Value> {
    caller_identity_field(call, "Account")
}

fn fn_get_aws_caller_identity_arn(
    call: &FunctionCall<'_>,
    _args: Vec<Value>,
) -> EngineResult<Value> {
    caller_identity_field(call, "Arn")
}

fn fn_get_aws_caller_identity_user_id(
    call: &FunctionCall<'_>,
    _args: Vec<Value>,
) -> EngineResult<Value> {
    caller_identity_field(call, "UserId")
}
