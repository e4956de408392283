//! Integration tests for configuration evaluation
//!
//! These tests write configuration trees into temporary directories and
//! evaluate them through the public API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use groundwork::{
    render, EngineError, EngineOptions, EvalContext, RunContext, Value,
};
use pretty_assertions::assert_eq;

fn write(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, content).expect("write file");
    path.to_path_buf()
}

fn context(config: &Path, options: impl FnOnce(&mut EngineOptions)) -> EvalContext {
    let mut opts = EngineOptions::new(config);
    options(&mut opts);
    EvalContext::new(Arc::new(opts), Arc::new(RunContext::new()))
}

fn render_file(config: &Path) -> Result<Value, EngineError> {
    render(&context(config, |_| {}))
}

fn local<'a>(value: &'a Value, name: &str) -> &'a Value {
    value
        .get_path(&["locals", name])
        .unwrap_or_else(|| panic!("local '{}' missing from {:?}", name, value))
}

#[test]
fn test_locals_interpolation() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        &dir.path().join("terragrunt.hcl"),
        r#"
locals {
  s3_url = "com.amazonaws.${local.region}.s3"
  region = "us-east-1"
}
"#,
    );

    let value = render_file(&config).unwrap();
    assert_eq!(local(&value, "region"), &Value::from("us-east-1"));
    assert_eq!(
        local(&value, "s3_url"),
        &Value::from("com.amazonaws.us-east-1.s3")
    );
}

#[test]
fn test_locals_ten_deep_chain() {
    let dir = tempfile::tempdir().unwrap();
    // Declared in reverse so every pass resolves exactly one more local
    let config = write(
        &dir.path().join("terragrunt.hcl"),
        r#"
locals {
  j = "${local.i}/j"
  i = "${local.h}/i"
  h = "${local.g}/h"
  g = "${local.f}/g"
  f = "${local.e}/f"
  e = "${local.d}/e"
  d = "${local.c}/d"
  c = "${local.b}/c"
  b = "${local.a}/b"
  a = "a"
}
"#,
    );

    let value = render_file(&config).unwrap();
    assert_eq!(local(&value, "j"), &Value::from("a/b/c/d/e/f/g/h/i/j"));
}

#[test]
fn test_locals_cycle_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        &dir.path().join("terragrunt.hcl"),
        "locals {\n  a = local.b\n  b = local.a\n}\n",
    );

    match render_file(&config) {
        Err(EngineError::LocalsConvergence { unresolved, .. }) => {
            assert_eq!(unresolved, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected a convergence error, got {:?}", other),
    }
}

#[test]
fn test_two_locals_blocks_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        &dir.path().join("terragrunt.hcl"),
        "locals {\n  a = 1\n}\n\nlocals {\n  b = 2\n}\n",
    );

    assert!(matches!(
        render_file(&config),
        Err(EngineError::MultipleLocalsBlocks { count: 2, .. })
    ));
}

#[test]
fn test_no_locals_block() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(&dir.path().join("terragrunt.hcl"), "name = \"app\"\n");

    let value = render_file(&config).unwrap();
    assert_eq!(value.get_path(&["locals"]), Some(&Value::empty_map()));
    assert_eq!(value.get_path(&["name"]), Some(&Value::from("app")));
}

#[test]
fn test_find_in_parent_folders() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("root.hcl"), "");
    let config = write(
        &dir.path().join("envs/prod/app/terragrunt.hcl"),
        "root = find_in_parent_folders(\"root.hcl\")\n",
    );

    let value = render_file(&config).unwrap();
    let expected = groundwork::paths::to_slash(&dir.path().join("root.hcl"));
    assert_eq!(value.get_path(&["root"]), Some(&Value::String(expected)));
}

#[test]
fn test_find_in_parent_folders_bounded() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("root.hcl"), "");
    let config = write(
        &dir.path().join("envs/prod/app/terragrunt.hcl"),
        "root = find_in_parent_folders(\"root.hcl\")\n",
    );

    // root.hcl is three folders up, only two are searched
    let result = render(&context(&config, |o| o.max_folders_to_check = 2));
    match result {
        Err(EngineError::FileNotFound { name, max_folders, .. }) => {
            assert_eq!(name, "root.hcl");
            assert_eq!(max_folders, 2);
        }
        other => panic!("expected a not-found error, got {:?}", other),
    }
}

#[test]
fn test_paths_relative_to_include() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir.path().join("live/root.hcl"), "");
    let config = write(
        &dir.path().join("live/prod/app/terragrunt.hcl"),
        r#"
include "root" {
  path = find_in_parent_folders("root.hcl")
}

locals {
  key = "${path_relative_to_include()}/terraform.tfstate"
}

to_include   = path_relative_to_include()
from_include = path_relative_from_include()
parent_dir   = get_parent_terragrunt_dir()
"#,
    );

    let value = render_file(&config).unwrap();
    assert_eq!(value.get_path(&["to_include"]), Some(&Value::from("prod/app")));
    assert_eq!(value.get_path(&["from_include"]), Some(&Value::from("../..")));
    assert_eq!(local(&value, "key"), &Value::from("prod/app/terraform.tfstate"));
    let live = groundwork::paths::to_slash(&dir.path().join("live"));
    assert_eq!(value.get_path(&["parent_dir"]), Some(&Value::String(live)));
}

#[test]
fn test_paths_relative_without_include() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        &dir.path().join("app/terragrunt.hcl"),
        "to_include = path_relative_to_include()\nfrom_include = path_relative_from_include()\n",
    );

    let value = render_file(&config).unwrap();
    assert_eq!(value.get_path(&["to_include"]), Some(&Value::from(".")));
    assert_eq!(value.get_path(&["from_include"]), Some(&Value::from(".")));
}

#[test]
fn test_read_terragrunt_config() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("common.hcl"),
        r#"
locals {
  team = "platform"
}

tags = {
  team = local.team
}
"#,
    );
    let config = write(
        &dir.path().join("app/terragrunt.hcl"),
        r#"
locals {
  common = read_terragrunt_config("../common.hcl")
  team   = local.common.locals.team
}

owner = local.team
tags  = local.common.tags
"#,
    );

    let value = render_file(&config).unwrap();
    assert_eq!(value.get_path(&["owner"]), Some(&Value::from("platform")));
    assert_eq!(
        value.get_path(&["tags", "team"]),
        Some(&Value::from("platform"))
    );
}

#[test]
fn test_get_env_uses_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        &dir.path().join("terragrunt.hcl"),
        r#"
region  = get_env("GROUNDWORK_TEST_REGION")
account = get_env("GROUNDWORK_TEST_UNSET", "none")
"#,
    );

    let ctx = context(&config, |o| {
        o.env.clear();
        o.env
            .insert("GROUNDWORK_TEST_REGION".to_string(), "eu-west-1".to_string());
    });
    let value = render(&ctx).unwrap();
    assert_eq!(value.get_path(&["region"]), Some(&Value::from("eu-west-1")));
    assert_eq!(value.get_path(&["account"]), Some(&Value::from("none")));
}

#[test]
fn test_dependency_not_found_never_invokes_tool() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("invoked");
    let config = write(
        &dir.path().join("app/terragrunt.hcl"),
        r#"
dependency "vpc" {
  config_path = "../vpc"
}
"#,
    );

    // The tool would create the marker file if it ever ran
    let tool = format!("/bin/sh -c 'touch {}'", marker.display());
    let result = render(&context(&config, |o| o.terraform_path = tool));

    match result {
        Err(EngineError::DependencyNotFound { label, .. }) => assert_eq!(label, "vpc"),
        other => panic!("expected a not-found error, got {:?}", other),
    }
    assert!(!marker.exists());
}

#[cfg(unix)]
mod fake_tool {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A script standing in for the provisioning tool. Every invocation
    /// appends its working directory to `calls`.
    pub fn install(dir: &Path, stdout: &str) -> (PathBuf, PathBuf) {
        let calls = dir.join("calls.log");
        let script = dir.join("fake-tool.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$(pwd) $*\" >> '{}'\ncat <<'EOF'\n{}\nEOF\n",
                calls.display(),
                stdout
            ),
        )
        .unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        (script, calls)
    }

    pub fn call_count(calls: &Path) -> usize {
        std::fs::read_to_string(calls)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

#[cfg(unix)]
const VPC_OUTPUTS: &str = r#"{
  "vpc_id": {"sensitive": false, "type": "string", "value": "vpc-123"},
  "subnets": {"sensitive": false, "type": ["list", "string"], "value": ["a", "b"]},
  "zones": {"sensitive": false, "type": ["map", "number"], "value": {"a": 1}}
}"#;

#[cfg(unix)]
#[test]
fn test_dependency_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let (tool, calls) = fake_tool::install(dir.path(), VPC_OUTPUTS);
    write(&dir.path().join("vpc/terragrunt.hcl"), "");
    let config = write(
        &dir.path().join("app/terragrunt.hcl"),
        r#"
dependency "vpc" {
  config_path = "../vpc"
}

inputs = {
  vpc_id = dependency.vpc.outputs.vpc_id
  subnet = dependency.vpc.outputs.subnets[1]
}
"#,
    );

    let ctx = context(&config, |o| o.terraform_path = tool.display().to_string());
    let value = render(&ctx).unwrap();

    assert_eq!(
        value.get_path(&["inputs", "vpc_id"]),
        Some(&Value::from("vpc-123"))
    );
    assert_eq!(value.get_path(&["inputs", "subnet"]), Some(&Value::from("b")));
    assert_eq!(
        value.get_path(&["dependency", "vpc", "outputs", "zones", "a"]),
        Some(&Value::Int(1))
    );

    let log = std::fs::read_to_string(&calls).unwrap();
    assert!(log.contains("output -json"), "unexpected invocation: {}", log);
    assert!(log.trim_end().ends_with("output -json"));
    assert!(log.contains("/vpc output"), "ran in the wrong directory: {}", log);
}

#[cfg(unix)]
#[test]
fn test_dependency_outputs_cached_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let (tool, calls) = fake_tool::install(dir.path(), VPC_OUTPUTS);
    write(&dir.path().join("vpc/terragrunt.hcl"), "");
    let app = write(
        &dir.path().join("app/terragrunt.hcl"),
        r#"
dependency "network" {
  config_path = "../vpc"
}

dependency "vpc" {
  config_path = "../vpc/terragrunt.hcl"
}

vpc_id = dependency.vpc.outputs.vpc_id
"#,
    );
    let db = write(
        &dir.path().join("db/terragrunt.hcl"),
        "dependency \"vpc\" {\n  config_path = \"../vpc\"\n}\n",
    );

    let ctx = context(&app, |o| o.terraform_path = tool.display().to_string());
    render(&ctx).unwrap();
    assert_eq!(fake_tool::call_count(&calls), 1);

    // Another file in the same run reuses the outputs
    render(&ctx.for_file(&db)).unwrap();
    assert_eq!(fake_tool::call_count(&calls), 1);
    assert_eq!(ctx.run().outputs.stats().hits, 2);

    // A new run queries the tool again
    let fresh = context(&db, |o| o.terraform_path = tool.display().to_string());
    render(&fresh).unwrap();
    assert_eq!(fake_tool::call_count(&calls), 2);
}

#[cfg(unix)]
#[test]
fn test_dependency_malformed_output() {
    let dir = tempfile::tempdir().unwrap();
    let (tool, _) = fake_tool::install(dir.path(), "not json");
    write(&dir.path().join("vpc/terragrunt.hcl"), "");
    let config = write(
        &dir.path().join("app/terragrunt.hcl"),
        "dependency \"vpc\" {\n  config_path = \"../vpc\"\n}\n",
    );

    let result = render(&context(&config, |o| o.terraform_path = tool.display().to_string()));
    match result {
        Err(EngineError::DependencyParse { path, .. }) => assert!(path.contains("vpc")),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_run_cmd_cached() {
    let dir = tempfile::tempdir().unwrap();
    let (tool, calls) = fake_tool::install(dir.path(), "hello");
    let config = write(
        &dir.path().join("terragrunt.hcl"),
        &format!(
            r#"
locals {{
  first  = run_cmd("{tool}", "greet")
  second = run_cmd("--terragrunt-quiet", "{tool}", "greet")
}}
"#,
            tool = tool.display()
        ),
    );

    let value = render_file(&config).unwrap();
    assert_eq!(local(&value, "first"), &Value::from("hello"));
    assert_eq!(local(&value, "second"), &Value::from("hello"));
    assert_eq!(fake_tool::call_count(&calls), 1);
}

#[cfg(unix)]
#[test]
fn test_run_cmd_failure_reported_at_call() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        &dir.path().join("terragrunt.hcl"),
        "out = run_cmd(\"/bin/sh\", \"-c\", \"echo denied >&2; exit 3\")\n",
    );

    match render_file(&config) {
        Err(EngineError::FunctionFailed { function, message, .. }) => {
            assert_eq!(function, "run_cmd");
            assert!(message.contains("exited with status 3"), "{}", message);
            assert!(message.contains("denied"), "{}", message);
        }
        other => panic!("expected a function error, got {:?}", other),
    }
}
