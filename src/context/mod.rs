//! Evaluation environment for one configuration file
//!
//! An [`EvalContext`] carries the root variables visible to expressions
//! (`local`, `dependency`), the function registry, the engine options and
//! the per-run state shared by every file evaluated in the same run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::cache::{CacheKey, RunCache};
use crate::errors::EngineResult;
use crate::evaluator::{self, Value};
use crate::functions::FunctionRegistry;
use crate::options::EngineOptions;
use crate::parser::ast::Expr;

/// How deeply `read_terragrunt_config` may nest before giving up
pub const MAX_READ_DEPTH: usize = 32;

/// State shared by every evaluation in one top-level run
///
/// Nothing here is invalidated during the run; a new run starts with a new
/// `RunContext`.
#[derive(Default)]
pub struct RunContext {
    /// Decoded outputs per dependency target config path
    pub outputs: RunCache<PathBuf, Value>,
    /// `run_cmd` stdout keyed by working directory + arguments
    pub commands: RunCache<CacheKey, String>,
    /// Checkout directories of fetched remote sources keyed by locator
    pub downloads: RunCache<CacheKey, PathBuf>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Variables and functions for evaluating expressions in one file
#[derive(Clone)]
pub struct EvalContext {
    file: PathBuf,
    variables: IndexMap<String, Value>,
    functions: Arc<FunctionRegistry>,
    options: Arc<EngineOptions>,
    run: Arc<RunContext>,
    include: Option<PathBuf>,
    read_depth: usize,
}

impl EvalContext {
    /// Context for the options' config file, with an empty `local` map
    pub fn new(options: Arc<EngineOptions>, run: Arc<RunContext>) -> Self {
        let mut variables = IndexMap::new();
        variables.insert("local".to_string(), Value::empty_map());
        Self {
            file: options.config_path.clone(),
            variables,
            functions: Arc::new(FunctionRegistry::standard()),
            options,
            run,
            include: None,
            read_depth: 0,
        }
    }

    /// A fresh context for another file read from this one. Options, run
    /// state and functions are shared; variables are not.
    pub fn for_file(&self, file: impl Into<PathBuf>) -> Self {
        let mut variables = IndexMap::new();
        variables.insert("local".to_string(), Value::empty_map());
        Self {
            file: file.into(),
            variables,
            functions: Arc::clone(&self.functions),
            options: Arc::clone(&self.options),
            run: Arc::clone(&self.run),
            include: None,
            read_depth: self.read_depth + 1,
        }
    }

    /// Expose evaluated locals as `local.*`
    pub fn with_locals(mut self, locals: IndexMap<String, Value>) -> Self {
        self.variables.insert("local".to_string(), Value::Map(locals));
        self
    }

    /// Expose resolved dependencies as `dependency.<label>.*`
    pub fn with_dependencies(mut self, dependencies: IndexMap<String, Value>) -> Self {
        self.variables
            .insert("dependency".to_string(), Value::Map(dependencies));
        self
    }

    /// Mark this file as included from `included`
    pub fn with_include(mut self, included: impl Into<PathBuf>) -> Self {
        self.include = Some(included.into());
        self
    }

    /// Define an extra root variable
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variables(&self) -> &IndexMap<String, Value> {
        &self.variables
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Directory of the file being evaluated
    pub fn dir(&self) -> &Path {
        match self.file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    pub fn include(&self) -> Option<&Path> {
        self.include.as_deref()
    }

    pub fn read_depth(&self) -> usize {
        self.read_depth
    }

    pub fn options(&self) -> &Arc<EngineOptions> {
        &self.options
    }

    pub fn run(&self) -> &Arc<RunContext> {
        &self.run
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Evaluate an expression from this file; `source` is the file text,
    /// used for diagnostics
    pub fn evaluate(&self, expr: &Expr, source: &str) -> EngineResult<Value> {
        evaluator::evaluate(expr, self, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn context() -> EvalContext {
        EvalContext::new(
            Arc::new(EngineOptions::new("/live/app/terragrunt.hcl")),
            Arc::new(RunContext::new()),
        )
    }

    #[test]
    fn test_local_always_defined() {
        let ctx = context();
        assert_eq!(ctx.variables().get("local"), Some(&Value::empty_map()));
        assert!(ctx.variables().get("dependency").is_none());
    }

    #[test]
    fn test_with_locals_visible_to_expressions() {
        let mut locals = IndexMap::new();
        locals.insert("region".to_string(), Value::from("us-east-1"));
        let ctx = context().with_locals(locals);

        let file = parse("x = \"eu-${local.region}\"\n", "/live/app/terragrunt.hcl").unwrap();
        let expr = &file.ast.body.attribute("x").unwrap().value;
        assert_eq!(
            ctx.evaluate(expr, &file.source).unwrap(),
            Value::from("eu-us-east-1")
        );
    }

    #[test]
    fn test_for_file_shares_run_state() {
        let ctx = context();
        let child = ctx.for_file("/live/common.hcl");
        assert!(Arc::ptr_eq(ctx.run(), child.run()));
        assert_eq!(child.dir(), Path::new("/live"));
        assert_eq!(child.read_depth(), 1);
    }
}
