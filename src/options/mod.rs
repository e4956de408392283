//! Engine settings
//!
//! [`EngineOptions`] is a plain cloneable value. Each evaluation gets its
//! own copy; dependency resolution derives a copy re-pointed at the
//! target unit via [`EngineOptions::clone_for_target`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::concurrency::CancellationToken;
use crate::errors::{EngineError, EngineResult};

/// Conventional name of a unit's configuration file
pub const DEFAULT_CONFIG_NAME: &str = "terragrunt.hcl";

/// Default upper bound on upward directory searches
pub const DEFAULT_MAX_FOLDERS_TO_CHECK: usize = 100;

/// Environment variable overriding the provisioning tool binary
pub const ENV_TF_PATH: &str = "GROUNDWORK_TF_PATH";
/// Environment variable overriding the worker pool size
pub const ENV_PARALLELISM: &str = "GROUNDWORK_PARALLELISM";
/// Environment variable overriding the upward search bound
pub const ENV_MAX_FOLDERS: &str = "GROUNDWORK_MAX_FOLDERS";

/// One source rewrite rule: every match of `pattern` in a declared source
/// is replaced by `replacement` (regex capture references allowed)
#[derive(Debug, Clone)]
pub struct SourceMapRule {
    pub pattern: Regex,
    pub replacement: String,
}

impl SourceMapRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> EngineResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            EngineError::invalid_declaration(format!("invalid source map pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }
}

/// Apply source map rules in order
pub fn apply_source_map(source: &str, rules: &[SourceMapRule]) -> String {
    rules.iter().fold(source.to_string(), |acc, rule| {
        rule.pattern
            .replace_all(&acc, rule.replacement.as_str())
            .into_owned()
    })
}

/// Settings shared by all engine components
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Configuration file being evaluated
    pub config_path: PathBuf,
    /// Directory commands run in
    pub working_dir: PathBuf,
    /// Configuration file the whole run started from
    pub original_config_path: PathBuf,
    /// Provisioning tool binary
    pub terraform_path: String,
    /// Tool sub-command being run (`plan`, `apply`, `output`, ...)
    pub terraform_command: String,
    /// Full argument list passed to the tool
    pub terraform_cli_args: Vec<String>,
    /// Worker pool size for stack generation
    pub parallelism: usize,
    /// Upper bound for `find_in_parent_folders`
    pub max_folders_to_check: usize,
    /// Rewrites applied to unit and stack sources
    pub source_map: Vec<SourceMapRule>,
    /// Environment snapshot visible to `get_env` and subprocesses
    pub env: HashMap<String, String>,
    /// Whether the tool is asked for machine-readable output
    pub output_json: bool,
    pub cancel: CancellationToken,
}

impl EngineOptions {
    /// Default options for evaluating `config_path`, with an environment
    /// snapshot taken from the current process
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let working_dir = parent_dir(&config_path);
        Self {
            original_config_path: config_path.clone(),
            config_path,
            working_dir,
            terraform_path: "terraform".to_string(),
            terraform_command: String::new(),
            terraform_cli_args: Vec::new(),
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_folders_to_check: DEFAULT_MAX_FOLDERS_TO_CHECK,
            source_map: Vec::new(),
            env: std::env::vars().collect(),
            output_json: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Like [`EngineOptions::new`], with `GROUNDWORK_*` overrides applied
    /// from the environment snapshot
    pub fn from_env(config_path: impl Into<PathBuf>) -> EngineResult<Self> {
        let mut options = Self::new(config_path);

        if let Some(path) = options.env.get(ENV_TF_PATH) {
            options.terraform_path = path.clone();
        }
        if let Some(raw) = options.env.get(ENV_PARALLELISM) {
            options.parallelism = parse_count(ENV_PARALLELISM, raw)?;
        }
        if let Some(raw) = options.env.get(ENV_MAX_FOLDERS) {
            options.max_folders_to_check = parse_count(ENV_MAX_FOLDERS, raw)?;
        }

        Ok(options)
    }

    /// Derive the options used to query another unit's outputs: pointed at
    /// the target config, running `output -json` in its directory
    pub fn clone_for_target(&self, target_config: &Path) -> Self {
        let mut options = self.clone();
        options.config_path = target_config.to_path_buf();
        options.working_dir = parent_dir(target_config);
        options.terraform_command = "output".to_string();
        options.terraform_cli_args = vec!["output".to_string(), "-json".to_string()];
        options.output_json = true;
        options
    }
}

fn parse_count(name: &str, raw: &str) -> EngineResult<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EngineError::invalid_declaration(format!(
            "{} must be a positive integer, got '{}'",
            name, raw
        ))),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
