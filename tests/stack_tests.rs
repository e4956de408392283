//! Stack generation tests
//!
//! Remote sources go through a recording fetcher so nothing leaves the
//! temporary directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use groundwork::stack::{
    FetchRequest, GenerationReport, SourceFetcher, StackGenerator, STACK_DIR, STACK_FILE_NAME,
    VALUES_FILE, VALUES_HEADER,
};
use groundwork::{EngineError, EngineOptions, EngineResult, RunContext, SourceMapRule};
use pretty_assertions::assert_eq;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, content).expect("write file");
}

/// Writes the requested source into the destination instead of fetching it
#[derive(Default)]
struct RecordingFetcher {
    sources: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingFetcher {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn sources(&self) -> Vec<String> {
        let mut sources = self.sources.lock().unwrap().clone();
        sources.sort();
        sources
    }
}

impl SourceFetcher for RecordingFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> EngineResult<()> {
        self.sources.lock().unwrap().push(request.source.to_string());
        if self.fail {
            return Err(EngineError::io_error("connection refused"));
        }
        std::fs::write(request.destination.join("fetched.txt"), request.source)
            .map_err(|e| EngineError::io_at("write", request.destination, e))
    }
}

struct Fixture {
    _root: tempfile::TempDir,
    root: PathBuf,
    fetcher: Arc<RecordingFetcher>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_fetcher(RecordingFetcher::default())
    }

    fn with_fetcher(fetcher: RecordingFetcher) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        write(&root.join("units/app/main.tf"), "# app\n");
        write(&root.join("units/db/main.tf"), "# db\n");
        Self {
            _root: dir,
            root,
            fetcher: Arc::new(fetcher),
        }
    }

    fn live(&self) -> PathBuf {
        self.root.join("live")
    }

    fn stack_file(&self, content: &str) -> PathBuf {
        let path = self.live().join(STACK_FILE_NAME);
        write(&path, content);
        path
    }

    fn generator(&self, configure: impl FnOnce(&mut EngineOptions)) -> StackGenerator {
        let mut options = EngineOptions::new(self.live().join(STACK_FILE_NAME));
        options.parallelism = 2;
        configure(&mut options);
        StackGenerator::new(Arc::new(options), Arc::new(RunContext::new()))
            .with_fetcher(self.fetcher.clone())
    }

    fn generate(&self, content: &str) -> EngineResult<GenerationReport> {
        let path = self.stack_file(content);
        self.generator(|_| {}).generate(&path)
    }

    fn generated(&self, relative: &str) -> PathBuf {
        self.live().join(STACK_DIR).join(relative)
    }
}

#[test]
fn test_local_units_with_values() {
    let fx = Fixture::new();
    let report = fx
        .generate(
            r#"
locals {
  env = "dev"
}

unit "app" {
  source = "../units/app"
  path   = "app"
  values = {
    env      = local.env
    replicas = 2
  }
}

unit "db" {
  source = "../units/db"
  path   = "db"
}
"#,
        )
        .unwrap();

    assert_eq!(report.stack_files, vec![fx.live().join(STACK_FILE_NAME)]);
    assert_eq!(report.generated, vec![fx.generated("app"), fx.generated("db")]);

    assert_eq!(
        std::fs::read_to_string(fx.generated("app/main.tf")).unwrap(),
        "# app\n"
    );
    assert_eq!(
        std::fs::read_to_string(fx.generated("app").join(VALUES_FILE)).unwrap(),
        format!("{}\nenv = \"dev\"\nreplicas = 2\n", VALUES_HEADER)
    );
    assert!(fx.generated("db/main.tf").is_file());
    assert!(!fx.generated("db").join(VALUES_FILE).exists());
    assert!(fx.fetcher.sources().is_empty());
}

#[test]
fn test_no_stack_and_absolute_destinations() {
    let fx = Fixture::new();
    let absolute = fx.root.join("elsewhere/db");
    let report = fx
        .generate(&format!(
            r#"
unit "app" {{
  source                  = "../units/app"
  path                    = "app"
  no_dot_terragrunt_stack = true
}}

unit "db" {{
  source = "../units/db"
  path   = "{}"
}}
"#,
            groundwork::paths::to_slash(&absolute)
        ))
        .unwrap();

    assert!(fx.live().join("app/main.tf").is_file());
    assert!(absolute.join("main.tf").is_file());
    assert!(!fx.live().join(STACK_DIR).exists());
    assert_eq!(report.generated.len(), 2);
}

#[test]
fn test_remote_sources_use_fetcher() {
    let fx = Fixture::new();
    fx.generate(
        r#"
unit "vpc" {
  source = "git::https://example.com/modules.git//vpc?ref=v1.0.0"
  path   = "vpc"
}

unit "registry" {
  source = "registry/module"
  path   = "registry"
}
"#,
    )
    .unwrap();

    assert_eq!(
        fx.fetcher.sources(),
        vec![
            "git::https://example.com/modules.git//vpc?ref=v1.0.0".to_string(),
            "registry/module".to_string(),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(fx.generated("registry/fetched.txt")).unwrap(),
        "registry/module"
    );
}

#[test]
fn test_source_map_rewrites_sources() {
    let fx = Fixture::new();
    let path = fx.stack_file(
        r#"
unit "vpc" {
  source = "git::https://example.com/modules.git//vpc?ref=v1.0.0"
  path   = "vpc"
}
"#,
    );

    let rule = SourceMapRule::new(r"\?ref=v1\.0\.0$", "?ref=v2.0.0").unwrap();
    fx.generator(|o| o.source_map.push(rule)).generate(&path).unwrap();

    assert_eq!(
        fx.fetcher.sources(),
        vec!["git::https://example.com/modules.git//vpc?ref=v2.0.0".to_string()]
    );
}

#[test]
fn test_validation_errors_aggregated() {
    let fx = Fixture::new();
    let result = fx.generate(
        r#"
unit "app" {
  source = "../units/app"
  path   = "shared"
}

unit "app" {
  source = "../units/db"
  path   = "other"
}

unit "db" {
  source = "../units/db"
  path   = "shared"
}
"#,
    );

    match result {
        Err(EngineError::StackValidation { errors, .. }) => {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            assert_eq!(
                messages,
                vec![
                    "duplicate unit name 'app'".to_string(),
                    "units 'app' and 'db' have the same path 'shared'".to_string(),
                ]
            );
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    assert!(!fx.live().join(STACK_DIR).exists());
}

#[test]
fn test_empty_stack_file() {
    let fx = Fixture::new();
    let err = fx.generate("locals {\n  env = \"dev\"\n}\n").unwrap_err();
    let EngineError::StackValidation { errors, .. } = err else {
        panic!("expected a validation error, got {:?}", err);
    };
    assert_eq!(
        errors[0].to_string(),
        "stack file must contain at least one unit or stack"
    );
}

#[test]
fn test_nested_stack_discovered() {
    let fx = Fixture::new();
    let app = groundwork::paths::to_slash(&fx.root.join("units/app"));
    write(
        &fx.root.join("stacks/services").join(STACK_FILE_NAME),
        &format!(
            "unit \"api\" {{\n  source = \"{}\"\n  path   = \"api\"\n}}\n",
            app
        ),
    );

    let report = fx
        .generate(
            r#"
stack "services" {
  source = "../stacks/services"
  path   = "services"
}
"#,
        )
        .unwrap();

    let nested = fx.generated("services").join(STACK_FILE_NAME);
    assert_eq!(
        report.stack_files,
        vec![fx.live().join(STACK_FILE_NAME), nested]
    );
    assert!(fx.generated("services/.terragrunt-stack/api/main.tf").is_file());
    assert_eq!(report.generated.len(), 2);
}

#[test]
fn test_self_generating_stack_detected() {
    let fx = Fixture::new();
    let path = fx.stack_file(
        r#"
stack "again" {
  source = "."
  path   = "again"
}
"#,
    );

    let result = fx.generator(|_| {}).with_max_depth(4).generate(&path);
    match result {
        Err(EngineError::CycleDetected { depth, .. }) => assert_eq!(depth, 4),
        other => panic!("expected a cycle error, got {:?}", other),
    }
}

#[test]
fn test_fetch_failure_names_item() {
    let fx = Fixture::with_fetcher(RecordingFetcher::failing());
    let err = fx
        .generate(
            r#"
unit "vpc" {
  source = "github.com/org/vpc"
  path   = "vpc"
}
"#,
        )
        .unwrap_err();

    match err {
        EngineError::Generation { item, message } => {
            assert_eq!(item, "unit 'vpc'");
            assert!(message.contains("connection refused"));
        }
        other => panic!("expected a generation error, got {:?}", other),
    }
}

#[test]
fn test_many_units_bounded_pool() {
    let fx = Fixture::new();
    let units: String = (0..12)
        .map(|i| {
            format!(
                "unit \"u{i}\" {{\n  source = \"../units/app\"\n  path   = \"u{i}\"\n}}\n\n"
            )
        })
        .collect();

    let report = fx.generate(&units).unwrap();
    assert_eq!(report.generated.len(), 12);
    for i in 0..12 {
        assert!(fx.generated(&format!("u{i}/main.tf")).is_file());
    }
}

#[test]
fn test_values_with_invalid_attribute_name() {
    let fx = Fixture::new();
    let err = fx
        .generate(
            r#"
unit "app" {
  source = "../units/app"
  path   = "app"
  values = {
    "cost center" = 42
  }
}
"#,
        )
        .unwrap_err();

    match err {
        EngineError::Generation { item, message } => {
            assert_eq!(item, "unit 'app'");
            assert!(message.contains("cost center"), "{}", message);
        }
        other => panic!("expected a generation error, got {:?}", other),
    }
    assert!(!fx.generated("app").join(VALUES_FILE).exists());
}
