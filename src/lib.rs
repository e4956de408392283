// Rust 1.93+ triggers false positives on thiserror/miette derive macro fields
#![allow(unused_assignments)]

//! Groundwork
//!
//! An evaluation engine for infrastructure configuration files written in
//! HCL. It resolves `locals` blocks to a fixed point, pulls the outputs of
//! `dependency` blocks from the provisioning tool, and expands stack files
//! into generated working trees.
//!
//! # Example
//!
//! ```hcl
//! locals {
//!   region = "us-east-1"
//!   s3_url = "com.amazonaws.${local.region}.s3"
//! }
//!
//! dependency "vpc" {
//!   config_path = "../vpc"
//! }
//!
//! inputs = {
//!   vpc_id = dependency.vpc.outputs.vpc_id
//! }
//! ```

pub mod cache;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod dependency;
pub mod emitter;
pub mod errors;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod locals;
pub mod options;
pub mod parser;
pub mod paths;
pub mod shell;
pub mod stack;

pub use cache::{CacheKey, RunCache};
pub use concurrency::{CancellationToken, WorkerPool};
pub use config::{read_config, render};
pub use context::{EvalContext, RunContext};
pub use dependency::{resolve_dependencies, resolve_outputs, DependencyRef};
pub use emitter::{emit, Emitter, HclEmitter, JsonEmitter, OutputFormat, YamlEmitter};
pub use errors::{EngineError, EngineResult};
pub use evaluator::{Evaluator, Value};
pub use functions::{FunctionDef, FunctionRegistry, ParamType};
pub use lexer::token::{SourceLocation, Token, TokenKind};
pub use lexer::Lexer;
pub use locals::{evaluate_locals, EvaluatedLocals};
pub use options::{EngineOptions, SourceMapRule};
pub use parser::{ast, blocks_of_type, just_attributes, parse, parse_file, ParsedFile, Parser};
pub use stack::{GenerationReport, SourceFetcher, StackGenerator};
