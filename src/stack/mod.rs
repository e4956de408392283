//! Stack expansion
//!
//! A stack file (`terragrunt.stack.hcl`) declares units and nested stacks.
//! Generating a stack copies or fetches each declared source into a
//! directory under `.terragrunt-stack`, writes its values file, and then
//! looks for stack files that the generated sources brought along.

mod config;
mod discovery;
mod fetch;
mod generate;
mod validate;

pub use config::{parse_stack_file, read_stack_file, DeclKind, Declaration, StackFile};
pub use discovery::{find_stack_files, GenerationReport, StackGenerator};
pub use fetch::{
    default_detectors, split_locator, FetchRequest, GcsDetector, GitDetector, GitFetcher,
    HttpDetector, S3Detector, SourceDetector, SourceFetcher,
};
pub use generate::{destination_for, local_source, write_values_file};
pub use validate::validate_stack_file;

/// Name of a stack declaration file
pub const STACK_FILE_NAME: &str = "terragrunt.stack.hcl";

/// Directory generated units and stacks are placed in
pub const STACK_DIR: &str = ".terragrunt-stack";

/// File never copied from a local source
pub const MANIFEST_FILE: &str = ".terragrunt-stack-manifest";

/// Name of the generated values file
pub const VALUES_FILE: &str = "terragrunt.values.hcl";

/// First line of every generated values file
pub const VALUES_HEADER: &str =
    "# Auto-generated by the terragrunt.stack.hcl file by Terragrunt. Do not edit manually";

/// Maximum number of discovery passes before giving up
pub const MAX_DISCOVERY_DEPTH: usize = 100;
