#![allow(unused_assignments)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use groundwork::options::DEFAULT_CONFIG_NAME;
use groundwork::stack::STACK_FILE_NAME;
use groundwork::{
    EngineError, EngineOptions, EngineResult, EvalContext, OutputFormat, RunContext,
    SourceMapRule, StackGenerator,
};

/// Evaluate infrastructure configuration files
///
/// Resolves locals, dependency outputs and stack files.
#[derive(Parser)]
#[command(name = "groundwork")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a configuration file and print the result
    Render {
        /// Configuration file, or a directory containing terragrunt.hcl
        file: PathBuf,

        /// Output format: json, json-pretty, yaml, hcl
        #[arg(short, long, default_value = "json-pretty")]
        format: String,
    },

    /// Stack file operations
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },
}

#[derive(Subcommand)]
enum StackCommands {
    /// Generate the units and stacks declared in terragrunt.stack.hcl
    Generate {
        /// Directory containing the stack file
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Maximum number of items generated at once
        #[arg(long)]
        parallelism: Option<usize>,

        /// Rewrite sources matching a pattern (format: pattern=replacement)
        #[arg(long = "source-map", value_parser = parse_key_value)]
        source_map: Vec<(String, String)>,
    },
}

/// Parse a key=value pair
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid format '{}': expected pattern=replacement", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Render { file, format } => cmd_render(file, format),
        Commands::Stack {
            command:
                StackCommands::Generate {
                    dir,
                    parallelism,
                    source_map,
                },
        } => cmd_stack_generate(dir, parallelism, source_map),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let exit_code = match &e {
                EngineError::IoError { .. } => ExitCode::from(3),
                _ => ExitCode::from(1),
            };
            eprintln!("{:?}", miette::Report::new(e));
            exit_code
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "groundwork=debug" } else { "groundwork=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_render(file: PathBuf, format: String) -> EngineResult<()> {
    let format = OutputFormat::parse(&format).ok_or_else(|| {
        EngineError::invalid_declaration(format!(
            "unknown format '{}': expected json, json-pretty, yaml or hcl",
            format
        ))
    })?;
    let config = if file.is_dir() {
        file.join(DEFAULT_CONFIG_NAME)
    } else {
        file
    };

    let options = EngineOptions::from_env(groundwork::paths::absolute(&config))?;
    let ctx = EvalContext::new(Arc::new(options), Arc::new(RunContext::new()));
    let value = groundwork::render(&ctx)?;

    let output = groundwork::emit(&value, format)?;
    println!("{}", output.trim_end());
    Ok(())
}

fn cmd_stack_generate(
    dir: PathBuf,
    parallelism: Option<usize>,
    source_map: Vec<(String, String)>,
) -> EngineResult<()> {
    let stack_file = groundwork::paths::absolute(&dir.join(STACK_FILE_NAME));
    let mut options = EngineOptions::from_env(&stack_file)?;
    if let Some(parallelism) = parallelism {
        options.parallelism = parallelism.max(1);
    }
    for (pattern, replacement) in source_map {
        options.source_map.push(SourceMapRule::new(&pattern, replacement)?);
    }

    let generator = StackGenerator::new(Arc::new(options), Arc::new(RunContext::new()));
    let report = generator.generate(&stack_file)?;

    for path in &report.generated {
        eprintln!("Generated {}", display_relative(&dir, path));
    }
    eprintln!(
        "{} stack file(s), {} item(s) generated",
        report.stack_files.len(),
        report.generated.len()
    );
    Ok(())
}

fn display_relative(dir: &Path, path: &Path) -> String {
    let base = groundwork::paths::absolute(dir);
    groundwork::paths::to_slash(&groundwork::paths::relative_path(&base, path))
}
