//! Generation of a single unit or stack declaration

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::config::Declaration;
use super::fetch::{FetchRequest, SourceDetector, SourceFetcher};
use super::{MANIFEST_FILE, STACK_DIR, VALUES_FILE, VALUES_HEADER};
use crate::context::RunContext;
use crate::emitter::{Emitter, HclEmitter};
use crate::errors::{EngineError, EngineResult};
use crate::evaluator::Value;
use crate::options::{apply_source_map, EngineOptions};
use crate::paths;

/// Shared collaborators for generating items of one stack file
pub(super) struct ItemContext<'a> {
    pub options: &'a EngineOptions,
    pub run: &'a RunContext,
    pub fetcher: &'a dyn SourceFetcher,
    pub detectors: &'a [Box<dyn SourceDetector>],
}

/// Copy or fetch one declaration and write its values. Returns the
/// destination directory.
pub(super) fn generate_item(
    decl: &Declaration,
    stack_dir: &Path,
    ctx: &ItemContext<'_>,
) -> EngineResult<PathBuf> {
    ctx.options.cancel.check()?;
    let label = format!("{} '{}'", decl.kind, decl.name);

    let source = apply_source_map(&decl.source, &ctx.options.source_map);
    if source != decl.source {
        tracing::debug!(item = %label, from = %decl.source, to = %source, "source rewritten");
    }

    let destination = destination_for(decl, stack_dir);
    tracing::info!(item = %label, source = %source, destination = %destination.display(), "generating");

    match local_source(&source, stack_dir) {
        Some(local) => copy_tree(&local, &destination, &[MANIFEST_FILE, STACK_DIR])
            .map_err(|e| EngineError::generation(&label, e.to_string()))?,
        None => {
            match ctx.detectors.iter().find(|d| d.detect(&source)) {
                Some(detector) => {
                    tracing::debug!(item = %label, detector = detector.name(), "remote source")
                }
                None => tracing::debug!(
                    item = %label,
                    "source is neither local nor a known remote scheme, fetching as remote"
                ),
            }
            create_dir(&destination)?;
            ctx.fetcher
                .fetch(&FetchRequest {
                    source: &source,
                    destination: &destination,
                    options: ctx.options,
                    run: ctx.run,
                })
                .map_err(|e| match e {
                    EngineError::Cancelled => e,
                    other => EngineError::generation(&label, other.to_string()),
                })?;
        }
    }

    if let Some(values) = &decl.values {
        write_values_file(&destination, values)
            .map_err(|e| EngineError::generation(&label, e.to_string()))?;
    }
    Ok(destination)
}

/// Where a declaration is generated. Absolute paths are used as they are;
/// relative ones go under the stack directory, or next to it for
/// declarations that opt out of it.
pub fn destination_for(decl: &Declaration, stack_dir: &Path) -> PathBuf {
    let path = Path::new(decl.path.trim());
    if path.is_absolute() {
        return paths::normalize_path(path);
    }
    if decl.no_stack {
        paths::resolve_against(stack_dir, path)
    } else {
        paths::resolve_against(&stack_dir.join(STACK_DIR), path)
    }
}

/// The local directory or file a source refers to, if it exists
pub fn local_source(source: &str, stack_dir: &Path) -> Option<PathBuf> {
    let literal = Path::new(source);
    if literal.is_absolute() && literal.exists() {
        return Some(paths::normalize_path(literal));
    }
    let joined = paths::resolve_against(stack_dir, source);
    joined.exists().then_some(joined)
}

/// Write `values` as the values file of `destination`
pub fn write_values_file(destination: &Path, values: &Value) -> EngineResult<()> {
    let body = HclEmitter::new().emit(values)?;
    create_dir(destination)?;
    let path = destination.join(VALUES_FILE);
    std::fs::write(&path, format!("{}\n{}", VALUES_HEADER, body))
        .map_err(|e| EngineError::io_at("write", &path, e))
}

/// Recursively copy `from` into `to`, skipping entries named in `exclude`
pub(crate) fn copy_tree(from: &Path, to: &Path, exclude: &[&str]) -> EngineResult<()> {
    if from.is_file() {
        create_dir(to)?;
        let name = from.file_name().unwrap_or_default();
        let target = to.join(name);
        std::fs::copy(from, &target).map_err(|e| EngineError::io_at("copy", from, e))?;
        return Ok(());
    }

    let walker = WalkDir::new(from).follow_links(false).into_iter();
    let entries = walker.filter_entry(|entry| {
        entry.depth() == 0
            || !exclude
                .iter()
                .any(|name| entry.file_name().to_str() == Some(*name))
    });

    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io_error(format!("failed to walk {}: {}", from.display(), e)))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            create_dir(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                create_dir(parent)?;
            }
            std::fs::copy(entry.path(), &target)
                .map_err(|e| EngineError::io_at("copy", entry.path(), e))?;
        }
    }
    Ok(())
}

/// Create a directory and its parents with mode 0755
pub(crate) fn create_dir(path: &Path) -> EngineResult<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(path)
        .map_err(|e| EngineError::io_at("create", path, e))
}
