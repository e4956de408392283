//! Stack discovery and the generation loop

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use walkdir::WalkDir;

use super::config::read_stack_file;
use super::fetch::{default_detectors, GitFetcher, SourceDetector, SourceFetcher};
use super::generate::{generate_item, ItemContext};
use super::validate::validate_stack_file;
use super::{MAX_DISCOVERY_DEPTH, STACK_FILE_NAME};
use crate::concurrency::WorkerPool;
use crate::context::RunContext;
use crate::errors::{display_path, EngineError, EngineResult};
use crate::options::EngineOptions;
use crate::paths;

/// What one call to [`StackGenerator::generate`] did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    /// Stack files processed, in processing order
    pub stack_files: Vec<PathBuf>,
    /// Destination directories of generated units and stacks, sorted
    pub generated: Vec<PathBuf>,
}

/// Expands a stack file and every stack file its generated sources bring
/// along
pub struct StackGenerator {
    options: Arc<EngineOptions>,
    run: Arc<RunContext>,
    fetcher: Arc<dyn SourceFetcher>,
    detectors: Vec<Box<dyn SourceDetector>>,
    max_depth: usize,
}

impl StackGenerator {
    pub fn new(options: Arc<EngineOptions>, run: Arc<RunContext>) -> Self {
        Self {
            options,
            run,
            fetcher: Arc::new(GitFetcher::default()),
            detectors: default_detectors(),
            max_depth: MAX_DISCOVERY_DEPTH,
        }
    }

    /// Use a different fetcher for remote sources
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_detectors(mut self, detectors: Vec<Box<dyn SourceDetector>>) -> Self {
        self.detectors = detectors;
        self
    }

    /// Number of discovery passes after which generation is assumed to
    /// be cycling
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Generate `root_stack_file`, then keep rescanning its directory for
    /// stack files that have not been processed yet until a pass finds
    /// none.
    pub fn generate(&self, root_stack_file: &Path) -> EngineResult<GenerationReport> {
        let root = paths::absolute(root_stack_file);
        if !root.is_file() {
            return Err(EngineError::io_error(format!(
                "stack file {} does not exist",
                display_path(&root)
            )));
        }
        let root_dir = root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut processed: HashSet<PathBuf> = HashSet::new();
        let mut report = GenerationReport::default();
        let mut pending = vec![root];
        let mut depth = 0;

        while !pending.is_empty() {
            depth += 1;
            if depth > self.max_depth {
                return Err(EngineError::CycleDetected {
                    path: display_path(&pending[0]),
                    depth: self.max_depth,
                });
            }
            tracing::info!(pass = depth, stack_files = pending.len(), "discovery pass");

            for stack_file in pending {
                self.options.cancel.check()?;
                let generated = self.generate_stack_file(&stack_file)?;
                report.generated.extend(generated);
                processed.insert(stack_file.clone());
                report.stack_files.push(stack_file);
            }

            pending = find_stack_files(&root_dir)?
                .into_iter()
                .filter(|path| !processed.contains(path))
                .collect();
        }

        report.generated.sort();
        Ok(report)
    }

    fn generate_stack_file(&self, path: &Path) -> EngineResult<Vec<PathBuf>> {
        tracing::info!(stack_file = %display_path(path), "generating stack");
        let stack = read_stack_file(path, &self.options, Arc::clone(&self.run))?;
        validate_stack_file(&stack)?;

        let ctx = ItemContext {
            options: &self.options,
            run: &self.run,
            fetcher: self.fetcher.as_ref(),
            detectors: &self.detectors,
        };
        let stack_dir = stack.dir();
        let generated = Mutex::new(Vec::new());

        let pool = WorkerPool::new(self.options.parallelism, self.options.cancel.clone());
        pool.run(stack.declarations().collect(), |decl| {
            let destination = generate_item(decl, stack_dir, &ctx)?;
            generated
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(destination);
            Ok(())
        })?;

        let generated = generated.into_inner().unwrap_or_else(|p| p.into_inner());
        tracing::debug!(
            stack_file = %display_path(path),
            items = generated.len(),
            "stack generated"
        );
        Ok(generated)
    }
}

/// All stack files under `dir`, sorted by path
pub fn find_stack_files(dir: &Path) -> EngineResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            EngineError::io_error(format!("failed to scan {}: {}", dir.display(), e))
        })?;
        if entry.file_type().is_file() && entry.file_name() == STACK_FILE_NAME {
            found.push(paths::normalize_path(entry.path()));
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_stack_files() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("a/b")).unwrap();
        std::fs::write(root.path().join(STACK_FILE_NAME), "").unwrap();
        std::fs::write(root.path().join("a/b").join(STACK_FILE_NAME), "").unwrap();
        std::fs::write(root.path().join("a/terragrunt.hcl"), "").unwrap();

        let found = find_stack_files(root.path()).unwrap();
        assert_eq!(
            found,
            vec![
                paths::normalize_path(&root.path().join("a/b").join(STACK_FILE_NAME)),
                paths::normalize_path(&root.path().join(STACK_FILE_NAME)),
            ]
        );
    }

    #[test]
    fn test_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let generator = StackGenerator::new(
            Arc::new(EngineOptions::new(root.path().join(STACK_FILE_NAME))),
            Arc::new(RunContext::new()),
        );
        assert!(generator.generate(&root.path().join(STACK_FILE_NAME)).is_err());
    }
}
