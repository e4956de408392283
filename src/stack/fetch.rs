//! Remote sources
//!
//! Detectors recognise locator schemes; a [`SourceFetcher`] downloads a
//! locator into a destination directory. The default fetcher handles git
//! locators of the form `git::<repo>//<subdir>?ref=<rev>`.

use std::path::{Path, PathBuf};

use super::generate::copy_tree;
use super::MANIFEST_FILE;
use crate::cache::CacheKey;
use crate::context::RunContext;
use crate::errors::{EngineError, EngineResult};
use crate::options::EngineOptions;
use crate::shell;

/// Recognises one family of remote locators
pub trait SourceDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, source: &str) -> bool;
}

/// Everything a fetcher gets for one download
pub struct FetchRequest<'a> {
    pub source: &'a str,
    pub destination: &'a Path,
    pub options: &'a EngineOptions,
    pub run: &'a RunContext,
}

/// Downloads remote sources
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest<'_>) -> EngineResult<()>;
}

pub struct GitDetector;

impl SourceDetector for GitDetector {
    fn name(&self) -> &'static str {
        "git"
    }

    fn detect(&self, source: &str) -> bool {
        source.starts_with("git::")
            || source.starts_with("git@")
            || SHORTHAND_HOSTS.iter().any(|host| source.starts_with(host))
            || split_locator(source).0.ends_with(".git")
    }
}

pub struct HttpDetector;

impl SourceDetector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&self, source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }
}

pub struct S3Detector;

impl SourceDetector for S3Detector {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn detect(&self, source: &str) -> bool {
        source.starts_with("s3::") || source.contains(".amazonaws.com/")
    }
}

pub struct GcsDetector;

impl SourceDetector for GcsDetector {
    fn name(&self) -> &'static str {
        "gcs"
    }

    fn detect(&self, source: &str) -> bool {
        source.starts_with("gcs::") || source.contains("storage.googleapis.com/")
    }
}

/// Detectors consulted before fetching, in order
pub fn default_detectors() -> Vec<Box<dyn SourceDetector>> {
    vec![
        Box::new(GitDetector),
        Box::new(S3Detector),
        Box::new(GcsDetector),
        Box::new(HttpDetector),
    ]
}

/// Split a locator into `(repository, subdirectory, ref)`.
///
/// `git::https://host/repo.git//modules/vpc?ref=v1.2.0` becomes
/// `("https://host/repo.git", "modules/vpc", Some("v1.2.0"))`.
pub fn split_locator(source: &str) -> (&str, &str, Option<&str>) {
    let source = source.strip_prefix("git::").unwrap_or(source);
    let (location, query) = match source.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (source, None),
    };
    let reference = query.and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("ref=")));

    let scheme_end = location.find("://").map(|i| i + 3).unwrap_or(0);
    match location[scheme_end..].find("//") {
        Some(i) => {
            let split = scheme_end + i;
            (&location[..split], &location[split + 2..], reference)
        }
        None => (location, "", reference),
    }
}

/// Hosts whose `host/org/repo` shorthand is cloned over https
const SHORTHAND_HOSTS: [&str; 2] = ["github.com/", "bitbucket.org/"];

/// Expand host shorthand into a URL `git clone` accepts
pub fn clone_url(repository: &str) -> String {
    if SHORTHAND_HOSTS.iter().any(|host| repository.starts_with(host)) {
        format!("https://{}", repository)
    } else {
        repository.to_string()
    }
}

/// Clones git repositories with the `git` CLI. Each repository + ref is
/// cloned once per run and copied from there.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    /// Where clones are kept
    pub download_dir: PathBuf,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self {
            download_dir: std::env::temp_dir().join("groundwork-sources"),
        }
    }
}

impl GitFetcher {
    fn checkout(
        &self,
        repository: &str,
        reference: Option<&str>,
        request: &FetchRequest<'_>,
    ) -> EngineResult<PathBuf> {
        let key = CacheKey::compute(&[repository, reference.unwrap_or("")]);
        let target = self.download_dir.join(key.short());

        request.run.downloads.get_or_try_insert_with(key, || {
            if target.exists() {
                std::fs::remove_dir_all(&target)
                    .map_err(|e| EngineError::io_at("remove", &target, e))?;
            }
            std::fs::create_dir_all(&self.download_dir)
                .map_err(|e| EngineError::io_at("create", &self.download_dir, e))?;

            let mut args = vec!["clone".to_string(), "--depth".to_string(), "1".to_string()];
            if let Some(reference) = reference {
                args.push("--branch".to_string());
                args.push(reference.to_string());
            }
            args.push(repository.to_string());
            args.push(target.display().to_string());

            tracing::info!(repository, reference, "cloning source");
            shell::run_command(
                "git",
                &args,
                &self.download_dir,
                &request.options.env,
                &request.options.cancel,
            )?;
            Ok(target.clone())
        })
    }
}

impl SourceFetcher for GitFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> EngineResult<()> {
        let (repository, subdir, reference) = split_locator(request.source);
        if repository.starts_with("s3::") || repository.starts_with("gcs::") {
            return Err(EngineError::generation(
                request.source,
                "only git sources can be fetched",
            ));
        }

        let checkout = self.checkout(&clone_url(repository), reference, request)?;
        let from = if subdir.is_empty() {
            checkout
        } else {
            checkout.join(subdir)
        };
        if !from.is_dir() {
            return Err(EngineError::generation(
                request.source,
                format!("'{}' does not exist in the repository", subdir),
            ));
        }
        copy_tree(&from, request.destination, &[MANIFEST_FILE, ".git"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_locator() {
        assert_eq!(
            split_locator("git::https://example.com/repo.git//modules/vpc?ref=v1.2.0"),
            ("https://example.com/repo.git", "modules/vpc", Some("v1.2.0"))
        );
        assert_eq!(
            split_locator("git@github.com:org/repo.git//units/app"),
            ("git@github.com:org/repo.git", "units/app", None)
        );
        assert_eq!(
            split_locator("https://example.com/repo.git"),
            ("https://example.com/repo.git", "", None)
        );
        assert_eq!(
            split_locator("github.com/org/repo?depth=1&ref=main"),
            ("github.com/org/repo", "", Some("main"))
        );
    }

    #[test]
    fn test_clone_url_expands_shorthand() {
        assert_eq!(clone_url("github.com/org/repo"), "https://github.com/org/repo");
        assert_eq!(
            clone_url("bitbucket.org/team/modules.git"),
            "https://bitbucket.org/team/modules.git"
        );
        assert_eq!(
            clone_url("https://example.com/repo.git"),
            "https://example.com/repo.git"
        );
        assert_eq!(clone_url("git@github.com:org/repo.git"), "git@github.com:org/repo.git");
    }

    #[test]
    fn test_detectors() {
        let detectors = default_detectors();
        let matched = |source: &str| {
            detectors
                .iter()
                .find(|d| d.detect(source))
                .map(|d| d.name())
        };
        assert_eq!(matched("git::https://example.com/r.git"), Some("git"));
        assert_eq!(matched("github.com/org/repo"), Some("git"));
        assert_eq!(matched("s3::https://s3.amazonaws.com/bucket/key"), Some("s3"));
        assert_eq!(matched("gcs::https://www.googleapis.com/b/o"), Some("gcs"));
        assert_eq!(matched("https://example.com/archive.zip"), Some("http"));
        assert_eq!(matched("registry/module"), None);
    }
}
