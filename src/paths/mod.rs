//! Lexical path helpers
//!
//! Paths in configuration files are resolved against the directory of the
//! file that mentions them. None of these helpers touch the filesystem, so
//! they also work for paths that do not exist yet.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            Component::CurDir => {}
            c => components.push(c),
        }
    }

    if components.is_empty() {
        return PathBuf::from(".");
    }
    components.iter().collect()
}

/// Resolve `path` against `base_dir` unless it is already absolute
pub fn resolve_against(base_dir: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base_dir.join(path))
    }
}

/// Make a path absolute using the process working directory
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        normalize_path(&cwd.join(path))
    }
}

/// Relative path leading from directory `from` to `to`, `.` when equal.
/// Both paths are normalized first; they should both be absolute or both
/// relative to the same base.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from = normalize_path(from);
    let to = normalize_path(to);
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for component in &from[common..] {
        if !matches!(component, Component::CurDir) {
            result.push("..");
        }
    }
    for component in &to[common..] {
        result.push(component.as_os_str());
    }

    if result.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        result
    }
}

/// Render a path with forward slashes, as configuration files expect
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_resolve_against() {
        assert_eq!(
            resolve_against(Path::new("/live/app"), "../vpc"),
            PathBuf::from("/live/vpc")
        );
        assert_eq!(
            resolve_against(Path::new("/live/app"), "/abs/path"),
            PathBuf::from("/abs/path")
        );
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/live"), Path::new("/live/prod/app")),
            PathBuf::from("prod/app")
        );
        assert_eq!(
            relative_path(Path::new("/live/prod/app"), Path::new("/live")),
            PathBuf::from("../..")
        );
        assert_eq!(
            relative_path(Path::new("/live/a"), Path::new("/live/b/c")),
            PathBuf::from("../b/c")
        );
        assert_eq!(
            relative_path(Path::new("/live"), Path::new("/live")),
            PathBuf::from(".")
        );
    }
}
