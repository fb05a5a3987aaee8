//! Object keys derived from local paths.

use std::path::{Component, Path, PathBuf};

/// Key for a file: no leading or trailing slash
pub fn normalize_file(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Key prefix for a directory: no leading slash, exactly one trailing slash
pub fn normalize_directory(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Absolute, lexically cleaned form of a local path.
///
/// `.` components are dropped and `..` removes the preceding component, so
/// two spellings of the same file map to the same key. Symlinks are not
/// resolved.
pub fn absolute(path: &Path) -> std::io::Result<String> {
    let mut clean = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean.to_string_lossy().to_string())
}

/// Whether `key` stays inside the directory it is joined onto
pub fn is_contained(key: &str) -> bool {
    Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_directory() {
        assert_eq!(normalize_directory("/a/b"), "a/b/");
        assert_eq!(normalize_directory("a/b/"), "a/b/");
        assert_eq!(normalize_directory("//a/b//"), "a/b/");
        assert_eq!(normalize_directory("/"), "");
    }

    #[test]
    fn test_normalize_file() {
        assert_eq!(normalize_file("/a/b/"), "a/b");
        assert_eq!(normalize_file("a/b"), "a/b");
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        assert_eq!(absolute(Path::new("/tmp/x")).unwrap(), "/tmp/x");
        assert!(absolute(Path::new("rel")).unwrap().starts_with('/'));
    }

    #[test]
    fn test_absolute_resolves_dot_components() {
        assert_eq!(absolute(Path::new("/a/sub/../f.txt")).unwrap(), "/a/f.txt");
        assert_eq!(absolute(Path::new("/a/./b/")).unwrap(), "/a/b");
        assert_eq!(absolute(Path::new("/../../x")).unwrap(), "/x");
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained("tmp/d/f.txt"));
        assert!(!is_contained("tmp/../../etc/passwd"));
        assert!(!is_contained("/etc/passwd"));
    }
}
