//! Lexical path helpers
//!
//! Module paths are compared by their normalized form. Normalization never
//! touches the filesystem, so it works for paths that do not exist yet.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Fold `.` and `..` components without consulting the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }

    out
}

/// Append `.ext` to the full file name (unlike `set_extension`, never replaces)
pub fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("./tests/a.mo")), PathBuf::from("tests/a.mo"));
        assert_eq!(normalize(Path::new("tests/unit/../a.mo")), PathBuf::from("tests/a.mo"));
        assert_eq!(normalize(Path::new("../src/./Lib")), PathBuf::from("../src/Lib"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_appended_extension() {
        assert_eq!(
            with_appended_extension(Path::new("src/Array.test"), "mo"),
            PathBuf::from("src/Array.test.mo")
        );
    }
}
