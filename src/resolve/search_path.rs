//! Session-scoped executable search path
//!
//! The resolver is the only writer. Every child process receives the
//! rendered value as its `PATH`, so a directory accepted by the operator is
//! visible to all later invocations without touching the parent process
//! environment.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Split a `PATH`-style value
    pub fn from_env_value(value: &OsStr) -> Self {
        Self {
            dirs: std::env::split_paths(value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
        }
    }

    /// Current process `PATH`, empty when unset
    pub fn from_process() -> Self {
        std::env::var_os("PATH")
            .map(|value| Self::from_env_value(&value))
            .unwrap_or_default()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Put `dir` first, removing any later duplicate of it
    pub fn prepend(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.dirs.retain(|existing| existing != &dir);
        self.dirs.insert(0, dir);
    }

    /// Render as a `PATH` value
    pub fn to_os_string(&self) -> OsString {
        // join_paths only fails on a separator inside a component, which
        // split_paths never yields; fall back to the lossy join in that case
        std::env::join_paths(&self.dirs).unwrap_or_else(|_| {
            let sep = if cfg!(windows) { ";" } else { ":" };
            OsString::from(
                self.dirs
                    .iter()
                    .map(|d| d.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(sep),
            )
        })
    }

    /// Render as UTF-8 for the child environment map
    pub fn to_env_value(&self) -> String {
        self.to_os_string().to_string_lossy().into_owned()
    }

    /// First executable named `tool` on this path
    pub fn locate(&self, tool: &str, cwd: &Path) -> Option<PathBuf> {
        if self.dirs.is_empty() {
            return None;
        }
        which::which_in(tool, Some(self.to_os_string()), cwd).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_prepend_dedupes() {
        let mut path = SearchPath::new(vec![PathBuf::from("/usr/bin"), PathBuf::from("/opt/bin")]);
        path.prepend("/opt/bin");
        assert_eq!(path.dirs(), &[PathBuf::from("/opt/bin"), PathBuf::from("/usr/bin")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_env_value_round_trip() {
        let path = SearchPath::from_env_value(OsStr::new("/a:/b::/c"));
        assert_eq!(path.dirs().len(), 3);
        assert_eq!(path.to_env_value(), "/a:/b:/c");
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_finds_executable() {
        let dir = TempDir::new().unwrap();
        let tool = make_executable(dir.path(), "fake-tool");

        let path = SearchPath::new(vec![dir.path().to_path_buf()]);
        assert_eq!(path.locate("fake-tool", dir.path()), Some(tool));
        assert_eq!(path.locate("nonexistent-tool-xyz", dir.path()), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_skips_non_executable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("plain-file"), "data").unwrap();

        let path = SearchPath::new(vec![dir.path().to_path_buf()]);
        assert_eq!(path.locate("plain-file", dir.path()), None);
    }

    #[test]
    fn test_empty_path_locates_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(SearchPath::default().locate("sh", dir.path()), None);
    }
}
