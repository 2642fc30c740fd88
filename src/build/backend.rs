//! Build backend invocations
//!
//! The backend is an opaque external process; this module only decides the
//! command lines and the generated state to clear before an attempt.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::config::{BackendKind, BuildConfiguration, CompilerFamily};

/// One backend process of an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStep {
    /// Short name for logs and the audit ("configure", "build")
    pub label: &'static str,
    pub program: String,
    pub args: Vec<String>,
    /// Variables the backend expects; operator overrides still win
    pub env: BTreeMap<String, String>,
}

impl BackendStep {
    fn new(label: &'static str, program: &str, args: Vec<String>) -> Self {
        Self {
            label,
            program: program.to_string(),
            args,
            env: BTreeMap::new(),
        }
    }
}

/// Steps to run, in order, for one attempt
pub fn plan_steps(config: &BuildConfiguration, parallelism: Option<u32>) -> Vec<BackendStep> {
    match config.backend {
        BackendKind::CMake => cmake_steps(config, parallelism),
        BackendKind::Make => vec![make_step(config, parallelism)],
    }
}

fn cmake_steps(config: &BuildConfiguration, parallelism: Option<u32>) -> Vec<BackendStep> {
    let mut configure_args = vec![
        ".".to_string(),
        format!("-DCMAKE_BUILD_TYPE={}", config.variant.cmake_build_type()),
        format!("-DCMAKE_CXX_COMPILER={}", config.compiler.executable()),
    ];
    if let Some(flags) = config.compiler.cxx_flags() {
        configure_args.push(format!("-DCMAKE_CXX_FLAGS={}", flags));
    }

    let mut build_args = vec!["--build".to_string(), ".".to_string(), "--parallel".to_string()];
    if let Some(jobs) = parallelism {
        build_args.push(jobs.to_string());
    }

    vec![
        BackendStep::new("configure", "cmake", configure_args),
        BackendStep::new("build", "cmake", build_args),
    ]
}

fn make_step(config: &BuildConfiguration, parallelism: Option<u32>) -> BackendStep {
    let jobs = match parallelism {
        Some(n) => format!("--jobs={}", n),
        None => "--jobs".to_string(),
    };
    let mut step = BackendStep::new("build", "make", vec![jobs]);
    step.env.insert("CXX".to_string(), make_cxx(config.compiler));
    step.env
        .insert("BUILD".to_string(), config.variant.as_str().to_string());
    step
}

fn make_cxx(compiler: CompilerFamily) -> String {
    match compiler.cxx_flags() {
        Some(flags) => format!("{} {}", compiler.executable(), flags),
        None => compiler.executable().to_string(),
    }
}

/// Remove stale generated state left by a previous invocation
///
/// Returns the entries actually removed. Missing entries are not an error.
pub fn purge_cache(backend: BackendKind, build_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for name in backend.cache_artifacts() {
        let path = build_dir.join(name);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        debug!(path = %path.display(), "purged build cache entry");
        removed.push(path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::config::BuildVariant;
    use tempfile::TempDir;

    #[test]
    fn test_cmake_gcc_release() {
        let config = BuildConfiguration::default();
        let steps = plan_steps(&config, None);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].label, "configure");
        assert_eq!(
            steps[0].args,
            vec![".", "-DCMAKE_BUILD_TYPE=Release", "-DCMAKE_CXX_COMPILER=g++"]
        );
        assert_eq!(steps[1].args, vec!["--build", ".", "--parallel"]);
        assert!(steps[0].env.is_empty());
    }

    #[test]
    fn test_cmake_clang_debug_with_jobs() {
        let config =
            BuildConfiguration::new(BuildVariant::Debug, CompilerFamily::Clang, BackendKind::CMake);
        let steps = plan_steps(&config, Some(8));

        assert!(steps[0]
            .args
            .contains(&"-DCMAKE_CXX_FLAGS=-stdlib=libstdc++".to_string()));
        assert!(steps[0].args.contains(&"-DCMAKE_BUILD_TYPE=Debug".to_string()));
        assert_eq!(steps[1].args, vec!["--build", ".", "--parallel", "8"]);
    }

    #[test]
    fn test_make_env() {
        let config =
            BuildConfiguration::new(BuildVariant::Debug, CompilerFamily::Clang, BackendKind::Make);
        let steps = plan_steps(&config, Some(4));

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].program, "make");
        assert_eq!(steps[0].args, vec!["--jobs=4"]);
        assert_eq!(steps[0].env["CXX"], "clang++ -stdlib=libstdc++");
        assert_eq!(steps[0].env["BUILD"], "debug");
    }

    #[test]
    fn test_purge_cmake_cache() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("CMakeFiles/3.28")).unwrap();
        fs::write(dir.path().join("CMakeCache.txt"), "cache").unwrap();
        fs::write(dir.path().join("CMakeLists.txt"), "project(x)").unwrap();

        let removed = purge_cache(BackendKind::CMake, dir.path()).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!dir.path().join("CMakeFiles").exists());
        assert!(!dir.path().join("CMakeCache.txt").exists());
        assert!(dir.path().join("CMakeLists.txt").exists());
    }

    #[test]
    fn test_purge_clean_dir() {
        let dir = TempDir::new().unwrap();
        assert!(purge_cache(BackendKind::Make, dir.path()).unwrap().is_empty());
    }
}
