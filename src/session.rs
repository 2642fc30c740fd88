//! Session context threaded through resolution and every build attempt
//!
//! Holds the only mutable environment state of a run: the search path
//! (written by the resolver) and the accumulated overrides (written by the
//! orchestrator). Child environments are composed from it on demand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::build::env::EnvironmentOverrides;
use crate::resolve::search_path::SearchPath;

#[derive(Debug, Clone)]
pub struct SessionContext {
    base_env: BTreeMap<String, String>,
    pub search_path: SearchPath,
    pub overrides: EnvironmentOverrides,
    working_dir: PathBuf,
}

impl SessionContext {
    pub fn new(
        base_env: BTreeMap<String, String>,
        search_path: SearchPath,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_env,
            search_path,
            overrides: EnvironmentOverrides::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Snapshot the current process environment
    ///
    /// Variables that are not valid Unicode are left out of the base.
    pub fn from_process(working_dir: impl Into<PathBuf>) -> Self {
        let base_env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::new(base_env, SearchPath::from_process(), working_dir)
    }

    pub fn base_env(&self) -> &BTreeMap<String, String> {
        &self.base_env
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = dir.into();
    }

    /// Base environment, then the session `PATH`, then the overrides
    pub fn compose_env(&self) -> BTreeMap<String, String> {
        let mut env = self.base_env.clone();
        env.insert("PATH".to_string(), self.search_path.to_env_value());
        self.overrides.apply_to(&mut env);
        env
    }

    /// Locate a tool on the session search path
    pub fn locate(&self, tool: &str) -> Option<PathBuf> {
        self.search_path.locate(tool, &self.working_dir)
    }
}
