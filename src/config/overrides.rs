//! Command-line layer (layer 4)

use std::path::PathBuf;

use crate::build::config::{BackendKind, BuildVariant, CompilerFamily};

/// Values given on the command line; `None` leaves lower layers in effect
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub variant: Option<BuildVariant>,
    pub compiler: Option<CompilerFamily>,
    pub backend: Option<BackendKind>,
    pub parallel: Option<u32>,
    pub interactive_config: Option<bool>,
    pub artifact_name: Option<String>,
    pub signature_dir: Option<PathBuf>,
    pub trust_anchor: Option<PathBuf>,
}

impl CliOverrides {
    /// Layer value, or `None` when no flag was given
    pub fn to_value(&self) -> Option<toml::Value> {
        let mut root = toml::Table::new();

        let mut build = toml::Table::new();
        if let Some(v) = self.variant {
            build.insert("variant".into(), v.as_str().into());
        }
        if let Some(c) = self.compiler {
            build.insert("compiler".into(), c.as_str().into());
        }
        if let Some(b) = self.backend {
            build.insert("backend".into(), b.as_str().into());
        }
        if let Some(n) = self.parallel {
            build.insert("parallel".into(), toml::Value::Integer(i64::from(n)));
        }
        if let Some(i) = self.interactive_config {
            build.insert("interactive_config".into(), i.into());
        }
        insert_section(&mut root, "build", build);

        let mut artifact = toml::Table::new();
        if let Some(name) = &self.artifact_name {
            artifact.insert("name".into(), name.as_str().into());
        }
        insert_section(&mut root, "artifact", artifact);

        let mut verify = toml::Table::new();
        if let Some(dir) = &self.signature_dir {
            verify.insert("signature_dir".into(), dir.to_string_lossy().into_owned().into());
        }
        if let Some(anchor) = &self.trust_anchor {
            verify.insert("trust_anchor".into(), anchor.to_string_lossy().into_owned().into());
        }
        insert_section(&mut root, "verify", verify);

        if root.is_empty() {
            None
        } else {
            Some(toml::Value::Table(root))
        }
    }
}

fn insert_section(root: &mut toml::Table, name: &str, section: toml::Table) {
    if !section.is_empty() {
        root.insert(name.to_string(), toml::Value::Table(section));
    }
}
