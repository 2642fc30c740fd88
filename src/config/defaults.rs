//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::build::config::{BackendKind, BuildVariant, CompilerFamily};
use crate::network::{DEFAULT_PROBE_ADDRESS, DEFAULT_PROBE_TIMEOUT_SECONDS};

/// Signature directory, relative to the source directory
pub const DEFAULT_SIGNATURE_DIR: &str = "signature";

/// Session audit file, relative to the source directory
pub const DEFAULT_SESSION_FILE: &str = ".attest/session.json";

/// Hardcoded values for every key that has a fixed default
///
/// Keys whose default depends on the environment (artifact name, keyring
/// directory, trust anchor) are filled in when settings are resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    pub variant: BuildVariant,
    pub compiler: CompilerFamily,
    pub backend: BackendKind,
    pub interactive_config: bool,
    pub signature_dir: String,
    pub keyring: String,
    pub probe_address: String,
    pub probe_timeout_seconds: u64,
    pub session_file: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            variant: BuildVariant::Release,
            compiler: CompilerFamily::Gcc,
            backend: BackendKind::CMake,
            interactive_config: true,
            signature_dir: DEFAULT_SIGNATURE_DIR.to_string(),
            keyring: "native".to_string(),
            probe_address: DEFAULT_PROBE_ADDRESS.to_string(),
            probe_timeout_seconds: DEFAULT_PROBE_TIMEOUT_SECONDS,
            session_file: DEFAULT_SESSION_FILE.to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Layer value in the same shape as the config files
    pub fn to_value(&self) -> toml::Value {
        let mut build = toml::Table::new();
        build.insert("variant".into(), self.variant.as_str().into());
        build.insert("compiler".into(), self.compiler.as_str().into());
        build.insert("backend".into(), self.backend.as_str().into());
        build.insert("interactive_config".into(), self.interactive_config.into());

        let mut verify = toml::Table::new();
        verify.insert("signature_dir".into(), self.signature_dir.as_str().into());
        verify.insert("keyring".into(), self.keyring.as_str().into());

        let mut network = toml::Table::new();
        network.insert("probe_address".into(), self.probe_address.as_str().into());
        network.insert(
            "probe_timeout_seconds".into(),
            toml::Value::Integer(self.probe_timeout_seconds as i64),
        );

        let mut audit = toml::Table::new();
        audit.insert("session_file".into(), self.session_file.as_str().into());

        let mut root = toml::Table::new();
        root.insert("build".into(), toml::Value::Table(build));
        root.insert("verify".into(), toml::Value::Table(verify));
        root.insert("network".into(), toml::Value::Table(network));
        root.insert("audit".into(), toml::Value::Table(audit));
        toml::Value::Table(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.variant, BuildVariant::Release);
        assert_eq!(defaults.compiler, CompilerFamily::Gcc);
        assert_eq!(defaults.backend, BackendKind::CMake);
        assert!(defaults.interactive_config);
        assert_eq!(defaults.probe_timeout_seconds, 5);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["build"]["variant"].as_str(), Some("release"));
        assert_eq!(value["build"]["backend"].as_str(), Some("cmake"));
        assert_eq!(value["verify"]["keyring"].as_str(), Some("native"));
        assert_eq!(value["network"]["probe_timeout_seconds"].as_integer(), Some(5));
        assert_eq!(value["audit"]["session_file"].as_str(), Some(".attest/session.json"));
    }
}
