//! Effective configuration with provenance
//!
//! Records the merged configuration, which file (and digest) each layer came
//! from, and which layer supplied each key.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::defaults::BuiltinDefaults;
use super::merge::{merge_layers, Provenance};

pub const SCHEMA_VERSION: u32 = 1;

pub const SCHEMA_ID: &str = "attest-build/effective_config@1";

/// Host configuration, relative to the configuration home
pub const HOST_CONFIG_FILE: &str = "config.toml";

/// Repository configuration, relative to the source directory
pub const REPO_CONFIG_FILE: &str = ".attest/build.toml";

/// Overrides the configuration home (normally `~/.config/attest-build`)
pub const HOME_ENV: &str = "ATTEST_BUILD_HOME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Repo,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,

    /// Merged configuration with secrets redacted
    pub config: Value,

    /// Contributing layers, lowest precedence first
    pub sources: Vec<ConfigSource>,

    /// Layer that supplied each key
    pub provenance: Provenance,

    /// Redacted key paths
    pub redactions: Vec<String>,

    #[serde(skip)]
    merged: Option<toml::Value>,
}

/// Key fragments that mark a value as secret
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "private_key", "passphrase", "credential"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("could not resolve the home directory; set {HOME_ENV}")]
    NoHome,
}

/// Configuration home: `$ATTEST_BUILD_HOME`, else `~/.config/attest-build`
pub fn config_home() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        let path = PathBuf::from(dir);
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }
    let base = directories::BaseDirs::new().ok_or(ConfigError::NoHome)?;
    Ok(base.home_dir().join(".config").join("attest-build"))
}

impl EffectiveConfig {
    /// Merge builtin, host, repo and CLI layers; missing files are skipped
    pub fn build(
        host_config_path: Option<&Path>,
        repo_config_path: Option<&Path>,
        cli_overrides: Option<toml::Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![(ConfigOrigin::Builtin, BuiltinDefaults::default().to_value())];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        for (origin, path) in [(ConfigOrigin::Host, host_config_path), (ConfigOrigin::Repo, repo_config_path)] {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            let (value, digest) = load_toml_file(path)?;
            debug!(origin = ?origin, path = %path.display(), digest = %digest, "loaded config layer");
            layers.push((origin.clone(), value));
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_path_buf()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push((ConfigOrigin::Cli, cli));
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let (merged, provenance) = merge_layers(layers);
        let mut config = toml_to_json(merged.clone());
        let redactions = redact_secrets(&mut config);

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config,
            sources,
            provenance,
            redactions,
            merged: Some(merged),
        })
    }

    /// Unredacted merged value; absent on a record read back from JSON
    pub fn merged(&self) -> Option<&toml::Value> {
        self.merged.as_ref()
    }

    /// Redacted value at a dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.config, |current, part| current.get(part))
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn origin_of(&self, path: &str) -> Option<&ConfigOrigin> {
        self.provenance.get(path)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn load_toml_file(path: &Path) -> Result<(toml::Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let text = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: format!("invalid UTF-8: {}", e),
    })?;
    let table: toml::Table = toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok((toml::Value::Table(table), digest))
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect()),
    }
}

fn redact_secrets(value: &mut Value) -> Vec<String> {
    let mut redactions = Vec::new();
    redact_recursive(value, "", &mut redactions);
    redactions
}

fn redact_recursive(value: &mut Value, path: &str, redactions: &mut Vec<String>) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, child) in map.iter_mut() {
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };
        let lower = key.to_lowercase();
        if SECRET_KEYS.iter().any(|s| lower.contains(s)) && !child.is_object() {
            *child = Value::String(REDACTED.to_string());
            redactions.push(child_path);
        } else {
            redact_recursive(child, &child_path, redactions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cli(text: &str) -> Option<toml::Value> {
        Some(toml::Value::Table(toml::from_str(text).unwrap()))
    }

    #[test]
    fn test_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.get_str("build.variant"), Some("release"));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.origin_of("build.variant"), Some(&ConfigOrigin::Builtin));
    }

    #[test]
    fn test_layers_in_precedence_order() {
        let mut host = NamedTempFile::new().unwrap();
        writeln!(host, "[build]\ncompiler = \"clang\"\nvariant = \"debug\"").unwrap();
        let mut repo = NamedTempFile::new().unwrap();
        writeln!(repo, "[build]\nvariant = \"release\"\n[artifact]\nname = \"tool\"").unwrap();

        let config = EffectiveConfig::build(
            Some(host.path()),
            Some(repo.path()),
            cli("[build]\nbackend = \"make\""),
        )
        .unwrap();

        assert_eq!(config.get_str("build.compiler"), Some("clang"));
        assert_eq!(config.get_str("build.variant"), Some("release"));
        assert_eq!(config.get_str("build.backend"), Some("make"));
        assert_eq!(config.origin_of("build.compiler"), Some(&ConfigOrigin::Host));
        assert_eq!(config.origin_of("build.variant"), Some(&ConfigOrigin::Repo));
        assert_eq!(config.origin_of("build.backend"), Some(&ConfigOrigin::Cli));

        let origins: Vec<_> = config.sources.iter().map(|s| s.origin.clone()).collect();
        assert_eq!(
            origins,
            vec![ConfigOrigin::Builtin, ConfigOrigin::Host, ConfigOrigin::Repo, ConfigOrigin::Cli]
        );
        assert_eq!(config.sources[1].digest.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let config = EffectiveConfig::build(
            Some(Path::new("/no/such/host.toml")),
            Some(Path::new("/no/such/repo.toml")),
            None,
        )
        .unwrap();
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut bad = NamedTempFile::new().unwrap();
        writeln!(bad, "[build\nvariant = ").unwrap();

        let err = EffectiveConfig::build(None, Some(bad.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_secret_redaction() {
        let config = EffectiveConfig::build(
            None,
            None,
            cli("[verify]\nkey_passphrase = \"hunter2\"\n[remote]\napi_token = \"t\"\nuser = \"me\""),
        )
        .unwrap();

        assert_eq!(config.get_str("verify.key_passphrase"), Some(REDACTED));
        assert_eq!(config.get_str("remote.api_token"), Some(REDACTED));
        assert_eq!(config.get_str("remote.user"), Some("me"));
        assert!(config.redactions.contains(&"remote.api_token".to_string()));

        let merged = config.merged().unwrap();
        assert_eq!(merged["remote"]["api_token"].as_str(), Some("t"));
        assert!(!config.to_json().unwrap().contains("hunter2"));
    }
}
