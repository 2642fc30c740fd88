//! Layered configuration
//!
//! Four layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Host config (`~/.config/attest-build/config.toml`)
//! 3. Repo config (`<source>/.attest/build.toml`, or `--config`)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;
mod overrides;
mod settings;

pub use defaults::{BuiltinDefaults, DEFAULT_SESSION_FILE, DEFAULT_SIGNATURE_DIR};
pub use effective::{
    config_home, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, HOME_ENV, HOST_CONFIG_FILE,
    REPO_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers, Provenance};
pub use overrides::CliOverrides;
pub use settings::{KeyringKind, Settings, PROBE_TIMEOUT_RANGE};
