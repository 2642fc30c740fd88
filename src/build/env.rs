//! Operator-supplied environment overrides
//!
//! Overrides only ever grow during a session: a later attempt sees the
//! union of everything set before it. Setting an existing name replaces its
//! value but never removes a key.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex_lite::Regex;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OverrideError {
    #[error("variable name '{0}' is empty after removing characters outside [A-Za-z0-9_]")]
    EmptyName(String),
}

fn disallowed_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("static pattern compiles"))
}

/// Trim a raw name and drop every character outside `[A-Za-z0-9_]`
pub fn sanitize_name(raw: &str) -> String {
    disallowed_chars().replace_all(raw.trim(), "").into_owned()
}

/// Accumulated overrides, keyed by sanitized name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverrides {
    vars: BTreeMap<String, String>,
}

impl EnvironmentOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `raw_name` and record the override, returning the stored name
    pub fn set(&mut self, raw_name: &str, value: impl Into<String>) -> Result<String, OverrideError> {
        let name = sanitize_name(raw_name);
        if name.is_empty() {
            return Err(OverrideError::EmptyName(raw_name.to_string()));
        }
        self.vars.insert(name.clone(), value.into());
        Ok(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Names in sorted order, for the audit record (values are not recorded)
    pub fn keys(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Overlay onto `base`; overrides win on conflict
    pub fn apply_to(&self, base: &mut BTreeMap<String, String>) {
        for (name, value) in &self.vars {
            base.insert(name.clone(), value.clone());
        }
    }
}
