//! Layer merge
//!
//! Tables deep-merge by key; arrays and scalars are replaced by the later
//! layer. Every leaf remembers which layer last set it.

use std::collections::BTreeMap;

use super::effective::ConfigOrigin;

/// Dotted key path -> layer that supplied the value
pub type Provenance = BTreeMap<String, ConfigOrigin>;

/// Deep merge `overlay` into `base`
pub fn deep_merge(base: toml::Value, overlay: toml::Value) -> toml::Value {
    let mut ignored = Provenance::new();
    merge_into(base, overlay, ConfigOrigin::Builtin, "", &mut ignored)
}

/// Merge layers in precedence order (first is lowest), tracking provenance
pub fn merge_layers(layers: Vec<(ConfigOrigin, toml::Value)>) -> (toml::Value, Provenance) {
    let mut provenance = Provenance::new();
    let mut merged = toml::Value::Table(toml::Table::new());
    for (origin, layer) in layers {
        merged = merge_into(merged, layer, origin, "", &mut provenance);
    }
    (merged, provenance)
}

fn merge_into(
    base: toml::Value,
    overlay: toml::Value,
    origin: ConfigOrigin,
    prefix: &str,
    provenance: &mut Provenance,
) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                let path = join_key(prefix, &key);
                let merged = match base_table.remove(&key) {
                    Some(base_value) => {
                        merge_into(base_value, overlay_value, origin.clone(), &path, provenance)
                    }
                    None => {
                        record_leaves(&overlay_value, &origin, &path, provenance);
                        overlay_value
                    }
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => {
            provenance.retain(|k, _| !(k == prefix || k.starts_with(&format!("{}.", prefix))));
            record_leaves(&overlay, &origin, prefix, provenance);
            overlay
        }
    }
}

fn record_leaves(value: &toml::Value, origin: &ConfigOrigin, path: &str, provenance: &mut Provenance) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                record_leaves(child, origin, &join_key(path, key), provenance);
            }
        }
        _ => {
            if !path.is_empty() {
                provenance.insert(path.to_string(), origin.clone());
            }
        }
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}
