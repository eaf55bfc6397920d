//! Reading descriptors from disk.
//!
//! Pipeline: read text, parse YAML, interpolate string scalars, map onto the
//! raw serde layout, build the typed model, validate.

use crate::error::{DescriptorError, Result};
use crate::interpolate::interpolate_value;
use crate::model::Descriptor;
use crate::raw::RawDescriptor;
use crate::validate::validate;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Name of the optional variables file next to the descriptor.
pub const ENV_FILE: &str = ".env";

/// Loads, interpolates and validates the descriptor at `path`.
///
/// Variables come from the process environment, then from a `.env` file in
/// the descriptor's directory. The process environment wins.
pub fn load(path: &Path) -> Result<Descriptor> {
    let text = fs::read_to_string(path).map_err(|source| DescriptorError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = descriptor_dir(path);
    let env_path = dir.join(ENV_FILE);
    let file_vars = if env_path.is_file() {
        let content = fs::read_to_string(&env_path).map_err(|source| DescriptorError::Read {
            path: env_path.clone(),
            source,
        })?;
        let vars = parse_env_file(&content);
        debug!(
            "Descriptor: loaded {} variable(s) from {}",
            vars.len(),
            env_path.display()
        );
        vars
    } else {
        BTreeMap::new()
    };

    let lookup = |name: &str| std::env::var(name).ok().or_else(|| file_vars.get(name).cloned());
    let default_name = dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "default".to_string());

    let descriptor = parse_str(&text, &default_name, &lookup)?;
    info!(
        "Descriptor: loaded project '{}' with {} service(s) from {}",
        descriptor.name(),
        descriptor.services().len(),
        path.display()
    );
    Ok(descriptor)
}

/// Parses and validates descriptor text with an explicit variable source.
pub fn parse_str(
    text: &str,
    default_name: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Descriptor> {
    let mut value: serde_yaml::Value = serde_yaml::from_str(text)?;
    interpolate_value(&mut value, &lookup)?;
    let raw: RawDescriptor = serde_yaml::from_value(value)?;
    let descriptor = Descriptor::from_raw(raw, default_name, lookup)?;
    validate(&descriptor)?;
    Ok(descriptor)
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped, an
/// `export ` prefix is ignored and matching outer quotes are stripped.
pub fn parse_env_file(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = ['"', '\'']
            .iter()
            .find_map(|q| {
                value
                    .strip_prefix(*q)
                    .and_then(|v| v.strip_suffix(*q))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

fn descriptor_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_file_syntax() {
        let vars = parse_env_file(
            "# comment\n\nexport DB_USER=user\nDB_PASS=\"p@ss word\"\nSINGLE='x'\nNOEQUALS\n =skip\n",
        );
        assert_eq!(vars.get("DB_USER").map(String::as_str), Some("user"));
        assert_eq!(vars.get("DB_PASS").map(String::as_str), Some("p@ss word"));
        assert_eq!(vars.get("SINGLE").map(String::as_str), Some("x"));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn interpolation_happens_before_typing() {
        let vars: HashMap<&str, &str> = [("PG_PORT", "5433"), ("TAG", "16")].into_iter().collect();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());
        let text = r#"
services:
  db:
    image: "postgres:${TAG}"
    ports: ["${PG_PORT}:5432"]
"#;
        let d = parse_str(text, "demo", &lookup).unwrap();
        let db = d.service("db").unwrap();
        assert_eq!(db.ports()[0].host(), Some(5433));
        assert_eq!(d.name(), "demo");
    }

    #[test]
    fn empty_services_rejected() {
        let none = |_: &str| None;
        assert!(matches!(
            parse_str("services: {}\n", "demo", &none),
            Err(DescriptorError::NoServices)
        ));
        assert!(matches!(
            parse_str("services: [1, 2]\n", "demo", &none),
            Err(DescriptorError::Malformed(_))
        ));
    }

    #[test]
    fn descriptor_dir_defaults_to_cwd() {
        assert_eq!(descriptor_dir(Path::new("compose.yaml")), Path::new("."));
        assert_eq!(descriptor_dir(Path::new("a/compose.yaml")), Path::new("a"));
    }
}
