//! QG-003: Config parsing and structural validation.
//!
//! Parses querygen.yaml (or .toml), pulls in `include` globs, and validates
//! structural constraints that need no catalog:
//! - Version must be "1.0"
//! - A catalog descriptor must be named
//! - Schema names are identifiers and unique
//! - Every schema has at least one group, every group at least one member
//! - Member operation and override names are well-formed

use super::naming::{is_identifier, is_reserved};
use super::types::*;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a config file from disk, expanding `include` patterns.
pub fn parse_config_file(path: &Path) -> Result<QuerygenConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut config = if is_toml(path) {
        parse_config_toml(&content)?
    } else {
        parse_config(&content)?
    };

    let base = config_dir(path);
    for pattern in config.include.clone() {
        for included in expand_include(&base, &pattern)? {
            let schemas = parse_schema_file(&included)?;
            config.schemas.extend(schemas.schemas);
        }
    }
    Ok(config)
}

/// Parse a config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<QuerygenConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Parse a config from a TOML string.
pub fn parse_config_toml(text: &str) -> Result<QuerygenConfig, String> {
    toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
}

/// Parse an included schema file.
pub fn parse_schema_file(path: &Path) -> Result<SchemaFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    if is_toml(path) {
        toml::from_str(&content).map_err(|e| format!("{}: TOML parse error: {}", path.display(), e))
    } else {
        serde_yaml_ng::from_str(&content)
            .map_err(|e| format!("{}: YAML parse error: {}", path.display(), e))
    }
}

/// Directory paths in the config are relative to.
pub fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// Expand one include pattern into sorted file paths.
fn expand_include(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, String> {
    let full = base.join(pattern);
    let full = full.to_string_lossy();
    let mut paths: Vec<PathBuf> = glob::glob(&full)
        .map_err(|e| format!("invalid include pattern '{}': {}", pattern, e))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &QuerygenConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError {
            message: format!("version must be \"1.0\", got \"{}\"", config.version),
        });
    }

    if config.catalog.trim().is_empty() {
        errors.push(ValidationError {
            message: "catalog must name a descriptor file".to_string(),
        });
    }

    if let Some(ref ns) = config.namespace {
        if !ns.split("::").all(is_identifier) {
            errors.push(ValidationError {
                message: format!("namespace '{}' is not a valid module path", ns),
            });
        }
    }

    if !is_identifier(&config.receiver) {
        errors.push(ValidationError {
            message: format!("receiver '{}' is not an identifier", config.receiver),
        });
    }

    let mut seen = FxHashSet::default();
    for schema in &config.schemas {
        validate_schema(schema, &mut errors);
        if !schema.name.is_empty() && !seen.insert(schema.name.as_str()) {
            errors.push(ValidationError {
                message: format!("schema '{}' is declared more than once", schema.name),
            });
        }
    }

    errors
}

fn validate_schema(schema: &AggregationSchema, errors: &mut Vec<ValidationError>) {
    if schema.name.is_empty() {
        errors.push(ValidationError {
            message: "schema name must not be empty".to_string(),
        });
        return;
    }
    let id = &schema.name;

    if !is_identifier(id) {
        errors.push(ValidationError {
            message: format!("schema '{}' name is not an identifier", id),
        });
    }

    if let Some(ref out_file) = schema.out_file {
        if out_file.is_empty() || out_file.contains(['/', '\\']) {
            errors.push(ValidationError {
                message: format!("schema '{}' out_file '{}' must be a plain file stem", id, out_file),
            });
        }
    }

    if schema.groups.is_empty() {
        errors.push(ValidationError {
            message: format!("schema '{}' has no groups", id),
        });
    }

    for (g, group) in schema.groups.iter().enumerate() {
        if group.members.is_empty() {
            errors.push(ValidationError {
                message: format!("schema '{}' group {} has no members", id, g),
            });
        }
        for member in &group.members {
            if member.operation.is_empty() {
                errors.push(ValidationError {
                    message: format!("schema '{}' group {} has a member with no operation", id, g),
                });
                continue;
            }
            for (what, value) in [
                ("param_name", &member.param_name),
                ("result_name", &member.result_name),
            ] {
                if let Some(v) = value {
                    if !is_identifier(v) {
                        errors.push(ValidationError {
                            message: format!(
                                "schema '{}' member '{}' {} '{}' is not an identifier",
                                id, member.operation, what, v
                            ),
                        });
                    } else if is_reserved(v) {
                        errors.push(ValidationError {
                            message: format!(
                                "schema '{}' member '{}' {} '{}' is reserved in generated code",
                                id, member.operation, what, v
                            ),
                        });
                    }
                }
            }
        }
    }
}
