//! QG-016: Static registry backed by a descriptor file.
//!
//! The descriptor is produced ahead of time by a build step and lists every
//! composite type and operation signature as type expressions:
//!
//! ```yaml
//! namespace: db
//! types:
//!   User: { id: i64, name: String }
//! operations:
//!   GetUser:
//!     inputs: [ctx, i64]
//!     outputs: ["&User", error]
//! ```
//!
//! Type expressions: `ctx`, `error`, `&T`, `[T]`, `Vec<T>`, `Option<T>`, or a
//! name. Names found in `types` are composites, other names are scalars.
//! Anything else parses to [`TypeDescriptor::Unknown`] so that loading never
//! fails on one odd signature.

use super::{is_administrative, OperationRegistry, OperationSignature, StructDescriptor, TypeDescriptor};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk descriptor layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorFile {
    /// Namespace of the operations
    #[serde(default)]
    pub namespace: String,

    /// Composite types: name → ordered field → type expression
    #[serde(default)]
    pub types: IndexMap<String, IndexMap<String, String>>,

    /// Operation signatures (order-preserving)
    #[serde(default)]
    pub operations: IndexMap<String, OperationEntry>,
}

/// One operation in the descriptor file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationEntry {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Registry over a fixed descriptor table.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    namespace: String,
    types: IndexMap<String, StructDescriptor>,
    operations: IndexMap<String, OperationSignature>,
}

impl StaticRegistry {
    /// Build the table from a parsed descriptor file.
    pub fn from_descriptor(file: DescriptorFile) -> Self {
        let types: IndexMap<String, StructDescriptor> = file
            .types
            .into_iter()
            .map(|(name, fields)| {
                let descriptor = StructDescriptor {
                    name: name.clone(),
                    fields: fields
                        .into_iter()
                        .map(|(field, ty)| (field, ty.trim().to_string()))
                        .collect(),
                };
                (name, descriptor)
            })
            .collect();

        let operations = file
            .operations
            .into_iter()
            .map(|(name, entry)| {
                let signature = OperationSignature {
                    inputs: entry
                        .inputs
                        .iter()
                        .map(|e| parse_type_expr(e, &types))
                        .collect(),
                    outputs: entry
                        .outputs
                        .iter()
                        .map(|e| parse_type_expr(e, &types))
                        .collect(),
                };
                (name, signature)
            })
            .collect();

        Self {
            namespace: file.namespace,
            types,
            operations,
        }
    }

    /// Parse a descriptor from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, String> {
        let file: DescriptorFile =
            serde_yaml_ng::from_str(yaml).map_err(|e| format!("descriptor parse error: {}", e))?;
        Ok(Self::from_descriptor(file))
    }

    /// Load a descriptor file from disk.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read descriptor {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Resolve a type expression against this registry's composite types.
    pub fn type_expr(&self, expr: &str) -> TypeDescriptor {
        parse_type_expr(expr, &self.types)
    }
}

impl OperationRegistry for StaticRegistry {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resolve(&self, name: &str) -> Option<OperationSignature> {
        self.operations.get(name).cloned()
    }

    fn list_operations(&self) -> Vec<(String, OperationSignature)> {
        self.operations
            .iter()
            .filter(|(name, _)| !is_administrative(name))
            .map(|(name, sig)| (name.clone(), sig.clone()))
            .collect()
    }

    fn list_types(&self) -> Vec<StructDescriptor> {
        self.types.values().cloned().collect()
    }
}

/// Parse a type expression. Never fails; unparseable input is `Unknown`.
pub fn parse_type_expr(expr: &str, types: &IndexMap<String, StructDescriptor>) -> TypeDescriptor {
    let expr = expr.trim();
    match expr {
        "ctx" | "context" | "Context" => return TypeDescriptor::Context,
        "error" | "Error" => return TypeDescriptor::Error,
        _ => {}
    }

    if let Some(rest) = expr.strip_prefix('&') {
        return wrap(rest, types, expr, TypeDescriptor::Ref);
    }
    if let Some(inner) = expr.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return wrap(inner, types, expr, TypeDescriptor::List);
    }
    if let Some(inner) = expr.strip_prefix("Vec<").and_then(|s| s.strip_suffix('>')) {
        return wrap(inner, types, expr, TypeDescriptor::List);
    }
    if let Some(inner) = expr.strip_prefix("Option<").and_then(|s| s.strip_suffix('>')) {
        return wrap(inner, types, expr, TypeDescriptor::Ref);
    }

    if !is_type_path(expr) {
        return TypeDescriptor::Unknown(expr.to_string());
    }
    match types.get(expr) {
        Some(s) => TypeDescriptor::Struct(s.clone()),
        None => TypeDescriptor::Scalar(expr.to_string()),
    }
}

fn wrap(
    inner: &str,
    types: &IndexMap<String, StructDescriptor>,
    whole: &str,
    make: fn(Box<TypeDescriptor>) -> TypeDescriptor,
) -> TypeDescriptor {
    if inner.trim().is_empty() {
        return TypeDescriptor::Unknown(whole.to_string());
    }
    match parse_type_expr(inner, types) {
        TypeDescriptor::Unknown(_) => TypeDescriptor::Unknown(whole.to_string()),
        parsed => make(Box::new(parsed)),
    }
}

/// `name` or `module::name`, each segment an identifier.
fn is_type_path(expr: &str) -> bool {
    !expr.is_empty()
        && expr.split("::").all(|seg| {
            let mut chars = seg.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
