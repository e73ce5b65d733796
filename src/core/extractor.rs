//! QG-002: Operation metadata extraction: one pass over the registry.
//!
//! Best effort by contract: a signature that cannot be analyzed yields
//! metadata with `unanalyzable` set. Strictness is deferred to the compiler,
//! and only for schemas that actually reference the operation.

use super::types::{Catalog, OperationMetadata};
use crate::registry::{is_administrative, OperationRegistry, OperationSignature, TypeDescriptor};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Build the catalog from a registry.
pub fn extract(registry: &dyn OperationRegistry) -> Catalog {
    let mut operations = IndexMap::new();

    for (name, signature) in registry.list_operations() {
        if is_administrative(&name) {
            debug!(operation = %name, "skipping administrative operation");
            continue;
        }
        let metadata = analyze(&name, &signature);
        if let Some(ref reason) = metadata.unanalyzable {
            warn!(operation = %name, %reason, "operation signature is unanalyzable");
        }
        operations.insert(name, metadata);
    }

    let types = registry
        .list_types()
        .into_iter()
        .map(|s| (s.name, s.fields))
        .collect();

    debug!(
        namespace = registry.namespace(),
        operations = operations.len(),
        "catalog extracted"
    );

    Catalog {
        namespace: registry.namespace().to_string(),
        operations,
        types,
    }
}

/// Analyze one signature.
pub fn analyze(name: &str, signature: &OperationSignature) -> OperationMetadata {
    let mut data = OperationMetadata {
        name: name.to_string(),
        ..Default::default()
    };

    if let Err(reason) = analyze_returns(&mut data, &signature.outputs) {
        data.unanalyzable = Some(reason);
        return data;
    }
    if let Err(reason) = analyze_param(&mut data, &signature.inputs) {
        data.unanalyzable = Some(reason);
    }
    data
}

fn analyze_returns(data: &mut OperationMetadata, outputs: &[TypeDescriptor]) -> Result<(), String> {
    let first = match outputs {
        [] => return Err("operation has no results".to_string()),
        [_] => {
            data.is_error_only = true;
            return Ok(());
        }
        [first, ..] => first,
    };

    let target = match first {
        TypeDescriptor::Ref(inner) => {
            data.return_is_single_ref = true;
            inner.as_ref()
        }
        TypeDescriptor::List(inner) => {
            data.return_is_collection = true;
            match inner.as_ref() {
                TypeDescriptor::Ref(elem) => elem.as_ref(),
                other => other,
            }
        }
        other => other,
    };

    match target {
        TypeDescriptor::Struct(s) => {
            data.return_type_name = s.name.clone();
            data.return_fields = s.fields.clone();
            Ok(())
        }
        TypeDescriptor::Scalar(name) => {
            data.return_type_name = name.clone();
            Ok(())
        }
        other => Err(format!("unsupported result type {}", other)),
    }
}

fn analyze_param(data: &mut OperationMetadata, inputs: &[TypeDescriptor]) -> Result<(), String> {
    match inputs {
        [] => Err("missing invocation context".to_string()),
        [first, ..] if *first != TypeDescriptor::Context => {
            Err(format!("first input must be the context, got {}", first))
        }
        [_] => Ok(()),
        [_, param] => {
            if let Some(s) = param.as_struct() {
                data.param_type_name = s.name.clone();
                data.param_fields = s.fields.clone();
                data.param_is_composite = true;
                return Ok(());
            }
            match param {
                TypeDescriptor::Scalar(_) | TypeDescriptor::List(_) | TypeDescriptor::Ref(_) => {
                    let type_name = param.to_string();
                    data.param_fields.insert(String::new(), type_name.clone());
                    data.param_type_name = type_name;
                    Ok(())
                }
                other => Err(format!("unsupported parameter type {}", other)),
            }
        }
        _ => Err(format!("expected at most one argument, got {}", inputs.len() - 1)),
    }
}
