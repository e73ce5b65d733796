//! QG-005: Plan compilation: the normalized schema becomes a compiled plan.
//!
//! Walks groups and members in declaration order. For each member it binds
//! the argument (collapsing all arguments into one distinct-parameter
//! collection) and names the result. Afterwards it decides whether a
//! `<Name>Params` wrapper is needed and wires result variables into the
//! output fields.

use super::error::{GenResult, ResolutionError, ShapeError};
use super::naming::{is_reserved, result_var_for, to_snake_case, ResultNames};
use super::types::*;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

/// Name of the wrapper parameter when one is synthesized.
pub const PARAM_STRUCT_NAME: &str = "params";

/// Compile a validated schema.
pub fn compile(
    schema: &NormalizedSchema,
    catalog: &Catalog,
    namespace: &str,
) -> GenResult<CompiledPlan> {
    let mut params = ParamCollector::new(&schema.name);
    let mut names = ResultNames::new();
    reserve_param_names(schema, catalog, &mut names);
    let mut groups = Vec::with_capacity(schema.groups.len());

    for (index, group) in schema.groups.iter().enumerate() {
        let transactional = group.declared_transactional && group.members.len() > 1;
        let mut members = Vec::with_capacity(group.members.len());

        for member in &group.members {
            let meta = catalog.get(&member.operation).ok_or_else(|| {
                ResolutionError::UnknownOperation {
                    schema: schema.name.clone(),
                    operation: member.operation.clone(),
                }
            })?;
            if let Some(ref reason) = meta.unanalyzable {
                return Err(ShapeError::UnanalyzableOperation {
                    schema: schema.name.clone(),
                    operation: member.operation.clone(),
                    reason: reason.clone(),
                }
                .into());
            }

            let param_binding = params.bind(member, meta)?;
            let result_var_name = name_result(&schema.name, member, meta, &mut names)?;

            debug!(
                schema = %schema.name,
                group = index,
                operation = %member.operation,
                result = %result_var_name,
                "compiled member"
            );

            members.push(CompiledMember {
                operation_name: member.operation.clone(),
                result_var_name,
                result_type_name: meta.return_type_name.clone(),
                result_is_collection: meta.return_is_collection,
                is_error_only: meta.is_error_only,
                param_binding,
            });
        }

        groups.push(CompiledGroup {
            transactional,
            members,
        });
    }

    let distinct_params = params.into_entries();
    let (use_param_struct, func_param_name, func_param_type_name) = match distinct_params.len() {
        0 => (false, String::new(), String::new()),
        1 => {
            let only = &distinct_params[0];
            (false, only.field_name.clone(), only.type_name.clone())
        }
        _ => (
            true,
            PARAM_STRUCT_NAME.to_string(),
            format!("{}Params", schema.name),
        ),
    };

    let output_fields = assemble_output(&schema.output, &groups);
    let uses_shared_context = groups.iter().any(|g| g.transactional);

    Ok(CompiledPlan {
        name: schema.name.clone(),
        namespace: namespace.to_string(),
        distinct_params,
        use_param_struct,
        func_param_name,
        func_param_type_name,
        groups,
        output_type_name: schema.output.type_name.clone(),
        output_is_ref: schema.output.is_ref,
        output_fields,
        uses_shared_context,
    })
}

/// Claim every parameter field name up front so no result variable can
/// shadow an argument the body still needs.
fn reserve_param_names(schema: &NormalizedSchema, catalog: &Catalog, names: &mut ResultNames) {
    let members = schema.groups.iter().flat_map(|g| g.members.iter());
    for member in members {
        let Some(meta) = catalog.get(&member.operation) else {
            continue;
        };
        if !meta.has_param() || meta.unanalyzable.is_some() {
            continue;
        }
        let field = if meta.param_is_composite {
            composite_field_name(&meta.param_type_name)
        } else if let Some(ref name) = member.param_name {
            name.clone()
        } else if member.shared_param.is_some() {
            continue;
        } else {
            format!("{}_arg", to_snake_case(&meta.name))
        };
        names.claim_explicit(&field);
    }
}

/// Field name of a composite parameter: `snake(type)`, with `_param`
/// appended when that collides with a reserved binding (`Order` → `order_param`).
fn composite_field_name(type_name: &str) -> String {
    let field = to_snake_case(type_name);
    if is_reserved(&field) {
        format!("{}_param", field)
    } else {
        field
    }
}

/// Result variable for one member.
fn name_result(
    schema: &str,
    member: &NormalizedMember,
    meta: &OperationMetadata,
    names: &mut ResultNames,
) -> GenResult<String> {
    if meta.is_error_only {
        if member.result_name.is_some() {
            warn!(operation = %member.operation, "result_name ignored on an error-only operation");
        }
        return Ok(String::new());
    }

    match member.result_mode {
        ResultMode::Suppress => return Ok(String::new()),
        ResultMode::Discard => return Ok(DISCARD_MARKER.to_string()),
        ResultMode::Bind => {}
    }

    if let Some(ref explicit) = member.result_name {
        if !names.claim_explicit(explicit) {
            return Err(ShapeError::ResultNameConflict {
                schema: schema.to_string(),
                operation: member.operation.clone(),
                name: explicit.clone(),
            }
            .into());
        }
        return Ok(explicit.clone());
    }

    let base = result_var_for(&meta.return_type_name, meta.return_is_collection);
    Ok(names.claim_derived(&base))
}

/// Ordered collection of distinct parameters, keyed by field name.
struct ParamCollector<'a> {
    schema: &'a str,
    entries: IndexMap<String, DistinctParam>,
}

impl<'a> ParamCollector<'a> {
    fn new(schema: &'a str) -> Self {
        Self {
            schema,
            entries: IndexMap::new(),
        }
    }

    fn bind(&mut self, member: &NormalizedMember, meta: &OperationMetadata) -> GenResult<ParamBinding> {
        let has_override = member.param_name.is_some() || member.shared_param.is_some();

        if !meta.has_param() {
            if has_override {
                warn!(operation = %meta.name, "operation takes no parameter; override ignored");
            }
            return Ok(ParamBinding::None);
        }

        if meta.param_is_composite {
            if has_override {
                warn!(
                    operation = %meta.name,
                    param = %meta.param_type_name,
                    "composite parameters bind by type; override ignored"
                );
            }
            let field = composite_field_name(&meta.param_type_name);
            self.register(DistinctParam {
                field_name: field.clone(),
                type_name: meta.param_type_name.clone(),
                fields: meta.param_fields.clone(),
                composite: true,
            })?;
            return Ok(ParamBinding::Field { name: field });
        }

        if let Some(ref name) = member.param_name {
            if is_reserved(name) {
                return Err(ShapeError::ReservedParamName {
                    schema: self.schema.to_string(),
                    operation: meta.name.clone(),
                    name: name.clone(),
                }
                .into());
            }
            self.register(DistinctParam {
                field_name: name.clone(),
                type_name: meta.param_type_name.clone(),
                fields: meta.param_fields.clone(),
                composite: false,
            })?;
            return Ok(ParamBinding::Field { name: name.clone() });
        }

        if let Some(ref path) = member.shared_param {
            return self.share(meta, path);
        }

        let field = format!("{}_arg", to_snake_case(&meta.name));
        self.register(DistinctParam {
            field_name: field.clone(),
            type_name: meta.param_type_name.clone(),
            fields: meta.param_fields.clone(),
            composite: false,
        })?;
        Ok(ParamBinding::Field { name: field })
    }

    /// Add an entry, deduplicating identical ones.
    fn register(&mut self, entry: DistinctParam) -> GenResult<()> {
        match self.entries.get(&entry.field_name) {
            Some(existing) if existing.type_name == entry.type_name => Ok(()),
            Some(existing) => Err(ShapeError::ConflictingParam {
                schema: self.schema.to_string(),
                field: entry.field_name.clone(),
                existing: existing.type_name.clone(),
                incoming: entry.type_name,
            }
            .into()),
            None => {
                self.entries.insert(entry.field_name.clone(), entry);
                Ok(())
            }
        }
    }

    /// Bind to a parameter some earlier member already registered.
    fn share(&self, meta: &OperationMetadata, path: &ParamPath) -> GenResult<ParamBinding> {
        let root = self.entries.get(&path.root).ok_or_else(|| ResolutionError::UnboundSharedParam {
            schema: self.schema.to_string(),
            operation: meta.name.clone(),
            path: path.to_string(),
        })?;

        let shared_type = match path.rest.first() {
            None => Some(root.type_name.as_str()),
            Some(field) => {
                let ty = root.fields.get(field).filter(|_| root.composite).ok_or_else(|| {
                    ResolutionError::UnknownSharedField {
                        schema: self.schema.to_string(),
                        operation: meta.name.clone(),
                        path: path.to_string(),
                        root: path.root.clone(),
                        field: field.clone(),
                    }
                })?;
                (path.rest.len() == 1).then_some(ty.as_str())
            }
        };
        if let Some(ty) = shared_type {
            if ty != meta.param_type_name {
                warn!(
                    operation = %meta.name,
                    path = %path,
                    shared = ty,
                    expected = %meta.param_type_name,
                    "shared parameter type differs from the operation's parameter"
                );
            }
        }

        Ok(ParamBinding::Shared {
            root: path.root.clone(),
            path: path.rest.clone(),
        })
    }

    fn into_entries(self) -> IndexMap<String, DistinctParam> {
        self.entries
    }
}

/// Match output fields to result variables: by snake_case name first, then
/// by return type for fields still unfilled. A collection result only ever
/// fills a collection field, and a single result a single field.
fn assemble_output(output: &OutputShape, groups: &[CompiledGroup]) -> Vec<OutputField> {
    let bound: Vec<&CompiledMember> = groups
        .iter()
        .flat_map(|g| g.members.iter())
        .filter(|m| m.binds_result())
        .collect();
    let mut used: FxHashSet<&str> = FxHashSet::default();

    let mut sources: Vec<Option<String>> = output
        .fields
        .iter()
        .map(|(name, type_expr)| {
            let wanted = to_snake_case(name);
            let collection = is_collection_type(type_expr);
            bound
                .iter()
                .find(|m| m.result_var_name == wanted && m.result_is_collection == collection)
                .map(|m| {
                    used.insert(m.result_var_name.as_str());
                    m.result_var_name.clone()
                })
        })
        .collect();

    for ((_, type_expr), source) in output.fields.iter().zip(sources.iter_mut()) {
        if source.is_some() {
            continue;
        }
        let base = bare_type_name(type_expr);
        let collection = is_collection_type(type_expr);
        if let Some(m) = bound.iter().find(|m| {
            !used.contains(m.result_var_name.as_str())
                && m.result_type_name == base
                && m.result_is_collection == collection
        }) {
            used.insert(m.result_var_name.as_str());
            *source = Some(m.result_var_name.clone());
        }
    }

    output
        .fields
        .iter()
        .zip(sources)
        .map(|((name, type_name), source)| OutputField {
            name: name.clone(),
            type_name: type_name.clone(),
            source,
        })
        .collect()
}

/// `[Post]`, `&[Post]`, `Vec<Post>` are collections; `&Post` is not.
pub fn is_collection_type(expr: &str) -> bool {
    let s = expr.trim().trim_start_matches(|c: char| c == '&' || c.is_whitespace());
    s.starts_with('[') || s.starts_with("Vec<")
}

/// `&[Post]` → `Post`, `Vec<&User>` → `User`.
pub fn bare_type_name(expr: &str) -> &str {
    let mut s = expr.trim();
    loop {
        let next = if let Some(rest) = s.strip_prefix('&') {
            rest
        } else if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            inner
        } else if let Some(inner) = s.strip_prefix("Vec<").and_then(|r| r.strip_suffix('>')) {
            inner
        } else if let Some(inner) = s.strip_prefix("Option<").and_then(|r| r.strip_suffix('>')) {
            inner
        } else {
            return s;
        };
        s = next.trim();
    }
}
