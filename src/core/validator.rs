//! QG-004: Schema validation against the catalog, and normalization.
//!
//! Aborts one schema on the first unresolved reference or malformed output
//! type. Fills every optional member field with an explicit value so the
//! compiler never has to guess.

use super::error::{GenResult, ResolutionError, ShapeError};
use super::naming::{is_identifier, to_snake_case};
use super::types::*;

/// Built-in value types that can never be an output composite.
const SCALAR_TYPES: &[&str] = &[
    "bool", "char", "str", "String", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16",
    "u32", "u64", "u128", "usize", "f32", "f64",
];

/// Validate `schema` against `catalog` and normalize it.
pub fn validate(schema: &AggregationSchema, catalog: &Catalog) -> GenResult<NormalizedSchema> {
    let output = resolve_output(schema, catalog)?;

    let mut groups = Vec::with_capacity(schema.groups.len());
    for group in &schema.groups {
        let mut members = Vec::with_capacity(group.members.len());
        for member in &group.members {
            if catalog.get(&member.operation).is_none() {
                return Err(ResolutionError::UnknownOperation {
                    schema: schema.name.clone(),
                    operation: member.operation.clone(),
                }
                .into());
            }
            members.push(normalize_member(&schema.name, member)?);
        }
        groups.push(NormalizedGroup {
            declared_transactional: group.transactional,
            members,
        });
    }

    let out_file = schema
        .out_file
        .clone()
        .unwrap_or_else(|| to_snake_case(&schema.name));

    Ok(NormalizedSchema {
        name: schema.name.clone(),
        output,
        groups,
        out_file,
    })
}

/// Resolve the output type expression to a composite with its fields.
fn resolve_output(schema: &AggregationSchema, catalog: &Catalog) -> GenResult<OutputShape> {
    let expr = match schema.output.as_deref().map(str::trim) {
        Some(e) if !e.is_empty() => e,
        _ => {
            return Err(ResolutionError::MissingOutputType {
                schema: schema.name.clone(),
            }
            .into())
        }
    };

    let inner = expr.trim_start_matches(|c: char| c == '&' || c.is_whitespace());
    let depth = expr[..expr.len() - inner.len()].matches('&').count();
    if depth > 1 {
        return Err(ShapeError::DoubleIndirection {
            schema: schema.name.clone(),
            type_name: expr.to_string(),
        }
        .into());
    }

    if inner.starts_with('[')
        || inner.starts_with("Vec<")
        || inner.starts_with("Option<")
        || SCALAR_TYPES.contains(&inner)
    {
        return Err(ShapeError::NotComposite {
            schema: schema.name.clone(),
            type_name: expr.to_string(),
        }
        .into());
    }

    let fields = catalog.types.get(inner).ok_or_else(|| ResolutionError::UnknownOutputType {
        schema: schema.name.clone(),
        type_name: inner.to_string(),
    })?;
    if fields.is_empty() {
        return Err(ShapeError::NotComposite {
            schema: schema.name.clone(),
            type_name: inner.to_string(),
        }
        .into());
    }

    Ok(OutputShape {
        type_name: inner.to_string(),
        is_ref: depth == 1,
        fields: fields
            .iter()
            .map(|(name, ty)| (name.clone(), ty.clone()))
            .collect(),
    })
}

fn normalize_member(schema: &str, member: &SubqueryRef) -> GenResult<NormalizedMember> {
    let result_mode = if member.suppress_result {
        ResultMode::Suppress
    } else if member.discard_result {
        ResultMode::Discard
    } else {
        ResultMode::Bind
    };

    let shared_param = match member.shared_param.as_deref() {
        None => None,
        Some(path) => Some(parse_param_path(path).ok_or_else(|| ShapeError::InvalidParamPath {
            schema: schema.to_string(),
            path: path.to_string(),
        })?),
    };

    Ok(NormalizedMember {
        operation: member.operation.clone(),
        param_name: member.param_name.clone(),
        shared_param,
        result_name: member.result_name.clone(),
        result_mode,
    })
}

/// `a.b.c` → root `a`, rest `[b, c]`. Every segment must be an identifier.
pub fn parse_param_path(path: &str) -> Option<ParamPath> {
    let mut segments = path.trim().split('.');
    let root = segments.next()?.to_string();
    let rest: Vec<String> = segments.map(str::to_string).collect();
    if !is_identifier(&root) || !rest.iter().all(|s| is_identifier(s)) {
        return None;
    }
    Some(ParamPath { root, rest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GenerationError;
    use crate::core::extractor::extract;
    use crate::registry::StaticRegistry;

    const DESCRIPTOR: &str = r#"
namespace: db
types:
  User: { id: i64, name: String }
  Post: { id: i64, title: String }
  UserWithPosts: { user: User, posts: "[Post]" }
  Empty: {}
operations:
  GetUser:
    inputs: [ctx, i64]
    outputs: ["&User", error]
  GetPosts:
    inputs: [ctx, i64]
    outputs: ["[Post]", error]
"#;

    fn catalog() -> Catalog {
        extract(&StaticRegistry::parse(DESCRIPTOR).unwrap())
    }

    fn schema(output: Option<&str>, ops: &[&str]) -> AggregationSchema {
        AggregationSchema {
            name: "GetUserWithPosts".into(),
            output: output.map(str::to_string),
            groups: vec![OperationGroup {
                transactional: false,
                members: ops
                    .iter()
                    .map(|op| SubqueryRef {
                        operation: op.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            }],
            out_file: None,
        }
    }

    #[test]
    fn test_qg004_valid_schema() {
        let n = validate(&schema(Some("&UserWithPosts"), &["GetUser", "GetPosts"]), &catalog()).unwrap();
        assert_eq!(n.output.type_name, "UserWithPosts");
        assert!(n.output.is_ref);
        let fields: Vec<&str> = n.output.fields.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["user", "posts"]);
        assert_eq!(n.out_file, "get_user_with_posts");
        assert_eq!(n.groups[0].members[0].result_mode, ResultMode::Bind);
    }

    #[test]
    fn test_qg004_direct_output() {
        let n = validate(&schema(Some("UserWithPosts"), &["GetUser"]), &catalog()).unwrap();
        assert!(!n.output.is_ref);
    }

    #[test]
    fn test_qg004_missing_output() {
        let err = validate(&schema(None, &["GetUser"]), &catalog()).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Resolution(ResolutionError::MissingOutputType { .. })
        ));
        let err = validate(&schema(Some("  "), &["GetUser"]), &catalog()).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Resolution(ResolutionError::MissingOutputType { .. })
        ));
    }

    #[test]
    fn test_qg004_unknown_output() {
        let err = validate(&schema(Some("Ghost"), &["GetUser"]), &catalog()).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Resolution(ResolutionError::UnknownOutputType { .. })
        ));
    }

    #[test]
    fn test_qg004_double_indirection() {
        let err = validate(&schema(Some("&&UserWithPosts"), &["GetUser"]), &catalog()).unwrap_err();
        assert!(matches!(err, GenerationError::Shape(ShapeError::DoubleIndirection { .. })));
    }

    #[test]
    fn test_qg004_double_indirection_with_spaces() {
        let err = validate(&schema(Some("& &UserWithPosts"), &["GetUser"]), &catalog()).unwrap_err();
        assert!(matches!(err, GenerationError::Shape(ShapeError::DoubleIndirection { .. })));
        let n = validate(&schema(Some("& UserWithPosts"), &["GetUser"]), &catalog()).unwrap();
        assert!(n.output.is_ref);
        assert_eq!(n.output.type_name, "UserWithPosts");
    }

    #[test]
    fn test_qg004_scalar_output_not_composite() {
        for output in ["i64", "&String", "bool"] {
            let err = validate(&schema(Some(output), &["GetUser"]), &catalog()).unwrap_err();
            assert!(matches!(err, GenerationError::Shape(ShapeError::NotComposite { .. })), "{output}");
        }
    }

    #[test]
    fn test_qg004_not_composite() {
        let err = validate(&schema(Some("[User]"), &["GetUser"]), &catalog()).unwrap_err();
        assert!(matches!(err, GenerationError::Shape(ShapeError::NotComposite { .. })));
        let err = validate(&schema(Some("Empty"), &["GetUser"]), &catalog()).unwrap_err();
        assert!(matches!(err, GenerationError::Shape(ShapeError::NotComposite { .. })));
    }

    #[test]
    fn test_qg004_unknown_operation() {
        let err = validate(&schema(Some("UserWithPosts"), &["GetUser", "Ghost"]), &catalog())
            .unwrap_err();
        match err {
            GenerationError::Resolution(ResolutionError::UnknownOperation { operation, .. }) => {
                assert_eq!(operation, "Ghost")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_qg004_normalize_result_modes() {
        let mut s = schema(Some("UserWithPosts"), &["GetUser", "GetPosts"]);
        s.groups[0].members[0].suppress_result = true;
        s.groups[0].members[0].discard_result = true;
        s.groups[0].members[1].discard_result = true;
        let n = validate(&s, &catalog()).unwrap();
        assert_eq!(n.groups[0].members[0].result_mode, ResultMode::Suppress);
        assert_eq!(n.groups[0].members[1].result_mode, ResultMode::Discard);
    }

    #[test]
    fn test_qg004_shared_param_path() {
        let mut s = schema(Some("UserWithPosts"), &["GetUser"]);
        s.groups[0].members[0].shared_param = Some("post_params.user_id".into());
        let n = validate(&s, &catalog()).unwrap();
        let path = n.groups[0].members[0].shared_param.clone().unwrap();
        assert_eq!(path.root, "post_params");
        assert_eq!(path.rest, vec!["user_id"]);

        s.groups[0].members[0].shared_param = Some("post_params..user_id".into());
        let err = validate(&s, &catalog()).unwrap_err();
        assert!(matches!(err, GenerationError::Shape(ShapeError::InvalidParamPath { .. })));
    }

    #[test]
    fn test_qg004_explicit_out_file() {
        let mut s = schema(Some("UserWithPosts"), &["GetUser"]);
        s.out_file = Some("custom".into());
        assert_eq!(validate(&s, &catalog()).unwrap().out_file, "custom");
    }
}
