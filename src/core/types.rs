//! QG-001: Types for configuration, schemas, catalog metadata and plans.
//!
//! Input types (config, aggregation schemas) derive Deserialize for YAML/TOML
//! loading and JsonSchema for `querygen schema`. Output types (metadata,
//! compiled plans) derive Serialize so renderers and `plan --json` can emit them.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Top-level querygen.yaml
// ============================================================================

/// Root configuration: one generator instance and the schemas it compiles.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QuerygenConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Namespace of the generated code; defaults to the catalog namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Output directory for generated artifacts
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Renderer template name
    #[serde(default = "default_template")]
    pub template: String,

    /// Type the generated operations are attached to
    #[serde(default = "default_receiver")]
    pub receiver: String,

    /// Operation descriptor file, relative to the config file
    pub catalog: String,

    /// Additional schema files (glob patterns, relative to the config file)
    #[serde(default)]
    pub include: Vec<String>,

    /// Aggregation schemas
    #[serde(default)]
    pub schemas: Vec<AggregationSchema>,

    /// Batch policy
    #[serde(default)]
    pub policy: Policy,
}

fn default_out_dir() -> String {
    ".".to_string()
}

fn default_template() -> String {
    "multi_query".to_string()
}

fn default_receiver() -> String {
    "Queries".to_string()
}

/// A file pulled in through `include`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SchemaFile {
    #[serde(default)]
    pub schemas: Vec<AggregationSchema>,
}

// ============================================================================
// Aggregation schemas
// ============================================================================

/// How a set of existing operations combine into one new operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AggregationSchema {
    /// Name of the generated operation (e.g. "GetUserWithPosts")
    pub name: String,

    /// Output type expression; must be a composite, optionally behind one `&`
    #[serde(default)]
    pub output: Option<String>,

    /// Operation groups, executed in order
    #[serde(default)]
    pub groups: Vec<OperationGroup>,

    /// Output file stem; defaults to the snake_case schema name
    #[serde(default)]
    pub out_file: Option<String>,
}

/// Operations that share a transaction or a concurrent join point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OperationGroup {
    /// Share one transactional context. Ignored for single-member groups.
    #[serde(default)]
    pub transactional: bool,

    /// Members, in declaration order
    #[serde(default)]
    pub members: Vec<SubqueryRef>,
}

/// One operation call inside a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubqueryRef {
    /// Operation name in the catalog
    pub operation: String,

    /// Name for a scalar parameter in the generated signature
    #[serde(default)]
    pub param_name: Option<String>,

    /// Path into a parameter bound earlier (e.g. "update_post_params.user_id")
    #[serde(default)]
    pub shared_param: Option<String>,

    /// Result variable override
    #[serde(default)]
    pub result_name: Option<String>,

    /// Call without binding the result at all
    #[serde(default)]
    pub suppress_result: bool,

    /// Bind the result to the discard marker
    #[serde(default)]
    pub discard_result: bool,
}

// ============================================================================
// Policy
// ============================================================================

/// Batch policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    /// What one failing schema does to the rest of the batch
    #[serde(default)]
    pub failure: FailurePolicy,
}

/// Failure handling strategy for a batch of schemas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    StopOnFirst,
    ContinueIndependent,
}

// ============================================================================
// Catalog
// ============================================================================

/// Per-operation shape metadata, built once per catalog scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationMetadata {
    pub name: String,
    /// Parameter type name, empty when the operation takes none
    pub param_type_name: String,
    /// Parameter fields; a scalar parameter is one unnamed field
    pub param_fields: IndexMap<String, String>,
    pub param_is_composite: bool,
    pub is_error_only: bool,
    pub return_type_name: String,
    pub return_is_collection: bool,
    pub return_is_single_ref: bool,
    pub return_fields: IndexMap<String, String>,
    /// Why the signature could not be analyzed, if it could not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unanalyzable: Option<String>,
}

impl OperationMetadata {
    /// Whether the operation takes an argument beyond the context.
    pub fn has_param(&self) -> bool {
        !self.param_type_name.is_empty()
    }
}

/// Name-indexed operation metadata plus the registry's composite types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub namespace: String,
    pub operations: IndexMap<String, OperationMetadata>,
    pub types: IndexMap<String, IndexMap<String, String>>,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&OperationMetadata> {
        self.operations.get(name)
    }
}

// ============================================================================
// Normalized schemas
// ============================================================================

/// What happens to a member's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    Bind,
    Suppress,
    Discard,
}

/// A dot-separated path into an already bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamPath {
    pub root: String,
    pub rest: Vec<String>,
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for seg in &self.rest {
            write!(f, ".{}", seg)?;
        }
        Ok(())
    }
}

/// Resolved output type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputShape {
    pub type_name: String,
    pub is_ref: bool,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMember {
    pub operation: String,
    pub param_name: Option<String>,
    pub shared_param: Option<ParamPath>,
    pub result_name: Option<String>,
    pub result_mode: ResultMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedGroup {
    pub declared_transactional: bool,
    pub members: Vec<NormalizedMember>,
}

/// A schema whose references were checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSchema {
    pub name: String,
    pub output: OutputShape,
    pub groups: Vec<NormalizedGroup>,
    pub out_file: String,
}

// ============================================================================
// Compiled plans
// ============================================================================

/// One field of the generated operation's parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistinctParam {
    pub field_name: String,
    pub type_name: String,
    pub fields: IndexMap<String, String>,
    pub composite: bool,
}

/// How a member receives its argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamBinding {
    None,
    /// A distinct parameter, by field name
    Field { name: String },
    /// A path into a parameter registered earlier
    Shared { root: String, path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledMember {
    pub operation_name: String,
    /// Empty when suppressed or error-only, `_` when discarded
    pub result_var_name: String,
    pub result_type_name: String,
    pub result_is_collection: bool,
    pub is_error_only: bool,
    pub param_binding: ParamBinding,
}

impl CompiledMember {
    /// Whether the member binds a usable result variable.
    pub fn binds_result(&self) -> bool {
        !self.result_var_name.is_empty() && self.result_var_name != DISCARD_MARKER
    }
}

/// Discard marker for results that are computed but dropped.
pub const DISCARD_MARKER: &str = "_";

/// Execution discipline of a compiled group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupExecution {
    Transactional,
    Concurrent,
    Direct,
}

impl fmt::Display for GroupExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transactional => write!(f, "TRANSACTIONAL"),
            Self::Concurrent => write!(f, "CONCURRENT"),
            Self::Direct => write!(f, "DIRECT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledGroup {
    /// Effective flag: declared transactional with more than one member
    pub transactional: bool,
    pub members: Vec<CompiledMember>,
}

impl CompiledGroup {
    pub fn execution(&self) -> GroupExecution {
        if self.transactional {
            GroupExecution::Transactional
        } else if self.members.len() > 1 {
            GroupExecution::Concurrent
        } else {
            GroupExecution::Direct
        }
    }
}

/// One output field and the result variable that fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputField {
    pub name: String,
    pub type_name: String,
    pub source: Option<String>,
}

/// The fully resolved orchestration model handed to a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPlan {
    pub name: String,
    pub namespace: String,
    pub distinct_params: IndexMap<String, DistinctParam>,
    pub use_param_struct: bool,
    pub func_param_name: String,
    pub func_param_type_name: String,
    pub groups: Vec<CompiledGroup>,
    pub output_type_name: String,
    pub output_is_ref: bool,
    pub output_fields: Vec<OutputField>,
    pub uses_shared_context: bool,
}

impl CompiledPlan {
    /// Expression that reaches a member's argument inside the generated body.
    pub fn binding_expr(&self, binding: &ParamBinding) -> Option<String> {
        let prefix = if self.use_param_struct {
            format!("{}.", self.func_param_name)
        } else {
            String::new()
        };
        match binding {
            ParamBinding::None => None,
            ParamBinding::Field { name } => Some(format!("{}{}", prefix, name)),
            ParamBinding::Shared { root, path } => {
                let mut expr = format!("{}{}", prefix, root);
                for seg in path {
                    expr.push('.');
                    expr.push_str(seg);
                }
                Some(expr)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qg001_config_parse() {
        let yaml = r#"
version: "1.0"
namespace: db
catalog: catalog.yaml
schemas:
  - name: GetUserWithPosts
    output: "&UserWithPosts"
    groups:
      - transactional: true
        members:
          - operation: UpdatePost
          - operation: UpdateUser
      - members:
          - operation: GetUser
            param_name: user_id
policy:
  failure: continue_independent
"#;
        let config: QuerygenConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.out_dir, ".");
        assert_eq!(config.template, "multi_query");
        assert_eq!(config.receiver, "Queries");
        assert_eq!(config.schemas.len(), 1);
        let schema = &config.schemas[0];
        assert!(schema.groups[0].transactional);
        assert!(!schema.groups[1].transactional);
        assert_eq!(schema.groups[1].members[0].param_name.as_deref(), Some("user_id"));
        assert_eq!(config.policy.failure, FailurePolicy::ContinueIndependent);
    }

    #[test]
    fn test_qg001_subquery_defaults() {
        let m: SubqueryRef = serde_yaml_ng::from_str("operation: GetUser").unwrap();
        assert_eq!(m.operation, "GetUser");
        assert!(m.param_name.is_none());
        assert!(m.shared_param.is_none());
        assert!(!m.suppress_result);
        assert!(!m.discard_result);
    }

    #[test]
    fn test_qg001_policy_default() {
        assert_eq!(Policy::default().failure, FailurePolicy::StopOnFirst);
    }

    #[test]
    fn test_qg001_param_path_display() {
        let p = ParamPath {
            root: "update_post_params".into(),
            rest: vec!["user_id".into()],
        };
        assert_eq!(p.to_string(), "update_post_params.user_id");
    }

    fn member(var: &str) -> CompiledMember {
        CompiledMember {
            operation_name: "Op".into(),
            result_var_name: var.into(),
            result_type_name: "T".into(),
            result_is_collection: false,
            is_error_only: false,
            param_binding: ParamBinding::None,
        }
    }

    #[test]
    fn test_qg001_group_execution() {
        let tx = CompiledGroup { transactional: true, members: vec![member("a"), member("b")] };
        let conc = CompiledGroup { transactional: false, members: vec![member("a"), member("b")] };
        let direct = CompiledGroup { transactional: false, members: vec![member("a")] };
        assert_eq!(tx.execution(), GroupExecution::Transactional);
        assert_eq!(conc.execution(), GroupExecution::Concurrent);
        assert_eq!(direct.execution(), GroupExecution::Direct);
        assert_eq!(GroupExecution::Concurrent.to_string(), "CONCURRENT");
    }

    #[test]
    fn test_qg001_binds_result() {
        assert!(member("user").binds_result());
        assert!(!member("").binds_result());
        assert!(!member(DISCARD_MARKER).binds_result());
    }

    #[test]
    fn test_qg001_binding_expr() {
        let mut plan = CompiledPlan {
            name: "Agg".into(),
            namespace: "db".into(),
            distinct_params: IndexMap::new(),
            use_param_struct: true,
            func_param_name: "params".into(),
            func_param_type_name: "AggParams".into(),
            groups: vec![],
            output_type_name: "Out".into(),
            output_is_ref: false,
            output_fields: vec![],
            uses_shared_context: false,
        };
        let field = ParamBinding::Field { name: "user_id".into() };
        let shared = ParamBinding::Shared { root: "post_params".into(), path: vec!["user_id".into()] };
        assert_eq!(plan.binding_expr(&field).unwrap(), "params.user_id");
        assert_eq!(plan.binding_expr(&shared).unwrap(), "params.post_params.user_id");
        assert!(plan.binding_expr(&ParamBinding::None).is_none());

        plan.use_param_struct = false;
        assert_eq!(plan.binding_expr(&field).unwrap(), "user_id");
        assert_eq!(plan.binding_expr(&shared).unwrap(), "post_params.user_id");
    }

    #[test]
    fn test_qg001_plan_serializes() {
        let binding = ParamBinding::Shared { root: "p".into(), path: vec!["x".into()] };
        let json = serde_json::to_string(&binding).unwrap();
        assert!(json.contains("\"kind\":\"shared\""));
    }
}
