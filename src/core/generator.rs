//! QG-009: Generator: validate, compile, render and write, per schema.
//!
//! One generator instance owns its catalog, settings and renderer. Each
//! schema is independent: a failure aborts that schema only, and the batch
//! policy decides whether the rest still run.

use super::compiler::compile;
use super::error::{GenResult, GenerationError};
use super::extractor::extract;
use super::fingerprint::plan_fingerprint;
use super::types::*;
use super::validator::validate;
use super::writer::{artifact_path, write_artifact};
use crate::registry::OperationRegistry;
use crate::render::{RenderError, Renderer};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Build the operation catalog from a registry.
pub fn build_catalog(registry: &dyn OperationRegistry) -> Catalog {
    extract(registry)
}

/// Per-instance generation settings.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Overrides the catalog namespace when set
    pub namespace: Option<String>,
    pub out_dir: PathBuf,
    pub template: String,
}

impl GeneratorSettings {
    /// Settings from a config file, with `out_dir` resolved against `base`.
    pub fn from_config(config: &QuerygenConfig, base: &Path) -> Self {
        Self {
            namespace: config.namespace.clone(),
            out_dir: base.join(&config.out_dir),
            template: config.template.clone(),
        }
    }
}

/// One written (or already up to date) artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub schema: String,
    pub path: PathBuf,
    pub fingerprint: String,
    /// False when the file already held identical content
    pub written: bool,
}

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub generated: Vec<GeneratedArtifact>,
    pub failed: Vec<(String, GenerationError)>,
    /// Schemas never attempted because an earlier one failed
    pub skipped: Vec<String>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Generator {
    catalog: Catalog,
    settings: GeneratorSettings,
    renderer: Box<dyn Renderer>,
}

impl Generator {
    pub fn new(catalog: Catalog, settings: GeneratorSettings, renderer: Box<dyn Renderer>) -> Self {
        Self {
            catalog,
            settings,
            renderer,
        }
    }

    pub fn from_registry(
        registry: &dyn OperationRegistry,
        settings: GeneratorSettings,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self::new(build_catalog(registry), settings, renderer)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Namespace of generated code.
    pub fn namespace(&self) -> &str {
        self.settings
            .namespace
            .as_deref()
            .unwrap_or(&self.catalog.namespace)
    }

    /// Validate and compile one schema without rendering.
    pub fn plan(&self, schema: &AggregationSchema) -> GenResult<CompiledPlan> {
        let normalized = validate(schema, &self.catalog)?;
        compile(&normalized, &self.catalog, self.namespace())
    }

    /// Generate one schema's artifact. Nothing is written unless rendering
    /// succeeded.
    pub fn generate(&self, schema: &AggregationSchema) -> GenResult<GeneratedArtifact> {
        let normalized = validate(schema, &self.catalog)?;
        let plan = compile(&normalized, &self.catalog, self.namespace())?;

        let template = &self.settings.template;
        let extension = self.renderer.file_extension(template)?;
        let path = artifact_path(&self.settings.out_dir, &normalized.out_file, &extension);
        let text = self.renderer.render(template, &plan, &path)?;
        let fingerprint = plan_fingerprint(&plan).map_err(RenderError::from)?;
        let written = write_artifact(&path, &text)?;

        info!(
            schema = %schema.name,
            path = %path.display(),
            written,
            "generated artifact"
        );

        Ok(GeneratedArtifact {
            schema: schema.name.clone(),
            path,
            fingerprint,
            written,
        })
    }

    /// Generate every schema in order under `policy`.
    pub fn generate_all(&self, schemas: &[AggregationSchema], policy: FailurePolicy) -> BatchReport {
        let mut report = BatchReport::default();

        for (i, schema) in schemas.iter().enumerate() {
            match self.generate(schema) {
                Ok(artifact) => report.generated.push(artifact),
                Err(e) => {
                    error!(schema = %schema.name, error = %e, "generation failed");
                    report.failed.push((schema.name.clone(), e));
                    if policy == FailurePolicy::StopOnFirst {
                        report.skipped = schemas[i + 1..].iter().map(|s| s.name.clone()).collect();
                        break;
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ResolutionError;
    use crate::registry::StaticRegistry;
    use crate::render::BuiltinRenderer;

    const DESCRIPTOR: &str = r#"
namespace: db
types:
  User: { id: i64, name: String }
  Post: { id: i64, user_id: i64, title: String }
  PostsParams: { user_id: i64, limit: i64 }
  UserWithPosts: { user: User, posts: "[Post]" }
operations:
  GetUser:
    inputs: [ctx, i64]
    outputs: ["&User", error]
  GetPosts:
    inputs: [ctx, PostsParams]
    outputs: ["[Post]", error]
"#;

    fn schema(name: &str, ops: &[&str]) -> AggregationSchema {
        AggregationSchema {
            name: name.into(),
            output: Some("&UserWithPosts".into()),
            groups: vec![OperationGroup {
                transactional: false,
                members: ops
                    .iter()
                    .map(|op| SubqueryRef {
                        operation: op.to_string(),
                        param_name: (*op == "GetUser").then(|| "user_id".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            }],
            out_file: None,
        }
    }

    fn generator(out_dir: &Path, template: &str) -> Generator {
        let registry = StaticRegistry::parse(DESCRIPTOR).unwrap();
        Generator::from_registry(
            &registry,
            GeneratorSettings {
                namespace: None,
                out_dir: out_dir.to_path_buf(),
                template: template.into(),
            },
            Box::new(BuiltinRenderer::new("Queries")),
        )
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render(&self, template: &str, plan: &CompiledPlan, _: &Path) -> Result<String, RenderError> {
            Err(RenderError::Unsupported {
                template: template.into(),
                plan: plan.name.clone(),
                reason: "always fails".into(),
            })
        }

        fn file_extension(&self, _: &str) -> Result<String, RenderError> {
            Ok("txt".into())
        }
    }

    #[test]
    fn test_qg009_generate_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let g = generator(dir.path(), "multi_query");
        let artifact = g.generate(&schema("GetUserWithPosts", &["GetUser", "GetPosts"])).unwrap();
        assert_eq!(artifact.path, dir.path().join("get_user_with_posts.rs"));
        assert!(artifact.written);
        assert!(artifact.fingerprint.starts_with("blake3:"));
        let text = std::fs::read_to_string(&artifact.path).unwrap();
        assert!(text.contains(&artifact.fingerprint));
        assert!(text.contains("pub async fn get_user_with_posts"));
    }

    #[test]
    fn test_qg009_regenerate_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let g = generator(dir.path(), "multi_query");
        let s = schema("GetUserWithPosts", &["GetUser", "GetPosts"]);
        let first = g.generate(&s).unwrap();
        let second = g.generate(&s).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(!second.written);
    }

    #[test]
    fn test_qg009_unknown_operation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let g = generator(dir.path(), "multi_query");
        let err = g.generate(&schema("Ghostly", &["GetGhost"])).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Resolution(ResolutionError::UnknownOperation { .. })
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_qg009_render_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StaticRegistry::parse(DESCRIPTOR).unwrap();
        let g = Generator::from_registry(
            &registry,
            GeneratorSettings {
                namespace: None,
                out_dir: dir.path().to_path_buf(),
                template: "any".into(),
            },
            Box::new(FailingRenderer),
        );
        let err = g.generate(&schema("GetUserWithPosts", &["GetUser"])).unwrap_err();
        assert!(matches!(err, GenerationError::Render(RenderError::Unsupported { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_qg009_unknown_template() {
        let dir = tempfile::tempdir().unwrap();
        let g = generator(dir.path(), "go");
        let err = g.generate(&schema("GetUserWithPosts", &["GetUser"])).unwrap_err();
        assert!(matches!(err, GenerationError::Render(RenderError::UnknownTemplate(_))));
    }

    #[test]
    fn test_qg009_plan_json_template() {
        let dir = tempfile::tempdir().unwrap();
        let g = generator(dir.path(), "plan_json");
        let artifact = g.generate(&schema("GetUserWithPosts", &["GetUser", "GetPosts"])).unwrap();
        assert_eq!(artifact.path.extension().unwrap(), "json");
    }

    #[test]
    fn test_qg009_namespace_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = generator(dir.path(), "multi_query");
        assert_eq!(g.namespace(), "db");
        g.settings.namespace = Some("store".into());
        let plan = g.plan(&schema("GetUserWithPosts", &["GetUser"])).unwrap();
        assert_eq!(plan.namespace, "store");
    }

    #[test]
    fn test_qg009_batch_stop_on_first() {
        let dir = tempfile::tempdir().unwrap();
        let g = generator(dir.path(), "multi_query");
        let schemas = vec![
            schema("First", &["GetUser"]),
            schema("Broken", &["GetGhost"]),
            schema("Third", &["GetPosts"]),
        ];
        let report = g.generate_all(&schemas, FailurePolicy::StopOnFirst);
        assert!(!report.is_success());
        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.failed[0].0, "Broken");
        assert_eq!(report.skipped, vec!["Third"]);
        assert!(!dir.path().join("third.rs").exists());
    }

    #[test]
    fn test_qg009_batch_continue_independent() {
        let dir = tempfile::tempdir().unwrap();
        let g = generator(dir.path(), "multi_query");
        let schemas = vec![
            schema("First", &["GetUser"]),
            schema("Broken", &["GetGhost"]),
            schema("Third", &["GetPosts"]),
        ];
        let report = g.generate_all(&schemas, FailurePolicy::ContinueIndependent);
        assert_eq!(report.generated.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.skipped.is_empty());
        assert!(dir.path().join("third.rs").exists());
    }

    #[test]
    fn test_qg009_settings_from_config() {
        let config: QuerygenConfig =
            serde_yaml_ng::from_str("version: \"1.0\"\ncatalog: c.yaml\nout_dir: gen\n").unwrap();
        let settings = GeneratorSettings::from_config(&config, Path::new("proj"));
        assert_eq!(settings.out_dir, PathBuf::from("proj/gen"));
        assert_eq!(settings.template, "multi_query");
        assert!(settings.namespace.is_none());
    }
}
