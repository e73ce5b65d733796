//! QG-014: CLI subcommands: init, validate, catalog, plan, generate, schema, completions.

use crate::core::generator::{Generator, GeneratorSettings};
use crate::core::{parser, types};
use crate::registry::StaticRegistry;
use crate::render::BuiltinRenderer;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "querygen",
    version,
    about = "Compile aggregation schemas into transactional and concurrent query orchestration"
)]
pub struct Cli {
    /// Debug logging (overridden by QUERYGEN_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new querygen project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate querygen.yaml and resolve every schema against the catalog
    Validate {
        /// Path to querygen.yaml
        #[arg(short, long, default_value = "querygen.yaml")]
        file: PathBuf,
    },

    /// Show the operation catalog built from the descriptor
    Catalog {
        /// Path to querygen.yaml
        #[arg(short, long, default_value = "querygen.yaml")]
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show compiled plans without writing anything
    Plan {
        /// Path to querygen.yaml
        #[arg(short, long, default_value = "querygen.yaml")]
        file: PathBuf,

        /// Only this schema
        #[arg(short, long)]
        schema: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate code for every schema
    Generate {
        /// Path to querygen.yaml
        #[arg(short, long, default_value = "querygen.yaml")]
        file: PathBuf,

        /// Only this schema
        #[arg(short, long)]
        schema: Option<String>,

        /// Override the configured output directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Override the configured template
        #[arg(long)]
        template: Option<String>,
    },

    /// Print the JSON Schema of querygen.yaml
    Schema,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Catalog { file, json } => cmd_catalog(&file, json),
        Commands::Plan { file, schema, json } => cmd_plan(&file, schema.as_deref(), json),
        Commands::Generate {
            file,
            schema,
            out_dir,
            template,
        } => cmd_generate(&file, schema.as_deref(), out_dir, template),
        Commands::Schema => cmd_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "querygen", &mut std::io::stdout());
            Ok(())
        }
    }
}

const CONFIG_TEMPLATE: &str = r#"version: "1.0"
catalog: catalog.yaml
out_dir: generated
receiver: Queries

policy:
  failure: stop_on_first

schemas:
  - name: GetUserWithPosts
    output: "&UserWithPosts"
    groups:
      - members:
          - operation: GetUser
            param_name: user_id
          - operation: GetPosts
"#;

const CATALOG_TEMPLATE: &str = r#"namespace: db

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

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("querygen.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let catalog_path = path.join("catalog.yaml");
    if !catalog_path.exists() {
        std::fs::write(&catalog_path, CATALOG_TEMPLATE)
            .map_err(|e| format!("cannot write {}: {}", catalog_path.display(), e))?;
    }
    std::fs::write(&config_path, CONFIG_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized querygen project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", catalog_path.display());
    Ok(())
}

/// Parse and structurally validate a config file.
fn parse_and_validate(file: &Path) -> Result<types::QuerygenConfig, String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

/// Config plus a generator over its catalog.
fn load_project(file: &Path) -> Result<(types::QuerygenConfig, Generator), String> {
    let config = parse_and_validate(file)?;
    let base = parser::config_dir(file);
    let registry = StaticRegistry::load(&base.join(&config.catalog))?;
    let generator = Generator::from_registry(
        &registry,
        GeneratorSettings::from_config(&config, &base),
        Box::new(BuiltinRenderer::new(config.receiver.clone())),
    );
    Ok((config, generator))
}

fn select_schemas<'a>(
    schemas: &'a [types::AggregationSchema],
    filter: Option<&str>,
) -> Result<Vec<&'a types::AggregationSchema>, String> {
    match filter {
        None => Ok(schemas.iter().collect()),
        Some(name) => schemas
            .iter()
            .find(|s| s.name == name)
            .map(|s| vec![s])
            .ok_or_else(|| format!("schema '{}' not found", name)),
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let (config, generator) = load_project(file)?;

    let mut failures = 0;
    for schema in &config.schemas {
        if let Err(e) = generator.plan(schema) {
            eprintln!("  ERROR: {}", e);
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(format!("{} schema(s) failed to compile", failures));
    }
    println!(
        "OK: {} schema(s), {} operation(s) in catalog '{}'",
        config.schemas.len(),
        generator.catalog().operations.len(),
        generator.catalog().namespace
    );
    Ok(())
}

fn cmd_catalog(file: &Path, json: bool) -> Result<(), String> {
    let (_, generator) = load_project(file)?;
    let catalog = generator.catalog();

    if json {
        let text = serde_json::to_string_pretty(catalog)
            .map_err(|e| format!("serialize error: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    println!("Catalog: {} ({} operations)", catalog.namespace, catalog.operations.len());
    for meta in catalog.operations.values() {
        println!("  {}", describe_operation(meta));
    }
    Ok(())
}

/// One-line shape summary of an operation.
fn describe_operation(meta: &types::OperationMetadata) -> String {
    if let Some(ref reason) = meta.unanalyzable {
        return format!("{} UNANALYZABLE ({})", meta.name, reason);
    }
    let param = if !meta.has_param() {
        String::new()
    } else if meta.param_is_composite {
        format!("{} {{{}}}", meta.param_type_name, meta.param_fields.len())
    } else {
        meta.param_type_name.clone()
    };
    let result = if meta.is_error_only {
        "error".to_string()
    } else if meta.return_is_collection {
        format!("[{}]", meta.return_type_name)
    } else if meta.return_is_single_ref {
        format!("&{}", meta.return_type_name)
    } else {
        meta.return_type_name.clone()
    };
    format!("{}({}) -> {}", meta.name, param, result)
}

fn cmd_plan(file: &Path, schema_filter: Option<&str>, json: bool) -> Result<(), String> {
    let (config, generator) = load_project(file)?;
    let schemas = select_schemas(&config.schemas, schema_filter)?;

    let mut plans = Vec::with_capacity(schemas.len());
    for schema in schemas {
        plans.push(generator.plan(schema).map_err(|e| e.to_string())?);
    }

    if json {
        let text = serde_json::to_string_pretty(&plans)
            .map_err(|e| format!("serialize error: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    for plan in &plans {
        print_plan(plan)?;
        println!();
    }
    Ok(())
}

/// Display a compiled plan to stdout.
fn print_plan(plan: &types::CompiledPlan) -> Result<(), String> {
    let fingerprint = crate::core::fingerprint::plan_fingerprint(plan)
        .map_err(|e| format!("serialize error: {}", e))?;
    let output = if plan.output_is_ref {
        format!("&{}", plan.output_type_name)
    } else {
        plan.output_type_name.clone()
    };

    println!("Plan: {} -> {} (namespace {})", plan.name, output, plan.namespace);
    println!("  fingerprint: {}", fingerprint);
    if plan.use_param_struct {
        let fields: Vec<String> = plan
            .distinct_params
            .values()
            .map(|p| format!("{}: {}", p.field_name, p.type_name))
            .collect();
        println!(
            "  params: {} {{ {} }}",
            plan.func_param_type_name,
            fields.join(", ")
        );
    } else if !plan.func_param_name.is_empty() {
        println!("  param: {}: {}", plan.func_param_name, plan.func_param_type_name);
    }

    for (i, group) in plan.groups.iter().enumerate() {
        println!("  group {} [{}]", i, group.execution());
        for member in &group.members {
            let arg = plan.binding_expr(&member.param_binding).unwrap_or_default();
            let result = match member.result_var_name.as_str() {
                "" => String::new(),
                var => format!(" -> {}", var),
            };
            println!("    {}({}){}", member.operation_name, arg, result);
        }
    }

    for field in &plan.output_fields {
        let source = field.source.as_deref().unwrap_or("default");
        println!("  {} <- {}", field.name, source);
    }
    Ok(())
}

fn cmd_generate(
    file: &Path,
    schema_filter: Option<&str>,
    out_dir: Option<PathBuf>,
    template: Option<String>,
) -> Result<(), String> {
    let config = parse_and_validate(file)?;
    let base = parser::config_dir(file);
    let registry = StaticRegistry::load(&base.join(&config.catalog))?;

    let mut settings = GeneratorSettings::from_config(&config, &base);
    if let Some(dir) = out_dir {
        settings.out_dir = dir;
    }
    if let Some(t) = template {
        settings.template = t;
    }
    let generator = Generator::from_registry(
        &registry,
        settings,
        Box::new(BuiltinRenderer::new(config.receiver.clone())),
    );

    let schemas: Vec<types::AggregationSchema> = select_schemas(&config.schemas, schema_filter)?
        .into_iter()
        .cloned()
        .collect();
    let report = generator.generate_all(&schemas, config.policy.failure);

    for artifact in &report.generated {
        let status = if artifact.written { "wrote" } else { "unchanged" };
        println!("  {} {}: {}", status, artifact.schema, artifact.path.display());
    }
    for (schema, e) in &report.failed {
        eprintln!("  FAILED {}: {}", schema, e);
    }
    for schema in &report.skipped {
        println!("  skipped {}", schema);
    }

    println!();
    if !report.is_success() {
        println!(
            "Generate completed with errors: {} generated, {} FAILED, {} skipped",
            report.generated.len(),
            report.failed.len(),
            report.skipped.len()
        );
        return Err(format!("{} schema(s) failed", report.failed.len()));
    }
    println!("Generate complete: {} artifact(s).", report.generated.len());
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(types::QuerygenConfig);
    let text =
        serde_json::to_string_pretty(&schema).map_err(|e| format!("serialize error: {}", e))?;
    println!("{}", text);
    Ok(())
}
