use qflow_application::config::{self, LoadedDocument};
use qflow_application::workflow::{plan_workflow, run_workflow, WorkflowPlan, WorkflowReport};
use qflow_application::{fingerprint, inspection, run_id, validation};
use qflow_domain::repositories::artifacts::ArtifactWriter;
use qflow_domain::repositories::workflow_engine::WorkflowEngine;
use qflow_domain::services::document::emit_document;
use qflow_infrastructure::artifacts::FilesystemArtifactWriter;
use qflow_infrastructure::engines::{CommandEngine, DryRunEngine};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlessMode {
    Validate,
    Resolve,
    Emit,
    Inspect,
    Fields,
    Dispatch,
}

impl HeadlessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadlessMode::Validate => "validate",
            HeadlessMode::Resolve => "resolve",
            HeadlessMode::Emit => "emit",
            HeadlessMode::Inspect => "inspect",
            HeadlessMode::Fields => "fields",
            HeadlessMode::Dispatch => "dispatch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    DryRun,
    Command,
}

pub struct HeadlessArgs {
    pub mode: HeadlessMode,
    pub config_path: PathBuf,
    pub strict: bool,
    pub out_dir: Option<PathBuf>,
    pub engine: EngineKind,
    pub engine_cmd: Option<String>,
    pub engine_args: Vec<String>,
}

pub fn run_headless(args: HeadlessArgs) -> Result<serde_json::Value, String> {
    let mode = args.mode.as_str();
    let span = tracing::info_span!("headless", mode, config = %args.config_path.display());
    let _enter = span.enter();
    let start = Instant::now();

    let result = match args.mode {
        HeadlessMode::Validate => run_validate(&args),
        HeadlessMode::Resolve => run_resolve(&args),
        HeadlessMode::Emit => run_emit(&args),
        HeadlessMode::Inspect => run_inspect(&args),
        HeadlessMode::Fields => run_fields(&args),
        HeadlessMode::Dispatch => run_dispatch(&args),
    };

    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!("qflow.cli.runs_total", "mode" => mode, "result" => result_label)
        .increment(1);
    metrics::histogram!("qflow.cli.run_ms", "mode" => mode)
        .record(start.elapsed().as_millis() as f64);
    result
}

fn load_document(path: &Path) -> Result<LoadedDocument, String> {
    config::load_document(path).map_err(|err| err.to_string())
}

fn load_config(path: &Path) -> Result<config::LoadedConfig, String> {
    config::load_config_with_source(path).map_err(|err| err.to_string())
}

fn run_validate(args: &HeadlessArgs) -> Result<serde_json::Value, String> {
    let loaded = load_config(&args.config_path)?;
    let report = validation::validate(&loaded.config, args.strict)?;
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, "{}", warning.message);
    }
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "validate",
        "strict": args.strict,
        "config": loaded.document.origin,
        "fingerprint": fingerprint(&loaded.document.tree),
        "report": report,
    }))
}

fn run_resolve(args: &HeadlessArgs) -> Result<serde_json::Value, String> {
    let document = load_document(&args.config_path)?;
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "resolve",
        "config": document.origin,
        "fingerprint": fingerprint(&document.tree),
        "tree": document.tree.to_json(),
    }))
}

fn run_emit(args: &HeadlessArgs) -> Result<serde_json::Value, String> {
    let document = load_document(&args.config_path)?;
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "emit",
        "config": document.origin,
        "fingerprint": fingerprint(&document.tree),
        "text": emit_document(&document.tree),
    }))
}

fn run_inspect(args: &HeadlessArgs) -> Result<serde_json::Value, String> {
    let loaded = load_config(&args.config_path)?;
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "inspect",
        "summary": inspection::describe(&loaded),
    }))
}

fn run_fields(args: &HeadlessArgs) -> Result<serde_json::Value, String> {
    let document = load_document(&args.config_path)?;
    let fields = inspection::fields_report(&document.tree)?;
    Ok(serde_json::json!({
        "status": "ok",
        "mode": "fields",
        "config": document.origin,
        "fields": fields,
    }))
}

fn build_engine(args: &HeadlessArgs) -> Result<Box<dyn WorkflowEngine>, String> {
    match args.engine {
        EngineKind::DryRun => Ok(Box::new(DryRunEngine::new())),
        EngineKind::Command => {
            let program = args
                .engine_cmd
                .clone()
                .ok_or_else(|| "--engine-cmd is required with --engine command".to_string())?;
            Ok(Box::new(CommandEngine::new(program, args.engine_args.clone())?))
        }
    }
}

fn config_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run_dispatch(args: &HeadlessArgs) -> Result<serde_json::Value, String> {
    let loaded = load_config(&args.config_path)?;
    let report = validation::validate(&loaded.config, args.strict)?;
    let tree = &loaded.document.tree;

    let mut plan: WorkflowPlan = plan_workflow(tree)?;
    if let Some(provider_uri) = config::provider_uri_override() {
        tracing::info!(provider_uri = %provider_uri, "provider_uri overridden from environment");
        plan.override_provider_uri(provider_uri);
    }

    let fingerprint = fingerprint(tree);
    let run_id = run_id(&config_stem(&args.config_path), &fingerprint);
    let run_dir = args.out_dir.as_ref().map(|out| out.join(&run_id));
    let writer = FilesystemArtifactWriter::new();
    if let Some(run_dir) = &run_dir {
        writer.ensure_dir(run_dir)?;
        writer.write_json(&run_dir.join("resolved.json"), &tree.to_json())?;
        writer.write_text(&run_dir.join("config_snapshot.yaml"), &emit_document(tree))?;
    }

    let mut engine = build_engine(args)?;
    let workflow = run_workflow(&plan, engine.as_mut());
    if let Some(run_dir) = &run_dir {
        writer.write_json(&run_dir.join("dispatch.json"), &dispatch_json(&run_id, &workflow))?;
    }
    let workflow = workflow.into_result()?;

    Ok(serde_json::json!({
        "status": "ok",
        "mode": "dispatch",
        "run_id": run_id,
        "fingerprint": fingerprint,
        "warnings": report.warnings,
        "steps": workflow.steps,
        "artifacts": run_dir.as_deref().map(artifacts_for_run),
    }))
}

fn dispatch_json(run_id: &str, workflow: &WorkflowReport) -> serde_json::Value {
    serde_json::json!({
        "run_id": run_id,
        "succeeded": workflow.succeeded,
        "steps": workflow.steps,
    })
}

fn artifacts_for_run(run_dir: &Path) -> serde_json::Value {
    serde_json::json!({
        "run_dir": run_dir.display().to_string(),
        "resolved_json": run_dir.join("resolved.json").display().to_string(),
        "config_snapshot_yaml": run_dir.join("config_snapshot.yaml").display().to_string(),
        "dispatch_json": run_dir.join("dispatch.json").display().to_string(),
    })
}
