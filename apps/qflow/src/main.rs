use clap::{Parser, ValueEnum};
use qflow::headless::{EngineKind, HeadlessArgs, HeadlessMode};
use qflow::obs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qflow")]
#[command(about = "Workflow config loader and dispatcher.", version)]
struct Cli {
    /// validate | resolve | emit | inspect | fields | dispatch
    #[arg(long)]
    mode: Mode,

    /// Workflow config file (YAML). If omitted, uses env QFLOW_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Treat validation warnings as failures (exit code 2).
    #[arg(long)]
    strict: bool,

    /// Directory for dispatch artifacts; a `<run_id>/` subdirectory is created.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Engine used by dispatch mode.
    #[arg(long, value_enum, default_value_t = Engine::DryRun)]
    engine: Engine,

    /// Program started for each step with `--engine command`.
    #[arg(long)]
    engine_cmd: Option<String>,

    /// Argument passed to the engine program (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Log output format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Prometheus listener (host:port). If omitted, uses env QFLOW_METRICS_ADDR.
    #[arg(long)]
    metrics_addr: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    Validate,
    Resolve,
    Emit,
    Inspect,
    Fields,
    Dispatch,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Engine {
    DryRun,
    Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LogFormat {
    Text,
    Json,
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn main() {
    let cli = Cli::parse();

    let log_format = match cli.log_format {
        LogFormat::Text => "text",
        LogFormat::Json => "json",
    };
    if let Err(err) = obs::init_tracing("info", log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    let metrics_addr = cli.metrics_addr.or_else(|| env_non_empty("QFLOW_METRICS_ADDR"));
    if let Err(err) = obs::init_metrics(metrics_addr.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let config_path = cli
        .config
        .or_else(|| env_non_empty("QFLOW_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| {
            eprintln!("error: missing --config and env QFLOW_CONFIG is not set");
            std::process::exit(1);
        });

    let mode = match cli.mode {
        Mode::Validate => HeadlessMode::Validate,
        Mode::Resolve => HeadlessMode::Resolve,
        Mode::Emit => HeadlessMode::Emit,
        Mode::Inspect => HeadlessMode::Inspect,
        Mode::Fields => HeadlessMode::Fields,
        Mode::Dispatch => HeadlessMode::Dispatch,
    };
    let engine = match cli.engine {
        Engine::DryRun => EngineKind::DryRun,
        Engine::Command => EngineKind::Command,
    };

    let result = qflow::headless::run_headless(HeadlessArgs {
        mode,
        config_path,
        strict: cli.strict,
        out_dir: cli.out_dir,
        engine,
        engine_cmd: cli.engine_cmd,
        engine_args: cli.engine_args,
    });

    match result {
        Ok(json) => {
            println!(
                "{}",
                serde_json::to_string(&json)
                    .unwrap_or_else(|_| "{\"status\":\"error\",\"error\":\"json\"}".to_string())
            );
            std::process::exit(0);
        }
        Err(err) => {
            let code = if err.starts_with("strict validation failed") {
                2
            } else {
                1
            };
            eprintln!("error: {err}");
            std::process::exit(code);
        }
    }
}
