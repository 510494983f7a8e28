use chrono::NaiveDate;
use qflow_domain::services::document::{parse_document_with_anchors, AnchorInfo, ParseError};
use qflow_domain::value_objects::date_range::DateRange;
use qflow_domain::value_objects::node::Node;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

pub const PROVIDER_URI_ENV: &str = "QFLOW_PROVIDER_URI";

type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: ParseError,
    },

    #[error("invalid config {origin}: {message}")]
    Schema { origin: String, message: String },
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "not_found",
            ConfigError::Io { .. } => "io",
            ConfigError::Parse { .. } => "parse",
            ConfigError::Schema { .. } => "schema",
        }
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowConfig {
    pub provider_uri: Option<String>,
    pub region: Option<String>,
    pub qlib_init: Option<QlibInitConfig>,
    pub market: String,
    pub benchmark: String,
    pub data_handler_config: DataHandlerConfig,
    pub port_analysis_config: Option<PortAnalysisConfig>,
    pub task: TaskConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QlibInitConfig {
    pub provider_uri: String,
    pub region: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Instruments {
    Market(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DataHandlerConfig {
    pub start_time: NaiveDate,
    pub end_time: NaiveDate,
    pub fit_start_time: Option<NaiveDate>,
    pub fit_end_time: Option<NaiveDate>,
    pub instruments: Instruments,
    #[serde(default)]
    pub infer_processors: Vec<ProcessorConfig>,
    #[serde(default)]
    pub learn_processors: Vec<ProcessorConfig>,
    pub label: Option<serde_json::Value>,
    pub filter_pipe: Option<serde_json::Value>,
    /// Remaining handler arguments, forwarded untouched.
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl DataHandlerConfig {
    pub fn window(&self) -> Result<DateRange, String> {
        DateRange::new(self.start_time, self.end_time)
    }

    /// `None` when either fit bound is absent.
    pub fn fit_window(&self) -> Option<Result<DateRange, String>> {
        match (self.fit_start_time, self.fit_end_time) {
            (Some(start), Some(end)) => Some(DateRange::new(start, end)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub class: String,
    pub module_path: Option<String>,
    #[serde(default = "empty_kwargs")]
    pub kwargs: serde_json::Value,
}

fn empty_kwargs() -> serde_json::Value {
    serde_json::Value::Object(JsonMap::new())
}

impl ComponentConfig {
    pub fn qualified_name(&self) -> String {
        match &self.module_path {
            Some(module) if !module.is_empty() => format!("{module}.{}", self.class),
            _ => self.class.clone(),
        }
    }
}

/// Processor lists mix bare class names with full component mappings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ProcessorConfig {
    Name(String),
    Component(ComponentConfig),
}

impl ProcessorConfig {
    pub fn class(&self) -> &str {
        match self {
            ProcessorConfig::Name(name) => name,
            ProcessorConfig::Component(component) => &component.class,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortAnalysisConfig {
    pub strategy: ComponentConfig,
    pub backtest: BacktestConfig,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Backtest arguments are handed to the engine as-is; only the keys the
/// validator checks are typed, the rest (`shift`, `exchange_kwargs`, ...) ride
/// along in `extra`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BacktestConfig {
    pub verbose: Option<bool>,
    pub limit_threshold: Option<f64>,
    pub account: Option<f64>,
    pub benchmark: Option<String>,
    pub deal_price: Option<String>,
    pub open_cost: Option<f64>,
    pub close_cost: Option<f64>,
    pub min_cost: Option<f64>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub model: ComponentConfig,
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub record: Vec<ComponentConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub class: String,
    pub module_path: Option<String>,
    pub kwargs: DatasetKwargs,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatasetKwargs {
    pub handler: ComponentConfig,
    pub segments: Segments,
    #[serde(flatten)]
    pub extra: JsonMap,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Segments {
    pub train: (NaiveDate, NaiveDate),
    pub valid: (NaiveDate, NaiveDate),
    pub test: (NaiveDate, NaiveDate),
}

impl Segments {
    pub fn named(&self) -> [(&'static str, (NaiveDate, NaiveDate)); 3] {
        [("train", self.train), ("valid", self.valid), ("test", self.test)]
    }
}

impl WorkflowConfig {
    /// Typed view over a resolved tree. The tree is projected to JSON and
    /// deserialized; exactly one of `provider_uri` / `qlib_init.provider_uri`
    /// must be present.
    pub fn from_tree(tree: &Node, origin: &str) -> Result<Self, ConfigError> {
        let schema = |message: String| ConfigError::Schema {
            origin: origin.to_string(),
            message,
        };

        let config: WorkflowConfig =
            serde_json::from_value(tree.to_json()).map_err(|err| schema(err.to_string()))?;

        match (&config.provider_uri, &config.qlib_init) {
            (Some(_), Some(_)) => {
                return Err(schema(
                    "provider_uri is set both at top level and in qlib_init".to_string(),
                ))
            }
            (None, None) => {
                return Err(schema(
                    "missing provider_uri (set it at top level or in qlib_init)".to_string(),
                ))
            }
            _ => {}
        }
        if config.provider_uri().is_some_and(|uri| uri.trim().is_empty()) {
            return Err(schema("provider_uri cannot be empty".to_string()));
        }
        Ok(config)
    }

    pub fn provider_uri(&self) -> Option<&str> {
        self.provider_uri
            .as_deref()
            .or_else(|| self.qlib_init.as_ref().map(|init| init.provider_uri.as_str()))
    }

    pub fn region(&self) -> Option<&str> {
        self.region
            .as_deref()
            .or_else(|| self.qlib_init.as_ref().and_then(|init| init.region.as_deref()))
    }
}

/// A parsed document together with its typed view.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub document: LoadedDocument,
    pub config: WorkflowConfig,
}

/// A parsed document before any schema is applied.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub origin: String,
    pub path: Option<PathBuf>,
    pub source: String,
    pub tree: Node,
    pub anchors: Vec<AnchorInfo>,
}

pub fn load_config(path: &Path) -> Result<WorkflowConfig, ConfigError> {
    Ok(load_config_with_source(path)?.config)
}

pub fn load_config_with_source(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let start = Instant::now();
    let result = load_document(path).and_then(with_typed_view);
    record_load_metrics(start, &result);
    if let Ok(loaded) = &result {
        tracing::info!(
            path = %path.display(),
            anchors = loaded.document.anchors.len(),
            records = loaded.config.task.record.len(),
            "loaded workflow config"
        );
    }
    result
}

/// Reads and parses a document without applying the typed view.
pub fn load_document(path: &Path) -> Result<LoadedDocument, ConfigError> {
    let source = fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source: err,
            }
        }
    })?;
    let mut document = parse_source(source, path.display().to_string())?;
    document.path = Some(path.to_path_buf());
    Ok(document)
}

pub fn parse_config(src: &str) -> Result<LoadedConfig, ConfigError> {
    parse_source(src.to_string(), "<inline>".to_string()).and_then(with_typed_view)
}

fn parse_source(source: String, origin: String) -> Result<LoadedDocument, ConfigError> {
    let document = match parse_document_with_anchors(&source) {
        Ok(document) => document,
        Err(err) => {
            tracing::debug!(origin = %origin, kind = err.kind().as_str(), line = err.line(), "config parse failed");
            return Err(ConfigError::Parse { origin, source: err });
        }
    };
    Ok(LoadedDocument {
        origin,
        path: None,
        source,
        tree: document.root,
        anchors: document.anchors,
    })
}

fn with_typed_view(document: LoadedDocument) -> Result<LoadedConfig, ConfigError> {
    let config = WorkflowConfig::from_tree(&document.tree, &document.origin)?;
    Ok(LoadedConfig { document, config })
}

fn record_load_metrics(start: Instant, result: &Result<LoadedConfig, ConfigError>) {
    let result_label = match result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    metrics::counter!("qflow.config.load.calls_total", "result" => result_label).increment(1);
    metrics::histogram!("qflow.config.load_ms", "result" => result_label)
        .record(start.elapsed().as_millis() as f64);
}

/// Non-empty `QFLOW_PROVIDER_URI`, applied at dispatch time.
pub fn provider_uri_override() -> Option<String> {
    std::env::var(PROVIDER_URI_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
