use crate::config::{Instruments, LoadedConfig};
use crate::shared::fingerprint;
use qflow_domain::services::handlers::handler_columns;
use qflow_domain::value_objects::component::ComponentSpec;
use qflow_domain::value_objects::node::Node;
use serde_json::{json, Value};

/// Summary of a loaded config for `--mode inspect`.
pub fn describe(loaded: &LoadedConfig) -> Value {
    let tree = &loaded.document.tree;
    let config = &loaded.config;
    let handler = &config.data_handler_config;

    let keys: Vec<&str> = tree
        .as_map()
        .map(|mapping| mapping.keys().collect())
        .unwrap_or_default();
    let anchors: Vec<Value> = loaded
        .document
        .anchors
        .iter()
        .map(|anchor| json!({"name": anchor.name, "line": anchor.line, "kind": anchor.kind}))
        .collect();
    let instruments = match &handler.instruments {
        Instruments::Market(market) => json!(market),
        Instruments::List(list) => json!({"list": list.len()}),
    };

    let segments: serde_json::Map<String, Value> = config
        .task
        .dataset
        .kwargs
        .segments
        .named()
        .into_iter()
        .map(|(name, (start, end))| (name.to_string(), json!([start, end])))
        .collect();

    let mut components = vec![
        json!({"role": "model", "class": config.task.model.qualified_name()}),
        json!({"role": "dataset", "class": qualified(&config.task.dataset.class, config.task.dataset.module_path.as_deref())}),
        json!({"role": "handler", "class": config.task.dataset.kwargs.handler.qualified_name()}),
    ];
    if let Some(port) = &config.port_analysis_config {
        components.push(json!({"role": "strategy", "class": port.strategy.qualified_name()}));
    }
    components.extend(
        config
            .task
            .record
            .iter()
            .map(|record| json!({"role": "record", "class": record.qualified_name()})),
    );

    let feature_count = handler_component(tree)
        .ok()
        .and_then(|spec| handler_columns(&spec, HANDLER_PATH).ok())
        .map(|columns| columns.features.len());

    json!({
        "origin": loaded.document.origin,
        "keys": keys,
        "anchors": anchors,
        "provider_uri": config.provider_uri(),
        "region": config.region(),
        "market": config.market,
        "benchmark": config.benchmark,
        "instruments": instruments,
        "handler_window": [handler.start_time, handler.end_time],
        "fit_window": [handler.fit_start_time, handler.fit_end_time],
        "segments": segments,
        "components": components,
        "feature_count": feature_count,
        "fingerprint": fingerprint(tree),
    })
}

const HANDLER_PATH: &str = "task.dataset.kwargs.handler";

fn qualified(class: &str, module_path: Option<&str>) -> String {
    match module_path {
        Some(module) if !module.is_empty() => format!("{module}.{class}"),
        _ => class.to_string(),
    }
}

fn handler_component(tree: &Node) -> Result<ComponentSpec, String> {
    let node = tree
        .get_path(HANDLER_PATH)
        .ok_or_else(|| format!("missing {HANDLER_PATH}"))?;
    ComponentSpec::from_node(node, HANDLER_PATH)
}

/// Feature and label columns of the configured handler, for `--mode fields`.
pub fn fields_report(tree: &Node) -> Result<Value, String> {
    let spec = handler_component(tree)?;
    let columns = handler_columns(&spec, HANDLER_PATH)?;
    tracing::debug!(
        handler = %columns.handler,
        source = columns.source,
        features = columns.features.len(),
        "resolved handler columns"
    );
    Ok(json!({
        "handler": columns.handler,
        "source": columns.source,
        "feature_count": columns.features.len(),
        "label_count": columns.label.len(),
        "features": columns.features,
        "label": columns.label,
    }))
}
