use super::fields::{FeatureSpec, FieldList, LoaderFields, PriceSpec, RollingSpec, VolumeSpec};
use crate::value_objects::component::ComponentSpec;
use crate::value_objects::node::{Mapping, Node};
use serde::Serialize;

pub const HANDLER_MODULE: &str = "qlib.contrib.data.handler";

const CLOSE_LABEL: &str = "Ref($close, -2)/Ref($close, -1) - 1";
const VWAP_LABEL: &str = "Ref($vwap, -2)/Ref($vwap, -1) - 1";

/// Class names understood by [`lookup_handler`], aliases included.
pub const HANDLER_NAMES: [&str; 6] = [
    "Alpha158",
    "Alpha158vwap",
    "Alpha360",
    "ALPHA360",
    "Alpha360vwap",
    "ALPHA360vwap",
];

/// Columns and processors a built-in handler produces when constructed with
/// default arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerDefinition {
    pub name: &'static str,
    pub module_path: &'static str,
    pub features: FieldList,
    pub label: FieldList,
    pub infer_processors: Vec<ComponentSpec>,
    pub learn_processors: Vec<ComponentSpec>,
}

pub fn lookup_handler(class: &str) -> Option<HandlerDefinition> {
    let (name, vwap, alpha360) = match class {
        "Alpha158" => ("Alpha158", false, false),
        "Alpha158vwap" => ("Alpha158vwap", true, false),
        "Alpha360" | "ALPHA360" => ("ALPHA360", false, true),
        "Alpha360vwap" | "ALPHA360vwap" => ("ALPHA360vwap", true, true),
        _ => return None,
    };

    let label_expr = if vwap { VWAP_LABEL } else { CLOSE_LABEL };
    let label = FieldList {
        exprs: vec![label_expr.to_string()],
        names: vec!["LABEL0".to_string()],
    };

    let definition = if alpha360 {
        HandlerDefinition {
            name,
            module_path: HANDLER_MODULE,
            features: alpha360_features().to_fields(),
            label,
            infer_processors: vec![ComponentSpec {
                class: "ConfigSectionProcessor".to_string(),
                module_path: Some("qlib.contrib.data.processor".to_string()),
                kwargs: Node::Map(Mapping::new()),
            }],
            learn_processors: Vec::new(),
        }
    } else {
        HandlerDefinition {
            name,
            module_path: HANDLER_MODULE,
            features: alpha158_features(vwap).to_fields(),
            label,
            infer_processors: Vec::new(),
            learn_processors: alpha158_learn_processors(),
        }
    };
    Some(definition)
}

fn alpha360_features() -> FeatureSpec {
    FeatureSpec {
        price: Some(PriceSpec {
            windows: (0..60).collect(),
            ..PriceSpec::default()
        }),
        volume: Some(VolumeSpec {
            windows: (0..60).collect(),
        }),
        ..FeatureSpec::default()
    }
}

fn alpha158_features(vwap: bool) -> FeatureSpec {
    let mut features = vec!["OPEN", "HIGH", "LOW"];
    if vwap {
        features.push("VWAP");
    }
    FeatureSpec {
        kbar: true,
        price: Some(PriceSpec {
            windows: vec![0],
            features: features.into_iter().map(str::to_string).collect(),
        }),
        volume: None,
        rolling: Some(RollingSpec::default()),
    }
}

fn alpha158_learn_processors() -> Vec<ComponentSpec> {
    let mut kwargs = Mapping::new();
    kwargs.insert("fields_group", Node::from("label"));
    vec![
        ComponentSpec {
            class: "DropnaLabel".to_string(),
            module_path: None,
            kwargs: Node::Map(Mapping::new()),
        },
        ComponentSpec {
            class: "CSZScoreNorm".to_string(),
            module_path: None,
            kwargs: Node::Map(kwargs),
        },
    ]
}

/// Feature and label columns a configured handler will produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerColumns {
    pub handler: String,
    /// `catalog` for built-in handlers, `data_loader` when the kwargs define one.
    pub source: &'static str,
    pub features: FieldList,
    pub label: FieldList,
}

/// Resolves the columns for a handler component. An explicit
/// `kwargs.data_loader` wins over the catalogue; `kwargs.label` overrides the
/// label columns either way.
pub fn handler_columns(handler: &ComponentSpec, path: &str) -> Result<HandlerColumns, String> {
    let (source, features, mut label) = match handler.kwarg("data_loader") {
        Some(loader) if !loader.is_null() => {
            let loader_path = format!("{path}.kwargs.data_loader");
            let loader = ComponentSpec::from_node(loader, &loader_path)?;
            let config = loader
                .kwarg("config")
                .ok_or_else(|| format!("{loader_path}.kwargs: missing 'config'"))?;
            match LoaderFields::from_node(config, &format!("{loader_path}.kwargs.config"))? {
                LoaderFields::Flat { fields } => ("data_loader", fields, FieldList::default()),
                grouped => (
                    "data_loader",
                    grouped.group("feature").cloned().unwrap_or_default(),
                    grouped.group("label").cloned().unwrap_or_default(),
                ),
            }
        }
        _ => {
            let definition = lookup_handler(&handler.class).ok_or_else(|| {
                format!(
                    "{path}: unknown handler class '{}' (known: {})",
                    handler.class,
                    HANDLER_NAMES.join(", ")
                )
            })?;
            ("catalog", definition.features, definition.label)
        }
    };

    if let Some(override_label) = handler.kwarg("label") {
        if !override_label.is_null() {
            label = FieldList::from_node(override_label, &format!("{path}.kwargs.label"))?;
        }
    }

    Ok(HandlerColumns {
        handler: handler.qualified_name(),
        source,
        features,
        label,
    })
}
