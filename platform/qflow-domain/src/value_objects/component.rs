use crate::value_objects::node::{Mapping, Node};
use serde::Serialize;

/// External component reference: the framework locates `class` (inside
/// `module_path` when given) and calls it with `kwargs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSpec {
    pub class: String,
    pub module_path: Option<String>,
    pub kwargs: Node,
}

impl ComponentSpec {
    /// Accepts `{class, module_path?, kwargs?}` or a bare class name string.
    /// `kwargs` is kept verbatim; a missing one becomes an empty mapping.
    pub fn from_node(node: &Node, path: &str) -> Result<Self, String> {
        match node {
            Node::Str(class) => {
                if class.trim().is_empty() {
                    return Err(format!("{path}: component class cannot be empty"));
                }
                Ok(Self {
                    class: class.clone(),
                    module_path: None,
                    kwargs: Node::Map(Mapping::new()),
                })
            }
            Node::Map(mapping) => {
                for key in mapping.keys() {
                    if !matches!(key, "class" | "module_path" | "kwargs") {
                        return Err(format!(
                            "{path}: unknown component key '{key}' (expected class, module_path, kwargs)"
                        ));
                    }
                }
                let class = match mapping.get("class") {
                    Some(Node::Str(class)) if !class.trim().is_empty() => class.clone(),
                    Some(other) => {
                        return Err(format!(
                            "{path}.class: expected a non-empty string, got {}",
                            other.kind()
                        ))
                    }
                    None => return Err(format!("{path}: missing component class")),
                };
                let module_path = match mapping.get("module_path") {
                    None | Some(Node::Null) => None,
                    Some(Node::Str(module)) => Some(module.clone()),
                    Some(other) => {
                        return Err(format!(
                            "{path}.module_path: expected a string, got {}",
                            other.kind()
                        ))
                    }
                };
                let kwargs = match mapping.get("kwargs") {
                    None | Some(Node::Null) => Node::Map(Mapping::new()),
                    Some(kwargs @ Node::Map(_)) => kwargs.clone(),
                    Some(other) => {
                        return Err(format!(
                            "{path}.kwargs: expected a mapping, got {}",
                            other.kind()
                        ))
                    }
                };
                Ok(Self {
                    class,
                    module_path,
                    kwargs,
                })
            }
            other => Err(format!(
                "{path}: expected a component mapping or class name, got {}",
                other.kind()
            )),
        }
    }

    /// `module_path.class`, or just the class when no module is given.
    pub fn qualified_name(&self) -> String {
        match &self.module_path {
            Some(module) if !module.is_empty() => format!("{module}.{}", self.class),
            _ => self.class.clone(),
        }
    }

    pub fn kwarg(&self, key: &str) -> Option<&Node> {
        self.kwargs.get(key)
    }
}
