use crate::value_objects::artifact_ref::ArtifactRef;
use crate::value_objects::component::ComponentSpec;
use crate::value_objects::node::Node;

/// Framework initialization arguments (`provider_uri`, `region` and any
/// remaining init keys, forwarded verbatim).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInit {
    pub provider_uri: String,
    pub region: Option<String>,
    pub extra: Node,
}

/// External workflow framework. Every call receives the configuration subtree
/// unmodified; the engine owns instantiation and execution.
pub trait WorkflowEngine {
    fn init(&mut self, init: &EngineInit) -> Result<(), String>;

    fn build_dataset(&mut self, dataset: &ComponentSpec) -> Result<ArtifactRef, String>;

    fn train_model(
        &mut self,
        model: &ComponentSpec,
        dataset: &ArtifactRef,
    ) -> Result<ArtifactRef, String>;

    fn run_record(
        &mut self,
        record: &ComponentSpec,
        model: &ArtifactRef,
        dataset: &ArtifactRef,
    ) -> Result<ArtifactRef, String>;
}
