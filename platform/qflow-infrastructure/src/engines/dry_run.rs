use qflow_domain::repositories::workflow_engine::{EngineInit, WorkflowEngine};
use qflow_domain::value_objects::artifact_ref::ArtifactRef;
use qflow_domain::value_objects::component::ComponentSpec;
use serde::Serialize;

/// One call the engine received, with kwargs projected to JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineCall {
    pub stage: &'static str,
    pub class: Option<String>,
    pub module_path: Option<String>,
    pub kwargs: serde_json::Value,
    pub inputs: Vec<String>,
}

/// Records every call and hands back synthetic artifact ids
/// (`<stage>:<class>#<n>`). Nothing is instantiated.
#[derive(Debug, Default)]
pub struct DryRunEngine {
    calls: Vec<EngineCall>,
    fail_on: Option<(String, String)>,
    issued: usize,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first call whose stage and class match.
    pub fn failing_on(mut self, stage: &str, class: &str) -> Self {
        self.fail_on = Some((stage.to_string(), class.to_string()));
        self
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn into_calls(self) -> Vec<EngineCall> {
        self.calls
    }

    fn component_call(
        &mut self,
        stage: &'static str,
        component: &ComponentSpec,
        inputs: &[&ArtifactRef],
    ) -> Result<ArtifactRef, String> {
        self.calls.push(EngineCall {
            stage,
            class: Some(component.class.clone()),
            module_path: component.module_path.clone(),
            kwargs: component.kwargs.to_json(),
            inputs: inputs.iter().map(|artifact| artifact.id.clone()).collect(),
        });
        tracing::debug!(stage, class = %component.class, "dry-run call");

        if self
            .fail_on
            .as_ref()
            .is_some_and(|(fail_stage, fail_class)| fail_stage == stage && fail_class == &component.class)
        {
            return Err(format!("dry-run failure injected at {stage} '{}'", component.class));
        }
        self.issued += 1;
        Ok(ArtifactRef::new(format!(
            "{stage}:{}#{}",
            component.class, self.issued
        )))
    }
}

impl WorkflowEngine for DryRunEngine {
    fn init(&mut self, init: &EngineInit) -> Result<(), String> {
        let mut kwargs = serde_json::Map::new();
        kwargs.insert(
            "provider_uri".to_string(),
            serde_json::Value::String(init.provider_uri.clone()),
        );
        if let Some(region) = &init.region {
            kwargs.insert("region".to_string(), serde_json::Value::String(region.clone()));
        }
        if let serde_json::Value::Object(extra) = init.extra.to_json() {
            kwargs.extend(extra);
        }
        self.calls.push(EngineCall {
            stage: "init",
            class: None,
            module_path: None,
            kwargs: serde_json::Value::Object(kwargs),
            inputs: Vec::new(),
        });
        if self.fail_on.as_ref().is_some_and(|(stage, _)| stage == "init") {
            return Err("dry-run failure injected at init".to_string());
        }
        Ok(())
    }

    fn build_dataset(&mut self, dataset: &ComponentSpec) -> Result<ArtifactRef, String> {
        self.component_call("dataset", dataset, &[])
    }

    fn train_model(
        &mut self,
        model: &ComponentSpec,
        dataset: &ArtifactRef,
    ) -> Result<ArtifactRef, String> {
        self.component_call("model", model, &[dataset])
    }

    fn run_record(
        &mut self,
        record: &ComponentSpec,
        model: &ArtifactRef,
        dataset: &ArtifactRef,
    ) -> Result<ArtifactRef, String> {
        self.component_call("record", record, &[model, dataset])
    }
}
