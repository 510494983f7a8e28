use qflow_domain::repositories::workflow_engine::{EngineInit, WorkflowEngine};
use qflow_domain::value_objects::artifact_ref::ArtifactRef;
use qflow_domain::value_objects::component::ComponentSpec;
use qflow_domain::value_objects::node::{Mapping, Node};
use serde::Serialize;
use std::time::Instant;

/// The subtrees handed to the engine, in dispatch order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowPlan {
    pub init: EngineInit,
    pub dataset: ComponentSpec,
    pub model: ComponentSpec,
    pub records: Vec<ComponentSpec>,
}

impl WorkflowPlan {
    pub fn override_provider_uri(&mut self, provider_uri: impl Into<String>) {
        self.init.provider_uri = provider_uri.into();
    }
}

pub fn plan_workflow(tree: &Node) -> Result<WorkflowPlan, String> {
    let init = plan_init(tree)?;

    let task = tree
        .get("task")
        .ok_or_else(|| "missing 'task' section".to_string())?;
    let dataset = ComponentSpec::from_node(
        task.get("dataset")
            .ok_or_else(|| "task: missing 'dataset'".to_string())?,
        "task.dataset",
    )?;
    let model = ComponentSpec::from_node(
        task.get("model")
            .ok_or_else(|| "task: missing 'model'".to_string())?,
        "task.model",
    )?;

    let records = match task.get("record") {
        None | Some(Node::Null) => Vec::new(),
        Some(Node::Seq(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| ComponentSpec::from_node(item, &format!("task.record.{idx}")))
            .collect::<Result<Vec<_>, _>>()?,
        Some(single @ Node::Map(_)) => vec![ComponentSpec::from_node(single, "task.record")?],
        Some(other) => {
            return Err(format!(
                "task.record: expected a list of components, got {}",
                other.kind()
            ))
        }
    };

    Ok(WorkflowPlan {
        init,
        dataset,
        model,
        records,
    })
}

fn plan_init(tree: &Node) -> Result<EngineInit, String> {
    let (section, path) = match tree.get("qlib_init") {
        Some(init @ Node::Map(_)) => (init, "qlib_init."),
        Some(other) => {
            return Err(format!("qlib_init: expected a mapping, got {}", other.kind()))
        }
        None => (tree, ""),
    };

    let provider_uri = match section.get("provider_uri") {
        Some(Node::Str(uri)) if !uri.trim().is_empty() => uri.clone(),
        Some(other) => {
            return Err(format!(
                "{path}provider_uri: expected a non-empty string, got {}",
                other.kind()
            ))
        }
        None => return Err(format!("missing {path}provider_uri")),
    };
    let region = match section.get("region") {
        None | Some(Node::Null) => None,
        Some(Node::Str(region)) => Some(region.clone()),
        Some(other) => {
            return Err(format!(
                "{path}region: expected a string, got {}",
                other.kind()
            ))
        }
    };

    // Only a qlib_init section carries further framework arguments.
    let extra = match section.as_map() {
        Some(mapping) if !path.is_empty() => mapping
            .iter()
            .filter(|(key, _)| !matches!(*key, "provider_uri" | "region"))
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<Mapping>(),
        _ => Mapping::new(),
    };

    Ok(EngineInit {
        provider_uri,
        region,
        extra: Node::Map(extra),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Dataset,
    Model,
    Record,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Dataset => "dataset",
            Stage::Model => "model",
            Stage::Record => "record",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub stage: Stage,
    pub class: String,
    pub module_path: Option<String>,
    pub artifact: Option<ArtifactRef>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub steps: Vec<StepReport>,
    pub succeeded: bool,
}

impl WorkflowReport {
    pub fn failure(&self) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.error.is_some())
    }

    pub fn into_result(self) -> Result<WorkflowReport, String> {
        match self.failure() {
            Some(step) => Err(format!(
                "workflow failed at {} step '{}': {}",
                step.stage.as_str(),
                step.class,
                step.error.as_deref().unwrap_or("unknown error")
            )),
            None => Ok(self),
        }
    }
}

/// Runs init -> dataset -> model -> records. The first failing step ends the
/// run; nothing is retried.
pub fn run_workflow(plan: &WorkflowPlan, engine: &mut dyn WorkflowEngine) -> WorkflowReport {
    let mut steps = Vec::with_capacity(3 + plan.records.len());
    let run_start = Instant::now();

    let init_result = run_step(Stage::Init, "init", None, || {
        engine.init(&plan.init).map(|()| None)
    });
    let ok = push_step(&mut steps, init_result);
    if !ok {
        return finish(steps, run_start);
    }

    let dataset_result = run_step(
        Stage::Dataset,
        &plan.dataset.class,
        plan.dataset.module_path.as_deref(),
        || engine.build_dataset(&plan.dataset).map(Some),
    );
    let Some(dataset) = artifact_of(&mut steps, dataset_result) else {
        return finish(steps, run_start);
    };

    let model_result = run_step(
        Stage::Model,
        &plan.model.class,
        plan.model.module_path.as_deref(),
        || engine.train_model(&plan.model, &dataset).map(Some),
    );
    let Some(model) = artifact_of(&mut steps, model_result) else {
        return finish(steps, run_start);
    };

    for record in &plan.records {
        let result = run_step(
            Stage::Record,
            &record.class,
            record.module_path.as_deref(),
            || engine.run_record(record, &model, &dataset).map(Some),
        );
        if !push_step(&mut steps, result) {
            break;
        }
    }
    finish(steps, run_start)
}

fn run_step(
    stage: Stage,
    class: &str,
    module_path: Option<&str>,
    call: impl FnOnce() -> Result<Option<ArtifactRef>, String>,
) -> StepReport {
    let span = tracing::info_span!("workflow_step", stage = stage.as_str(), class = %class);
    let _guard = span.enter();

    let start = Instant::now();
    let result = call();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "qflow.workflow.step.calls_total",
        "stage" => stage.as_str(),
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!("qflow.workflow.step_ms", "stage" => stage.as_str())
        .record(elapsed_ms as f64);

    let (artifact, error) = match result {
        Ok(artifact) => {
            tracing::info!(
                artifact = artifact.as_ref().map(|a| a.id.as_str()).unwrap_or("-"),
                elapsed_ms,
                "workflow step finished"
            );
            (artifact, None)
        }
        Err(err) => {
            tracing::error!(error = %err, elapsed_ms, "workflow step failed");
            (None, Some(err))
        }
    };

    StepReport {
        stage,
        class: class.to_string(),
        module_path: module_path.map(str::to_string),
        artifact,
        elapsed_ms,
        error,
    }
}

fn push_step(steps: &mut Vec<StepReport>, step: StepReport) -> bool {
    let ok = step.error.is_none();
    steps.push(step);
    ok
}

fn artifact_of(steps: &mut Vec<StepReport>, step: StepReport) -> Option<ArtifactRef> {
    let artifact = if step.error.is_none() {
        step.artifact.clone()
    } else {
        None
    };
    steps.push(step);
    artifact
}

fn finish(steps: Vec<StepReport>, run_start: Instant) -> WorkflowReport {
    let succeeded = steps.iter().all(|step| step.error.is_none());
    let result_label = if succeeded { "ok" } else { "err" };
    metrics::histogram!("qflow.workflow.run_ms", "result" => result_label)
        .record(run_start.elapsed().as_millis() as f64);
    tracing::info!(steps = steps.len(), succeeded, "workflow finished");
    WorkflowReport { steps, succeeded }
}

#[cfg(test)]
mod tests {
    use super::{plan_workflow, run_workflow, Stage};
    use qflow_domain::repositories::workflow_engine::{EngineInit, WorkflowEngine};
    use qflow_domain::services::document::parse_document;
    use qflow_domain::value_objects::artifact_ref::ArtifactRef;
    use qflow_domain::value_objects::component::ComponentSpec;
    use qflow_domain::value_objects::node::Node;

    const SRC: &str = "qlib_init:\n  provider_uri: /data\n  region: cn\n  redis_port: -1\n\
task:\n  model: {class: GRU, module_path: m}\n  dataset: {class: DatasetH, kwargs: {handler: {class: Alpha360}}}\n  record:\n    - class: SignalRecord\n    - class: PortAnaRecord\n      kwargs: {config: {x: 1}}\n";

    #[derive(Default)]
    struct Scripted {
        calls: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl Scripted {
        fn step(&mut self, name: String) -> Result<ArtifactRef, String> {
            let failing = self.fail_on.is_some_and(|f| name.starts_with(f));
            self.calls.push(name.clone());
            if failing {
                return Err(format!("{name} exploded"));
            }
            Ok(ArtifactRef::new(name))
        }
    }

    impl WorkflowEngine for Scripted {
        fn init(&mut self, init: &EngineInit) -> Result<(), String> {
            self.step(format!("init:{}", init.provider_uri)).map(|_| ())
        }
        fn build_dataset(&mut self, dataset: &ComponentSpec) -> Result<ArtifactRef, String> {
            self.step(format!("dataset:{}", dataset.class))
        }
        fn train_model(&mut self, model: &ComponentSpec, dataset: &ArtifactRef) -> Result<ArtifactRef, String> {
            self.step(format!("model:{}<{}", model.class, dataset.id))
        }
        fn run_record(&mut self, record: &ComponentSpec, model: &ArtifactRef, _dataset: &ArtifactRef) -> Result<ArtifactRef, String> {
            self.step(format!("record:{}<{}", record.class, model.id))
        }
    }

    #[test]
    fn plan_keeps_subtrees_verbatim() {
        let tree = parse_document(SRC).expect("tree");
        let plan = plan_workflow(&tree).expect("plan");
        assert_eq!(plan.init.provider_uri, "/data");
        assert_eq!(plan.init.region.as_deref(), Some("cn"));
        assert_eq!(plan.init.extra.get("redis_port"), Some(&Node::Int(-1)));
        assert_eq!(plan.model.module_path.as_deref(), Some("m"));
        assert_eq!(plan.dataset.kwargs, *tree.get_path("task.dataset.kwargs").expect("kwargs"));
        let classes: Vec<_> = plan.records.iter().map(|r| r.class.as_str()).collect();
        assert_eq!(classes, vec!["SignalRecord", "PortAnaRecord"]);
        assert_eq!(plan.records[1].kwarg("config"), tree.get_path("task.record.1.kwargs.config"));
    }

    #[test]
    fn dispatch_runs_in_declared_order() {
        let tree = parse_document(SRC).expect("tree");
        let plan = plan_workflow(&tree).expect("plan");
        let mut engine = Scripted::default();
        let report = run_workflow(&plan, &mut engine);
        assert!(report.succeeded);
        assert_eq!(
            engine.calls,
            vec![
                "init:/data",
                "dataset:DatasetH",
                "model:GRU<dataset:DatasetH",
                "record:SignalRecord<model:GRU<dataset:DatasetH",
                "record:PortAnaRecord<model:GRU<dataset:DatasetH",
            ]
        );
        let stages: Vec<_> = report.steps.iter().map(|s| s.stage).collect();
        assert_eq!(stages, vec![Stage::Init, Stage::Dataset, Stage::Model, Stage::Record, Stage::Record]);
    }

    #[test]
    fn failing_step_stops_the_run() {
        let tree = parse_document(SRC).expect("tree");
        let plan = plan_workflow(&tree).expect("plan");
        let mut engine = Scripted {
            fail_on: Some("model"),
            ..Scripted::default()
        };
        let report = run_workflow(&plan, &mut engine);
        assert!(!report.succeeded);
        assert_eq!(engine.calls.len(), 3);
        assert_eq!(report.failure().map(|s| s.stage), Some(Stage::Model));
        let err = report.into_result().unwrap_err();
        assert!(err.contains("workflow failed at model step 'GRU'"), "{err}");
    }

    #[test]
    fn plan_errors_name_the_path() {
        let tree = parse_document("provider_uri: /d\ntask:\n  model: {class: GRU}\n").expect("tree");
        assert_eq!(plan_workflow(&tree).unwrap_err(), "task: missing 'dataset'");
        let tree = parse_document("task: {}\n").expect("tree");
        assert_eq!(plan_workflow(&tree).unwrap_err(), "missing provider_uri");
    }
}
