use qflow_domain::repositories::workflow_engine::{EngineInit, WorkflowEngine};
use qflow_domain::value_objects::artifact_ref::ArtifactRef;
use qflow_domain::value_objects::component::ComponentSpec;
use serde_json::{json, Value};
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::time::Instant;

const MAX_OUTPUT_IN_ERROR: usize = 2_000;

/// Hands every engine call to an external program.
///
/// The program is started once per call with the configured arguments and
/// receives one JSON request on stdin:
///
/// ```json
/// {"stage": "model", "component": {"class": "...", "module_path": "...", "kwargs": {}},
///  "inputs": {"dataset": "..."}}
/// ```
///
/// It answers with the artifact id on stdout, either as the last non-empty
/// line or as `{"artifact": "..."}`. A non-zero exit fails the step.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, String> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err("engine command cannot be empty".to_string());
        }
        Ok(Self { program, args })
    }

    fn call(&self, stage: &'static str, request: &Value) -> Result<String, String> {
        let span = tracing::info_span!("infra.engine.command", program = %self.program, stage);
        let _enter = span.enter();
        let start = Instant::now();

        let result = self.exchange(request);

        let result_label = if result.is_ok() { "ok" } else { "err" };
        metrics::counter!(
            "qflow.infra.engine.requests_total",
            "stage" => stage,
            "result" => result_label
        )
        .increment(1);
        metrics::histogram!("qflow.infra.engine.request_ms", "stage" => stage)
            .record(start.elapsed().as_millis() as f64);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "engine command failed");
        }
        result
    }

    fn exchange(&self, request: &Value) -> Result<String, String> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| format!("failed to serialize engine request: {err}"))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| format!("failed to start engine command '{}': {err}", self.program))?;

        // Feed stdin from its own thread so a program that writes before it
        // reads cannot fill the stdout pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || match stdin.write_all(&payload) {
                // The program may exit without reading; its status decides.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });

        let output = child
            .wait_with_output()
            .map_err(|err| format!("failed to wait for engine command: {err}"))?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| "engine request writer panicked".to_string())?
                .map_err(|err| format!("failed to send engine request: {err}"))?;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "engine command exited with {}: {}",
                output.status,
                clip(&format!("{}{}", stderr.trim(), stdout.trim()))
            ));
        }
        Ok(stdout.into_owned())
    }

    fn artifact_call(&self, stage: &'static str, request: Value) -> Result<ArtifactRef, String> {
        let stdout = self.call(stage, &request)?;
        parse_artifact(&stdout).map(ArtifactRef::new)
    }
}

fn clip(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_IN_ERROR {
        return text.to_string();
    }
    let mut end = MAX_OUTPUT_IN_ERROR;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn parse_artifact(stdout: &str) -> Result<String, String> {
    let trimmed = stdout.trim();
    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|err| format!("invalid engine response json: {err}"))?;
        return match value.get("artifact") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            _ => Err(format!("engine response has no 'artifact' string: {}", clip(trimmed))),
        };
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| "engine command printed no artifact id".to_string())
}

fn component_json(component: &ComponentSpec) -> Value {
    json!({
        "class": component.class,
        "module_path": component.module_path,
        "kwargs": component.kwargs.to_json(),
    })
}

impl WorkflowEngine for CommandEngine {
    fn init(&mut self, init: &EngineInit) -> Result<(), String> {
        let request = json!({
            "stage": "init",
            "provider_uri": init.provider_uri,
            "region": init.region,
            "extra": init.extra.to_json(),
        });
        self.call("init", &request).map(|_| ())
    }

    fn build_dataset(&mut self, dataset: &ComponentSpec) -> Result<ArtifactRef, String> {
        let request = json!({
            "stage": "dataset",
            "component": component_json(dataset),
            "inputs": {},
        });
        self.artifact_call("dataset", request)
    }

    fn train_model(
        &mut self,
        model: &ComponentSpec,
        dataset: &ArtifactRef,
    ) -> Result<ArtifactRef, String> {
        let request = json!({
            "stage": "model",
            "component": component_json(model),
            "inputs": {"dataset": dataset.id},
        });
        self.artifact_call("model", request)
    }

    fn run_record(
        &mut self,
        record: &ComponentSpec,
        model: &ArtifactRef,
        dataset: &ArtifactRef,
    ) -> Result<ArtifactRef, String> {
        let request = json!({
            "stage": "record",
            "component": component_json(record),
            "inputs": {"model": model.id, "dataset": dataset.id},
        });
        self.artifact_call("record", request)
    }
}
