#![cfg(unix)]

use qflow_domain::repositories::workflow_engine::{EngineInit, WorkflowEngine};
use qflow_domain::value_objects::artifact_ref::ArtifactRef;
use qflow_domain::value_objects::component::ComponentSpec;
use qflow_domain::value_objects::node::{Mapping, Node};
use qflow_infrastructure::engines::CommandEngine;

fn shell(script: &str) -> CommandEngine {
    CommandEngine::new("sh", vec!["-c".to_string(), script.to_string()]).expect("engine")
}

fn component(class: &str) -> ComponentSpec {
    let mut kwargs = Mapping::new();
    kwargs.insert("topk", Node::Int(50));
    ComponentSpec {
        class: class.to_string(),
        module_path: Some("qlib.workflow.record_temp".to_string()),
        kwargs: Node::Map(kwargs),
    }
}

#[test]
fn request_reaches_the_program_on_stdin() {
    let capture = std::env::temp_dir().join(format!(
        "qflow_engine_request_{}.json",
        std::process::id()
    ));
    let mut engine = shell(&format!("cat > '{}'; echo record-1", capture.display()));
    let artifact = engine
        .run_record(
            &component("SignalRecord"),
            &ArtifactRef::new("model-1"),
            &ArtifactRef::new("dataset-1"),
        )
        .expect("record");
    assert_eq!(artifact.id, "record-1");

    let request: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&capture).expect("captured request"))
            .expect("request json");
    assert_eq!(request["stage"], "record");
    assert_eq!(request["component"]["class"], "SignalRecord");
    assert_eq!(request["component"]["kwargs"]["topk"], 50);
    assert_eq!(request["inputs"]["model"], "model-1");
    assert_eq!(request["inputs"]["dataset"], "dataset-1");
    let _ = std::fs::remove_file(&capture);
}

#[test]
fn json_response_and_init() {
    let mut engine = shell("cat > /dev/null; echo '{\"artifact\": \"ds-42\"}'");
    engine
        .init(&EngineInit {
            provider_uri: "/data".to_string(),
            region: Some("cn".to_string()),
            extra: Node::Map(Mapping::new()),
        })
        .expect("init");
    let dataset = engine.build_dataset(&component("DatasetH")).expect("dataset");
    assert_eq!(dataset.id, "ds-42");
}

#[test]
fn non_zero_exit_is_a_step_failure() {
    let mut engine = shell("cat > /dev/null; echo 'no GPU' >&2; exit 3");
    let err = engine
        .train_model(&component("HATS"), &ArtifactRef::new("ds"))
        .unwrap_err();
    assert!(err.contains("engine command exited with"), "{err}");
    assert!(err.contains("no GPU"), "{err}");
}

#[test]
fn large_request_with_chatty_program_completes() {
    let mut kwargs = Mapping::new();
    kwargs.insert("blob", Node::Str("y".repeat(1 << 20)));
    let spec = ComponentSpec {
        class: "DatasetH".to_string(),
        module_path: None,
        kwargs: Node::Map(kwargs),
    };
    // Writes 256 KiB before reading anything, more than a pipe buffer holds.
    let mut engine = shell("head -c 262144 /dev/zero | tr '\\0' x; cat > /dev/null; echo; echo ds-big");
    let dataset = engine.build_dataset(&spec).expect("dataset");
    assert_eq!(dataset.id, "ds-big");
}

#[test]
fn missing_program_fails_to_start() {
    let mut engine =
        CommandEngine::new("qflow-engine-that-does-not-exist", Vec::new()).expect("engine");
    let err = engine.build_dataset(&component("DatasetH")).unwrap_err();
    assert!(err.starts_with("failed to start engine command"), "{err}");
}
