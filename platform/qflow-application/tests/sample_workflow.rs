use qflow_application::config::{
    load_config_with_source, load_document, parse_config, ConfigError, Instruments,
};
use qflow_application::inspection::{describe, fields_report};
use qflow_application::validation::validate;
use qflow_application::workflow::{plan_workflow, run_workflow, Stage};
use qflow_application::{fingerprint, run_id};
use qflow_domain::services::document::{emit_document, parse_document, ParseErrorKind};
use qflow_domain::value_objects::node::Node;
use qflow_infrastructure::engines::DryRunEngine;
use std::path::PathBuf;

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../ops/configs/workflow_config_hats_alpha360.yaml")
}

#[test]
fn aliases_resolve_to_their_anchors() {
    let loaded = load_config_with_source(&sample_path()).expect("sample config");
    let tree = &loaded.document.tree;

    assert_eq!(
        tree.get_path("port_analysis_config.backtest.benchmark"),
        Some(&Node::from("SH000300"))
    );
    assert_eq!(
        tree.get_path("data_handler_config.instruments"),
        Some(&Node::from("csi300"))
    );
    assert_eq!(
        tree.get_path("task.dataset.kwargs.handler.kwargs"),
        tree.get("data_handler_config")
    );
    assert_eq!(
        tree.get_path("task.record.1.kwargs.config"),
        tree.get("port_analysis_config")
    );

    let config = &loaded.config;
    assert_eq!(config.market, "csi300");
    assert_eq!(
        config.data_handler_config.instruments,
        Instruments::Market("csi300".to_string())
    );
    assert_eq!(config.provider_uri(), Some("~/.qlib/qlib_data/cn_data"));
    assert_eq!(config.region(), Some("cn"));
    assert_eq!(config.task.model.kwargs["lr"], 0.001);

    let names: Vec<_> = loaded.document.anchors.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["market", "benchmark", "data_handler_config", "port_analysis_config"]
    );
}

#[test]
fn loading_twice_is_deterministic() {
    let a = load_document(&sample_path()).expect("first");
    let b = load_document(&sample_path()).expect("second");
    assert_eq!(a.tree, b.tree);
    assert_eq!(fingerprint(&a.tree), fingerprint(&b.tree));
    let id = run_id("workflow_config_hats_alpha360", &fingerprint(&a.tree));
    assert!(id.starts_with("workflow_config_hats_alpha360-"));
    assert_eq!(id.len(), "workflow_config_hats_alpha360-".len() + 12);
}

#[test]
fn emitted_tree_reads_back_equal() {
    let loaded = load_document(&sample_path()).expect("sample");
    let text = emit_document(&loaded.tree);
    let reparsed = parse_document(&text).expect("emitted text parses");
    assert_eq!(reparsed, loaded.tree);
    assert_eq!(fingerprint(&reparsed), fingerprint(&loaded.tree));
}

#[test]
fn sample_passes_strict_validation() {
    let loaded = load_config_with_source(&sample_path()).expect("sample");
    let report = validate(&loaded.config, true).expect("strict");
    assert!(report.is_clean());
}

#[test]
fn undefined_alias_fails_with_a_descriptive_error() {
    let src = std::fs::read_to_string(sample_path())
        .expect("sample")
        .replace("benchmark: *benchmark", "benchmark: *bench");
    let err = parse_config(&src).unwrap_err();
    let parse = err.parse_error().expect("parse error");
    assert_eq!(parse.kind(), ParseErrorKind::UndefinedAlias);
    assert!(err.to_string().contains("bench"), "{err}");
}

#[test]
fn missing_file_is_not_found() {
    let err = load_document(&sample_path().with_file_name("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn dispatch_passes_subtrees_in_order() {
    let tree = load_document(&sample_path()).expect("sample").tree;
    let plan = plan_workflow(&tree).expect("plan");
    let mut engine = DryRunEngine::new();
    let report = run_workflow(&plan, &mut engine);
    assert!(report.succeeded);

    let calls = engine.into_calls();
    let order: Vec<_> = calls
        .iter()
        .map(|call| (call.stage, call.class.as_deref().unwrap_or("-")))
        .collect();
    assert_eq!(
        order,
        vec![
            ("init", "-"),
            ("dataset", "DatasetH"),
            ("model", "HATS"),
            ("record", "SignalRecord"),
            ("record", "PortAnaRecord"),
        ]
    );

    let json = |path: &str| tree.get_path(path).map(Node::to_json);
    assert_eq!(Some(calls[1].kwargs.clone()), json("task.dataset.kwargs"));
    assert_eq!(Some(calls[2].kwargs.clone()), json("task.model.kwargs"));
    assert_eq!(Some(calls[4].kwargs.clone()), json("task.record.1.kwargs"));
    assert_eq!(calls[0].kwargs["provider_uri"], "~/.qlib/qlib_data/cn_data");
    assert_eq!(calls[4].inputs, vec!["model:HATS#2", "dataset:DatasetH#1"]);
}

#[test]
fn failing_step_stops_dispatch() {
    let tree = load_document(&sample_path()).expect("sample").tree;
    let plan = plan_workflow(&tree).expect("plan");
    let mut engine = DryRunEngine::new().failing_on("record", "SignalRecord");
    let report = run_workflow(&plan, &mut engine);

    assert!(!report.succeeded);
    assert_eq!(report.steps.len(), 4);
    assert_eq!(report.failure().map(|step| step.stage), Some(Stage::Record));
    assert!(engine.calls().iter().all(|call| call.class.as_deref() != Some("PortAnaRecord")));
}

#[test]
fn provider_override_reaches_init() {
    let tree = load_document(&sample_path()).expect("sample").tree;
    let mut plan = plan_workflow(&tree).expect("plan");
    plan.override_provider_uri("/mnt/qlib");
    let mut engine = DryRunEngine::new();
    run_workflow(&plan, &mut engine);
    assert_eq!(engine.calls()[0].kwargs["provider_uri"], "/mnt/qlib");
}

#[test]
fn inspection_of_the_sample() {
    let loaded = load_config_with_source(&sample_path()).expect("sample");
    let summary = describe(&loaded);
    assert_eq!(summary["benchmark"], "SH000300");
    assert_eq!(summary["feature_count"], 360);
    assert_eq!(summary["components"][1]["class"], "qlib.data.dataset.DatasetH");

    let fields = fields_report(&loaded.document.tree).expect("fields");
    assert_eq!(fields["handler"], "qlib.contrib.data.handler.Alpha360");
    assert_eq!(fields["feature_count"], 360);
    assert_eq!(fields["label"]["exprs"][0], "Ref($close, -2) / Ref($close, -1) - 1");
}
