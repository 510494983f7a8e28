use qflow_domain::repositories::artifacts::ArtifactWriter;
use qflow_infrastructure::artifacts::FilesystemArtifactWriter;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}_{}", std::process::id(), now)
}

#[test]
fn writes_json_and_text_under_nested_dirs() {
    let root = std::env::temp_dir().join(format!("qflow_artifacts_{}", unique_suffix()));
    let run_dir: PathBuf = root.join("run-0123456789ab");
    let writer = FilesystemArtifactWriter::new();

    writer.ensure_dir(&run_dir).expect("ensure dir");
    writer.ensure_dir(&run_dir).expect("ensure dir is idempotent");
    writer
        .write_json(&run_dir.join("resolved.json"), &serde_json::json!({"market": "csi300"}))
        .expect("write json");
    writer
        .write_text(&run_dir.join("config_snapshot.yaml"), "market: csi300\n")
        .expect("write text");

    let json: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(run_dir.join("resolved.json")).expect("read json"),
    )
    .expect("valid json");
    assert_eq!(json["market"], "csi300");
    assert_eq!(
        fs::read_to_string(run_dir.join("config_snapshot.yaml")).expect("read text"),
        "market: csi300\n"
    );

    let err = writer
        .write_text(&root.join("missing").join("x.txt"), "x")
        .unwrap_err();
    assert!(err.starts_with("failed to write"), "{err}");

    let _ = fs::remove_dir_all(&root);
}
