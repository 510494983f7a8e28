use qflow_domain::repositories::artifacts::ArtifactWriter;
use std::fs;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemArtifactWriter;

impl FilesystemArtifactWriter {
    pub fn new() -> Self {
        Self
    }
}

fn record_write_metrics(kind: &'static str, start: Instant, result: &Result<(), String>) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "qflow.infra.artifacts.write.calls_total",
        "kind" => kind,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!("qflow.infra.artifacts.write_ms", "kind" => kind, "result" => result_label)
        .record(start.elapsed().as_millis() as f64);
}

impl ArtifactWriter for FilesystemArtifactWriter {
    fn ensure_dir(&self, path: &Path) -> Result<(), String> {
        let start = Instant::now();
        let result = fs::create_dir_all(path)
            .map_err(|err| format!("failed to create dir {}: {}", path.display(), err));
        record_write_metrics("ensure_dir", start, &result);
        result
    }

    fn write_json(&self, path: &Path, value: &serde_json::Value) -> Result<(), String> {
        let start = Instant::now();
        let result = serde_json::to_string_pretty(value)
            .map_err(|err| format!("failed to serialize json for {}: {err}", path.display()))
            .and_then(|json| {
                fs::write(path, json + "\n")
                    .map_err(|err| format!("failed to write json {}: {}", path.display(), err))
            });
        record_write_metrics("json", start, &result);
        result
    }

    fn write_text(&self, path: &Path, contents: &str) -> Result<(), String> {
        let start = Instant::now();
        let result = fs::write(path, contents)
            .map_err(|err| format!("failed to write {}: {}", path.display(), err));
        record_write_metrics("text", start, &result);
        if result.is_ok() {
            tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote artifact");
        }
        result
    }
}
