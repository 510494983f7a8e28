use std::path::Path;

pub trait ArtifactWriter {
    fn ensure_dir(&self, path: &Path) -> Result<(), String>;
    fn write_json(&self, path: &Path, value: &serde_json::Value) -> Result<(), String>;
    fn write_text(&self, path: &Path, contents: &str) -> Result<(), String>;
}
