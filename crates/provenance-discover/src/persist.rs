//! Persisted-state writer: every pipeline phase dumps its own artifact as
//! `<label>_<YYYYMMDD_HHMMSS>.json` and `.yml` with identical content,
//! under the configured data directory.

use std::path::{Path, PathBuf};

use provenance_core::ProvenanceError;
use serde::Serialize;

/// Writes `value` under `dir` as both `<label>_<ts>.json` and `.yml`,
/// returning the two paths written.
pub fn write<T: Serialize>(dir: &Path, label: &str, value: &T) -> Result<(PathBuf, PathBuf), ProvenanceError> {
    std::fs::create_dir_all(dir)?;
    let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let json_path = dir.join(format!("{label}_{ts}.json"));
    let yml_path = dir.join(format!("{label}_{ts}.yml"));

    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&json_path, json)?;

    let yaml = serde_yaml::to_string(value).map_err(|e| ProvenanceError::Config(e.to_string()))?;
    std::fs::write(&yml_path, yaml)?;

    Ok((json_path, yml_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_both_json_and_yaml_with_matching_stem() {
        let dir = tempfile::tempdir().unwrap();
        let (json_path, yml_path) = write(dir.path(), "phase0", &json!({"hostname": "scanner-1"})).unwrap();
        assert!(json_path.exists());
        assert!(yml_path.exists());
        assert_eq!(json_path.file_stem(), yml_path.file_stem());
        let contents = std::fs::read_to_string(&json_path).unwrap();
        assert!(contents.contains("scanner-1"));
    }
}
