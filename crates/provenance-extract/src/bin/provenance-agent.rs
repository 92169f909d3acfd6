//! Self-contained remote agent: runs every extractor in a fixed order and
//! writes `output.json` and `output.yml` into the directory containing its
//! own binary. Exit status is zero even if individual extractors reported
//! internal errors; it is non-zero only on catastrophic I/O failure.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn agent_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let record = provenance_extract::run_all();
    let dir = agent_dir();

    let json_path = dir.join("output.json");
    let yml_path = dir.join("output.yml");

    let write_result = (|| -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&json_path, json)?;

        let yaml = serde_yaml::to_string(&record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&yml_path, yaml)?;
        Ok(())
    })();

    match write_result {
        Ok(()) => {
            tracing::info!(json = %json_path.display(), yml = %yml_path.display(), "agent run complete");
        }
        Err(e) => {
            eprintln!("provenance-agent: catastrophic I/O failure writing results: {e}");
            std::process::exit(1);
        }
    }
}
