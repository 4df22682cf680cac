use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/planforge.log")
}

/// Appends one JSON line to the shared log. Logging never fails the caller.
pub fn append_log(state_root: &Path, level: &str, event: &str, run_id: Option<&str>, message: &str) {
    let payload = serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": level,
        "event": event,
        "run_id": run_id,
        "message": message,
    });

    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };

    let path = log_path(state_root);
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_lines_are_json_with_run_context() {
        let dir = tempdir().expect("tempdir");
        append_log(dir.path(), "info", "node.completed", Some("run-1"), "clarify done");
        append_log(dir.path(), "warn", "engine.boot", None, "no runs");

        let raw = fs::read_to_string(log_path(dir.path())).expect("read log");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["event"], "node.completed");
        assert_eq!(first["run_id"], "run-1");
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert!(second["run_id"].is_null());
    }
}
