use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn session_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/session.log")
}

/// Best-effort diagnostics log. Logging must never take the dashboard down,
/// so failures are swallowed.
pub fn append_session_log_line(state_root: &Path, level: &str, event: &str, detail: &str) {
    let path = session_log_path(state_root);
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    let _ = writeln!(file, "{} {level} {event} {detail}", now_secs());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_are_appended_under_the_state_root() {
        let dir = tempfile::tempdir().unwrap();
        append_session_log_line(dir.path(), "info", "session.started", "selected=none");
        append_session_log_line(dir.path(), "warn", "channel.payload.dropped", "bytes=12");

        let raw = fs::read_to_string(session_log_path(dir.path())).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("session.started"));
        assert!(lines[1].contains("channel.payload.dropped"));
    }
}
