use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::LogsError;

/// Path of the captured output stream (`stdout` or `stderr`) for a service.
pub fn log_path(log_dir: &Path, service_name: &str, stream: &str) -> PathBuf {
    log_dir.join(format!("{service_name}.{stream}.log"))
}

/// Returns the last `lines` lines of a service's captured output.
pub fn tail_log(
    log_dir: &Path,
    service_name: &str,
    stream: &str,
    lines: usize,
) -> Result<Vec<String>, LogsError> {
    let path = log_path(log_dir, service_name, stream);
    if !path.exists() {
        return Err(LogsError::LogUnavailable(path.display().to_string()));
    }

    let reader = BufReader::new(File::open(&path)?);
    let mut tail = VecDeque::with_capacity(lines);
    for line in reader.lines() {
        let line = line?;
        if tail.len() == lines {
            tail.pop_front();
        }
        if lines > 0 {
            tail.push_back(line);
        }
    }

    Ok(tail.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn tail_returns_last_lines() {
        let dir = tempdir().unwrap();
        let content: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        fs::write(log_path(dir.path(), "web", "stdout"), content).unwrap();

        let lines = tail_log(dir.path(), "web", "stdout", 3).unwrap();
        assert_eq!(lines, vec!["line 8", "line 9", "line 10"]);
    }

    #[test]
    fn missing_log_is_reported() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            tail_log(dir.path(), "ghost", "stderr", 5),
            Err(LogsError::LogUnavailable(_))
        ));
    }
}
