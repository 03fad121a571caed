//! Interaction log reading (newline-delimited JSON)

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;
use tracing::debug;

use crate::error::{ReplayError, ReplayResult};
use crate::step::Step;

/// File name prefix and suffix written by the interaction recorder.
pub const LOG_FILE_PREFIX: &str = "interaction-log-";
pub const LOG_FILE_SUFFIX: &str = ".jsonl";

/// Parse an interaction log into steps, in file order.
///
/// Fails before yielding anything if a single line is malformed, so a replay
/// never starts on a partially readable log.
pub fn read_interaction_log(path: &Path) -> ReplayResult<Vec<Step>> {
    if !path.exists() {
        return Err(ReplayError::LogNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    parse_interaction_log(path, &content)
}

/// Parse already-loaded log content. `path` is only used in error messages.
pub fn parse_interaction_log(path: &Path, content: &str) -> ReplayResult<Vec<Step>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut steps = Vec::new();

    for (offset, line) in content.lines().enumerate() {
        let line_number = offset + 1;
        let payload = line.trim();
        if payload.is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(payload).map_err(|source| ReplayError::InvalidJson {
            path: path.to_path_buf(),
            line: line_number,
            source,
        })?;

        match value {
            Value::Object(raw) => steps.push(Step::new(line_number, raw)),
            _ => {
                return Err(ReplayError::NotAnObject {
                    path: path.to_path_buf(),
                    line: line_number,
                })
            }
        }
    }

    debug!("Parsed {} step(s) from {}", steps.len(), path.display());
    Ok(steps)
}

/// Most recently modified `interaction-log-*.jsonl` directly inside `dir`.
pub fn find_latest_interaction_log(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;

    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| is_interaction_log_name(&e.file_name().to_string_lossy()))
        .map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, e.path())
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

fn is_interaction_log_name(name: &str) -> bool {
    name.len() >= LOG_FILE_PREFIX.len() + LOG_FILE_SUFFIX.len()
        && name.starts_with(LOG_FILE_PREFIX)
        && name.ends_with(LOG_FILE_SUFFIX)
}
