//! Persistent run state — load, prune, save (atomic).
//!
//! `.tasktree-state` is a JSON object mapping cache keys to entries. It is
//! the only persistent artifact and the only mutable shared resource; all
//! access goes through this module. Writes are temp-sibling + rename so a
//! crash never leaves a half-written file.

use crate::core::hasher;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = ".tasktree-state";

/// Cached state from one successful task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateEntry {
    /// Wall-clock seconds at the start of the recorded run
    pub last_run: i64,
    /// Absolute input path → mtime seconds observed at that run
    pub input_state: BTreeMap<String, i64>,
}

/// In-memory state: cache key → entry, sorted for stable serialisation.
pub type State = BTreeMap<String, StateEntry>;

/// The state file lives in the recipe root.
pub fn state_file_path(recipe_root: &Path) -> PathBuf {
    recipe_root.join(STATE_FILE)
}

/// Load state from disk. Missing file is an empty state; a corrupt file is
/// recovered as empty with a one-line warning (never fatal). Keys that do
/// not look like cache keys, or entries with the wrong shape, are dropped
/// silently.
pub fn load(path: &Path) -> State {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return State::new(),
        Err(e) => {
            eprintln!("warning: cannot read {}: {}; starting fresh", path.display(), e);
            return State::new();
        }
    };

    let doc: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            eprintln!(
                "warning: invalid state file {}: {}; starting fresh",
                path.display(),
                e
            );
            return State::new();
        }
    };

    let object = match doc {
        serde_json::Value::Object(o) => o,
        _ => {
            eprintln!(
                "warning: state file {} is not a JSON object; starting fresh",
                path.display()
            );
            return State::new();
        }
    };

    let mut state = State::new();
    for (key, value) in object {
        if !is_cache_key(&key) {
            continue;
        }
        if let Ok(entry) = serde_json::from_value::<StateEntry>(value) {
            state.insert(key, entry);
        }
    }
    state
}

/// Drop entries whose key prefix is not a live task hash. Returns the
/// removed keys. Runs before staleness analysis.
pub fn prune(state: &mut State, valid_task_hashes: &HashSet<String>) -> Vec<String> {
    let stale: Vec<String> = state
        .keys()
        .filter(|key| !valid_task_hashes.contains(hasher::key_prefix(key)))
        .cloned()
        .collect();
    for key in &stale {
        state.remove(key);
    }
    stale
}

/// Serialise and write atomically: temp sibling, then rename.
pub fn save(path: &Path, state: &State) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| Error::State(format!("cannot serialise state: {}", e)))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::State(format!("invalid state path {}", path.display())))?;
    let tmp_path = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));

    std::fs::write(&tmp_path, json)
        .map_err(|e| Error::State(format!("cannot write {}: {}", tmp_path.display(), e)))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        Error::State(format!(
            "cannot rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}

/// `task_hash` or `task_hash__args_hash`, 8 lowercase hex chars each.
fn is_cache_key(key: &str) -> bool {
    let is_hex8 = |s: &str| s.len() == 8 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase());
    match key.split_once("__") {
        Some((task, args)) => is_hex8(task) && is_hex8(args),
        None => is_hex8(key),
    }
}
