//! Staleness analysis — classify every task reachable from a target.
//!
//! This is the single source of truth for freshness: execution, `--tree`,
//! and `--dry-run` all consume the records produced here and never
//! re-derive staleness themselves.
//!
//! The mtime check compares current input mtimes against the state entry's
//! `last_run` (strictly greater means changed). `last_run` is the
//! authoritative "seen at" timestamp; an mtime that moved backwards can
//! never exceed it, so it never triggers a rerun on its own.

use crate::core::argtypes;
use crate::core::graph::Graph;
use crate::core::hasher;
use crate::core::state::State;
use crate::core::types::{ArgValue, StatusReason, Task, TaskStatus};
use crate::error::Result;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// The shared status report for one target.
#[derive(Debug)]
pub struct Analysis {
    /// Tasks reachable from the target, dependencies first
    pub order: Vec<String>,
    pub statuses: IndexMap<String, TaskStatus>,
}

/// Current on-disk view of a task's inputs (explicit + implicit).
#[derive(Debug, Default)]
pub struct InputScan {
    /// Existing matched paths with their mtimes, deduplicated and sorted
    pub present: BTreeMap<PathBuf, i64>,
    /// Literal patterns that matched nothing
    pub missing: Vec<PathBuf>,
}

/// Classify every task reachable from `target`, in topological order.
///
/// `target_args` are the target's coerced invocation values; every other
/// task binds its declared defaults. A parameterised task whose values
/// cannot be determined has no knowable cache key and is classified by the
/// never-run/args-changed rule.
pub fn analyze(
    graph: &Graph,
    state: &State,
    target: &str,
    target_args: Option<&[(String, ArgValue)]>,
) -> Result<Analysis> {
    let order = graph.reachable(target)?;
    let mut statuses: IndexMap<String, TaskStatus> = IndexMap::with_capacity(order.len());

    for name in &order {
        let task = graph.task(name)?;
        let values: Option<Vec<(String, ArgValue)>> = if name == target {
            match target_args {
                Some(args) => Some(args.to_vec()),
                None => argtypes::bind(task, &[]).ok(),
            }
        } else {
            argtypes::bind(task, &[]).ok()
        };

        let status = classify(graph, state, task, values.as_deref(), &statuses)?;
        statuses.insert(name.clone(), status);
    }

    Ok(Analysis { order, statuses })
}

/// Apply the decision rules in order; the first match wins.
fn classify(
    graph: &Graph,
    state: &State,
    task: &Task,
    values: Option<&[(String, ArgValue)]>,
    dep_statuses: &IndexMap<String, TaskStatus>,
) -> Result<TaskStatus> {
    let name = &task.qualified_name;
    let implicit = &graph.implicit_inputs[name.as_str()];

    let status = |will_run: bool, reason: StatusReason, changed: Vec<PathBuf>, last: Option<i64>| {
        TaskStatus {
            qualified_name: name.clone(),
            will_run,
            reason,
            changed_files: changed,
            last_run: last,
        }
    };

    // (a) Nothing to track at all: always run.
    if task.outputs.is_empty() && task.explicit_inputs.is_empty() && implicit.is_empty() {
        return Ok(status(true, StatusReason::NoOutputs, vec![], None));
    }

    let task_hash = hasher::task_fingerprint(task);
    let args_hash = match (task.parameters.is_empty(), values) {
        (true, _) => None,
        (false, Some(values)) => Some(hasher::args_fingerprint(values)),
        (false, None) => None, // required argument without default: key unknowable
    };

    let entry = if task.parameters.is_empty() || args_hash.is_some() {
        state.get(&hasher::cache_key(&task_hash, args_hash.as_deref()))
    } else {
        None
    };

    let entry = match entry {
        Some(entry) => entry,
        None => {
            // (b)/(c) No entry under this cache key.
            let prefix_seen = state.keys().any(|k| hasher::key_prefix(k) == task_hash);
            let reason = if !prefix_seen {
                StatusReason::NeverRun
            } else if task.parameters.is_empty() {
                // Suffixed entries under a parameterless hash can only come
                // from a hand-edited state file.
                StatusReason::DefinitionChanged
            } else {
                StatusReason::ArgsChanged
            };
            return Ok(status(true, reason, vec![], None));
        }
    };

    // (d) Inputs newer than the last run, or gone since then.
    let scan = scan_inputs(graph, name)?;
    let mut changed: BTreeSet<PathBuf> = BTreeSet::new();
    for (path, mtime) in &scan.present {
        if *mtime > entry.last_run {
            changed.insert(path.clone());
        }
    }
    for path in &scan.missing {
        changed.insert(path.clone());
    }
    for recorded in entry.input_state.keys() {
        if !Path::new(recorded).exists() {
            changed.insert(PathBuf::from(recorded));
        }
    }
    if !changed.is_empty() {
        return Ok(status(
            true,
            StatusReason::InputsChanged,
            changed.into_iter().collect(),
            Some(entry.last_run),
        ));
    }

    // (e) A dependency will run, so this task's inputs are about to change.
    let triggered = task
        .dependencies
        .iter()
        .any(|dep| dep_statuses.get(dep).is_some_and(|s| s.will_run));
    if triggered {
        return Ok(status(
            true,
            StatusReason::DependencyTriggered,
            vec![],
            Some(entry.last_run),
        ));
    }

    // (f) Fresh.
    Ok(status(false, StatusReason::Fresh, vec![], Some(entry.last_run)))
}

/// Expand a task's explicit and implicit input globs against their bases,
/// capturing current mtimes.
pub fn scan_inputs(graph: &Graph, name: &str) -> Result<InputScan> {
    let task = graph.task(name)?;
    let mut scan = InputScan::default();

    let implicit = &graph.implicit_inputs[name];
    for pattern in task.explicit_inputs.iter().chain(implicit.iter()) {
        let absolute = pattern.absolute();
        if pattern.is_literal() {
            match mtime_secs(&absolute) {
                Some(mtime) => {
                    scan.present.insert(absolute, mtime);
                }
                None => scan.missing.push(absolute),
            }
            continue;
        }
        for matched in glob::glob(&absolute.to_string_lossy())? {
            let path = matched?;
            if let Some(mtime) = mtime_secs(&path) {
                scan.present.insert(path, mtime);
            }
        }
    }
    Ok(scan)
}

/// Whole-second mtime, or None when the path does not exist.
pub fn mtime_secs(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => Some(d.as_secs() as i64),
        Err(_) => Some(0), // pre-epoch mtimes clamp to zero
    }
}
