//! Sequential task execution.
//!
//! Runs exactly the tasks the planner marked stale, in topological order.
//! After every successful task the state entry is written and the whole
//! state file is persisted atomically, so a later failure never loses
//! earlier progress. A non-zero exit aborts the run; an interrupted child
//! aborts it without recording anything for that task.

use crate::core::argtypes;
use crate::core::graph::Graph;
use crate::core::hasher;
use crate::core::planner::{self, Analysis};
use crate::core::state::{self, State, StateEntry};
use crate::core::types::ArgValue;
use crate::error::{Error, Result};
use crate::shell;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// What a run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Execute every `will_run` task from the analysis, in order.
///
/// `target_args` are the target's coerced values; other tasks bind their
/// declared defaults, failing with an argument error before anything is
/// spawned for them.
pub fn execute(
    graph: &Graph,
    analysis: &Analysis,
    state: &mut State,
    state_path: &Path,
    target: &str,
    target_args: &[(String, ArgValue)],
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    for name in &analysis.order {
        let status = &analysis.statuses[name.as_str()];
        if !status.will_run {
            println!("Skipping task '{}' ({})", name, status.reason);
            summary.skipped.push(name.clone());
            continue;
        }

        let task = graph.task(name)?;
        let values = if name == target {
            target_args.to_vec()
        } else {
            argtypes::bind(task, &[])?
        };

        let command = substitute(&task.command, &values);

        if !task.working_dir.is_dir() {
            return Err(Error::Execution {
                task: name.clone(),
                message: format!(
                    "working directory {} does not exist",
                    task.working_dir.display()
                ),
            });
        }

        println!("Running task '{}'...", name);
        let started_at = now_secs();
        let exec = shell::run_command(&command, &task.working_dir).map_err(|msg| {
            Error::Execution {
                task: name.clone(),
                message: msg,
            }
        })?;

        if exec.interrupted {
            return Err(Error::Interrupted);
        }
        if exec.exit_code != 0 {
            return Err(Error::Execution {
                task: name.clone(),
                message: format!("exit code {}", exec.exit_code),
            });
        }

        record_success(graph, state, state_path, name, &values, started_at)?;
        summary.executed.push(name.clone());
    }

    Ok(summary)
}

/// Write the task's state entry and persist the whole file atomically.
fn record_success(
    graph: &Graph,
    state: &mut State,
    state_path: &Path,
    name: &str,
    values: &[(String, ArgValue)],
    started_at: i64,
) -> Result<()> {
    let task = graph.task(name)?;
    let scan = planner::scan_inputs(graph, name)?;

    let input_state = scan
        .present
        .iter()
        .map(|(path, mtime)| (path.to_string_lossy().to_string(), *mtime))
        .collect();

    let task_hash = hasher::task_fingerprint(task);
    let args_hash = if task.parameters.is_empty() {
        None
    } else {
        Some(hasher::args_fingerprint(values))
    };
    let key = hasher::cache_key(&task_hash, args_hash.as_deref());

    state.insert(
        key,
        StateEntry {
            last_run: started_at,
            input_state,
        },
    );
    state::save(state_path, state)
}

/// Literal replacement of `{{name}}` placeholders with stringified values.
/// Unknown placeholders were rejected at graph build time; anything
/// unmatched here passes through untouched.
pub fn substitute(command: &str, values: &[(String, ArgValue)]) -> String {
    let mut result = String::with_capacity(command.len());
    let mut rest = command;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let key = rest[open + 2..open + 2 + close].trim();
        result.push_str(&rest[..open]);
        match values.iter().find(|(n, _)| n == key) {
            Some((_, value)) => result.push_str(&value.to_string()),
            None => result.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &rest[open + 2 + close + 2..];
    }
    result.push_str(rest);
    result
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
