//! Task and argument fingerprints for incremental execution.
//!
//! Both fingerprints are the first 8 lowercase hex characters of a BLAKE3
//! digest over a length-prefixed canonical serialisation. The serialisation
//! schema is a compatibility contract: changing it changes every task hash,
//! which invalidates all cached state through pruning.

use crate::core::types::{ArgValue, Task};

const SHORT_HEX_LEN: usize = 8;

/// Fingerprint of a task's execution identity.
///
/// Covers the command, outputs (declared order), working directory, and
/// parameter `(name, type)` pairs (declared order). Dependencies only
/// affect scheduling, inputs are tracked by timestamp, and the description
/// is documentation — none of them participate.
pub fn task_fingerprint(task: &Task) -> String {
    let mut hasher = blake3::Hasher::new();

    write_bytes(&mut hasher, task.command.as_bytes());

    write_count(&mut hasher, task.outputs.len());
    for output in &task.outputs {
        write_bytes(&mut hasher, output.pattern.as_bytes());
    }

    write_bytes(&mut hasher, task.working_dir.to_string_lossy().as_bytes());

    write_count(&mut hasher, task.parameters.len());
    for param in &task.parameters {
        write_bytes(&mut hasher, param.name.as_bytes());
        write_bytes(&mut hasher, param.type_tag.as_str().as_bytes());
    }

    short_hex(hasher)
}

/// Fingerprint of coerced argument values, in declared parameter order.
pub fn args_fingerprint(values: &[(String, ArgValue)]) -> String {
    let mut hasher = blake3::Hasher::new();
    write_count(&mut hasher, values.len());
    for (name, value) in values {
        write_bytes(&mut hasher, name.as_bytes());
        write_bytes(&mut hasher, value.canonical().as_bytes());
    }
    short_hex(hasher)
}

/// Primary key into the state file: `task_hash` alone, or
/// `task_hash__args_hash` for parameterised tasks.
pub fn cache_key(task_hash: &str, args_hash: Option<&str>) -> String {
    match args_hash {
        Some(args) => format!("{}__{}", task_hash, args),
        None => task_hash.to_string(),
    }
}

/// Prefix of a cache key: the part before `__`, or the whole key.
pub fn key_prefix(cache_key: &str) -> &str {
    cache_key.split("__").next().unwrap_or(cache_key)
}

fn write_bytes(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn write_count(hasher: &mut blake3::Hasher, count: usize) {
    hasher.update(&(count as u64).to_le_bytes());
}

fn short_hex(hasher: blake3::Hasher) -> String {
    hasher.finalize().to_hex()[..SHORT_HEX_LEN].to_string()
}
