//! Dependency graph construction and topological ordering.
//!
//! Validates the flat task table (dangling references, cycles, command
//! placeholders), computes each task's implicit inputs, and produces a
//! deterministic topological order using Kahn's algorithm that always pops
//! the lexicographically smallest ready task.

use crate::core::types::{PathGlob, Task};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// The immutable, validated task graph.
#[derive(Debug)]
pub struct Graph {
    pub tasks: IndexMap<String, Task>,
    /// Per task: globs inherited from direct dependencies (the dependency's
    /// outputs, or its explicit inputs when it declares no outputs). Each
    /// glob keeps the dependency's working dir as its base.
    pub implicit_inputs: IndexMap<String, Vec<PathGlob>>,
    /// Full topological order: dependencies before dependents, ties broken
    /// lexicographically on qualified name.
    pub order: Vec<String>,
}

impl Graph {
    pub fn build(tasks: IndexMap<String, Task>) -> Result<Graph> {
        validate_references(&tasks)?;
        validate_placeholders(&tasks)?;
        let order = topological_order(&tasks)?;
        let implicit_inputs = compute_implicit_inputs(&tasks);
        Ok(Graph {
            tasks,
            implicit_inputs,
            order,
        })
    }

    pub fn task(&self, name: &str) -> Result<&Task> {
        self.tasks
            .get(name)
            .ok_or_else(|| Error::Recipe(format!("task '{}' not found", name)))
    }

    /// Names reachable from `target` (target included), in topological
    /// order.
    pub fn reachable(&self, target: &str) -> Result<Vec<String>> {
        self.task(target)?;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack = vec![target];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            for dep in &self.tasks[current].dependencies {
                stack.push(dep);
            }
        }
        Ok(self
            .order
            .iter()
            .filter(|name| seen.contains(name.as_str()))
            .cloned()
            .collect())
    }
}

fn validate_references(tasks: &IndexMap<String, Task>) -> Result<()> {
    for (name, task) in tasks {
        for dep in &task.dependencies {
            if !tasks.contains_key(dep) {
                return Err(Error::Recipe(format!(
                    "task '{}' depends on unknown task '{}'",
                    name, dep
                )));
            }
            if dep == name {
                return Err(Error::Recipe(format!("task '{}' depends on itself", name)));
            }
        }
    }
    Ok(())
}

/// Every `{{name}}` in a command must name a declared parameter.
fn validate_placeholders(tasks: &IndexMap<String, Task>) -> Result<()> {
    for (name, task) in tasks {
        let placeholders = extract_placeholders(&task.command)
            .map_err(|msg| Error::Recipe(format!("task '{}': {}", name, msg)))?;
        for ph in placeholders {
            if !task.parameters.iter().any(|p| p.name == ph) {
                return Err(Error::Recipe(format!(
                    "task '{}': command references undeclared parameter '{{{{{}}}}}'",
                    name, ph
                )));
            }
        }
    }
    Ok(())
}

/// Scan a command for `{{key}}` placeholders, returning the trimmed keys.
pub fn extract_placeholders(command: &str) -> std::result::Result<Vec<String>, String> {
    let mut keys = Vec::new();
    let mut rest = command;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| "unclosed '{{' placeholder in command".to_string())?;
        keys.push(after[..close].trim().to_string());
        rest = &after[close + 2..];
    }
    Ok(keys)
}

/// One-hop implicit input rule: for each direct dependency, inherit its
/// outputs, or its explicit inputs when it has no outputs. No recursion
/// through the transitive closure.
fn compute_implicit_inputs(tasks: &IndexMap<String, Task>) -> IndexMap<String, Vec<PathGlob>> {
    let mut result = IndexMap::with_capacity(tasks.len());
    for (name, task) in tasks {
        let mut inherited: Vec<PathGlob> = Vec::new();
        let mut seen: HashSet<&PathGlob> = HashSet::new();
        for dep_name in &task.dependencies {
            let dep = &tasks[dep_name];
            let source = if dep.outputs.is_empty() {
                &dep.explicit_inputs
            } else {
                &dep.outputs
            };
            for g in source {
                if seen.insert(g) {
                    inherited.push(g.clone());
                }
            }
        }
        result.insert(name.clone(), inherited);
    }
    result
}

/// Kahn's algorithm over the dependency edges. The ready set is a min-heap
/// on the qualified name, so incomparable tasks always come out in
/// lexicographic order.
fn topological_order(tasks: &IndexMap<String, Task>) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for name in tasks.keys() {
        in_degree.insert(name, 0);
        dependents.insert(name, Vec::new());
    }
    for (name, task) in tasks {
        for dep in &task.dependencies {
            dependents.get_mut(dep.as_str()).unwrap().push(name);
            *in_degree.get_mut(name.as_str()).unwrap() += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<&str>> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&name, _)| Reverse(name))
        .collect();

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current.to_string());
        for &dependent in &dependents[current] {
            let degree = in_degree.get_mut(dependent).unwrap();
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() != tasks.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut cycle: Vec<&str> = tasks
            .keys()
            .map(String::as_str)
            .filter(|n| !ordered.contains(n))
            .collect();
        cycle.sort_unstable();
        return Err(Error::Recipe(format!(
            "dependency cycle detected involving: {}",
            cycle.join(", ")
        )));
    }

    Ok(order)
}
