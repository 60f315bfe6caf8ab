//! Import resolution and task normalisation.
//!
//! Merges the root recipe and its imports into one flat task table keyed
//! by qualified name. Imported tasks get a `namespace.` prefix, their
//! dependency references are rewritten into the namespace, and every task
//! gets an absolute working directory. Imports are one level deep only;
//! an imported file may neither import further nor reference tasks outside
//! itself.

use crate::core::argtypes;
use crate::core::parser::{self, RecipeFile};
use crate::core::types::{Parameter, PathGlob, RawTask, Task, TypeTag};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Resolve a loaded root recipe into the flat, normalised task table.
pub fn resolve(root: &RecipeFile) -> Result<IndexMap<String, Task>> {
    let root_dir = root
        .path
        .parent()
        .ok_or_else(|| Error::Recipe(format!("{}: no parent directory", root.path.display())))?;

    validate_imports(root)?;

    let mut tasks: IndexMap<String, Task> = IndexMap::new();

    // Imported tasks first, in import order — mirrors how a reader of the
    // root file encounters them.
    for import in &root.imports {
        let import_path = root_dir.join(&import.file);
        if !import_path.is_file() {
            return Err(Error::Recipe(format!(
                "{}: imported file not found: {}",
                root.path.display(),
                import_path.display()
            )));
        }
        let imported = parser::load_recipe_file(&import_path)?;
        if !imported.imports.is_empty() {
            return Err(Error::Recipe(format!(
                "{}: transitive imports are not allowed (imported from {})",
                import_path.display(),
                root.path.display()
            )));
        }

        let import_dir = import_path
            .parent()
            .ok_or_else(|| {
                Error::Recipe(format!("{}: no parent directory", import_path.display()))
            })?
            .to_path_buf();

        for (name, raw) in &imported.tasks {
            let task = normalise_task(
                name,
                raw,
                Some(&import.namespace),
                &import_dir,
                &import_path,
            )?;
            insert_unique(&mut tasks, task)?;
        }
    }

    for (name, raw) in &root.tasks {
        let task = normalise_task(name, raw, None, root_dir, &root.path)?;
        insert_unique(&mut tasks, task)?;
    }

    Ok(tasks)
}

fn validate_imports(root: &RecipeFile) -> Result<()> {
    let mut seen = HashSet::new();
    for import in &root.imports {
        if !is_identifier(&import.namespace) {
            return Err(Error::Recipe(format!(
                "{}: import namespace '{}' is not a valid identifier",
                root.path.display(),
                import.namespace
            )));
        }
        if !seen.insert(import.namespace.as_str()) {
            return Err(Error::Recipe(format!(
                "{}: duplicate import namespace '{}'",
                root.path.display(),
                import.namespace
            )));
        }
        if root.tasks.contains_key(&import.namespace) {
            return Err(Error::Recipe(format!(
                "{}: import namespace '{}' collides with a task name",
                root.path.display(),
                import.namespace
            )));
        }
    }
    Ok(())
}

fn insert_unique(tasks: &mut IndexMap<String, Task>, task: Task) -> Result<()> {
    let name = task.qualified_name.clone();
    if tasks.insert(name.clone(), task).is_some() {
        return Err(Error::Recipe(format!("duplicate task name '{}'", name)));
    }
    Ok(())
}

fn normalise_task(
    name: &str,
    raw: &RawTask,
    namespace: Option<&str>,
    file_dir: &Path,
    source_file: &Path,
) -> Result<Task> {
    let context = |msg: String| {
        Error::Recipe(format!("{}: task '{}': {}", source_file.display(), name, msg))
    };

    if !is_identifier(name) {
        return Err(context("task name is not a valid identifier".into()));
    }
    if raw.cmd.is_empty() {
        return Err(context("missing required 'cmd' field".into()));
    }

    let qualified_name = match namespace {
        Some(ns) => format!("{}.{}", ns, name),
        None => name.to_string(),
    };

    let working_dir = resolve_working_dir(raw.working_dir.as_deref(), file_dir);

    let dependencies = normalise_deps(&raw.deps, namespace).map_err(&context)?;

    let explicit_inputs = raw
        .inputs
        .iter()
        .map(|p| PathGlob::new(&working_dir, p.clone()))
        .collect();
    let outputs = raw
        .outputs
        .iter()
        .map(|p| PathGlob::new(&working_dir, p.clone()))
        .collect();

    let parameters = parse_parameters(&raw.args, &working_dir).map_err(&context)?;

    Ok(Task {
        qualified_name,
        description: raw.desc.clone(),
        dependencies,
        explicit_inputs,
        outputs,
        working_dir,
        parameters,
        command: raw.cmd.clone(),
        source_file: source_file.to_path_buf(),
    })
}

fn resolve_working_dir(declared: Option<&str>, file_dir: &Path) -> PathBuf {
    match declared {
        Some(dir) => {
            let p = Path::new(dir);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                file_dir.join(p)
            }
        }
        None => file_dir.to_path_buf(),
    }
}

/// Rewrite and validate dependency references.
///
/// Inside an imported file a bare name refers to a sibling task and gains
/// the namespace; a dotted name would reach outside the file and is
/// rejected. Root-file references are kept verbatim (they may legitimately
/// be dotted to name imported tasks).
fn normalise_deps(
    deps: &[String],
    namespace: Option<&str>,
) -> std::result::Result<Vec<String>, String> {
    let mut out = Vec::with_capacity(deps.len());
    for dep in deps {
        let rewritten = match namespace {
            Some(ns) => {
                if dep.contains('.') {
                    return Err(format!(
                        "dependency '{}' reaches outside the imported file; \
                         imported tasks may only depend on tasks in the same file",
                        dep
                    ));
                }
                format!("{}.{}", ns, dep)
            }
            None => dep.clone(),
        };
        if out.contains(&rewritten) {
            return Err(format!("duplicate dependency '{}'", dep));
        }
        out.push(rewritten);
    }
    Ok(out)
}

/// Parse `name[:type][=default]` parameter specs. Defaults are coerced
/// eagerly so a bad default is caught at load time, not mid-run.
fn parse_parameters(
    specs: &[String],
    working_dir: &Path,
) -> std::result::Result<Vec<Parameter>, String> {
    let mut params: Vec<Parameter> = Vec::with_capacity(specs.len());
    for spec in specs {
        let param = parse_parameter(spec)?;
        if params.iter().any(|p| p.name == param.name) {
            return Err(format!("duplicate parameter '{}'", param.name));
        }
        if let Some(ref default) = param.default {
            argtypes::coerce(param.type_tag, default, working_dir).map_err(|msg| {
                format!("invalid default for parameter '{}': {}", param.name, msg)
            })?;
        }
        params.push(param);
    }
    Ok(params)
}

fn parse_parameter(spec: &str) -> std::result::Result<Parameter, String> {
    let (head, default) = match spec.split_once('=') {
        Some((head, default)) => (head, Some(default.to_string())),
        None => (spec, None),
    };

    let (name, type_tag) = match head.split_once(':') {
        Some((name, tag)) => {
            let tag = tag
                .trim()
                .parse::<TypeTag>()
                .map_err(|e| format!("parameter spec '{}': {}", spec, e))?;
            (name.trim(), tag)
        }
        None => (head.trim(), TypeTag::Str),
    };

    if !is_identifier(name) {
        return Err(format!(
            "parameter spec '{}': '{}' is not a valid parameter name",
            spec, name
        ));
    }

    Ok(Parameter {
        name: name.to_string(),
        type_tag,
        default,
    })
}

/// Identifiers: letters, digits, `_` and `-`, not starting with a digit
/// or `-`, no dots (dots separate namespaces).
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
