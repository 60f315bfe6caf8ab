//! Recipe discovery and YAML loading.
//!
//! A recipe is `tasktree.yaml` or `tt.yaml`, found by walking upward from
//! the starting directory; the directory holding the first hit is the
//! recipe root. Loading returns raw task tables plus any `import`
//! directives — no task semantics are interpreted here.

use crate::core::types::RawTask;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Candidate file names, checked in order in each directory.
pub const RECIPE_FILE_NAMES: [&str; 2] = ["tasktree.yaml", "tt.yaml"];

/// One `import` directive: `{file: ..., as: ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportSpec {
    pub file: String,
    #[serde(rename = "as")]
    pub namespace: String,
}

/// A loaded recipe file: its absolute path, import directives, and raw
/// task tables in declaration order.
#[derive(Debug)]
pub struct RecipeFile {
    pub path: PathBuf,
    pub imports: Vec<ImportSpec>,
    pub tasks: IndexMap<String, RawTask>,
}

/// Walk upward from `start` looking for a recipe file.
pub fn find_recipe_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in RECIPE_FILE_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        dir = current.parent();
    }
    None
}

/// Load and structurally parse one recipe file.
pub fn load_recipe_file(path: &Path) -> Result<RecipeFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Recipe(format!("failed to read {}: {}", path.display(), e)))?;
    parse_recipe(&content, path)
}

/// Parse recipe text. `path` is used for error context and kept on the
/// returned record for working-dir resolution.
pub fn parse_recipe(content: &str, path: &Path) -> Result<RecipeFile> {
    let doc: serde_yaml_ng::Value = serde_yaml_ng::from_str(content)
        .map_err(|e| Error::Recipe(format!("{}: YAML parse error: {}", path.display(), e)))?;

    let mapping = match doc {
        serde_yaml_ng::Value::Mapping(m) => m,
        serde_yaml_ng::Value::Null => serde_yaml_ng::Mapping::new(),
        _ => {
            return Err(Error::Recipe(format!(
                "{}: recipe must be a mapping of task names to task tables",
                path.display()
            )))
        }
    };

    let mut imports = Vec::new();
    let mut tasks = IndexMap::new();

    for (key, value) in mapping {
        let key = match key {
            serde_yaml_ng::Value::String(s) => s,
            other => {
                return Err(Error::Recipe(format!(
                    "{}: task names must be strings, got {:?}",
                    path.display(),
                    other
                )))
            }
        };

        if key == "import" {
            imports = serde_yaml_ng::from_value(value).map_err(|e| {
                Error::Recipe(format!(
                    "{}: invalid import list (expected [{{file, as}}, ...]): {}",
                    path.display(),
                    e
                ))
            })?;
            continue;
        }

        let raw: RawTask = serde_yaml_ng::from_value(value).map_err(|e| {
            Error::Recipe(format!("{}: task '{}': {}", path.display(), key, e))
        })?;
        tasks.insert(key, raw);
    }

    Ok(RecipeFile {
        path: path.to_path_buf(),
        imports,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_recipe() {
        let yaml = r#"
build:
  desc: Compile
  outputs: [target/bin]
  cmd: cargo build

test:
  deps: [build]
  cmd: cargo test
"#;
        let recipe = parse_recipe(yaml, Path::new("/p/tasktree.yaml")).unwrap();
        assert_eq!(recipe.tasks.len(), 2);
        assert!(recipe.imports.is_empty());
        // Declaration order preserved
        let names: Vec<_> = recipe.tasks.keys().collect();
        assert_eq!(names, vec!["build", "test"]);
        assert_eq!(recipe.tasks["test"].deps, vec!["build"]);
    }

    #[test]
    fn test_parse_import_directive() {
        let yaml = r#"
import:
  - file: build/tasks.yaml
    as: build

pkg:
  deps: [build.compile]
  cmd: tar czf out.tgz
"#;
        let recipe = parse_recipe(yaml, Path::new("/p/tasktree.yaml")).unwrap();
        assert_eq!(recipe.imports.len(), 1);
        assert_eq!(recipe.imports[0].file, "build/tasks.yaml");
        assert_eq!(recipe.imports[0].namespace, "build");
        assert_eq!(recipe.tasks.len(), 1);
    }

    #[test]
    fn test_parse_malformed_yaml() {
        let err = parse_recipe("a: [unclosed", Path::new("/p/tt.yaml")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/p/tt.yaml"));
        assert!(msg.contains("YAML parse error"));
    }

    #[test]
    fn test_parse_empty_document() {
        let recipe = parse_recipe("", Path::new("/p/tt.yaml")).unwrap();
        assert!(recipe.tasks.is_empty());
        assert!(recipe.imports.is_empty());
    }

    #[test]
    fn test_parse_non_mapping_document() {
        let err = parse_recipe("- a\n- b\n", Path::new("/p/tt.yaml")).unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn test_parse_non_mapping_task() {
        let err = parse_recipe("build: just a string\n", Path::new("/p/tt.yaml")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("build"));
    }

    #[test]
    fn test_parse_unknown_task_field() {
        let yaml = "build:\n  cmd: make\n  comand: typo\n";
        let err = parse_recipe(yaml, Path::new("/p/tt.yaml")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("task 'build'"));
    }

    #[test]
    fn test_parse_bad_import_shape() {
        let yaml = "import:\n  - build/tasks.yaml\n";
        let err = parse_recipe(yaml, Path::new("/p/tt.yaml")).unwrap_err();
        assert!(err.to_string().contains("import"));
    }

    #[test]
    fn test_find_recipe_file_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("tasktree.yaml"), "").unwrap();
        let nested = root.join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_recipe_file(&nested).unwrap();
        assert_eq!(found, root.join("tasktree.yaml"));
    }

    #[test]
    fn test_find_recipe_file_prefers_tasktree_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tasktree.yaml"), "").unwrap();
        std::fs::write(dir.path().join("tt.yaml"), "").unwrap();

        let found = find_recipe_file(dir.path()).unwrap();
        assert!(found.ends_with("tasktree.yaml"));
    }

    #[test]
    fn test_find_recipe_file_tt_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tt.yaml"), "").unwrap();

        let found = find_recipe_file(dir.path()).unwrap();
        assert!(found.ends_with("tt.yaml"));
    }

    #[test]
    fn test_find_recipe_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("x");
        std::fs::create_dir_all(&nested).unwrap();
        // Walks all the way to / without finding one (the tempdir has none)
        // — only assert the nested lookup doesn't find a file inside the
        // tempdir itself.
        if let Some(found) = find_recipe_file(&nested) {
            assert!(!found.starts_with(dir.path()));
        }
    }
}
