//! Task schema types — raw recipe tables, normalised tasks, parameters,
//! argument values, and the shared status records.
//!
//! Raw types mirror the YAML schema and derive Deserialize; normalised
//! types are produced by the resolver and are immutable afterwards.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Raw recipe schema
// ============================================================================

/// A task table exactly as it appears in a recipe file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTask {
    /// Human-readable description
    #[serde(default)]
    pub desc: Option<String>,

    /// Shell command (possibly multi-line) with `{{name}}` placeholders
    #[serde(default)]
    pub cmd: String,

    /// Names of tasks that must run first
    #[serde(default)]
    pub deps: Vec<String>,

    /// Input path globs, relative to the task's working directory
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Output path globs, same resolution
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Working directory; relative values resolve against the defining file
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Parameter specs in `name[:type][=default]` form
    #[serde(default)]
    pub args: Vec<String>,
}

// ============================================================================
// Parameter type tags
// ============================================================================

/// Closed set of parameter types a recipe may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Str,
    Int,
    Float,
    Bool,
    Path,
    Datetime,
    Url,
    Hostname,
    Email,
    Ip,
    Ipv4,
    Ipv6,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Path => "path",
            Self::Datetime => "datetime",
            Self::Url => "url",
            Self::Hostname => "hostname",
            Self::Email => "email",
            Self::Ip => "ip",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(Self::Str),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "bool" => Ok(Self::Bool),
            "path" => Ok(Self::Path),
            "datetime" => Ok(Self::Datetime),
            "url" => Ok(Self::Url),
            "hostname" => Ok(Self::Hostname),
            "email" => Ok(Self::Email),
            "ip" => Ok(Self::Ip),
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            other => Err(format!("unknown parameter type '{}'", other)),
        }
    }
}

/// A declared task parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub type_tag: TypeTag,
    /// Default value as written in the recipe; coerced on demand.
    pub default: Option<String>,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.type_tag)?;
        if let Some(ref d) = self.default {
            write!(f, "={}", d)?;
        }
        Ok(())
    }
}

// ============================================================================
// Argument values
// ============================================================================

/// A coerced argument value.
///
/// `canonical()` is the type-tagged encoding fed to the args fingerprint;
/// `Display` is the substitution form spliced into commands. They differ
/// only for booleans (`0`/`1` vs `true`/`false`).
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
    /// Canonical ISO-8601 text
    Datetime(String),
    Url(String),
    Hostname(String),
    Email(String),
    /// Canonical address text, shared by `ip`/`ipv4`/`ipv6`
    Ip(String),
}

impl ArgValue {
    /// Canonical encoding for fingerprinting.
    pub fn canonical(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Datetime(s) | Self::Url(s) | Self::Hostname(s) | Self::Email(s)
            | Self::Ip(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Path globs
// ============================================================================

/// A path glob together with the directory it resolves against.
///
/// Patterns are never rewritten string-wise when tasks are merged across
/// files; they carry the owning task's working directory instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathGlob {
    pub base: PathBuf,
    pub pattern: String,
}

impl PathGlob {
    pub fn new(base: &Path, pattern: impl Into<String>) -> Self {
        Self {
            base: base.to_path_buf(),
            pattern: pattern.into(),
        }
    }

    /// Absolute form of the pattern.
    pub fn absolute(&self) -> PathBuf {
        let p = Path::new(&self.pattern);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base.join(p)
        }
    }

    /// True when the pattern names a single literal path (no glob
    /// metacharacters), so "matches nothing" means "file is missing".
    pub fn is_literal(&self) -> bool {
        !self.pattern.contains(['*', '?', '['])
    }
}

impl fmt::Display for PathGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

// ============================================================================
// Normalised tasks
// ============================================================================

/// A fully normalised task. Produced by the resolver; immutable afterwards.
#[derive(Debug, Clone)]
pub struct Task {
    /// Bare identifier (root file) or `namespace.identifier` (imported)
    pub qualified_name: String,
    pub description: Option<String>,
    /// Qualified dependency names, declaration order, duplicates rejected
    pub dependencies: Vec<String>,
    pub explicit_inputs: Vec<PathGlob>,
    pub outputs: Vec<PathGlob>,
    /// Absolute; must exist at execution time
    pub working_dir: PathBuf,
    /// Declaration order; names unique within the task
    pub parameters: Vec<Parameter>,
    pub command: String,
    /// The recipe file that defined this task
    pub source_file: PathBuf,
}

// ============================================================================
// Status records
// ============================================================================

/// Why a task will (or won't) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    Fresh,
    InputsChanged,
    DefinitionChanged,
    NeverRun,
    DependencyTriggered,
    NoOutputs,
    ArgsChanged,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fresh => "fresh",
            Self::InputsChanged => "inputs_changed",
            Self::DefinitionChanged => "definition_changed",
            Self::NeverRun => "never_run",
            Self::DependencyTriggered => "dependency_triggered",
            Self::NoOutputs => "no_outputs",
            Self::ArgsChanged => "args_changed",
        };
        f.write_str(s)
    }
}

/// Per-task staleness verdict. The single record consumed by execution,
/// `--tree`, and `--dry-run` alike.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub qualified_name: String,
    pub will_run: bool,
    pub reason: StatusReason,
    /// Inputs that triggered `inputs_changed`, absolute paths
    pub changed_files: Vec<PathBuf>,
    /// Seconds since epoch of the last successful run, when known
    pub last_run: Option<i64>,
}
