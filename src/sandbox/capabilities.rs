//! Capability whitelist shared by the safety analyzer and the sandbox.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Builtins available to candidates unless configured otherwise.
pub const DEFAULT_BUILTINS: &[&str] = &[
    "print",
    "isinstance",
    "range",
    "int",
    "str",
    "bool",
    "len",
    "float",
    "list",
    "dict",
    "set",
    "tuple",
    "abs",
    "min",
    "max",
    "sum",
    "round",
    "sorted",
    "reversed",
    "enumerate",
    "zip",
    "map",
    "filter",
    "any",
    "all",
    "repr",
    "divmod",
    "pow",
    "chr",
    "ord",
    "Exception",
    "ValueError",
    "TypeError",
    "ZeroDivisionError",
    "IndexError",
    "KeyError",
    "ArithmeticError",
    "RuntimeError",
    "StopIteration",
    "NotImplementedError",
];

/// Modules candidates may import unless configured otherwise.
pub const DEFAULT_MODULES: &[&str] = &["math", "itertools", "functools", "collections", "re", "string"];

/// Capabilities a candidate is allowed to use.
///
/// The safety analyzer denies anything outside this set statically, and the
/// sandbox harness only exposes these builtins and modules at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Builtin names exposed to the candidate.
    #[serde(default = "default_builtins")]
    pub allowed_builtins: BTreeSet<String>,

    /// Top-level modules the candidate may import.
    #[serde(default = "default_modules")]
    pub allowed_modules: BTreeSet<String>,

    /// Directory the candidate runs in; `open` (if allowed) is confined to it.
    #[serde(default = "default_allowed_root")]
    pub allowed_root: PathBuf,
}

fn default_builtins() -> BTreeSet<String> {
    DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect()
}

fn default_modules() -> BTreeSet<String> {
    DEFAULT_MODULES.iter().map(|s| s.to_string()).collect()
}

fn default_allowed_root() -> PathBuf {
    std::env::temp_dir()
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            allowed_builtins: default_builtins(),
            allowed_modules: default_modules(),
            allowed_root: default_allowed_root(),
        }
    }
}

impl Capabilities {
    /// Capabilities with nothing whitelisted.
    pub fn none(allowed_root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_builtins: BTreeSet::new(),
            allowed_modules: BTreeSet::new(),
            allowed_root: allowed_root.into(),
        }
    }

    /// Returns true if the builtin is whitelisted.
    pub fn allows_builtin(&self, name: &str) -> bool {
        self.allowed_builtins.contains(name)
    }

    /// Returns true if the top-level module of `module` is whitelisted.
    pub fn allows_module(&self, module: &str) -> bool {
        let root = module.split('.').next().unwrap_or(module);
        self.allowed_modules.contains(root)
    }

    /// Adds a builtin to the whitelist.
    pub fn with_builtin(mut self, name: impl Into<String>) -> Self {
        self.allowed_builtins.insert(name.into());
        self
    }

    /// Adds a module to the whitelist.
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.allowed_modules.insert(name.into());
        self
    }
}
