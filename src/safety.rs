//! Static safety analysis of candidate source.
//!
//! Candidates come from a language model and are treated as untrusted input.
//! Before anything is executed, the source is scanned for constructs the
//! sandbox forbids: process invocation, filesystem access outside the allowed
//! root, network access, reflective or dynamic execution, and imports of
//! modules that are not whitelisted.
//!
//! The scan is a pure function of the source text. Comments and the contents
//! of plain string literals are masked first so prose never trips a rule;
//! f-strings are left visible because their braces hold live code.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sandbox::Capabilities;

/// Category of a disallowed construct, in scan priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructCategory {
    /// Spawning processes or signalling the host.
    ProcessInvocation,
    /// Touching the filesystem outside the allowed root.
    FilesystemAccess,
    /// Opening network connections.
    NetworkAccess,
    /// Reflection and dynamic evaluation primitives.
    DynamicExecution,
    /// Importing a module that is not whitelisted.
    DisallowedImport,
}

impl fmt::Display for ConstructCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConstructCategory::ProcessInvocation => "process invocation",
            ConstructCategory::FilesystemAccess => "filesystem access",
            ConstructCategory::NetworkAccess => "network access",
            ConstructCategory::DynamicExecution => "dynamic execution",
            ConstructCategory::DisallowedImport => "disallowed import",
        };
        f.write_str(label)
    }
}

/// Result of a safety check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SafetyVerdict {
    /// No disallowed construct was found.
    Allowed,
    /// The first disallowed construct found.
    Denied {
        construct: String,
        category: ConstructCategory,
    },
}

impl SafetyVerdict {
    /// Returns true if the candidate may be executed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyVerdict::Allowed)
    }

    /// Returns the offending construct, if denied.
    pub fn construct(&self) -> Option<&str> {
        match self {
            SafetyVerdict::Allowed => None,
            SafetyVerdict::Denied { construct, .. } => Some(construct),
        }
    }
}

/// Modules that are never importable, whatever the whitelist says.
const FORBIDDEN_MODULES: &[(&str, ConstructCategory)] = &[
    ("subprocess", ConstructCategory::ProcessInvocation),
    ("multiprocessing", ConstructCategory::ProcessInvocation),
    ("ctypes", ConstructCategory::ProcessInvocation),
    ("pty", ConstructCategory::ProcessInvocation),
    ("signal", ConstructCategory::ProcessInvocation),
    ("asyncio", ConstructCategory::ProcessInvocation),
    ("shutil", ConstructCategory::FilesystemAccess),
    ("pathlib", ConstructCategory::FilesystemAccess),
    ("tempfile", ConstructCategory::FilesystemAccess),
    ("glob", ConstructCategory::FilesystemAccess),
    ("fileinput", ConstructCategory::FilesystemAccess),
    ("io", ConstructCategory::FilesystemAccess),
    ("socket", ConstructCategory::NetworkAccess),
    ("ssl", ConstructCategory::NetworkAccess),
    ("urllib", ConstructCategory::NetworkAccess),
    ("http", ConstructCategory::NetworkAccess),
    ("requests", ConstructCategory::NetworkAccess),
    ("ftplib", ConstructCategory::NetworkAccess),
    ("smtplib", ConstructCategory::NetworkAccess),
    ("poplib", ConstructCategory::NetworkAccess),
    ("imaplib", ConstructCategory::NetworkAccess),
    ("telnetlib", ConstructCategory::NetworkAccess),
    ("xmlrpc", ConstructCategory::NetworkAccess),
    ("importlib", ConstructCategory::DynamicExecution),
    ("builtins", ConstructCategory::DynamicExecution),
    ("sys", ConstructCategory::DynamicExecution),
    ("inspect", ConstructCategory::DynamicExecution),
    ("gc", ConstructCategory::DynamicExecution),
    ("code", ConstructCategory::DynamicExecution),
    ("codeop", ConstructCategory::DynamicExecution),
    ("marshal", ConstructCategory::DynamicExecution),
    ("pickle", ConstructCategory::DynamicExecution),
];

const OS_PROCESS_CALLS: &[&str] = &[
    "system",
    "popen",
    "fork",
    "forkpty",
    "kill",
    "killpg",
    "startfile",
    "posix_spawn",
    "posix_spawnp",
    "abort",
    "_exit",
];

const OS_FILESYSTEM_CALLS: &[&str] = &[
    "remove",
    "unlink",
    "rmdir",
    "removedirs",
    "rename",
    "renames",
    "replace",
    "mkdir",
    "makedirs",
    "chmod",
    "chown",
    "chdir",
    "listdir",
    "scandir",
    "walk",
    "open",
    "symlink",
    "link",
    "truncate",
];

/// Builtins that are dynamic-execution primitives and never whitelistable.
const DYNAMIC_BUILTINS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "__import__",
    "globals",
    "locals",
    "vars",
    "breakpoint",
];

/// Reflective builtins, denied unless explicitly whitelisted.
const REFLECTIVE_BUILTINS: &[&str] = &["getattr", "setattr", "delattr"];

static ATTRIBUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\.\s*([A-Za-z_]\w*)").unwrap());

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|;)[ \t]*import[ \t]+([^\n;#]+)").unwrap());

static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|;)[ \t]*from[ \t]+([\w.]+)[ \t]+import[ \t]+(\([^)]*\)|[^\n;#]+)").unwrap()
});

static BARE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^.\w])([A-Za-z_]\w*)\b").unwrap());

static ATTRIBUTE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\s*([A-Za-z_]\w*)").unwrap());

/// Underscore attributes that cannot reach interpreter internals.
const PLAIN_DUNDERS: &[&str] = &["__init__", "__name__", "__qualname__", "__doc__"];

/// Public attributes that lead from an allowed module back to the interpreter.
const ESCAPE_ATTRIBUTES: &[&str] = &[
    "modules",
    "sys",
    "os",
    "builtins",
    "importlib",
    "subprocess",
    "f_globals",
    "f_locals",
    "f_back",
    "f_builtins",
    "gi_frame",
    "gi_code",
    "cr_frame",
    "ag_frame",
    "tb_frame",
];

/// A disallowed construct found during a scan.
#[derive(Debug, Clone)]
struct Hit {
    category: ConstructCategory,
    offset: usize,
    construct: String,
}

/// Static analyzer gating every candidate before execution.
#[derive(Debug, Clone)]
pub struct SafetyAnalyzer {
    capabilities: Capabilities,
}

impl SafetyAnalyzer {
    /// Creates an analyzer enforcing the given capability whitelist.
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    /// Returns the capability whitelist this analyzer enforces.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Scans the source and returns the first disallowed construct, if any.
    ///
    /// Categories are scanned in priority order (process, filesystem,
    /// network, dynamic execution, imports); within a category the earliest
    /// occurrence wins.
    pub fn check(&self, source: &str) -> SafetyVerdict {
        let masked = mask_literals(source);
        let mut hits = Vec::new();

        self.scan_imports(&masked, &mut hits);
        self.scan_attributes(&masked, &mut hits);
        self.scan_escapes(&masked, &mut hits);
        self.scan_builtins(source, &masked, &mut hits);

        match hits
            .into_iter()
            .min_by_key(|hit| (hit.category, hit.offset))
        {
            Some(hit) => {
                tracing::debug!(
                    construct = %hit.construct,
                    category = ?hit.category,
                    offset = hit.offset,
                    "candidate denied by safety analyzer"
                );
                SafetyVerdict::Denied {
                    construct: hit.construct,
                    category: hit.category,
                }
            }
            None => SafetyVerdict::Allowed,
        }
    }

    fn scan_imports(&self, masked: &str, hits: &mut Vec<Hit>) {
        for caps in IMPORT_RE.captures_iter(masked) {
            let offset = caps.get(0).map_or(0, |m| m.start());
            for item in caps[1].split(',') {
                let module = item.split_whitespace().next().unwrap_or("");
                if module.is_empty() {
                    continue;
                }
                if let Some(hit) = self.check_module(module, offset) {
                    hits.push(hit);
                }
            }
        }

        for caps in FROM_IMPORT_RE.captures_iter(masked) {
            let offset = caps.get(0).map_or(0, |m| m.start());
            let module = &caps[1];

            if module.starts_with('.') {
                hits.push(Hit {
                    category: ConstructCategory::DisallowedImport,
                    offset,
                    construct: format!("from {} import", module),
                });
                continue;
            }

            let names = caps[2].trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace());
            for name in names.split(',') {
                let name = name.split_whitespace().next().unwrap_or("");
                if name.is_empty() {
                    continue;
                }
                if let Some(category) = qualified_category(module, name) {
                    hits.push(Hit {
                        category,
                        offset,
                        construct: format!("{}.{}", module, name),
                    });
                }
            }

            if let Some(hit) = self.check_module(module, offset) {
                hits.push(hit);
            }
        }
    }

    fn check_module(&self, module: &str, offset: usize) -> Option<Hit> {
        let root = module.split('.').next().unwrap_or(module);

        if let Some((_, category)) = FORBIDDEN_MODULES.iter().find(|(m, _)| *m == root) {
            return Some(Hit {
                category: *category,
                offset,
                construct: root.to_string(),
            });
        }

        if !self.capabilities.allows_module(root) {
            return Some(Hit {
                category: ConstructCategory::DisallowedImport,
                offset,
                construct: format!("import {}", module),
            });
        }

        None
    }

    fn scan_attributes(&self, masked: &str, hits: &mut Vec<Hit>) {
        for caps in ATTRIBUTE_RE.captures_iter(masked) {
            let object = &caps[1];
            let attribute = &caps[2];
            let offset = caps.get(0).map_or(0, |m| m.start());

            if let Some(category) = qualified_category(object, attribute) {
                hits.push(Hit {
                    category,
                    offset,
                    construct: format!("{}.{}", object, attribute),
                });
            } else if let Some((_, category)) =
                FORBIDDEN_MODULES.iter().find(|(m, _)| *m == object)
            {
                hits.push(Hit {
                    category: *category,
                    offset,
                    construct: format!("{}.{}", object, attribute),
                });
            }
        }
    }

    /// Flags private attribute access and the public `sys` and `os` links
    /// that whitelisted modules carry.
    fn scan_escapes(&self, masked: &str, hits: &mut Vec<Hit>) {
        for caps in ATTRIBUTE_NAME_RE.captures_iter(masked) {
            let Some(name) = caps.get(1) else {
                continue;
            };
            if is_escape_attribute(name.as_str()) {
                hits.push(Hit {
                    category: ConstructCategory::DynamicExecution,
                    offset: name.start(),
                    construct: name.as_str().to_string(),
                });
            }
        }
    }

    fn scan_builtins(&self, source: &str, masked: &str, hits: &mut Vec<Hit>) {
        for caps in BARE_NAME_RE.captures_iter(masked) {
            let Some(name_match) = caps.get(2) else {
                continue;
            };
            let name = name_match.as_str();
            let offset = name_match.start();

            if DYNAMIC_BUILTINS.contains(&name) || name == "__builtins__" {
                if !is_definition(masked, offset) {
                    hits.push(Hit {
                        category: ConstructCategory::DynamicExecution,
                        offset,
                        construct: name.to_string(),
                    });
                }
                continue;
            }

            if REFLECTIVE_BUILTINS.contains(&name) && !self.capabilities.allows_builtin(name) {
                if !is_definition(masked, offset) {
                    hits.push(Hit {
                        category: ConstructCategory::DynamicExecution,
                        offset,
                        construct: name.to_string(),
                    });
                }
                continue;
            }

            if name == "open" && is_call(masked, name_match.end()) {
                if let Some(hit) = self.check_open(source, masked, name_match.end(), offset) {
                    hits.push(hit);
                }
            }
        }
    }

    fn check_open(&self, source: &str, masked: &str, name_end: usize, offset: usize) -> Option<Hit> {
        if !self.capabilities.allows_builtin("open") {
            return Some(Hit {
                category: ConstructCategory::FilesystemAccess,
                offset,
                construct: "open".to_string(),
            });
        }

        // Only literal paths can be judged statically; the harness guards the rest.
        let paren = masked[name_end..].find('(')? + name_end;
        let path = string_literal_at(source, paren + 1)?;
        if self.path_within_root(&path) {
            None
        } else {
            Some(Hit {
                category: ConstructCategory::FilesystemAccess,
                offset,
                construct: format!("open(\"{}\")", path),
            })
        }
    }

    fn path_within_root(&self, path: &str) -> bool {
        if path.contains("..") || path.starts_with('~') {
            return false;
        }
        let candidate = Path::new(path);
        if candidate.is_absolute() || path.starts_with('\\') || path.get(1..2) == Some(":") {
            return candidate.starts_with(&self.capabilities.allowed_root);
        }
        true
    }
}

/// Category of a qualified `module.name` reference, if forbidden.
fn qualified_category(module: &str, name: &str) -> Option<ConstructCategory> {
    match module {
        "os" => {
            if OS_PROCESS_CALLS.contains(&name)
                || name.starts_with("exec")
                || name.starts_with("spawn")
                || name == "*"
            {
                Some(ConstructCategory::ProcessInvocation)
            } else if OS_FILESYSTEM_CALLS.contains(&name) {
                Some(ConstructCategory::FilesystemAccess)
            } else {
                None
            }
        }
        "pty" if name == "spawn" => Some(ConstructCategory::ProcessInvocation),
        "http" if name == "client" || name == "server" => Some(ConstructCategory::NetworkAccess),
        _ => None,
    }
}

fn is_escape_attribute(name: &str) -> bool {
    (name.starts_with('_') && !PLAIN_DUNDERS.contains(&name)) || ESCAPE_ATTRIBUTES.contains(&name)
}

fn is_call(masked: &str, name_end: usize) -> bool {
    masked[name_end..].trim_start().starts_with('(')
}

fn is_definition(masked: &str, offset: usize) -> bool {
    let before = masked[..offset].trim_end();
    before.ends_with("def") || before.ends_with("class")
}

/// Reads a plain string literal starting at or after `start` (skipping
/// whitespace), returning its raw contents.
fn string_literal_at(source: &str, start: usize) -> Option<String> {
    let rest = source.get(start..)?.trim_start();
    let rest = rest.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U'));
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &rest[1..];
    let end = body.find(quote)?;
    Some(body[..end].to_string())
}

/// Replaces comments and plain string literal contents with spaces.
///
/// Byte offsets and newlines are preserved so matches on the masked text
/// map directly back onto the original source.
fn mask_literals(source: &str) -> String {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut out = bytes.to_vec();
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'#' => {
                while i < len && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            quote @ (b'\'' | b'"') => {
                let mask = !is_format_prefix(bytes, i);
                let triple = i + 2 < len && bytes[i + 1] == quote && bytes[i + 2] == quote;
                i += if triple { 3 } else { 1 };

                while i < len {
                    if bytes[i] == b'\\' {
                        if mask {
                            out[i] = b' ';
                            if i + 1 < len && bytes[i + 1] != b'\n' {
                                out[i + 1] = b' ';
                            }
                        }
                        i += 2;
                        continue;
                    }
                    if triple {
                        if i + 2 < len
                            && bytes[i] == quote
                            && bytes[i + 1] == quote
                            && bytes[i + 2] == quote
                        {
                            i += 3;
                            break;
                        }
                    } else if bytes[i] == quote {
                        i += 1;
                        break;
                    } else if bytes[i] == b'\n' {
                        // Unterminated single-line literal.
                        break;
                    }
                    if mask && bytes[i] != b'\n' {
                        out[i] = b' ';
                    }
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Returns true if the quote at `quote_pos` opens an f-string.
fn is_format_prefix(bytes: &[u8], quote_pos: usize) -> bool {
    let mut start = quote_pos;
    while start > 0 && quote_pos - start < 2 && bytes[start - 1].is_ascii_alphabetic() {
        start -= 1;
    }
    if start > 0 && (bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_') {
        return false;
    }
    bytes[start..quote_pos]
        .iter()
        .any(|b| *b == b'f' || *b == b'F')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SafetyAnalyzer {
        SafetyAnalyzer::new(Capabilities::default())
    }

    fn denied(source: &str) -> (String, ConstructCategory) {
        match analyzer().check(source) {
            SafetyVerdict::Denied {
                construct,
                category,
            } => (construct, category),
            SafetyVerdict::Allowed => panic!("expected denial for {:?}", source),
        }
    }

    #[test]
    fn allows_plain_factorial() {
        let source = r#"
def factorial(n):
    if n < 0:
        raise ValueError("negative input")
    result = 1
    for i in range(2, n + 1):
        result *= i
    return result
"#;
        assert_eq!(analyzer().check(source), SafetyVerdict::Allowed);
    }

    #[test]
    fn denies_os_system_before_the_import() {
        let (construct, category) = denied("import os; os.system('rm -rf /')");
        assert_eq!(construct, "os.system");
        assert_eq!(category, ConstructCategory::ProcessInvocation);
    }

    #[test]
    fn denies_from_import_of_process_call() {
        let (construct, _) = denied("from os import system\nsystem('ls')\n");
        assert_eq!(construct, "os.system");
    }

    #[test]
    fn denies_forbidden_modules_even_when_whitelisted() {
        let mut caps = Capabilities::default();
        caps.allowed_modules.insert("subprocess".to_string());
        let verdict = SafetyAnalyzer::new(caps).check("import subprocess\n");
        assert_eq!(verdict.construct(), Some("subprocess"));
    }

    #[test]
    fn denies_network_access() {
        let (construct, category) = denied("import socket\ns = socket.socket()\n");
        assert_eq!(construct, "socket");
        assert_eq!(category, ConstructCategory::NetworkAccess);
    }

    #[test]
    fn denies_dynamic_execution_primitives() {
        assert_eq!(denied("x = eval('1 + 1')\n").0, "eval");
        assert_eq!(denied("exec(code)\n").0, "exec");
        assert_eq!(denied("m = __import__('os')\n").0, "__import__");
        assert_eq!(denied("().__class__.__bases__[0]\n").0, "__class__");
    }

    #[test]
    fn denies_private_module_references() {
        let source = "import collections\ncollections._sys.modules['os'].system('echo hi')\n";
        let (construct, category) = denied(source);
        assert_eq!(construct, "_sys");
        assert_eq!(category, ConstructCategory::DynamicExecution);

        assert_eq!(denied("import random\nrandom._os.getcwd()\n").0, "_os");
        assert_eq!(denied("import string\nstring._re\n").0, "_re");
    }

    #[test]
    fn denies_public_links_back_to_the_interpreter() {
        assert_eq!(denied("import re\nx = re.enum.sys\n").0, "sys");
        assert_eq!(denied("import functools\nm = functools.os\n").0, "os");
        assert_eq!(denied("loaded = registry.modules\n").0, "modules");
        assert_eq!(denied("def f():\n    yield 1\nf().gi_frame.f_globals\n").0, "gi_frame");
    }

    #[test]
    fn denies_private_attributes_on_candidate_objects() {
        let source = "class Counter:\n    def __init__(self):\n        self._count = 0\n";
        assert_eq!(denied(source).0, "_count");
    }

    #[test]
    fn allows_plain_dunders_and_public_attributes() {
        let source = "\
class Stack(list):
    def __init__(self):
        super().__init__()
        self.items = []

def name_of(f):
    return f.__name__
";
        assert!(analyzer().check(source).is_allowed());
    }

    #[test]
    fn denies_reflection_unless_whitelisted() {
        assert_eq!(denied("getattr(obj, 'x')\n").0, "getattr");

        let mut caps = Capabilities::default();
        caps.allowed_builtins.insert("getattr".to_string());
        assert!(SafetyAnalyzer::new(caps).check("getattr(obj, 'x')\n").is_allowed());
    }

    #[test]
    fn denies_non_whitelisted_import() {
        let (construct, category) = denied("import numpy as np\n");
        assert_eq!(construct, "import numpy");
        assert_eq!(category, ConstructCategory::DisallowedImport);
    }

    #[test]
    fn allows_whitelisted_import() {
        assert!(analyzer().check("import math\nfrom functools import reduce\n").is_allowed());
    }

    #[test]
    fn denies_relative_import() {
        assert_eq!(denied("from . import helpers\n").0, "from . import");
    }

    #[test]
    fn ignores_constructs_in_comments_and_strings() {
        let source = "# os.system('x') is forbidden\nmsg = \"do not eval(this)\"\nprint(msg)\n";
        assert!(analyzer().check(source).is_allowed());
    }

    #[test]
    fn inspects_code_inside_f_strings() {
        let source = "x = f\"{eval('1')}\"\n";
        assert_eq!(denied(source).0, "eval");
    }

    #[test]
    fn method_named_like_builtin_is_allowed() {
        assert!(analyzer().check("import re\np = re.compile('a+')\n").is_allowed());
    }

    #[test]
    fn open_requires_whitelist() {
        let (construct, category) = denied("data = open('notes.txt').read()\n");
        assert_eq!(construct, "open");
        assert_eq!(category, ConstructCategory::FilesystemAccess);
    }

    #[test]
    fn open_outside_root_is_denied_when_whitelisted() {
        let mut caps = Capabilities::default();
        caps.allowed_builtins.insert("open".to_string());
        let analyzer = SafetyAnalyzer::new(caps);

        assert!(analyzer.check("open('out.txt', 'w')\n").is_allowed());
        assert_eq!(
            analyzer.check("open('/etc/passwd')\n").construct(),
            Some("open(\"/etc/passwd\")")
        );
        assert_eq!(
            analyzer.check("open('../secret')\n").construct(),
            Some("open(\"../secret\")")
        );
    }

    #[test]
    fn process_category_wins_over_earlier_import() {
        let source = "import numpy\nimport os\nos.popen('ls')\n";
        assert_eq!(denied(source).0, "os.popen");
    }

    #[test]
    fn check_is_deterministic() {
        let source = "import os\nos.remove('x')\nos.system('y')\n";
        let first = analyzer().check(source);
        for _ in 0..5 {
            assert_eq!(analyzer().check(source), first);
        }
        assert_eq!(first.construct(), Some("os.system"));
    }

    #[test]
    fn mask_preserves_offsets() {
        let source = "a = 'os.system'  # eval\nb = 1\n";
        let masked = mask_literals(source);
        assert_eq!(masked.len(), source.len());
        assert!(!masked.contains("os.system"));
        assert!(!masked.contains("eval"));
        assert!(masked.contains("b = 1"));
    }

    #[test]
    fn verdict_serializes_with_tag() {
        let verdict = SafetyVerdict::Denied {
            construct: "os.system".to_string(),
            category: ConstructCategory::ProcessInvocation,
        };
        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("\"verdict\":\"denied\""));
        assert!(json.contains("\"process_invocation\""));
    }
}
