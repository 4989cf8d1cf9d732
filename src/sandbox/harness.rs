//! The Python harness that hosts every candidate.
//!
//! This is the only place generated text is ever evaluated. The harness reads
//! a JSON payload on stdin, builds a builtins table containing only the
//! whitelisted names (with guarded `__import__` and `open`), executes the
//! candidate with stdout redirected into a capped buffer, calls the entry point, and
//! writes a single marked JSON report line to the real stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

/// Prefix of the report line written by the harness.
pub const REPORT_MARKER: &str = "__SANDBOX_RESULT__";

/// Harness source passed to the interpreter with `-c`.
pub const HARNESS_SOURCE: &str = r#"
import builtins as _b
import contextlib as _cl
import json as _json
import os as _os
import sys as _sys
import traceback as _tb

_MARKER = "__SANDBOX_RESULT__"


def _encode(value):
    try:
        _json.dumps(value, allow_nan=False)
        return value
    except (TypeError, ValueError):
        return repr(value)


class _CappedWriter:
    def __init__(self, limit):
        self.limit = limit
        self.parts = []
        self.kept = 0
        self.dropped = 0

    def write(self, text):
        text = str(text)
        room = max(0, self.limit - self.kept)
        piece = text[:room]
        if piece:
            self.parts.append(piece)
            self.kept += len(piece)
        self.dropped += len(text) - len(piece)
        return len(text)

    def flush(self):
        pass

    def getvalue(self):
        return "".join(self.parts)


def _guarded_import(allowed, real_import):
    def guarded(name, globals=None, locals=None, fromlist=(), level=0):
        if level != 0 or name.split(".")[0] not in allowed:
            raise ImportError("import of '%s' is not permitted in the sandbox" % name)
        return real_import(name, globals, locals, fromlist, level)
    return guarded


def _guarded_open(root, real_open):
    def guarded(file, mode="r", *args, **kwargs):
        path = _os.path.realpath(_os.path.join(root, _os.fspath(file)))
        if path != root and not path.startswith(root + _os.sep):
            raise PermissionError("path '%s' is outside the sandbox root" % file)
        return real_open(path, mode, *args, **kwargs)
    return guarded


def _main():
    payload = _json.loads(_sys.stdin.read())
    root = _os.path.realpath(payload["root"])
    table = {"__build_class__": _b.__build_class__}
    for name in payload["builtins"]:
        if name == "open":
            table["open"] = _guarded_open(root, _b.open)
        elif hasattr(_b, name):
            table[name] = getattr(_b, name)
    table["__import__"] = _guarded_import(set(payload["modules"]), _b.__import__)
    scope = {"__builtins__": table, "__name__": "__candidate__"}

    out = _CappedWriter(payload["max_output"])
    report = {}
    try:
        with _cl.redirect_stdout(out):
            code = compile(payload["source"], "<candidate>", "exec")
            exec(code, scope)
            value = None
            entry = payload.get("entry_point")
            if entry is not None:
                target = scope.get(entry)
                if not callable(target):
                    raise NameError("entry point '%s' is not defined" % entry)
                value = target(*payload["args"])
        value = _encode(value)
        report["ok"] = True
        report["return_value"] = value
    except BaseException as exc:
        frames = [f for f in _tb.extract_tb(exc.__traceback__) if f.filename == "<candidate>"]
        stack = ["line %d in %s" % (f.lineno, f.name) for f in frames]
        if isinstance(exc, SyntaxError) and exc.lineno:
            stack.append("line %d" % exc.lineno)
        report["ok"] = False
        report["exception"] = type(exc).__name__
        report["message"] = str(exc)
        report["stack"] = stack

    report["truncated"] = out.dropped
    report["stdout"] = out.getvalue()
    _sys.__stdout__.write(_MARKER + _json.dumps(report) + "\n")
    _sys.__stdout__.flush()


_main()
"#;

/// Payload written to the harness on stdin.
#[derive(Debug, Serialize)]
pub struct HarnessPayload<'a> {
    pub source: &'a str,
    pub entry_point: Option<&'a str>,
    pub args: &'a [Value],
    pub builtins: &'a BTreeSet<String>,
    pub modules: &'a BTreeSet<String>,
    pub root: &'a Path,
    pub max_output: usize,
}

/// Report line emitted by the harness.
#[derive(Debug, Deserialize)]
pub struct HarnessReport {
    pub ok: bool,
    #[serde(default)]
    pub return_value: Value,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack: Vec<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub truncated: usize,
}

impl HarnessReport {
    /// Finds and parses the marked report line in raw harness stdout.
    pub fn parse(raw_stdout: &str) -> Option<std::result::Result<Self, serde_json::Error>> {
        raw_stdout
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(REPORT_MARKER))
            .map(serde_json::from_str)
    }

    /// Captured stdout with a notice appended when it was truncated.
    pub fn stdout_with_notice(&self) -> String {
        if self.truncated > 0 {
            format!("{}\n[stdout truncated {} chars]\n", self.stdout, self.truncated)
        } else {
            self.stdout.clone()
        }
    }
}
