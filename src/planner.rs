//! Execution planning — decide how to invoke a declared server command.
//!
//! Resolution order (first match wins):
//! 1. Project-local binary under `node_modules/.bin` (no network cost)
//! 2. `npm exec` when the profile allows auto-install (fetch-and-run)
//! 3. `npx` as the zero-install fallback
//!
//! Planning is pure aside from one filesystem existence check and always
//! returns a plan; a plan that resolves to a missing or broken command only
//! fails later, at spawn time.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::profiles::ServerSpec;

// ─── Plan Types ──────────────────────────────────────────────────────────────

/// How the planned command was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionSource {
    /// User-supplied command line, executed verbatim.
    Explicit,
    /// Binary found under the project-local dependency directory.
    LocalBin,
    /// Fetched and run through `npm exec` (auto-install allowed).
    NpmExec,
    /// Zero-install fallback through `npx`.
    Npx,
}

impl fmt::Display for ExecutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionSource::Explicit => "explicit",
            ExecutionSource::LocalBin => "local-bin",
            ExecutionSource::NpmExec => "npm-exec",
            ExecutionSource::Npx => "npx",
        };
        f.write_str(label)
    }
}

/// A resolved `(command, args, source)` launch decision.
///
/// Immutable once produced; one plan per launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub command: String,
    pub args: Vec<String>,
    pub source: ExecutionSource,
}

impl ExecutionPlan {
    /// Plan for a user-supplied command line, split on whitespace.
    pub fn explicit(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let command = parts.next().unwrap_or_default();
        Self {
            command,
            args: parts.collect(),
            source: ExecutionSource::Explicit,
        }
    }

    /// The full invocation as one display string (`npm exec tool-x`).
    pub fn invocation(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

// ─── Platform Helpers ────────────────────────────────────────────────────────

/// Platform-correct npm command.
///
/// Windows requires `npm.cmd` because `npm` is a batch script;
/// `Command::new("npm")` fails without the extension on Windows.
fn default_npm_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "npm.cmd"
    } else {
        "npm"
    }
}

/// Platform-correct npx command (same batch-script caveat as npm).
fn default_npx_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "npx.cmd"
    } else {
        "npx"
    }
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// Project-local dependency binary directory, relative to the working
/// directory the client was launched from.
pub fn local_bin_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("node_modules")
        .join(".bin")
}

/// Check whether `command` has a binary under `bin_dir`.
///
/// npm writes `.cmd` shims on Windows, so that name is probed there too.
fn has_local_bin(bin_dir: &Path, command: &str) -> bool {
    if bin_dir.join(command).exists() {
        return true;
    }
    if cfg!(target_os = "windows") {
        return bin_dir.join(format!("{command}.cmd")).exists();
    }
    false
}

/// Decide how to invoke a declared server command.
///
/// `bin_dir` is the local dependency binary directory to probe
/// ([`local_bin_dir`] in production; a temp directory in tests).
pub fn plan_execution(server: &ServerSpec, bin_dir: &Path) -> ExecutionPlan {
    if has_local_bin(bin_dir, &server.command) {
        return ExecutionPlan {
            command: server.command.clone(),
            args: Vec::new(),
            source: ExecutionSource::LocalBin,
        };
    }

    if server.auto_install {
        return ExecutionPlan {
            command: default_npm_command().to_string(),
            args: vec!["exec".to_string(), server.command.clone()],
            source: ExecutionSource::NpmExec,
        };
    }

    ExecutionPlan {
        command: default_npx_command().to_string(),
        args: vec![server.command.clone()],
        source: ExecutionSource::Npx,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
