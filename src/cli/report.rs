//! Plain-text and JSON rendering for CLI output.
//!
//! Pure functions from data to strings; printing and exit codes stay in the
//! command handlers.

use serde_json::{json, Value};

use crate::planner::ExecutionPlan;
use crate::profiles::McpProfile;

/// Render the profile table for `list profiles`.
pub fn render_profile_list(profiles: &[McpProfile]) -> String {
    if profiles.is_empty() {
        return "No profiles available.".to_string();
    }

    let mut lines = vec!["Available profiles:".to_string(), String::new()];
    for profile in profiles {
        lines.push(format!("  {:<8} {}", profile.id, profile.description));
    }
    lines.join("\n")
}

/// Render the full text block for `describe profile <id>`.
pub fn render_profile_details(profile: &McpProfile) -> String {
    let mut lines = vec![
        format!("Profile: {}", profile.id),
        String::new(),
        "Description:".to_string(),
        format!("  {}", profile.description),
        String::new(),
        "Server:".to_string(),
        format!("  command: {}", profile.server.command),
        format!("  kind: {}", profile.server.kind),
    ];

    if profile.server.auto_install {
        lines.push("  auto-install: yes".to_string());
    }
    if let Some(package) = &profile.server.package {
        lines.push(format!("  package: {package}"));
    }
    lines.push(String::new());

    if let Some(ui) = profile.ui.as_ref().filter(|ui| ui.enabled) {
        lines.push("UI:".to_string());
        lines.push("  enabled: yes".to_string());
        if let Some(hint) = &ui.hint {
            lines.push(format!("  hint: {hint}"));
        }
        lines.push(String::new());
    }

    lines.push("Plugins:".to_string());
    if profile.plugins.is_empty() {
        lines.push("  (none)".to_string());
    } else {
        for plugin in &profile.plugins {
            lines.push(format!("  - {} ({})", plugin.name, plugin.entry));
        }
    }

    if !profile.notes.is_empty() {
        lines.push(String::new());
        lines.push("Notes:".to_string());
        for note in &profile.notes {
            lines.push(format!("  - {note}"));
        }
    }

    lines.join("\n")
}

/// Render the `--dry-run` text block, with the `--explain` trace when asked.
pub fn render_plan_text(plan: &ExecutionPlan, explain: Option<&[String]>) -> String {
    let mut lines = Vec::new();

    if let Some(explain) = explain {
        lines.push("Execution explanation:".to_string());
        for line in explain {
            lines.push(format!("- {line}"));
        }
        lines.push(String::new());
    }

    lines.push("Execution plan:".to_string());
    lines.push(format!("  resolver: {}", plan.source));
    lines.push(format!("  command: {}", plan.invocation()));

    lines.join("\n")
}

/// Build the `--dry-run --json` document.
///
/// `profile` and `explain` are only present when they apply, matching the
/// text renderer's behavior.
pub fn dry_run_json(
    mode: &str,
    profile_id: Option<&str>,
    explain: Option<&[String]>,
    plan: &ExecutionPlan,
) -> Value {
    let mut doc = serde_json::Map::new();
    doc.insert("mode".to_string(), json!(mode));
    if let Some(id) = profile_id {
        doc.insert("profile".to_string(), json!(id));
    }
    if let Some(lines) = explain {
        doc.insert("explain".to_string(), json!(lines));
    }
    doc.insert(
        "plan".to_string(),
        json!({
            "command": plan.command,
            "args": plan.args,
            "source": plan.source,
        }),
    );
    Value::Object(doc)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
