//! Static profile records — declarative descriptions of preconfigured servers.
//!
//! A profile bundles everything the client needs to launch a known server:
//! the server command, whether it may be fetched on first use, and the
//! client-side plugins and UI affordances that go with it. Profiles are
//! compiled in; there is no profile file on disk.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Profile Types ───────────────────────────────────────────────────────────

/// How a profile's server is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// Known to the client; the execution planner resolves how to run it.
    Builtin,
    /// Brought by the user; executed exactly as declared.
    External,
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKind::Builtin => f.write_str("builtin"),
            ServerKind::External => f.write_str("external"),
        }
    }
}

/// Server launch declaration inside a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    pub kind: ServerKind,
    pub command: String,
    #[serde(default)]
    pub auto_install: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

/// A client-side plugin activated alongside the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePlugin {
    pub name: String,
    pub entry: String,
}

/// UI affordances for interactive frontends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSpec {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A preconfigured client profile.
///
/// Serialized with camelCase field names so `--json` output matches the
/// documented profile shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpProfile {
    pub id: String,
    pub description: String,
    pub server: ServerSpec,
    #[serde(default)]
    pub plugins: Vec<ProfilePlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

// ─── Builtin Registry ────────────────────────────────────────────────────────

/// The `web-dev` profile: zero-config web development against the reference
/// server.
fn web_dev_profile() -> McpProfile {
    McpProfile {
        id: "web-dev".to_string(),
        description: "Zero-config web development MCP stack".to_string(),
        server: ServerSpec {
            kind: ServerKind::Builtin,
            command: "mcp-server-general".to_string(),
            auto_install: true,
            package: Some("mcp-server-general".to_string()),
        },
        plugins: vec![ProfilePlugin {
            name: "web-tools".to_string(),
            entry: "@mcp/plugin-web-tools".to_string(),
        }],
        ui: Some(UiSpec {
            enabled: true,
            hint: Some("Launches browser-based MCP UI for web development".to_string()),
        }),
        notes: vec![
            "Automatically installs and runs the reference MCP server".to_string(),
            "Designed for zero-config onboarding".to_string(),
        ],
    }
}

/// All profiles shipped with the client.
pub fn list_profiles() -> Vec<McpProfile> {
    vec![web_dev_profile()]
}

/// Look up a profile by id.
pub fn get_profile(id: &str) -> Option<McpProfile> {
    list_profiles().into_iter().find(|p| p.id == id)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_dev_profile_is_registered() {
        let profile = get_profile("web-dev").expect("web-dev profile missing");
        assert_eq!(profile.server.kind, ServerKind::Builtin);
        assert_eq!(profile.server.command, "mcp-server-general");
        assert!(profile.server.auto_install);
        assert_eq!(profile.plugins.len(), 1);
        assert_eq!(profile.plugins[0].name, "web-tools");
    }

    #[test]
    fn test_unknown_profile_is_none() {
        assert!(get_profile("nope").is_none());
    }

    #[test]
    fn test_profile_ids_are_unique() {
        let profiles = list_profiles();
        let mut ids: Vec<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), profiles.len());
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let json = serde_json::to_string(&web_dev_profile()).unwrap();
        assert!(json.contains("\"autoInstall\":true"));
        assert!(json.contains("\"kind\":\"builtin\""));
        assert!(!json.contains("auto_install"));
    }

    #[test]
    fn test_profile_round_trips() {
        let json = serde_json::to_string(&web_dev_profile()).unwrap();
        let back: McpProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "web-dev");
        assert!(back.ui.unwrap().enabled);
        assert_eq!(back.notes.len(), 2);
    }
}
