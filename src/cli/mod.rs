//! Command-line interface — argument parsing, logging setup, and dispatch.
//!
//! Subcommands:
//! - `run` — resolve an execution plan, launch the server, bridge stdin
//! - `list profiles` — show the built-in profile registry
//! - `describe profile <id>` — show everything one profile declares
//!
//! Diagnostics go to stderr through `tracing`; stdout carries only command
//! output (plans, profile listings, JSON-RPC responses).

pub mod report;
pub mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::profiles;

/// Environment variable that turns on verbose client diagnostics.
const DEBUG_ENV: &str = "MCP_DEBUG";

#[derive(Parser, Debug)]
#[command(name = "mcp")]
#[command(about = "General MCP client — drive MCP servers over stdio JSON-RPC")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch an MCP server and bridge stdin JSON-RPC payloads to it
    Run(run::RunArgs),

    /// List available resources
    List {
        /// What to list (currently only `profiles`)
        target: String,

        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Describe a named resource
    Describe {
        /// What to describe (currently only `profile`)
        target: String,

        /// Profile id, e.g. `web-dev`
        id: String,

        /// Print raw JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Initialize the tracing subscriber.
///
/// `MCP_DEBUG` (any non-empty value) raises this crate to debug level; an
/// explicit `RUST_LOG` wins over both. Output goes to stderr so stdout stays
/// reserved for responses.
pub fn init_tracing() {
    let debug = std::env::var(DEBUG_ENV).is_ok_and(|v| !v.is_empty());
    let default_filter = if debug {
        "mcp_client=debug"
    } else {
        "mcp_client=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Execute the parsed command.
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => run::run(args).await,
        Command::List { target, json } => list(&target, json),
        Command::Describe { target, id, json } => describe(&target, &id, json),
    }
}

fn list(target: &str, json: bool) -> Result<()> {
    if target != "profiles" {
        anyhow::bail!("unknown list target: {target} (try `mcp list profiles`)");
    }

    let profiles = profiles::list_profiles();
    if json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
    } else {
        println!("{}", report::render_profile_list(&profiles));
    }
    Ok(())
}

fn describe(target: &str, id: &str, json: bool) -> Result<()> {
    if target != "profile" {
        anyhow::bail!("unknown describe target: {target} (try `mcp describe profile <id>`)");
    }

    let profile =
        profiles::get_profile(id).ok_or_else(|| anyhow::anyhow!("unknown profile: {id}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("{}", report::render_profile_details(&profile));
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_accepts_quoted_command() {
        let cli = Cli::try_parse_from(["mcp", "run", "node dist/server.js"]).unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.command.as_deref(), Some("node dist/server.js"));
                assert!(args.profile.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_run_accepts_profile_and_flags() {
        let cli = Cli::try_parse_from([
            "mcp", "run", "--profile", "web-dev", "--dry-run", "--json", "--explain",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.profile.as_deref(), Some("web-dev"));
                assert!(args.dry_run && args.json && args.explain);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_list_profiles_parses() {
        let cli = Cli::try_parse_from(["mcp", "list", "profiles", "--json"]).unwrap();
        match cli.command {
            Command::List { target, json } => {
                assert_eq!(target, "profiles");
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_describe_profile_parses() {
        let cli = Cli::try_parse_from(["mcp", "describe", "profile", "web-dev"]).unwrap();
        match cli.command {
            Command::Describe { target, id, json } => {
                assert_eq!(target, "profile");
                assert_eq!(id, "web-dev");
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_list_target_is_an_error() {
        assert!(list("servers", false).is_err());
    }

    #[test]
    fn test_unknown_describe_target_is_an_error() {
        assert!(describe("server", "web-dev", false).is_err());
    }

    #[test]
    fn test_unknown_profile_is_an_error() {
        assert!(describe("profile", "nope", false).is_err());
    }
}
