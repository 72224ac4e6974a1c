//! Clap derive structures for the `unifi-events` CLI.
//!
//! Kept free of crate-internal types: `build.rs` includes this file
//! directly to render man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// unifi-events -- watch and query a UniFi controller
#[derive(Debug, Parser)]
#[command(
    name = "unifi-events",
    version,
    about = "Stream classified events from a UniFi controller",
    long_about = "Keeps an authenticated session with a UniFi controller, streams its\n\
        events as JSON lines, and issues one-shot REST calls.\n\n\
        Works with classic Network Application installs and UniFi OS consoles.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "UNIFI_EVENTS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Path to the config file
    #[arg(long, env = "UNIFI_EVENTS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Controller host name or address (overrides profile)
    #[arg(long, short = 'H', env = "UNIFI_EVENTS_HOST", global = true)]
    pub host: Option<String>,

    /// Controller port [default: 8443, or 443 with --unifi-os]
    #[arg(long, short = 'P', env = "UNIFI_EVENTS_PORT", global = true)]
    pub port: Option<u16>,

    /// Site name
    #[arg(long, short = 's', env = "UNIFI_EVENTS_SITE", global = true)]
    pub site: Option<String>,

    /// Login user name
    #[arg(long, short = 'u', env = "UNIFI_EVENTS_USERNAME", global = true)]
    pub username: Option<String>,

    /// Login password
    #[arg(
        long,
        env = "UNIFI_EVENTS_PASSWORD",
        global = true,
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Controller is a UniFi OS console (UDM, UCG, Cloud Key Gen2+)
    #[arg(long, env = "UNIFI_EVENTS_UNIFI_OS", global = true)]
    pub unifi_os: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "UNIFI_EVENTS_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "UNIFI_EVENTS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "UNIFI_EVENTS_OUTPUT",
        default_value = "json-lines",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One compact JSON document per line (default)
    JsonLines,
    /// Pretty-printed JSON
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and print events until interrupted
    #[command(alias = "watch")]
    Listen(ListenArgs),

    /// GET a controller path
    Get(PathArgs),

    /// POST a JSON body to a controller path
    Post(BodyArgs),

    /// PUT a JSON body to a controller path
    Put(BodyArgs),

    /// DELETE a controller path
    Delete(PathArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Topic patterns to print (`*` = one segment, `**` = any depth)
    #[arg(default_value = "**")]
    pub patterns: Vec<String>,

    /// Leave out `ctrl.*` lifecycle events
    #[arg(long)]
    pub no_lifecycle: bool,
}

#[derive(Debug, Args)]
pub struct PathArgs {
    /// Site-relative path (`stat/device`) or rooted path (`/api/self/sites`)
    pub path: String,
}

#[derive(Debug, Args)]
pub struct BodyArgs {
    /// Site-relative path (`rest/user`) or rooted path (`/api/...`)
    pub path: String,

    /// JSON request body
    #[arg(long, short = 'd', default_value = "{}")]
    pub data: String,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
