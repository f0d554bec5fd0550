//! Command-line argument parsing.

use clap::{Parser, Subcommand};

/// upkeep - check for, download and install application updates
#[derive(Parser, Debug)]
#[command(name = "upkeep")]
#[command(about = "upkeep - check for, download and install application updates")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Base URL of the update service (e.g., http://127.0.0.1:8000)
    #[arg(long, global = true, env = "UPKEEP_SERVER")]
    pub server: Option<String>,

    /// Status poll interval (e.g., 500ms, 2s)
    #[arg(long, global = true)]
    pub poll_interval: Option<String>,

    /// Use an in-memory update service instead of the HTTP one
    #[arg(long, global = true)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the update service whether a newer version exists
    Check {
        /// Also report when already on the latest version
        #[arg(long)]
        notify_if_latest: bool,
    },

    /// Check, then have the service download the update
    Download,

    /// Check, download and install in one go
    Install,

    /// Fetch the service's current status once
    Status,

    /// Poll status and print progress until the service is idle
    Watch,

    /// Check, then download/install as allowed by configuration
    Run,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let args = Args::try_parse_from(["upkeep", "check", "--notify-if-latest"]).unwrap();
        assert_eq!(args.command, Command::Check { notify_if_latest: true });

        let args = Args::try_parse_from(["upkeep", "watch"]).unwrap();
        assert_eq!(args.command, Command::Watch);
        assert!(!args.mock);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "upkeep",
            "run",
            "--server",
            "http://10.0.0.5:8000",
            "--poll-interval",
            "2s",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(args.command, Command::Run);
        assert_eq!(args.server.as_deref(), Some("http://10.0.0.5:8000"));
        assert_eq!(args.poll_interval.as_deref(), Some("2s"));
        assert!(args.json_logs);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["upkeep"]).is_err());
    }
}
