//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "pathwarden")]
#[command(author, version, about = "Blocks clients that probe for sensitive paths")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Restore blocks, run the periodic sweep and wait for SIGINT/SIGTERM
    Run,

    /// Re-install packet-filter rules for every active block (service pre-start)
    Restore,

    /// Show stored records with their state and remaining time
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Include tracked and expired records
        #[arg(long, short)]
        all: bool,
    },

    /// Show the stored state of an address
    Check {
        /// IP address to check
        ip: String,
    },

    /// Evaluate a request and apply the resulting decision
    Decide {
        /// Client IP address
        ip: String,
        /// Request path
        path: String,
    },

    /// Lift the block on an address and forget its history
    Unblock {
        /// IP address to unblock
        ip: String,
    },

    /// Remove expired blocks from the store and the packet filter
    Sweep,

    /// Remove expired records from the store only (no packet-filter changes)
    Prune,

    /// Write a commented default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_help() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_version_command() {
        let cli = Cli::try_parse_from(["pathwarden", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::try_parse_from(["pathwarden", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!cli.quiet);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pathwarden", "sweep", "-c", "/tmp/pw.yaml", "-v"]).unwrap();
        assert!(matches!(cli.command, Commands::Sweep));
        assert_eq!(cli.config, PathBuf::from("/tmp/pw.yaml"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_decide_command() {
        let cli = Cli::try_parse_from(["pathwarden", "decide", "203.0.113.5", "/.env"]).unwrap();
        match cli.command {
            Commands::Decide { ip, path } => {
                assert_eq!(ip, "203.0.113.5");
                assert_eq!(path, "/.env");
            }
            _ => panic!("Expected Decide command"),
        }
    }

    #[test]
    fn test_cli_decide_requires_path() {
        assert!(Cli::try_parse_from(["pathwarden", "decide", "203.0.113.5"]).is_err());
    }

    #[test]
    fn test_cli_status_flags() {
        let cli = Cli::try_parse_from(["pathwarden", "status", "--json", "-a"]).unwrap();
        match cli.command {
            Commands::Status { json, all } => {
                assert!(json);
                assert!(all);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_init_config() {
        let cli = Cli::try_parse_from(["pathwarden", "init-config", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::InitConfig { force: true }));
    }

    #[test]
    fn test_cli_unblock_and_check() {
        let cli = Cli::try_parse_from(["pathwarden", "unblock", "2001:db8::1"]).unwrap();
        assert!(matches!(cli.command, Commands::Unblock { ip } if ip == "2001:db8::1"));

        let cli = Cli::try_parse_from(["pathwarden", "check", "192.0.2.1"]).unwrap();
        assert!(matches!(cli.command, Commands::Check { ip } if ip == "192.0.2.1"));
    }

    #[test]
    fn test_cli_unknown_command() {
        assert!(Cli::try_parse_from(["pathwarden", "install"]).is_err());
    }
}
