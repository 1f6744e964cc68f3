//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation.

use crate::motor::MotorId;
use clap::Parser;
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Drive a two-motor controller link against a simulated controller
#[derive(Parser, Debug, Default)]
#[command(name = "motor-link")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stop after this many cycles (default: run until Ctrl+C)
    #[arg(long, value_name = "N")]
    pub cycles: Option<u64>,

    /// Frame size the simulated controller negotiates, overhead included
    #[arg(long, value_name = "BYTES", default_value_t = 250)]
    pub frame_size: usize,

    /// Use acknowledged writes
    #[arg(long)]
    pub acknowledged: bool,

    /// Drop every Nth reply notification
    #[arg(long, value_name = "N")]
    pub loss: Option<u64>,

    /// Put a motor into homing mode once connected
    #[arg(long, value_name = "MOTOR")]
    pub homing: Option<MotorId>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::parse_from(["motor-link"]);
        assert!(!cli.verbose);
        assert!(!cli.acknowledged);
        assert_eq!(cli.frame_size, 250);
        assert!(cli.cycles.is_none());
        assert!(cli.homing.is_none());
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["motor-link", "-v"]);
        assert!(cli.verbose);

        let cli = Cli::parse_from(["motor-link", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_link_options() {
        let cli = Cli::parse_from([
            "motor-link",
            "--cycles",
            "50",
            "--frame-size",
            "23",
            "--acknowledged",
            "--loss",
            "4",
            "--config",
            "link.toml",
        ]);
        assert_eq!(cli.cycles, Some(50));
        assert_eq!(cli.frame_size, 23);
        assert!(cli.acknowledged);
        assert_eq!(cli.loss, Some(4));
        assert_eq!(cli.config, Some(PathBuf::from("link.toml")));
    }

    #[test]
    fn test_cli_parse_homing() {
        let cli = Cli::parse_from(["motor-link", "--homing", "motor2"]);
        assert_eq!(cli.homing, Some(MotorId::Motor2));
        assert!(Cli::try_parse_from(["motor-link", "--homing", "motor3"]).is_err());
    }
}
