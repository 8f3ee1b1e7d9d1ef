//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal number, with optional K/M suffix
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, multiplier) = if let Some(n) = s.strip_suffix(['K', 'k']) {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix(['M', 'm']) {
        (n, 1024 * 1024)
    } else {
        (s, 1)
    };

    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))?
    } else {
        digits
            .parse::<u64>()
            .map_err(|e| format!("Invalid number: {}", e))?
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Value out of range: {}", s))
}

#[derive(Parser)]
#[command(name = "qspif")]
#[command(author, version, about = "SFDP-driven QSPI flash tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// SFDP source shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ImageArgs {
    /// Raw SFDP dump (defaults to a built-in 16 MiB profile)
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Sector map configuration to use instead of the first one
    #[arg(long, value_parser = parse_config_id)]
    pub config_id: Option<u8>,
}

fn parse_config_id(s: &str) -> Result<u8, String> {
    let value = parse_size(s)?;
    u8::try_from(value).map_err(|_| format!("Configuration ID out of range: {}", value))
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode an SFDP image and show the device layout
    Inspect {
        #[command(flatten)]
        image: ImageArgs,
    },

    /// Show the erase instructions a range decomposes into
    PlanErase {
        #[command(flatten)]
        image: ImageArgs,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_size)]
        start: u64,

        /// Length in bytes (K/M suffixes allowed)
        #[arg(short, long, value_parser = parse_size)]
        length: u64,
    },

    /// Run init, erase, program and verify against an emulated chip
    Simulate {
        #[command(flatten)]
        image: ImageArgs,

        /// Device configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_size, default_value = "0")]
        start: u64,

        /// Length in bytes (K/M suffixes allowed)
        #[arg(short, long, value_parser = parse_size, default_value = "64K")]
        length: u64,

        /// Register value the detection commands read back
        #[arg(long, value_parser = parse_detect_register, value_name = "ADDR=VALUE")]
        register: Vec<(u32, u8)>,
    },
}

fn parse_detect_register(s: &str) -> Result<(u32, u8), String> {
    let (addr, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected ADDR=VALUE, got '{}'", s))?;
    let addr = u32::try_from(parse_size(addr)?).map_err(|_| "Address out of range".to_string())?;
    let value = u8::try_from(parse_size(value)?).map_err(|_| "Value out of range".to_string())?;
    Ok((addr, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(4096));
        assert_eq!(parse_size("64K"), Ok(64 * 1024));
        assert_eq!(parse_size("2M"), Ok(2 * 1024 * 1024));
        assert_eq!(parse_size("0x10K"), Ok(16 * 1024));
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn test_parse_detect_register() {
        assert_eq!(parse_detect_register("0x800004=0x08"), Ok((0x80_0004, 0x08)));
        assert!(parse_detect_register("0x800004").is_err());
        assert!(parse_detect_register("1=256").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["qspif", "plan-erase", "-s", "0x10000", "-l", "68K"]).unwrap();
        match cli.command {
            Commands::PlanErase { start, length, .. } => {
                assert_eq!(start, 0x10000);
                assert_eq!(length, 68 * 1024);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
