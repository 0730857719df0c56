//! CLI argument definitions using clap
//!
//! Commands:
//! - schemaform check <definition>
//! - schemaform run <definition> --step <step>...

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use serde_json::Value;
use simplelog::LevelFilter;

use crate::error::CliError;

/// schemaform - drive a schema-described form from the command line
#[derive(Parser, Debug)]
#[command(name = "schemaform")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a definition and list its fields
    Check {
        /// Path to the form definition (JSON)
        definition: PathBuf,
    },

    /// Run a scripted session against a definition
    Run {
        /// Path to the form definition (JSON)
        definition: PathBuf,

        /// Session step: KEY=JSON, `validate`, `submit` or `reset`. Repeatable.
        #[arg(long = "step", short = 's')]
        steps: Vec<Step>,

        /// Print the final validity mapping as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Set { key: String, value: Value },
    Validate,
    Submit,
    Reset,
}

impl FromStr for Step {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validate" => Ok(Self::Validate),
            "submit" => Ok(Self::Submit),
            "reset" => Ok(Self::Reset),
            _ => {
                let (key, raw) = s
                    .split_once('=')
                    .ok_or_else(|| CliError::invalid_step(s, "expected KEY=JSON"))?;
                if key.is_empty() {
                    return Err(CliError::invalid_step(s, "empty key"));
                }
                // Bare words are taken as strings.
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
                Ok(Self::Set {
                    key: key.to_string(),
                    value,
                })
            }
        }
    }
}
