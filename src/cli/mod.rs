//! Command-line interface for custodian.
//!
//! Provides commands for registering cases, collecting evidence,
//! recording custody transfers and status changes, and verifying
//! digital evidence against its collection baseline.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::CaseRegistry;
use crate::config::{self, ResolvedConfig};
use crate::core::EvidenceService;

pub mod case;
pub mod evidence;

/// custodian - Evidence lifecycle and chain-of-custody ledger
#[derive(Parser, Debug)]
#[command(name = "custodian")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the cases evidence can be attached to
    Case {
        #[command(subcommand)]
        command: case::CaseCommands,
    },

    /// Collect, move and verify evidence
    Evidence {
        #[command(subcommand)]
        command: evidence::EvidenceCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Case { command } => case::execute(command).await,
            Commands::Evidence { command } => evidence::execute(command).await,
            Commands::Config => show_config(),
        }
    }
}

/// Build the file-backed service for the configured home directory
pub(crate) async fn open_service(cfg: &ResolvedConfig) -> Result<EvidenceService> {
    let registry = CaseRegistry::load(cfg.cases_path())
        .await
        .context("Failed to load case registry")?;

    Ok(EvidenceService::file_backed(
        &cfg.evidence_dir(),
        Arc::new(registry),
        Arc::new(cfg.digest.digester()),
    ))
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Custodian Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Evidence: {}", cfg.evidence_dir().display());
    println!("  Cases:    {}", cfg.cases_path().display());
    println!();
    println!("Storage:");
    println!("  Default location: {}", cfg.default_location);
    println!();
    println!("Digest:");
    println!("  Algorithm:  sha256");
    println!("  Chunk size: {} bytes", cfg.digest.chunk_size_bytes);
    match cfg.digest.timeout_seconds {
        Some(secs) => println!("  Timeout:    {}s", secs),
        None => println!("  Timeout:    (none)"),
    }

    Ok(())
}
