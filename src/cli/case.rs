//! Case CLI subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::adapters::CaseRegistry;
use crate::config;
use crate::domain::is_valid_id;

/// Case-related subcommands
#[derive(Subcommand, Debug)]
pub enum CaseCommands {
    /// Register a case so evidence can be attached to it
    Add {
        /// Case ID (e.g. CASE-2024-001)
        case_id: String,

        /// Short case title
        #[arg(short, long, default_value = "")]
        title: String,
    },

    /// List registered cases
    List,
}

pub async fn execute(command: CaseCommands) -> Result<()> {
    let cfg = config::config()?;
    let mut registry = CaseRegistry::load(cfg.cases_path())
        .await
        .context("Failed to load case registry")?;

    match command {
        CaseCommands::Add { case_id, title } => {
            if !is_valid_id(&case_id) {
                anyhow::bail!("Invalid case ID: {}", case_id);
            }

            if registry.register(&case_id, title) {
                registry.save().await?;
                println!("Registered case {}", case_id);
            } else {
                println!("Case {} is already registered", case_id);
            }
        }
        CaseCommands::List => {
            if registry.is_empty() {
                println!("No cases registered. Add one with: custodian case add <CASE_ID>");
                return Ok(());
            }

            println!("{:<24} {:<20} TITLE", "CASE", "OPENED");
            for case in registry.list() {
                println!(
                    "{:<24} {:<20} {}",
                    case.id,
                    case.opened_at.format("%Y-%m-%d %H:%M"),
                    case.title
                );
            }
        }
    }

    Ok(())
}
