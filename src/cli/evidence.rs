//! Evidence CLI subcommands.
//!
//! Provides commands to:
//! - `add`: Collect a new item (digital files are hashed on collection)
//! - `transfer` / `status` / `dispose`: Record custody events
//! - `show` / `list` / `search`: Inspect records and custody history
//! - `verify`: Re-hash a digital item against its collection baseline
//! - `delete`: Administrative removal of an item and its history

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};

use crate::config;
use crate::core::{Disposal, DisposalMethod, StatusChange, TransferRequest};
use crate::domain::{
    BiologicalSample, CollectionSite, EvidenceItem, EvidenceStatus, EvidenceType, NewEvidence,
    NewEvidenceKind,
};

use super::open_service;

/// Evidence-related subcommands
#[derive(Subcommand, Debug)]
pub enum EvidenceCommands {
    /// Collect a new evidence item
    Add {
        /// What the item is
        #[arg(short, long)]
        desc: String,

        /// Evidence type (physical, digital, document, biological, weapon, other)
        #[arg(short = 't', long = "type")]
        evidence_type: String,

        /// Case the item belongs to
        #[arg(short, long)]
        case: String,

        /// Use this ID instead of a generated one
        #[arg(long)]
        id: Option<String>,

        /// File to hash (required for digital evidence)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Device the file was taken from (digital evidence)
        #[arg(long)]
        device: Option<String>,

        /// Sample kind, e.g. BLOOD or DNA (biological evidence)
        #[arg(long)]
        sample_type: Option<String>,

        /// Person collecting the item
        #[arg(long, env = "CUSTODIAN_OFFICER")]
        collected_by: String,

        /// Where the item was found
        #[arg(long, default_value = "")]
        site: String,

        /// Address of the collection site
        #[arg(long)]
        address: Option<String>,

        /// Storage location after collection
        #[arg(long)]
        storage: Option<String>,

        /// How the item was collected
        #[arg(long, default_value = "")]
        method: String,

        /// Notes taken at collection
        #[arg(long, default_value = "")]
        notes: String,

        /// Tags to apply (comma-separated)
        #[arg(long)]
        tags: Option<String>,

        /// IDs of related evidence items (comma-separated)
        #[arg(long)]
        related: Option<String>,

        /// Mark the item confidential
        #[arg(long)]
        confidential: bool,

        /// Official exhibit number
        #[arg(long)]
        number: Option<String>,
    },

    /// List evidence, optionally for a single case
    List {
        /// Case ID to filter by
        case_id: Option<String>,
    },

    /// Show an item and its custody history
    Show {
        /// Evidence ID to display
        evidence_id: String,
    },

    /// Record a custody transfer
    Transfer {
        evidence_id: String,

        /// Person handing the item over
        #[arg(long)]
        from: String,

        /// Person receiving the item
        #[arg(long)]
        to: String,

        /// Location the item leaves (defaults to its recorded location)
        #[arg(long, default_value = "")]
        from_location: String,

        /// Location the item arrives at
        #[arg(long)]
        to_location: String,

        #[arg(long)]
        reason: String,

        #[arg(long, default_value = "")]
        notes: String,

        #[arg(long)]
        authorized_by: Option<String>,

        /// How the item was moved (courier, sealed bag...)
        #[arg(long)]
        transport: Option<String>,
    },

    /// Move an item to its next lifecycle status
    Status {
        evidence_id: String,

        /// Target status (processing, analyzed, in-storage, transferred, released, destroyed)
        status: String,

        /// Person performing the change
        #[arg(long)]
        by: String,

        #[arg(long)]
        reason: String,

        /// New location (item stays where it is if omitted)
        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        authorized_by: Option<String>,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Release or destroy an item
    Dispose {
        evidence_id: String,

        #[arg(long, value_enum)]
        method: DisposalArg,

        #[arg(long)]
        by: String,

        #[arg(long)]
        reason: String,

        #[arg(long)]
        authorized_by: String,

        #[arg(long)]
        location: Option<String>,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Verify a digital item against its collection hash (exit code 1 on mismatch)
    Verify {
        evidence_id: String,
    },

    /// Search descriptions and tags
    Search {
        /// Search query (case-insensitive substring)
        query: String,
    },

    /// Delete an item and its entire custody history
    Delete {
        evidence_id: String,

        /// Required; deletion cannot be undone
        #[arg(long)]
        force: bool,
    },
}

/// Disposal method for CLI (maps to DisposalMethod)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DisposalArg {
    /// Return to owner or another agency
    Release,

    /// Destroy the item
    Destroy,
}

impl From<DisposalArg> for DisposalMethod {
    fn from(arg: DisposalArg) -> Self {
        match arg {
            DisposalArg::Release => DisposalMethod::Release,
            DisposalArg::Destroy => DisposalMethod::Destroy,
        }
    }
}

pub async fn execute(command: EvidenceCommands) -> Result<()> {
    let cfg = config::config()?;
    let service = open_service(cfg).await?;

    match command {
        EvidenceCommands::Add {
            desc,
            evidence_type,
            case,
            id,
            file,
            device,
            sample_type,
            collected_by,
            site,
            address,
            storage,
            method,
            notes,
            tags,
            related,
            confidential,
            number,
        } => {
            let evidence_type: EvidenceType = evidence_type.parse()?;
            let kind = match evidence_type {
                EvidenceType::Digital => {
                    let file = file.context("--file is required for digital evidence")?;
                    NewEvidenceKind::Digital {
                        file_path: absolute(file)?,
                        device_source: device,
                    }
                }
                EvidenceType::Biological => NewEvidenceKind::Biological(BiologicalSample {
                    biological_type: sample_type.unwrap_or_default(),
                    ..Default::default()
                }),
                EvidenceType::Physical => NewEvidenceKind::Physical,
                EvidenceType::Document => NewEvidenceKind::Document,
                EvidenceType::Weapon => NewEvidenceKind::Weapon,
                EvidenceType::Other => NewEvidenceKind::Other,
            };

            let mut site = CollectionSite::new(site);
            if let Some(address) = address {
                site = site.with_address(address);
            }

            let mut input = NewEvidence::new(case, desc, kind)
                .collected_by(collected_by)
                .collected_at(site)
                .stored_in(storage.unwrap_or_else(|| cfg.default_location.clone()))
                .with_tags(split_list(tags.as_deref()));
            for related_id in split_list(related.as_deref()) {
                input = input.related_to(related_id);
            }
            if let Some(id) = id {
                input = input.with_id(id);
            }
            if confidential {
                input = input.confidential();
            }
            input.evidence_number = number;
            input.collection_method = method;
            input.collection_notes = notes;

            let item = service.create_evidence(input).await?;

            println!("{}", item.id);
            if let Some(artifact) = item.digital() {
                println!("  SHA256: {}", artifact.original_hash);
            }
        }

        EvidenceCommands::List { case_id } => {
            let items = match case_id {
                Some(case_id) => service.search_by_case(&case_id).await?,
                None => service.search("").await?,
            };
            print_table(&items);
        }

        EvidenceCommands::Show { evidence_id } => {
            let item = service.get_evidence(&evidence_id).await?;
            let history = service.custody_history(&evidence_id).await?;
            print_item(&item);

            println!();
            println!("Custody history ({} events):", history.len());
            for event in &history {
                println!("  {}", event.summary());
                if let Some(by) = &event.authorized_by {
                    println!("      authorized by {}", by);
                }
                if !event.notes.is_empty() {
                    println!("      {}", event.notes);
                }
            }
        }

        EvidenceCommands::Transfer {
            evidence_id,
            from,
            to,
            from_location,
            to_location,
            reason,
            notes,
            authorized_by,
            transport,
        } => {
            let mut request = TransferRequest::new(from, to, from_location, to_location, reason)
                .with_notes(notes);
            request.authorized_by = authorized_by;
            request.transport_method = transport;

            let update = service.transfer_custody(&evidence_id, request).await?;
            println!("{}", update.event.summary());
        }

        EvidenceCommands::Status {
            evidence_id,
            status,
            by,
            reason,
            location,
            authorized_by,
            notes,
        } => {
            let target: EvidenceStatus = status.parse()?;
            let change = StatusChange {
                target,
                performed_by: by,
                location,
                reason,
                notes,
                authorized_by,
            };

            let update = service.update_status(&evidence_id, change).await?;
            println!("{}", update.event.summary());
            println!("Status: {}", update.item.status);
        }

        EvidenceCommands::Dispose {
            evidence_id,
            method,
            by,
            reason,
            authorized_by,
            location,
            notes,
        } => {
            let disposal = Disposal {
                method: method.into(),
                performed_by: by,
                reason,
                authorized_by,
                location,
                notes,
            };

            let update = service.dispose(&evidence_id, disposal).await?;
            println!("{}", update.event.summary());
            println!("Status: {}", update.item.status);
        }

        EvidenceCommands::Verify { evidence_id } => {
            let report = service.verify_integrity(&evidence_id).await?;

            println!("Verified: {}", report.matched);
            println!("{}", report.explanation());

            if !report.matched {
                std::process::exit(1);
            }
        }

        EvidenceCommands::Search { query } => {
            let items = service.search(&query).await?;
            print_table(&items);
        }

        EvidenceCommands::Delete { evidence_id, force } => {
            if !force {
                anyhow::bail!(
                    "Refusing to delete {} and its custody history without --force",
                    evidence_id
                );
            }

            service.delete_evidence(&evidence_id).await?;
            println!("Deleted {}", evidence_id);
        }
    }

    Ok(())
}

/// Split a comma-separated option into trimmed, non-empty entries
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Store digital evidence paths absolute so verification works from any directory
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    Ok(cwd.join(path))
}

fn print_table(items: &[EvidenceItem]) {
    if items.is_empty() {
        println!("No evidence found.");
        return;
    }

    println!(
        "{:<36} {:<14} {:<12} {:<20} DESCRIPTION",
        "ID", "CASE", "TYPE", "STATUS"
    );
    for item in items {
        println!(
            "{:<36} {:<14} {:<12} {:<20} {}",
            item.id,
            item.case_id,
            item.evidence_type().to_string(),
            item.status.to_string(),
            item.description
        );
    }
}

fn print_item(item: &EvidenceItem) {
    println!("Evidence ID: {}", item.id);
    println!("Case:        {}", item.case_id);
    if let Some(number) = &item.evidence_number {
        println!("Number:      {}", number);
    }
    println!("Type:        {}", item.evidence_type());
    println!("Description: {}", item.description);
    println!("Status:      {}", item.status);
    println!("Location:    {}", item.current_storage_location);
    println!("Custodian:   {}", item.current_custodian);
    println!(
        "Collected:   {} by {}",
        item.collection_date.format("%Y-%m-%d %H:%M:%S"),
        item.collected_by
    );
    let site = item.collection_site.summary();
    if !site.is_empty() {
        println!("Site:        {}", site);
    }
    if !item.tags.is_empty() {
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        println!("Tags:        {}", tags.join(", "));
    }
    if item.is_confidential {
        println!("Confidential");
    }

    if let Some(artifact) = item.digital() {
        println!();
        println!("File:");
        println!("  Path:     {}", artifact.file_path.display());
        println!("  Size:     {} bytes", artifact.file_size);
        if let Some(device) = &artifact.device_source {
            println!("  Device:   {}", device);
        }
        println!("  SHA256:   {}", artifact.original_hash);
    }
}
