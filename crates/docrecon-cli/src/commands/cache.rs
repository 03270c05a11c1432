//! Cache command - inspect or refresh the contact cache.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;

use docrecon_core::{CachedContact, ContactCache};

use super::{default_cache_file, load_config};

/// Arguments for the cache command.
#[derive(Args)]
pub struct CacheArgs {
    /// Contact cache file
    #[arg(long)]
    cache_file: Option<PathBuf>,

    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show cache statistics
    Stats,

    /// Import contacts from a platform export (JSON array of contacts)
    Import {
        /// Export file to import
        file: PathBuf,
    },

    /// Look up a contact by tax id
    Lookup {
        /// Tax id, with or without country prefix
        tax_id: String,
    },
}

pub async fn run(args: CacheArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let path = args
        .cache_file
        .clone()
        .unwrap_or_else(|| {
            if config.cache.cache_file == docrecon_core::ReconConfig::default().cache.cache_file {
                default_cache_file()
            } else {
                config.cache.cache_file.clone()
            }
        });

    match args.command {
        CacheCommand::Stats => {
            let cache = ContactCache::load(&path);
            let stats = cache.stats();
            println!("{}", style("Contact cache").bold());
            println!("  file:         {}", path.display());
            println!("  contacts:     {}", stats.total_contacts);
            println!("  with tax id:  {}", stats.contacts_with_tax_id);
            println!("  customers:    {}", stats.customers);
            println!("  vendors:      {}", stats.vendors);
        }
        CacheCommand::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let contacts: Vec<CachedContact> = serde_json::from_str(&content)?;
            let count = contacts.len();

            let mut cache = ContactCache::load(&path);
            cache.upsert_all(contacts);
            cache.save()?;

            println!(
                "{} {} contacts imported, cache now holds {}",
                style("Imported:").bold(),
                count,
                cache.len()
            );
        }
        CacheCommand::Lookup { tax_id } => {
            let cache = ContactCache::load(&path);
            match cache.search_by_tax_id(&tax_id) {
                Some(contact) => {
                    println!("{}", style(&contact.company_name).bold());
                    println!("  contact id:  {}", contact.contact_id);
                    println!(
                        "  tax id:      {}",
                        contact.tax_id.as_deref().unwrap_or("-")
                    );
                    println!("  email:       {}", contact.email);
                }
                None => println!("No contact found for {}", tax_id),
            }
        }
    }

    Ok(())
}
