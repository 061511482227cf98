use clap::{Parser, Subcommand};
use std::error::Error;

use partner_gateway::config::StoreConfig;
use partner_gateway::store::{NewPartner, PartnerStore, SqliteStore, StoreError};

#[derive(Parser)]
#[command(name = "gateway-admin")]
#[command(about = "Provisioning CLI for the partner gateway store", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "sqlite://gateway.db")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the partner, permission and usage tables
    Init,
    /// Register a partner
    AddPartner {
        #[arg(long)]
        name: String,
        #[arg(long)]
        api_key: String,
        /// Requests allowed per rolling minute
        #[arg(long, default_value_t = 60)]
        rate_limit: u32,
        #[arg(long)]
        inactive: bool,
    },
    /// Grant a resource prefix to a partner
    Grant {
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        resource: String,
    },
    /// Show recent usage for a partner
    Usage {
        #[arg(long)]
        api_key: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Provision the demo partners
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let store = SqliteStore::connect(&StoreConfig {
        database_url: cli.database_url.clone(),
        ..StoreConfig::default()
    })
    .await?;

    match cli.command {
        Commands::Init => {
            store.init_schema().await?;
            println!("Schema ready at {}", cli.database_url);
        }
        Commands::AddPartner {
            name,
            api_key,
            rate_limit,
            inactive,
        } => {
            let mut partner = NewPartner::new(name, api_key, rate_limit);
            if inactive {
                partner = partner.inactive();
            }
            let partner = store.insert_partner(partner).await?;
            println!("{}", serde_json::to_string_pretty(&partner)?);
        }
        Commands::Grant { api_key, resource } => {
            grant(&store, &api_key, &resource).await?;
            println!("Granted {resource} to {api_key}");
        }
        Commands::Usage { api_key, limit } => {
            let usage = store.recent_usage(&api_key, limit).await?;
            println!("{}", serde_json::to_string_pretty(&usage)?);
        }
        Commands::Seed => {
            store.init_schema().await?;
            let demo = [
                ("Partner A", "key_a", 10, "/posts"),
                ("Partner B", "key_b", 5, "/users"),
                ("Unlimited Power", "god_mode", 1000, "/"),
            ];
            for (name, api_key, rate_limit, resource) in demo {
                match store.insert_partner(NewPartner::new(name, api_key, rate_limit)).await {
                    Ok(partner) => println!("Added partner: {}", partner.name),
                    Err(StoreError::Conflict(_)) => {
                        println!("Partner with key {api_key} already exists.")
                    }
                    Err(e) => return Err(e.into()),
                }
                grant(&store, api_key, resource).await?;
            }
        }
    }

    Ok(())
}

async fn grant(store: &SqliteStore, api_key: &str, resource: &str) -> Result<(), Box<dyn Error>> {
    if resource.is_empty() {
        return Err("resource prefix must not be empty".into());
    }
    let partner = store
        .lookup(api_key)
        .await?
        .ok_or_else(|| format!("no partner with key {api_key}"))?;
    store.grant_permission(partner.id, resource).await?;
    Ok(())
}
