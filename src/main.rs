use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use keyhold::account::cache::AccountCache;
use keyhold::account::device::DeviceInfoProvider;
use keyhold::account::directory::AccountDirectory;
use keyhold::client::{ApiClient, HttpIdentityProvider, IdentityProvider, LoginEndpoint};
use keyhold::config::KeyholdConfig;
use keyhold::keystore::compat::KeyCompatibilityResolver;
use keyhold::keystore::current::CurrentKeyStore;
use keyhold::keystore::legacy::{LegacyKeyStore, SoftwareLegacyStore};
use keyhold::keystore::migration::MigrationCoordinator;
use keyhold::storage::Storage;

#[derive(Parser)]
#[command(name = "keyhold", about = "Key custody and account authentication service")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "keyhold.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known accounts and the active one
    Accounts,
    /// Run the legacy key migration sweep
    Migrate,
    /// Switch the active account via the remote login protocol
    Switch { username: String },
    /// Report what each key store holds for a prefix
    Diagnose { prefix: String },
}

struct Services {
    directory: AccountDirectory,
    coordinator: MigrationCoordinator,
    resolver: Arc<KeyCompatibilityResolver>,
}

fn build_services(config: &KeyholdConfig) -> Result<Services, Box<dyn std::error::Error>> {
    let storage = Arc::new(Storage::open(&config.node.db_path)?);
    let cache = Arc::new(AccountCache::new(storage.clone()));
    let current = Arc::new(CurrentKeyStore::new(storage.clone()));
    let legacy: Arc<dyn LegacyKeyStore> = Arc::new(SoftwareLegacyStore::new(storage.clone()));
    let resolver = Arc::new(KeyCompatibilityResolver::new(current.clone(), legacy.clone()));

    let coordinator = MigrationCoordinator::new(
        storage.clone(),
        current,
        legacy.clone(),
        cache.clone(),
    );

    let login: Arc<dyn LoginEndpoint> = Arc::new(ApiClient::new(&config.api.base_url));
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityProvider::new(&config.api.identity_url));
    let device = Arc::new(DeviceInfoProvider::new(storage.clone()));

    let directory = AccountDirectory::new(
        storage, cache, resolver.clone(), legacy, login, identity, device,
    );
    Ok(Services {
        directory,
        coordinator,
        resolver,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = KeyholdConfig::load_or_default(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.node.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let services = build_services(&config)?;

    // The sweep runs before any account operation on every launch; it
    // no-ops once the completion marker is set.
    services.coordinator.run_once();
    services.directory.load()?;

    match cli.command {
        Commands::Accounts => {
            let accounts = services.directory.list();
            if accounts.is_empty() {
                println!("no accounts cached; login or restore required");
            }
            for account in accounts {
                let marker = if account.is_active { "*" } else { " " };
                let address = account
                    .wallet
                    .as_ref()
                    .and_then(|w| w.primary_address())
                    .unwrap_or("-");
                println!("{} {} ({})", marker, account.username(), address);
            }
        }
        Commands::Migrate => {
            // run_once above may have been skipped by the marker; honour an
            // explicit request by sweeping again.
            services.coordinator.reset();
            services.coordinator.run_once();
            println!("migration sweep finished (completed: {})", services.coordinator.status());
        }
        Commands::Switch { username } => {
            info!("switching active account to '{username}'");
            if services.directory.switch(&username).await {
                println!("switched to {username}");
            } else {
                println!("resume/login failed");
                std::process::exit(1);
            }
        }
        Commands::Diagnose { prefix } => {
            print!("{}", services.resolver.diagnose(&prefix, &prefix));
        }
    }
    Ok(())
}
