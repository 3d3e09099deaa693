use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rafflebox::auth::{TokenHasher, issue_admin_token};
use rafflebox::config::Config;
use rafflebox::server::{AppState, create_router};
use rafflebox::store::{SqliteStore, Store};

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "rafflebox")]
#[command(about = "A ticket sales server for numbered raffles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that opens the database.
#[derive(Args)]
struct CommonArgs {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Data directory for the database and admin token (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl CommonArgs {
    fn load(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(data_dir) = &self.data_dir {
            config.server.data_dir = data_dir.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        #[command(flatten)]
        common: CommonArgs,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Public base URL used in recovery links (e.g., "https://tickets.example.com")
        #[arg(long)]
        public_base_url: Option<String>,

        /// Mount development payment routes and the unsigned fake provider
        #[arg(long)]
        dev: bool,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin token)
    Init {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Re-run ticket assignment for every order stuck in paid
    RetryAssignments {
        #[command(flatten)]
        common: CommonArgs,
    },
}

fn open_initialized_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let token_file = config.server.admin_token_path();
    if !token_file.exists() {
        bail!(
            "Server not initialized. Run 'rafflebox admin init' first to create the database and admin token."
        );
    }

    let store = SqliteStore::new(config.server.db_path())?;
    store.initialize()?;
    if !store.has_admin_token()? {
        bail!(
            "Server not initialized. Run 'rafflebox admin init' first to create the database and admin token."
        );
    }
    Ok(store)
}

fn run_init(config: &Config) -> anyhow::Result<()> {
    let data_path = &config.server.data_dir;
    fs::create_dir_all(data_path)?;

    let store = SqliteStore::new(config.server.db_path())?;
    store.initialize()?;

    let token_file = config.server.admin_token_path();

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let raw_token = issue_admin_token(&store, &TokenHasher::new())?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

fn run_retry_assignments(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(open_initialized_store(&config)?);
    let state = AppState::new(store, config);

    let report = state.orders.assignments().retry_stalled()?;

    println!(
        "Assigned {} order(s), {} failed",
        report.assigned.len(),
        report.failed.len()
    );
    for (order_id, error) in &report.failed {
        println!("  {order_id}: {error}");
    }

    if !report.failed.is_empty() {
        bail!("{} order(s) still awaiting assignment", report.failed.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rafflebox=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { common } => {
                run_init(&common.load()?)?;
            }
            AdminCommands::RetryAssignments { common } => {
                run_retry_assignments(common.load()?)?;
            }
        },
        Commands::Serve {
            common,
            host,
            port,
            public_base_url,
            dev,
        } => {
            let mut config = common.load()?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if public_base_url.is_some() {
                config.server.public_base_url = public_base_url;
            }
            config.server.dev_mode |= dev;
            config.validate()?;

            let store = open_initialized_store(&config)?;
            info!(
                "Admin token available at {}",
                config.server.admin_token_path().display()
            );

            let addr = config.server.socket_addr()?;
            let state = Arc::new(AppState::new(Arc::new(store), config));
            let app = create_router(state);

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
