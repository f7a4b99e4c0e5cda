//! crm-sync: pull Zoho CRM and Books records into a local SQLite database.
//!
//! OAuth2 authorization-code grant with expiry-gated refresh, field-batched
//! and paginated module downloads, id-keyed merging, and natural-key upserts
//! that never delete and never touch local-only columns. Every sync run
//! leaves one entry in an append-only operation log.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod crm;
mod lock;
mod shutdown;
mod store;
mod sync;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use auth::credentials::{Credentials, SharedCredentials};
use auth::endpoints::Endpoints;
use auth::error::AuthError;
use auth::TokenManager;
use cli::Command;
use config::Config;
use crm::session::ApiSession;
use crm::{CrmClient, FetchOptions};
use lock::ConfigLock;
use store::{CredentialStore, EntityKind, EntityStore, OperationLog, SqliteRecordStore};
use sync::log::OperationLogger;
use sync::SyncContext;

/// Handles shared by every subcommand.
struct App {
    config: Config,
    store: Arc<SqliteRecordStore>,
    session: Arc<dyn ApiSession>,
    endpoints: Endpoints,
}

impl App {
    async fn open(config: Config) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create data directory: {}",
                    config.data_dir.display()
                )
            })?;
        let store = Arc::new(SqliteRecordStore::open(&config.db_path()).await?);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let endpoints = Endpoints::for_domain(config.domain);
        Ok(Self {
            config,
            store,
            session: Arc::new(http),
            endpoints,
        })
    }

    fn token_manager(&self) -> TokenManager {
        TokenManager::new(
            self.session.clone(),
            self.endpoints.clone(),
            self.store.clone(),
        )
    }

    async fn load_credentials(&self) -> anyhow::Result<Credentials> {
        let name = &self.config.config_name;
        let credentials = self
            .store
            .load_credentials(name)
            .await?
            .ok_or_else(|| AuthError::NotConfigured(name.clone()))?;
        Ok(credentials)
    }

    async fn lock(&self) -> anyhow::Result<ConfigLock> {
        ConfigLock::acquire(&self.config.data_dir, &self.config.config_name).await
    }
}

async fn run_configure(app: &App, args: cli::ConfigureArgs) -> anyhow::Result<()> {
    let _lock = app.lock().await?;
    let client_secret = match args.client_secret {
        Some(secret) => secret,
        None => tokio::task::block_in_place(|| rpassword::prompt_password("Client secret: "))
            .context("Failed to read client secret")?,
    };
    if client_secret.trim().is_empty() {
        anyhow::bail!("Client secret must not be empty");
    }

    let name = &app.config.config_name;
    let credentials = match app.store.load_credentials(name).await? {
        Some(mut existing) => {
            existing.reconfigure(&args.client_id, &client_secret, &args.redirect_uri);
            existing
        }
        None => Credentials::new(name, &args.client_id, &client_secret, &args.redirect_uri),
    };
    app.store.save_credentials(&credentials).await?;

    println!("Saved configuration '{}'", name);
    println!("Next: crm-sync authorize --config-name {}", name);
    Ok(())
}

async fn run_authorize(app: &App, args: cli::AuthorizeArgs) -> anyhow::Result<()> {
    let _lock = app.lock().await?;
    let credentials = app.load_credentials().await?;
    let tokens = app.token_manager().with_scopes(args.scopes);
    let url = tokens.build_authorization_url(&credentials)?;

    println!("Open this URL in a browser to grant access:");
    println!();
    println!("  {}", url);
    println!();

    match args.listen {
        Some(addr) => {
            let shared: SharedCredentials = Arc::new(tokio::sync::Mutex::new(credentials));
            auth::callback::serve_once(addr, Arc::new(tokens), shared).await?;
            println!("Authorization complete.");
        }
        None => {
            println!("Then run: crm-sync exchange --code <code from the redirect URL>");
        }
    }
    Ok(())
}

async fn run_exchange(app: &App, args: cli::ExchangeArgs) -> anyhow::Result<()> {
    let _lock = app.lock().await?;
    let mut credentials = app.load_credentials().await?;
    app.token_manager()
        .exchange_grant_token(&mut credentials, &args.code)
        .await?;
    println!("Authorization complete.");
    Ok(())
}

async fn run_refresh(app: &App) -> anyhow::Result<()> {
    let _lock = app.lock().await?;
    let mut credentials = app.load_credentials().await?;
    app.token_manager()
        .refresh_access_token(&mut credentials)
        .await?;
    if let Some(expiry) = credentials.token_expiry {
        println!(
            "Access token refreshed, valid until {}",
            expiry.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

async fn run_sync(app: &App, args: cli::SyncArgs) -> anyhow::Result<()> {
    let _lock = app.lock().await?;
    let options = FetchOptions {
        page_size: args.page_size,
        batch_size: args.batch_size,
    };
    options.validate()?;

    let credentials: SharedCredentials =
        Arc::new(tokio::sync::Mutex::new(app.load_credentials().await?));
    let tokens = Arc::new(app.token_manager());
    let ctx = SyncContext {
        client: CrmClient::new(
            app.session.clone(),
            app.endpoints.clone(),
            tokens,
            credentials,
        ),
        entities: app.store.clone(),
        logger: OperationLogger::new(app.store.clone(), app.config.config_name.clone()),
        options,
        project_module: args.project_module.clone(),
    };
    let modules = args.selected_modules();

    let Some(interval) = args.watch_with_interval else {
        let failed = ctx.run_modules(&modules).await;
        if failed > 0 {
            anyhow::bail!("{} of {} module syncs failed", failed, modules.len());
        }
        return Ok(());
    };

    let shutdown_token = shutdown::install_signal_handler()?;
    loop {
        let failed = ctx.run_modules(&modules).await;
        if failed > 0 {
            tracing::warn!("{} of {} module syncs failed", failed, modules.len());
        }
        if shutdown_token.is_cancelled() {
            break;
        }
        tracing::info!("Waiting {} seconds until the next sync...", interval);
        if !shutdown::sleep_or_cancel(&shutdown_token, interval).await {
            break;
        }
    }
    tracing::info!("Shutdown requested, exiting...");
    Ok(())
}

async fn run_status(app: &App) -> anyhow::Result<()> {
    let name = &app.config.config_name;
    println!("Database:      {}", app.store.path().display());
    println!("Configuration: {}", name);

    match app.store.load_credentials(name).await? {
        Some(credentials) => {
            println!("Client id:     {}", credentials.client_id);
            println!(
                "Token state:   {}",
                credentials.token_state(Utc::now()).as_str()
            );
            if let Some(expiry) = credentials.token_expiry {
                println!(
                    "Token expiry:  {}",
                    expiry.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        None => println!("Token state:   not configured"),
    }

    println!();
    println!("Local records:");
    for kind in [
        EntityKind::Company,
        EntityKind::Contact,
        EntityKind::Product,
        EntityKind::Project,
    ] {
        let count = app.store.count_entities(kind).await?;
        println!("  {:<10} {}", kind.table(), count);
    }

    if let Some(last) = app.store.recent_logs(name, 1, false).await?.first() {
        println!();
        println!(
            "Last sync:     {} {} ({}) at {}",
            last.table_name,
            last.status.as_str(),
            last.record_count,
            last.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

async fn run_logs(app: &App, args: cli::LogsArgs) -> anyhow::Result<()> {
    let entries = app
        .store
        .recent_logs(&app.config.config_name, args.limit, args.failed)
        .await?;
    if entries.is_empty() {
        println!("No sync runs recorded.");
        return Ok(());
    }

    for entry in entries {
        let elapsed = entry.timestamp - entry.initiated_at;
        println!(
            "{}  {:<10} {:<8} {:>6} records  {:>4}s  {}",
            entry.initiated_at.format("%Y-%m-%d %H:%M:%S"),
            entry.table_name,
            entry.status.as_str(),
            entry.record_count,
            elapsed.num_seconds(),
            entry.error_message
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = match cli.global.log_level {
        types::LogLevel::Debug => "debug",
        types::LogLevel::Info => "info",
        types::LogLevel::Warn => "warn",
        types::LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = Config::from_cli(&cli.global)?;
    tracing::debug!(?config, "Starting crm-sync");
    let app = App::open(config).await?;

    match cli.command {
        Command::Configure(args) => run_configure(&app, args).await,
        Command::Authorize(args) => run_authorize(&app, args).await,
        Command::Exchange(args) => run_exchange(&app, args).await,
        Command::Refresh => run_refresh(&app).await,
        Command::Sync(args) => run_sync(&app, args).await,
        Command::Status => run_status(&app).await,
        Command::Logs(args) => run_logs(&app, args).await,
    }
}
