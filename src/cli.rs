use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

use crate::crm::fetch::{MAX_BATCH_SIZE, MAX_PAGE_SIZE};
use crate::sync::DEFAULT_PROJECT_MODULE;
use crate::types::*;

#[derive(Parser, Debug)]
#[command(
    name = "crm-sync",
    version,
    about = "Pull Zoho CRM and Books records into a local database"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the database and lock files
    #[arg(long, global = true, env = "CRM_SYNC_DATA_DIR", default_value = "~/.crm-sync")]
    pub data_dir: String,

    /// Credential configuration to use
    #[arg(short = 'c', long, global = true, default_value = "default")]
    pub config_name: String,

    /// Zoho data center
    #[arg(long, global = true, value_enum, default_value = "com")]
    pub domain: Domain,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or update the OAuth client registration
    Configure(ConfigureArgs),
    /// Print the consent URL, optionally waiting for the redirect
    Authorize(AuthorizeArgs),
    /// Exchange a grant token copied from the redirect URL
    Exchange(ExchangeArgs),
    /// Force an access token refresh
    Refresh,
    /// Pull records from the remote modules
    Sync(SyncArgs),
    /// Show the token state and local record counts
    Status,
    /// List recent sync runs
    Logs(LogsArgs),
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// OAuth client id
    #[arg(long, env = "CRM_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret (if not provided, will prompt).
    /// Prefer the CRM_CLIENT_SECRET environment variable over the flag.
    #[arg(long, env = "CRM_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the client
    #[arg(
        long,
        env = "CRM_REDIRECT_URI",
        default_value = "http://localhost:8910/oauth/callback"
    )]
    pub redirect_uri: String,
}

#[derive(Args, Debug)]
pub struct AuthorizeArgs {
    /// Serve the redirect on this address and exchange the code automatically
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Scopes to request (comma separated)
    #[arg(long = "scope", value_delimiter = ',')]
    pub scopes: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExchangeArgs {
    /// Grant token (`code` query parameter of the redirect)
    #[arg(long)]
    pub code: String,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Modules to sync
    #[arg(value_enum)]
    pub modules: Vec<SyncModule>,

    /// Sync every module (the default when none is named)
    #[arg(long)]
    pub all: bool,

    /// Field names per request
    #[arg(long, default_value_t = MAX_BATCH_SIZE)]
    pub batch_size: usize,

    /// Records per page
    #[arg(long, default_value_t = MAX_PAGE_SIZE)]
    pub page_size: u32,

    /// API name of the custom module holding projects
    #[arg(long, default_value = DEFAULT_PROJECT_MODULE)]
    pub project_module: String,

    /// Run continuously, waiting N seconds between runs
    #[arg(long)]
    pub watch_with_interval: Option<u64>,
}

impl SyncArgs {
    /// Requested modules in dependency order, each once.
    pub fn selected_modules(&self) -> Vec<SyncModule> {
        if self.all || self.modules.is_empty() {
            return SyncModule::ALL.to_vec();
        }
        SyncModule::ALL
            .into_iter()
            .filter(|m| self.modules.contains(m))
            .collect()
    }
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of entries to show
    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    /// Only show failed runs
    #[arg(long)]
    pub failed: bool,
}
