use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use url::Url;

use crate::config::{
    resolve_store_path, DEFAULT_BIND_ADDR, DEFAULT_LOG_LEVEL, DEFAULT_SERVER_URL,
    DEFAULT_STALE_SECS,
};
use crate::dashboard::{render_table, Dashboard};
use crate::error::{BackendError, Result};
use crate::models::{ProviderInput, ProviderRecord};
use crate::provider_store::ProviderStore;
use crate::quota::{QuotaClient, QuotaStrategy};
use crate::server;
use crate::transfer::{export_providers, parse_import};
use crate::utils::today_stamp;

#[derive(Debug, Parser)]
#[command(
    name = "quotaboard",
    version,
    about = "Track remaining quota across API providers"
)]
pub struct Cli {
    /// Provider store file (defaults to the platform data directory)
    #[arg(long, global = true, env = "QUOTABOARD_STORE")]
    pub store: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, global = true, env = "QUOTABOARD_LOG", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the quota aggregation and forwarding proxy server
    Serve {
        #[arg(long, env = "QUOTABOARD_BIND", default_value = DEFAULT_BIND_ADDR)]
        bind: String,
    },
    /// Show each provider's remaining balance
    Dashboard(DashboardArgs),
    /// Manage configured providers
    #[command(subcommand)]
    Providers(ProvidersCommand),
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    /// Base URL of a running `quotaboard serve`
    #[arg(long, env = "QUOTABOARD_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: Url,

    #[arg(long, env = "QUOTABOARD_QUOTA_STRATEGY", value_enum, default_value_t = QuotaStrategy::Aggregator)]
    pub strategy: QuotaStrategy,

    /// Seconds a fetched quota stays fresh
    #[arg(long, env = "QUOTABOARD_STALE_SECS", default_value_t = DEFAULT_STALE_SECS)]
    pub stale_secs: u64,

    /// Re-render every N seconds instead of exiting
    #[arg(long)]
    pub watch: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum ProvidersCommand {
    /// List providers in display order
    List,
    /// Add a provider
    Add(ProviderArgs),
    /// Replace every field of an existing provider
    Update {
        id: String,
        #[command(flatten)]
        fields: ProviderArgs,
    },
    /// Remove a provider
    Delete { id: String },
    /// Append providers from an exported JSON array
    Import { file: PathBuf },
    /// Write all providers as a JSON array
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct ProviderArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub url: String,
    #[arg(long)]
    pub api_key: String,
    #[arg(long, default_value = "")]
    pub user_id: String,
    /// Currency code, USD when omitted
    #[arg(long)]
    pub unit: Option<String>,
}

impl From<ProviderArgs> for ProviderInput {
    fn from(args: ProviderArgs) -> Self {
        ProviderInput {
            name: args.name.trim().to_string(),
            url: args.url.trim().to_string(),
            api_key: args.api_key.trim().to_string(),
            user_id: args.user_id.trim().to_string(),
            unit: args.unit,
        }
    }
}

pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { bind } => serve(&bind),
        Command::Dashboard(args) => {
            let store_path = resolve_store_path(cli.store)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run_dashboard(&store_path, args))
        }
        Command::Providers(command) => {
            let store_path = resolve_store_path(cli.store)?;
            let store = ProviderStore::load(&store_path)?;
            run_providers(&store, command)
        }
    }
}

fn serve(bind: &str) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let (listener, port) = server::bind(bind)?;
    log::info!("quotaboard listening on port {port}");
    server::serve(listener, runtime.handle().clone());
    Ok(())
}

async fn run_dashboard(store_path: &Path, args: DashboardArgs) -> Result<()> {
    let client = QuotaClient::new(args.server_url, args.strategy);
    log::debug!("fetching quotas with the {:?} strategy", client.strategy());
    let mut dashboard = Dashboard::new(client, args.stale_secs.saturating_mul(1000));

    loop {
        // Reloaded every pass so edits from other invocations show up in watch mode.
        let providers = ProviderStore::load(store_path)?.list()?;
        let rows = dashboard.refresh(&providers).await;
        println!("{}", render_table(&rows));

        match args.watch {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs.max(1))).await,
            None => return Ok(()),
        }
    }
}

fn run_providers(store: &ProviderStore, command: ProvidersCommand) -> Result<()> {
    match command {
        ProvidersCommand::List => {
            println!("{}", render_provider_table(&store.list()?));
        }
        ProvidersCommand::Add(args) => {
            let input = ProviderInput::from(args);
            input.validate_form()?;
            let provider = store.add(input)?;
            log::info!("added provider {} ({})", provider.name, provider.id);
            println!("{}", provider.id);
        }
        ProvidersCommand::Update { id, fields } => {
            let input = ProviderInput::from(fields);
            input.validate_form()?;
            let provider = store
                .update(&id, input)?
                .ok_or_else(|| BackendError::ProviderNotFound(id.clone()))?;
            log::info!("updated provider {} ({})", provider.name, provider.id);
        }
        ProvidersCommand::Delete { id } => {
            let provider = store
                .delete(&id)?
                .ok_or_else(|| BackendError::ProviderNotFound(id.clone()))?;
            log::info!("deleted provider {} ({})", provider.name, provider.id);
        }
        ProvidersCommand::Import { file } => {
            let contents = fs::read_to_string(&file)?;
            let inputs = parse_import(&contents)?;
            let added = store.import(inputs)?;
            println!("imported {} providers from {}", added.len(), file.display());
        }
        ProvidersCommand::Export { output } => {
            let path = output.unwrap_or_else(default_export_path);
            let exported = export_providers(&store.list()?)?;
            fs::write(&path, exported)?;
            println!("exported providers to {}", path.display());
        }
    }
    Ok(())
}

fn default_export_path() -> PathBuf {
    PathBuf::from(format!("quotaboard-providers-{}.json", today_stamp()))
}

fn render_provider_table(providers: &[ProviderRecord]) -> String {
    if providers.is_empty() {
        return "No API providers configured.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Name", "URL", "API Key", "User ID", "Unit"]);
    for provider in providers {
        table.add_row(vec![
            provider.id.clone(),
            provider.name.clone(),
            provider.url.clone(),
            mask_secret(&provider.api_key),
            provider.user_id.clone(),
            provider.unit.clone(),
        ]);
    }
    table.to_string()
}

fn mask_secret(secret: &str) -> String {
    let chars = secret.chars().collect::<Vec<_>>();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head = chars[..3].iter().collect::<String>();
    let tail = chars[chars.len() - 4..].iter().collect::<String>();
    format!("{head}...{tail}")
}
