use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use museum_gate_lib::domain::entities::ticketing::{CartItem, SaleRequest};
use museum_gate_lib::domain::value_objects::ticketing::{
    MuseumId, ScanCode, SessionId, TicketTypeId, UserId,
};
use museum_gate_lib::{init_logging, AppConfig, AppState, OfflineStore};
use serde_json::json;
use tracing::info;

#[derive(Parser)]
#[command(name = "museum-gate")]
#[command(about = "Offline-first ticket sale and gate validation terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Remote REST endpoint (PostgREST compatible)
    #[arg(long, global = true)]
    remote_url: Option<String>,

    /// Museum this terminal is bound to
    #[arg(long, global = true)]
    museum: Option<String>,

    /// Staff member operating the terminal
    #[arg(long, global = true)]
    seller: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connectivity, pending records and last sync time
    Status,
    /// Sell tickets (items as TYPE[:QTY[:SESSION]])
    Sell {
        #[arg(required = true)]
        items: Vec<String>,
        /// Try the remote first when it is reachable
        #[arg(long)]
        online: bool,
    },
    /// Validate a scanned code against the local cache
    Validate {
        code: String,
        /// Credits to consume (group tickets)
        #[arg(long, default_value_t = 1)]
        credits: u32,
    },
    /// Run one sync cycle now
    Sync,
    /// Delete synced records older than the given age
    Purge {
        #[arg(long, default_value_t = 24)]
        older_than_hours: u32,
    },
    /// Keep the terminal running with probe, pending poll and auto sync
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(url) = cli.remote_url {
        config.remote.base_url = Some(url);
    }
    if let Some(museum) = cli.museum {
        config.terminal.museum_id = Some(museum);
    }
    if let Some(seller) = cli.seller {
        config.terminal.seller_id = Some(seller);
    }
    if let Commands::Sell { online: true, .. } = &cli.command {
        config.terminal.offline_first = false;
    }

    let state = AppState::new(config)
        .await
        .context("failed to initialize terminal")?;

    let result = match cli.command {
        Commands::Status => status(&state).await,
        Commands::Sell { items, .. } => sell(&state, &items).await,
        Commands::Validate { code, credits } => validate(&state, &code, credits).await,
        Commands::Sync => sync(&state).await,
        Commands::Purge { older_than_hours } => purge(&state, older_than_hours).await,
        Commands::Run => run(&state).await,
    };

    state.shutdown().await;
    result
}

async fn status(state: &AppState) -> Result<()> {
    state.probe_once().await;
    let pending = state.store.pending_count().await?;
    let last_sync_at = state.sync_service.last_sync_at().await?;
    let museums = state.store.list_cached_museums().await?.len();
    let ticket_types = state.store.list_cached_ticket_types().await?.len();

    print_json(&json!({
        "online": state.connectivity.is_online(),
        "pending": {
            "tickets": pending.tickets,
            "usage": pending.usage,
        },
        "last_sync_at": last_sync_at,
        "cached": {
            "museums": museums,
            "ticket_types": ticket_types,
        },
    }))
}

async fn sell(state: &AppState, items: &[String]) -> Result<()> {
    if !state.config.terminal.offline_first {
        state.probe_once().await;
    }

    let seller = state
        .config
        .terminal
        .seller_id
        .as_deref()
        .ok_or_else(|| anyhow!("--seller or MUSEUM_GATE_SELLER_ID is required to sell"))?;
    let request = SaleRequest {
        items: items
            .iter()
            .map(|raw| parse_cart_item(raw))
            .collect::<Result<Vec<_>>>()?,
        museum_id: terminal_museum(state)?,
        seller_id: UserId::parse(seller).map_err(|err| anyhow!(err))?,
    };

    let tickets = state.sale_service.sell(&request).await?;
    for ticket in &tickets {
        info!(
            ticket_id = %ticket.id,
            scan_code = %ticket.scan_code,
            offline = ticket.offline,
            "ticket issued"
        );
    }
    print_json(&serde_json::to_value(&tickets)?)
}

async fn validate(state: &AppState, code: &str, credits: u32) -> Result<()> {
    let museum = terminal_museum(state)?
        .ok_or_else(|| anyhow!("--museum or MUSEUM_GATE_MUSEUM_ID is required to validate"))?;
    let code = ScanCode::parse(code).map_err(|err| anyhow!(err))?;

    let outcome = state
        .validation_service
        .validate_offline_with_credits(&code, &museum, credits)
        .await?;
    print_json(&serde_json::to_value(&outcome)?)
}

async fn sync(state: &AppState) -> Result<()> {
    if !state.probe_once().await {
        info!("remote unreachable, nothing to sync");
    }
    let report = state.sync_service.run_sync_cycle().await?;
    print_json(&serde_json::to_value(&report)?)
}

async fn purge(state: &AppState, older_than_hours: u32) -> Result<()> {
    let before = chrono::Utc::now() - chrono::Duration::hours(i64::from(older_than_hours));
    let removed = state.store.purge_synced(before).await?;
    print_json(&json!({ "removed": removed }))
}

async fn run(state: &AppState) -> Result<()> {
    state.probe_once().await;
    let tasks = state.start_background();
    info!(
        online = state.connectivity.is_online(),
        "museum gate terminal running. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down terminal...");
    tasks.stop().await;
    Ok(())
}

fn terminal_museum(state: &AppState) -> Result<Option<MuseumId>> {
    state
        .config
        .terminal
        .museum_id
        .as_deref()
        .map(MuseumId::parse)
        .transpose()
        .map_err(|err| anyhow!(err))
}

/// `TYPE[:QTY[:SESSION]]` を解釈する。
fn parse_cart_item(raw: &str) -> Result<CartItem> {
    let mut parts = raw.split(':');
    let ticket_type = parts.next().unwrap_or_default();
    let ticket_type_id = TicketTypeId::parse(ticket_type).map_err(|err| anyhow!(err))?;
    let quantity = match parts.next() {
        Some(qty) => qty
            .parse::<u32>()
            .with_context(|| format!("invalid quantity in `{raw}`"))?,
        None => 1,
    };

    let item = CartItem::new(ticket_type_id, quantity);
    match parts.next() {
        Some(session) => Ok(item.with_session(
            SessionId::parse(session).map_err(|err| anyhow!(err))?,
        )),
        None => Ok(item),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
