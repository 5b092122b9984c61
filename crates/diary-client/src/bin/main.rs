//! Encrypted diary CLI
//!
//! Write, list and decrypt diary entries against a node, and manage the local
//! preference store.

use std::path::PathBuf;

use alloy_signer_local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use diary_client::connectivity::{self, ConnectionStatus, ConnectivityMonitor, WalletEvent};
use diary_client::store::{PreferencesPatch, Theme};
use diary_client::{
    rpc, ClientConfig, ContractLedger, DiaryClient, DiaryError, DurableStorage, HttpRpc,
    PreferenceStore, ScanWindow, SessionManager,
};
use diary_core::lifecycle::remaining;
use diary_core::{EntryId, NetworkKind, UnlockPolicy};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diary", about = "Encrypted on-chain diary")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    rpc_url: Option<String>,

    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Hex private key of the diary author
    #[arg(long, global = true, env = "DIARY_PRIVATE_KEY", hide_env_values = true)]
    key: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encrypt and submit a new entry
    Write {
        text: String,
        /// Unix timestamp after which the entry can be decrypted
        #[arg(long, conflicts_with = "never", value_parser = clap::value_parser!(u64).range(1..))]
        unlock_at: Option<u64>,
        /// Never unlock (the default)
        #[arg(long)]
        never: bool,
        #[arg(long)]
        public: bool,
    },
    /// List your entries, newest first
    List,
    /// Decrypt one entry
    Decrypt { id: EntryId },
    /// Dashboard statistics
    Stats {
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, default_value_t = diary_core::constants::STATS_SCAN_LIMIT)]
        limit: u64,
    },
    /// Show or update preferences
    Prefs {
        #[arg(long, value_parser = parse_theme)]
        theme: Option<Theme>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        notifications: Option<bool>,
    },
    /// Save a draft
    Draft { text: String },
    /// Toggle an entry as favorite
    Favorite { id: EntryId },
    /// Clear cached entries, draft, search history and favorites
    Reset,
    /// Follow wallet connectivity until interrupted
    Watch,
}

fn parse_theme(s: &str) -> std::result::Result<Theme, String> {
    match s.to_ascii_lowercase().as_str() {
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        other => Err(format!("unknown theme '{other}' (light|dark)")),
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.rpc_url {
        config.rpc_url = url.clone();
    }
    if let Some(id) = cli.chain_id {
        config.chain_id = id;
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

type Client = DiaryClient<HttpRpc, ContractLedger<HttpRpc>>;

async fn connect(config: &ClientConfig, key: Option<&str>, store: PreferenceStore) -> Result<Client> {
    let key = key.context("a private key is required (--key or DIARY_PRIVATE_KEY)")?;
    let signer: PrivateKeySigner = key.trim().parse().context("invalid private key")?;

    if NetworkKind::of(config.chain_id).is_none() {
        return Err(DiaryError::UnsupportedNetwork(config.chain_id).into());
    }

    let rpc = HttpRpc::new(&config.rpc_url);
    let monitor = ConnectivityMonitor::new();
    let state = connectivity::reconnect(&monitor, &rpc).await;
    if state.status == ConnectionStatus::Disconnected {
        return Err(DiaryError::TransportUnavailable(config.rpc_url.clone()).into());
    }

    // The contract address is resolved per chain, so a mismatch cannot be
    // patched up after the ledger is built
    let actual = rpc::chain_id(&rpc).await?;
    if actual != config.chain_id {
        bail!(
            "node at {} is on chain {actual} but the configured chain is {} (use --chain-id {actual})",
            config.rpc_url,
            config.chain_id
        );
    }

    let ledger = ContractLedger::new(rpc.clone(), config.contract_address()?)
        .with_caller(signer.address());
    let sessions = SessionManager::new(rpc.clone(), config.relayers());
    let client = DiaryClient::new(sessions, ledger, signer, store, config.chain_id).with_retry(
        diary_client::RetryPolicy {
            attempts: config.list_retry_attempts.max(1),
            ..Default::default()
        },
    );

    tracing::info!(
        address = %client.address(),
        network_id = client.network_id(),
        "Connected"
    );
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("diary=info,diary_client=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let mut store = PreferenceStore::open(DurableStorage::new(&config.data_dir));

    match cli.command {
        Command::Write {
            text,
            unlock_at,
            never,
            public,
        } => {
            let policy = match (never, unlock_at) {
                (false, Some(ts)) => UnlockPolicy::at(ts)?,
                _ => UnlockPolicy::Never,
            };
            let client = connect(&config, cli.key.as_deref(), store).await?;
            let receipt = client.write_entry(&text, policy, public).await?;
            println!("tx {} (block {})", receipt.tx_hash, receipt.block_number);
        }
        Command::List => {
            let client = connect(&config, cli.key.as_deref(), store).await?;
            let now = diary_client::unix_now();
            let me = client.address();
            for entry in client.list_entries().await? {
                let favorite = if client.store().is_favorite(entry.id) { "*" } else { " " };
                let content = match &entry.plaintext {
                    Some(content) => content.to_string(),
                    _ if entry.metadata.may_attempt_decrypt(&me, now) => "<encrypted, ready>".into(),
                    _ => "<encrypted>".into(),
                };
                let state = match remaining(entry.metadata.unlock_timestamp, now) {
                    Some(secs) => format!("locked ({}h left)", secs.div_ceil(3600)),
                    None => entry.unlock_state(now).to_string(),
                };
                println!(
                    "{favorite}#{:<4} {:<18} {:<8} {}",
                    entry.id,
                    state,
                    if entry.metadata.is_public { "public" } else { "private" },
                    content
                );
            }
        }
        Command::Decrypt { id } => {
            let client = connect(&config, cli.key.as_deref(), store).await?;
            match client.decrypt_entry(id).await {
                Ok(content) => println!("{content}"),
                Err(e) => bail!("[{}] {e}", e.code()),
            }
        }
        Command::Stats { start, limit } => {
            let client = connect(&config, cli.key.as_deref(), store).await?;
            let stats = client.stats_window(ScanWindow { start, limit }).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Prefs {
            theme,
            language,
            notifications,
        } => {
            if theme.is_some() || language.is_some() || notifications.is_some() {
                store.update_preferences(PreferencesPatch {
                    theme,
                    language,
                    notifications_enabled: notifications,
                })?;
            }
            println!("{}", serde_json::to_string_pretty(store.preferences())?);
        }
        Command::Draft { text } => {
            store.save_draft(&text)?;
            println!("Draft saved ({} chars)", text.chars().count());
        }
        Command::Favorite { id } => {
            let now_favorite = store.toggle_favorite(id)?;
            println!(
                "Entry #{id} {}",
                if now_favorite { "added to favorites" } else { "removed from favorites" }
            );
        }
        Command::Reset => {
            store.reset()?;
            println!("Local diary state reset (preferences kept)");
        }
        Command::Watch => {
            let rpc = HttpRpc::new(&config.rpc_url);
            let monitor = ConnectivityMonitor::new();
            let state = connectivity::reconnect(&monitor, &rpc).await;
            if state.status == ConnectionStatus::Reconnecting
                && !rpc::accounts(&rpc).await.unwrap_or_default().is_empty()
            {
                monitor.handle(WalletEvent::WalletConnected);
            }
            println!("{}", serde_json::to_string(&monitor.state())?);

            let mut updates = monitor.subscribe();
            let _probe =
                connectivity::spawn_liveness_probe(monitor.clone(), rpc, config.probe_interval());
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *updates.borrow_and_update();
                        println!("{}", serde_json::to_string(&state)?);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}
