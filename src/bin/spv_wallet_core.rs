//! SPV wallet core command line
//!
//! ## Usage
//! ```bash
//! # Create the database schema
//! spv-wallet-core --config wallet.json init-db
//!
//! # Register a user with a paymail
//! spv-wallet-core create-user --pubkey 02ab... --paymail alice@example.com
//!
//! # Feed a broadcaster callback body to the sync service
//! spv-wallet-core handle-callback --file callback.json
//!
//! # Print the ancestry of a BEEF transaction
//! spv-wallet-core beef-inspect --hex 0100beef...
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use spv_wallet_core::{
    bsv::{beef::Beef, spv::SpvTransaction},
    chain::TxInfo,
    config::WalletConfig,
    storage::{SqlitePragmaConfig, SqliteStorage},
    users::PaymailRequest,
    CallbackSyncService, TokioCancellationToken, UsersService, WalletError, WalletResult,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// JSON configuration file; defaults plus SPV_WALLET_* variables otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path, overriding the configuration
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables and indexes
    InitDb,
    /// Register a user by public key
    CreateUser {
        /// Compressed public key, hex
        #[arg(long)]
        pubkey: String,
        /// Paymail addresses to attach, repeatable
        #[arg(long)]
        paymail: Vec<String>,
    },
    /// Apply a broadcaster callback stored as JSON
    HandleCallback {
        #[arg(long)]
        file: PathBuf,
    },
    /// Decode a BEEF transaction and print its ancestry
    BeefInspect {
        #[arg(long, conflicts_with = "file")]
        hex: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        eprintln!("error [{}]: {e}", e.kind());
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> WalletResult<()> {
    let mut config = match &args.config {
        Some(path) => WalletConfig::load(path)?,
        None => WalletConfig::from_env()?,
    };
    if let Some(database) = args.database {
        config.database.path = database;
    }
    let token = TokioCancellationToken::new();

    match args.command {
        Command::InitDb => {
            open_storage(&config).await?;
            info!(path = %config.database.path, "Database initialised");
        }
        Command::CreateUser { pubkey, paymail } => {
            let storage = open_storage(&config).await?;
            let users = UsersService::new(storage.clone(), storage, config.paymail.domains.clone());
            let requests: Vec<PaymailRequest> = paymail.into_iter().map(PaymailRequest::new).collect();
            let user = users.create_user(&token, &pubkey, &requests).await?;
            println!("{}", user.id);
        }
        Command::HandleCallback { file } => {
            let body = read_file(&file)?;
            let tx_info: TxInfo = serde_json::from_str(&body)
                .map_err(|e| WalletError::InvalidCallback(format!("{}: {e}", file.display())))?;
            let storage = open_storage(&config).await?;
            CallbackSyncService::new(storage)
                .handle(&token, &tx_info)
                .await?;
            println!("{} handled ({:?})", tx_info.tx_id, tx_info.tx_status);
        }
        Command::BeefInspect { hex, file } => {
            let hex = match (hex, file) {
                (Some(hex), _) => hex,
                (None, Some(file)) => read_file(&file)?,
                (None, None) => {
                    return Err(WalletError::InvalidArgument(
                        "either --hex or --file is required".to_string(),
                    ))
                }
            };
            inspect_beef(hex.trim())?;
        }
    }
    Ok(())
}

async fn open_storage(config: &WalletConfig) -> WalletResult<Arc<SqliteStorage>> {
    let pragmas = SqlitePragmaConfig::from(config.database.preset)
        .with_busy_timeout(config.database.busy_timeout_ms);
    let storage = if config.database.path == ":memory:" {
        SqliteStorage::new_in_memory().await?
    } else {
        SqliteStorage::new_with_config(&config.database.path, pragmas).await?
    };
    Ok(Arc::new(storage))
}

fn read_file(path: &PathBuf) -> WalletResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| WalletError::InvalidArgument(format!("Failed to read {}: {e}", path.display())))
}

fn inspect_beef(hex: &str) -> WalletResult<()> {
    let beef = Beef::from_hex(hex)?;
    let spv = SpvTransaction::from_beef(&beef)?;

    println!("subject:   {}", spv.txid());
    println!("mined:     {}", spv.merkle_path.is_some());
    println!("inputs:    {}", spv.tx.inputs.len());
    println!("outputs:   {} ({} satoshis)", spv.tx.outputs.len(), spv.tx.total_output_satoshis());
    println!("ancestors: {}", spv.ancestors.len());
    for (txid, ancestor) in spv.ancestors.iter() {
        match &ancestor.merkle_path {
            Some(path) => println!("  {txid} mined at {}", path.block_height),
            None => println!("  {txid} unmined"),
        }
    }
    for (root, height) in spv.merkle_roots()? {
        println!("root {root} @ {height}");
    }
    Ok(())
}
