use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wallet_reconciler::application::{ReconciliationEngine, WalletHandle};
use wallet_reconciler::config::WalletConfig;
use wallet_reconciler::domain::bank_account::BankAccountId;
use wallet_reconciler::domain::payment::{Direction, PaymentMethod, PaymentState};
use wallet_reconciler::domain::ports::{LedgerClientRef, PushTransportRef, StateStoreBox};
use wallet_reconciler::domain::transaction::HistoryFilter;
use wallet_reconciler::infrastructure::http::HttpLedgerClient;
use wallet_reconciler::infrastructure::in_memory::{
    InMemoryLedger, InMemoryPushTransport, InMemoryStateStore,
};
use wallet_reconciler::infrastructure::json_file::JsonFileStateStore;
use wallet_reconciler::infrastructure::platform::ConsolePlatform;
use wallet_reconciler::infrastructure::websocket::WebSocketPushTransport;
use wallet_reconciler::interfaces::csv::account_writer::AccountWriter;
use wallet_reconciler::interfaces::csv::history_writer::HistoryWriter;
use wallet_reconciler::telemetry;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run against a simulated in-process backend.
    #[arg(long, global = true)]
    offline: bool,

    /// Cache wallet state in this JSON file across runs.
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Cache wallet state in a RocksDB database (requires the
    /// `storage-rocksdb` feature).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the authoritative wallet balance.
    Balance,
    /// Pay or top up through an external payment application.
    Pay {
        #[arg(long, allow_hyphen_values = true)]
        amount: Decimal,
        #[arg(long, default_value = "credit")]
        direction: Direction,
        /// Upper bound for the amount; debits default to the current balance.
        #[arg(long)]
        limit: Option<Decimal>,
        /// `upi` or `bank:<account id>`.
        #[arg(long, default_value = "upi")]
        method: PaymentMethod,
    },
    /// Move money between the wallet and a linked bank account.
    Transfer {
        #[arg(long)]
        bank_account: String,
        #[arg(long, allow_hyphen_values = true)]
        amount: Decimal,
        #[arg(long)]
        direction: Direction,
    },
    /// Print the transaction ledger as CSV.
    History {
        #[arg(long, default_value = "all")]
        filter: HistoryFilter,
    },
    /// Print linked bank accounts as CSV.
    Accounts,
    /// Print every balance change until interrupted.
    Watch,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WalletConfig::load(path)?,
        None => WalletConfig::default(),
    };
    telemetry::init(if cli.verbose { "debug" } else { config.log_level.as_str() });

    let store = open_store(cli.state_file.as_deref(), cli.db_path.as_deref());
    let platform = Arc::new(ConsolePlatform::new(config.handled_uri_schemes.clone()));

    let (ledger, push): (LedgerClientRef, Option<PushTransportRef>) = if cli.offline {
        let push = InMemoryPushTransport::new();
        let ledger = InMemoryLedger::new(config.offline_opening_balance).with_push(push.clone());
        tracing::info!(opening_balance = %config.offline_opening_balance, "running against the offline ledger");
        let ledger: LedgerClientRef = Arc::new(ledger);
        let push: PushTransportRef = Arc::new(push);
        (ledger, Some(push))
    } else {
        let ledger: LedgerClientRef = Arc::new(HttpLedgerClient::new(&config)?);
        let push = config
            .push_url
            .as_ref()
            .map(|url| Arc::new(WebSocketPushTransport::new(url.clone())) as PushTransportRef);
        (ledger, push)
    };

    let mut engine = ReconciliationEngine::new(store, ledger, platform, &config);
    if let Some(push) = push {
        engine = engine.with_push(push);
    }
    let handle = engine.start().await;

    let result = run(cli.command, &handle).await;
    let final_view = handle.shutdown().await?;
    if final_view.storage_degraded {
        tracing::warn!("wallet state could not be cached during this run");
    }
    result
}

async fn run(command: Command, handle: &WalletHandle) -> Result<()> {
    match command {
        Command::Balance => {
            let balance = match handle.refresh_balance().await {
                Ok(balance) => balance,
                Err(e) => match handle.current_balance() {
                    Some(cached) => {
                        tracing::warn!(error = %e, "backend unavailable, showing cached balance");
                        cached
                    }
                    None => return Err(e.into()),
                },
            };
            println!("balance: {} (sequence {})", balance.amount, balance.as_of_sequence);
        }
        Command::Pay {
            amount,
            direction,
            limit,
            method,
        } => {
            let limit = match (direction, limit) {
                (Direction::Debit, None) => handle
                    .refresh_balance()
                    .await
                    .ok()
                    .or_else(|| handle.current_balance())
                    .map(|b| b.amount),
                (_, limit) => limit,
            };
            handle.select_amount(amount, direction, limit).await?;
            let transaction_id = handle.confirm_payment(method).await?;
            println!("transaction {transaction_id} handed off, waiting for confirmation");

            let payment = handle.payment_settled().await?;
            match payment.state {
                PaymentState::Succeeded => {
                    let balance = handle.refresh_balance().await?;
                    println!("payment {transaction_id} succeeded");
                    println!("balance: {} (sequence {})", balance.amount, balance.as_of_sequence);
                }
                PaymentState::Expired => {
                    println!(
                        "payment {transaction_id} is still pending; check the history later"
                    );
                }
                _ => {
                    return Err(match handle.view().last_error {
                        Some(e) => e.into(),
                        None => miette::miette!("payment {transaction_id} was declined"),
                    });
                }
            }
        }
        Command::Transfer {
            bank_account,
            amount,
            direction,
        } => {
            let balance = handle
                .transfer(BankAccountId::new(bank_account), amount, direction)
                .await?;
            println!("balance: {} (sequence {})", balance.amount, balance.as_of_sequence);
        }
        Command::History { filter } => {
            let records = handle.history(filter).await?;
            let stdout = io::stdout();
            HistoryWriter::new(stdout.lock()).write_records(&records)?;
        }
        Command::Accounts => {
            let accounts = handle.bank_accounts().await?;
            let stdout = io::stdout();
            AccountWriter::new(stdout.lock()).write_accounts(&accounts)?;
        }
        Command::Watch => watch(handle).await?,
    }
    Ok(())
}

async fn watch(handle: &WalletHandle) -> Result<()> {
    let mut views = handle.subscribe();
    let mut last_sequence = None;
    loop {
        let balance = views.borrow_and_update().balance.clone();
        if let Some(balance) = balance
            && last_sequence != Some(balance.as_of_sequence)
        {
            last_sequence = Some(balance.as_of_sequence);
            println!(
                "balance: {} (sequence {}, {:?})",
                balance.amount, balance.as_of_sequence, balance.source
            );
        }
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.into_diagnostic()?;
                return Ok(());
            }
            changed = views.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// State store failures never stop the wallet: an unopenable store is
/// replaced by an in-memory one.
fn open_store(state_file: Option<&Path>, db_path: Option<&Path>) -> StateStoreBox {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        use wallet_reconciler::infrastructure::rocksdb::RocksDbStateStore;
        return match RocksDbStateStore::open(db_path) {
            Ok(store) => Box::new(store),
            Err(fault) => {
                tracing::warn!(error = %fault, "cannot open RocksDB, state will not be cached");
                Box::new(InMemoryStateStore::new())
            }
        };
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    let state_file = match (state_file, db_path) {
        (None, Some(db_path)) => {
            let fallback = db_path.with_extension("json");
            tracing::warn!(
                path = %fallback.display(),
                "built without RocksDB support, falling back to a JSON state file"
            );
            Some(fallback)
        }
        (state_file, db_path) => {
            if db_path.is_some() {
                tracing::warn!("built without RocksDB support, falling back to a JSON state file");
            }
            state_file.map(Path::to_path_buf)
        }
    };
    #[cfg(feature = "storage-rocksdb")]
    let state_file = state_file.map(Path::to_path_buf);

    match state_file {
        Some(path) => match JsonFileStateStore::open(&path) {
            Ok(store) => Box::new(store),
            Err(fault) => {
                tracing::warn!(error = %fault, "cannot open state file, state will not be cached");
                Box::new(InMemoryStateStore::new())
            }
        },
        None => Box::new(InMemoryStateStore::new()),
    }
}
