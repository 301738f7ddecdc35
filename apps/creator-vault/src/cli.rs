//! # CLI
//!
//! Command definitions and the operator commands that work directly on the
//! redb file. The server is started by `serve`; every other command opens
//! the database, performs one operation and exits.

use crate::config::{DEFAULT_DB, ServeArgs};
use clap::{Args, Parser, Subcommand};
use creator_vault_core::create2::{self, DEFAULT_FACTORY};
use creator_vault_core::{
    AccessRequest, Address, AllowlistEntry, AwardOutcome, Create2Target, PointSource,
    RequestStatus, Store, StoreStats, VanityMatch, VanityPattern, VaultError,
};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Counters handed to one rayon task at a time.
const MINE_CHUNK: u64 = 1 << 16;

// =============================================================================
// COMMAND LINE
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "creator-vault", version, about = "Creator vault backend")]
pub struct Cli {
    /// Path to the redb database.
    #[arg(long, global = true, env = "CREATOR_VAULT_DB", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Create an empty database.
    Init {
        /// Replace an existing database.
        #[arg(long)]
        force: bool,
    },
    /// Print row counts.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Add an address to the creator allowlist.
    Allow {
        address: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Revoke an allowlisted address.
    Revoke { address: String },
    /// List creator access requests.
    Requests {
        /// pending, approved or denied
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Award waitlist points.
    Award {
        signup_id: u64,
        source: String,
        source_id: String,
    },
    /// Mine a CREATE2 salt for a vanity address.
    Mine(MineArgs),
}

#[derive(Debug, Clone, Args)]
pub struct MineArgs {
    /// Deploying factory. Defaults to the deterministic deployment proxy.
    #[arg(long)]
    pub factory: Option<String>,
    /// keccak256 of the init code.
    #[arg(long, conflicts_with = "init_code")]
    pub init_code_hash: Option<String>,
    /// Init code as hex; hashed before mining.
    #[arg(long)]
    pub init_code: Option<String>,
    /// Hex prefix of the wanted address.
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// Hex suffix of the wanted address.
    #[arg(long, default_value = "")]
    pub suffix: String,
    /// First salt counter.
    #[arg(long, default_value_t = 0)]
    pub start: u64,
    /// Give up after this many salts.
    #[arg(long, default_value_t = u64::MAX)]
    pub max_attempts: u64,
    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
    /// Write the result as JSON to this file.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Seconds between progress lines (0 = quiet).
    #[arg(long, default_value_t = 5)]
    pub progress_secs: u64,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{0}")]
    Usage(String),
}

pub type CliResult<T> = Result<T, CliError>;

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn open(db: &Path) -> CliResult<Store> {
    if !db.exists() {
        return Err(CliError::Usage(format!(
            "database {} does not exist, run `creator-vault init` first",
            db.display()
        )));
    }
    Ok(Store::open_existing(db)?)
}

// =============================================================================
// STORE COMMANDS
// =============================================================================

/// Create the database file and its tables.
pub fn cmd_init(db: &Path, force: bool) -> CliResult<()> {
    if db.exists() {
        if !force {
            return Err(CliError::Usage(format!(
                "{} already exists, use --force to replace it",
                db.display()
            )));
        }
        std::fs::remove_file(db)?;
        tracing::warn!(path = %db.display(), "Replaced existing database");
    }
    Store::open(db)?;
    println!("Initialized {}", db.display());
    Ok(())
}

pub fn cmd_status(db: &Path, json: bool) -> CliResult<StoreStats> {
    let stats = open(db)?.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Database:             {}", db.display());
        println!("Allowlisted creators: {}", stats.allowlisted);
        println!(
            "Access requests:      {} ({} pending)",
            stats.access_requests, stats.pending_requests
        );
        println!("Creator wallets:      {}", stats.creator_wallets);
        println!("Waitlist signups:     {}", stats.signups);
        println!("Referral conversions: {}", stats.referral_conversions);
        println!("Ledger entries:       {}", stats.ledger_entries);
    }
    Ok(stats)
}

pub fn cmd_allow(db: &Path, address: &str, note: Option<String>) -> CliResult<AllowlistEntry> {
    let address = Address::parse(address)?;
    let entry = open(db)?.allowlist_add(address, None, note, now())?;
    println!("Allowlisted {}", entry.address);
    Ok(entry)
}

pub fn cmd_revoke(db: &Path, address: &str) -> CliResult<AllowlistEntry> {
    let address = Address::parse(address)?;
    let entry = open(db)?.allowlist_revoke(&address, now())?;
    println!("Revoked {}", entry.address);
    Ok(entry)
}

pub fn cmd_requests(
    db: &Path,
    status: Option<&str>,
    json: bool,
) -> CliResult<Vec<AccessRequest>> {
    let status = status.map(str::parse::<RequestStatus>).transpose()?;
    let requests = open(db)?.access_requests(status)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&requests)?);
    } else if requests.is_empty() {
        println!("No access requests");
    } else {
        for r in &requests {
            let coin = r
                .coin_address
                .map(|c| c.to_checksum())
                .unwrap_or_else(|| "-".to_string());
            println!("#{:<5} {:<9} {} coin={}", r.id, r.status, r.wallet_address, coin);
        }
    }
    Ok(requests)
}

pub fn cmd_award(
    db: &Path,
    signup_id: u64,
    source: &str,
    source_id: &str,
) -> CliResult<AwardOutcome> {
    let source: PointSource = source.parse()?;
    let store = open(db)?;
    let outcome = store.award_points(signup_id, source, source_id, now())?;
    match &outcome {
        AwardOutcome::Awarded {
            points,
            referrer_bonus,
        } => {
            println!("Awarded {} points to signup #{}", points, signup_id);
            if let Some(bonus) = referrer_bonus {
                println!(
                    "Referrer #{} received a {} point bonus",
                    bonus.referrer_signup_id, bonus.points
                );
            }
        }
        AwardOutcome::Duplicate => println!("Already awarded, nothing changed"),
    }
    println!("Balance: {}", store.points_balance(signup_id)?);
    Ok(outcome)
}

// =============================================================================
// MINER
// =============================================================================

/// Result of a mining run, also written to `--out`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MineReport {
    pub factory: Address,
    pub init_code_hash: String,
    pub prefix: String,
    pub suffix: String,
    pub found: bool,
    pub salt: Option<String>,
    pub address: Option<Address>,
    pub counter: Option<u64>,
    pub attempts: u64,
    pub elapsed_ms: u64,
}

fn resolve_init_hash(args: &MineArgs) -> CliResult<[u8; 32]> {
    match (&args.init_code_hash, &args.init_code) {
        (Some(hash), _) => Ok(create2::parse_hash32(hash)?),
        (None, Some(code)) => {
            let code = hex::decode(creator_vault_core::address::strip_0x(code.trim()))
                .map_err(|e| CliError::Usage(format!("init code is not hex: {}", e)))?;
            Ok(create2::init_code_hash(&code))
        }
        (None, None) => Err(CliError::Usage(
            "one of --init-code-hash or --init-code is required".to_string(),
        )),
    }
}

/// Salts per second.
pub fn hash_rate(attempts: u64, elapsed_ms: u64) -> u64 {
    attempts.saturating_mul(1000) / elapsed_ms.max(1)
}

/// Log attempts every `interval` until the sender side is dropped.
fn report_progress(
    finished: &mpsc::Receiver<()>,
    interval: Duration,
    attempts: &AtomicU64,
    started: Instant,
) {
    loop {
        match finished.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let count = attempts.load(Ordering::Relaxed);
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::info!(
                    attempts = count,
                    rate = hash_rate(count, elapsed_ms),
                    elapsed_secs = elapsed_ms / 1000,
                    "Mining progress"
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Search salts in parallel until one matches or the budget runs out.
pub fn cmd_mine(args: &MineArgs) -> CliResult<MineReport> {
    let factory = match &args.factory {
        Some(f) => Address::parse(f)?,
        None => DEFAULT_FACTORY,
    };
    let init_hash = resolve_init_hash(args)?;
    let pattern = VanityPattern::new(&args.prefix, &args.suffix)?;
    let target = Create2Target::new(factory, init_hash);
    let end = args.start.saturating_add(args.max_attempts);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()?;
    tracing::info!(
        factory = %factory,
        prefix = pattern.prefix(),
        suffix = pattern.suffix(),
        difficulty_bits = pattern.difficulty_bits(),
        threads = pool.current_num_threads(),
        "Mining CREATE2 salt"
    );

    let found = AtomicBool::new(false);
    let attempts = AtomicU64::new(0);
    let started = Instant::now();
    let chunks = (end - args.start).div_ceil(MINE_CHUNK);

    let hit: Option<VanityMatch> = std::thread::scope(|scope| {
        let (done, finished) = mpsc::channel::<()>();
        if args.progress_secs > 0 {
            let interval = Duration::from_secs(args.progress_secs);
            let attempts = &attempts;
            scope.spawn(move || report_progress(&finished, interval, attempts, started));
        }
        let hit = pool.install(|| {
            (0..chunks).into_par_iter().find_map_any(|chunk| {
                if found.load(Ordering::Relaxed) {
                    return None;
                }
                let lo = args.start.saturating_add(chunk.saturating_mul(MINE_CHUNK));
                let hi = lo.saturating_add(MINE_CHUNK).min(end);
                let outcome =
                    target.search_until(&pattern, lo..hi, || found.load(Ordering::Relaxed));
                attempts.fetch_add(outcome.attempts, Ordering::Relaxed);
                let m = outcome.found?;
                found.store(true, Ordering::Relaxed);
                Some(m)
            })
        });
        drop(done);
        hit
    });

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let attempts = attempts.load(Ordering::Relaxed);
    let report = MineReport {
        factory,
        init_code_hash: format!("0x{}", hex::encode(init_hash)),
        prefix: pattern.prefix().to_string(),
        suffix: pattern.suffix().to_string(),
        found: hit.is_some(),
        salt: hit.map(|m| format!("0x{}", hex::encode(m.salt))),
        address: hit.map(|m| m.address),
        counter: hit.map(|m| m.counter),
        attempts,
        elapsed_ms,
    };

    match &hit {
        Some(m) => {
            println!("Address:  {}", m.address);
            println!("Salt:     0x{}", hex::encode(m.salt));
            println!("Counter:  {}", m.counter);
        }
        None => println!("No match in {} attempts", attempts),
    }
    println!(
        "Attempts: {} in {} ms ({} H/s)",
        attempts,
        elapsed_ms,
        hash_rate(attempts, elapsed_ms)
    );

    if let Some(out) = &args.out {
        std::fs::write(out, serde_json::to_string_pretty(&report)?)?;
        println!("Wrote {}", out.display());
    }
    Ok(report)
}
