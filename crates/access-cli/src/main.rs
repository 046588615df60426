// ============================================================================
// subpass: subscription NFT access checks and rentals from the terminal
// ============================================================================
// Usage:
//   subpass check [--account ADDR]                 Does this account have access?
//   subpass rentable [--account ADDR]              Tokens free to rent out
//   subpass rent --token ID --renter ADDR --hours 5
//   subpass token --id ID                          Inspect one token
// ============================================================================

use access_core::config::{ENV_CONTRACT_ADDRESS, ENV_RPC_URL};
use access_core::rental::{hours_to_secs, RENTAL_HOUR_PRESETS};
use access_core::{AccessConfig, AccessSession, Account, Clock, ConnectMode};
use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use tracing::debug;

/// Subscription NFT access tool
#[derive(Parser, Debug)]
#[command(name = "subpass", version, about = "Check and rent out subscription NFT access")]
struct Cli {
    /// JSON-RPC endpoint (overrides SUBPASS_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Subscription contract address (overrides SUBPASS_CONTRACT_ADDRESS)
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct AccountArg {
    /// Account to act as (default: SUBPASS_ACCOUNT, then the node's first account)
    #[arg(long)]
    account: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether an account holds access (exit code 2 when denied)
    Check(AccountArg),

    /// List owned tokens with no active renter
    Rentable(AccountArg),

    /// Rent a token out to another account
    Rent {
        #[command(flatten)]
        owner: AccountArg,

        /// Token ID to rent out
        #[arg(long)]
        token: u64,

        /// Renter address (0x + 40 hex digits)
        #[arg(long)]
        renter: String,

        /// Rental length in hours (offered: 5, 10, 24, 48)
        #[arg(long, conflicts_with = "seconds", required_unless_present = "seconds")]
        hours: Option<u64>,

        /// Rental length in seconds
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Show the full state of one token
    Token {
        /// Token ID
        #[arg(long)]
        id: u64,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn load_config(cli: &Cli) -> Result<AccessConfig> {
    load_config_with(cli, |key| std::env::var(key).ok())
}

/// Flags first, then `env` for everything they leave unset
fn load_config_with<F>(cli: &Cli, env: F) -> Result<AccessConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let rpc_url = cli.rpc_url.clone();
    let contract = cli.contract.clone();
    AccessConfig::from_lookup(|key| match key {
        k if k == ENV_RPC_URL && rpc_url.is_some() => rpc_url.clone(),
        k if k == ENV_CONTRACT_ADDRESS && contract.is_some() => contract.clone(),
        k => env(k),
    })
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("access_core=info,subpass=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal; anything else is worth a note
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(&cli)?;
    let json = cli.json;

    match cli.command {
        Commands::Check(arg) => {
            apply_account(&mut config, arg)?;
            let session = AccessSession::new(config)?;
            cmd_check(&session, json).await
        }
        Commands::Rentable(arg) => {
            apply_account(&mut config, arg)?;
            let session = AccessSession::new(config)?;
            cmd_rentable(&session, json).await
        }
        Commands::Rent {
            owner,
            token,
            renter,
            hours,
            seconds,
        } => {
            apply_account(&mut config, owner)?;
            let duration = match (hours, seconds) {
                (Some(h), _) => hours_to_secs(h),
                (None, Some(s)) => s,
                (None, None) => return Err(anyhow!("Pass --hours or --seconds")),
            };
            let session = AccessSession::new(config)?;
            cmd_rent(&session, token, &renter, duration, json).await
        }
        Commands::Token { id } => {
            let session = AccessSession::new(config)?;
            cmd_token(&session, id, json).await
        }
    }
}

fn apply_account(config: &mut AccessConfig, arg: AccountArg) -> Result<()> {
    if let Some(account) = arg.account {
        config.account = Some(
            Account::parse_address(&account)
                .map_err(|_| anyhow!("--account is not a valid address: '{}'", account))?,
        );
    }
    Ok(())
}

async fn cmd_check(session: &AccessSession, json: bool) -> Result<ExitCode> {
    let account = session.account(ConnectMode::Silent).await?;
    let decision = session.resolver().check_access(&account).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else if decision.authorized {
        println!("=== ACCESS GRANTED ===");
        println!("Account: {}", account);
        if let (Some(id), Some(reason)) = (decision.token_id, decision.reason) {
            println!("Token:   #{} ({})", id, reason.display_name());
        }
        println!("Checked: {}", format_timestamp(decision.checked_at));
    } else {
        println!("=== ACCESS DENIED ===");
        println!("Account: {}", account);
        println!(
            "Scanned {} tokens ({} unreadable)",
            decision.tokens_scanned, decision.tokens_skipped
        );
    }

    Ok(if decision.authorized {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

async fn cmd_rentable(session: &AccessSession, json: bool) -> Result<ExitCode> {
    let account = session.account(ConnectMode::Silent).await?;
    let ids = session.rental_manager(account.clone()).rentable_tokens().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "account": account,
                "rentable": ids,
            }))?
        );
        return Ok(ExitCode::SUCCESS);
    }

    if ids.is_empty() {
        println!("No tokens to rent out: none owned, or all currently rented.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Rentable tokens for {}:", account);
    for id in &ids {
        println!("  #{}", id);
    }
    println!(
        "\nTotal: {} tokens (rental lengths offered: {} h)",
        ids.len(),
        RENTAL_HOUR_PRESETS.map(|h| h.to_string()).join(", ")
    );
    Ok(ExitCode::SUCCESS)
}

async fn cmd_rent(
    session: &AccessSession,
    token: u64,
    renter: &str,
    duration_secs: u64,
    json: bool,
) -> Result<ExitCode> {
    let owner = session.account(ConnectMode::Interactive).await?;
    debug!("Renting as {}", owner);

    let receipt = session
        .rental_manager(owner)
        .assign_delegate(token, renter, duration_secs)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!(
            "Token #{} rented to {} until {}",
            receipt.token_id,
            receipt.delegate,
            format_timestamp(receipt.expires_at)
        );
        println!("Transaction: {}", receipt.submission_id);
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_token(session: &AccessSession, id: u64, json: bool) -> Result<ExitCode> {
    let token = session.reader().read_token(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&token)?);
        return Ok(ExitCode::SUCCESS);
    }

    let now = session.clock().now();
    println!("=== Token #{} ===", token.id);
    println!("Owner:    {}", token.owner);
    println!("Valid:    {}", token.is_valid);
    match &token.delegate {
        Some(user) => println!(
            "Renter:   {} until {}{}",
            user,
            format_timestamp(token.delegate_expires_at),
            if token.has_active_delegate(now) { "" } else { " (expired)" }
        ),
        None => println!("Renter:   none"),
    }
    Ok(ExitCode::SUCCESS)
}
