//! Wallet Transfer - command line entry point
//!
//! ```text
//! wallet-transfer [--env dev] --from <account-uuid> --to <account-uuid> --amount <decimal>
//! ```
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌────────────┐    ┌──────────┐
//! │  Config  │───▶│ Gateway  │───▶│   Engine   │───▶│  Output  │
//! │  (YAML)  │    │(retry+CB)│    │(lock+write)│    │  (JSON)  │
//! └──────────┘    └──────────┘    └────────────┘    └──────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use rust_decimal::Decimal;
use tracing::{error, info};

use wallet_transfer::authorizer::{AuthorizationGateway, HttpAuthorizer};
use wallet_transfer::config::AppConfig;
use wallet_transfer::core_types::AccountId;
use wallet_transfer::db::Database;
use wallet_transfer::logging::init_logging;
use wallet_transfer::models::TransferRequest;
use wallet_transfer::store::PgAccountStore;
use wallet_transfer::transfer::TransferEngine;

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(args: &[String], names: &[&str]) -> Option<String> {
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env(args: &[String]) -> String {
    get_arg(args, &["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn parse_request(args: &[String]) -> anyhow::Result<TransferRequest> {
    let Some(from) = get_arg(args, &["--from"]) else {
        bail!("missing --from <account-uuid>");
    };
    let Some(to) = get_arg(args, &["--to"]) else {
        bail!("missing --to <account-uuid>");
    };
    let Some(amount) = get_arg(args, &["--amount"]) else {
        bail!("missing --amount <decimal>");
    };

    let sender: AccountId = from.parse().context("invalid --from")?;
    let receiver: AccountId = to.parse().context("invalid --to")?;
    let amount: Decimal = amount.parse().context("invalid --amount")?;
    Ok(TransferRequest::new(sender, receiver, amount))
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let req = match parse_request(&args) {
        Ok(req) => req,
        Err(e) => {
            eprintln!("error: {e:#}");
            eprintln!(
                "usage: wallet-transfer [--env dev] --from <account-uuid> --to <account-uuid> --amount <decimal>"
            );
            return ExitCode::FAILURE;
        }
    };

    let env = get_env(&args);
    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = init_logging(&config);
    info!(env = %env, "Starting wallet-transfer");

    let engine = match build_engine(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Startup failed");
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match engine.execute(req).await {
        Ok(record) => match serde_json::to_string_pretty(&record) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            println!("{}", e.code());
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn build_engine(config: &AppConfig) -> anyhow::Result<TransferEngine> {
    let Some(url) = config.postgres_url.as_deref() else {
        bail!("postgres_url is not configured");
    };
    let db = Database::connect(url, &config.postgres_pool)
        .await
        .context("failed to connect to PostgreSQL")?;
    let store = PgAccountStore::new(db.pool().clone());
    store.ensure_schema().await.context("failed to ensure schema")?;

    let auth_config = &config.authorizer;
    let policy = auth_config.policy()?;
    let authorizer = HttpAuthorizer::new(
        auth_config.url.clone(),
        Duration::from_millis(auth_config.attempt_timeout_ms),
    )
    .context("failed to build HTTP client")?;

    let mask = config.log_mask();
    let gateway =
        AuthorizationGateway::new(Arc::new(authorizer), policy, auth_config.decision_rule())?
            .with_log_mask(mask);

    Ok(TransferEngine::new(Arc::new(store), Arc::new(gateway)).with_log_mask(mask))
}
