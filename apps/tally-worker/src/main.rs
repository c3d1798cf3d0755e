//! # Tally Worker
//!
//! Runs one commission engine operation per invocation and prints the
//! result as JSON on stdout. Logs go to stderr.
//!
//! ## Usage
//! ```bash
//! # First of the month, from cron
//! tally-worker process-monthly --tenant acme
//!
//! # Operators
//! tally-worker generate --tenant acme --work-order wo-42 --actor manager-7
//! tally-worker close-settlement --tenant acme --user tech-1 --period 2025-01 --actor finance-2
//! tally-worker release-payment --tenant acme --work-order wo-42 --receivable ar-9 --amount-cents 50000
//! tally-worker split-event --tenant acme --event ev-1 --share tech-1:6000 --share tech-2:4000 --actor manager-7
//! tally-worker flush-outbox
//! ```
//!
//! Engine failures print the structured error body and exit with status 1:
//!
//! ```json
//! {"code":"NO_APPROVED_EVENTS","message":"...","status":409}
//! ```

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;
use tally_core::{EngineContext, ReleasePayment, Role, SplitEvent, SplitShare, Trigger};
use tally_db::{CommissionEngine, Database, DbConfig, EngineError};

#[derive(Parser, Debug)]
#[command(
    name = "tally-worker",
    about = "Commission engine scheduler and operator commands",
    version
)]
struct Cli {
    /// Configuration file (optional; TALLY_* variables override it)
    #[arg(long, default_value = "tally.toml")]
    config: PathBuf,

    /// Override the configured database path
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations and exit
    Migrate,
    /// Generate this month's recurring contract commissions
    ProcessMonthly {
        #[command(flatten)]
        scope: Scope,
        /// Run as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Generate commissions for a work order
    Generate {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        work_order: String,
        #[arg(long, value_parser = parse_trigger, default_value = "os_completed")]
        trigger: Trigger,
    },
    /// Show what generation would produce without writing anything
    Simulate {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        work_order: String,
        #[arg(long, value_parser = parse_trigger, default_value = "os_completed")]
        trigger: Trigger,
    },
    /// Release the commissions a customer payment pays for
    ReleasePayment {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        work_order: String,
        #[arg(long)]
        receivable: String,
        #[arg(long)]
        amount_cents: i64,
    },
    /// Share an event between users (USER:BPS[:ROLE], repeatable)
    SplitEvent {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        event: String,
        #[arg(long = "share", value_parser = parse_share, required = true)]
        shares: Vec<SplitShare>,
    },
    /// Close a user's settlement for a period
    CloseSettlement {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        user: String,
        /// YYYY-MM
        #[arg(long)]
        period: String,
    },
    /// Mark a closed settlement as paid
    PaySettlement {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        settlement: String,
    },
    /// Recompute a goal's achievement
    RefreshGoal {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        goal: String,
    },
    /// Print pending notifications and mark them sent
    FlushOutbox {
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[derive(Args, Debug)]
struct Scope {
    #[arg(long)]
    tenant: String,
    /// User on whose behalf the operation runs
    #[arg(long)]
    actor: Option<String>,
    /// Grant manager privileges to the actor
    #[arg(long)]
    privileged: bool,
}

impl Scope {
    fn context(&self, today: NaiveDate) -> EngineContext {
        let mut ctx = EngineContext::new(&self.tenant, today);
        if let Some(actor) = &self.actor {
            ctx = ctx.with_actor(actor);
        }
        if self.privileged {
            ctx = ctx.privileged();
        }
        ctx
    }
}

fn parse_trigger(value: &str) -> Result<Trigger, String> {
    [Trigger::OsCompleted, Trigger::OsInvoiced, Trigger::InstallmentPaid]
        .into_iter()
        .find(|t| t.as_str() == value)
        .ok_or_else(|| format!("unknown trigger '{value}'"))
}

/// `tech-1:6000` or `seller-1:4000:seller`
fn parse_share(value: &str) -> Result<SplitShare, String> {
    let mut parts = value.split(':');
    let user_id = parts.next().filter(|u| !u.is_empty());
    let bps = parts.next().and_then(|b| b.parse::<i64>().ok());
    let (Some(user_id), Some(percentage_bps)) = (user_id, bps) else {
        return Err(format!("expected USER:BPS[:ROLE], got '{value}'"));
    };
    let role = match parts.next() {
        None => None,
        Some(code) => Some(
            Role::ALL
                .into_iter()
                .find(|r| r.as_str() == code)
                .ok_or_else(|| format!("unknown role '{code}'"))?,
        ),
    };
    Ok(SplitShare {
        user_id: user_id.to_string(),
        percentage_bps,
        role,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(engine_err) = err.downcast_ref::<EngineError>() {
                let payload = engine_err.to_payload();
                match serde_json::to_string(&payload) {
                    Ok(json) => println!("{json}"),
                    Err(_) => eprintln!("{}", payload.message),
                }
            } else {
                eprintln!("tally-worker: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = WorkerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    init_tracing(&config.log_level);
    info!(
        database = %config.database_path,
        campaign_composition = ?config.engine.campaign_composition,
        "Configuration loaded"
    );

    let run_migrations = !matches!(cli.command, Command::Migrate);
    let db = Database::new(
        DbConfig::new(&config.database_path)
            .max_connections(config.max_connections)
            .run_migrations(run_migrations),
    )
    .await
    .context("opening database")?;

    let engine = CommissionEngine::new(db.clone(), config.engine.clone());
    let today = Utc::now().date_naive();

    match cli.command {
        Command::Migrate => {
            db.run_migrations().await.context("running migrations")?;
            let status = db.migration_status().await?;
            info!(applied = status.applied, "Database migrations complete");
            print_json(&status)
        }
        Command::ProcessMonthly { scope, date } => {
            let ctx = scope.context(date.unwrap_or(today));
            let report = engine.process_monthly(&ctx).await?;
            if report.failed > 0 {
                warn!(failed = report.failed, "Some recurring commissions failed");
            }
            print_json(&report)
        }
        Command::Generate { scope, work_order, trigger } => {
            let events = engine
                .generate_for_work_order(&scope.context(today), &work_order, trigger)
                .await?;
            print_json(&events)
        }
        Command::Simulate { scope, work_order, trigger } => {
            let report = engine.simulate(&scope.context(today), &work_order, trigger).await?;
            print_json(&report)
        }
        Command::ReleasePayment { scope, work_order, receivable, amount_cents } => {
            let input = ReleasePayment {
                work_order_id: work_order,
                receivable_id: receivable,
                payment_cents: amount_cents,
            };
            let report = engine.release_by_payment(&scope.context(today), &input).await?;
            print_json(&report)
        }
        Command::SplitEvent { scope, event, shares } => {
            let splits = engine
                .split_event(&scope.context(today), &event, &SplitEvent { shares })
                .await?;
            print_json(&splits)
        }
        Command::CloseSettlement { scope, user, period } => {
            let settlement = engine
                .close_settlement(&scope.context(today), &user, &period)
                .await?;
            print_json(&settlement)
        }
        Command::PaySettlement { scope, settlement } => {
            let paid = engine.pay_settlement(&scope.context(today), &settlement).await?;
            print_json(&paid)
        }
        Command::RefreshGoal { scope, goal } => {
            let achievement = engine.refresh_achievement(&scope.context(today), &goal).await?;
            print_json(&achievement)
        }
        Command::FlushOutbox { limit } => {
            let outbox = db.outbox();
            let pending = outbox.get_pending(limit).await?;
            for entry in &pending {
                println!("{}", serde_json::to_string(entry)?);
                outbox.mark_sent(&entry.id).await?;
            }
            info!(count = pending.len(), "Outbox flushed");
            Ok(())
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
