//! dispatch CLI: operator interface to the assignment engine.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use repair_dispatch::config::Config;
use repair_dispatch::db::{Db, PgNotifier};
use repair_dispatch::engine::{DispatchOutcome, Dispatcher, SweepLoop};
use repair_dispatch::model::{AssignmentId, OrderId};
use repair_dispatch::store::DispatchStore;
use repair_dispatch::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "dispatch", about = "Repair order assignment and dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconciliation sweep and serve offer timers until Ctrl-C
    Serve,
    /// Offer a new order to its best candidate
    Order {
        /// Order ID
        id: OrderId,
    },
    /// Accept an offer on behalf of its master
    Accept {
        /// Assignment ID
        id: AssignmentId,
    },
    /// Reject an offer and cascade to the next candidate
    Reject {
        /// Assignment ID
        id: AssignmentId,
        /// Reason recorded on the assignment
        #[arg(long, default_value = "declined")]
        reason: String,
    },
    /// Withdraw every open offer for an order cancelled elsewhere
    Cancel {
        /// Order ID
        order_id: OrderId,
    },
    /// Run one reconciliation pass and exit
    Sweep,
    /// Show an assignment as its master sees it
    Show {
        /// Assignment ID
        id: AssignmentId,
        /// Include client contact details
        #[arg(long)]
        full: bool,
    },
    /// List an order's assignments
    List {
        /// Order ID
        order_id: OrderId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = telemetry(&config)?;
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    let dispatcher = Dispatcher::new(
        Arc::new(db.clone()),
        Arc::new(PgNotifier::new(db.clone())),
        config.dispatch()?,
    );

    match cli.command {
        Command::Serve => cmd_serve(dispatcher).await,
        Command::Order { id } => {
            print_outcome(&dispatcher.dispatch(id).await?);
            Ok(())
        }
        Command::Accept { id } => {
            let assignment = dispatcher.accept(id).await?;
            println!(
                "Accepted: {} (order {}, attempt {})",
                assignment.id, assignment.order_id, assignment.attempt_number
            );
            Ok(())
        }
        Command::Reject { id, reason } => {
            print_outcome(&dispatcher.reject(id, &reason).await?);
            Ok(())
        }
        Command::Cancel { order_id } => {
            let n = dispatcher.cancel_all_pending(order_id).await?;
            println!("Withdrew {n} pending offer(s)");
            Ok(())
        }
        Command::Sweep => {
            let n = dispatcher.sweep(chrono::Utc::now()).await?;
            println!("Expired {n} overdue offer(s)");
            Ok(())
        }
        Command::Show { id, full } => {
            let view = dispatcher.view(id, full).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::List { order_id } => cmd_list(&db, order_id).await,
    }
}

fn telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "repair-dispatch".to_string(),
        log_level: config.log_level.clone(),
    })?)
}

async fn cmd_serve(dispatcher: Dispatcher) -> anyhow::Result<()> {
    let sweep = SweepLoop::new(dispatcher.clone(), dispatcher.config().sweep_interval());

    let s = sweep.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        s.shutdown();
    });

    sweep.run().await?;
    dispatcher.shutdown();
    Ok(())
}

async fn cmd_list(db: &Db, order_id: OrderId) -> anyhow::Result<()> {
    let assignments = db.list_assignments_by_order(order_id).await?;
    if assignments.is_empty() {
        println!("No assignments for order {order_id}.");
        return Ok(());
    }

    println!(
        "{:<3}  {:<36}  {:<36}  {:<8}  {:<16}  REASON",
        "#", "ASSIGNMENT", "MASTER", "STATUS", "EXPIRES"
    );
    println!("{}", "-".repeat(120));
    for a in &assignments {
        println!(
            "{:<3}  {:<36}  {:<36}  {:<8}  {:<16}  {}",
            a.attempt_number,
            a.id,
            a.master_id,
            a.status.as_str(),
            a.expires_at.format("%Y-%m-%d %H:%M"),
            a.rejection_reason.as_deref().unwrap_or("-")
        );
    }
    println!("\n{} assignment(s)", assignments.len());
    Ok(())
}

fn print_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Offered(a) => println!(
            "Offered: {} to master {} (attempt {}, expires {})",
            a.id, a.master_id, a.attempt_number, a.expires_at
        ),
        DispatchOutcome::NoCandidate { attempts } => {
            println!("No eligible master left after {attempts} attempt(s)")
        }
        DispatchOutcome::Exhausted { attempts } => {
            println!("Order cancelled after {attempts} attempt(s)")
        }
        DispatchOutcome::Skipped(reason) => println!("Skipped: {reason:?}"),
    }
}
