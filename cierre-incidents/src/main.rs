//! cierre-incidents - consolidated incident review from the command line
//!
//! Operator front end for the incident-exception workflow of a closure:
//! - `show`: print the consolidated incidents (cached or forced-fresh)
//! - `reprocess`: draft exceptions, confirm, then sync → reprocess → fresh reload
//! - `watch`: open a review session and stream its events

use anyhow::{Context, Result};
use cierre_common::config::{CliOverrides, ConfigResolver};
use cierre_common::events::{ClosureEvent, EventBus};
use clap::{Parser, Subcommand};
use cierre_incidents::api::{ClosureApi, Freshness, HttpClosureApi};
use cierre_incidents::models::{ClosureId, ExceptionDraft, ExceptionKey, Incident, IncidentType, SetId};
use cierre_incidents::services::{ReprocessOutcome, ReprocessPlan, SnapshotLoader, ToggleOutcome};
use cierre_incidents::session::{ReviewSession, SessionOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "cierre-incidents", version, about = "Closure incident review and reprocessing")]
struct Cli {
    /// Path to config.toml (default: <config_dir>/cierre/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the closure service
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the consolidated incidents of a closure
    Show {
        closure_id: i64,
        /// Bypass the server-side cache
        #[arg(long)]
        fresh: bool,
    },
    /// Synchronize exceptions and reprocess the closure
    Reprocess {
        closure_id: i64,
        /// Mark an exception: ACCOUNT:TYPE[:SET]
        #[arg(long = "except", value_name = "ACCOUNT:TYPE[:SET]")]
        exceptions: Vec<String>,
        /// Remove a server exception: ACCOUNT:TYPE[:SET]
        #[arg(long = "remove", value_name = "ACCOUNT:TYPE[:SET]")]
        removals: Vec<String>,
        /// Reason recorded with marked exceptions
        #[arg(long, default_value = "")]
        reason: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Open a review session and print its events
    Watch {
        closure_id: i64,
        /// How long to watch
        #[arg(long, default_value_t = 120)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigResolver::new(CliOverrides {
        config_path: cli.config.clone(),
        api_url: cli.api_url.clone(),
        log_level: cli.log_level.clone(),
    })
    .resolve()?;

    cierre_common::logging::init(&config.log_level)?;
    info!(
        "Starting cierre-incidents v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.base_url
    );

    let api: Arc<dyn ClosureApi> = Arc::new(HttpClosureApi::from_config(&config)?);
    let event_bus = EventBus::new(100);

    match cli.command {
        Command::Show { closure_id, fresh } => {
            let freshness = if fresh {
                Freshness::ForceFresh
            } else {
                Freshness::Cached
            };
            let snapshot = SnapshotLoader::new(api, event_bus)
                .load(ClosureId(closure_id), freshness)
                .await?;
            print_incidents(&snapshot.incidents);
        }
        Command::Reprocess {
            closure_id,
            exceptions,
            removals,
            reason,
            yes,
        } => {
            let session = ReviewSession::open(
                api,
                ClosureId(closure_id),
                SessionOptions::default(),
                event_bus,
            )
            .await?;
            let orchestrator = Arc::clone(session.orchestrator());

            let mut requested = Vec::with_capacity(exceptions.len() + removals.len());
            for arg in &exceptions {
                requested.push(ExceptionDraft::create(parse_exception_key(arg)?, reason.clone()));
            }
            for arg in &removals {
                requested.push(ExceptionDraft::delete(parse_exception_key(arg)?));
            }

            for draft in requested {
                let key = draft.key.clone();
                match orchestrator.upsert_draft(draft).await {
                    Ok(ToggleOutcome::Drafted(_)) => {}
                    Ok(ToggleOutcome::Cancelled) => println!("  {}: request cancelled", key),
                    Err(e) => {
                        session.close().await;
                        return Err(e).with_context(|| format!("Cannot draft {}", key));
                    }
                }
            }

            let plan = orchestrator.plan().await;
            print_plan(&plan);
            if !yes && !confirm("Synchronize and reprocess this closure?").await? {
                println!("Cancelled; nothing was sent.");
                session.close().await;
                return Ok(());
            }

            let outcome = orchestrator.reprocess(plan.confirm()).await;
            let summary = session.close().await;

            match outcome {
                Ok(ReprocessOutcome::Completed(receipt)) => {
                    println!(
                        "Reprocessed closure {}: iteration {} ({}), {} exceptions synced, {} incidents",
                        receipt.closure_id,
                        receipt.new_iteration,
                        receipt.status.as_str(),
                        receipt.synced,
                        receipt.incidents
                    );
                }
                Ok(ReprocessOutcome::Rejected { state }) => {
                    println!("Reprocess rejected: cycle already {}", state);
                }
                Err(e) => {
                    if summary.discarded_drafts > 0 {
                        eprintln!(
                            "{} exception(s) were not synchronized; re-run to retry.",
                            summary.discarded_drafts
                        );
                    }
                    return Err(e).context("Reprocess cycle failed");
                }
            }
        }
        Command::Watch {
            closure_id,
            seconds,
        } => {
            let mut events = event_bus.subscribe();
            let session = ReviewSession::open(
                api,
                ClosureId(closure_id),
                SessionOptions {
                    status_interval: Some(config.status_interval),
                    on_reprocessed: None,
                },
                event_bus,
            )
            .await?;

            print_incidents(&session.orchestrator().merged_view().await);

            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(event) => print_event(&event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            eprintln!("(skipped {} events)", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            let summary = session.close().await;
            info!("Watched closure {} for {:?}", summary.closure_id, summary.duration);
        }
    }

    Ok(())
}

/// Parse `ACCOUNT:TYPE[:SET]`
fn parse_exception_key(arg: &str) -> cierre_common::Result<ExceptionKey> {
    let parts: Vec<&str> = arg.split(':').collect();
    let (account, code, set) = match parts.as_slice() {
        [account, code] => (*account, *code, None),
        [account, code, set] => (*account, *code, Some(*set)),
        _ => {
            return Err(cierre_common::Error::InvalidInput(format!(
                "expected ACCOUNT:TYPE[:SET], got '{}'",
                arg
            )))
        }
    };

    let incident_type = IncidentType::from_code(code);
    if incident_type == IncidentType::Unknown {
        return Err(cierre_common::Error::InvalidInput(format!(
            "unknown incident type '{}'",
            code
        )));
    }

    let set_id = set
        .map(|raw| {
            raw.trim().parse::<i64>().map(SetId).map_err(|_| {
                cierre_common::Error::InvalidInput(format!("invalid set id '{}'", raw))
            })
        })
        .transpose()?;

    let key = ExceptionKey::new(account.trim(), incident_type, set_id);
    key.validate()
        .map_err(|e| cierre_common::Error::InvalidInput(e.to_string()))?;
    Ok(key)
}

async fn confirm(question: &str) -> Result<bool> {
    let question = question.to_string();
    let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        use std::io::Write;
        print!("{} [y/N] ", question);
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await??;

    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes" | "s" | "si" | "sí"))
}

fn print_plan(plan: &ReprocessPlan) {
    println!(
        "Closure {}: {} exception(s) to synchronize ({} create, {} delete)",
        plan.closure_id,
        plan.summary.total(),
        plan.summary.creates,
        plan.summary.deletes
    );
    for draft in &plan.batch {
        println!("  {:?} {}", draft.action, draft.key);
    }
    for key in &plan.orphaned {
        println!("  warning: {} is not in the current snapshot", key);
    }
    for key in &plan.redundant {
        println!(
            "  warning: {} already matches the server; the service will reject it",
            key
        );
    }
}

fn print_incidents(incidents: &[Incident]) {
    if incidents.is_empty() {
        println!("No incidents.");
        return;
    }
    for incident in incidents {
        println!(
            "[{:?}] {} ({}): {}",
            incident.severity, incident.incident_type, incident.count, incident.message
        );
        for element in &incident.affected {
            let mark = if element.has_exception { "no aplica" } else { "" };
            match (&element.set_name, element.set_id) {
                (Some(name), _) => println!(
                    "    {:<16} {:<32} [{}] {}",
                    element.account_code, element.description, name, mark
                ),
                (None, Some(set)) => println!(
                    "    {:<16} {:<32} [set {}] {}",
                    element.account_code, element.description, set, mark
                ),
                (None, None) => println!(
                    "    {:<16} {:<32} {}",
                    element.account_code, element.description, mark
                ),
            }
        }
    }
}

fn print_event(event: &ClosureEvent) {
    match event {
        ClosureEvent::ClosureStatusPolled { status, iteration, .. } => {
            println!("status: {} (iteration {:?})", status, iteration)
        }
        ClosureEvent::OrchestratorTransition { from, to, .. } => println!("{} -> {}", from, to),
        other => match serde_json::to_string(other) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{:?}", other),
        },
    }
}
