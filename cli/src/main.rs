//! Checkwright license shell
//!
//! Thin front end over `checkwright-license` for support staff and scripts.
//!
//! Usage:
//!   checkwright status
//!   checkwright activate ABCD-1234-EFGH-5678
//!   checkwright --offline trial start ABCD-1234-EFGH-5678
//!
//! Exits non-zero when the requested operation did not succeed.

use std::{fs, process::ExitCode, sync::Arc, time::Duration};
use anyhow::{Context, Result};
use checkwright_license::{ActivationOutcome, LicenseManager, TrialState};
use checkwright_cli::{
    entitlement_label, outcome_json, outcome_message, watch_interval, Cli, Command, StatusReport,
    TrialCommand,
};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let log_level = if cli.global.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = cli.global.config();
    let manager = Arc::new(
        LicenseManager::from_config(&config).context("Failed to open the license store")?,
    );
    let json = cli.global.json;

    let ok = match cli.command {
        Command::Status => {
            let report = StatusReport::collect(&manager);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
            report.entitled
        }
        Command::Activate { key } => {
            let outcome = manager.activate(&key).await.context("Activation failed")?;
            report_outcome(&outcome, json)
        }
        Command::Transfer { key } => {
            let outcome = manager.transfer(&key).await.context("Transfer failed")?;
            report_outcome(&outcome, json)
        }
        Command::Import { file } => {
            let bytes = fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let outcome = manager
                .import_license_file(&bytes)
                .await
                .context("Import failed")?;
            report_outcome(&outcome, json)
        }
        Command::Trial {
            command: TrialCommand::Start { key },
        } => {
            let record = manager.start_trial(&key).context("Could not start the trial")?;
            let expires_at = record.expires_at(manager.trial().duration());
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "trial": "active", "expires_at": expires_at.to_rfc3339() })
                );
            } else {
                println!("Trial started, ends {}", expires_at.to_rfc3339());
            }
            true
        }
        Command::Trial {
            command: TrialCommand::Status,
        } => {
            let license = manager.store().get();
            let state = manager.trial().state(license.as_ref());
            let (label, expires_at) = match &state {
                TrialState::NoTrial => ("none", None),
                TrialState::Active { expires_at } => ("active", Some(expires_at.to_rfc3339())),
                TrialState::Expired => ("expired", None),
                TrialState::Converted => ("converted", None),
            };
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "trial": label, "expires_at": expires_at })
                );
            } else {
                match expires_at {
                    Some(at) => println!("Trial {label}, ends {at}"),
                    None => println!("Trial {label}"),
                }
            }
            state.is_active()
        }
        Command::Remove => {
            manager.remove_license().await.context("Failed to remove license")?;
            println!("License removed");
            true
        }
        Command::Watch { interval_secs } => {
            watch(&manager, watch_interval(interval_secs, &config)).await?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn report_outcome(outcome: &ActivationOutcome, json: bool) -> bool {
    if json {
        println!("{}", outcome_json(outcome));
    } else {
        println!("{}", outcome_message(outcome));
    }
    outcome.is_activated()
}

async fn watch(manager: &Arc<LicenseManager>, interval: Duration) -> Result<()> {
    let mut watch = manager.watch(interval);
    println!("{}", entitlement_label(&watch.current()));
    info!("Watching entitlement every {}s, Ctrl-C to stop", interval.as_secs());

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            next = watch.changed() => match next {
                Some(entitlement) => println!("{}", entitlement_label(&entitlement)),
                None => break,
            },
        }
    }

    watch.cancel();
    Ok(())
}
