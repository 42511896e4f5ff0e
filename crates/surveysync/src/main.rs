//! `surveysync` - CLI for the offline-first survey pipeline
//!
//! Submits surveys, drains the pending queue and reports its status.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use surveysync::cli::{Cli, Command, ConfigCommand, ListCommand, OutputFormat, SubmitCommand};
use surveysync::session::CONSENT_FIELDS;
use surveysync::status::{connection_label, pending_badge, synced_message};
use surveysync::{
    init_logging, Config, Pipeline, StatusEvent, SubmissionOutcome, SurveyPayload, SurveySession,
};

#[cfg(target_os = "linux")]
fn platform_name() -> &'static str {
    surveysync_linux::platform_name()
}

#[cfg(not(target_os = "linux"))]
fn platform_name() -> &'static str {
    std::env::consts::OS
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    if let Command::Config(config_cmd) = cli.command {
        return handle_config(cli.config, config_cmd);
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;
    let pipeline = Pipeline::from_config(&config).context("failed to start pipeline")?;

    match cli.command {
        Command::Submit(cmd) => handle_submit(&pipeline, &cmd).await,
        Command::Sync(cmd) => handle_sync(&pipeline, cmd.json).await,
        Command::Watch => handle_watch(&pipeline).await,
        Command::Status(cmd) => handle_status(&config, &pipeline, cmd.json),
        Command::List(cmd) => handle_list(&pipeline, &cmd),
        Command::Remove(cmd) => {
            if pipeline.queue().remove(cmd.id)? {
                println!("Removed pending survey {}", cmd.id);
            } else {
                println!("No pending survey with id {}", cmd.id);
            }
            Ok(())
        }
        Command::Config(_) => Ok(()),
    }
}

/// Read an annotation file: a JSON array of items, or a single item.
fn read_annotations(path: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

fn build_payload(cmd: &SubmitCommand) -> anyhow::Result<SurveyPayload> {
    let raw = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;
    let fields = SurveyPayload::from_json(&raw)?;

    let mut required: Vec<&str> = cmd.require.iter().map(String::as_str).collect();
    if cmd.require_consent {
        required.extend(CONSENT_FIELDS);
    }
    SurveySession::validate(&fields, &required)?;

    let mut session = SurveySession::new(cmd.language.into());
    if let Some(path) = &cmd.places {
        read_annotations(path)?
            .into_iter()
            .for_each(|place| session.add_place(place));
    }
    if let Some(path) = &cmd.drawings {
        read_annotations(path)?
            .into_iter()
            .for_each(|drawing| session.add_drawing(drawing));
    }
    if let Some(path) = &cmd.encounters {
        read_annotations(path)?
            .into_iter()
            .for_each(|encounter| session.add_encounter(encounter));
    }

    Ok(session.collect(fields)?)
}

async fn handle_submit(pipeline: &Pipeline, cmd: &SubmitCommand) -> anyhow::Result<()> {
    let payload = build_payload(cmd)?;

    match pipeline.client().submit_survey(&payload).await {
        Ok(receipt) => {
            println!("{}", receipt.outcome());
            if let Some(id) = receipt.pending_id {
                println!("Pending id: {id}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", SubmissionOutcome::Failed);
            Err(e.into())
        }
    }
}

async fn handle_sync(pipeline: &Pipeline, json: bool) -> anyhow::Result<()> {
    let report = pipeline.engine().sync_all().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.offline {
        println!("{}", connection_label(pipeline.monitor().current()));
    } else if report.delivered > 0 {
        println!("{}", synced_message(report.delivered));
    } else if report.attempted == 0 {
        println!("Nothing to sync.");
    }
    if report.failed > 0 {
        println!("{} survey(s) still pending.", report.failed);
    }
    Ok(())
}

async fn handle_watch(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut events = pipeline.notifier().subscribe();
    let watch = pipeline.spawn_watch();

    println!("{}", connection_label(pipeline.monitor().current()));
    if let Some(badge) = pending_badge(pipeline.queue().count()?) {
        println!("{badge}");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(StatusEvent::ConnectivityChanged(state)) => println!("{}", connection_label(state)),
                Ok(StatusEvent::Synced { count }) => println!("{}", synced_message(count)),
                Ok(StatusEvent::PendingChanged { count }) => {
                    if let Some(badge) = pending_badge(count) {
                        println!("{badge}");
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    watch.shutdown().await;
    Ok(())
}

fn handle_status(config: &Config, pipeline: &Pipeline, json: bool) -> anyhow::Result<()> {
    let state = pipeline.monitor().current();
    let stats = pipeline.queue().stats()?;

    if json {
        let status = serde_json::json!({
            "platform": platform_name(),
            "connectivity": state,
            "endpoint": config.endpoint.url,
            "database_path": config.database_path(),
            "pending": stats.pending,
            "oldest_pending": stats.oldest,
            "newest_pending": stats.newest,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("surveysync status");
    println!("-----------------");
    println!("Platform:      {}", platform_name());
    println!("Connection:    {}", connection_label(state));
    println!("Endpoint:      {}", config.endpoint.url);
    println!("Database:      {}", config.database_path().display());
    println!(
        "Pending:       {}",
        pending_badge(stats.pending).unwrap_or_else(|| "none".to_string())
    );
    if let Some(oldest) = stats.oldest {
        println!("Oldest:        {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

fn handle_list(pipeline: &Pipeline, cmd: &ListCommand) -> anyhow::Result<()> {
    let pending = pipeline.queue().list_all()?;

    match cmd.format {
        OutputFormat::Json => {
            let items: Vec<Value> = pending
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id,
                        "enqueued_at": p.enqueued_at,
                        "digest": p.digest,
                        "payload": serde_json::from_str::<Value>(p.payload.as_str())
                            .unwrap_or_else(|_| Value::String(p.payload.to_string())),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Plain => {
            if pending.is_empty() {
                println!("No surveys pending.");
            }
            for p in &pending {
                println!(
                    "{:>6}  {}  {} bytes  {}",
                    p.id,
                    p.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
                    p.payload.len(),
                    &p.digest[..12.min(p.digest.len())]
                );
            }
        }
    }
    Ok(())
}

fn handle_config(path: Option<std::path::PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Endpoint]");
                println!("  URL:                {}", config.endpoint.url);
                println!("  Timeout (secs):     {}", config.endpoint.timeout_secs);
                println!();
                println!("[Connectivity]");
                println!("  Mode:               {:?}", config.connectivity.mode);
                println!("  Poll interval (ms): {}", config.connectivity.poll_interval_ms);
                println!("  Debounce (ms):      {}", config.connectivity.debounce_ms);
                println!();
                println!("[Sync]");
                println!("  Interval (secs):    {}", config.sync.interval_secs);
                println!("  On start:           {}", config.sync.on_start);
                println!("  Pipeline depth:     {}", config.sync.pipeline_depth);
                println!("  Stale after (days): {}", config.sync.stale_after_days);
            }
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                path.unwrap_or_else(Config::default_config_path).display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => anyhow::bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
