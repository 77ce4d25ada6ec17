//! `cohortctl` - CLI for cohort
//!
//! This binary runs the registry API server and drives the client-side
//! operations: participant management, offline sync and diagnostics.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use cohort::cli::{
    Cli, Command, ConfigCommand, OutputFormat, ParticipantCommand, ServeCommand, StatusCommand,
};
use cohort::client::{self, ApiClient, OfflineStore};
use cohort::storage::{ParticipantQuery, DEFAULT_LIMIT};
use cohort::{
    init_logging, server, Config, Diagnostic, NewParticipant, Participant, ParticipantStatus,
    Registry, Source, Storage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Loaded per command: `config` subcommands must work with a broken file.
    let load_config = || Config::load_from(cli.config.clone());

    match cli.command {
        Command::Serve(cmd) => handle_serve(load_config()?, cmd).await,
        Command::Participant(cmd) => handle_participant(&load_config()?, cmd).await,
        Command::Sync => handle_sync(&load_config()?).await,
        Command::Diagnose(cmd) => {
            handle_diagnose(&load_config()?, cmd.json, cmd.url.as_deref()).await
        }
        Command::Status(cmd) => handle_status(&load_config()?, &cmd).await,
        Command::Config(cmd) => handle_config(cli.config.clone(), cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let path = config.database_path();
    let storage = Storage::open(&path)
        .with_context(|| format!("opening database {}", path.display()))?;
    server::serve(&config.server, Registry::new(storage)).await?;
    Ok(())
}

async fn handle_participant(config: &Config, cmd: ParticipantCommand) -> anyhow::Result<()> {
    let mut service = client::service_from_config(config)?;

    match cmd {
        ParticipantCommand::List {
            search,
            status,
            limit,
            format,
        } => {
            let query = ParticipantQuery {
                search,
                status: status.map(ParticipantStatus::from),
                limit,
                offset: 0,
            };
            let result = service.list(&query).await?;
            print_participants(&result.value, format)?;
            note_source(result.source);
        }
        ParticipantCommand::Show { id, json } => {
            let result = service.get(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result.value)?);
            } else {
                print_participant(&result.value);
            }
            note_source(result.source);
        }
        ParticipantCommand::Add {
            first_name,
            last_name,
            email,
            phone,
            company,
        } => {
            let input = NewParticipant {
                first_name,
                last_name,
                email,
                phone,
                company,
                status: ParticipantStatus::Active,
            };
            let result = service.create(input).await?;
            println!("Registered {} ({})", result.value.full_name(), result.value.id);
            note_source(result.source);
        }
        ParticipantCommand::Remove { id } => {
            let source = service.delete(&id).await?;
            println!("Removed {id}");
            note_source(source);
        }
        ParticipantCommand::Export { file } => {
            let mut all = Vec::new();
            let mut query = ParticipantQuery::default();
            loop {
                let page = service.list(&query).await?;
                let done = page.value.len() < DEFAULT_LIMIT;
                all.extend(page.value);
                if done {
                    break;
                }
                query.offset += DEFAULT_LIMIT;
            }
            fs::write(&file, serde_json::to_vec_pretty(&all)?)
                .with_context(|| format!("writing {}", file.display()))?;
            println!("Exported {} participants to {}", all.len(), file.display());
        }
        ParticipantCommand::Import { file } => {
            let data =
                fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let participants: Vec<Participant> = serde_json::from_slice(&data)
                .with_context(|| format!("parsing {}", file.display()))?;
            if let Some(p) = participants.iter().find(|p| p.id.is_empty()) {
                bail!("participant {} has no id", p.email);
            }
            let total = participants.len();
            let mut offline = 0;
            for participant in participants {
                if service.replace(participant).await?.source == Source::Offline {
                    offline += 1;
                }
            }
            println!("Imported {total} participants from {}", file.display());
            if offline > 0 {
                println!("{offline} stored offline; run `cohortctl sync` when the API is back");
            }
        }
    }
    Ok(())
}

async fn handle_sync(config: &Config) -> anyhow::Result<()> {
    let mut service = client::service_from_config(config)?;
    if !service.offline().has_changes() {
        println!("Nothing to sync.");
        return Ok(());
    }

    let report = service.sync().await?;
    println!(
        "Pushed {} participants, deleted {}.",
        report.pushed, report.deleted
    );
    for (id, reason) in &report.failed {
        println!("  {id}: {reason}");
    }
    if !report.is_complete() {
        bail!("{} changes could not be synced", report.failed.len());
    }
    Ok(())
}

async fn handle_diagnose(config: &Config, json: bool, url: Option<&str>) -> anyhow::Result<()> {
    let diagnostic = Diagnostic::from_config(config, url)?;
    let report = diagnostic.run(&config.diagnostic.endpoints).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    if !report.healthy() {
        bail!("{} endpoint checks failed", report.failed);
    }
    Ok(())
}

async fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let api = ApiClient::from_config(&config.client)?;
    let health = api.health().await;
    let offline = OfflineStore::open(config.offline_path())?;

    if cmd.json {
        let status = serde_json::json!({
            "api_url": api.base_url(),
            "api_reachable": health.is_ok(),
            "api": health.as_ref().ok(),
            "api_error": health.as_ref().err().map(ToString::to_string),
            "offline_path": offline.path(),
            "offline_participants": offline.participants().len(),
            "pending_changes": offline.pending().len(),
            "pending_deletions": offline.tombstones().len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("cohortctl status");
        println!("----------------");
        println!("API:           {}", api.base_url());
        match &health {
            Ok(health) => println!(
                "Reachable:     yes (v{}, {} participants)",
                health.version, health.participants
            ),
            Err(e) => println!("Reachable:     no ({e})"),
        }
        println!("Offline store: {}", offline.path().display());
        println!("  Cached:      {}", offline.participants().len());
        println!("  Pending:     {}", offline.pending().len());
        println!("  Deletions:   {}", offline.tombstones().len());
    }
    Ok(())
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = &Config::load_from(path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.bind_address());
                println!("  CORS origins:       {}", cors_summary(&config.server.cors_origins));
                println!("  Max body bytes:     {}", config.server.max_body_bytes);
                println!();
                println!("[Client]");
                println!("  API URL:            {}", config.client.api_url);
                println!("  Timeout (ms):       {}", config.client.timeout_ms);
                println!("  Offline fallback:   {}", config.client.offline_fallback);
                println!("  Offline path:       {}", config.offline_path().display());
                println!();
                println!("[Diagnostic]");
                println!("  Endpoints:          {}", config.diagnostic.endpoints.len());
                println!("  Timeout (ms):       {}", config.diagnostic.timeout_ms);
                println!("  Stop on failure:    {}", config.diagnostic.stop_on_failure);
            }
        }
        ConfigCommand::Path => {
            let path = path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn cors_summary(origins: &[String]) -> String {
    if origins.is_empty() {
        "any".to_string()
    } else {
        origins.join(", ")
    }
}

fn print_participants(participants: &[Participant], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(participants)?),
        OutputFormat::Plain => {
            for p in participants {
                println!("{}\t{}\t{}\t{}", p.id, p.full_name(), p.email, p.status);
            }
        }
        OutputFormat::Table => {
            let name_width = participants
                .iter()
                .map(|p| p.full_name().len())
                .max()
                .unwrap_or(0)
                .max("NAME".len());
            println!("{:<36}  {:<name_width$}  {:<9}  EMAIL", "ID", "NAME", "STATUS");
            for p in participants {
                println!(
                    "{:<36}  {:<name_width$}  {:<9}  {}",
                    p.id,
                    p.full_name(),
                    p.status.to_string(),
                    p.email
                );
            }
            println!();
            println!("{} participants", participants.len());
        }
    }
    Ok(())
}

fn print_participant(p: &Participant) {
    let progress = p.progress();
    println!("{} <{}>", p.full_name(), p.email);
    println!("  Id:            {}", p.id);
    println!("  Status:        {}", p.status);
    if let Some(phone) = &p.phone {
        println!("  Phone:         {phone}");
    }
    if let Some(company) = &p.company {
        println!("  Company:       {company}");
    }
    println!(
        "  Formations:    {} ({} of {} sessions completed, {}%)",
        progress.formations, progress.completed_sessions, progress.sessions, progress.percent
    );
    println!("  Projects:      {}", p.projects.len());
    println!("  Resources:     {}", p.coaching_resources.len());
    println!(
        "  Notifications: {} ({} unread)",
        p.notifications.len(),
        p.unread_notifications()
    );
    println!("  Updated:       {}", p.updated_at.to_rfc3339());
}

fn note_source(source: Source) {
    if source == Source::Offline {
        eprintln!("(API unreachable: served from the offline store)");
    }
}
