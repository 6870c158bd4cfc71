//! Incident engine daemon.
//!
//! Runs the webhook intake server and the escalation/reminder sweeper from a
//! single JSON bootstrap file describing the organization, alert rules,
//! escalation policies, and notification channels.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use incidentd::alert::fingerprint::FingerprintStore;
use incidentd::alert::rules::{AlertRule, RuleSet};
use incidentd::escalation::{EscalationLog, EscalationPolicy, PolicySet};
use incidentd::incident::orchestrator::Orchestrator;
use incidentd::incident::warroom::DisabledWarRoom;
use incidentd::org::{Directory, ImpactScope, OnCallShift, Responder, Service, Team};
use incidentd::server::{run_server, AppState};
use incidentd::{AlertIngestor, EngineConfig, EscalationEngine, IncidentStore, Router, Sweeper};
use notify::{build_channel, ChannelConfig, ChannelSet, DispatchConfig, Dispatcher};

/// Incident engine - alert intake, deduplication, escalation and routing
#[derive(Parser)]
#[command(name = "incidentd")]
#[command(about = "Incident engine - alert intake, deduplication, escalation and routing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the bootstrap JSON (teams, services, rules, policies, channels)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook intake server and the background sweeper
    Serve {
        /// Bind address for the webhook server
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,

        /// Seconds between escalation/reminder sweep passes
        #[arg(long, default_value = "60")]
        sweep_interval: u64,

        /// Default suppression window for duplicate alerts, in minutes
        #[arg(long, default_value = "5")]
        suppress_minutes: u64,

        /// Minutes before the first unacknowledged-incident reminder
        #[arg(long, default_value = "10")]
        reminder_threshold: i64,
    },
    /// Validate the bootstrap configuration and exit
    Check,
}

/// Bootstrap file contents.
#[derive(Debug, Default, Deserialize)]
struct Bootstrap {
    #[serde(default)]
    responders: Vec<Responder>,
    #[serde(default)]
    teams: Vec<Team>,
    #[serde(default)]
    services: Vec<Service>,
    #[serde(default)]
    scopes: Vec<ImpactScope>,
    #[serde(default)]
    shifts: Vec<OnCallShift>,
    #[serde(default)]
    rules: Vec<AlertRule>,
    #[serde(default)]
    policies: Vec<EscalationPolicy>,
    #[serde(default)]
    channels: Vec<ChannelSpec>,
}

/// One notification channel entry in the bootstrap file.
#[derive(Debug, Deserialize)]
struct ChannelSpec {
    /// Channel type: slack, smtp, ovh_sms, webhook
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: ChannelConfig,
}

impl Bootstrap {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bootstrap file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse bootstrap file {}", path.display()))
    }

    fn directory(&self) -> Directory {
        let mut directory = Directory::new();
        for responder in &self.responders {
            directory.add_responder(responder.clone());
        }
        for team in &self.teams {
            directory.add_team(team.clone());
        }
        for service in &self.services {
            directory.add_service(service.clone());
        }
        for scope in &self.scopes {
            directory.add_scope(scope.clone());
        }
        for shift in &self.shifts {
            directory.add_shift(shift.clone());
        }
        directory
    }

    fn channel_set(&self) -> Result<ChannelSet> {
        let mut channels = ChannelSet::new();
        for spec in &self.channels {
            let channel = build_channel(&spec.kind, &spec.config)
                .with_context(|| format!("Failed to build '{}' channel", spec.kind))?;
            info!(channel = channel.name(), "Notification channel configured");
            channels.insert(channel);
        }
        Ok(channels)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "incidentd=debug,notify=debug,tower_http=debug"
    } else {
        "incidentd=info,notify=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            addr,
            sweep_interval,
            suppress_minutes,
            reminder_threshold,
        } => {
            let config = EngineConfig {
                suppress_duplicates_minutes: suppress_minutes,
                escalation_sweep_interval: std::time::Duration::from_secs(sweep_interval),
                reminder_threshold_minutes: reminder_threshold,
                ..EngineConfig::default()
            };
            serve(&cli.config, config, &addr).await
        }
        Commands::Check => check(&cli.config),
    }
}

async fn serve(bootstrap_path: &Option<PathBuf>, config: EngineConfig, addr: &str) -> Result<()> {
    let bootstrap = Bootstrap::load(bootstrap_path.as_ref())?;

    let directory = Arc::new(bootstrap.directory());
    let rules = Arc::new(RuleSet::new(bootstrap.rules.clone()).context("Invalid alert rules")?);
    let policies = Arc::new(PolicySet::new(bootstrap.policies.clone()));
    let channels = bootstrap.channel_set()?;
    if channels.is_empty() {
        info!("No notification channels configured");
    }

    let store = Arc::new(IncidentStore::new());
    let fingerprints = Arc::new(FingerprintStore::new());
    let escalations = Arc::new(EscalationLog::new());
    let war_room = Arc::new(DisabledWarRoom);
    let dispatcher = Dispatcher::new(DispatchConfig::default());

    let router = Arc::new(Router::new(
        channels,
        dispatcher,
        Arc::clone(&directory),
        Arc::clone(&store),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        Arc::clone(&router),
        war_room.clone(),
        Arc::clone(&escalations),
        config.clone(),
    ));
    let engine = EscalationEngine::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        policies,
        escalations,
        Arc::clone(&router),
        config.clone(),
    );
    let ingestor = Arc::new(AlertIngestor::new(
        fingerprints,
        rules,
        orchestrator,
        directory,
        config.clone(),
    ));

    let sweeper = Sweeper::new(engine, router, store, war_room, config);
    tokio::spawn(sweeper.run());

    run_server(Arc::new(AppState { ingestor }), addr).await
}

fn check(bootstrap_path: &Option<PathBuf>) -> Result<()> {
    let bootstrap = Bootstrap::load(bootstrap_path.as_ref())?;

    RuleSet::new(bootstrap.rules.clone()).context("Invalid alert rules")?;
    bootstrap.channel_set()?;

    println!("{} bootstrap configuration is valid", "OK".green().bold());
    println!("  responders: {}", bootstrap.responders.len());
    println!("  teams:      {}", bootstrap.teams.len());
    println!("  services:   {}", bootstrap.services.len());
    println!("  scopes:     {}", bootstrap.scopes.len());
    println!("  shifts:     {}", bootstrap.shifts.len());
    println!("  rules:      {}", bootstrap.rules.len());
    println!("  policies:   {}", bootstrap.policies.len());
    println!("  channels:   {}", bootstrap.channels.len());
    Ok(())
}
