//! Contract core node entrypoint.
//!
//! This binary wires the eight components together and drives them from
//! stdin as a minimal stand-in for the contract host's round loop: the real
//! host (round scheduling, user I/O batching, the NPL transport) is an
//! external collaborator this crate only ever sees through the
//! `RoundContext`/`NplBroadcast` trait seams. Each line of stdin is one JSON
//! request; a reply is written to stdout as one JSON line.

use ai_jury_contract_core::client::{ClientTimeouts, InferenceClient};
use ai_jury_contract_core::config::Config;
use ai_jury_contract_core::jury::{AiJury, DecisionEngine};
use ai_jury_contract_core::logging;
use ai_jury_contract_core::nft::NftTrigger;
use ai_jury_contract_core::orchestrator::{ContractOrchestrator, SimpleRound};
use ai_jury_contract_core::provisioner::{ModelProvisioner, ModelSpec};
use ai_jury_contract_core::store::GameStateStore;
use ai_jury_contract_core::supervisor::DaemonSupervisor;
use ai_jury_contract_core::wire;
use ai_jury_contract_core::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "AI jury contract core node", long_about = None)]
struct Args {
    /// Path to the TOML config file; defaults are used if absent.
    #[arg(short, long, default_value = "contract.toml")]
    config: PathBuf,

    /// Tracing verbosity (overridden by RUST_LOG if set).
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

#[derive(serde::Deserialize)]
struct StdinEnvelope {
    user: String,
    request_index: u64,
    readonly: bool,
    message: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.verbosity);

    let config = Config::load(&args.config)?;
    tracing::info!(?config, "loaded configuration");

    let game_pid_file = config.daemon.pid_dir.join("ai_daemon.pid");
    let jury_pid_file = config.daemon.pid_dir.join("ai_jury_daemon.pid");

    let game_supervisor = DaemonSupervisor::new(
        &game_pid_file,
        &config.daemon.daemon_binary,
        vec!["--role".to_string(), "game".to_string(), "--port".to_string(), config.daemon.game_port.to_string()],
    )
    .with_spawn_settle(config.daemon.spawn_settle);
    let jury_supervisor = DaemonSupervisor::new(
        &jury_pid_file,
        &config.daemon.daemon_binary,
        vec!["--role".to_string(), "jury".to_string(), "--port".to_string(), config.daemon.jury_port.to_string()],
    )
    .with_spawn_settle(config.daemon.spawn_settle);

    let timeouts = ClientTimeouts {
        ping: config.daemon.ping_timeout,
        generate: config.daemon.generation_timeout,
    };
    let game_addr: SocketAddr = format!("{}:{}", config.daemon.host, config.daemon.game_port).parse()
        .map_err(|e| ai_jury_contract_core::Error::Config(format!("invalid daemon host/port: {e}")))?;
    let jury_addr: SocketAddr = format!("{}:{}", config.daemon.host, config.daemon.jury_port).parse()
        .map_err(|e| ai_jury_contract_core::Error::Config(format!("invalid daemon host/port: {e}")))?;

    let game_client = InferenceClient::new(game_addr, timeouts);
    let jury_client = InferenceClient::new(jury_addr, timeouts);
    let jury_engine = DecisionEngine::new(jury_client, "local-node".to_string());
    let jury = AiJury::new(config.jury.peer_count);

    let store = GameStateStore::new(&config.store.data_dir).await?;
    let nft = NftTrigger::new(&config.store.data_dir, None);

    let provisioner = ModelProvisioner::new(&config.provisioner.model_dir);
    let model_spec = (config.provisioner.model_size > 0).then(|| ModelSpec {
        name: config.provisioner.model_name.clone(),
        size: config.provisioner.model_size,
        sha256: config.provisioner.model_sha256.clone(),
        source_url: config.provisioner.model_source_url.clone(),
        chunk_size: config.provisioner.chunk_size,
    });

    let orchestrator = ContractOrchestrator::new(
        store,
        game_client,
        jury_engine,
        jury,
        nft,
        config.provisioner.model_dir.display().to_string(),
    );

    tracing::info!("contract core ready, reading requests from stdin");
    let stdin = io::stdin();
    let stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        // §4.3: the supervisor's liveness-check-and-respawn algorithm runs
        // once per round, not just at process startup, so a daemon that dies
        // mid-session is respawned on the very next round rather than leaving
        // every subsequent request failing against a dead process.
        match game_supervisor.ensure_running().await {
            Ok(liveness) => tracing::debug!(?liveness, "game daemon liveness"),
            Err(e) => tracing::warn!(error = %e, "game daemon supervisor failed"),
        }
        match jury_supervisor.ensure_running().await {
            Ok(liveness) => tracing::debug!(?liveness, "jury daemon liveness"),
            Err(e) => tracing::warn!(error = %e, "jury daemon supervisor failed"),
        }

        let reply = match serde_json::from_str::<StdinEnvelope>(&line) {
            Ok(envelope) => {
                if !envelope.readonly {
                    // §4.1: at most one download chunk is fetched per non-readonly round.
                    if let Some(spec) = &model_spec {
                        match provisioner.ensure_available(spec).await {
                            Ok(status) => tracing::debug!(?status, "model provisioning step"),
                            Err(e) => tracing::warn!(error = %e, "model provisioning failed"),
                        }
                    }
                }
                match wire::parse_client_message(&envelope.message) {
                    Ok(message) => {
                        let round = SimpleRound { readonly: envelope.readonly };
                        orchestrator
                            .handle(&round, &envelope.user, envelope.request_index, message, &())
                            .await
                    }
                    Err(e) => ai_jury_contract_core::orchestrator::Reply::Error {
                        error: e.to_string(),
                        received: Some(line.clone()),
                    },
                }
            }
            Err(e) => ai_jury_contract_core::orchestrator::Reply::Error {
                error: format!("malformed request: {e}"),
                received: Some(line.clone()),
            },
        };
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &reply).ok();
        writeln!(out).ok();
    }

    Ok(())
}
