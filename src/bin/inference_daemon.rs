//! The out-of-process Inference Daemon binary (C2).
//!
//! Spawned and adopted by the Daemon Supervisor (C3), never by this crate's
//! own orchestrator process directly. Two roles share this binary: `game`
//! (persistent conversation context, player-action sampling) and `jury`
//! (stateless, binary-validator sampling); `--role` selects which. Binds its
//! listening socket and writes its own PID file before the backend finishes
//! loading, so `ping` can answer `loading` in the meantime (§4.2).

use ai_jury_contract_core::daemon::backend::EchoBackend;
use ai_jury_contract_core::daemon::{serve_listener, ConversationPolicy, DaemonState};
use ai_jury_contract_core::logging;
use ai_jury_contract_core::supervisor::write_pid_file;
use ai_jury_contract_core::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Game,
    Jury,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "AI jury contract core inference daemon", long_about = None)]
struct Args {
    #[arg(long, value_enum)]
    role: Role,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long)]
    port: u16,

    #[arg(long, default_value = "./game_data")]
    pid_dir: PathBuf,

    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.verbosity);

    let policy = match args.role {
        Role::Game => ConversationPolicy::Persistent,
        Role::Jury => ConversationPolicy::Stateless,
    };

    // The actual llama-family backend wiring is out of scope (§1); this
    // binary ships with the deterministic EchoBackend so the rest of the
    // pipeline is exercisable end-to-end without a multi-gigabyte model.
    let state = Arc::new(DaemonState::new(Arc::new(EchoBackend::default()), policy));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(role = ?args.role, %addr, "inference daemon bound");

    let pid_file = args.pid_dir.join(match args.role {
        Role::Game => "ai_daemon.pid",
        Role::Jury => "ai_jury_daemon.pid",
    });
    tokio::fs::create_dir_all(&args.pid_dir).await?;
    write_pid_file(&pid_file, std::process::id()).await?;

    serve_listener(listener, state).await
}
