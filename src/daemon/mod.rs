//! Inference Daemon (C2).
//!
//! A long-lived, out-of-process server that owns the loaded model and serves
//! one-shot TCP connections from the Inference Client (C4). Two daemons exist
//! per node — one for game narration, one for jury validation — distinguished
//! only by which [`InferenceBackend`] and conversation policy they're started
//! with; the wire protocol and accept loop are shared.
//!
//! The accept loop binds and starts serving connections immediately, before
//! the backend finishes loading (§4.2): `ping` answers `Loading` in the
//! meantime and every other request gets [`crate::error::Error::DaemonLoading`].

pub mod backend;
pub mod protocol;

use crate::error::{Error, Result};
use backend::{InferenceBackend, PersistentContext};
use protocol::{DaemonRequest, DaemonResponse, DaemonStatus, SamplingParams};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::interval;

/// How often the heartbeat task logs backend liveness (§5).
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Whether this daemon instance holds a persistent conversation context
/// across turns (the game daemon, per §4.2.1) or treats every request as
/// independent (the jury daemon, per §4.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPolicy {
    Persistent,
    Stateless,
}

/// Shared daemon state, handed to every connection handler task.
pub struct DaemonState {
    backend: Arc<dyn InferenceBackend>,
    policy: ConversationPolicy,
    context: Mutex<Option<PersistentContext>>,
}

impl DaemonState {
    pub fn new(backend: Arc<dyn InferenceBackend>, policy: ConversationPolicy) -> Self {
        Self {
            backend,
            policy,
            context: Mutex::new(None),
        }
    }

    fn status(&self) -> DaemonStatus {
        if let Some(err) = self.backend.load_error() {
            tracing::warn!(error = %err, "daemon backend reports load error");
            DaemonStatus::Error
        } else if self.backend.is_ready() {
            DaemonStatus::Ready
        } else {
            DaemonStatus::Loading
        }
    }
}

/// Bind and serve the daemon protocol on `addr` until the process is killed.
/// Per §4.3 the supervisor never sends a graceful-shutdown signal — this loop
/// has no termination path other than the task being aborted or the process
/// exiting.
pub async fn serve(addr: impl tokio::net::ToSocketAddrs, state: Arc<DaemonState>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, state).await
}

/// Serve on an already-bound listener. Split out of [`serve`] so tests (and
/// the demo daemon binary, which needs the bound ephemeral port before
/// serving) can bind first and observe the assigned address without a
/// bind/drop/rebind race.
pub async fn serve_listener(listener: TcpListener, state: Arc<DaemonState>) -> Result<()> {
    tracing::info!(local_addr = ?listener.local_addr().ok(), "inference daemon listening");
    spawn_heartbeat(Arc::clone(&state));

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!(%peer, error = %e, "daemon connection ended with error");
            }
        });
    }
}

/// §5: "a heartbeat thread emits liveness logs" — a background task,
/// independent of request traffic, so an operator tailing logs can tell a
/// quiet-but-alive daemon from a dead one.
fn spawn_heartbeat(state: Arc<DaemonState>) {
    tokio::spawn(async move {
        let mut ticker = interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            tracing::info!(
                ready = state.backend.is_ready(),
                loading = state.backend.is_loading(),
                "inference daemon heartbeat"
            );
        }
    });
}

async fn handle_connection(mut stream: TcpStream, state: Arc<DaemonState>) -> Result<()> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;

    let response = match serde_json::from_slice::<DaemonRequest>(&buf) {
        Ok(request) => dispatch(request, &state).await,
        Err(e) => DaemonResponse::Error {
            message: format!("malformed request: {e}"),
        },
    };

    let body = serde_json::to_vec(&response).map_err(Error::Json)?;
    stream.write_all(&body).await?;
    stream.shutdown().await.ok();
    Ok(())
}

async fn dispatch(request: DaemonRequest, state: &DaemonState) -> DaemonResponse {
    match request {
        DaemonRequest::Ping => DaemonResponse::Pong {
            status: state.status(),
            model_loaded: state.backend.is_ready(),
            model_loading: state.backend.is_loading(),
            error: state.backend.load_error(),
        },
        other if state.backend.is_loading() => {
            tracing::debug!(request = ?other, "rejecting request, model still loading");
            DaemonResponse::Error {
                message: Error::DaemonLoading.to_string(),
            }
        }
        DaemonRequest::CreateGame { prompt } => handle_create_game(prompt, state).await,
        DaemonRequest::PlayerAction {
            game_id,
            action,
            old_state,
            world,
            continue_conversation,
        } => handle_player_action(game_id, action, old_state, world, continue_conversation, state).await,
        DaemonRequest::ResetConversation => {
            *state.context.lock().await = None;
            DaemonResponse::ConversationReset {
                status: "reset".to_string(),
            }
        }
        DaemonRequest::Validate { statement } => handle_validate(statement, state).await,
    }
}

async fn handle_create_game(prompt: String, state: &DaemonState) -> DaemonResponse {
    let full_prompt = backend::build_create_game_prompt(&prompt);
    match state.backend.generate(&full_prompt, SamplingParams::CREATE_GAME).await {
        Ok(narrative) => {
            if state.policy == ConversationPolicy::Persistent {
                *state.context.lock().await = Some(PersistentContext::default());
            }
            DaemonResponse::CreateGame { narrative }
        }
        Err(e) => DaemonResponse::Error {
            message: e.to_string(),
        },
    }
}

/// Implements §4.2.1: attempt continuation mode against the held persistent
/// context first; on any failure to use that context (none held, or the
/// backend rejects it), fall back to rebuilding the full initial-mode prompt
/// from `world`/`old_state` rather than failing the turn outright.
async fn handle_player_action(
    game_id: String,
    action: String,
    old_state: String,
    world: String,
    continue_conversation: bool,
    state: &DaemonState,
) -> DaemonResponse {
    let attempt_continuation =
        continue_conversation && state.policy == ConversationPolicy::Persistent;

    if attempt_continuation {
        let has_context = state.context.lock().await.is_some();
        if has_context {
            let prompt = backend::build_continuation_player_prompt(&action);
            match state.backend.generate(&prompt, SamplingParams::PLAYER_ACTION).await {
                Ok(raw_output) => return DaemonResponse::PlayerAction { raw_output },
                Err(e) => tracing::warn!(
                    %game_id,
                    error = %e,
                    "continuation-mode generation failed, falling back to initial mode"
                ),
            }
        }
    }

    let prompt = backend::build_initial_player_prompt(&world, &old_state, &action);
    match state.backend.generate(&prompt, SamplingParams::PLAYER_ACTION).await {
        Ok(raw_output) => {
            if state.policy == ConversationPolicy::Persistent {
                *state.context.lock().await = Some(PersistentContext::default());
            }
            DaemonResponse::PlayerAction { raw_output }
        }
        Err(e) => DaemonResponse::Error {
            message: e.to_string(),
        },
    }
}

async fn handle_validate(statement: String, state: &DaemonState) -> DaemonResponse {
    let prompt = backend::build_validator_prompt(&statement);
    match state.backend.generate(&prompt, SamplingParams::VALIDATE).await {
        Ok(raw_response) => {
            let (valid, confidence) = backend::parse_validator_response(&raw_response);
            DaemonResponse::Validate {
                valid,
                confidence,
                raw_response,
            }
        }
        Err(e) => DaemonResponse::Error {
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::EchoBackend;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpStream as ClientStream;

    async fn spawn_test_daemon(policy: ConversationPolicy) -> std::net::SocketAddr {
        let state = Arc::new(DaemonState::new(Arc::new(EchoBackend::default()), policy));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let state = Arc::clone(&state);
                tokio::spawn(handle_connection(stream, state));
            }
        });
        addr
    }

    async fn roundtrip(addr: std::net::SocketAddr, request: &DaemonRequest) -> DaemonResponse {
        let mut stream = ClientStream::connect(addr).await.unwrap();
        let body = serde_json::to_vec(request).unwrap();
        stream.write_all(&body).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    #[tokio::test]
    async fn ping_reports_ready_for_echo_backend() {
        let addr = spawn_test_daemon(ConversationPolicy::Stateless).await;
        let response = roundtrip(addr, &DaemonRequest::Ping).await;
        match response {
            DaemonResponse::Pong { status, model_loaded, .. } => {
                assert_eq!(status, DaemonStatus::Ready);
                assert!(model_loaded);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_game_returns_narrative() {
        let addr = spawn_test_daemon(ConversationPolicy::Stateless).await;
        let response = roundtrip(
            addr,
            &DaemonRequest::CreateGame {
                prompt: "a cave".to_string(),
            },
        )
        .await;
        assert!(matches!(response, DaemonResponse::CreateGame { .. }));
    }

    #[tokio::test]
    async fn player_action_returns_parseable_state_block() {
        let addr = spawn_test_daemon(ConversationPolicy::Persistent).await;
        let response = roundtrip(
            addr,
            &DaemonRequest::PlayerAction {
                game_id: "g1".to_string(),
                action: "go north".to_string(),
                old_state: "Current Situation: start".to_string(),
                world: "World Description: test".to_string(),
                continue_conversation: false,
            },
        )
        .await;
        match response {
            DaemonResponse::PlayerAction { raw_output } => {
                assert!(crate::state_block::extract_state_block(&raw_output).is_some());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_returns_high_confidence_for_yes() {
        let addr = spawn_test_daemon(ConversationPolicy::Stateless).await;
        let response = roundtrip(
            addr,
            &DaemonRequest::Validate {
                statement: "does this hold?".to_string(),
            },
        )
        .await;
        match response {
            DaemonResponse::Validate { valid, confidence, .. } => {
                assert!(valid);
                assert_eq!(confidence, 1.0);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_conversation_clears_context() {
        let addr = spawn_test_daemon(ConversationPolicy::Persistent).await;
        let response = roundtrip(addr, &DaemonRequest::ResetConversation).await;
        assert!(matches!(response, DaemonResponse::ConversationReset { .. }));
    }
}
