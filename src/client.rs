//! Inference Client (C4).
//!
//! A thin one-shot TCP client: connect, write the JSON request, shut down the
//! write half, read until EOF, parse. No connection pooling and no retry
//! logic live here — each round gets at most one attempt, and the caller
//! (C7) decides what a failure means for that round.

use crate::daemon::protocol::{DaemonRequest, DaemonResponse, DaemonStatus};
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Short timeout for a liveness probe; long timeout for an actual generation
/// call. Both are bounded — a round must never block indefinitely on the
/// daemon.
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    pub ping: Duration,
    pub generate: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            ping: Duration::from_secs(5),
            generate: Duration::from_secs(120),
        }
    }
}

/// Tri-state daemon liveness as observed by the client: a daemon can be
/// reachable and ready, reachable but still loading its model, or entirely
/// unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Ready,
    Loading,
    Unreachable,
}

pub struct InferenceClient {
    addr: SocketAddr,
    timeouts: ClientTimeouts,
}

impl InferenceClient {
    pub fn new(addr: SocketAddr, timeouts: ClientTimeouts) -> Self {
        Self { addr, timeouts }
    }

    /// Probe daemon liveness. A connection failure is classified as
    /// `Unreachable` rather than propagated as an error — callers fold this
    /// together with the supervisor's pid-liveness signal to decide whether
    /// the daemon needs to be (re)spawned this round.
    pub async fn ping(&self) -> Liveness {
        match self.call(DaemonRequest::Ping, self.timeouts.ping).await {
            Ok(DaemonResponse::Pong { status, .. }) => match status {
                DaemonStatus::Ready => Liveness::Ready,
                DaemonStatus::Loading => Liveness::Loading,
                DaemonStatus::Error => Liveness::Unreachable,
            },
            _ => Liveness::Unreachable,
        }
    }

    pub async fn create_game(&self, prompt: String) -> Result<String> {
        match self
            .call(DaemonRequest::CreateGame { prompt }, self.timeouts.generate)
            .await?
        {
            DaemonResponse::CreateGame { narrative } => Ok(narrative),
            DaemonResponse::Error { message } => Err(Error::DaemonUnavailable(message)),
            other => Err(Error::MalformedOutput(format!("unexpected response: {other:?}"))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn player_action(
        &self,
        game_id: String,
        action: String,
        old_state: String,
        world: String,
        continue_conversation: bool,
    ) -> Result<String> {
        let request = DaemonRequest::PlayerAction {
            game_id,
            action,
            old_state,
            world,
            continue_conversation,
        };
        match self.call(request, self.timeouts.generate).await? {
            DaemonResponse::PlayerAction { raw_output } => Ok(raw_output),
            DaemonResponse::Error { message } => Err(Error::DaemonUnavailable(message)),
            other => Err(Error::MalformedOutput(format!("unexpected response: {other:?}"))),
        }
    }

    pub async fn reset_conversation(&self) -> Result<()> {
        match self
            .call(DaemonRequest::ResetConversation, self.timeouts.ping)
            .await?
        {
            DaemonResponse::ConversationReset { .. } => Ok(()),
            other => Err(Error::MalformedOutput(format!("unexpected response: {other:?}"))),
        }
    }

    pub async fn validate(&self, statement: String) -> Result<(bool, f64)> {
        match self
            .call(DaemonRequest::Validate { statement }, self.timeouts.generate)
            .await?
        {
            DaemonResponse::Validate { valid, confidence, .. } => Ok((valid, confidence)),
            DaemonResponse::Error { message } => Err(Error::DaemonUnavailable(message)),
            other => Err(Error::MalformedOutput(format!("unexpected response: {other:?}"))),
        }
    }

    async fn call(&self, request: DaemonRequest, budget: Duration) -> Result<DaemonResponse> {
        timeout(budget, self.call_inner(request))
            .await
            .map_err(|_| Error::Timeout(budget))?
    }

    async fn call_inner(&self, request: DaemonRequest) -> Result<DaemonResponse> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| Error::DaemonUnavailable(format!("connect to {}: {e}", self.addr)))?;

        let body = serde_json::to_vec(&request)?;
        stream.write_all(&body).await?;
        stream.shutdown().await?;

        let mut response_bytes = Vec::new();
        stream.read_to_end(&mut response_bytes).await?;

        serde_json::from_slice(&response_bytes)
            .map_err(|e| Error::MalformedOutput(format!("undecodable daemon response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::backend::EchoBackend;
    use crate::daemon::{self, ConversationPolicy, DaemonState};
    use std::sync::Arc;

    async fn spawn_echo_daemon() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(DaemonState::new(
            Arc::new(EchoBackend::default()),
            ConversationPolicy::Stateless,
        ));
        tokio::spawn(async move {
            daemon::serve_listener(listener, state).await.ok();
        });
        addr
    }

    #[tokio::test]
    async fn ping_reports_ready_against_live_daemon() {
        let addr = spawn_echo_daemon().await;
        let client = InferenceClient::new(addr, ClientTimeouts::default());
        assert_eq!(client.ping().await, Liveness::Ready);
    }

    #[tokio::test]
    async fn ping_reports_unreachable_against_closed_port() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let client = InferenceClient::new(
            addr,
            ClientTimeouts {
                ping: Duration::from_millis(200),
                generate: Duration::from_millis(200),
            },
        );
        assert_eq!(client.ping().await, Liveness::Unreachable);
    }

    #[tokio::test]
    async fn create_game_round_trips_through_live_daemon() {
        let addr = spawn_echo_daemon().await;
        let client = InferenceClient::new(addr, ClientTimeouts::default());
        let narrative = client.create_game("a cave".to_string()).await.unwrap();
        assert!(narrative.contains("Game Title"));
    }
}
