//! Contract Orchestrator (C7).
//!
//! The per-round entry point: routes an incoming [`ClientMessage`] to the
//! right subsystem, enforces the read-only/consensus-requiring taxonomy
//! (§4.7), and turns each outcome into an enriched [`Reply`]. This is the one
//! place permitted to decide what becomes a user-visible reply versus a
//! silent drop (§7).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::{InferenceClient, Liveness};
use crate::error::{Error, Result};
use crate::jury::{AiJury, Decision, DecisionEngine, NplBroadcast};
use crate::nft::NftTrigger;
use crate::state_block;
use crate::store::GameStateStore;
use crate::types::{ClientMessage, GameId, PlayerActionContext, RequestIndex};

/// The host round's read-only/consensus mode. Modeled as a trait because the
/// round concept itself — CPU/wall budget, read-only vs consensus mode — is
/// owned by the contract host, not this crate (§1, §5).
pub trait RoundContext {
    fn is_readonly(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
    Stats {
        model_progress: String,
        model_path: String,
        daemon_status: String,
        model_ready: bool,
        daemon_details: String,
        total_games: usize,
    },
    GameCreated {
        game_id: GameId,
        status: String,
    },
    GamesList {
        games: Vec<GameId>,
    },
    GameState {
        game_id: GameId,
        state: String,
    },
    Consensus {
        request_id: RequestIndex,
        decision: String,
        confidence: f64,
        details: String,
        game_id: GameId,
        player_action: String,
        action_result: String,
        game_state: String,
    },
    NftMintResult {
        game_id: GameId,
        success: bool,
        readonly_mode: bool,
        detail: String,
    },
    Error {
        error: String,
        received: Option<String>,
    },
}

impl Reply {
    fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            error: message.into(),
            received: None,
        }
    }
}

pub struct ContractOrchestrator {
    store: GameStateStore,
    game_client: InferenceClient,
    jury_engine: DecisionEngine,
    jury: AiJury,
    nft: NftTrigger,
    model_dir: String,
}

impl ContractOrchestrator {
    pub fn new(
        store: GameStateStore,
        game_client: InferenceClient,
        jury_engine: DecisionEngine,
        jury: AiJury,
        nft: NftTrigger,
        model_dir: String,
    ) -> Self {
        Self {
            store,
            game_client,
            jury_engine,
            jury,
            nft,
            model_dir,
        }
    }

    pub async fn handle(
        &self,
        round: &dyn RoundContext,
        user: &str,
        request_index: RequestIndex,
        message: ClientMessage,
        npl: &dyn NplBroadcast,
    ) -> Reply {
        if round.is_readonly() && !message.readonly_ok() && !message.readonly_round_only() {
            return Reply::error(format!(
                "{message:?} is not permitted in a read-only round"
            ));
        }
        if !round.is_readonly() && message.readonly_round_only() {
            return Reply::error("mint_nft may only be requested in a read-only round");
        }

        match message {
            ClientMessage::Stat => self.handle_stat().await,
            ClientMessage::CreateGame { prompt } => self.handle_create_game(user, prompt).await,
            ClientMessage::ListGames => self.handle_list_games().await,
            ClientMessage::GetGameState { game_id } => self.handle_get_game_state(game_id).await,
            ClientMessage::PlayerAction {
                game_id,
                action,
                continue_conversation,
            } => {
                self.handle_player_action(request_index, game_id, action, continue_conversation, npl)
                    .await
            }
            ClientMessage::MintNft { game_id } => self.handle_mint_nft(game_id).await,
            ClientMessage::Query { game_id, text } => {
                self.handle_query(request_index, game_id, text, npl).await
            }
        }
    }

    async fn handle_stat(&self) -> Reply {
        let liveness = self.game_client.ping().await;
        let (status, ready) = match liveness {
            Liveness::Ready => ("ready", true),
            Liveness::Loading => ("loading", false),
            Liveness::Unreachable => ("not_running", false),
        };
        let total_games = self.store.list_games().await.map(|g| g.len()).unwrap_or(0);
        Reply::Stats {
            model_progress: if ready { "complete".to_string() } else { "unknown".to_string() },
            model_path: self.model_dir.clone(),
            daemon_status: status.to_string(),
            model_ready: ready,
            daemon_details: format!("game daemon: {status}"),
            total_games,
        }
    }

    async fn handle_create_game(&self, user: &str, prompt: String) -> Reply {
        let prior_count = self.store.list_games().await.map(|g| g.len()).unwrap_or(0) as u64;
        let game_id = crate::types::generate_game_id(&prompt, user, prior_count);

        match self.game_client.create_game(prompt).await {
            Ok(narrative) => match self.store.create_game(&game_id, &narrative).await {
                Ok(()) => Reply::GameCreated {
                    game_id,
                    status: "success".to_string(),
                },
                Err(e) => Reply::error(format!("failed to persist new game: {e}")),
            },
            Err(Error::DaemonLoading) => Reply::error("AI model still loading"),
            Err(e) => Reply::error(format!("create_game failed: {e}")),
        }
    }

    async fn handle_list_games(&self) -> Reply {
        match self.store.list_games().await {
            Ok(games) => Reply::GamesList { games },
            Err(e) => Reply::error(format!("list_games failed: {e}")),
        }
    }

    async fn handle_get_game_state(&self, game_id: GameId) -> Reply {
        match self.store.load_state(&game_id).await {
            Ok(state) => Reply::GameState { game_id, state },
            Err(e) => Reply::error(format!("get_game_state failed: {e}")),
        }
    }

    async fn handle_mint_nft(&self, game_id: GameId) -> Reply {
        match self.nft.mint(&game_id).await {
            Ok(record) => Reply::NftMintResult {
                game_id,
                success: true,
                readonly_mode: true,
                detail: format!("status={:?} tx={:?}", record.status, record.mint_tx_hash),
            },
            Err(e) => Reply::NftMintResult {
                game_id,
                success: false,
                readonly_mode: true,
                detail: e.to_string(),
            },
        }
    }

    /// The player-action hot path (§4.7, MUST steps 1-7).
    async fn handle_player_action(
        &self,
        request_index: RequestIndex,
        game_id: GameId,
        action: String,
        continue_conversation: bool,
        npl: &dyn NplBroadcast,
    ) -> Reply {
        if self.game_client.ping().await == Liveness::Loading {
            // Scenario 5: reject without touching the state file at all.
            return Reply::error("AI model still loading");
        }

        let world = match self.store.load_world(&game_id).await {
            Ok(w) => w,
            Err(e) => return Reply::error(format!("unknown game: {e}")),
        };
        let old_state = match self.store.load_state(&game_id).await {
            Ok(s) => s,
            Err(e) => return Reply::error(format!("unknown game: {e}")),
        };

        let raw_output = self
            .game_client
            .player_action(
                game_id.0.clone(),
                action.clone(),
                old_state.clone(),
                world.clone(),
                continue_conversation,
            )
            .await;

        // Determine the proposed new state text and whether the output is
        // well-formed enough to even be a candidate VALID transition.
        let (candidate_state, well_formed) = match &raw_output {
            Ok(output) if !state_block::looks_like_error(output) => {
                match state_block::extract_state_block(output) {
                    Some(block) if state_block::has_all_required_headers(&block) => (block, true),
                    Some(block) => (block, false),
                    None => (old_state.clone(), false),
                }
            }
            _ => (old_state.clone(), false),
        };

        // Tentative save: the candidate if well-formed, otherwise the old
        // state is rewritten in place (a no-op write, but keeps the on-disk
        // contents identical to §8's byte-for-byte invariant either way).
        if let Err(e) = self.store.save_state(&game_id, &candidate_state).await {
            return Reply::error(format!("failed to tentatively save state: {e}"));
        }

        let context = PlayerActionContext {
            world,
            old_state: old_state.clone(),
            proposed_new_state: candidate_state.clone(),
            action_text: action.clone(),
        };

        if let Err(e) = self
            .jury
            .process_request(request_index, &context.jury_context(), &self.jury_engine, npl)
            .await
        {
            tracing::warn!(error = %e, "failed to submit local jury vote");
        }

        let decision = self.jury.wait_for_consensus(request_index, npl).await;
        // §8: a candidate missing required headers is INVALID regardless of
        // what the jury concluded from the (still generated) vote context.
        let decision = if !well_formed { Decision::Invalid } else { decision };

        let (action_result, final_state) = match decision {
            Decision::Valid => (String::from("success"), candidate_state.clone()),
            Decision::Invalid => {
                if let Err(e) = self.store.save_state(&game_id, &old_state).await {
                    tracing::error!(error = %e, "failed to revert state after invalid vote");
                }
                (String::from("failed"), old_state.clone())
            }
        };

        if decision == Decision::Valid {
            if let Some(crate::types::GameStatus::Won) = state_block::game_status(&final_state) {
                if let Err(e) = self.nft.record_win(&game_id, &final_state, &action).await {
                    tracing::error!(error = %e, "failed to record NFT win artifact");
                }
            }
        }

        let (invalid_avg, valid_avg) = self.jury.confidence_summary(request_index).unwrap_or((0.0, 0.0));
        let confidence = match decision {
            Decision::Valid => valid_avg,
            Decision::Invalid => invalid_avg,
        };

        Reply::Consensus {
            request_id: request_index,
            decision: match decision {
                Decision::Valid => "valid".to_string(),
                Decision::Invalid => "invalid".to_string(),
            },
            confidence,
            details: format!("jury resolved {action_result} action for {game_id}"),
            game_id,
            player_action: action,
            action_result,
            game_state: final_state,
        }
    }

    /// A validated free-form query: routed through the jury exactly like a
    /// player action, but never mutates any state file (§4.7 table row
    /// `query`: requires jury, does not say it writes a state file).
    async fn handle_query(
        &self,
        request_index: RequestIndex,
        game_id: GameId,
        text: String,
        npl: &dyn NplBroadcast,
    ) -> Reply {
        if !self.store.game_exists(&game_id).await {
            return Reply::error(format!("unknown game: {game_id}"));
        }

        if let Err(e) = self
            .jury
            .process_request(request_index, &text, &self.jury_engine, npl)
            .await
        {
            tracing::warn!(error = %e, "failed to submit local jury vote for query");
        }
        let decision = self.jury.wait_for_consensus(request_index, npl).await;
        let state = self.store.load_state(&game_id).await.unwrap_or_default();

        Reply::Consensus {
            request_id: request_index,
            decision: match decision {
                Decision::Valid => "valid".to_string(),
                Decision::Invalid => "invalid".to_string(),
            },
            confidence: 0.0,
            details: format!("query against {game_id}"),
            game_id,
            player_action: text,
            action_result: "no-op".to_string(),
            game_state: state,
        }
    }
}

/// A round context for production use: a simple boolean flag the host's
/// round driver sets before dispatching each request.
pub struct SimpleRound {
    pub readonly: bool,
}

impl RoundContext for SimpleRound {
    fn is_readonly(&self) -> bool {
        self.readonly
    }
}

#[async_trait]
impl NplBroadcast for () {
    async fn broadcast_vote(&self, _vote: &crate::jury::Vote) -> Result<()> {
        Ok(())
    }
    async fn poll_votes(&self) -> Vec<crate::jury::Vote> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientTimeouts;
    use crate::daemon::backend::EchoBackend;
    use crate::daemon::{self, ConversationPolicy, DaemonState};
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn spawn_echo_daemon() -> std::net::SocketAddr {
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

    async fn build_orchestrator(peer_count: usize) -> (ContractOrchestrator, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = GameStateStore::new(dir.path()).await.unwrap();
        let daemon_addr = spawn_echo_daemon().await;
        let game_client = InferenceClient::new(daemon_addr, ClientTimeouts::default());
        let jury_client = InferenceClient::new(daemon_addr, ClientTimeouts::default());
        let jury_engine = DecisionEngine::new(jury_client, "node-a".to_string());
        let jury = AiJury::new(peer_count);
        let nft = NftTrigger::new(dir.path(), None);
        let orchestrator = ContractOrchestrator::new(
            store,
            game_client,
            jury_engine,
            jury,
            nft,
            dir.path().to_string_lossy().to_string(),
        );
        (orchestrator, dir)
    }

    struct WritableRound {
        readonly: bool,
    }
    impl RoundContext for WritableRound {
        fn is_readonly(&self) -> bool {
            self.readonly
        }
    }

    #[tokio::test]
    async fn create_game_then_read_state_round_trips() {
        let (orchestrator, _dir) = build_orchestrator(1).await;
        let round = WritableRound { readonly: false };

        let reply = orchestrator
            .handle(
                &round,
                "alice",
                1,
                ClientMessage::CreateGame { prompt: "a cave".to_string() },
                &(),
            )
            .await;
        let game_id = match reply {
            Reply::GameCreated { game_id, status } => {
                assert_eq!(status, "success");
                game_id
            }
            other => panic!("unexpected reply: {other:?}"),
        };

        let readonly_round = WritableRound { readonly: true };
        let reply = orchestrator
            .handle(
                &readonly_round,
                "alice",
                2,
                ClientMessage::GetGameState { game_id },
                &(),
            )
            .await;
        assert!(matches!(reply, Reply::GameState { .. }));
    }

    #[tokio::test]
    async fn create_game_is_refused_in_readonly_round() {
        let (orchestrator, _dir) = build_orchestrator(1).await;
        let round = WritableRound { readonly: true };
        let reply = orchestrator
            .handle(
                &round,
                "alice",
                1,
                ClientMessage::CreateGame { prompt: "a cave".to_string() },
                &(),
            )
            .await;
        assert!(matches!(reply, Reply::Error { .. }));
    }

    #[tokio::test]
    async fn mint_nft_is_refused_outside_readonly_round() {
        let (orchestrator, _dir) = build_orchestrator(1).await;
        let round = WritableRound { readonly: false };
        let reply = orchestrator
            .handle(
                &round,
                "alice",
                1,
                ClientMessage::MintNft { game_id: GameId("g1".to_string()) },
                &(),
            )
            .await;
        assert!(matches!(reply, Reply::Error { .. }));
    }

    #[tokio::test]
    async fn player_action_with_single_peer_resolves_and_commits() {
        let (orchestrator, _dir) = build_orchestrator(1).await;
        let round = WritableRound { readonly: false };

        let reply = orchestrator
            .handle(
                &round,
                "alice",
                1,
                ClientMessage::CreateGame { prompt: "a cave".to_string() },
                &(),
            )
            .await;
        let game_id = match reply {
            Reply::GameCreated { game_id, .. } => game_id,
            other => panic!("unexpected reply: {other:?}"),
        };

        let reply = orchestrator
            .handle(
                &round,
                "alice",
                2,
                ClientMessage::PlayerAction {
                    game_id,
                    action: "go north".to_string(),
                    continue_conversation: false,
                },
                &(),
            )
            .await;

        match reply {
            Reply::Consensus { decision, action_result, .. } => {
                assert_eq!(decision, "valid");
                assert_eq!(action_result, "success");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
