//! Shared data model: `GameId` derivation, `World`/`State` framing metadata,
//! and the request/vote records that live for the span of one round.
//!
//! These mirror the `GameId`/`PeerId`-style newtypes the wider ecosystem uses
//! for protocol identifiers: plain wrappers around a canonical string/byte
//! form, `Hash`/`Eq`/`Ord` derived so they drop straight into `DashMap`/`HashMap`
//! keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic identifier for a Game. Same inputs, ordered identically
/// across replicas by the host, yield the same `GameId` everywhere — see
/// `generate_game_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(pub String);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for GameId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive a `GameId` from the creation prompt, the requesting user's key, and
/// the number of games already created on this node prior to this one. All
/// three inputs are available identically on every honest replica (the host
/// orders user input identically across nodes), so this function is a pure,
/// deterministic hash — no randomness, no wall-clock time.
pub fn generate_game_id(creation_prompt: &str, user_key: &str, prior_game_count: u64) -> GameId {
    let mut hasher = Sha256::new();
    hasher.update(creation_prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(user_key.as_bytes());
    hasher.update(b"\0");
    hasher.update(prior_game_count.to_le_bytes());
    GameId(hex::encode(hasher.finalize()))
}

/// Monotone per-round index of an incoming client request.
pub type RequestIndex = u64;

/// Taxonomy of client-originated messages, per the external interface grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClientMessage {
    Stat,
    CreateGame {
        prompt: String,
    },
    ListGames,
    GetGameState {
        game_id: GameId,
    },
    PlayerAction {
        game_id: GameId,
        action: String,
        continue_conversation: bool,
    },
    MintNft {
        game_id: GameId,
    },
    Query {
        game_id: GameId,
        text: String,
    },
}

impl ClientMessage {
    /// Whether this message may be processed in a read-only round.
    pub fn readonly_ok(&self) -> bool {
        matches!(
            self,
            ClientMessage::Stat | ClientMessage::ListGames | ClientMessage::GetGameState { .. }
        )
    }

    /// Whether this message requires jury consensus before it may commit.
    pub fn requires_jury(&self) -> bool {
        matches!(
            self,
            ClientMessage::PlayerAction { .. } | ClientMessage::Query { .. }
        )
    }

    /// `mint_nft` is the one message that is read-only-round-only: it never
    /// mutates game state or requires jury consensus, but it is refused in a
    /// consensus round because it invokes a non-replicated external signer.
    pub fn readonly_round_only(&self) -> bool {
        matches!(self, ClientMessage::MintNft { .. })
    }
}

/// A RequestRecord is created per incoming mutating client input and lives
/// only for the round in which it was submitted.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub user: String,
    pub request_index: RequestIndex,
    pub message: ClientMessage,
    /// For `player_action`: (world, old_state, proposed_new_state, action_text).
    pub player_action_context: Option<PlayerActionContext>,
}

#[derive(Debug, Clone)]
pub struct PlayerActionContext {
    pub world: String,
    pub old_state: String,
    pub proposed_new_state: String,
    pub action_text: String,
}

impl PlayerActionContext {
    /// The context string the jury votes against, per §4.7 step 4.
    pub fn jury_context(&self) -> String {
        format!(
            "GameWorld: {} -> OldState: {} -> PlayerAction: {} -> NewState: {}",
            self.world, self.old_state, self.action_text, self.proposed_new_state
        )
    }
}

/// Status of a Game's dynamic State.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Active,
    Won,
    Lost,
}

impl GameStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "won" => Some(Self::Won),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}
