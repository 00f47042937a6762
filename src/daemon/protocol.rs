//! Wire protocol between the Inference Client (C4) and the Inference Daemon
//! (C2): newline-free JSON request/response bodies over a one-shot TCP
//! connection.

use serde::{Deserialize, Serialize};

/// Sampling discipline for a generation call. The game daemon and the jury
/// daemon use different presets (§4.2.1, §4.2.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingParams {
    pub top_k: u32,
    pub top_p: f32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl SamplingParams {
    /// `create_game` sampling: top-k 20, top-p 0.7, temp 0.3.
    pub const CREATE_GAME: SamplingParams = SamplingParams {
        top_k: 20,
        top_p: 0.7,
        temperature: 0.3,
        max_tokens: 800,
    };

    /// `player_action` sampling: top-k 40, top-p 0.9, temp 0.8, max 400 tokens.
    pub const PLAYER_ACTION: SamplingParams = SamplingParams {
        top_k: 40,
        top_p: 0.9,
        temperature: 0.8,
        max_tokens: 400,
    };

    /// Binary validator sampling: top-k 2, temp 0.01, max 5 tokens.
    pub const VALIDATE: SamplingParams = SamplingParams {
        top_k: 2,
        top_p: 1.0,
        temperature: 0.01,
        max_tokens: 5,
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonRequest {
    Ping,
    CreateGame {
        prompt: String,
    },
    PlayerAction {
        game_id: String,
        action: String,
        old_state: String,
        world: String,
        continue_conversation: bool,
    },
    ResetConversation,
    Validate {
        statement: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    Pong {
        status: DaemonStatus,
        model_loaded: bool,
        model_loading: bool,
        error: Option<String>,
    },
    CreateGame {
        /// Free-form narrative; `GameStateStore::create_game` partitions it.
        narrative: String,
    },
    PlayerAction {
        /// Raw generation output. May or may not carry well-formed
        /// `<<BEGIN_PLAYER_STATE>>`/`<<END_PLAYER_STATE>>` markers; extraction
        /// and validation happen downstream (§4.2.1).
        raw_output: String,
    },
    ConversationReset {
        status: String,
    },
    Validate {
        valid: bool,
        confidence: f64,
        raw_response: String,
    },
    Error {
        message: String,
    },
}
