//! NFT Trigger (C8).
//!
//! On a win transition, records a JSON artifact describing the winning game
//! state. Minting — the external signer call — only ever happens from a
//! read-only round: different replicas' signing attempts would diverge, and
//! minting consumes an external nonce that must not be double-spent across
//! nodes (§4.8, §9).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use crate::error::{Error, Result};
use crate::state_block;
use crate::types::GameId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NftStatus {
    Won,
    Minted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftRecord {
    pub game_id: String,
    pub completion_time: DateTime<Utc>,
    pub winning_action: String,
    pub status: NftStatus,
    pub final_location: String,
    pub final_health: String,
    pub final_score: String,
    pub player_inventory: String,
    pub mint_timestamp: Option<DateTime<Utc>>,
    pub mint_tx_hash: Option<String>,
    pub nft_tokens: Vec<String>,
}

/// Seam to the external blockchain signing service. Production wiring posts
/// to whatever endpoint `NftConfig::signer_url` names; tests inject a stub.
#[async_trait]
pub trait NftSigner: Send + Sync {
    async fn sign_and_submit(&self, record: &NftRecord) -> Result<String>;
}

pub struct NftTrigger {
    data_dir: PathBuf,
    signer: Option<Arc<dyn NftSigner>>,
}

impl NftTrigger {
    pub fn new(data_dir: impl Into<PathBuf>, signer: Option<Arc<dyn NftSigner>>) -> Self {
        Self {
            data_dir: data_dir.into(),
            signer,
        }
    }

    fn record_path(&self, game_id: &GameId) -> PathBuf {
        self.data_dir.join(format!("nft_{}.json", game_id.0))
    }

    async fn read_record(&self, game_id: &GameId) -> Option<NftRecord> {
        let bytes = fs::read(self.record_path(game_id)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    async fn write_record(&self, game_id: &GameId, record: &NftRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(record).map_err(Error::Json)?;
        fs::write(self.record_path(game_id), body).await?;
        Ok(())
    }

    /// Called by the Contract Orchestrator the instant a committed state
    /// carries `Game_Status: won`. Idempotent: a second call for a game that
    /// already has a `won` or `minted` record is a no-op, returning the
    /// existing record untouched.
    pub async fn record_win(
        &self,
        game_id: &GameId,
        state_block: &str,
        winning_action: &str,
    ) -> Result<NftRecord> {
        if let Some(existing) = self.read_record(game_id).await {
            return Ok(existing);
        }

        let record = NftRecord {
            game_id: game_id.0.clone(),
            completion_time: Utc::now(),
            winning_action: winning_action.to_string(),
            status: NftStatus::Won,
            final_location: state_block::field(state_block, "Player_Location").unwrap_or_default(),
            final_health: state_block::field(state_block, "Player_Health").unwrap_or_default(),
            final_score: state_block::field(state_block, "Player_Score").unwrap_or_default(),
            player_inventory: state_block::field(state_block, "Player_Inventory").unwrap_or_default(),
            mint_timestamp: None,
            mint_tx_hash: None,
            nft_tokens: Vec::new(),
        };
        self.write_record(game_id, &record).await?;
        Ok(record)
    }

    /// Attempt to mint. Callers MUST only invoke this from a read-only round
    /// (§4.8); this method does not itself check round mode, since the round
    /// concept belongs to the orchestrator, not this component.
    pub async fn mint(&self, game_id: &GameId) -> Result<NftRecord> {
        let mut record = self
            .read_record(game_id)
            .await
            .ok_or_else(|| Error::GameNotFound(format!("no NFT record for {game_id}")))?;

        if record.status == NftStatus::Minted {
            return Ok(record);
        }

        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| Error::NftSigner("no signer configured".to_string()))?;

        let tx_hash = signer.sign_and_submit(&record).await?;
        record.status = NftStatus::Minted;
        record.mint_timestamp = Some(Utc::now());
        record.mint_tx_hash = Some(tx_hash.clone());
        record.nft_tokens.push(tx_hash);
        self.write_record(game_id, &record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct StubSigner;

    #[async_trait]
    impl NftSigner for StubSigner {
        async fn sign_and_submit(&self, _record: &NftRecord) -> Result<String> {
            Ok("0xdeadbeef".to_string())
        }
    }

    fn won_block() -> String {
        "Player_Location: summit\nPlayer_Health: 100\nPlayer_Score: 500\nPlayer_Inventory: [\"torch\"]\nGame_Status: won\nTurn_Count: 9".to_string()
    }

    #[tokio::test]
    async fn record_win_extracts_fields_and_persists() {
        let dir = tempdir().unwrap();
        let trigger = NftTrigger::new(dir.path(), None);
        let id = GameId("g1".to_string());
        let record = trigger.record_win(&id, &won_block(), "climb to the summit").await.unwrap();
        assert_eq!(record.status, NftStatus::Won);
        assert_eq!(record.final_location, "summit");
        assert_eq!(record.final_score, "500");
        assert!(dir.path().join("nft_g1.json").exists());
    }

    #[tokio::test]
    async fn record_win_is_idempotent() {
        let dir = tempdir().unwrap();
        let trigger = NftTrigger::new(dir.path(), None);
        let id = GameId("g1".to_string());
        let first = trigger.record_win(&id, &won_block(), "climb").await.unwrap();
        let second = trigger.record_win(&id, &won_block(), "a different action").await.unwrap();
        assert_eq!(first.winning_action, second.winning_action);
    }

    #[tokio::test]
    async fn mint_without_signer_fails() {
        let dir = tempdir().unwrap();
        let trigger = NftTrigger::new(dir.path(), None);
        let id = GameId("g1".to_string());
        trigger.record_win(&id, &won_block(), "climb").await.unwrap();
        let err = trigger.mint(&id).await.unwrap_err();
        assert!(matches!(err, Error::NftSigner(_)));
    }

    #[tokio::test]
    async fn mint_transitions_won_to_minted_exactly_once() {
        let dir = tempdir().unwrap();
        let trigger = NftTrigger::new(dir.path(), Some(Arc::new(StubSigner)));
        let id = GameId("g1".to_string());
        trigger.record_win(&id, &won_block(), "climb").await.unwrap();

        let minted = trigger.mint(&id).await.unwrap();
        assert_eq!(minted.status, NftStatus::Minted);
        assert_eq!(minted.mint_tx_hash.as_deref(), Some("0xdeadbeef"));

        // Second mint is a no-op, not a double-spend.
        let minted_again = trigger.mint(&id).await.unwrap();
        assert_eq!(minted_again.nft_tokens.len(), 1);
    }
}
