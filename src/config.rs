//! Configuration for the contract core: daemon ports, data directories, jury
//! sizing, and round budgets. Loaded from TOML with environment overrides,
//! following the same load → override → validate pipeline the wider ecosystem
//! uses for production services.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub jury: JuryConfig,
    pub store: StoreConfig,
    pub provisioner: ProvisionerConfig,
    pub nft: NftConfig,
}

/// Inference Daemon (C2) + Daemon Supervisor (C3) + Inference Client (C4) config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub host: String,
    pub game_port: u16,
    pub jury_port: u16,
    pub pid_dir: PathBuf,
    pub daemon_binary: PathBuf,
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub generation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub spawn_settle: Duration,
}

/// AI Jury (C6) consensus config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JuryConfig {
    /// Size of the validator set (`peerCount`) votes are tallied against.
    pub peer_count: usize,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Confidence assigned to the liveness fallback vote when the validator
    /// daemon is down or still loading.
    pub fallback_confidence: f64,
}

/// Game State Store (C5) config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

/// Model Provisioner (C1) config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    pub model_dir: PathBuf,
    pub chunk_size: u64,
    pub model_name: String,
    pub model_size: u64,
    pub model_sha256: String,
    pub model_source_url: String,
}

/// NFT Trigger (C8) config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftConfig {
    pub signer_url: Option<String>,
    pub minter_wallet_seed_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig {
                host: "127.0.0.1".to_string(),
                game_port: 9876,
                jury_port: 9877,
                pid_dir: PathBuf::from("./game_data"),
                daemon_binary: PathBuf::from("inference-daemon"),
                ping_timeout: Duration::from_secs(10),
                generation_timeout: Duration::from_secs(120),
                spawn_settle: Duration::from_millis(500),
            },
            jury: JuryConfig {
                peer_count: 3,
                poll_interval: Duration::from_millis(100),
                fallback_confidence: 0.1,
            },
            store: StoreConfig {
                data_dir: PathBuf::from("./game_data"),
            },
            provisioner: ProvisionerConfig {
                model_dir: PathBuf::from("./model"),
                chunk_size: 8 * 1024 * 1024,
                model_name: "model.gguf".to_string(),
                model_size: 0,
                model_sha256: String::new(),
                model_source_url: String::new(),
            },
            nft: NftConfig {
                signer_url: None,
                minter_wallet_seed_env: "MINTER_WALLET_SEED".to_string(),
            },
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults if the file is absent,
    /// then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };
        config.override_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn override_from_env(&mut self) -> Result<()> {
        if let Ok(val) = env::var("CONTRACT_GAME_PORT") {
            self.daemon.game_port = val
                .parse()
                .map_err(|_| Error::Config("invalid CONTRACT_GAME_PORT".to_string()))?;
        }
        if let Ok(val) = env::var("CONTRACT_JURY_PORT") {
            self.daemon.jury_port = val
                .parse()
                .map_err(|_| Error::Config("invalid CONTRACT_JURY_PORT".to_string()))?;
        }
        if let Ok(val) = env::var("CONTRACT_DATA_DIR") {
            self.store.data_dir = PathBuf::from(&val);
            self.daemon.pid_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("CONTRACT_PEER_COUNT") {
            self.jury.peer_count = val
                .parse()
                .map_err(|_| Error::Config("invalid CONTRACT_PEER_COUNT".to_string()))?;
        }
        if let Ok(val) = env::var("CONTRACT_NFT_SIGNER_URL") {
            self.nft.signer_url = Some(val);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.daemon.game_port == self.daemon.jury_port {
            return Err(Error::Config(
                "game_port and jury_port must differ".to_string(),
            ));
        }
        if self.jury.peer_count == 0 {
            return Err(Error::Config("peer_count must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.jury.fallback_confidence) {
            return Err(Error::Config(
                "fallback_confidence must be within [0,1]".to_string(),
            ));
        }
        if self.provisioner.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_matching_ports() {
        let mut config = Config::default();
        config.daemon.jury_port = config.daemon.game_port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_peer_count() {
        let mut config = Config::default();
        config.jury.peer_count = 0;
        assert!(config.validate().is_err());
    }
}
