//! Structured error handling for the contract core.
//!
//! One variant per failure mode, consistent with how every subsystem in this
//! crate reports failure: nothing unwinds across a component boundary, the
//! orchestrator is the only place that turns an `Error` into a user-visible
//! reply or a silent drop.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by callers deciding whether to retry, log loudly,
/// or treat a failure as fatal. Mirrors the severity/retry split every
/// component in §7 of the design is expected to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transient I/O against the model blob host or the NFT signer.
    Network,
    /// Jury tallying, vote validation, quorum bookkeeping.
    Consensus,
    /// Game/world/state parsing and transition logic.
    Gaming,
    /// World/state/NFT file persistence.
    Storage,
    /// Config load/validation failures.
    Configuration,
    /// Daemon process supervision (PID files, fork/exec, signal probes).
    Process,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Whether a caller may retry the operation on the next round.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Process)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model provisioning failed: {0}")]
    Provisioning(String),

    #[error("model hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("daemon unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("daemon still loading")]
    DaemonLoading,

    #[error("daemon request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("supervisor error: {0}")]
    Supervisor(String),

    #[error("malformed daemon output: {0}")]
    MalformedOutput(String),

    #[error("game not found: {0}")]
    GameNotFound(String),

    #[error("invalid client message: {0}")]
    InvalidMessage(String),

    #[error("consensus error: {0}")]
    Consensus(String),

    #[error("duplicate vote from {jury_id} for request {request_id}")]
    DuplicateVote { jury_id: String, request_id: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("nft signer error: {0}")]
    NftSigner(String),

    #[error("read-only round: {0}")]
    ReadonlyViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_) | Error::Http(_) | Error::Provisioning(_) | Error::NftSigner(_) => {
                ErrorCategory::Network
            }
            Error::HashMismatch { .. } => ErrorCategory::Storage,
            Error::DaemonUnavailable(_) | Error::DaemonLoading | Error::Timeout(_) => {
                ErrorCategory::Network
            }
            Error::Supervisor(_) => ErrorCategory::Process,
            Error::MalformedOutput(_) | Error::GameNotFound(_) => ErrorCategory::Gaming,
            Error::InvalidMessage(_) => ErrorCategory::Gaming,
            Error::Consensus(_) | Error::DuplicateVote { .. } => ErrorCategory::Consensus,
            Error::Storage(_) => ErrorCategory::Storage,
            Error::Config(_) | Error::Toml(_) | Error::Json(_) => ErrorCategory::Configuration,
            Error::ReadonlyViolation(_) => ErrorCategory::Gaming,
            Error::Internal(_) => ErrorCategory::Internal,
        }
    }
}
