//! ai-jury-contract-core
//!
//! A replicated game contract core: an AI-driven text-adventure engine whose
//! non-deterministic narrative generation is ratified by a cross-node AI
//! jury consensus vote before it commits. Built to run inside a
//! Byzantine-fault-tolerant contract host that supplies the round loop, user
//! I/O, and node-to-node broadcast (NPL) — this crate implements everything
//! on the host's side of that boundary: model provisioning, the inference
//! daemon protocol, daemon supervision, jury consensus, game state
//! persistence, and the orchestrator that ties them together.

pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod jury;
pub mod logging;
pub mod nft;
pub mod orchestrator;
pub mod provisioner;
pub mod state_block;
pub mod store;
pub mod supervisor;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
