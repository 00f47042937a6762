//! AI Jury (C6).
//!
//! Cross-node consensus over a single proposed game transition. Every
//! replica's orchestrator asks its own Inference Daemon to validate the same
//! proposal, broadcasts its vote to every peer over the host-provided NPL
//! channel, and tallies votes as they arrive — including its own. Resolution
//! requires a strict majority of the configured peer count; an exact tie
//! resolves to INVALID (§5.3).

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::client::InferenceClient;
use crate::error::{Error, Result};
use crate::types::RequestIndex;

/// How often [`wait_for_consensus`] re-checks tally state. No internal
/// timeout is enforced here — the host's round budget is the only bound on
/// how long a caller may poll.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub request_id: RequestIndex,
    pub jury_id: String,
    pub is_valid: bool,
    pub confidence: f64,
    pub reason: String,
}

/// Per-request tally. Indexed `[invalid, valid]` throughout, matching the
/// jury's `Decision::Invalid = 0, Decision::Valid = 1` ordinal convention.
#[derive(Debug, Default, Clone)]
pub struct JuryRequestState {
    pub tally: [u32; 2],
    pub confidence_sum: [f64; 2],
    pub received: std::collections::HashSet<String>,
    pub resolved: Option<Decision>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Invalid,
    Valid,
}

impl Decision {
    fn index(self) -> usize {
        match self {
            Decision::Invalid => 0,
            Decision::Valid => 1,
        }
    }
}

/// The host round's broadcast seam. Modeled as a trait because the contract
/// host, not this crate, owns the actual peer-to-peer transport; production
/// wiring adapts whatever NPL/broadcast primitive the host exposes.
#[async_trait]
pub trait NplBroadcast: Send + Sync {
    async fn broadcast_vote(&self, vote: &Vote) -> Result<()>;
    /// Drain any votes received since the last poll, for any request.
    async fn poll_votes(&self) -> Vec<Vote>;
}

/// Wraps the validator Inference Client with the liveness fallback (§5.2):
/// if the validator daemon cannot be reached, a replica still casts a vote
/// rather than stalling consensus, defaulting to `{valid: true, confidence:
/// 0.1}` so a temporarily-down jury daemon cannot unilaterally veto a
/// transition.
pub struct DecisionEngine {
    client: InferenceClient,
    jury_id: String,
}

impl DecisionEngine {
    pub fn new(client: InferenceClient, jury_id: String) -> Self {
        Self { client, jury_id }
    }

    pub async fn decide(&self, request_id: RequestIndex, statement: &str) -> Vote {
        match self.client.validate(statement.to_string()).await {
            Ok((is_valid, confidence)) => Vote {
                request_id,
                jury_id: self.jury_id.clone(),
                is_valid,
                confidence,
                reason: "validator daemon response".to_string(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "validator daemon unavailable, casting liveness-fallback vote");
                Vote {
                    request_id,
                    jury_id: self.jury_id.clone(),
                    is_valid: true,
                    confidence: 0.1,
                    reason: "AI not ready".to_string(),
                }
            }
        }
    }
}

pub struct AiJury {
    states: DashMap<RequestIndex, JuryRequestState>,
    peer_count: usize,
}

impl AiJury {
    pub fn new(peer_count: usize) -> Self {
        Self {
            states: DashMap::new(),
            peer_count,
        }
    }

    /// Produce this replica's own vote and record it locally before
    /// broadcasting, so a slow network round-trip never causes the local
    /// vote to be double-counted or missed.
    pub async fn process_request(
        &self,
        request_id: RequestIndex,
        statement: &str,
        engine: &DecisionEngine,
        npl: &dyn NplBroadcast,
    ) -> Result<()> {
        let vote = engine.decide(request_id, statement).await;
        self.process_vote(vote.clone())?;
        npl.broadcast_vote(&vote).await
    }

    /// Idempotent: a duplicate `(jury_id, request_id)` vote is dropped rather
    /// than double-counted (§5.3) — a Byzantine or merely retrying peer
    /// cannot inflate its own weight.
    pub fn process_vote(&self, vote: Vote) -> Result<()> {
        let mut state = self.states.entry(vote.request_id).or_default();
        if !state.received.insert(vote.jury_id.clone()) {
            return Err(Error::DuplicateVote {
                jury_id: vote.jury_id,
                request_id: vote.request_id.to_string(),
            });
        }
        let decision = if vote.is_valid { Decision::Valid } else { Decision::Invalid };
        state.tally[decision.index()] += 1;
        state.confidence_sum[decision.index()] += vote.confidence;
        Ok(())
    }

    fn try_resolve(&self, request_id: RequestIndex) -> Option<Decision> {
        let mut state = self.states.get_mut(&request_id)?;
        if let Some(resolved) = state.resolved {
            return Some(resolved);
        }

        let total_received: u32 = state.tally.iter().sum();
        if total_received < self.peer_count as u32 {
            return None;
        }

        let invalid = state.tally[Decision::Invalid.index()];
        let valid = state.tally[Decision::Valid.index()];
        let decision = if valid > invalid {
            Decision::Valid
        } else {
            // Exact tie or invalid majority both resolve to INVALID.
            Decision::Invalid
        };
        state.resolved = Some(decision);
        Some(decision)
    }

    /// Poll the NPL channel and the local tally until every expected vote has
    /// arrived, then resolve. No timeout lives here: the caller's round
    /// budget bounds how long this may run.
    pub async fn wait_for_consensus(
        &self,
        request_id: RequestIndex,
        npl: &dyn NplBroadcast,
    ) -> Decision {
        loop {
            for vote in npl.poll_votes().await {
                if vote.request_id == request_id {
                    self.process_vote(vote).ok();
                }
            }
            if let Some(decision) = self.try_resolve(request_id) {
                return decision;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn confidence_summary(&self, request_id: RequestIndex) -> Option<(f64, f64)> {
        let state = self.states.get(&request_id)?;
        let avg = |idx: usize| {
            if state.tally[idx] == 0 {
                0.0
            } else {
                state.confidence_sum[idx] / state.tally[idx] as f64
            }
        };
        Some((avg(Decision::Invalid.index()), avg(Decision::Valid.index())))
    }
}
