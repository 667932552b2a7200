//! # Vote Ledger
//!
//! Parses caller input into a typed vote and hands it to the store, which
//! applies the keyed upsert and the counter change in one transaction.

use std::str::FromStr;
use std::sync::Arc;

use sf_core::error::Result;
use sf_core::models::{TargetKind, VoteAction, VoteDirection, VoteTally, VoteTarget};
use sf_core::traits::ForumRepo;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct VoteLedger {
    repo: Arc<dyn ForumRepo>,
}

impl VoteLedger {
    pub fn new(repo: Arc<dyn ForumRepo>) -> Self {
        Self { repo }
    }

    /// String-typed entry point: `target_type` is `thread` or `reply`,
    /// `direction` is `upvote`, `downvote` or `remove`.
    pub async fn cast_vote(
        &self,
        voter_id: Uuid,
        target_id: Uuid,
        target_type: &str,
        direction: &str,
    ) -> Result<VoteTally> {
        let target = VoteTarget { kind: TargetKind::from_str(target_type)?, id: target_id };
        let action = VoteAction::from_str(direction)?;
        self.cast(voter_id, target, action).await
    }

    pub async fn cast(&self, voter_id: Uuid, target: VoteTarget, action: VoteAction) -> Result<VoteTally> {
        let tally = self.repo.cast_vote(voter_id, target, action).await?;
        debug!(%voter_id, %target, ?action, score = tally.score, "vote applied");
        Ok(tally)
    }

    pub async fn user_vote(&self, voter_id: Uuid, target: VoteTarget) -> Result<Option<VoteDirection>> {
        Ok(self.repo.get_vote(voter_id, target).await?.map(|v| v.direction))
    }

    /// Rebuilds both counters from the ledger rows.
    pub async fn resync(&self, target: VoteTarget) -> Result<VoteTally> {
        let tally = self.repo.resync_vote_counts(target).await?;
        info!(%target, upvotes = tally.upvotes, downvotes = tally.downvotes, "vote counters resynced");
        Ok(tally)
    }
}
