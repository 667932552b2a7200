//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AiTrigger, ForumStats, NewReply, NewThread, NewUser, Reply, Thread, ThreadPage, ThreadQuery,
    User, Vote, VoteAction, VoteTally, VoteTarget,
};

/// Data persistence contract for users, threads, replies and votes.
///
/// # Consistency
/// Implementations own the atomicity guarantees: every counter change is
/// applied inside the same transaction as the row change that causes it,
/// and counters are never written back from a value read earlier.
#[async_trait]
pub trait ForumRepo: Send + Sync {
    // User Operations
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    /// Idempotent: concurrent callers with the same email observe one record.
    async fn get_or_create_user(&self, user: NewUser) -> Result<User>;

    // Thread Operations
    async fn create_thread(&self, thread: NewThread) -> Result<Thread>;
    async fn get_thread(&self, id: Uuid) -> Result<Option<Thread>>;
    /// Atomically bumps the view counter. `NotFound` if the thread is missing.
    async fn record_thread_view(&self, id: Uuid) -> Result<()>;
    async fn list_threads(&self, query: &ThreadQuery) -> Result<ThreadPage>;

    // Reply Operations
    /// Inserts the reply and recomputes the thread's `reply_count` in one unit.
    /// An automatic AI reply for a thread that already has one yields `Conflict`.
    async fn create_reply(&self, reply: NewReply) -> Result<Reply>;
    async fn get_reply(&self, id: Uuid) -> Result<Option<Reply>>;
    /// Oldest first.
    async fn list_replies(&self, thread_id: Uuid) -> Result<Vec<Reply>>;
    async fn update_reply_content(&self, id: Uuid, content: String) -> Result<Reply>;
    /// Removes the reply, its nested replies and their votes, then recomputes
    /// the thread's `reply_count`.
    async fn delete_reply(&self, id: Uuid) -> Result<()>;
    /// Marks the reply accepted, clears any other accepted reply in the thread
    /// and marks the thread resolved.
    async fn accept_reply(&self, id: Uuid) -> Result<Reply>;
    async fn find_ai_reply(&self, thread_id: Uuid, trigger: AiTrigger) -> Result<Option<Reply>>;

    // Vote Operations
    /// Keyed upsert of the (voter, target) vote, counters adjusted atomically.
    async fn cast_vote(&self, voter_id: Uuid, target: VoteTarget, action: VoteAction) -> Result<VoteTally>;
    async fn get_vote(&self, voter_id: Uuid, target: VoteTarget) -> Result<Option<Vote>>;
    /// Recomputes the target's counters from the ledger.
    async fn resync_vote_counts(&self, target: VoteTarget) -> Result<VoteTally>;

    // Stats
    /// `resolved_since` bounds the "solved today" counter.
    async fn forum_stats(&self, resolved_since: DateTime<Utc>) -> Result<ForumStats>;
}

/// Generative text contract: a prompt goes in, text comes out.
///
/// Failures are opaque to the domain; callers treat any error as a
/// recoverable provider failure.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}
