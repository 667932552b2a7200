//! # Domain Models
//!
//! These structs represent the core entities of the study forum.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Fixed identity of the synthetic account that authors AI replies.
pub const AI_BOT_EMAIL: &str = "aibot@studentforum.com";
pub const AI_BOT_DISPLAY_NAME: &str = "AI Study Assistant";
pub const AI_BOT_AVATAR: &str = "🤖";
pub const AI_BOT_REPUTATION: i64 = 1000;

/// Subject area of a thread. Drives the AI prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    Homework,
    Programming,
    Math,
    Science,
    Literature,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::General,
        Category::Homework,
        Category::Programming,
        Category::Math,
        Category::Science,
        Category::Literature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Homework => "homework",
            Category::Programming => "programming",
            Category::Math => "math",
            Category::Science => "science",
            Category::Literature => "literature",
        }
    }

    /// Subjects where a worked, step-by-step answer earns extra confidence.
    pub fn rewards_steps(&self) -> bool {
        matches!(self, Category::Math | Category::Programming | Category::Science)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown category '{s}'")))
    }
}

/// Metadata for a file uploaded alongside a thread. The bytes live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: i64,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A question posted to the forum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub author_id: Uuid,
    pub tags: Vec<String>,
    pub upvotes: i64,
    pub downvotes: i64,
    /// Denormalized; always equals the number of replies referencing this thread
    pub reply_count: i64,
    pub is_resolved: bool,
    pub is_pinned: bool,
    pub views: i64,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn vote_score(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    /// The text handed to the AI answer generator.
    pub fn question_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.content)
    }
}

/// What caused an AI reply to be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiTrigger {
    /// Launched by thread creation. At most one per thread.
    Automatic,
    /// Explicitly requested by a user after the fact.
    Manual,
}

impl AiTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiTrigger::Automatic => "automatic",
            AiTrigger::Manual => "manual",
        }
    }
}

impl FromStr for AiTrigger {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(AiTrigger::Automatic),
            "manual" => Ok(AiTrigger::Manual),
            other => Err(AppError::InvalidArgument(format!("unknown AI trigger '{other}'"))),
        }
    }
}

/// An answer or comment within a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    /// One level of nesting only: a parent is always a top-level reply
    pub parent_reply_id: Option<Uuid>,
    pub content: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub is_accepted: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_ai_generated: bool,
    /// Heuristic score in [0.70, 0.95]; not a model-reported value
    pub ai_confidence: Option<f64>,
    pub ai_trigger: Option<AiTrigger>,
    pub follow_up_questions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reply {
    pub fn vote_score(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

/// A forum member. Identity itself is owned by the upstream identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub reputation: i64,
    pub is_admin: bool,
    /// Set only on the synthetic AI responder account
    pub is_ai: bool,
    pub created_at: DateTime<Utc>,
}

/// Kind of entity a vote is cast on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Thread,
    Reply,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Thread => "thread",
            TargetKind::Reply => "reply",
        }
    }
}

impl FromStr for TargetKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thread" => Ok(TargetKind::Thread),
            "reply" => Ok(TargetKind::Reply),
            other => Err(AppError::InvalidArgument(format!("unknown vote target type '{other}'"))),
        }
    }
}

/// A thread or reply that can receive votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteTarget {
    pub kind: TargetKind,
    pub id: Uuid,
}

impl VoteTarget {
    pub fn thread(id: Uuid) -> Self {
        Self { kind: TargetKind::Thread, id }
    }

    pub fn reply(id: Uuid) -> Self {
        Self { kind: TargetKind::Reply, id }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// The direction of a recorded vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl FromStr for VoteDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            other => Err(AppError::InvalidArgument(format!("unknown vote direction '{other}'"))),
        }
    }
}

/// What a voter asks the ledger to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Upvote,
    Downvote,
    Remove,
}

impl VoteAction {
    /// The direction this action leaves behind, `None` for a removal.
    pub fn direction(&self) -> Option<VoteDirection> {
        match self {
            VoteAction::Upvote => Some(VoteDirection::Up),
            VoteAction::Downvote => Some(VoteDirection::Down),
            VoteAction::Remove => None,
        }
    }
}

impl FromStr for VoteAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteAction::Upvote),
            "downvote" => Ok(VoteAction::Downvote),
            "remove" => Ok(VoteAction::Remove),
            other => Err(AppError::InvalidArgument(format!(
                "invalid vote type '{other}', expected upvote, downvote or remove"
            ))),
        }
    }
}

/// A single (voter, target) entry in the vote ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: Uuid,
    pub target: VoteTarget,
    pub direction: VoteDirection,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counter snapshot of a target after a vote settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
    /// The caller's standing vote, if the tally was produced for a voter
    pub user_vote: Option<VoteDirection>,
}

impl VoteTally {
    pub fn new(upvotes: i64, downvotes: i64, user_vote: Option<VoteDirection>) -> Self {
        Self { upvotes, downvotes, score: upvotes - downvotes, user_vote }
    }
}

/// Input for persisting a new thread. Validated by the service layer.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub title: String,
    pub content: String,
    pub category: Category,
    pub author_id: Uuid,
    pub tags: Vec<String>,
    pub attachments: Vec<Attachment>,
}

/// AI provenance attached to a generated reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AiAnnotation {
    pub confidence: f64,
    pub follow_up_questions: Vec<String>,
    pub trigger: AiTrigger,
}

/// Input for persisting a new reply.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub parent_reply_id: Option<Uuid>,
    pub content: String,
    pub ai: Option<AiAnnotation>,
}

/// Input for registering a user profile.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub reputation: i64,
    pub is_admin: bool,
    pub is_ai: bool,
}

impl NewUser {
    /// The synthetic account used as the author of AI replies.
    pub fn ai_bot() -> Self {
        Self {
            email: AI_BOT_EMAIL.to_string(),
            display_name: AI_BOT_DISPLAY_NAME.to_string(),
            avatar: Some(AI_BOT_AVATAR.to_string()),
            reputation: AI_BOT_REPUTATION,
            is_admin: false,
            is_ai: true,
        }
    }
}

/// Ordering of the thread listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSort {
    /// Pinned first, then most recent
    #[default]
    Newest,
    /// Highest vote score first
    Popular,
    /// Only threads without replies, most recent first
    Unanswered,
}

impl FromStr for ThreadSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(ThreadSort::Newest),
            "popular" => Ok(ThreadSort::Popular),
            "unanswered" => Ok(ThreadSort::Unanswered),
            other => Err(AppError::InvalidArgument(format!("unknown sort '{other}'"))),
        }
    }
}

/// Filters and pagination for the thread listing.
#[derive(Debug, Clone)]
pub struct ThreadQuery {
    pub category: Option<Category>,
    pub search: Option<String>,
    pub sort: ThreadSort,
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl Default for ThreadQuery {
    fn default() -> Self {
        Self { category: None, search: None, sort: ThreadSort::Newest, page: 1, limit: 20 }
    }
}

impl ThreadQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// One page of the thread listing.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadPage {
    pub threads: Vec<Thread>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

/// Aggregate counters for the forum landing page.
#[derive(Debug, Clone, Serialize)]
pub struct ForumStats {
    pub total_threads: i64,
    pub total_users: i64,
    pub total_replies: i64,
    pub solved_today: i64,
    /// Every category is present, zero when it has no threads
    pub category_stats: BTreeMap<Category, i64>,
}
