//! Row shapes as stored in SQLite and their mapping onto `sf-core` models.
//!
//! JSON columns (tags, attachments, follow-up questions) are stored as TEXT.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sf_core::error::{AppError, Result};
use sf_core::models::{AiTrigger, Category, Reply, Thread, User, Vote, VoteDirection, VoteTarget};
use sqlx::FromRow;
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str =
    "id, email, display_name, avatar, reputation, is_admin, is_ai, created_at";

pub(crate) const THREAD_COLUMNS: &str = "id, title, content, category, author_id, tags, upvotes, \
     downvotes, reply_count, is_resolved, is_pinned, views, attachments, created_at, updated_at";

pub(crate) const REPLY_COLUMNS: &str = "id, thread_id, author_id, parent_reply_id, content, upvotes, \
     downvotes, is_accepted, is_edited, edited_at, is_ai_generated, ai_confidence, ai_trigger, \
     follow_up_questions, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    email: String,
    display_name: String,
    avatar: Option<String>,
    reputation: i64,
    is_admin: bool,
    is_ai: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            avatar: row.avatar,
            reputation: row.reputation,
            is_admin: row.is_admin,
            is_ai: row.is_ai,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ThreadRow {
    id: Uuid,
    title: String,
    content: String,
    category: String,
    author_id: Uuid,
    tags: String,
    upvotes: i64,
    downvotes: i64,
    reply_count: i64,
    is_resolved: bool,
    is_pinned: bool,
    views: i64,
    attachments: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ThreadRow> for Thread {
    type Error = AppError;

    fn try_from(row: ThreadRow) -> Result<Self> {
        Ok(Thread {
            id: row.id,
            title: row.title,
            content: row.content,
            category: Category::from_str(&row.category)
                .map_err(|e| AppError::Internal(format!("thread {}: {e}", row.id)))?,
            author_id: row.author_id,
            tags: from_json_column(&row.tags, "threads.tags")?,
            upvotes: row.upvotes,
            downvotes: row.downvotes,
            reply_count: row.reply_count,
            is_resolved: row.is_resolved,
            is_pinned: row.is_pinned,
            views: row.views,
            attachments: from_json_column(&row.attachments, "threads.attachments")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ReplyRow {
    id: Uuid,
    thread_id: Uuid,
    author_id: Uuid,
    parent_reply_id: Option<Uuid>,
    content: String,
    upvotes: i64,
    downvotes: i64,
    is_accepted: bool,
    is_edited: bool,
    edited_at: Option<DateTime<Utc>>,
    is_ai_generated: bool,
    ai_confidence: Option<f64>,
    ai_trigger: Option<String>,
    follow_up_questions: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReplyRow> for Reply {
    type Error = AppError;

    fn try_from(row: ReplyRow) -> Result<Self> {
        let ai_trigger = row
            .ai_trigger
            .as_deref()
            .map(AiTrigger::from_str)
            .transpose()
            .map_err(|e| AppError::Internal(format!("reply {}: {e}", row.id)))?;

        Ok(Reply {
            id: row.id,
            thread_id: row.thread_id,
            author_id: row.author_id,
            parent_reply_id: row.parent_reply_id,
            content: row.content,
            upvotes: row.upvotes,
            downvotes: row.downvotes,
            is_accepted: row.is_accepted,
            is_edited: row.is_edited,
            edited_at: row.edited_at,
            is_ai_generated: row.is_ai_generated,
            ai_confidence: row.ai_confidence,
            ai_trigger,
            follow_up_questions: from_json_column(&row.follow_up_questions, "replies.follow_up_questions")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct VoteRow {
    voter_id: Uuid,
    direction: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VoteRow {
    pub(crate) fn into_vote(self, target: VoteTarget) -> Result<Vote> {
        Ok(Vote {
            voter_id: self.voter_id,
            target,
            direction: VoteDirection::from_str(&self.direction)
                .map_err(|e| AppError::Internal(format!("vote on {target}: {e}")))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn from_json_column<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| AppError::Internal(format!("malformed {column}: {e}")))
}

pub(crate) fn to_json_column<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AppError::Internal(format!("encode json column: {e}")))
}
