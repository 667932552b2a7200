//! Reply lifecycle: posting, editing, removal and acceptance.
//!
//! The store recomputes the parent thread's `reply_count` inside the same
//! transaction as every insert or delete issued here.

use std::sync::Arc;

use sf_core::error::{AppError, Result};
use sf_core::models::{NewReply, Reply, User};
use sf_core::traits::ForumRepo;
use tracing::info;
use uuid::Uuid;

use crate::validation;

#[derive(Debug, Clone)]
pub struct ReplyDraft {
    pub thread_id: Uuid,
    pub parent_reply_id: Option<Uuid>,
    pub content: String,
}

#[derive(Clone)]
pub struct ReplyService {
    repo: Arc<dyn ForumRepo>,
}

impl ReplyService {
    pub fn new(repo: Arc<dyn ForumRepo>) -> Self {
        Self { repo }
    }

    pub async fn create_reply(&self, author: &User, draft: ReplyDraft) -> Result<Reply> {
        let content = validation::reply_content(&draft.content)?;

        if self.repo.get_thread(draft.thread_id).await?.is_none() {
            return Err(AppError::not_found("Thread", draft.thread_id));
        }

        if let Some(parent_id) = draft.parent_reply_id {
            let parent = self
                .repo
                .get_reply(parent_id)
                .await?
                .ok_or_else(|| AppError::not_found("Parent reply", parent_id))?;
            if parent.thread_id != draft.thread_id {
                return Err(AppError::ValidationError("Parent reply belongs to a different thread".into()));
            }
            if parent.parent_reply_id.is_some() {
                return Err(AppError::ValidationError("Replies can only be nested one level deep".into()));
            }
        }

        let reply = self
            .repo
            .create_reply(NewReply {
                thread_id: draft.thread_id,
                author_id: author.id,
                parent_reply_id: draft.parent_reply_id,
                content,
                ai: None,
            })
            .await?;

        info!(thread_id = %reply.thread_id, reply_id = %reply.id, author_id = %author.id, "reply posted");
        Ok(reply)
    }

    /// Oldest first. `NotFound` if the thread does not exist.
    pub async fn list_replies(&self, thread_id: Uuid) -> Result<Vec<Reply>> {
        if self.repo.get_thread(thread_id).await?.is_none() {
            return Err(AppError::not_found("Thread", thread_id));
        }
        self.repo.list_replies(thread_id).await
    }

    async fn load(&self, id: Uuid) -> Result<Reply> {
        self.repo.get_reply(id).await?.ok_or_else(|| AppError::not_found("Reply", id))
    }

    /// Only the author may edit.
    pub async fn edit_reply(&self, caller: &User, id: Uuid, content: &str) -> Result<Reply> {
        let reply = self.load(id).await?;
        if reply.author_id != caller.id {
            return Err(AppError::Forbidden("Only the author can edit this reply".into()));
        }
        let content = validation::reply_content(content)?;
        self.repo.update_reply_content(id, content).await
    }

    /// The author or an admin may delete. Nested replies go with it.
    pub async fn delete_reply(&self, caller: &User, id: Uuid) -> Result<()> {
        let reply = self.load(id).await?;
        if reply.author_id != caller.id && !caller.is_admin {
            return Err(AppError::Forbidden("Only the author or an admin can delete this reply".into()));
        }
        self.repo.delete_reply(id).await?;
        info!(thread_id = %reply.thread_id, reply_id = %id, by = %caller.id, "reply deleted");
        Ok(())
    }

    /// Only the thread author may accept an answer.
    pub async fn accept_reply(&self, caller: &User, id: Uuid) -> Result<Reply> {
        let reply = self.load(id).await?;
        let thread = self
            .repo
            .get_thread(reply.thread_id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", reply.thread_id))?;
        if thread.author_id != caller.id {
            return Err(AppError::Forbidden("Only thread author can accept answers".into()));
        }
        let accepted = self.repo.accept_reply(id).await?;
        info!(thread_id = %thread.id, reply_id = %id, "answer accepted");
        Ok(accepted)
    }
}
