//! # Thread Service
//!
//! Thread creation returns as soon as the thread is stored; the automatic AI
//! answer runs as a background job whose handle is handed back to the caller.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sf_core::error::{AppError, Result};
use sf_core::models::{AiTrigger, Attachment, Category, ForumStats, NewThread, Thread, ThreadPage, ThreadQuery, User};
use sf_core::traits::ForumRepo;
use tracing::{info, warn};
use uuid::Uuid;

use crate::orchestrator::{AiJobHandle, AiJobStatus, AiOrchestrator};
use crate::validation;

#[derive(Debug, Clone)]
pub struct ThreadDraft {
    pub title: String,
    pub content: String,
    /// Category label, validated against the known set
    pub category: String,
    pub tags: Vec<String>,
    pub attachments: Vec<Attachment>,
}

pub struct CreatedThread {
    pub thread: Thread,
    /// `None` when the job could not be started; the thread stands regardless
    pub ai_job: Option<AiJobHandle>,
}

#[derive(Clone)]
pub struct ThreadService {
    repo: Arc<dyn ForumRepo>,
    orchestrator: Arc<AiOrchestrator>,
}

impl ThreadService {
    pub fn new(repo: Arc<dyn ForumRepo>, orchestrator: Arc<AiOrchestrator>) -> Self {
        Self { repo, orchestrator }
    }

    pub async fn create_thread(&self, author: &User, draft: ThreadDraft) -> Result<CreatedThread> {
        let new_thread = NewThread {
            title: validation::title(&draft.title)?,
            content: validation::thread_content(&draft.content)?,
            category: Category::from_str(draft.category.trim())?,
            author_id: author.id,
            tags: validation::tags(draft.tags)?,
            attachments: draft.attachments,
        };

        let thread = self.repo.create_thread(new_thread).await?;
        info!(thread_id = %thread.id, category = %thread.category, author_id = %author.id, "thread created");

        let ai_job = match self.orchestrator.spawn(&thread, AiTrigger::Automatic) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(thread_id = %thread.id, error = %err, "automatic AI answer not started");
                None
            }
        };

        Ok(CreatedThread { thread, ai_job })
    }

    /// Fetches a thread for display, counting the view.
    pub async fn view_thread(&self, id: Uuid) -> Result<Thread> {
        self.repo.record_thread_view(id).await?;
        self.get_thread(id).await
    }

    pub async fn get_thread(&self, id: Uuid) -> Result<Thread> {
        self.repo.get_thread(id).await?.ok_or_else(|| AppError::not_found("Thread", id))
    }

    pub async fn list_threads(&self, query: ThreadQuery) -> Result<ThreadPage> {
        validation::page(query.page, query.limit)?;
        self.repo.list_threads(&query).await
    }

    /// Starts a manually requested AI answer. `Conflict` while another job runs.
    pub async fn request_ai_answer(&self, thread_id: Uuid) -> Result<AiJobHandle> {
        let thread = self.get_thread(thread_id).await?;
        let handle = self.orchestrator.spawn(&thread, AiTrigger::Manual)?;
        info!(%thread_id, job_id = %handle.job_id(), "manual AI answer requested");
        Ok(handle)
    }

    pub async fn ai_status(&self, thread_id: Uuid) -> Result<Option<AiJobStatus>> {
        self.get_thread(thread_id).await?;
        Ok(self.orchestrator.status(thread_id))
    }

    pub async fn cancel_ai(&self, thread_id: Uuid) -> Result<AiJobStatus> {
        self.get_thread(thread_id).await?;
        self.orchestrator.cancel(thread_id)
    }

    /// `solved_today` counts from midnight UTC.
    pub async fn stats(&self) -> Result<ForumStats> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .ok_or_else(|| AppError::Internal("could not compute start of day".into()))?;
        self.repo.forum_stats(midnight).await
    }
}
