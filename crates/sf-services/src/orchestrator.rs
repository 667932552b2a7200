//! # AI Reply Orchestrator
//!
//! Runs AI answer generation for a thread as a tracked background job.
//!
//! Each job moves `Pending -> Answered | Failed | Cancelled` exactly once.
//! The state is published on a `watch` channel so callers can poll it, await
//! it, or cancel the job. At most one job per thread is in flight.
//!
//! A ticket leaves the registry as soon as its job settles; the final status
//! moves to a bounded history so pollers still see how the job ended.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use sf_core::error::{AppError, Result};
use sf_core::models::{AiAnnotation, AiTrigger, NewReply, NewUser, Thread, User};
use sf_core::traits::ForumRepo;
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::answer::AnswerGenerator;

/// Fixed context line handed to the generator with every forum question.
pub const FORUM_CONTEXT: &str = "This is a student forum question that needs a helpful educational response.";

/// Settled statuses kept for polling after their tickets are evicted.
pub const DEFAULT_SETTLED_HISTORY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AiJobState {
    Pending,
    Answered { reply_id: Uuid },
    Failed { reason: String },
    Cancelled,
}

impl AiJobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AiJobState::Pending)
    }
}

/// Point-in-time view of a job, as reported to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct AiJobStatus {
    pub job_id: Uuid,
    pub thread_id: Uuid,
    pub trigger: AiTrigger,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: AiJobState,
}

#[derive(Clone, Debug)]
struct JobTicket {
    job_id: Uuid,
    thread_id: Uuid,
    trigger: AiTrigger,
    started_at: DateTime<Utc>,
    state: watch::Receiver<AiJobState>,
    cancel: Arc<watch::Sender<bool>>,
}

impl JobTicket {
    fn status(&self) -> AiJobStatus {
        AiJobStatus {
            job_id: self.job_id,
            thread_id: self.thread_id,
            trigger: self.trigger,
            started_at: self.started_at,
            state: self.state.borrow().clone(),
        }
    }

    fn is_settled(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    async fn settled(mut self) -> AiJobState {
        // A dropped sender without a terminal state means the task died.
        let settled = self.state.wait_for(AiJobState::is_terminal).await.map(|s| s.clone());
        match settled {
            Ok(state) => state,
            Err(_) => {
                let last = self.state.borrow().clone();
                if last.is_terminal() {
                    last
                } else {
                    AiJobState::Failed { reason: "AI job ended unexpectedly".into() }
                }
            }
        }
    }
}

/// Owner's handle on a spawned job.
#[derive(Debug)]
pub struct AiJobHandle {
    ticket: JobTicket,
    join: JoinHandle<()>,
}

impl AiJobHandle {
    pub fn job_id(&self) -> Uuid {
        self.ticket.job_id
    }

    pub fn thread_id(&self) -> Uuid {
        self.ticket.thread_id
    }

    pub fn state(&self) -> AiJobState {
        self.ticket.state.borrow().clone()
    }

    pub fn status(&self) -> AiJobStatus {
        self.ticket.status()
    }

    /// Requests cancellation. A job that already settled is unaffected.
    pub fn cancel(&self) {
        self.ticket.cancel();
    }

    /// Waits for the job to settle and returns its final state.
    pub async fn wait(self) -> AiJobState {
        if let Err(err) = self.join.await {
            warn!(job_id = %self.ticket.job_id, error = %err, "AI job task did not complete");
        }
        self.ticket.settled().await
    }
}

/// Final statuses of evicted jobs, oldest dropped first.
struct SettledHistory {
    capacity: usize,
    statuses: DashMap<Uuid, AiJobStatus>,
    order: Mutex<VecDeque<(Uuid, Uuid)>>,
}

impl SettledHistory {
    fn new(capacity: usize) -> Self {
        Self { capacity, statuses: DashMap::new(), order: Mutex::new(VecDeque::new()) }
    }

    fn record(&self, status: AiJobStatus) {
        let key = (status.thread_id, status.job_id);
        self.statuses.insert(status.thread_id, status);

        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.push_back(key);
        while order.len() > self.capacity {
            let Some((thread_id, job_id)) = order.pop_front() else { break };
            // A newer job for the same thread keeps its entry.
            self.statuses.remove_if(&thread_id, |_, s| s.job_id == job_id);
        }
    }

    fn get(&self, thread_id: Uuid) -> Option<AiJobStatus> {
        self.statuses.get(&thread_id).map(|s| s.value().clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.statuses.len()
    }
}

enum JobError {
    Cancelled,
    Failed(AppError),
}

impl From<AppError> for JobError {
    fn from(err: AppError) -> Self {
        JobError::Failed(err)
    }
}

async fn cancel_requested(cancel: &mut watch::Receiver<bool>) {
    let sender_gone = cancel.wait_for(|requested| *requested).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

/// Races `work` against the cancel signal. A signal already raised wins.
async fn unless_cancelled<F: Future>(cancel: &mut watch::Receiver<bool>, work: F) -> std::result::Result<F::Output, JobError> {
    tokio::select! {
        biased;
        _ = cancel_requested(cancel) => Err(JobError::Cancelled),
        out = work => Ok(out),
    }
}

pub struct AiOrchestrator {
    repo: Arc<dyn ForumRepo>,
    generator: AnswerGenerator,
    jobs: DashMap<Uuid, JobTicket>,
    history: SettledHistory,
    ai_user: OnceCell<User>,
}

impl AiOrchestrator {
    pub fn new(repo: Arc<dyn ForumRepo>, generator: AnswerGenerator) -> Self {
        Self {
            repo,
            generator,
            jobs: DashMap::new(),
            history: SettledHistory::new(DEFAULT_SETTLED_HISTORY),
            ai_user: OnceCell::new(),
        }
    }

    /// Keeps at most `capacity` settled statuses for polling.
    pub fn with_history(mut self, capacity: usize) -> Self {
        self.history = SettledHistory::new(capacity);
        self
    }

    /// Returns the synthetic AI account, creating it on first use.
    pub async fn ensure_ai_user(&self) -> Result<User> {
        let user = self
            .ai_user
            .get_or_try_init(|| self.repo.get_or_create_user(NewUser::ai_bot()))
            .await?;
        Ok(user.clone())
    }

    /// Launches generation for `thread`. `Conflict` if a job for the thread
    /// has not settled yet.
    pub fn spawn(self: &Arc<Self>, thread: &Thread, trigger: AiTrigger) -> Result<AiJobHandle> {
        let (state_tx, state_rx) = watch::channel(AiJobState::Pending);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let ticket = JobTicket {
            job_id: Uuid::now_v7(),
            thread_id: thread.id,
            trigger,
            started_at: Utc::now(),
            state: state_rx,
            cancel: Arc::new(cancel_tx),
        };

        match self.jobs.entry(thread.id) {
            Entry::Occupied(entry) if !entry.get().is_settled() => {
                return Err(AppError::Conflict(format!(
                    "an AI answer for thread {} is already being generated",
                    thread.id
                )));
            }
            Entry::Occupied(mut entry) => {
                entry.insert(ticket.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(ticket.clone());
            }
        }

        let span = tracing::info_span!("ai_job", job_id = %ticket.job_id, thread_id = %thread.id, trigger = trigger.as_str());
        let this = Arc::clone(self);
        let thread = thread.clone();
        let own_ticket = ticket.clone();
        let join = tokio::spawn(
            async move {
                let state = match this.run(&thread, trigger, cancel_rx).await {
                    Ok(reply_id) => {
                        info!(%reply_id, "AI reply posted");
                        AiJobState::Answered { reply_id }
                    }
                    Err(JobError::Cancelled) => {
                        info!("AI job cancelled");
                        AiJobState::Cancelled
                    }
                    Err(JobError::Failed(err)) => {
                        warn!(error = %err, "AI reply generation failed");
                        AiJobState::Failed { reason: err.to_string() }
                    }
                };
                state_tx.send_replace(state);
                this.retire(&own_ticket);
            }
            .instrument(span),
        );

        debug!(job_id = %ticket.job_id, thread_id = %ticket.thread_id, "AI job spawned");
        Ok(AiJobHandle { ticket, join })
    }

    /// Moves a settled ticket's status into the history and drops the ticket.
    fn retire(&self, ticket: &JobTicket) {
        self.history.record(ticket.status());
        self.jobs.remove_if(&ticket.thread_id, |_, t| t.job_id == ticket.job_id);
    }

    async fn run(&self, thread: &Thread, trigger: AiTrigger, mut cancel: watch::Receiver<bool>) -> std::result::Result<Uuid, JobError> {
        let bot = unless_cancelled(&mut cancel, self.ensure_ai_user()).await??;

        if trigger == AiTrigger::Automatic {
            if let Some(existing) = self.repo.find_ai_reply(thread.id, AiTrigger::Automatic).await? {
                debug!(reply_id = %existing.id, "automatic AI reply already present");
                return Ok(existing.id);
            }
        }

        let question = thread.question_text();
        let category = thread.category.as_str();

        let answer = unless_cancelled(
            &mut cancel,
            self.generator.generate_answer(&question, category, FORUM_CONTEXT),
        )
        .await??;

        let follow_up_questions = unless_cancelled(
            &mut cancel,
            self.generator.generate_follow_up_questions(&question, &answer.answer, category),
        )
        .await?;

        if *cancel.borrow() {
            return Err(JobError::Cancelled);
        }

        let reply = NewReply {
            thread_id: thread.id,
            author_id: bot.id,
            parent_reply_id: None,
            content: answer.answer,
            ai: Some(AiAnnotation { confidence: answer.confidence, follow_up_questions, trigger }),
        };

        match self.repo.create_reply(reply).await {
            Ok(stored) => Ok(stored.id),
            // Another automatic job won the race; its reply stands for both.
            Err(AppError::Conflict(_)) if trigger == AiTrigger::Automatic => {
                let existing = self
                    .repo
                    .find_ai_reply(thread.id, AiTrigger::Automatic)
                    .await?
                    .ok_or_else(|| AppError::Internal("automatic AI reply conflict without a reply".into()))?;
                debug!(reply_id = %existing.id, "automatic AI reply already present");
                Ok(existing.id)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn ticket(&self, thread_id: Uuid) -> Option<JobTicket> {
        self.jobs.get(&thread_id).map(|t| t.value().clone())
    }

    /// Latest job for the thread, running or settled. `None` once a settled
    /// status has aged out of the history.
    pub fn status(&self, thread_id: Uuid) -> Option<AiJobStatus> {
        self.ticket(thread_id).map(|t| t.status()).or_else(|| self.history.get(thread_id))
    }

    /// Signals the thread's job to stop. `NotFound` when no job is known.
    pub fn cancel(&self, thread_id: Uuid) -> Result<AiJobStatus> {
        if let Some(ticket) = self.ticket(thread_id) {
            if !ticket.is_settled() {
                ticket.cancel();
                info!(%thread_id, job_id = %ticket.job_id, "AI job cancellation requested");
            }
            return Ok(ticket.status());
        }
        self.history.get(thread_id).ok_or_else(|| AppError::not_found("AI job", thread_id))
    }

    /// Waits until the thread's latest job settles. `None` if there is no job.
    pub async fn wait_for_settle(&self, thread_id: Uuid) -> Option<AiJobState> {
        match self.ticket(thread_id) {
            Some(ticket) => Some(ticket.settled().await),
            None => self.history.get(thread_id).map(|s| s.state),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.iter().filter(|t| !t.is_settled()).count()
    }
}
