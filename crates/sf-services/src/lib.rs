//! # sf-services
//!
//! Use cases of the study forum, written against the `sf-core` ports only.

pub mod answer;
pub mod orchestrator;
pub mod replies;
pub mod threads;
pub mod users;
pub mod validation;
pub mod votes;

use std::sync::Arc;

use sf_core::traits::ForumRepo;

pub use answer::{AnswerGenerator, GeneratedAnswer, UnconfiguredGenerator};
pub use orchestrator::{AiJobHandle, AiJobState, AiJobStatus, AiOrchestrator};
pub use replies::{ReplyDraft, ReplyService};
pub use threads::{CreatedThread, ThreadDraft, ThreadService};
pub use users::{ProfileDraft, UserService};
pub use votes::VoteLedger;

/// Every service wired to one store and one answer generator.
#[derive(Clone)]
pub struct ForumServices {
    pub users: UserService,
    pub threads: ThreadService,
    pub replies: ReplyService,
    pub votes: VoteLedger,
    pub ai: Arc<AiOrchestrator>,
}

impl ForumServices {
    pub fn new(repo: Arc<dyn ForumRepo>, generator: AnswerGenerator) -> Self {
        let ai = Arc::new(AiOrchestrator::new(repo.clone(), generator));
        Self {
            users: UserService::new(repo.clone()),
            threads: ThreadService::new(repo.clone(), ai.clone()),
            replies: ReplyService::new(repo.clone()),
            votes: VoteLedger::new(repo),
            ai,
        }
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use sf_core::models::{Category, NewThread, NewUser, Thread, User};
    use sf_core::traits::{ForumRepo, TextGenerator};
    use sf_db_sqlite::SqliteForumRepo;

    pub async fn repo() -> Arc<dyn ForumRepo> {
        Arc::new(SqliteForumRepo::in_memory().await.expect("in-memory store"))
    }

    pub async fn student(repo: &Arc<dyn ForumRepo>, n: u32) -> User {
        repo.create_user(NewUser {
            email: format!("student{n}@school.edu"),
            display_name: format!("Student {n}"),
            avatar: None,
            reputation: 0,
            is_admin: false,
            is_ai: false,
        })
        .await
        .expect("student")
    }

    pub async fn admin(repo: &Arc<dyn ForumRepo>) -> User {
        repo.create_user(NewUser {
            email: "admin@school.edu".into(),
            display_name: "Admin".into(),
            avatar: None,
            reputation: 0,
            is_admin: true,
            is_ai: false,
        })
        .await
        .expect("admin")
    }

    pub async fn thread_by(repo: &Arc<dyn ForumRepo>, author: &User) -> Thread {
        repo.create_thread(NewThread {
            title: "What is the derivative of x squared?".into(),
            content: "I know the power rule exists but not how to apply it.".into(),
            category: Category::Math,
            author_id: author.id,
            tags: vec!["calculus".into()],
            attachments: vec![],
        })
        .await
        .expect("thread")
    }

    pub async fn repo_with_thread() -> (Arc<dyn ForumRepo>, User, Thread) {
        let repo = repo().await;
        let alice = student(&repo, 1).await;
        let thread = thread_by(&repo, &alice).await;
        (repo, alice, thread)
    }

    /// Answers every prompt; follow-up prompts get a numbered list.
    pub struct ScriptedGenerator {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedGenerator {
        pub fn answering() -> Self {
            Self { delay: Duration::ZERO, calls: Arc::new(AtomicUsize::new(0)) }
        }

        /// Counts provider calls, readable after the generator is moved.
        pub fn call_counter(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if prompt.starts_with("Based on this question and answer") {
                return Ok("1. What is the chain rule?\n2. ok\n3. How do derivatives apply to velocity?".into());
            }
            Ok("First, apply the power rule: bring the exponent down, then subtract one. For example, x^2 becomes 2x.".into())
        }
    }
}
