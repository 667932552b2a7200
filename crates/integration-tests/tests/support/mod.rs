//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sf_core::models::{Category, NewThread, NewUser, Thread, User};
use sf_core::traits::{ForumRepo, TextGenerator};
use sf_db_sqlite::SqliteForumRepo;
use sf_services::{AnswerGenerator, ForumServices};

pub const ANSWER: &str =
    "First, write down what you know. Then apply the power rule step by step. For example, x^2 becomes 2x.";
pub const FOLLOW_UPS: &str = "1. What is the chain rule used for?\n2. ok\n3. How do derivatives describe velocity?\n4. Why does the power rule work at all?";

pub async fn memory_repo() -> Arc<dyn ForumRepo> {
    Arc::new(SqliteForumRepo::in_memory().await.expect("in-memory store"))
}

/// A WAL database file under the temp dir, removed on drop.
pub struct FileDb {
    pub path: PathBuf,
    pub repo: Arc<dyn ForumRepo>,
}

impl FileDb {
    pub async fn open(max_connections: u32) -> Self {
        let path = std::env::temp_dir().join(format!("study-forum-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());
        let repo = SqliteForumRepo::connect(&url, max_connections).await.expect("file store");
        Self { path, repo: Arc::new(repo) }
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

pub async fn member(repo: &Arc<dyn ForumRepo>, name: &str) -> User {
    repo.create_user(NewUser {
        email: format!("{}@campus.edu", name.to_lowercase()),
        display_name: name.to_string(),
        avatar: None,
        reputation: 0,
        is_admin: false,
        is_ai: false,
    })
    .await
    .expect("member")
}

pub async fn math_thread(repo: &Arc<dyn ForumRepo>, author: &User) -> Thread {
    repo.create_thread(NewThread {
        title: "How do I differentiate x squared?".into(),
        content: "The power rule confuses me, could someone walk through it?".into(),
        category: Category::Math,
        author_id: author.id,
        tags: vec!["calculus".into(), "derivatives".into()],
        attachments: vec![],
    })
    .await
    .expect("thread")
}

#[derive(Clone, Copy)]
pub enum Script {
    Answer,
    Fail,
}

/// Generator with a fixed script, optional latency and a call counter.
pub struct ScriptedGenerator {
    script: Script,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(script: Script) -> Self {
        Self { script, delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.script {
            Script::Fail => anyhow::bail!("provider unavailable"),
            Script::Answer if prompt.starts_with("Based on this question and answer") => Ok(FOLLOW_UPS.into()),
            Script::Answer => Ok(ANSWER.into()),
        }
    }
}

pub fn services(repo: Arc<dyn ForumRepo>, generator: Arc<ScriptedGenerator>, timeout: Duration) -> ForumServices {
    ForumServices::new(repo, AnswerGenerator::new(generator, timeout))
}
