//! Fills the configured database with sample accounts, threads, replies and votes.
//!
//! Accounts are upserted by email, so running the seeder twice adds a second
//! batch of threads without duplicating users.

use std::sync::Arc;

use anyhow::Context;
use sf_config::Settings;
use sf_core::models::{Category, NewThread, NewUser, User, VoteAction, VoteTarget};
use sf_core::traits::ForumRepo;
use sf_db_sqlite::SqliteForumRepo;
use sf_services::{ReplyDraft, ReplyService, VoteLedger};
use tracing::info;
use tracing_subscriber::EnvFilter;

const STUDENTS: u32 = 5;
const THREADS: usize = 10;
const SEEDED_CATEGORIES: [Category; 5] =
    [Category::General, Category::Homework, Category::Programming, Category::Math, Category::Science];

fn profile(email: &str, display_name: &str, reputation: i64, is_admin: bool) -> NewUser {
    NewUser {
        email: email.to_string(),
        display_name: display_name.to_string(),
        avatar: None,
        reputation,
        is_admin,
        is_ai: false,
    }
}

async fn seed_users(repo: &Arc<dyn ForumRepo>) -> anyhow::Result<(User, Vec<User>)> {
    let admin = repo.get_or_create_user(profile("admin@example.com", "Admin User", 1000, true)).await?;

    let mut students = Vec::new();
    for i in 1..=STUDENTS {
        let student = profile(&format!("student{i}@example.com"), &format!("Student {i}"), i64::from(i) * 83 % 500, false);
        students.push(repo.get_or_create_user(student).await?);
    }
    info!(students = students.len(), "users ready");
    Ok((admin, students))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load().context("loading configuration")?;
    let repo: Arc<dyn ForumRepo> = Arc::new(
        SqliteForumRepo::connect(&settings.database.url, settings.database.max_connections)
            .await
            .with_context(|| format!("opening database {}", settings.database.url))?,
    );
    let replies = ReplyService::new(repo.clone());
    let votes = VoteLedger::new(repo.clone());

    let (_admin, students) = seed_users(&repo).await?;

    let mut reply_total = 0;
    for i in 1..=THREADS {
        let author = &students[i % students.len()];
        let thread = repo
            .create_thread(NewThread {
                title: format!("Sample Question {i}: How to solve this problem?"),
                content: format!(
                    "This is a detailed question about topic {i}. I'm having trouble understanding the concept \
                     and would appreciate any help from the community."
                ),
                category: SEEDED_CATEGORIES[i % SEEDED_CATEGORIES.len()],
                author_id: author.id,
                tags: vec![format!("tag{i}"), "help".into(), "question".into()],
                attachments: vec![],
            })
            .await?;

        // Distinct voters only, so the tally is exactly the number of voters.
        for voter in students.iter().take(i % 5) {
            votes.cast(voter.id, VoteTarget::thread(thread.id), VoteAction::Upvote).await?;
        }
        for _ in 0..(i % 100) {
            repo.record_thread_view(thread.id).await?;
        }

        for r in 0..(i % 3 + 1) {
            let responder = &students[(i + r + 1) % students.len()];
            let reply = replies
                .create_reply(
                    responder,
                    ReplyDraft {
                        thread_id: thread.id,
                        parent_reply_id: None,
                        content: "This is a helpful reply to the question. Here's my suggestion for solving this problem..."
                            .into(),
                    },
                )
                .await?;
            for voter in students.iter().skip(r).take(2) {
                votes.cast(voter.id, VoteTarget::reply(reply.id), VoteAction::Upvote).await?;
            }
            reply_total += 1;
        }
    }

    info!(threads = THREADS, replies = reply_total, "seed data created");
    info!("test accounts: admin@example.com, student1@example.com");
    Ok(())
}
