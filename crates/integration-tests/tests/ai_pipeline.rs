//! Thread creation through to the posted AI reply.

mod support;

use std::sync::Arc;
use std::time::Duration;

use sf_core::error::AppError;
use sf_core::models::AiTrigger;
use sf_services::{AiJobState, ReplyDraft, ThreadDraft};
use support::{member, memory_repo, services, FileDb, Script, ScriptedGenerator, ANSWER};

fn draft() -> ThreadDraft {
    ThreadDraft {
        title: "Differentiating x squared".into(),
        content: "Why is the derivative of x^2 equal to 2x?".into(),
        category: "math".into(),
        tags: vec![" calculus ".into()],
        attachments: vec![],
    }
}

#[tokio::test]
async fn new_math_thread_receives_one_annotated_ai_reply() {
    let repo = memory_repo().await;
    let generator = Arc::new(ScriptedGenerator::new(Script::Answer));
    let forum = services(repo.clone(), generator.clone(), Duration::from_secs(2));
    let author = member(&repo, "Ada").await;

    let created = forum.threads.create_thread(&author, draft()).await.unwrap();
    assert_eq!(created.thread.tags, vec!["calculus".to_string()]);
    let job = created.ai_job.expect("automatic job started");

    let reply_id = match job.wait().await {
        AiJobState::Answered { reply_id } => reply_id,
        other => panic!("unexpected state {other:?}"),
    };

    let replies = forum.replies.list_replies(created.thread.id).await.unwrap();
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(reply.id, reply_id);
    assert_eq!(reply.content, ANSWER);
    assert!(reply.is_ai_generated);
    assert_eq!(reply.ai_trigger, Some(AiTrigger::Automatic));
    let confidence = reply.ai_confidence.expect("confidence");
    assert!((0.70..=0.95).contains(&confidence), "{confidence}");
    assert_eq!(reply.follow_up_questions.len(), 3);
    assert!(reply.follow_up_questions.iter().all(|q| !q.starts_with(char::is_numeric)));

    let bot = forum.ai.ensure_ai_user().await.unwrap();
    assert_eq!(reply.author_id, bot.id);
    assert!(bot.is_ai);

    let thread = forum.threads.get_thread(created.thread.id).await.unwrap();
    assert_eq!(thread.reply_count, 1);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn provider_failure_leaves_the_thread_without_replies() {
    let repo = memory_repo().await;
    let forum = services(repo.clone(), Arc::new(ScriptedGenerator::new(Script::Fail)), Duration::from_secs(2));
    let author = member(&repo, "Ada").await;

    let created = forum.threads.create_thread(&author, draft()).await.unwrap();
    let state = created.ai_job.expect("job").wait().await;
    assert!(matches!(state, AiJobState::Failed { .. }), "{state:?}");

    let thread = forum.threads.get_thread(created.thread.id).await.unwrap();
    assert_eq!(thread.reply_count, 0);
    assert!(forum.replies.list_replies(thread.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_provider_times_out_as_a_failure() {
    let repo = memory_repo().await;
    let slow = ScriptedGenerator::new(Script::Answer).with_delay(Duration::from_millis(500));
    let forum = services(repo.clone(), Arc::new(slow), Duration::from_millis(50));
    let author = member(&repo, "Ada").await;

    let created = forum.threads.create_thread(&author, draft()).await.unwrap();
    match created.ai_job.expect("job").wait().await {
        AiJobState::Failed { reason } => assert!(reason.contains("no response"), "{reason}"),
        other => panic!("unexpected state {other:?}"),
    }
    assert_eq!(forum.threads.get_thread(created.thread.id).await.unwrap().reply_count, 0);
}

#[tokio::test]
async fn cancelling_a_running_job_posts_nothing() {
    let repo = memory_repo().await;
    let slow = ScriptedGenerator::new(Script::Answer).with_delay(Duration::from_millis(300));
    let forum = services(repo.clone(), Arc::new(slow), Duration::from_secs(5));
    let author = member(&repo, "Ada").await;

    let created = forum.threads.create_thread(&author, draft()).await.unwrap();
    let thread_id = created.thread.id;
    let status = forum.threads.cancel_ai(thread_id).await.unwrap();
    assert_eq!(status.thread_id, thread_id);

    assert_eq!(forum.ai.wait_for_settle(thread_id).await, Some(AiJobState::Cancelled));
    assert_eq!(forum.threads.get_thread(thread_id).await.unwrap().reply_count, 0);
    assert_eq!(forum.ai.in_flight(), 0);
}

#[tokio::test]
async fn manual_request_while_a_job_runs_is_a_conflict() {
    let repo = memory_repo().await;
    let slow = ScriptedGenerator::new(Script::Answer).with_delay(Duration::from_millis(200));
    let forum = services(repo.clone(), Arc::new(slow), Duration::from_secs(5));
    let author = member(&repo, "Ada").await;

    let created = forum.threads.create_thread(&author, draft()).await.unwrap();
    let err = forum.threads.request_ai_answer(created.thread.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");

    created.ai_job.expect("job").wait().await;

    // Once settled, a manual answer may follow the automatic one.
    let manual = forum.threads.request_ai_answer(created.thread.id).await.unwrap();
    assert!(matches!(manual.wait().await, AiJobState::Answered { .. }));

    let replies = forum.replies.list_replies(created.thread.id).await.unwrap();
    let triggers: Vec<_> = replies.iter().filter_map(|r| r.ai_trigger).collect();
    assert_eq!(triggers.len(), 2);
    assert!(triggers.contains(&AiTrigger::Automatic));
    assert!(triggers.contains(&AiTrigger::Manual));
}

#[tokio::test]
async fn status_reports_the_latest_job() {
    let repo = memory_repo().await;
    let forum = services(repo.clone(), Arc::new(ScriptedGenerator::new(Script::Answer)), Duration::from_secs(2));
    let author = member(&repo, "Ada").await;

    let created = forum.threads.create_thread(&author, draft()).await.unwrap();
    let thread_id = created.thread.id;
    let job_id = created.ai_job.as_ref().map(|j| j.job_id());
    forum.ai.wait_for_settle(thread_id).await;

    let status = forum.threads.ai_status(thread_id).await.unwrap().expect("status");
    assert_eq!(Some(status.job_id), job_id);
    assert!(matches!(status.state, AiJobState::Answered { .. }));

    let body = serde_json::to_value(&status).unwrap();
    assert_eq!(body["state"], "answered");
    assert_eq!(body["trigger"], "automatic");

    let err = forum.threads.ai_status(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(..)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_yields_a_single_ai_account() {
    let repo = memory_repo().await;
    let forum = services(repo.clone(), Arc::new(ScriptedGenerator::new(Script::Answer)), Duration::from_secs(2));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ai = forum.ai.clone();
            tokio::spawn(async move { ai.ensure_ai_user().await })
        })
        .collect();
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.expect("task").expect("ai user").id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    // A second orchestrator on the same store finds the existing account.
    let other = services(repo.clone(), Arc::new(ScriptedGenerator::new(Script::Answer)), Duration::from_secs(2));
    assert_eq!(other.ai.ensure_ai_user().await.unwrap().id, ids[0]);
}

#[tokio::test]
async fn blank_provider_output_is_not_posted() {
    use sf_core::traits::MockTextGenerator;
    use sf_services::{AnswerGenerator, ForumServices};

    let mut provider = MockTextGenerator::new();
    provider.expect_generate().times(1).returning(|_| Ok("   \n".into()));

    let repo = memory_repo().await;
    let forum = ForumServices::new(repo.clone(), AnswerGenerator::new(Arc::new(provider), Duration::from_secs(1)));
    let author = member(&repo, "Ada").await;

    let created = tokio_test::assert_ok!(forum.threads.create_thread(&author, draft()).await);
    match created.ai_job.expect("job").wait().await {
        AiJobState::Failed { reason } => assert!(reason.contains("empty"), "{reason}"),
        other => panic!("unexpected state {other:?}"),
    }
    assert!(forum.replies.list_replies(created.thread.id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_orchestrators_on_one_file_database_share_the_ai_account() {
    let db = FileDb::open(4).await;

    // Each orchestrator has its own in-process guard, so the store's unique
    // email is what keeps the account single.
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let forum = services(db.repo.clone(), Arc::new(ScriptedGenerator::new(Script::Answer)), Duration::from_secs(2));
            tokio::spawn(async move { forum.ai.ensure_ai_user().await })
        })
        .collect();
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.expect("task").expect("ai user").id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let forum = services(db.repo.clone(), Arc::new(ScriptedGenerator::new(Script::Answer)), Duration::from_secs(2));
    assert_eq!(forum.threads.stats().await.unwrap().total_users, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reply_count_matches_rows_when_ai_and_members_reply_together() {
    let db = FileDb::open(4).await;
    let generator = Arc::new(ScriptedGenerator::new(Script::Answer).with_delay(Duration::from_millis(20)));
    let forum = services(db.repo.clone(), generator, Duration::from_secs(5));
    let author = member(&db.repo, "Ada").await;
    let mut members = Vec::new();
    for i in 0..10 {
        members.push(member(&db.repo, &format!("Helper{i}")).await);
    }

    let created = forum.threads.create_thread(&author, draft()).await.unwrap();
    let thread_id = created.thread.id;
    let job = created.ai_job.expect("automatic job started");

    let tasks: Vec<_> = members
        .into_iter()
        .map(|helper| {
            let replies = forum.replies.clone();
            tokio::spawn(async move {
                let draft = ReplyDraft {
                    thread_id,
                    parent_reply_id: None,
                    content: format!("{} says: use the power rule.", helper.display_name),
                };
                replies.create_reply(&helper, draft).await
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("reply task").expect("reply");
    }
    assert!(matches!(job.wait().await, AiJobState::Answered { .. }));

    let rows = forum.replies.list_replies(thread_id).await.unwrap();
    assert_eq!(rows.len(), 11);
    assert_eq!(rows.iter().filter(|r| r.is_ai_generated).count(), 1);
    assert_eq!(forum.threads.get_thread(thread_id).await.unwrap().reply_count, 11);
}
