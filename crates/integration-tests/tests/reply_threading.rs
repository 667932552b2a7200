//! Reply nesting, permissions and accepted answers through the services.

mod support;

use std::sync::Arc;
use std::time::Duration;

use sf_core::error::AppError;
use sf_core::models::NewUser;
use sf_services::{ForumServices, ReplyDraft};
use support::{math_thread, member, memory_repo, services, Script, ScriptedGenerator};
use uuid::Uuid;

async fn forum() -> (ForumServices, Arc<dyn sf_core::traits::ForumRepo>) {
    let repo = memory_repo().await;
    let forum = services(repo.clone(), Arc::new(ScriptedGenerator::new(Script::Fail)), Duration::from_secs(1));
    (forum, repo)
}

fn reply_to(thread_id: Uuid, parent_reply_id: Option<Uuid>) -> ReplyDraft {
    ReplyDraft { thread_id, parent_reply_id, content: "Check the definition of the limit first.".into() }
}

#[tokio::test]
async fn nesting_is_limited_to_one_level_within_the_same_thread() {
    let (forum, repo) = forum().await;
    let ada = member(&repo, "Ada").await;
    let grace = member(&repo, "Grace").await;
    let thread = math_thread(&repo, &ada).await;
    let other = math_thread(&repo, &grace).await;

    let top = forum.replies.create_reply(&grace, reply_to(thread.id, None)).await.unwrap();
    let nested = forum.replies.create_reply(&ada, reply_to(thread.id, Some(top.id))).await.unwrap();
    assert_eq!(nested.parent_reply_id, Some(top.id));

    let err = forum.replies.create_reply(&grace, reply_to(thread.id, Some(nested.id))).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)), "{err:?}");

    let err = forum.replies.create_reply(&grace, reply_to(other.id, Some(top.id))).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)), "{err:?}");

    let err = forum.replies.create_reply(&grace, reply_to(thread.id, Some(Uuid::new_v4()))).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(..)), "{err:?}");

    let err = forum.replies.create_reply(&grace, reply_to(Uuid::new_v4(), None)).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(..)), "{err:?}");

    assert_eq!(forum.threads.get_thread(thread.id).await.unwrap().reply_count, 2);
}

#[tokio::test]
async fn deleting_a_top_level_reply_takes_its_children_along() {
    let (forum, repo) = forum().await;
    let ada = member(&repo, "Ada").await;
    let grace = member(&repo, "Grace").await;
    let thread = math_thread(&repo, &ada).await;

    let top = forum.replies.create_reply(&grace, reply_to(thread.id, None)).await.unwrap();
    forum.replies.create_reply(&ada, reply_to(thread.id, Some(top.id))).await.unwrap();
    forum.replies.create_reply(&ada, reply_to(thread.id, None)).await.unwrap();

    let err = forum.replies.delete_reply(&ada, top.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");

    forum.replies.delete_reply(&grace, top.id).await.unwrap();
    let remaining = forum.replies.list_replies(thread.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(forum.threads.get_thread(thread.id).await.unwrap().reply_count, 1);
}

#[tokio::test]
async fn admins_may_delete_any_reply_but_only_authors_edit() {
    let (forum, repo) = forum().await;
    let ada = member(&repo, "Ada").await;
    let grace = member(&repo, "Grace").await;
    let admin = repo
        .create_user(NewUser {
            email: "dean@campus.edu".into(),
            display_name: "Dean".into(),
            avatar: None,
            reputation: 0,
            is_admin: true,
            is_ai: false,
        })
        .await
        .unwrap();
    let thread = math_thread(&repo, &ada).await;
    let reply = forum.replies.create_reply(&grace, reply_to(thread.id, None)).await.unwrap();

    let err = forum.replies.edit_reply(&admin, reply.id, "Rewritten by someone else").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");

    let err = forum.replies.edit_reply(&grace, reply.id, "tiny").await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)), "{err:?}");

    let edited = forum.replies.edit_reply(&grace, reply.id, "Start from the limit definition.").await.unwrap();
    assert!(edited.is_edited);
    assert!(edited.edited_at.is_some());
    assert_eq!(edited.content, "Start from the limit definition.");

    forum.replies.delete_reply(&admin, reply.id).await.unwrap();
    assert!(forum.replies.list_replies(thread.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn accepting_an_answer_resolves_the_thread() {
    let (forum, repo) = forum().await;
    let ada = member(&repo, "Ada").await;
    let grace = member(&repo, "Grace").await;
    let thread = math_thread(&repo, &ada).await;
    let first = forum.replies.create_reply(&grace, reply_to(thread.id, None)).await.unwrap();
    let second = forum.replies.create_reply(&grace, reply_to(thread.id, None)).await.unwrap();

    let err = forum.replies.accept_reply(&grace, first.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");

    forum.replies.accept_reply(&ada, first.id).await.unwrap();
    let accepted = forum.replies.accept_reply(&ada, second.id).await.unwrap();
    assert!(accepted.is_accepted);

    let replies = forum.replies.list_replies(thread.id).await.unwrap();
    assert_eq!(replies.iter().filter(|r| r.is_accepted).count(), 1);
    assert!(forum.threads.get_thread(thread.id).await.unwrap().is_resolved);

    let stats = forum.threads.stats().await.unwrap();
    assert_eq!(stats.solved_today, 1);
    assert_eq!(stats.total_replies, 2);
}
