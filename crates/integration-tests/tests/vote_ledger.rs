//! Vote ledger behaviour across services and real SQLite pools.

mod support;

use std::sync::Arc;

use sf_core::error::AppError;
use sf_core::models::{NewReply, VoteAction, VoteDirection, VoteTarget};
use sf_services::VoteLedger;
use support::{math_thread, member, memory_repo, FileDb};

#[tokio::test]
async fn vote_transitions_keep_counters_in_step_with_ledger() {
    let repo = memory_repo().await;
    let author = member(&repo, "Ada").await;
    let voter = member(&repo, "Grace").await;
    let thread = math_thread(&repo, &author).await;
    let ledger = VoteLedger::new(repo.clone());
    let target = VoteTarget::thread(thread.id);

    let tally = ledger.cast_vote(voter.id, thread.id, "thread", "upvote").await.unwrap();
    assert_eq!((tally.upvotes, tally.downvotes, tally.score), (1, 0, 1));
    assert_eq!(tally.user_vote, Some(VoteDirection::Up));

    // Repeating the same vote is a no-op.
    let tally = ledger.cast(voter.id, target, VoteAction::Upvote).await.unwrap();
    assert_eq!((tally.upvotes, tally.downvotes), (1, 0));

    let tally = ledger.cast(voter.id, target, VoteAction::Downvote).await.unwrap();
    assert_eq!((tally.upvotes, tally.downvotes, tally.score), (0, 1, -1));

    let tally = ledger.cast(voter.id, target, VoteAction::Remove).await.unwrap();
    assert_eq!((tally.upvotes, tally.downvotes, tally.score), (0, 0, 0));
    assert_eq!(tally.user_vote, None);
    assert_eq!(ledger.user_vote(voter.id, target).await.unwrap(), None);

    let resynced = ledger.resync(target).await.unwrap();
    assert_eq!((resynced.upvotes, resynced.downvotes), (0, 0));
}

#[tokio::test]
async fn unknown_labels_and_targets_are_rejected() {
    let repo = memory_repo().await;
    let voter = member(&repo, "Grace").await;
    let ledger = VoteLedger::new(repo.clone());

    let err = ledger.cast_vote(voter.id, uuid::Uuid::new_v4(), "thread", "sideways").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)), "{err:?}");

    let err = ledger.cast_vote(voter.id, uuid::Uuid::new_v4(), "poll", "upvote").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)), "{err:?}");

    let err = ledger.cast_vote(voter.id, uuid::Uuid::new_v4(), "reply", "upvote").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(..)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upvotes_on_a_pooled_file_database_are_all_counted() {
    let db = FileDb::open(4).await;
    let author = member(&db.repo, "Ada").await;
    let thread = math_thread(&db.repo, &author).await;
    let ledger = Arc::new(VoteLedger::new(db.repo.clone()));

    let mut voters = Vec::new();
    for name in ["Grace", "Alan", "Barbara", "Edsger", "Donald", "Frances"] {
        voters.push(member(&db.repo, name).await);
    }

    let tasks: Vec<_> = voters
        .iter()
        .map(|voter| {
            let ledger = ledger.clone();
            let voter_id = voter.id;
            tokio::spawn(async move { ledger.cast(voter_id, VoteTarget::thread(thread.id), VoteAction::Upvote).await })
        })
        .collect();
    for task in tasks {
        task.await.expect("vote task").expect("vote");
    }

    let stored = db.repo.get_thread(thread.id).await.unwrap().unwrap();
    assert_eq!(stored.upvotes, voters.len() as i64);
    assert_eq!(stored.downvotes, 0);

    let resynced = ledger.resync(VoteTarget::thread(thread.id)).await.unwrap();
    assert_eq!(resynced.upvotes, stored.upvotes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_simultaneous_upvotes_raise_the_score_by_two() {
    let repo = memory_repo().await;
    let author = member(&repo, "Ada").await;
    let first = member(&repo, "Grace").await;
    let second = member(&repo, "Alan").await;
    let thread = math_thread(&repo, &author).await;
    let ledger = VoteLedger::new(repo.clone());
    let target = VoteTarget::thread(thread.id);

    let (a, b) = tokio::join!(
        ledger.cast(first.id, target, VoteAction::Upvote),
        ledger.cast(second.id, target, VoteAction::Upvote),
    );
    a.unwrap();
    b.unwrap();

    let stored = repo.get_thread(thread.id).await.unwrap().unwrap();
    assert_eq!(stored.vote_score(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reply_votes_on_a_pooled_file_database_stay_consistent() {
    let db = FileDb::open(4).await;
    let author = member(&db.repo, "Ada").await;
    let thread = math_thread(&db.repo, &author).await;
    let reply = db
        .repo
        .create_reply(NewReply {
            thread_id: thread.id,
            author_id: author.id,
            parent_reply_id: None,
            content: "Bring the exponent down and subtract one from it.".into(),
            ai: None,
        })
        .await
        .unwrap();
    let target = VoteTarget::reply(reply.id);
    let ledger = Arc::new(VoteLedger::new(db.repo.clone()));

    let mut voters = Vec::new();
    for i in 0..12 {
        voters.push(member(&db.repo, &format!("Voter{i}")).await.id);
    }

    let cast_all = |action_for: fn(usize) -> VoteAction| {
        let tasks: Vec<_> = voters
            .iter()
            .enumerate()
            .map(|(i, &voter_id)| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.cast(voter_id, target, action_for(i)).await })
            })
            .collect();
        async move {
            for task in tasks {
                task.await.expect("vote task").expect("vote");
            }
        }
    };

    cast_all(|_| VoteAction::Upvote).await;
    let stored = db.repo.get_reply(reply.id).await.unwrap().unwrap();
    assert_eq!((stored.upvotes, stored.downvotes), (12, 0));

    // Every third voter flips, every fourth withdraws, the rest repeat.
    cast_all(|i| match i {
        i if i % 3 == 0 => VoteAction::Downvote,
        i if i % 4 == 0 => VoteAction::Remove,
        _ => VoteAction::Upvote,
    })
    .await;
    let stored = db.repo.get_reply(reply.id).await.unwrap().unwrap();
    // Downvotes: 0, 3, 6, 9. Removed: 4, 8.
    assert_eq!((stored.upvotes, stored.downvotes), (6, 4));

    let resynced = ledger.resync(target).await.unwrap();
    assert_eq!((resynced.upvotes, resynced.downvotes), (6, 4));
}
