//! # sf-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `sf-core` domain models.
//!
//! # Developer Note
//! Every write that touches a denormalized counter runs inside a transaction
//! together with the row change that causes it. SQLite reports concurrent
//! writers as `SQLITE_BUSY`/`SQLITE_LOCKED`; those are classified as
//! `StorageConflict` and the whole transaction is replayed.

mod rows;

use std::borrow::Cow;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sf_core::error::{AppError, Result};
use sf_core::models::{
    AiTrigger, Category, ForumStats, NewReply, NewThread, NewUser, Reply, TargetKind, Thread,
    ThreadPage, ThreadQuery, ThreadSort, User, Vote, VoteAction, VoteDirection, VoteTally,
    VoteTarget,
};
use sf_core::traits::ForumRepo;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rows::{
    to_json_column, ReplyRow, ThreadRow, UserRow, VoteRow, REPLY_COLUMNS, THREAD_COLUMNS,
    USER_COLUMNS,
};

/// Attempts per transaction before a storage conflict is surfaced.
const MAX_TX_ATTEMPTS: u32 = 8;

/// Internal error shape so both `sqlx` and domain errors can use `?`.
#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    App(#[from] AppError),
}

type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::App(app) => app,
            StoreError::Sqlx(sqlx::Error::Database(db)) => {
                if db.is_unique_violation() {
                    AppError::Conflict(db.message().to_string())
                } else if db.is_foreign_key_violation() {
                    AppError::InvalidArgument(format!("referenced row does not exist: {}", db.message()))
                } else if is_busy_code(db.code()) {
                    AppError::StorageConflict(db.message().to_string())
                } else {
                    AppError::Internal(db.message().to_string())
                }
            }
            StoreError::Sqlx(other) => AppError::Internal(other.to_string()),
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
fn is_busy_code(code: Option<Cow<'_, str>>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

fn counter_table(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Thread => "threads",
        TargetKind::Reply => "replies",
    }
}

fn counter_column(direction: VoteDirection) -> &'static str {
    match direction {
        VoteDirection::Up => "upvotes",
        VoteDirection::Down => "downvotes",
    }
}

/// Escapes LIKE wildcards so user search terms match literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    // SQLite's LOWER() only folds ASCII, so the term is folded the same way.
    for ch in term.to_ascii_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub struct SqliteForumRepo {
    pool: SqlitePool,
}

impl SqliteForumRepo {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    ///
    /// In-memory databases live and die with a connection, so they are pinned
    /// to a single connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let inner = async {
            let options = SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(5));

            let in_memory = url.contains(":memory:") || url.contains("mode=memory");
            let pool = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await?
            } else {
                SqlitePoolOptions::new()
                    .max_connections(max_connections.max(1))
                    .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                    .await?
            };

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| AppError::Internal(format!("migration failed: {e}")))?;

            StoreResult::Ok(pool)
        };

        let pool = inner.await?;
        info!(url, "sqlite forum store ready");
        Ok(Self { pool })
    }

    /// A private, migrated in-memory database. Used by tests and the seeder's dry runs.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replays `op` while it fails with a storage conflict.
    async fn retrying<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await.map_err(AppError::from) {
                Err(err) if err.is_retryable() && attempt < MAX_TX_ATTEMPTS => {
                    debug!(op, attempt, error = %err, "storage conflict, replaying transaction");
                    tokio::time::sleep(Duration::from_millis(5 << attempt)).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    warn!(op, attempts = attempt, error = %err, "storage conflict persisted");
                    return Err(err);
                }
                other => return other,
            }
        }
    }

    async fn fetch_thread(conn: &mut SqliteConnection, id: Uuid) -> StoreResult<Option<Thread>> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?");
        let row = sqlx::query_as::<_, ThreadRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(Thread::try_from).transpose()?)
    }

    async fn fetch_reply(conn: &mut SqliteConnection, id: Uuid) -> StoreResult<Option<Reply>> {
        let sql = format!("SELECT {REPLY_COLUMNS} FROM replies WHERE id = ?");
        let row = sqlx::query_as::<_, ReplyRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(Reply::try_from).transpose()?)
    }

    /// Recompute-by-count: self-healing against any missed update.
    async fn recount_replies(conn: &mut SqliteConnection, thread_id: Uuid) -> StoreResult<i64> {
        let now = Utc::now();
        let count: i64 = sqlx::query_scalar(
            "UPDATE threads SET reply_count = (SELECT COUNT(*) FROM replies WHERE thread_id = ?1), \
             updated_at = ?2 WHERE id = ?1 RETURNING reply_count",
        )
        .bind(thread_id)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    async fn read_counters(conn: &mut SqliteConnection, target: VoteTarget) -> StoreResult<Option<(i64, i64)>> {
        let sql = format!("SELECT upvotes, downvotes FROM {} WHERE id = ?", counter_table(target.kind));
        let counters = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(target.id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(counters)
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, display_name, avatar, reputation, is_admin, is_ai, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(normalize_email(&user.email))
            .bind(user.display_name.trim())
            .bind(user.avatar.as_deref())
            .bind(user.reputation)
            .bind(user.is_admin)
            .bind(user.is_ai)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn upsert_user(&self, user: &NewUser) -> StoreResult<User> {
        let email = normalize_email(&user.email);
        // ON CONFLICT leaves the first writer's row untouched; everyone reads it back.
        sqlx::query(
            "INSERT INTO users (id, email, display_name, avatar, reputation, is_admin, is_ai, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(email) DO NOTHING",
        )
        .bind(Uuid::now_v7())
        .bind(&email)
        .bind(user.display_name.trim())
        .bind(user.avatar.as_deref())
        .bind(user.reputation)
        .bind(user.is_admin)
        .bind(user.is_ai)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&email)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn insert_reply_tx(&self, reply: &NewReply) -> StoreResult<Reply> {
        let mut tx = self.pool.begin().await?;

        let thread_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM threads WHERE id = ?")
            .bind(reply.thread_id)
            .fetch_optional(&mut *tx)
            .await?;
        if thread_exists.is_none() {
            return Err(AppError::not_found("Thread", reply.thread_id).into());
        }

        let now = Utc::now();
        let (is_ai, confidence, trigger, follow_ups) = match &reply.ai {
            Some(ai) => (
                true,
                Some(ai.confidence),
                Some(ai.trigger.as_str()),
                to_json_column(&ai.follow_up_questions)?,
            ),
            None => (false, None, None, "[]".to_string()),
        };

        let sql = format!(
            "INSERT INTO replies (id, thread_id, author_id, parent_reply_id, content, is_ai_generated, \
             ai_confidence, ai_trigger, follow_up_questions, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {REPLY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ReplyRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(reply.thread_id)
            .bind(reply.author_id)
            .bind(reply.parent_reply_id)
            .bind(&reply.content)
            .bind(is_ai)
            .bind(confidence)
            .bind(trigger)
            .bind(follow_ups)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
        let created = Reply::try_from(row)?;

        let reply_count = Self::recount_replies(&mut tx, reply.thread_id).await?;
        tx.commit().await?;

        debug!(thread_id = %created.thread_id, reply_id = %created.id, reply_count, "reply stored");
        Ok(created)
    }

    async fn delete_reply_tx(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let thread_id: Option<Uuid> = sqlx::query_scalar("SELECT thread_id FROM replies WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(thread_id) = thread_id else {
            return Err(AppError::not_found("Reply", id).into());
        };

        // Ledger rows for the reply and anything nested under it go first.
        sqlx::query(
            "DELETE FROM votes WHERE target_kind = 'reply' AND target_id IN \
             (SELECT id FROM replies WHERE id = ?1 OR parent_reply_id = ?1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Nested replies cascade through the parent_reply_id foreign key.
        sqlx::query("DELETE FROM replies WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // A thread stays resolved only while it still holds an accepted reply.
        let reopened = sqlx::query(
            "UPDATE threads SET is_resolved = 0, updated_at = ? WHERE id = ? AND is_resolved = 1 \
             AND NOT EXISTS (SELECT 1 FROM replies WHERE thread_id = threads.id AND is_accepted = 1)",
        )
        .bind(Utc::now())
        .bind(thread_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let reply_count = Self::recount_replies(&mut tx, thread_id).await?;
        tx.commit().await?;

        debug!(%thread_id, reply_id = %id, reply_count, reopened, "reply removed");
        Ok(())
    }

    async fn accept_reply_tx(&self, id: Uuid) -> StoreResult<Reply> {
        let mut tx = self.pool.begin().await?;

        let thread_id: Option<Uuid> = sqlx::query_scalar("SELECT thread_id FROM replies WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(thread_id) = thread_id else {
            return Err(AppError::not_found("Reply", id).into());
        };

        let now = Utc::now();
        sqlx::query("UPDATE replies SET is_accepted = 0 WHERE thread_id = ? AND is_accepted = 1 AND id <> ?")
            .bind(thread_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE replies SET is_accepted = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE threads SET is_resolved = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;

        let accepted = Self::fetch_reply(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found("Reply", id))?;
        tx.commit().await?;
        Ok(accepted)
    }

    /// The three-way keyed upsert. See `ForumRepo::cast_vote`.
    async fn cast_vote_tx(&self, voter_id: Uuid, target: VoteTarget, action: VoteAction) -> StoreResult<VoteTally> {
        let mut tx = self.pool.begin().await?;

        if Self::read_counters(&mut tx, target).await?.is_none() {
            return Err(AppError::not_found(target_label(target.kind), target.id).into());
        }

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT direction FROM votes WHERE voter_id = ? AND target_kind = ? AND target_id = ?",
        )
        .bind(voter_id)
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_optional(&mut *tx)
        .await?;
        let existing = existing.as_deref().map(VoteDirection::from_str).transpose()?;

        let table = counter_table(target.kind);
        let now = Utc::now();

        match (existing, action.direction()) {
            (None, Some(direction)) => {
                sqlx::query(
                    "INSERT INTO votes (voter_id, target_kind, target_id, direction, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(voter_id)
                .bind(target.kind.as_str())
                .bind(target.id)
                .bind(direction.as_str())
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                let col = counter_column(direction);
                sqlx::query(&format!("UPDATE {table} SET {col} = {col} + 1 WHERE id = ?"))
                    .bind(target.id)
                    .execute(&mut *tx)
                    .await?;
            }
            (Some(previous), Some(direction)) if previous == direction => {}
            (Some(previous), Some(direction)) => {
                sqlx::query(
                    "UPDATE votes SET direction = ?, updated_at = ? \
                     WHERE voter_id = ? AND target_kind = ? AND target_id = ?",
                )
                .bind(direction.as_str())
                .bind(now)
                .bind(voter_id)
                .bind(target.kind.as_str())
                .bind(target.id)
                .execute(&mut *tx)
                .await?;

                let old = counter_column(previous);
                let new = counter_column(direction);
                sqlx::query(&format!(
                    "UPDATE {table} SET {old} = MAX({old} - 1, 0), {new} = {new} + 1 WHERE id = ?"
                ))
                .bind(target.id)
                .execute(&mut *tx)
                .await?;
            }
            (Some(previous), None) => {
                sqlx::query("DELETE FROM votes WHERE voter_id = ? AND target_kind = ? AND target_id = ?")
                    .bind(voter_id)
                    .bind(target.kind.as_str())
                    .bind(target.id)
                    .execute(&mut *tx)
                    .await?;

                let old = counter_column(previous);
                sqlx::query(&format!("UPDATE {table} SET {old} = MAX({old} - 1, 0) WHERE id = ?"))
                    .bind(target.id)
                    .execute(&mut *tx)
                    .await?;
            }
            (None, None) => {}
        }

        let (upvotes, downvotes) = Self::read_counters(&mut tx, target)
            .await?
            .ok_or_else(|| AppError::not_found(target_label(target.kind), target.id))?;
        tx.commit().await?;

        Ok(VoteTally::new(upvotes, downvotes, action.direction()))
    }

    async fn resync_votes_tx(&self, target: VoteTarget) -> StoreResult<VoteTally> {
        let mut tx = self.pool.begin().await?;

        let table = counter_table(target.kind);
        let sql = format!(
            "UPDATE {table} SET \
             upvotes = (SELECT COUNT(*) FROM votes WHERE target_kind = ?1 AND target_id = ?2 AND direction = 'up'), \
             downvotes = (SELECT COUNT(*) FROM votes WHERE target_kind = ?1 AND target_id = ?2 AND direction = 'down') \
             WHERE id = ?2 RETURNING upvotes, downvotes"
        );
        let counters = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(target.kind.as_str())
            .bind(target.id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((upvotes, downvotes)) = counters else {
            return Err(AppError::not_found(target_label(target.kind), target.id).into());
        };

        tx.commit().await?;
        Ok(VoteTally::new(upvotes, downvotes, None))
    }

    async fn list_threads_inner(&self, query: &ThreadQuery) -> StoreResult<ThreadPage> {
        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {THREAD_COLUMNS} FROM threads"));
        push_thread_filters(&mut select, query);
        select.push(match query.sort {
            ThreadSort::Newest => " ORDER BY is_pinned DESC, created_at DESC, id DESC",
            ThreadSort::Popular => " ORDER BY (upvotes - downvotes) DESC, created_at DESC, id DESC",
            ThreadSort::Unanswered => " ORDER BY created_at DESC, id DESC",
        });
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset());

        let threads = select
            .build_query_as::<ThreadRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Thread::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM threads");
        push_thread_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let limit = i64::from(query.limit.max(1));
        Ok(ThreadPage {
            threads,
            page: query.page,
            limit: query.limit,
            total,
            pages: (total + limit - 1) / limit,
        })
    }

    async fn forum_stats_inner(&self, resolved_since: DateTime<Utc>) -> StoreResult<ForumStats> {
        let (total_threads, total_users, total_replies, solved_today): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM threads), (SELECT COUNT(*) FROM users), \
             (SELECT COUNT(*) FROM replies), \
             (SELECT COUNT(*) FROM threads WHERE is_resolved = 1 AND updated_at >= ?)",
        )
        .bind(resolved_since)
        .fetch_one(&self.pool)
        .await?;

        let mut category_stats: std::collections::BTreeMap<Category, i64> =
            Category::ALL.into_iter().map(|c| (c, 0)).collect();
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT category, COUNT(*) FROM threads GROUP BY category")
            .fetch_all(&self.pool)
            .await?;
        for (label, n) in rows {
            if let Ok(category) = Category::from_str(&label) {
                category_stats.insert(category, n);
            }
        }

        Ok(ForumStats { total_threads, total_users, total_replies, solved_today, category_stats })
    }
}

fn target_label(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Thread => "Thread",
        TargetKind::Reply => "Reply",
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn push_thread_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ThreadQuery) {
    let mut sep = " WHERE ";

    if let Some(category) = query.category {
        qb.push(sep).push("category = ").push_bind(category.as_str());
        sep = " AND ";
    }
    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = like_pattern(term);
        qb.push(sep);
        sep = " AND ";
        qb.push("(LOWER(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(content) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR EXISTS (SELECT 1 FROM json_each(threads.tags) WHERE LOWER(json_each.value) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\'))");
    }
    if query.sort == ThreadSort::Unanswered {
        qb.push(sep).push("reply_count = 0");
    }
}

#[async_trait]
impl ForumRepo for SqliteForumRepo {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.retrying("create_user", || self.insert_user(&user)).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(row.map(User::from))
    }

    async fn get_or_create_user(&self, user: NewUser) -> Result<User> {
        self.retrying("get_or_create_user", || self.upsert_user(&user)).await
    }

    async fn create_thread(&self, thread: NewThread) -> Result<Thread> {
        let tags = to_json_column(&thread.tags)?;
        let attachments = to_json_column(&thread.attachments)?;

        self.retrying("create_thread", || async {
            let now = Utc::now();
            let sql = format!(
                "INSERT INTO threads (id, title, content, category, author_id, tags, attachments, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {THREAD_COLUMNS}"
            );
            let row = sqlx::query_as::<_, ThreadRow>(&sql)
                .bind(Uuid::now_v7())
                .bind(&thread.title)
                .bind(&thread.content)
                .bind(thread.category.as_str())
                .bind(thread.author_id)
                .bind(&tags)
                .bind(&attachments)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
            StoreResult::Ok(Thread::try_from(row)?)
        })
        .await
    }

    async fn get_thread(&self, id: Uuid) -> Result<Option<Thread>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(Self::fetch_thread(&mut conn, id).await?)
    }

    async fn record_thread_view(&self, id: Uuid) -> Result<()> {
        let result = self
            .retrying("record_thread_view", || async {
                let done = sqlx::query("UPDATE threads SET views = views + 1 WHERE id = ?")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                StoreResult::Ok(done)
            })
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Thread", id));
        }
        Ok(())
    }

    async fn list_threads(&self, query: &ThreadQuery) -> Result<ThreadPage> {
        Ok(self.list_threads_inner(query).await?)
    }

    async fn create_reply(&self, reply: NewReply) -> Result<Reply> {
        self.retrying("create_reply", || self.insert_reply_tx(&reply)).await
    }

    async fn get_reply(&self, id: Uuid) -> Result<Option<Reply>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::from)?;
        Ok(Self::fetch_reply(&mut conn, id).await?)
    }

    async fn list_replies(&self, thread_id: Uuid) -> Result<Vec<Reply>> {
        let sql = format!("SELECT {REPLY_COLUMNS} FROM replies WHERE thread_id = ? ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query_as::<_, ReplyRow>(&sql)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.into_iter().map(Reply::try_from).collect()
    }

    async fn update_reply_content(&self, id: Uuid, content: String) -> Result<Reply> {
        self.retrying("update_reply_content", || async {
            let now = Utc::now();
            let sql = format!(
                "UPDATE replies SET content = ?, is_edited = 1, edited_at = ?, updated_at = ? \
                 WHERE id = ? RETURNING {REPLY_COLUMNS}"
            );
            let row = sqlx::query_as::<_, ReplyRow>(&sql)
                .bind(&content)
                .bind(now)
                .bind(now)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::not_found("Reply", id))?;
            StoreResult::Ok(Reply::try_from(row)?)
        })
        .await
    }

    async fn delete_reply(&self, id: Uuid) -> Result<()> {
        self.retrying("delete_reply", || self.delete_reply_tx(id)).await
    }

    async fn accept_reply(&self, id: Uuid) -> Result<Reply> {
        self.retrying("accept_reply", || self.accept_reply_tx(id)).await
    }

    async fn find_ai_reply(&self, thread_id: Uuid, trigger: AiTrigger) -> Result<Option<Reply>> {
        let sql = format!(
            "SELECT {REPLY_COLUMNS} FROM replies WHERE thread_id = ? AND ai_trigger = ? \
             ORDER BY created_at ASC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ReplyRow>(&sql)
            .bind(thread_id)
            .bind(trigger.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(Reply::try_from).transpose()
    }

    async fn cast_vote(&self, voter_id: Uuid, target: VoteTarget, action: VoteAction) -> Result<VoteTally> {
        self.retrying("cast_vote", || self.cast_vote_tx(voter_id, target, action)).await
    }

    async fn get_vote(&self, voter_id: Uuid, target: VoteTarget) -> Result<Option<Vote>> {
        let row = sqlx::query_as::<_, VoteRow>(
            "SELECT voter_id, direction, created_at, updated_at FROM votes \
             WHERE voter_id = ? AND target_kind = ? AND target_id = ?",
        )
        .bind(voter_id)
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        row.map(|r| r.into_vote(target)).transpose()
    }

    async fn resync_vote_counts(&self, target: VoteTarget) -> Result<VoteTally> {
        self.retrying("resync_vote_counts", || self.resync_votes_tx(target)).await
    }

    async fn forum_stats(&self, resolved_since: DateTime<Utc>) -> Result<ForumStats> {
        Ok(self.forum_stats_inner(resolved_since).await?)
    }
}
