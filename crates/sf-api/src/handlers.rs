//! # sf-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the forum services.

use std::str::FromStr;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sf_core::error::AppError;
use sf_core::models::{Attachment, Category, Reply, Thread, ThreadQuery, ThreadSort, VoteAction, VoteTally, VoteTarget};
use sf_services::{ProfileDraft, ReplyDraft, ThreadDraft};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::identity::CurrentUser;
use crate::AppState;

/// A thread or reply with its derived score alongside.
#[derive(Serialize)]
struct Scored<'a, T: Serialize> {
    #[serde(flatten)]
    item: &'a T,
    vote_score: i64,
}

fn scored_thread(thread: &Thread) -> Scored<'_, Thread> {
    Scored { item: thread, vote_score: thread.vote_score() }
}

fn scored_reply(reply: &Reply) -> Scored<'_, Reply> {
    Scored { item: reply, vote_score: reply.vote_score() }
}

fn tally_json(tally: &VoteTally) -> serde_json::Value {
    json!({
        "success": true,
        "vote_score": tally.score,
        "upvotes": tally.upvotes,
        "downvotes": tally.downvotes,
        "user_vote": tally.user_vote,
    })
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn metrics(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    data.metrics.ai_jobs_in_flight.set(data.services.ai.in_flight() as i64);
    let body = data
        .metrics
        .render()
        .map_err(|e| AppError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok(HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(body))
}

// ── Users ────────────────────────────────────────────────────────────────────

pub async fn register_user(data: web::Data<AppState>, body: web::Json<ProfileDraft>) -> ApiResult<HttpResponse> {
    let user = data.services.users.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "success": true, "user": user })))
}

pub async fn current_user(CurrentUser(user): CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "user": user }))
}

// ── Threads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl TryFrom<ListParams> for ThreadQuery {
    type Error = AppError;

    fn try_from(params: ListParams) -> Result<Self, Self::Error> {
        let defaults = ThreadQuery::default();
        let category = match params.category.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(label) => Some(Category::from_str(label)?),
        };
        let sort = match params.sort.as_deref() {
            None | Some("") => ThreadSort::default(),
            Some(label) => ThreadSort::from_str(label)?,
        };
        Ok(ThreadQuery {
            category,
            search: params.search,
            sort,
            page: params.page.unwrap_or(defaults.page),
            limit: params.limit.unwrap_or(defaults.limit),
        })
    }
}

pub async fn list_threads(data: web::Data<AppState>, params: web::Query<ListParams>) -> ApiResult<HttpResponse> {
    let query = ThreadQuery::try_from(params.into_inner())?;
    let page = data.services.threads.list_threads(query).await?;
    let threads: Vec<_> = page.threads.iter().map(scored_thread).collect();
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "threads": threads,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "total": page.total,
            "pages": page.pages,
        },
    })))
}

pub async fn get_thread(data: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let thread = data.services.threads.view_thread(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "thread": scored_thread(&thread) })))
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadBody {
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

pub async fn create_thread(
    data: web::Data<AppState>,
    CurrentUser(author): CurrentUser,
    body: web::Json<CreateThreadBody>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let draft = ThreadDraft {
        title: body.title,
        content: body.content,
        category: body.category,
        tags: body.tags,
        attachments: body.attachments,
    };
    let created = data.services.threads.create_thread(&author, draft).await?;

    data.metrics.threads_created.inc();
    let ai_job = created.ai_job.as_ref().map(|job| {
        data.metrics.record_ai_job("automatic");
        job.status()
    });

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Thread created successfully",
        "thread": scored_thread(&created.thread),
        "ai_job": ai_job,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    #[serde(rename = "type")]
    pub kind: String,
}

async fn apply_vote(data: &AppState, voter: &CurrentUser, target: VoteTarget, kind: &str) -> ApiResult<HttpResponse> {
    let action = VoteAction::from_str(kind)?;
    let tally = data.services.votes.cast(voter.0.id, target, action).await?;
    data.metrics.record_vote(target.kind.as_str(), kind);
    Ok(HttpResponse::Ok().json(tally_json(&tally)))
}

pub async fn vote_thread(
    data: web::Data<AppState>,
    voter: CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<VoteBody>,
) -> ApiResult<HttpResponse> {
    apply_vote(&data, &voter, VoteTarget::thread(path.into_inner()), &body.kind).await
}

pub async fn ai_status(data: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let status = data.services.threads.ai_status(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "job": status })))
}

pub async fn request_ai_answer(
    data: web::Data<AppState>,
    _caller: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let handle = data.services.threads.request_ai_answer(path.into_inner()).await?;
    data.metrics.record_ai_job("manual");
    Ok(HttpResponse::Accepted().json(json!({ "success": true, "job": handle.status() })))
}

pub async fn cancel_ai_answer(
    data: web::Data<AppState>,
    _caller: CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let status = data.services.threads.cancel_ai(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "job": status })))
}

pub async fn stats(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let stats = data.services.threads.stats().await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "stats": stats })))
}

// ── Replies ──────────────────────────────────────────────────────────────────

pub async fn list_replies(data: web::Data<AppState>, path: web::Path<Uuid>) -> ApiResult<HttpResponse> {
    let replies = data.services.replies.list_replies(path.into_inner()).await?;
    let replies: Vec<_> = replies.iter().map(scored_reply).collect();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "replies": replies })))
}

#[derive(Debug, Deserialize)]
pub struct CreateReplyBody {
    pub content: String,
    pub thread_id: Uuid,
    #[serde(default)]
    pub parent_reply_id: Option<Uuid>,
}

pub async fn create_reply(
    data: web::Data<AppState>,
    CurrentUser(author): CurrentUser,
    body: web::Json<CreateReplyBody>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let draft = ReplyDraft { thread_id: body.thread_id, parent_reply_id: body.parent_reply_id, content: body.content };
    let reply = data.services.replies.create_reply(&author, draft).await?;
    data.metrics.replies_created.inc();
    Ok(HttpResponse::Created().json(json!({ "success": true, "reply": scored_reply(&reply) })))
}

#[derive(Debug, Deserialize)]
pub struct EditReplyBody {
    pub content: String,
}

pub async fn edit_reply(
    data: web::Data<AppState>,
    CurrentUser(caller): CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<EditReplyBody>,
) -> ApiResult<HttpResponse> {
    let reply = data.services.replies.edit_reply(&caller, path.into_inner(), &body.content).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "reply": scored_reply(&reply) })))
}

pub async fn delete_reply(
    data: web::Data<AppState>,
    CurrentUser(caller): CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    data.services.replies.delete_reply(&caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Reply deleted" })))
}

pub async fn vote_reply(
    data: web::Data<AppState>,
    voter: CurrentUser,
    path: web::Path<Uuid>,
    body: web::Json<VoteBody>,
) -> ApiResult<HttpResponse> {
    apply_vote(&data, &voter, VoteTarget::reply(path.into_inner()), &body.kind).await
}

pub async fn accept_reply(
    data: web::Data<AppState>,
    CurrentUser(caller): CurrentUser,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let reply = data.services.replies.accept_reply(&caller, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Answer accepted",
        "reply": scored_reply(&reply),
    })))
}

/// Malformed JSON bodies and query strings surface as 400 in the standard error shape.
pub(crate) fn json_error(err: actix_web::error::JsonPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    ApiError(AppError::InvalidArgument(err.to_string())).into()
}

pub(crate) fn query_error(err: actix_web::error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    ApiError(AppError::InvalidArgument(err.to_string())).into()
}
