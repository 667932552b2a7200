//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified user id
//! in `X-User-Id`. Handlers that need a caller take [`CurrentUser`].

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use sf_core::error::AppError;
use sf_core::models::User;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated forum member making the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let header = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_owned());
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let state = state.ok_or_else(|| AppError::Internal("application state not configured".into()))?;
            let raw = header.ok_or_else(|| AppError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
            let id = Uuid::parse_str(&raw)
                .map_err(|_| AppError::Unauthorized(format!("malformed {USER_ID_HEADER} header")))?;

            let user = match state.services.users.get(id).await {
                Ok(user) => user,
                Err(AppError::NotFound(..)) => return Err(AppError::Unauthorized("unknown user".into()).into()),
                Err(other) => return Err(other.into()),
            };
            if user.is_ai {
                return Err(AppError::Forbidden("the AI account cannot act through the API".into()).into());
            }
            Ok(CurrentUser(user))
        })
    }
}
