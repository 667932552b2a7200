//! Forum profiles for users authenticated by the upstream identity provider.

use std::sync::Arc;

use serde::Deserialize;
use sf_core::error::{AppError, Result};
use sf_core::models::{NewUser, User, AI_BOT_EMAIL};
use sf_core::traits::ForumRepo;
use tracing::info;
use uuid::Uuid;

use crate::validation;

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileDraft {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn ForumRepo>,
}

impl UserService {
    pub fn new(repo: Arc<dyn ForumRepo>) -> Self {
        Self { repo }
    }

    /// `Conflict` if the email is registered already.
    pub async fn register(&self, draft: ProfileDraft) -> Result<User> {
        let email = validation::email(&draft.email)?;
        if email == AI_BOT_EMAIL {
            return Err(AppError::Conflict("email is reserved".into()));
        }
        let user = self
            .repo
            .create_user(NewUser {
                email,
                display_name: validation::display_name(&draft.display_name)?,
                avatar: draft.avatar.filter(|a| !a.trim().is_empty()),
                reputation: 0,
                is_admin: false,
                is_ai: false,
            })
            .await?;
        info!(user_id = %user.id, "profile registered");
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        self.repo.get_user(id).await?.ok_or_else(|| AppError::not_found("User", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[tokio::test]
    async fn register_normalizes_and_rejects_duplicates() {
        let repo = testkit::repo().await;
        let users = UserService::new(repo);

        let draft = ProfileDraft {
            email: " Maya@School.edu ".into(),
            display_name: " Maya ".into(),
            avatar: Some("".into()),
        };
        let maya = users.register(draft.clone()).await.unwrap();
        assert_eq!(maya.email, "maya@school.edu");
        assert_eq!(maya.display_name, "Maya");
        assert!(maya.avatar.is_none());
        assert!(!maya.is_admin && !maya.is_ai);

        assert!(matches!(users.register(draft).await, Err(AppError::Conflict(_))));
        assert_eq!(users.get(maya.id).await.unwrap().id, maya.id);
        assert!(matches!(users.get(Uuid::now_v7()).await, Err(AppError::NotFound(..))));
    }

    #[tokio::test]
    async fn bot_email_is_reserved() {
        let users = UserService::new(testkit::repo().await);
        let draft = ProfileDraft { email: AI_BOT_EMAIL.to_uppercase(), display_name: "Imposter".into(), avatar: None };
        assert!(matches!(users.register(draft).await, Err(AppError::Conflict(_))));
    }
}
