//! Authentication middleware
//!
//! Resolves the bearer token into an [`AuthUser`] and stores it in request
//! extensions. Handlers pick it up with `Extension<AuthUser>`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use bazaar_messaging::store::Directory;
use bazaar_shared::{Principal, Role};
use uuid::Uuid;

use super::jwt::{JwtError, JwtManager};
use crate::error::ApiError;

/// Authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn principal(&self) -> Principal {
        Principal::new(self.user_id, self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// State needed to authenticate a request
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    pub directory: Arc<dyn Directory>,
}

impl AuthState {
    /// Validate `token` and resolve the caller against the directory.
    ///
    /// The directory's role wins over the token's claim so demoted or
    /// deactivated accounts lose access without waiting for token expiry.
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, ApiError> {
        let claims = self
            .jwt_manager
            .validate_access_token(token)
            .map_err(|e| match e {
                JwtError::Expired | JwtError::Invalid => ApiError::InvalidToken,
                other => {
                    tracing::debug!(error = %other, "Token validation failed");
                    ApiError::InvalidToken
                }
            })?;

        let account = self.directory.account(claims.sub).await.map_err(|e| {
            tracing::error!(error = %e, user_id = %claims.sub, "Auth: directory lookup failed");
            ApiError::ServiceUnavailable
        })?;

        match account {
            Some(account) if account.is_active => {
                if account.role != claims.role {
                    tracing::debug!(
                        user_id = %claims.sub,
                        token_role = %claims.role,
                        role = %account.role,
                        "Token role is stale, using directory role"
                    );
                }
                Ok(AuthUser {
                    user_id: account.id,
                    role: account.role,
                })
            }
            Some(_) => {
                tracing::warn!(user_id = %claims.sub, "Auth failed: account inactive");
                Err(ApiError::Unauthorized)
            }
            None => {
                tracing::warn!(user_id = %claims.sub, "Auth failed: user not found");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// Require a valid bearer token on every request
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;
    let auth_user = auth_state.authenticate(token).await?;

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_messaging::store::MemoryDirectory;
    use bazaar_shared::Account;

    const SECRET: &str = "test-secret-key-at-least-32-chars!";

    async fn auth_state() -> (AuthState, Arc<MemoryDirectory>) {
        let directory = Arc::new(MemoryDirectory::new());
        let state = AuthState {
            jwt_manager: JwtManager::new(SECRET, 24),
            directory: directory.clone(),
        };
        (state, directory)
    }

    #[tokio::test]
    async fn test_authenticate_uses_directory_role() {
        let (state, directory) = auth_state().await;
        let user_id = directory.add(Role::Admin).await;
        let (token, _) = state
            .jwt_manager
            .generate_access_token(user_id, Role::Customer)
            .unwrap();

        let auth_user = state.authenticate(&token).await.unwrap();
        assert_eq!(auth_user.user_id, user_id);
        assert!(auth_user.is_admin());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_unknown_and_inactive_users() {
        let (state, directory) = auth_state().await;

        let (token, _) = state
            .jwt_manager
            .generate_access_token(Uuid::new_v4(), Role::Customer)
            .unwrap();
        assert!(matches!(
            state.authenticate(&token).await,
            Err(ApiError::Unauthorized)
        ));

        let inactive = Uuid::new_v4();
        directory
            .insert(Account {
                id: inactive,
                role: Role::Provider,
                is_active: false,
                is_restricted: false,
            })
            .await;
        let (token, _) = state
            .jwt_manager
            .generate_access_token(inactive, Role::Provider)
            .unwrap();
        assert!(matches!(
            state.authenticate(&token).await,
            Err(ApiError::Unauthorized)
        ));

        assert!(matches!(
            state.authenticate("garbage").await,
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc.def.ghi"));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic Zm9vOmJhcg==")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}
