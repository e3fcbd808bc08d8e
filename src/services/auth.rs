//! Credential service: registration, login and token verification

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        user::{AuthResponse, LoginRequest, RegisterUser, UserClaims},
        User, UserRole, UserStatus,
    },
    repository::SharedRepository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: SharedRepository,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(repository: SharedRepository, config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            config,
            clock,
        }
    }

    pub async fn register(&self, data: RegisterUser) -> AppResult<AuthResponse> {
        data.validate()?;
        if self.repository.find_user_by_email(&data.email).await?.is_some() {
            return Err(AppError::Conflict("User with this email already exists".to_string()));
        }

        let hash = hash_password(&data.password)?;
        let user = User::new(&data.email, &data.full_name, hash, UserRole::User, self.clock.now());
        self.repository.insert_user(&user).await?;

        tracing::info!("User registered: {} ({})", user.email, user.id);
        self.issue(user)
    }

    pub async fn login(&self, data: LoginRequest) -> AppResult<AuthResponse> {
        data.validate()?;
        let user = self
            .repository
            .find_user_by_email(&data.email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !verify_password(&user.password_hash, &data.password)? {
            tracing::warn!("Failed login for {}", user.email);
            return Err(AppError::Authentication("Invalid email or password".to_string()));
        }
        if user.status != UserStatus::Active {
            return Err(AppError::Authentication(format!("Account is {}", user.status.as_str())));
        }

        let now = self.clock.now();
        self.repository.record_login(user.id, now).await?;
        let user = User {
            last_login: Some(now),
            ..user
        };

        tracing::info!("User logged in: {}", user.id);
        self.issue(user)
    }

    /// Decode and check a bearer token
    pub fn verify(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    pub async fn me(&self, user_id: Uuid) -> AppResult<User> {
        self.repository
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    fn issue(&self, user: User) -> AppResult<AuthResponse> {
        let now = self.clock.now().timestamp();
        let expires_in = self.config.jwt_expiration_hours * 3600;
        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + expires_in as i64,
            iat: now,
        };
        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        Ok(AuthResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in,
            user,
        })
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, repository::MemoryRepository};

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryRepository::new()),
            AuthConfig::default(),
            Arc::new(SystemClock),
        )
    }

    fn registration(email: &str) -> RegisterUser {
        RegisterUser {
            email: email.to_string(),
            password: "s3cret-pass".to_string(),
            full_name: "Ada Reader".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let registered = auth.register(registration("ada@example.com")).await.unwrap();
        assert_eq!(registered.user.role, UserRole::User);
        assert_ne!(registered.user.password_hash, "s3cret-pass");

        let claims = auth.verify(&registered.token).unwrap();
        assert_eq!(claims.user_id, registered.user.id);
        assert_eq!(claims.sub, "ada@example.com");

        let logged_in = auth
            .login(LoginRequest {
                email: "ada@example.com".to_string(),
                password: "s3cret-pass".to_string(),
            })
            .await
            .unwrap();
        assert!(logged_in.user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let auth = service();
        auth.register(registration("ada@example.com")).await.unwrap();
        let err = auth.register(registration("ada@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials_rejected() {
        let auth = service();
        auth.register(registration("ada@example.com")).await.unwrap();

        let err = auth
            .login(LoginRequest {
                email: "ada@example.com".to_string(),
                password: "wrong-pass".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));

        let err = auth
            .login(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "s3cret-pass".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));

        assert!(matches!(auth.verify("not-a-token"), Err(AppError::Authentication(_))));
    }
}
