use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use super::{
    dto::{LoginRequest, SignupRequest},
    jwt::{JwtKeys, TokenError},
    password::{hash_password_blocking, verify_password_blocking},
    repo::{Identity, NewUser},
};
use crate::{db::StoreError, error::AppError, state::AppState};

const INVALID_CREDENTIALS: &str = "Incorrect email or password";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_signup(req: &SignupRequest) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if !is_valid_email(&normalize_email(&req.email)) {
        errors.push("email must be a valid email address".to_string());
    }
    if req.password.chars().count() < 6 {
        errors.push("password must be at least 6 characters".to_string());
    }
    let username_len = req.username.trim().chars().count();
    if !(3..=30).contains(&username_len) {
        errors.push("username must be between 3 and 30 characters".to_string());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Create an account and issue its first token.
pub async fn register(st: &AppState, req: SignupRequest) -> Result<(Identity, String), AppError> {
    validate_signup(&req)?;
    let email = normalize_email(&req.email);

    let password_hash = hash_password_blocking(req.password).await?;
    let user = st
        .users
        .create(NewUser {
            email,
            username: req.username.trim().to_string(),
            password_hash,
            created_at: st.clock.now(),
        })
        .await
        .map_err(|e| match e {
            StoreError::DuplicateEmail => AppError::Conflict("User already exists".into()),
            other => AppError::Internal(other.into()),
        })?;

    let token = JwtKeys::from_ref(st).sign(user.id, st.clock.now())?;
    info!(user_id = %user.id, "user registered");
    Ok((user.into(), token))
}

/// Check credentials; unknown email and wrong password are indistinguishable.
pub async fn authenticate(st: &AppState, req: LoginRequest) -> Result<(Identity, String), AppError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }
    let email = normalize_email(&req.email);

    let Some(user) = st.users.find_by_email(&email).await.map_err(anyhow::Error::from)? else {
        warn!("login with unknown email");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    };

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = JwtKeys::from_ref(st).sign(user.id, st.clock.now())?;
    info!(user_id = %user.id, "user logged in");
    Ok((user.into(), token))
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("token subject no longer exists")]
    UnknownUser,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Turn a bearer token into the identity it proves.
pub async fn resolve(st: &AppState, token: &str) -> Result<Identity, ResolveError> {
    let claims = JwtKeys::from_ref(st).verify(token, st.clock.now())?;
    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(ResolveError::UnknownUser)?;
    Ok(user.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str, password: &str, username: &str) -> SignupRequest {
        SignupRequest {
            email: email.into(),
            password: password.into(),
            username: username.into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@y.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn signup_validation_collects_all_problems() {
        let Err(AppError::Validation(errors)) = validate_signup(&signup("nope", "123", "a")) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 3);
        assert!(validate_signup(&signup(" A@X.com ", "secret1", "alice")).is_ok());
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let st = AppState::fake();
        let (user, token) = register(&st, signup("A@X.com", "secret1", "alice")).await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(resolve(&st, &token).await.unwrap(), user);

        let (again, _) = authenticate(
            &st,
            LoginRequest {
                email: "a@x.com".into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let st = AppState::fake();
        register(&st, signup("a@x.com", "secret1", "alice")).await.unwrap();
        let err = register(&st, signup("A@x.com ", "secret2", "alice2")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let st = AppState::fake();
        register(&st, signup("a@x.com", "secret1", "alice")).await.unwrap();

        let wrong_pw = authenticate(
            &st,
            LoginRequest {
                email: "a@x.com".into(),
                password: "nope".into(),
            },
        )
        .await
        .unwrap_err();
        let unknown = authenticate(
            &st,
            LoginRequest {
                email: "b@x.com".into(),
                password: "secret1".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
        assert!(matches!(unknown, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn resolve_rejects_token_for_missing_user() {
        let st = AppState::fake();
        let token = JwtKeys::from_ref(&st)
            .sign(uuid::Uuid::new_v4(), st.clock.now())
            .unwrap();
        assert!(matches!(
            resolve(&st, &token).await,
            Err(ResolveError::UnknownUser)
        ));
    }

    #[tokio::test]
    async fn token_expires_on_the_app_clock() {
        let (st, clock) = AppState::fake_with(AppState::test_config());
        let (user, token) = register(&st, signup("a@x.com", "secret1", "alice")).await.unwrap();
        clock.advance(time::Duration::days(2));
        assert_eq!(resolve(&st, &token).await.unwrap(), user);
        clock.advance(time::Duration::days(1));
        assert!(matches!(
            resolve(&st, &token).await,
            Err(ResolveError::Token(TokenError::Expired))
        ));
    }
}
