use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    claims::IdentityClaims,
    dto::AuthResponse,
    jwt::{IdentityKeys, JwtKeys},
};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    users::repo_types::{NewUser, User},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn issue_tokens(keys: &JwtKeys, user: User) -> ApiResult<AuthResponse> {
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user,
    })
}

/// Finds or creates the user named by a verified ID token. An existing user's
/// name and image are left alone; they belong to the user after sign-up.
pub async fn sign_in_with_identity(st: &AppState, claims: IdentityClaims) -> ApiResult<User> {
    let email = normalize_email(&claims.email);
    if !is_valid_email(&email) {
        warn!(provider_sub = %claims.sub, "id token carries no usable email");
        return Err(ApiError::invalid("A valid email address is required"));
    }

    let user = st
        .store
        .upsert_user(&NewUser {
            email,
            name: non_blank(claims.name),
            image: non_blank(claims.picture),
        })
        .await?;
    info!(user_id = %user.id, "user signed in");
    Ok(user)
}

pub async fn exchange_id_token(st: &AppState, id_token: &str) -> ApiResult<AuthResponse> {
    let claims = IdentityKeys::from_ref(st).verify(id_token).map_err(|e| {
        warn!(error = %e, "id token rejected");
        ApiError::Unauthenticated
    })?;
    let user = sign_in_with_identity(st, claims).await?;
    issue_tokens(&JwtKeys::from_ref(st), user)
}

pub async fn refresh_session(st: &AppState, refresh_token: &str) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(st);
    let claims = keys.verify_refresh(refresh_token).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        ApiError::Unauthenticated
    })?;

    let user = st.store.find_user(claims.sub).await?.ok_or_else(|| {
        warn!(user_id = %claims.sub, "refresh for unknown user");
        ApiError::Unauthenticated
    })?;
    issue_tokens(&keys, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn claims(email: &str, name: Option<&str>) -> IdentityClaims {
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        IdentityClaims {
            sub: "provider-1".into(),
            email: email.into(),
            name: name.map(str::to_string),
            picture: Some("  ".into()),
            iat: now,
            exp: now + 60,
            iss: "idp".into(),
            aud: "teamtodo".into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@example.com"));
        assert!(!is_valid_email("a@example"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email(""));
        assert_eq!(normalize_email("  Ann@Example.COM "), "ann@example.com");
    }

    #[tokio::test]
    async fn first_sign_in_creates_user_and_later_ones_reuse_it() {
        let st = AppState::fake();
        let first = sign_in_with_identity(&st, claims("Ann@Example.com", Some("Ann")))
            .await
            .unwrap();
        assert_eq!(first.email, "ann@example.com");
        assert_eq!(first.name.as_deref(), Some("Ann"));
        assert_eq!(first.image, None);

        let second = sign_in_with_identity(&st, claims("ann@example.com", Some("Other")))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn sign_in_rejects_missing_email() {
        let st = AppState::fake();
        let err = sign_in_with_identity(&st, claims("   ", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn refresh_issues_new_pair_and_rejects_access_tokens() {
        let st = AppState::fake();
        let user = sign_in_with_identity(&st, claims("a@example.com", None))
            .await
            .unwrap();
        let keys = JwtKeys::from_ref(&st);

        let refresh = keys.sign_refresh(user.id).unwrap();
        let res = refresh_session(&st, &refresh).await.unwrap();
        assert_eq!(res.user.id, user.id);
        assert_eq!(keys.verify(&res.access_token).unwrap().sub, user.id);

        let access = keys.sign_access(user.id).unwrap();
        let err = refresh_session(&st, &access).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }
}
