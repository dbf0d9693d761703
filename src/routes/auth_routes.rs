use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{generate_access_token, hash_access_token, hash_password, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        role_from_str, AppState, LoginRequest, LoginResponse, LoginResponseData, MeResponse,
        MeResponseData, OkData, OkResponse, SessionInfo, SessionTokenRow, ROLE_ADMIN,
        ROLE_PATIENT, UserProfile,
    },
    routes::user_routes::{self, RegisterRequest},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
        .route("/change_password", post(change_password))
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub data: UserProfile,
}

/// Resolve the role requested on public sign-up. Admin is a known spelling
/// but never self-assignable, so it gets a 403 rather than a parse error.
fn registration_role(requested: Option<&str>) -> Result<i16, ApiError> {
    let role = match requested {
        Some(r) => role_from_str(r)
            .ok_or_else(|| ApiError::validation("role must be one of patient, medic, admin"))?,
        None => ROLE_PATIENT,
    };
    if role == ROLE_ADMIN {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "admin accounts cannot be self-registered".into(),
        ));
    }
    Ok(role)
}

/// Public sign-up. Patients and medics only; admin accounts are created by
/// an existing admin through POST /api/v1/users.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let role = registration_role(req.role.as_deref())?;

    let profile = user_routes::insert_user(&state.db, &req, role).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { data: profile })))
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    user_id: uuid::Uuid,
    password_hash: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.trim().to_ascii_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let creds: CredentialsRow = sqlx::query_as::<_, CredentialsRow>(
        r#"
        SELECT user_id, password_hash
        FROM app_user
        WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !verify_password(&req.password, &creds.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token (user_id, session_token_hash, device_name, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(creds.user_id)
    .bind(&token_hash)
    .bind(req.device_name.as_deref())
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    let user = user_routes::load_user_profile(&state.db, creds.user_id).await?;

    Ok(Json(LoginResponse {
        data: LoginResponseData {
            access_token,
            expires_at: session.expires_at,
            user,
        },
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<MeResponse>, ApiError> {
    let user = user_routes::load_user_profile(&state.db, auth.user_id).await?;

    // Re-check the session row so a freshly revoked token reads as expired.
    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        SELECT session_token_id, expires_at
        FROM session_token
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
          AND expires_at > now()
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(MeResponse {
        data: MeResponseData {
            user,
            session: SessionInfo {
                session_token_id: session.session_token_id,
                expires_at: session.expires_at,
            },
        },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<OkResponse>, ApiError> {
    let rows = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if rows.rows_affected() == 0 {
        return Err(ApiError::session_expired());
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return Err(ApiError::validation(
            "old_password and new_password are required",
        ));
    }
    user_routes::validate_password(&req.new_password)?;

    let row: (String,) = sqlx::query_as(
        r#"
        SELECT password_hash
        FROM app_user
        WHERE user_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    // Same error as a bad login so nothing leaks
    if !verify_password(&req.old_password, &row.0) {
        return Err(ApiError::invalid_credentials());
    }

    let new_hash = hash_password(&req.new_password).map_err(ApiError::Internal)?;

    // Transaction so the hash swap and session revocation land together
    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE app_user
        SET password_hash = $1,
            updated_at = now()
        WHERE user_id = $2
        "#,
    )
    .bind(&new_hash)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    // Revoke all OTHER active sessions, keep the current one
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE user_id = $1
          AND revoked_at IS NULL
          AND expires_at > now()
          AND session_token_id <> $2
        "#,
    )
    .bind(auth.user_id)
    .bind(auth.session_token_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ROLE_MEDIC;

    #[test]
    fn test_registration_role() {
        assert_eq!(registration_role(None).unwrap(), ROLE_PATIENT);
        assert_eq!(registration_role(Some("patient")).unwrap(), ROLE_PATIENT);
        assert_eq!(registration_role(Some("Medic")).unwrap(), ROLE_MEDIC);

        // known spelling, but not self-assignable
        assert!(matches!(
            registration_role(Some("admin")),
            Err(ApiError::Forbidden(..))
        ));
        // unknown spelling is a plain validation error
        assert!(matches!(
            registration_role(Some("dentist")),
            Err(ApiError::BadRequest(..))
        ));
    }
}
