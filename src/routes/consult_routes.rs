// src/routes/consult_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, ConsultRow, OkData, OkResponse, ROLE_ADMIN, ROLE_MEDIC, ROLE_PATIENT},
    routes::user_routes::ensure_future,
};

// consult.status smallint mapping
pub const STATUS_SCHEDULED: i16 = 0;
pub const STATUS_COMPLETED: i16 = 1;
pub const STATUS_CANCELLED: i16 = 2;

pub fn status_to_string(status: i16) -> String {
    match status {
        STATUS_SCHEDULED => "scheduled",
        STATUS_COMPLETED => "completed",
        STATUS_CANCELLED => "cancelled",
        _ => "unknown",
    }
    .to_string()
}

pub fn status_from_str(s: &str) -> Option<i16> {
    match s.trim().to_ascii_lowercase().as_str() {
        "scheduled" => Some(STATUS_SCHEDULED),
        "completed" => Some(STATUS_COMPLETED),
        "cancelled" => Some(STATUS_CANCELLED),
        _ => None,
    }
}

/// Transition guard: a scheduled consult may be completed or cancelled,
/// completed and cancelled are terminal. Re-asserting the current status
/// counts as an illegal transition.
pub fn can_transition(from: i16, to: i16) -> bool {
    matches!(
        (from, to),
        (STATUS_SCHEDULED, STATUS_COMPLETED) | (STATUS_SCHEDULED, STATUS_CANCELLED)
    )
}

/// A consult is visible and mutable by admins and its two participants.
fn can_access_consult(auth: &AuthContext, patient_id: Uuid, medic_id: Uuid) -> bool {
    auth.role == ROLE_ADMIN || auth.user_id == patient_id || auth.user_id == medic_id
}

fn ensure_consult_access(auth: &AuthContext, consult: &ConsultRow) -> Result<(), ApiError> {
    if can_access_consult(auth, consult.patient_id, consult.medic_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You don't have permission to access this consult".into(),
        ))
    }
}

fn validate_notes(notes: &str) -> Result<(), ApiError> {
    if notes.is_empty() {
        return Err(ApiError::validation("notes must not be empty"));
    }
    if notes.chars().count() > 1000 {
        return Err(ApiError::validation(
            "notes must be less than 1000 characters",
        ));
    }
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_consult))
        .route("/status/{status}", get(list_by_status))
        .route("/patient/{patient_id}", get(list_by_patient))
        .route("/medic/{medic_id}", get(list_by_medic))
        .route("/{consult_id}", get(get_consult).delete(delete_consult))
        .route("/{consult_id}/status", patch(update_status))
        .route("/{consult_id}/cancel", patch(cancel_consult))
        .route("/{consult_id}/notes", patch(update_notes))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct PersonBrief {
    pub id: Uuid,
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct ConsultView {
    pub consult_id: Uuid,
    pub patient: PersonBrief,
    pub medic: PersonBrief,
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConsultResponse {
    pub data: ConsultView,
}

#[derive(Debug, Serialize)]
pub struct ConsultListResponse {
    pub data: ConsultListData,
}

#[derive(Debug, Serialize)]
pub struct ConsultListData {
    pub consults: Vec<ConsultView>,
}

#[derive(Debug, sqlx::FromRow)]
struct ConsultDetailRow {
    consult_id: Uuid,
    patient_id: Uuid,
    medic_id: Uuid,
    scheduled_at: DateTime<Utc>,
    status: i16,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    patient_first: String,
    patient_last: String,
    medic_first: String,
    medic_last: String,
}

impl From<ConsultDetailRow> for ConsultView {
    fn from(r: ConsultDetailRow) -> Self {
        ConsultView {
            consult_id: r.consult_id,
            patient: PersonBrief {
                id: r.patient_id,
                display: format!("{} {}", r.patient_first, r.patient_last),
            },
            medic: PersonBrief {
                id: r.medic_id,
                display: format!("{} {}", r.medic_first, r.medic_last),
            },
            scheduled_at: r.scheduled_at,
            status: status_to_string(r.status),
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const DETAIL_SELECT: &str = r#"
    SELECT c.consult_id, c.patient_id, c.medic_id, c.scheduled_at, c.status,
           c.notes, c.created_at, c.updated_at,
           p.first_name AS patient_first, p.last_name AS patient_last,
           m.first_name AS medic_first, m.last_name AS medic_last
    FROM consult c
    JOIN app_user p ON p.user_id = c.patient_id
    JOIN app_user m ON m.user_id = c.medic_id
"#;

async fn load_consult(db: &sqlx::PgPool, consult_id: Uuid) -> Result<ConsultRow, ApiError> {
    sqlx::query_as::<_, ConsultRow>(
        r#"
        SELECT consult_id, patient_id, medic_id, scheduled_at, status, notes,
               created_at, updated_at
        FROM consult
        WHERE consult_id = $1
        "#,
    )
    .bind(consult_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "consult not found".into()))
}

async fn load_consult_detail(
    db: &sqlx::PgPool,
    consult_id: Uuid,
) -> Result<ConsultView, ApiError> {
    let sql = format!("{DETAIL_SELECT} WHERE c.consult_id = $1");
    let row: ConsultDetailRow = sqlx::query_as(&sql)
        .bind(consult_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "consult not found".into()))?;
    Ok(row.into())
}

/* ============================================================
   POST /consults
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateConsultRequest {
    pub patient_id: Uuid,
    pub medic_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub notes: Option<String>,
}

async fn load_role(db: &sqlx::PgPool, user_id: Uuid) -> Result<Option<i16>, ApiError> {
    sqlx::query_scalar(
        r#"
        SELECT role
        FROM app_user
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)
}

pub async fn create_consult(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateConsultRequest>,
) -> Result<(StatusCode, Json<ConsultResponse>), ApiError> {
    // Only an admin, the booked patient, or the booked medic may create it.
    if !can_access_consult(&auth, req.patient_id, req.medic_id) {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You don't have permission to create this consult".into(),
        ));
    }

    ensure_future("scheduled_at", req.scheduled_at)?;
    if let Some(notes) = req.notes.as_deref() {
        validate_notes(notes)?;
    }

    if load_role(&state.db, req.medic_id).await? != Some(ROLE_MEDIC) {
        return Err(ApiError::validation("medic_id does not refer to a medic"));
    }
    if load_role(&state.db, req.patient_id).await? != Some(ROLE_PATIENT) {
        return Err(ApiError::validation("patient_id does not refer to a patient"));
    }

    // Status always starts at scheduled regardless of what the client sent.
    let consult_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO consult (patient_id, medic_id, scheduled_at, status, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING consult_id
        "#,
    )
    .bind(req.patient_id)
    .bind(req.medic_id)
    .bind(req.scheduled_at)
    .bind(STATUS_SCHEDULED)
    .bind(req.notes.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    let view = load_consult_detail(&state.db, consult_id).await?;
    Ok((StatusCode::CREATED, Json(ConsultResponse { data: view })))
}

/* ============================================================
   Reads
   ============================================================ */

pub async fn get_consult(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(consult_id): Path<Uuid>,
) -> Result<Json<ConsultResponse>, ApiError> {
    let consult = load_consult(&state.db, consult_id).await?;
    ensure_consult_access(&auth, &consult)?;

    let view = load_consult_detail(&state.db, consult_id).await?;
    Ok(Json(ConsultResponse { data: view }))
}

pub async fn list_by_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(status): Path<String>,
) -> Result<Json<ConsultListResponse>, ApiError> {
    let status = status_from_str(&status).ok_or_else(|| {
        ApiError::validation("status must be one of scheduled, completed, cancelled")
    })?;

    // Admins see everything, participants see their own.
    let rows: Vec<ConsultDetailRow> = if auth.role == ROLE_ADMIN {
        let sql = format!("{DETAIL_SELECT} WHERE c.status = $1 ORDER BY c.scheduled_at ASC");
        sqlx::query_as(&sql)
            .bind(status)
            .fetch_all(&state.db)
            .await
            .map_err(ApiError::db)?
    } else {
        let sql = format!(
            "{DETAIL_SELECT} WHERE c.status = $1 AND (c.patient_id = $2 OR c.medic_id = $2) ORDER BY c.scheduled_at ASC"
        );
        sqlx::query_as(&sql)
            .bind(status)
            .bind(auth.user_id)
            .fetch_all(&state.db)
            .await
            .map_err(ApiError::db)?
    };

    Ok(Json(ConsultListResponse {
        data: ConsultListData {
            consults: rows.into_iter().map(ConsultView::from).collect(),
        },
    }))
}

pub async fn list_by_patient(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<ConsultListResponse>, ApiError> {
    if auth.role != ROLE_ADMIN && auth.user_id != patient_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You don't have permission to view this patient's consults".into(),
        ));
    }

    let sql = format!("{DETAIL_SELECT} WHERE c.patient_id = $1 ORDER BY c.scheduled_at ASC");
    let rows: Vec<ConsultDetailRow> = sqlx::query_as(&sql)
        .bind(patient_id)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    if rows.is_empty() {
        return Err(ApiError::NotFound(
            "NOT_FOUND",
            "No consults found for this patient".into(),
        ));
    }

    Ok(Json(ConsultListResponse {
        data: ConsultListData {
            consults: rows.into_iter().map(ConsultView::from).collect(),
        },
    }))
}

pub async fn list_by_medic(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(medic_id): Path<Uuid>,
) -> Result<Json<ConsultListResponse>, ApiError> {
    if auth.role != ROLE_ADMIN && auth.user_id != medic_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You don't have permission to view this medic's consults".into(),
        ));
    }

    let sql = format!("{DETAIL_SELECT} WHERE c.medic_id = $1 ORDER BY c.scheduled_at ASC");
    let rows: Vec<ConsultDetailRow> = sqlx::query_as(&sql)
        .bind(medic_id)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    if rows.is_empty() {
        return Err(ApiError::NotFound(
            "NOT_FOUND",
            "No consults found for this medic".into(),
        ));
    }

    Ok(Json(ConsultListResponse {
        data: ConsultListData {
            consults: rows.into_iter().map(ConsultView::from).collect(),
        },
    }))
}

/* ============================================================
   Status transitions
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

async fn transition_consult(
    state: &AppState,
    auth: &AuthContext,
    consult_id: Uuid,
    target: i16,
) -> Result<ConsultView, ApiError> {
    let consult = load_consult(&state.db, consult_id).await?;
    ensure_consult_access(auth, &consult)?;

    if !can_transition(consult.status, target) {
        return Err(ApiError::Conflict(
            "INVALID_TRANSITION",
            format!(
                "cannot change status from {} to {}",
                status_to_string(consult.status),
                status_to_string(target)
            ),
        ));
    }

    sqlx::query(
        r#"
        UPDATE consult
        SET status = $1,
            updated_at = now()
        WHERE consult_id = $2
        "#,
    )
    .bind(target)
    .bind(consult_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    load_consult_detail(&state.db, consult_id).await
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(consult_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ConsultResponse>, ApiError> {
    let target = status_from_str(&req.status).ok_or_else(|| {
        ApiError::validation("status must be one of scheduled, completed, cancelled")
    })?;

    let view = transition_consult(&state, &auth, consult_id, target).await?;
    Ok(Json(ConsultResponse { data: view }))
}

pub async fn cancel_consult(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(consult_id): Path<Uuid>,
) -> Result<Json<ConsultResponse>, ApiError> {
    let view = transition_consult(&state, &auth, consult_id, STATUS_CANCELLED).await?;
    Ok(Json(ConsultResponse { data: view }))
}

/* ============================================================
   Notes
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: String,
}

pub async fn update_notes(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(consult_id): Path<Uuid>,
    Json(req): Json<UpdateNotesRequest>,
) -> Result<Json<ConsultResponse>, ApiError> {
    validate_notes(&req.notes)?;

    let consult = load_consult(&state.db, consult_id).await?;
    ensure_consult_access(&auth, &consult)?;

    sqlx::query(
        r#"
        UPDATE consult
        SET notes = $1,
            updated_at = now()
        WHERE consult_id = $2
        "#,
    )
    .bind(&req.notes)
    .bind(consult_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    let view = load_consult_detail(&state.db, consult_id).await?;
    Ok(Json(ConsultResponse { data: view }))
}

/* ============================================================
   DELETE /consults/{id}
   ============================================================ */

pub async fn delete_consult(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(consult_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let consult = load_consult(&state.db, consult_id).await?;
    ensure_consult_access(&auth, &consult)?;

    sqlx::query(
        r#"
        DELETE FROM consult
        WHERE consult_id = $1
        "#,
    )
    .bind(consult_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(user_id: Uuid, role: i16) -> AuthContext {
        AuthContext {
            user_id,
            role,
            session_token_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_transition_matrix() {
        assert!(can_transition(STATUS_SCHEDULED, STATUS_COMPLETED));
        assert!(can_transition(STATUS_SCHEDULED, STATUS_CANCELLED));

        // terminal states stay terminal
        assert!(!can_transition(STATUS_COMPLETED, STATUS_SCHEDULED));
        assert!(!can_transition(STATUS_COMPLETED, STATUS_CANCELLED));
        assert!(!can_transition(STATUS_CANCELLED, STATUS_SCHEDULED));
        assert!(!can_transition(STATUS_CANCELLED, STATUS_COMPLETED));

        // re-asserting the current status is rejected as well
        assert!(!can_transition(STATUS_SCHEDULED, STATUS_SCHEDULED));
        assert!(!can_transition(STATUS_COMPLETED, STATUS_COMPLETED));
    }

    #[test]
    fn test_status_string_mapping() {
        for status in [STATUS_SCHEDULED, STATUS_COMPLETED, STATUS_CANCELLED] {
            assert_eq!(status_from_str(&status_to_string(status)), Some(status));
        }
        assert_eq!(status_from_str("SCHEDULED"), Some(STATUS_SCHEDULED));
        assert_eq!(status_from_str("no-show"), None);
    }

    #[test]
    fn test_consult_access_policy() {
        let patient_id = Uuid::new_v4();
        let medic_id = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        assert!(can_access_consult(
            &ctx(patient_id, ROLE_PATIENT),
            patient_id,
            medic_id
        ));
        assert!(can_access_consult(
            &ctx(medic_id, ROLE_MEDIC),
            patient_id,
            medic_id
        ));
        assert!(can_access_consult(
            &ctx(stranger, ROLE_ADMIN),
            patient_id,
            medic_id
        ));
        assert!(!can_access_consult(
            &ctx(stranger, ROLE_PATIENT),
            patient_id,
            medic_id
        ));
        assert!(!can_access_consult(
            &ctx(stranger, ROLE_MEDIC),
            patient_id,
            medic_id
        ));
    }

    #[test]
    fn test_validate_notes() {
        assert!(validate_notes("paciente estável").is_ok());
        assert!(validate_notes("").is_err());
        assert!(validate_notes(&"x".repeat(1000)).is_ok());
        assert!(validate_notes(&"x".repeat(1001)).is_err());
    }
}
