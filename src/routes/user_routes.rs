// src/routes/user_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{
        role_from_str, role_to_string, AppState, MedicData, OkData, OkResponse, PatientData,
        UserProfile, UserRow, ROLE_ADMIN, ROLE_MEDIC, ROLE_PATIENT,
    },
};

/*
Authorization policy for user records:
- admin may view/update/delete anyone, and is the only one who may change roles
- everyone else may only touch their own record
- listing all users is admin-only; listing medics is open to any signed-in
  user (patients need it to find someone to book), other role listings are
  admin-only
- availability slots are visible/mutable by admin and the medic themself
*/

fn is_admin(auth: &AuthContext) -> bool {
    auth.role == ROLE_ADMIN
}

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if is_admin(auth) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only admins can perform this action".into(),
        ))
    }
}

fn ensure_admin_or_self(auth: &AuthContext, user_id: Uuid) -> Result<(), ApiError> {
    if is_admin(auth) || auth.user_id == user_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You don't have permission to access this user".into(),
        ))
    }
}

fn can_list_role(auth: &AuthContext, role: i16) -> bool {
    role == ROLE_MEDIC || is_admin(auth)
}

/* ============================================================
   Field validation
   ============================================================ */

pub(crate) fn validate_first_name(name: &str) -> Result<String, ApiError> {
    let n = name.trim();
    if !(3..=50).contains(&n.chars().count()) {
        return Err(ApiError::validation(
            "first_name must be between 3 and 50 characters",
        ));
    }
    Ok(n.to_string())
}

pub(crate) fn validate_last_name(name: &str) -> Result<String, ApiError> {
    let n = name.trim();
    if !(4..=50).contains(&n.chars().count()) {
        return Err(ApiError::validation(
            "last_name must be between 4 and 50 characters",
        ));
    }
    Ok(n.to_string())
}

pub(crate) fn validate_email(email: &str) -> Result<String, ApiError> {
    let e = email.trim().to_ascii_lowercase();
    let invalid = || ApiError::validation("Invalid email address");

    let mut parts = e.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(l), Some(d), None) => (l, d),
        _ => return Err(invalid()),
    };
    if local.is_empty()
        || domain.len() < 3
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || e.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(e)
}

pub(crate) fn validate_password(pw: &str) -> Result<(), ApiError> {
    if !(6..=20).contains(&pw.chars().count()) {
        return Err(ApiError::validation(
            "password must be between 6 and 20 characters",
        ));
    }
    let has_letter = pw.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = pw.chars().any(|c| c.is_ascii_digit());
    let has_special = pw.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_letter && has_digit && has_special) {
        return Err(ApiError::validation(
            "password must contain at least one letter, one number, and one special character",
        ));
    }
    Ok(())
}

/// Accepts formatted input ("741.852.963-00") and stores bare digits.
pub(crate) fn normalize_cpf(cpf: &str) -> Result<String, ApiError> {
    let digits: String = cpf.chars().filter(|c| c.is_ascii_digit()).collect();
    let separators_only = cpf
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ' '));
    if !separators_only || digits.len() != 11 {
        return Err(ApiError::validation("cpf must be exactly 11 digits"));
    }
    Ok(digits)
}

pub(crate) fn normalize_cellphone(cellphone: &str) -> Result<String, ApiError> {
    let digits: String = cellphone.chars().filter(|c| c.is_ascii_digit()).collect();
    let separators_only = cellphone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ' ' | '(' | ')' | '+'));
    if !separators_only || !(10..=11).contains(&digits.len()) {
        return Err(ApiError::validation("cellphone must be 10 or 11 digits"));
    }
    Ok(digits)
}

/// CRM registration number: six digits, a dash, and the state code ("123456-RS").
pub(crate) fn validate_crm(crm: &str) -> Result<String, ApiError> {
    let c = crm.trim();
    let bytes = c.as_bytes();
    let ok = bytes.len() == 9
        && bytes[..6].iter().all(u8::is_ascii_digit)
        && bytes[6] == b'-'
        && bytes[7..].iter().all(u8::is_ascii_uppercase);
    if !ok {
        return Err(ApiError::validation("crm must be in the format 123456-UF"));
    }
    Ok(c.to_string())
}

pub(crate) fn validate_speciality(speciality: &str) -> Result<String, ApiError> {
    let s = speciality.trim();
    if !(3..=85).contains(&s.chars().count()) {
        return Err(ApiError::validation(
            "speciality must be between 3 and 85 characters",
        ));
    }
    Ok(s.to_string())
}

pub(crate) fn validate_birth_date(birth_date: NaiveDate) -> Result<NaiveDate, ApiError> {
    if birth_date > Utc::now().date_naive() {
        return Err(ApiError::validation("birth_date must be in the past"));
    }
    Ok(birth_date)
}

/// Shared check for bookable timestamps (consult scheduled_at, slot slot_at).
pub(crate) fn ensure_future(field: &'static str, ts: DateTime<Utc>) -> Result<(), ApiError> {
    if ts <= Utc::now() {
        return Err(ApiError::validation(format!(
            "{field} must be in the future"
        )));
    }
    Ok(())
}

fn conflict_on_unique(e: sqlx::Error, code: &'static str, msg: &str) -> ApiError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            ApiError::Conflict(code, msg.into())
        }
        _ => ApiError::db(e),
    }
}

/* ============================================================
   Shared user creation + profile loading
   (also used by POST /auth/register)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    /// "patient" (default), "medic", or "admin"
    pub role: Option<String>,
    pub patient_data: Option<PatientData>,
    pub medic_data: Option<MedicData>,
}

pub(crate) async fn insert_user(
    db: &sqlx::PgPool,
    req: &RegisterRequest,
    role: i16,
) -> Result<UserProfile, ApiError> {
    let first_name = validate_first_name(&req.first_name)?;
    let last_name = validate_last_name(&req.last_name)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    // Role-specific profile data is mandatory for the matching role.
    let patient = if role == ROLE_PATIENT {
        let data = req.patient_data.as_ref().ok_or_else(|| {
            ApiError::validation("patient_data is required for role 'patient'")
        })?;
        Some((
            normalize_cpf(&data.cpf)?,
            normalize_cellphone(&data.cellphone)?,
            validate_birth_date(data.birth_date)?,
        ))
    } else {
        None
    };
    let medic = if role == ROLE_MEDIC {
        let data = req
            .medic_data
            .as_ref()
            .ok_or_else(|| ApiError::validation("medic_data is required for role 'medic'"))?;
        Some((validate_speciality(&data.speciality)?, validate_crm(&data.crm)?))
    } else {
        None
    };

    let pw_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let mut tx = db.begin().await.map_err(ApiError::db)?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO app_user (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING user_id
        "#,
    )
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&pw_hash)
    .bind(role)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "EMAIL_TAKEN", "email is already registered"))?;

    if let Some((cpf, cellphone, birth_date)) = patient {
        sqlx::query(
            r#"
            INSERT INTO patient_profile (user_id, cpf, cellphone, birth_date)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(&cpf)
        .bind(&cellphone)
        .bind(birth_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "CPF_TAKEN", "cpf is already registered"))?;
    }

    if let Some((speciality, crm)) = medic {
        sqlx::query(
            r#"
            INSERT INTO medic_profile (user_id, speciality, crm)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(&speciality)
        .bind(&crm)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "CRM_TAKEN", "crm is already registered"))?;
    }

    tx.commit().await.map_err(ApiError::db)?;

    load_user_profile(db, user_id).await
}

pub(crate) async fn load_user_row(
    db: &sqlx::PgPool,
    user_id: Uuid,
) -> Result<UserRow, ApiError> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT user_id, first_name, last_name, email, password_hash, role,
               created_at, updated_at
        FROM app_user
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "user not found".into()))
}

/// Assembles the full profile view: base row plus the role-specific block.
pub(crate) async fn load_user_profile(
    db: &sqlx::PgPool,
    user_id: Uuid,
) -> Result<UserProfile, ApiError> {
    let user = load_user_row(db, user_id).await?;

    let patient_data = if user.role == ROLE_PATIENT {
        let row: Option<crate::models::PatientProfileRow> = sqlx::query_as(
            r#"
            SELECT cpf, cellphone, birth_date
            FROM patient_profile
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::db)?;
        row.map(|p| PatientData {
            cpf: p.cpf,
            cellphone: p.cellphone,
            birth_date: p.birth_date,
        })
    } else {
        None
    };

    let medic_data = if user.role == ROLE_MEDIC {
        let row: Option<crate::models::MedicProfileRow> = sqlx::query_as(
            r#"
            SELECT speciality, crm
            FROM medic_profile
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::db)?;
        match row {
            Some(m) => Some(MedicData {
                speciality: m.speciality,
                crm: m.crm,
                available_slots: load_slots(db, user_id).await?,
            }),
            None => None,
        }
    } else {
        None
    };

    Ok(UserProfile {
        user_id: user.user_id,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        role: role_to_string(user.role),
        patient_data,
        medic_data,
        created_at: user.created_at,
        updated_at: user.updated_at,
    })
}

async fn load_slots(db: &sqlx::PgPool, medic_id: Uuid) -> Result<Vec<DateTime<Utc>>, ApiError> {
    sqlx::query_scalar(
        r#"
        SELECT slot_at
        FROM availability_slot
        WHERE medic_id = $1
        ORDER BY slot_at ASC
        "#,
    )
    .bind(medic_id)
    .fetch_all(db)
    .await
    .map_err(ApiError::db)
}

/* ============================================================
   Routes
   ============================================================ */

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/users
        .route("/", get(list_users).post(create_user))
        // /api/v1/users/role/{role}
        .route("/role/{role}", get(list_by_role))
        // /api/v1/users/{user_id}
        .route(
            "/{user_id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        // /api/v1/users/{user_id}/slots
        .route("/{user_id}/slots", get(get_medic_slots).post(add_medic_slot))
}

#[derive(Debug, sqlx::FromRow)]
struct UserSummaryRow {
    user_id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    role: i16,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(r: UserSummaryRow) -> Self {
        UserSummary {
            user_id: r.user_id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            role: role_to_string(r.role),
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersListResponse {
    pub data: UsersListData,
}

#[derive(Debug, Serialize)]
pub struct UsersListData {
    pub users: Vec<UserSummary>,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<UsersListResponse>, ApiError> {
    ensure_admin(&auth)?;

    let rows: Vec<UserSummaryRow> = sqlx::query_as::<_, UserSummaryRow>(
        r#"
        SELECT user_id, first_name, last_name, email, role, created_at
        FROM app_user
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(UsersListResponse {
        data: UsersListData {
            users: rows.into_iter().map(UserSummary::from).collect(),
        },
    }))
}

pub async fn list_by_role(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(role): Path<String>,
) -> Result<Json<UsersListResponse>, ApiError> {
    let role = role_from_str(&role).ok_or_else(|| {
        ApiError::validation("role must be one of patient, admin, medic")
    })?;

    if !can_list_role(&auth, role) {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You don't have permission to list these users".into(),
        ));
    }

    let rows: Vec<UserSummaryRow> = sqlx::query_as::<_, UserSummaryRow>(
        r#"
        SELECT user_id, first_name, last_name, email, role, created_at
        FROM app_user
        WHERE role = $1
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .bind(role)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(UsersListResponse {
        data: UsersListData {
            users: rows.into_iter().map(UserSummary::from).collect(),
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct UserGetResponse {
    pub data: UserProfile,
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserGetResponse>, ApiError> {
    ensure_admin_or_self(&auth, user_id)?;

    let profile = load_user_profile(&state.db, user_id).await?;
    Ok(Json(UserGetResponse { data: profile }))
}

/// Admin-only creation; this is the only way to mint admin accounts.
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserGetResponse>), ApiError> {
    ensure_admin(&auth)?;

    let role = match req.role.as_deref() {
        Some(r) => role_from_str(r)
            .ok_or_else(|| ApiError::validation("role must be one of patient, admin, medic"))?,
        None => ROLE_PATIENT,
    };

    let profile = insert_user(&state.db, &req, role).await?;
    Ok((StatusCode::CREATED, Json(UserGetResponse { data: profile })))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePatientData {
    pub cpf: Option<String>,
    pub cellphone: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMedicData {
    pub speciality: Option<String>,
    pub crm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Admin-only.
    pub role: Option<String>,
    pub patient_data: Option<UpdatePatientData>,
    pub medic_data: Option<UpdateMedicData>,
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserGetResponse>, ApiError> {
    ensure_admin_or_self(&auth, user_id)?;

    let existing = load_user_row(&state.db, user_id).await?;

    let first_name = match req.first_name.as_deref() {
        Some(s) => validate_first_name(s)?,
        None => existing.first_name.clone(),
    };
    let last_name = match req.last_name.as_deref() {
        Some(s) => validate_last_name(s)?,
        None => existing.last_name.clone(),
    };
    let email = match req.email.as_deref() {
        Some(s) => validate_email(s)?,
        None => existing.email.clone(),
    };
    let password_hash = match req.password.as_deref() {
        Some(pw) => {
            validate_password(pw)?;
            hash_password(pw).map_err(ApiError::Internal)?
        }
        None => existing.password_hash.clone(),
    };
    let role = match req.role.as_deref() {
        Some(r) => {
            if !is_admin(&auth) {
                return Err(ApiError::Forbidden(
                    "FORBIDDEN",
                    "Only admins can change roles".into(),
                ));
            }
            role_from_str(r)
                .ok_or_else(|| ApiError::validation("role must be one of patient, admin, medic"))?
        }
        None => existing.role,
    };
    if role != existing.role {
        // Changing role would orphan the old profile block; not supported.
        return Err(ApiError::Conflict(
            "ROLE_IMMUTABLE",
            "changing an existing user's role is not supported".into(),
        ));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    sqlx::query(
        r#"
        UPDATE app_user
        SET first_name = $1,
            last_name = $2,
            email = $3,
            password_hash = $4,
            updated_at = now()
        WHERE user_id = $5
        "#,
    )
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&password_hash)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "EMAIL_TAKEN", "email is already registered"))?;

    if let Some(data) = &req.patient_data {
        if existing.role != ROLE_PATIENT {
            return Err(ApiError::validation(
                "patient_data is only valid for patient users",
            ));
        }
        let cpf = data.cpf.as_deref().map(normalize_cpf).transpose()?;
        let cellphone = data
            .cellphone
            .as_deref()
            .map(normalize_cellphone)
            .transpose()?;
        let birth_date = data.birth_date.map(validate_birth_date).transpose()?;

        sqlx::query(
            r#"
            UPDATE patient_profile
            SET cpf = COALESCE($1, cpf),
                cellphone = COALESCE($2, cellphone),
                birth_date = COALESCE($3, birth_date)
            WHERE user_id = $4
            "#,
        )
        .bind(cpf)
        .bind(cellphone)
        .bind(birth_date)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "CPF_TAKEN", "cpf is already registered"))?;
    }

    if let Some(data) = &req.medic_data {
        if existing.role != ROLE_MEDIC {
            return Err(ApiError::validation(
                "medic_data is only valid for medic users",
            ));
        }
        let speciality = data
            .speciality
            .as_deref()
            .map(validate_speciality)
            .transpose()?;
        let crm = data.crm.as_deref().map(validate_crm).transpose()?;

        sqlx::query(
            r#"
            UPDATE medic_profile
            SET speciality = COALESCE($1, speciality),
                crm = COALESCE($2, crm)
            WHERE user_id = $3
            "#,
        )
        .bind(speciality)
        .bind(crm)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "CRM_TAKEN", "crm is already registered"))?;
    }

    tx.commit().await.map_err(ApiError::db)?;

    let profile = load_user_profile(&state.db, user_id).await?;
    Ok(Json(UserGetResponse { data: profile }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    ensure_admin_or_self(&auth, user_id)?;

    // Profiles, slots and sessions go with the user (ON DELETE CASCADE);
    // consults deliberately block deletion.
    let res = sqlx::query(
        r#"
        DELETE FROM app_user
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => ApiError::Conflict(
            "USER_HAS_CONSULTS",
            "user has consults and cannot be deleted".into(),
        ),
        _ => ApiError::db(e),
    })?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("NOT_FOUND", "user not found".into()));
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}

/* ============================================================
   Medic availability slots
   ============================================================ */

fn ensure_slot_access(auth: &AuthContext, medic_id: Uuid) -> Result<(), ApiError> {
    if is_admin(auth) || auth.user_id == medic_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "You don't have permission to access this medic's slots".into(),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct AddSlotRequest {
    pub slot_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MedicDataResponse {
    pub data: MedicData,
}

pub async fn add_medic_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AddSlotRequest>,
) -> Result<(StatusCode, Json<MedicDataResponse>), ApiError> {
    ensure_slot_access(&auth, user_id)?;

    let user = load_user_row(&state.db, user_id).await?;
    if user.role != ROLE_MEDIC {
        return Err(ApiError::validation("target user is not a medic"));
    }
    ensure_future("slot_at", req.slot_at)?;

    sqlx::query(
        r#"
        INSERT INTO availability_slot (medic_id, slot_at)
        VALUES ($1, $2)
        "#,
    )
    .bind(user_id)
    .bind(req.slot_at)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    let medic: crate::models::MedicProfileRow = sqlx::query_as(
        r#"
        SELECT speciality, crm
        FROM medic_profile
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok((
        StatusCode::CREATED,
        Json(MedicDataResponse {
            data: MedicData {
                speciality: medic.speciality,
                crm: medic.crm,
                available_slots: load_slots(&state.db, user_id).await?,
            },
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub data: SlotsData,
}

#[derive(Debug, Serialize)]
pub struct SlotsData {
    pub slots: Vec<DateTime<Utc>>,
}

pub async fn get_medic_slots(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SlotsResponse>, ApiError> {
    ensure_slot_access(&auth, user_id)?;

    let slots = load_slots(&state.db, user_id).await?;
    if slots.is_empty() {
        return Err(ApiError::NotFound(
            "NO_SLOTS",
            "No slots found for this medic".into(),
        ));
    }

    Ok(Json(SlotsResponse {
        data: SlotsData { slots },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: i16) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
            session_token_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_validate_names() {
        assert_eq!(validate_first_name("  Ana ").unwrap(), "Ana");
        assert!(validate_first_name("Al").is_err());
        assert!(validate_first_name(&"x".repeat(51)).is_err());
        assert_eq!(validate_last_name("Souza").unwrap(), "Souza");
        assert!(validate_last_name("Sou").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(" Patient@Gmail.com ").unwrap(),
            "patient@gmail.com"
        );
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@.com").is_err());
        assert!(validate_email("a@b@c.com").is_err());
    }

    #[test]
    fn test_validate_password_policy() {
        assert!(validate_password("USER123+").is_ok());
        assert!(validate_password("a1+").is_err()); // too short
        assert!(validate_password(&"a1+".repeat(7)).is_err()); // too long
        assert!(validate_password("lettersonly").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("abc12345").is_err()); // no special
    }

    #[test]
    fn test_normalize_cpf() {
        assert_eq!(normalize_cpf("741.852.963-00").unwrap(), "74185296300");
        assert_eq!(normalize_cpf("74185296300").unwrap(), "74185296300");
        assert!(normalize_cpf("741.852.963").is_err()); // 9 digits
        assert!(normalize_cpf("741a852b963c00").is_err());
    }

    #[test]
    fn test_normalize_cellphone() {
        assert_eq!(normalize_cellphone("51 99999-9999").unwrap(), "51999999999");
        assert_eq!(normalize_cellphone("5199999999").unwrap(), "5199999999");
        assert!(normalize_cellphone("999").is_err());
    }

    #[test]
    fn test_validate_crm() {
        assert_eq!(validate_crm("123456-RS").unwrap(), "123456-RS");
        assert!(validate_crm("123456-rs").is_err());
        assert!(validate_crm("12345-RS").is_err());
        assert!(validate_crm("123456/RS").is_err());
    }

    #[test]
    fn test_validate_speciality() {
        assert_eq!(validate_speciality(" Neurologia ").unwrap(), "Neurologia");
        assert!(validate_speciality("no").is_err());
        assert!(validate_speciality("ORL").is_ok());
        assert!(validate_speciality(&"x".repeat(85)).is_ok());
        assert!(validate_speciality(&"x".repeat(86)).is_err());
    }

    #[test]
    fn test_validate_birth_date() {
        let today = Utc::now().date_naive();
        assert_eq!(validate_birth_date(today).unwrap(), today);
        assert!(validate_birth_date(today + chrono::Days::new(1)).is_err());
    }

    #[test]
    fn test_ensure_future() {
        let soon = Utc::now() + chrono::Duration::minutes(5);
        assert!(ensure_future("slot_at", soon).is_ok());
        assert!(ensure_future("slot_at", Utc::now()).is_err());
        assert!(ensure_future("slot_at", soon - chrono::Duration::hours(1)).is_err());
    }

    #[test]
    fn test_role_listing_policy() {
        let admin = ctx(ROLE_ADMIN);
        let patient = ctx(ROLE_PATIENT);
        // anyone may list medics, only admin may list the rest
        assert!(can_list_role(&patient, ROLE_MEDIC));
        assert!(!can_list_role(&patient, ROLE_PATIENT));
        assert!(!can_list_role(&patient, ROLE_ADMIN));
        assert!(can_list_role(&admin, ROLE_PATIENT));
    }

    #[test]
    fn test_admin_or_self_check() {
        let me = ctx(ROLE_PATIENT);
        assert!(ensure_admin_or_self(&me, me.user_id).is_ok());
        assert!(ensure_admin_or_self(&me, Uuid::new_v4()).is_err());
        assert!(ensure_admin_or_self(&ctx(ROLE_ADMIN), Uuid::new_v4()).is_ok());
    }
}
