use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub session_ttl_hours: i64,
}

/* -------------------------
   Roles
--------------------------*/

// app_user.role smallint mapping
pub const ROLE_PATIENT: i16 = 0;
pub const ROLE_ADMIN: i16 = 1;
pub const ROLE_MEDIC: i16 = 2;

pub fn role_to_string(role: i16) -> String {
    match role {
        ROLE_PATIENT => "patient",
        ROLE_ADMIN => "admin",
        ROLE_MEDIC => "medic",
        _ => "unknown",
    }
    .to_string()
}

pub fn role_from_str(s: &str) -> Option<i16> {
    match s.trim().to_ascii_lowercase().as_str() {
        "patient" => Some(ROLE_PATIENT),
        "admin" => Some(ROLE_ADMIN),
        "medic" => Some(ROLE_MEDIC),
        _ => None,
    }
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub data: LoginResponseData,
}

#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub data: MeResponseData,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub user: UserProfile,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/// Full user view returned by auth and user endpoints. The role-specific
/// block is present only for the matching role.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_data: Option<PatientData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medic_data: Option<MedicData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PatientData {
    pub cpf: String,
    pub cellphone: String,
    pub birth_date: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MedicData {
    pub speciality: String,
    pub crm: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_slots: Vec<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PatientProfileRow {
    pub cpf: String,
    pub cellphone: String,
    pub birth_date: NaiveDate,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MedicProfileRow {
    pub speciality: String,
    pub crm: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionTokenRow {
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ConsultRow {
    pub consult_id: Uuid,
    pub patient_id: Uuid,
    pub medic_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub status: i16,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_mapping_roundtrip() {
        for role in [ROLE_PATIENT, ROLE_ADMIN, ROLE_MEDIC] {
            assert_eq!(role_from_str(&role_to_string(role)), Some(role));
        }
    }

    #[test]
    fn test_role_from_str_is_case_insensitive() {
        assert_eq!(role_from_str("Medic"), Some(ROLE_MEDIC));
        assert_eq!(role_from_str(" ADMIN "), Some(ROLE_ADMIN));
        assert_eq!(role_from_str("receptionist"), None);
    }

    #[test]
    fn test_unknown_role_renders_unknown() {
        assert_eq!(role_to_string(9), "unknown");
    }

    #[test]
    fn test_profile_omits_absent_role_blocks() {
        let profile = UserProfile {
            user_id: Uuid::new_v4(),
            first_name: "Admin".into(),
            last_name: "Root".into(),
            email: "admin@example.com".into(),
            role: "admin".into(),
            patient_data: None,
            medic_data: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert!(value.get("patient_data").is_none());
        assert!(value.get("medic_data").is_none());
        assert_eq!(value["role"], "admin");
    }
}
