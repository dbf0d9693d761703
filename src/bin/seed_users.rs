//! Seeds one demo account per role (admin/medic/patient), all with the
//! password USER123+. Safe to re-run: existing emails are left alone.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

const SEED_PASSWORD: &str = "USER123+";

// role smallints, mirroring src/models.rs
const ROLE_PATIENT: i16 = 0;
const ROLE_ADMIN: i16 = 1;
const ROLE_MEDIC: i16 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(SEED_PASSWORD.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash error: {e}"))?
        .to_string();

    let admin = upsert_user(
        &pool,
        "Admin",
        "Root",
        "admin@example.com",
        &password_hash,
        ROLE_ADMIN,
    )
    .await?;

    let patient = upsert_user(
        &pool,
        "Patient",
        "Root",
        "patient@example.com",
        &password_hash,
        ROLE_PATIENT,
    )
    .await?;
    if let Some(user_id) = patient {
        sqlx::query(
            r#"
            INSERT INTO patient_profile (user_id, cpf, cellphone, birth_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind("74185296300")
        .bind("51999999999")
        .bind(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
        .execute(&pool)
        .await?;
    }

    let medic = upsert_user(
        &pool,
        "Medic",
        "Root",
        "medic@example.com",
        &password_hash,
        ROLE_MEDIC,
    )
    .await?;
    if let Some(user_id) = medic {
        sqlx::query(
            r#"
            INSERT INTO medic_profile (user_id, speciality, crm)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind("Neurologia")
        .bind("123456-RS")
        .execute(&pool)
        .await?;
    }

    println!("admin:   {admin:?}");
    println!("patient: {patient:?}");
    println!("medic:   {medic:?}");
    Ok(())
}

/// Inserts the user if the email is free; returns the user_id either way.
async fn upsert_user(
    pool: &sqlx::PgPool,
    first_name: &str,
    last_name: &str,
    email: &str,
    password_hash: &str,
    role: i16,
) -> anyhow::Result<Option<Uuid>> {
    let inserted: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO app_user (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO NOTHING
        RETURNING user_id
        "#,
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    if inserted.is_some() {
        return Ok(inserted);
    }

    let existing: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM app_user WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(existing)
}
