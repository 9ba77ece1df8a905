use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Tenant;

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    email: &str,
    password_hash: &str,
    name: &str,
    project_quota: i32,
    is_system_admin: bool,
) -> Result<Tenant, sqlx::Error> {
    sqlx::query_as::<_, Tenant>(
        "INSERT INTO tenants (id, email, password_hash, name, project_quota, is_system_admin)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(project_quota)
    .bind(is_system_admin)
    .fetch_one(executor)
    .await
}

pub async fn count_all<'e, E: sqlx::PgExecutor<'e>>(executor: E) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
    sqlx::query_as::<_, Tenant>("SELECT * FROM tenants ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

/// Add `delta` to the quota and return the new value.
pub async fn adjust_quota(pool: &PgPool, id: Uuid, delta: i32) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE tenants SET project_quota = project_quota + $2 WHERE id = $1
         RETURNING project_quota",
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(pool)
    .await
}

/// Decrement only while the quota stays above `floor`. `None` means nothing changed.
pub async fn decrement_quota_above(
    pool: &PgPool,
    id: Uuid,
    floor: i32,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "UPDATE tenants SET project_quota = project_quota - 1
         WHERE id = $1 AND project_quota > $2
         RETURNING project_quota",
    )
    .bind(id)
    .bind(floor)
    .fetch_optional(pool)
    .await
}

pub async fn count_above_quota(pool: &PgPool, floor: i32) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tenants WHERE project_quota > $1")
        .bind(floor)
        .fetch_one(pool)
        .await
}
