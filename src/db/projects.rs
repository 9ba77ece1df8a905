use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExecStatus, NewProject, Project};

pub async fn create(pool: &PgPool, new: &NewProject) -> Result<Project, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "INSERT INTO projects (id, tenant_id, name, path, is_premium, expiry_date, run_command,
                               cpu, ram_mb, timeout_seconds, log_file,
                               filebrowser_user, filebrowser_pass)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
    )
    .bind(new.id)
    .bind(new.tenant_id)
    .bind(&new.name)
    .bind(&new.path)
    .bind(new.is_premium)
    .bind(new.expiry_date)
    .bind(&new.run_command)
    .bind(new.resource_limits.cpu)
    .bind(new.resource_limits.ram_mb)
    .bind(new.resource_limits.timeout_seconds)
    .bind(&new.log_file)
    .bind(&new.filebrowser_user)
    .bind(&new.filebrowser_pass)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_by_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT * FROM projects WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_run_command(
    pool: &PgPool,
    id: Uuid,
    run_command: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET run_command = $2 WHERE id = $1")
        .bind(id)
        .bind(run_command)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_locked(pool: &PgPool, id: Uuid, locked: bool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET is_locked = $2 WHERE id = $1")
        .bind(id)
        .bind(locked)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_entitlement(
    pool: &PgPool,
    id: Uuid,
    expiry_date: DateTime<Utc>,
    locked: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE projects SET expiry_date = $2, is_locked = $3 WHERE id = $1")
        .bind(id)
        .bind(expiry_date)
        .bind(locked)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_start(
    pool: &PgPool,
    id: Uuid,
    pid: i32,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE projects SET is_running = TRUE, pid = $2, status = $3, last_run_time = $4
         WHERE id = $1",
    )
    .bind(id)
    .bind(pid)
    .bind(ExecStatus::Running)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_stop(
    pool: &PgPool,
    id: Uuid,
    exit_code: Option<i32>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE projects SET is_running = FALSE, pid = NULL, status = $2,
                exit_code = COALESCE($3, exit_code)
         WHERE id = $1",
    )
    .bind(id)
    .bind(ExecStatus::Stopped)
    .bind(exit_code)
    .execute(pool)
    .await?;
    Ok(())
}

/// Running → crashed. Only applies while the record still says running.
pub async fn record_crash(
    pool: &PgPool,
    id: Uuid,
    exit_code: Option<i32>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE projects SET is_running = FALSE, pid = NULL, status = $2,
                exit_code = COALESCE($3, exit_code)
         WHERE id = $1 AND is_running",
    )
    .bind(id)
    .bind(ExecStatus::Crashed)
    .bind(exit_code)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Tenants that own at least one unlocked premium project past its expiry.
pub async fn tenants_with_expired(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT DISTINCT tenant_id FROM projects
         WHERE is_premium AND NOT is_locked AND expiry_date < $1",
    )
    .bind(now)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, Copy, sqlx::FromRow, serde::Serialize)]
pub struct ProjectCounts {
    pub projects: i64,
    pub premium_projects: i64,
    pub running_projects: i64,
}

pub async fn counts(pool: &PgPool) -> Result<ProjectCounts, sqlx::Error> {
    sqlx::query_as::<_, ProjectCounts>(
        "SELECT COUNT(*) AS projects,
                COUNT(*) FILTER (WHERE is_premium) AS premium_projects,
                COUNT(*) FILTER (WHERE is_running) AS running_projects
         FROM projects",
    )
    .fetch_one(pool)
    .await
}
