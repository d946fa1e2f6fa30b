use sqlx::SqlitePool;

use crate::error::AppError;
use crate::middleware::auth::{create_token_hash, generate_token};
use crate::models::user::{Role, User};
use crate::snowflake;

/// Bearer tokens stay valid this long after issue.
pub const TOKEN_TTL_DAYS: i64 = 30;

type UserRow = (String, String, String, String);

fn row_to_user(row: UserRow) -> User {
    User {
        id: row.0,
        username: row.1,
        role: row.2.parse().unwrap_or(Role::User),
        created_at: row.3,
    }
}

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> Result<User, AppError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, role, created_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("unknown_user".to_string()))?;

    Ok(row_to_user(row))
}

pub async fn username_taken(pool: &SqlitePool, username: &str) -> Result<bool, AppError> {
    let existing = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(existing.is_some())
}

/// Insert a user. The first account on a fresh database becomes an admin.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<User, AppError> {
    let id = snowflake::generate();
    let mut tx = pool.begin().await?;

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *tx)
        .await?;
    let role = if user_count == 0 { Role::Admin } else { Role::User };

    sqlx::query("INSERT INTO users (id, username, password_hash, role) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("username already taken".to_string())
            }
            _ => AppError::from(e),
        })?;

    tx.commit().await?;
    get_user(pool, &id).await
}

/// `(user_id, password_hash)` for a username, if it exists.
pub async fn get_credentials(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<(String, String)>, AppError> {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT id, password_hash FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Issue a new bearer token. Only its hash is stored.
pub async fn issue_token(pool: &SqlitePool, user_id: &str) -> Result<String, AppError> {
    let token = generate_token();
    let token_hash = create_token_hash(&token);
    let expires_at = (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    sqlx::query("INSERT INTO user_tokens (token_hash, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token_hash)
        .bind(user_id)
        .bind(&expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

pub async fn revoke_token(pool: &SqlitePool, token: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM user_tokens WHERE token_hash = ?")
        .bind(create_token_hash(token))
        .execute(pool)
        .await?;
    Ok(())
}

/// Resolve an unexpired token to `(user_id, role)`.
pub async fn resolve_token(
    pool: &SqlitePool,
    token: &str,
) -> Result<Option<(String, Role)>, AppError> {
    let row = sqlx::query_as::<_, (String, String, String)>(
        "SELECT ut.user_id, ut.expires_at, u.role FROM user_tokens ut JOIN users u ON ut.user_id = u.id WHERE ut.token_hash = ?",
    )
    .bind(create_token_hash(token))
    .fetch_optional(pool)
    .await?;

    let Some((user_id, expires_at, role)) = row else {
        return Ok(None);
    };
    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    if expires_at < now {
        return Ok(None);
    }
    Ok(Some((user_id, role.parse().unwrap_or(Role::User))))
}
